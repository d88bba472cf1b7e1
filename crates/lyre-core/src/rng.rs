//! Seedable xorshift generator backing the `random` builtins.

/// xorshift64* generator. State must be non-zero.
pub struct Xorshift {
    state: u64,
}

impl Xorshift {
    pub fn new(seed: u64) -> Self {
        Xorshift {
            state: if seed == 0 { 0x9E3779B97F4A7C15 } else { seed },
        }
    }

    pub fn seed(&mut self, seed: u64) {
        self.state = if seed == 0 { 0x9E3779B97F4A7C15 } else { seed };
    }

    pub fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x.wrapping_mul(0x2545F4914F6CDD1D)
    }

    /// Uniform float in `[0, 1)`.
    pub fn next_float(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Uniform integer in `[lo, hi]` inclusive. The span can exceed
    /// `i64::MAX`, so the width is computed in the `u64` domain.
    pub fn next_range(&mut self, lo: i64, hi: i64) -> i64 {
        if hi <= lo {
            return lo;
        }
        let span = (hi as u64).wrapping_sub(lo as u64).wrapping_add(1);
        if span == 0 {
            // full i64 range
            return self.next_u64() as i64;
        }
        (lo as u64).wrapping_add(self.next_u64() % span) as i64
    }
}

impl Default for Xorshift {
    fn default() -> Self {
        Xorshift::new(0x853C49E6748FEA9B)
    }
}
