//! Numeric arrays: dense one- or two-dimensional matrices of `f64`.
//!
//! Indices are 1-based, matching the scripting language. Negative indices
//! count from the end.

use std::fmt;

#[derive(Clone, Debug, PartialEq)]
pub struct Array {
    nrow: usize,
    ncol: usize,
    /// Row-major storage, `nrow * ncol` elements.
    data: Vec<f64>,
}

impl Array {
    /// A vector of `n` zeros.
    pub fn new_vector(n: usize) -> Self {
        Array {
            nrow: 1,
            ncol: n,
            data: vec![0.0; n],
        }
    }

    /// An `nrow` by `ncol` matrix of zeros.
    pub fn new_matrix(nrow: usize, ncol: usize) -> Self {
        Array {
            nrow,
            ncol,
            data: vec![0.0; nrow * ncol],
        }
    }

    pub fn from_vec(data: Vec<f64>) -> Self {
        Array {
            nrow: 1,
            ncol: data.len(),
            data,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn nrow(&self) -> usize {
        self.nrow
    }

    pub fn ncol(&self) -> usize {
        self.ncol
    }

    /// Number of dimensions: 1 for vectors, 2 for matrices.
    pub fn ndim(&self) -> usize {
        if self.nrow == 1 {
            1
        } else {
            2
        }
    }

    fn resolve(pos: i64, len: usize) -> Option<usize> {
        let len = len as i64;
        let idx = if pos < 0 { len + pos + 1 } else { pos };
        if idx >= 1 && idx <= len {
            Some((idx - 1) as usize)
        } else {
            None
        }
    }

    /// 1-based linear access.
    pub fn get(&self, pos: i64) -> Option<f64> {
        Self::resolve(pos, self.data.len()).map(|i| self.data[i])
    }

    pub fn set(&mut self, pos: i64, value: f64) -> bool {
        match Self::resolve(pos, self.data.len()) {
            Some(i) => {
                self.data[i] = value;
                true
            }
            None => false,
        }
    }

    /// 1-based two-dimensional access.
    pub fn get2(&self, row: i64, col: i64) -> Option<f64> {
        let r = Self::resolve(row, self.nrow)?;
        let c = Self::resolve(col, self.ncol)?;
        Some(self.data[r * self.ncol + c])
    }

    pub fn set2(&mut self, row: i64, col: i64, value: f64) -> bool {
        let (r, c) = match (
            Self::resolve(row, self.nrow),
            Self::resolve(col, self.ncol),
        ) {
            (Some(r), Some(c)) => (r, c),
            _ => return false,
        };
        self.data[r * self.ncol + c] = value;
        true
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f64] {
        &mut self.data
    }

    pub fn min(&self) -> f64 {
        self.data.iter().copied().fold(f64::INFINITY, f64::min)
    }

    pub fn max(&self) -> f64 {
        self.data.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    }

    pub fn sum(&self) -> f64 {
        self.data.iter().sum()
    }

    pub fn mean(&self) -> f64 {
        if self.data.is_empty() {
            f64::NAN
        } else {
            self.sum() / self.data.len() as f64
        }
    }

    /// Apply `op` elementwise with a scalar, in place.
    pub fn map_scalar(&mut self, rhs: f64, op: impl Fn(f64, f64) -> f64) {
        for x in &mut self.data {
            *x = op(*x, rhs);
        }
    }

    pub fn transpose(&self) -> Array {
        let mut out = Array::new_matrix(self.ncol, self.nrow);
        for r in 0..self.nrow {
            for c in 0..self.ncol {
                out.data[c * self.nrow + r] = self.data[r * self.ncol + c];
            }
        }
        out
    }
}

impl fmt::Display for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ndim() == 1 {
            write!(f, "[")?;
            for (i, x) in self.data.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{x}")?;
            }
            write!(f, "]")
        } else {
            writeln!(f, "[")?;
            for r in 0..self.nrow {
                write!(f, "  ")?;
                for c in 0..self.ncol {
                    if c > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", self.data[r * self.ncol + c])?;
                }
                writeln!(f)?;
            }
            write!(f, "]")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negative_indexing() {
        let a = Array::from_vec(vec![1.0, 2.0, 3.0]);
        assert_eq!(a.get(1), Some(1.0));
        assert_eq!(a.get(-1), Some(3.0));
        assert_eq!(a.get(0), None);
        assert_eq!(a.get(4), None);
    }

    #[test]
    fn test_matrix_access() {
        let mut m = Array::new_matrix(2, 3);
        assert!(m.set2(2, 3, 7.0));
        assert_eq!(m.get2(2, 3), Some(7.0));
        assert_eq!(m.get2(-1, -1), Some(7.0));
        assert_eq!(m.get2(3, 1), None);
    }

    #[test]
    fn test_stats() {
        let a = Array::from_vec(vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(a.sum(), 10.0);
        assert_eq!(a.mean(), 2.5);
        assert_eq!(a.min(), 1.0);
        assert_eq!(a.max(), 4.0);
    }

    #[test]
    fn test_transpose() {
        let mut m = Array::new_matrix(2, 2);
        m.set2(1, 2, 5.0);
        let t = m.transpose();
        assert_eq!(t.get2(2, 1), Some(5.0));
    }
}
