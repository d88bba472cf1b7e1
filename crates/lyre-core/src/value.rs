//! The `Variant` tagged value used on the VM stack and in containers.

use std::fmt;

/// A handle to an object in the GC heap (a slot index).
///
/// Handles are plain indices: copying one does not affect the target's
/// reference count. Code that stores a handle in a new location must retain
/// it through the heap.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Handle(pub u32);

impl Handle {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A script value: either an immediate scalar or a reference into the heap.
///
/// `Alias` is the by-reference form: it points at a shared variant cell
/// (an `Alias` heap object) so that several storage locations can observe
/// the same mutation. Reading a value "by value" always resolves aliases
/// first.
#[derive(Clone, Copy, Debug)]
pub enum Variant {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    /// Strong reference to a heap object.
    Ref(Handle),
    /// Strong reference to a shared variant cell.
    Alias(Handle),
}

impl Variant {
    pub fn is_null(&self) -> bool {
        matches!(self, Variant::Null)
    }

    pub fn is_boolean(&self) -> bool {
        matches!(self, Variant::Boolean(_))
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Variant::Integer(_) | Variant::Float(_))
    }

    pub fn is_ref(&self) -> bool {
        matches!(self, Variant::Ref(_) | Variant::Alias(_))
    }

    /// The handle carried by `Ref` or `Alias` forms, if any.
    pub fn handle(&self) -> Option<Handle> {
        match self {
            Variant::Ref(h) | Variant::Alias(h) => Some(*h),
            _ => None,
        }
    }

    /// Numeric value as a float, for mixed-mode arithmetic.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Variant::Integer(i) => Some(*i as f64),
            Variant::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Variant::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            Variant::Boolean(b) => Some(*b),
            _ => None,
        }
    }
}

impl Default for Variant {
    fn default() -> Self {
        Variant::Null
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::Null => write!(f, "null"),
            Variant::Boolean(b) => write!(f, "{b}"),
            Variant::Integer(i) => write!(f, "{i}"),
            Variant::Float(x) => {
                if x.is_nan() {
                    write!(f, "nan")
                } else if x.fract() == 0.0 && x.abs() < 1e15 {
                    write!(f, "{x:.1}")
                } else {
                    write!(f, "{x}")
                }
            }
            Variant::Ref(h) => write!(f, "<object at {}>", h.0),
            Variant::Alias(h) => write!(f, "<ref at {}>", h.0),
        }
    }
}

/// A self-contained table/set key.
///
/// Keys must be hashable; they are normalized out of a `Variant` so that
/// hashing and equality never need to chase heap handles. Unhashable values
/// (lists, tables, functions) are rejected with a type error at the
/// conversion site.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum Key {
    Boolean(bool),
    Integer(i64),
    /// Floats are keyed by bit pattern.
    Float(u64),
    Str(String),
}

impl Key {
    /// Turn the key back into a value (strings are re-interned by the heap,
    /// so the caller handles `Str`).
    pub fn scalar(&self) -> Option<Variant> {
        match self {
            Key::Boolean(b) => Some(Variant::Boolean(*b)),
            Key::Integer(i) => Some(Variant::Integer(*i)),
            Key::Float(bits) => Some(Variant::Float(f64::from_bits(*bits))),
            Key::Str(_) => None,
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Boolean(b) => write!(f, "{b}"),
            Key::Integer(i) => write!(f, "{i}"),
            Key::Float(bits) => write!(f, "{}", f64::from_bits(*bits)),
            Key::Str(s) => write!(f, "{s}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_predicates() {
        assert!(Variant::Null.is_null());
        assert!(Variant::Boolean(true).is_boolean());
        assert!(Variant::Integer(3).is_number());
        assert!(Variant::Float(3.5).is_number());
        assert!(!Variant::Null.is_ref());
    }

    #[test]
    fn test_as_float_promotes_integers() {
        assert_eq!(Variant::Integer(2).as_float(), Some(2.0));
        assert_eq!(Variant::Float(2.5).as_float(), Some(2.5));
        assert_eq!(Variant::Null.as_float(), None);
    }

    #[test]
    fn test_key_roundtrip() {
        assert!(matches!(
            Key::Integer(7).scalar(),
            Some(Variant::Integer(7))
        ));
        assert!(Key::Str("a".into()).scalar().is_none());
    }

    #[test]
    fn test_float_display() {
        assert_eq!(format!("{}", Variant::Float(2.0)), "2.0");
        assert_eq!(format!("{}", Variant::Float(f64::NAN)), "nan");
    }
}
