//! Normalized numeric keys.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// 2^63 as f64. Integral floats below this bound fit in an i64.
const I64_BOUND: f64 = 9_223_372_036_854_775_808.0;

/// A number normalized for indexing.
///
/// Integral floats are folded into `Int`, so `25`, `25.0` and `-0.0 == 0`
/// produce equal keys. `Float` only ever holds a non-integral or
/// out-of-range value, which means an `Int` and a `Float` are never equal
/// and the total order below is consistent with `Eq` and `Hash`.
#[derive(Debug, Clone, Copy)]
pub enum NumericKey {
    /// Integral number.
    Int(i64),
    /// Non-integral or out-of-i64-range number. Never NaN.
    Float(f64),
}

impl NumericKey {
    /// Normalizes a float. Returns `None` for NaN.
    pub fn from_f64(f: f64) -> Option<Self> {
        if f.is_nan() {
            return None;
        }
        if f.fract() == 0.0 && (-I64_BOUND..I64_BOUND).contains(&f) {
            #[allow(clippy::cast_possible_truncation)]
            return Some(NumericKey::Int(f as i64));
        }
        Some(NumericKey::Float(f))
    }

    /// Returns the value as a float (possibly lossy for large integers).
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(self) -> f64 {
        match self {
            NumericKey::Int(n) => n as f64,
            NumericKey::Float(f) => f,
        }
    }
}

impl PartialEq for NumericKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for NumericKey {}

impl PartialOrd for NumericKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for NumericKey {
    #[allow(clippy::cast_precision_loss)]
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (NumericKey::Int(a), NumericKey::Int(b)) => a.cmp(b),
            (NumericKey::Float(a), NumericKey::Float(b)) => a.total_cmp(b),
            (NumericKey::Int(a), NumericKey::Float(b)) => {
                match (*a as f64).total_cmp(b) {
                    Ordering::Equal => Ordering::Less,
                    ord => ord,
                }
            }
            (NumericKey::Float(_), NumericKey::Int(_)) => other.cmp(self).reverse(),
        }
    }
}

impl Hash for NumericKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            NumericKey::Int(n) => {
                0u8.hash(state);
                n.hash(state);
            }
            NumericKey::Float(f) => {
                1u8.hash(state);
                f.to_bits().hash(state);
            }
        }
    }
}

impl fmt::Display for NumericKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NumericKey::Int(n) => write!(f, "{n}"),
            NumericKey::Float(x) => write!(f, "{x}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    #[test]
    fn integral_floats_fold_to_ints() {
        assert_eq!(NumericKey::from_f64(25.0), Some(NumericKey::Int(25)));
        assert_eq!(NumericKey::from_f64(-0.0), Some(NumericKey::Int(0)));
        assert!(matches!(
            NumericKey::from_f64(25.5),
            Some(NumericKey::Float(_))
        ));
        assert_eq!(NumericKey::from_f64(f64::NAN), None);
    }

    #[test]
    fn mixed_ordering() {
        let mut keys = vec![
            NumericKey::Int(3),
            NumericKey::from_f64(2.5).unwrap(),
            NumericKey::Int(-1),
            NumericKey::from_f64(f64::INFINITY).unwrap(),
            NumericKey::from_f64(-0.5).unwrap(),
        ];
        keys.sort();

        let as_f: Vec<f64> = keys.iter().map(|k| k.as_f64()).collect();
        assert_eq!(as_f, vec![-1.0, -0.5, 2.5, 3.0, f64::INFINITY]);
    }

    #[test]
    fn hash_agrees_with_eq() {
        let mut set = HashSet::new();
        set.insert(NumericKey::Int(7));
        assert!(set.contains(&NumericKey::from_f64(7.0).unwrap()));
        assert!(!set.contains(&NumericKey::from_f64(7.25).unwrap()));
    }

    proptest! {
        #[test]
        fn order_matches_float_order(a in -1.0e12f64..1.0e12, b in -1.0e12f64..1.0e12) {
            let ka = NumericKey::from_f64(a).unwrap();
            let kb = NumericKey::from_f64(b).unwrap();
            prop_assert_eq!(ka.cmp(&kb), a.partial_cmp(&b).unwrap());
        }
    }
}
