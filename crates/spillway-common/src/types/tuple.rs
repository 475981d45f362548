//! Ordered records of values.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;
use std::hash::{Hash, Hasher};

use super::Value;

/// Inline capacity before a tuple's values move to the heap.
const INLINE_VALUES: usize = 4;

/// An ordered, fixed-arity sequence of values representing one record.
///
/// Tuples handed to a spillable collection are owned by it from then on, so
/// later changes to the caller's copy can never leak into buffered data.
///
/// Equality and hashing compare floats by bit pattern (see
/// [`Value::eq_bits`]), which makes a tuple usable as a group key.
///
/// # Examples
///
/// ```
/// use spillway_common::types::{Tuple, Value};
///
/// let t = Tuple::from(vec![Value::from("alice"), Value::from(30i64)]);
/// assert_eq!(t.len(), 2);
/// assert_eq!(t.get(1).and_then(Value::as_int64), Some(30));
/// ```
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct Tuple {
    values: SmallVec<[Value; INLINE_VALUES]>,
}

impl Tuple {
    /// Creates an empty tuple.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty tuple with room for `capacity` values.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            values: SmallVec::with_capacity(capacity),
        }
    }

    /// Creates a single-value tuple.
    #[must_use]
    pub fn single(value: impl Into<Value>) -> Self {
        let mut tuple = Self::with_capacity(1);
        tuple.push(value);
        tuple
    }

    /// Appends a value while the tuple is being built.
    pub fn push(&mut self, value: impl Into<Value>) {
        self.values.push(value.into());
    }

    /// Returns the value at `pos`, if any.
    #[must_use]
    pub fn get(&self, pos: usize) -> Option<&Value> {
        self.values.get(pos)
    }

    /// Returns the number of values (the arity).
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if the tuple has no values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns the values as a slice.
    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Iterates over the values in order.
    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.values.iter()
    }

    /// Consumes the tuple and returns its values.
    #[must_use]
    pub fn into_values(self) -> Vec<Value> {
        self.values.into_vec()
    }
}

impl PartialEq for Tuple {
    fn eq(&self, other: &Self) -> bool {
        self.values.len() == other.values.len()
            && self
                .values
                .iter()
                .zip(other.values.iter())
                .all(|(a, b)| a.eq_bits(b))
    }
}

impl Eq for Tuple {}

impl Hash for Tuple {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.values.len().hash(state);
        for v in &self.values {
            v.hash_bits(state);
        }
    }
}

impl fmt::Debug for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Tuple").field(&self.values.as_slice()).finish()
    }
}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, v) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{v}")?;
        }
        write!(f, "]")
    }
}

impl From<Vec<Value>> for Tuple {
    fn from(values: Vec<Value>) -> Self {
        Self {
            values: SmallVec::from_vec(values),
        }
    }
}

impl FromIterator<Value> for Tuple {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Tuple {
    type Item = &'a Value;
    type IntoIter = std::slice::Iter<'a, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_build_and_read() {
        let mut t = Tuple::new();
        assert!(t.is_empty());
        t.push("a");
        t.push(1i64);
        t.push(2.5f64);

        assert_eq!(t.len(), 3);
        assert_eq!(t.get(0).and_then(Value::as_str), Some("a"));
        assert_eq!(t.get(3), None);
        assert_eq!(t.to_string(), "[\"a\", 1, 2.5]");
    }

    #[test]
    fn test_heap_spill_keeps_order() {
        let t: Tuple = (0..10).map(|i| Value::from(i64::from(i))).collect();
        let ints: Vec<i64> = t.iter().filter_map(Value::as_int64).collect();
        assert_eq!(ints, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_usable_as_key() {
        let mut keys = HashSet::new();
        keys.insert(Tuple::single("x"));
        keys.insert(Tuple::single("y"));
        keys.insert(Tuple::single("x"));
        keys.insert(Tuple::single(f64::NAN));
        keys.insert(Tuple::single(f64::NAN));
        assert_eq!(keys.len(), 3);
    }

    #[test]
    fn test_arity_matters_for_equality() {
        let a = Tuple::from(vec![Value::from(1i64)]);
        let b = Tuple::from(vec![Value::from(1i64), Value::Null]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_serde_round_trip() {
        let t = Tuple::from(vec![
            Value::Null,
            Value::from(true),
            Value::from(-7i64),
            Value::from("text"),
            Value::List(vec![Value::from(1i64)].into()),
        ]);
        let json = serde_json::to_string(&t).unwrap();
        let back: Tuple = serde_json::from_str(&json).unwrap();
        assert_eq!(t, back);
    }
}
