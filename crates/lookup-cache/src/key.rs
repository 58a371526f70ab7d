//! Composite cache keys

use lookup_core::{DataType, Value};
use std::fmt;

/// Ordered tuple of key values extracted from one input row.
///
/// Values are expected to be coerced to the target column types before the
/// key is built; equality and hashing then compare value and type together,
/// so `"123"` and `123` only collide once both were coerced to the same type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RowKey {
    values: Vec<Value>,
}

impl RowKey {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Declared type of each slot.
    pub fn types(&self) -> impl Iterator<Item = DataType> + '_ {
        self.values.iter().map(Value::data_type)
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

impl From<Vec<Value>> for RowKey {
    fn from(values: Vec<Value>) -> Self {
        Self::new(values)
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, value) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", value)?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_key_equality_is_positional() {
        let a = RowKey::new(vec![Value::Int64(1), Value::from("x")]);
        let b = RowKey::new(vec![Value::Int64(1), Value::from("x")]);
        let c = RowKey::new(vec![Value::from("x"), Value::Int64(1)]);

        assert_eq!(a, b);
        assert_ne!(a, c);

        let set: HashSet<_> = [a, b, c].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_key_types_and_display() {
        let key = RowKey::from(vec![Value::Int64(7), Value::Null]);
        assert_eq!(
            key.types().collect::<Vec<_>>(),
            vec![DataType::Int64, DataType::Null]
        );
        assert_eq!(key.to_string(), "(7, NULL)");
    }
}
