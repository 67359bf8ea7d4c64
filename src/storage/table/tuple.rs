use serde::{Serialize, Deserialize};

use crate::catalog::value::DataValue;

/// Per-tuple metadata kept in the slot array
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TupleMeta {
    pub is_deleted: bool,
}

impl TupleMeta {
    pub fn live() -> Self {
        Self { is_deleted: false }
    }

    pub fn deleted() -> Self {
        Self { is_deleted: true }
    }
}

/// A materialized row: one value per schema column
#[derive(Debug, Clone, PartialEq)]
pub struct Tuple {
    pub values: Vec<DataValue>,
}

impl Tuple {
    pub fn new(values: Vec<DataValue>) -> Self {
        Self { values }
    }

    pub fn value(&self, index: usize) -> Option<&DataValue> {
        self.values.get(index)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(&self.values)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, bincode::Error> {
        Ok(Self {
            values: bincode::deserialize(bytes)?,
        })
    }

    /// Row produced by a join: left values then right values
    pub fn join(&self, right: &Tuple) -> Tuple {
        let mut values = self.values.clone();
        values.extend(right.values.iter().cloned());
        Tuple::new(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tuple_roundtrip() {
        let tuple = Tuple::new(vec![
            DataValue::Integer(42),
            DataValue::Text("hello".into()),
            DataValue::Null,
            DataValue::Float(2.75),
        ]);
        let bytes = tuple.to_bytes().unwrap();
        assert_eq!(Tuple::from_bytes(&bytes).unwrap(), tuple);
    }
}
