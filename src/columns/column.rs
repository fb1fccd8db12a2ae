use serde_json::Value;

use super::ndarray::{DType, NdArray, TypedBuffer};
use crate::protocol::{Error, Result};

/// One entry of a dynamic column
#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    /// Plain JSON value
    Value(Value),
    /// Nested typed array (ragged columns, e.g. polygon coordinates)
    Array(NdArray),
}

impl Item {
    /// Numeric view of a scalar item
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Value(value) => scalar_f64(value),
            Self::Array(_) => None,
        }
    }
}

impl From<Value> for Item {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<NdArray> for Item {
    fn from(array: NdArray) -> Self {
        Self::Array(array)
    }
}

/// Column storage: a growable sequence, or a fixed-kind numeric buffer
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    /// Heterogeneous growable sequence
    Dynamic(Vec<Item>),
    /// Typed buffer with a declared shape
    Fixed(NdArray),
}

impl Column {
    /// Number of rows
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Dynamic(items) => items.len(),
            Self::Fixed(array) => array.len(),
        }
    }

    /// Whether the column has no rows
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Dynamic column from plain JSON values
    #[must_use]
    pub fn from_values(values: impl IntoIterator<Item = Value>) -> Self {
        Self::Dynamic(values.into_iter().map(Item::Value).collect())
    }

    /// Fixed column of `dtype` from numbers
    #[must_use]
    pub fn typed(dtype: DType, values: &[f64]) -> Self {
        Self::Fixed(NdArray::from_f64(dtype, values))
    }

    /// Every row as a number, if all rows are numeric scalars
    pub fn numeric(&self) -> Result<Vec<f64>> {
        match self {
            Self::Fixed(array) => Ok(array.buffer().to_f64_vec()),
            Self::Dynamic(items) => items
                .iter()
                .enumerate()
                .map(|(row, item)| {
                    item.as_f64().ok_or_else(|| {
                        Error::UnsupportedData(format!("row {row} is not a number"))
                    })
                })
                .collect(),
        }
    }

    /// Convert to a fixed column of `dtype`; fails if any row is not numeric
    pub fn into_typed(self, dtype: DType) -> Result<NdArray> {
        match self {
            Self::Fixed(array) if array.dtype() == dtype && array.ndim() == 1 => Ok(array),
            other => Ok(NdArray::new(TypedBuffer::from_f64(dtype, &other.numeric()?))),
        }
    }
}

impl Default for Column {
    fn default() -> Self {
        Self::Dynamic(Vec::new())
    }
}

impl From<Vec<Value>> for Column {
    fn from(values: Vec<Value>) -> Self {
        Self::from_values(values)
    }
}

impl From<NdArray> for Column {
    fn from(array: NdArray) -> Self {
        Self::Fixed(array)
    }
}

/// Number view of a JSON scalar; booleans count as 0/1
pub(crate) fn scalar_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_numeric_view() {
        let col = Column::from_values([json!(1), json!(2.5), json!(true)]);
        assert_eq!(col.numeric().unwrap(), vec![1.0, 2.5, 1.0]);

        let col = Column::from_values([json!(1), json!("x")]);
        assert!(matches!(col.numeric(), Err(Error::UnsupportedData(_))));
    }

    #[test]
    fn test_into_typed() {
        let col = Column::from_values([json!(1), json!(2)]);
        let array = col.into_typed(DType::Int32).unwrap();
        assert_eq!(array.buffer(), &TypedBuffer::Int32(vec![1, 2]));
    }
}
