//! JSON encoding of column data.
//!
//! # Wire Format
//!
//! ```text
//! dynamic column : [1, "a", {"__ndarray__": ...}, ...]
//! typed array    : {"__ndarray__": "<base64>" | {"__buffer__": "<id>"},
//!                   "dtype": "float64", "shape": [n], "order": "little"}
//! ```
//!
//! Arrays referencing `__buffer__` ids are resolved against the buffers
//! attached to the carrying message.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use serde_json::{Map, Value, json};

use super::column::{Column, Item};
use super::ndarray::{DType, NdArray, TypedBuffer};
use crate::protocol::{BufferHeader, BufferRef, Error, Result, generate_id};

const NDARRAY_KEY: &str = "__ndarray__";
const BUFFER_KEY: &str = "__buffer__";

/// Encode a typed array, inline or as an attached buffer.
///
/// When `buffers` is given the bytes are appended there and referenced by id.
#[must_use]
pub fn encode_array(array: &NdArray, buffers: Option<&mut Vec<BufferRef>>) -> Value {
    let bytes = array.buffer().to_le_bytes();
    let payload = match buffers {
        Some(buffers) => {
            let header = BufferHeader::new(generate_id());
            let reference = json!({ BUFFER_KEY: header.id });
            buffers.push((header, Bytes::from(bytes)));
            reference
        }
        None => Value::String(STANDARD.encode(bytes)),
    };

    json!({
        NDARRAY_KEY: payload,
        "dtype": array.dtype().as_str(),
        "shape": array.shape(),
        "order": "little",
    })
}

/// Decode a typed array object.
pub fn decode_array(object: &Map<String, Value>, buffers: &[BufferRef]) -> Result<NdArray> {
    let dtype: DType = object
        .get("dtype")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::UnsupportedData("array without dtype".to_owned()))?
        .parse()?;
    let big_endian = object.get("order").and_then(Value::as_str) == Some("big");

    let bytes = match object.get(NDARRAY_KEY) {
        Some(Value::String(encoded)) => STANDARD.decode(encoded)?,
        Some(Value::Object(reference)) => {
            let id = reference
                .get(BUFFER_KEY)
                .and_then(Value::as_str)
                .ok_or_else(|| Error::UnsupportedData("array reference without id".to_owned()))?;
            buffers
                .iter()
                .find(|(header, _)| header.id == id)
                .map(|(_, payload)| payload.to_vec())
                .ok_or_else(|| Error::MissingBuffer(id.to_owned()))?
        }
        _ => return Err(Error::UnsupportedData("array without payload".to_owned())),
    };

    let buffer = TypedBuffer::from_bytes(dtype, &bytes, big_endian)?;
    match object.get("shape") {
        Some(shape) => {
            let shape: Vec<usize> = serde_json::from_value(shape.clone())?;
            NdArray::with_shape(buffer, shape)
        }
        None => Ok(NdArray::new(buffer)),
    }
}

fn as_array_object(value: &Value) -> Option<&Map<String, Value>> {
    value.as_object().filter(|object| object.contains_key(NDARRAY_KEY))
}

/// Encode one column.
#[must_use]
pub fn encode_column(column: &Column, mut buffers: Option<&mut Vec<BufferRef>>) -> Value {
    match column {
        Column::Fixed(array) => encode_array(array, buffers),
        Column::Dynamic(items) => Value::Array(
            items
                .iter()
                .map(|item| match item {
                    Item::Value(value) => value.clone(),
                    Item::Array(array) => encode_array(array, buffers.as_deref_mut()),
                })
                .collect(),
        ),
    }
}

/// Decode one column.
pub fn decode_column(value: &Value, buffers: &[BufferRef]) -> Result<Column> {
    if let Some(object) = as_array_object(value) {
        return Ok(Column::Fixed(decode_array(object, buffers)?));
    }
    let Value::Array(values) = value else {
        return Err(Error::UnsupportedData(format!(
            "column must be a list or typed array, got {value}"
        )));
    };

    values
        .iter()
        .map(|value| match as_array_object(value) {
            Some(object) => decode_array(object, buffers).map(Item::Array),
            None => Ok(Item::Value(value.clone())),
        })
        .collect::<Result<Vec<_>>>()
        .map(Column::Dynamic)
}

/// Replace typed-array objects in a patch value with plain number lists.
pub fn decode_patch_values(value: &Value, buffers: &[BufferRef]) -> Result<Value> {
    match as_array_object(value) {
        Some(object) => {
            let array = decode_array(object, buffers)?;
            Ok(Value::Array(
                array
                    .buffer()
                    .to_f64_vec()
                    .into_iter()
                    .map(Value::from)
                    .collect(),
            ))
        }
        None => Ok(value.clone()),
    }
}
