//! Append-with-rollover for column storage.
//!
//! Growable sequences are concatenated and trimmed from the front. Typed
//! buffers that would exceed the rollover are shifted left in place and the
//! new elements are written into the freed tail, so a column at capacity is
//! never reallocated.

use tracing::trace;

use super::column::Column;
use super::ndarray::{Element, NdArray, TypedBuffer, map_same};
use crate::protocol::{Error, Result};

/// Append `incoming` to `existing`, keeping at most `rollover` rows.
///
/// The result takes the storage kind of `existing`, except that a dynamic
/// column of numbers streamed with a typed array becomes typed.
pub fn stream_to_column(existing: Column, incoming: Column, rollover: Option<usize>) -> Result<Column> {
    check_stream(&existing, &incoming)?;

    let result = match (existing, incoming) {
        (Column::Dynamic(mut items), Column::Dynamic(new)) => {
            items.extend(new);
            if let Some(limit) = rollover {
                if items.len() > limit {
                    items.drain(..items.len() - limit);
                }
            }
            Column::Dynamic(items)
        }
        (Column::Fixed(array), incoming) => {
            let incoming = incoming.into_typed(array.dtype())?;
            Column::Fixed(NdArray::new(stream_buffer(
                array.into_buffer(),
                incoming.buffer(),
                rollover,
            )))
        }
        (existing @ Column::Dynamic(_), Column::Fixed(new)) => {
            let array = existing.into_typed(new.dtype())?;
            Column::Fixed(NdArray::new(stream_buffer(
                array.into_buffer(),
                new.buffer(),
                rollover,
            )))
        }
    };

    trace!(len = result.len(), ?rollover, "streamed column");
    Ok(result)
}

/// Check that streaming `incoming` onto `existing` has a grow strategy.
///
/// Run before any column of a table is touched so a multi-column stream is
/// applied entirely or not at all.
pub fn check_stream(existing: &Column, incoming: &Column) -> Result<()> {
    match (existing, incoming) {
        (Column::Dynamic(_), Column::Dynamic(_)) => Ok(()),
        (Column::Fixed(array), _) if array.ndim() > 1 => Err(Error::UnsupportedData(format!(
            "cannot stream onto a {}-dimensional array",
            array.ndim()
        ))),
        (_, Column::Fixed(array)) if array.ndim() > 1 => Err(Error::UnsupportedData(format!(
            "cannot stream a {}-dimensional array",
            array.ndim()
        ))),
        (Column::Fixed(_), other) | (other, Column::Fixed(_)) => other.numeric().map(|_| ()),
    }
}

fn stream_buffer(existing: TypedBuffer, incoming: &TypedBuffer, rollover: Option<usize>) -> TypedBuffer {
    map_same!(existing, col => {
        let new = incoming.cast_vec();
        stream_elements(col, &new, rollover)
    })
}

fn stream_elements<T: Element>(mut col: Vec<T>, new: &[T], rollover: Option<usize>) -> Vec<T> {
    let total = col.len() + new.len();
    let Some(limit) = rollover.filter(|&limit| limit < total) else {
        let mut out = Vec::with_capacity(total);
        out.extend_from_slice(&col);
        out.extend_from_slice(new);
        return out;
    };

    if new.len() >= limit {
        return new[new.len() - limit..].to_vec();
    }

    // old rows that survive the rollover
    let keep = limit - new.len();
    let old_len = col.len();
    if old_len < limit {
        let mut grown = Vec::with_capacity(limit);
        grown.extend_from_slice(&col);
        grown.resize(limit, T::default());
        col = grown;
    }

    col.copy_within(old_len - keep..old_len, 0);
    col.truncate(limit);
    col[keep..].copy_from_slice(new);
    col
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::columns::DType;
    use serde_json::json;

    fn values(xs: &[i64]) -> Column {
        Column::from_values(xs.iter().map(|&x| json!(x)))
    }

    fn typed(dtype: DType, xs: &[f64]) -> Column {
        Column::typed(dtype, xs)
    }

    #[test]
    fn test_stream_sequence() {
        let out = stream_to_column(values(&[1, 2, 3]), values(&[4, 5]), None).unwrap();
        assert_eq!(out, values(&[1, 2, 3, 4, 5]));
    }

    #[test]
    fn test_stream_sequence_with_rollover() {
        let out = stream_to_column(values(&[1, 2, 3]), values(&[4, 5]), Some(4)).unwrap();
        assert_eq!(out, values(&[2, 3, 4, 5]));

        let out = stream_to_column(values(&[1, 2, 3, 4, 5]), values(&[100, 200, 300]), Some(5))
            .unwrap();
        assert_eq!(out, values(&[4, 5, 100, 200, 300]));

        let out = stream_to_column(values(&[1, 2, 3, 4, 5]), values(&[100, 200, 300]), Some(6))
            .unwrap();
        assert_eq!(out, values(&[3, 4, 5, 100, 200, 300]));
    }

    #[test]
    fn test_stream_typed_with_rollover() {
        for dtype in [DType::Float32, DType::Float64, DType::Int32] {
            let base = [1.0, 2.0, 3.0, 4.0, 5.0];
            let new = [100.0, 200.0, 300.0];

            // already at rollover length
            let out = stream_to_column(typed(dtype, &base), typed(dtype, &new), Some(5)).unwrap();
            assert_eq!(out, typed(dtype, &[4.0, 5.0, 100.0, 200.0, 300.0]));

            // below rollover length but will exceed it
            let out = stream_to_column(typed(dtype, &base), typed(dtype, &new), Some(6)).unwrap();
            assert_eq!(out, typed(dtype, &[3.0, 4.0, 5.0, 100.0, 200.0, 300.0]));

            // stays below rollover length
            let out = stream_to_column(typed(dtype, &base), typed(dtype, &new), Some(10)).unwrap();
            assert_eq!(
                out,
                typed(dtype, &[1.0, 2.0, 3.0, 4.0, 5.0, 100.0, 200.0, 300.0])
            );
        }
    }

    #[test]
    fn test_stream_typed_above_rollover_truncates() {
        let out = stream_to_column(
            typed(DType::Float64, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]),
            typed(DType::Float64, &[7.0]),
            Some(3),
        )
        .unwrap();
        assert_eq!(out, typed(DType::Float64, &[5.0, 6.0, 7.0]));
    }

    #[test]
    fn test_stream_incoming_longer_than_rollover() {
        let out = stream_to_column(
            typed(DType::Int32, &[1.0, 2.0]),
            typed(DType::Int32, &[3.0, 4.0, 5.0, 6.0]),
            Some(3),
        )
        .unwrap();
        assert_eq!(out, typed(DType::Int32, &[4.0, 5.0, 6.0]));
    }

    #[test]
    fn test_stream_mixed_kinds() {
        // typed onto sequence adopts the incoming kind
        let out = stream_to_column(values(&[1, 2]), typed(DType::Float64, &[3.0]), None).unwrap();
        assert_eq!(out, typed(DType::Float64, &[1.0, 2.0, 3.0]));

        // sequence onto typed is cast to the existing kind
        let out = stream_to_column(typed(DType::Int32, &[1.0]), values(&[2, 3]), None).unwrap();
        assert_eq!(out, typed(DType::Int32, &[1.0, 2.0, 3.0]));
    }

    #[test]
    fn test_stream_non_numeric_into_typed_fails() {
        let err = stream_to_column(
            typed(DType::Float64, &[1.0]),
            Column::from_values([json!("a")]),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, Error::UnsupportedData(_)));
    }

    #[test]
    fn test_stream_onto_2d_array_fails() {
        let array = NdArray::with_shape(TypedBuffer::Float64(vec![0.0; 4]), vec![2, 2]).unwrap();
        let err = stream_to_column(Column::Fixed(array), typed(DType::Float64, &[1.0]), None)
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedData(_)));
    }
}
