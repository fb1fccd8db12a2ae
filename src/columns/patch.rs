//! Sparse index- or slice-addressed overwrites of column storage.
//!
//! Every patch is normalized to a `(row axis, column axis)` pair over a 2-D
//! view of its target: a plain column is viewed as `[1, len]`, a 1-D nested
//! array as `[1, n]` and a 2-D nested array through its own shape. The
//! Cartesian product of both axes is walked in row-major order and paired
//! with the flattened patch values.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::column::{Column, Item, scalar_f64};
use crate::protocol::{Error, Result};

/// Python-style slice; absent bounds default to the full axis
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Slice {
    /// First index (default `0`, or the end for negative steps)
    #[serde(default)]
    pub start: Option<i64>,
    /// One past the last index (default: axis length)
    #[serde(default)]
    pub stop: Option<i64>,
    /// Stride (default `1`)
    #[serde(default)]
    pub step: Option<i64>,
}

impl Slice {
    /// Slice over `start..stop`
    #[must_use]
    pub const fn range(start: i64, stop: i64) -> Self {
        Self {
            start: Some(start),
            stop: Some(stop),
            step: None,
        }
    }

    /// Slice covering the whole axis
    #[must_use]
    pub const fn full() -> Self {
        Self {
            start: None,
            stop: None,
            step: None,
        }
    }

    /// Same slice with a stride
    #[must_use]
    pub const fn with_step(mut self, step: i64) -> Self {
        self.step = Some(step);
        self
    }

    /// Resolve to concrete `(start, stop, step)` for an axis of `len`,
    /// clamping out-of-range bounds like Python's `slice.indices`.
    pub fn indices(&self, len: usize) -> Result<(i64, i64, i64)> {
        let len = i64::try_from(len).unwrap_or(i64::MAX);
        let step = self.step.unwrap_or(1);
        if step == 0 {
            return Err(Error::ZeroStep);
        }

        let (lower, upper) = if step > 0 { (0, len) } else { (-1, len - 1) };
        let clamp = |bound: i64| {
            if bound < 0 {
                (bound + len).max(lower)
            } else {
                bound.min(upper)
            }
        };

        let start = self
            .start
            .map_or(if step > 0 { lower } else { upper }, clamp);
        let stop = self
            .stop
            .map_or(if step > 0 { upper } else { lower }, clamp);
        Ok((start, stop, step))
    }

    /// Concrete indices selected on an axis of `len`
    pub fn select(&self, len: usize) -> Result<Vec<usize>> {
        let (start, stop, step) = self.indices(len)?;
        let mut out = Vec::new();
        let mut i = start;
        while (step > 0 && i < stop) || (step < 0 && i > stop) {
            let index = usize::try_from(i)
                .ok()
                .filter(|&index| index < len)
                .ok_or(Error::IndexOutOfBounds { index: i, len })?;
            out.push(index);
            // a step past the end of i64 leaves the axis
            let Some(next) = i.checked_add(step) else { break };
            i = next;
        }
        Ok(out)
    }
}

/// One axis of a multi-index patch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    /// Single position (negative counts from the end)
    Index(i64),
    /// Range of positions
    Slice(Slice),
}

impl Axis {
    fn select(&self, len: usize) -> Result<Vec<usize>> {
        match self {
            Self::Index(index) => Ok(vec![normalize_index(*index, len)?]),
            Self::Slice(slice) => slice.select(len),
        }
    }

    fn from_json(value: &Value) -> Result<Self> {
        match value {
            Value::Number(n) => n
                .as_i64()
                .map(Self::Index)
                .ok_or_else(|| Error::InvalidPatch(format!("non-integer index {n}"))),
            Value::Object(_) => Ok(Self::Slice(serde_json::from_value(value.clone())?)),
            other => Err(Error::InvalidPatch(format!("invalid axis {other}"))),
        }
    }

    fn to_json(self) -> Value {
        match self {
            Self::Index(index) => Value::from(index),
            Self::Slice(slice) => slice_json(slice),
        }
    }
}

/// Where a patch writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchIndex {
    /// Single cell of a column
    Scalar(i64),
    /// Contiguous or strided range of a column
    Range(Slice),
    /// Cells of the nested array at `item`: `[item, axis]` addresses a 1-D
    /// array, `[item, rows, cols]` a 2-D one
    Multi {
        /// Row of the column holding the nested array
        item: i64,
        /// First axis of the nested array
        first: Axis,
        /// Second axis, for 2-D nested arrays
        second: Option<Axis>,
    },
}

/// An index plus the values to write there
#[derive(Debug, Clone, PartialEq)]
pub struct Patch {
    /// Target cells
    pub index: PatchIndex,
    /// Values in row-major order; one value for a scalar patch
    pub values: Vec<Value>,
}

impl Patch {
    /// Overwrite one cell
    #[must_use]
    pub fn scalar(index: i64, value: Value) -> Self {
        Self {
            index: PatchIndex::Scalar(index),
            values: vec![value],
        }
    }

    /// Overwrite a slice of the column
    #[must_use]
    pub fn range(slice: Slice, values: Vec<Value>) -> Self {
        Self {
            index: PatchIndex::Range(slice),
            values,
        }
    }

    /// Overwrite cells of a nested array
    #[must_use]
    pub fn multi(item: i64, first: Axis, second: Option<Axis>, values: Vec<Value>) -> Self {
        Self {
            index: PatchIndex::Multi {
                item,
                first,
                second,
            },
            values,
        }
    }

    /// Parse a wire entry `[index, value]`
    pub fn from_json(entry: &Value) -> Result<Self> {
        let Some([index, value]) = entry
            .as_array()
            .and_then(|parts| <&[Value; 2]>::try_from(parts.as_slice()).ok())
        else {
            return Err(Error::InvalidPatch(format!("expected [index, value], got {entry}")));
        };

        match index {
            Value::Number(n) => {
                let index = n
                    .as_i64()
                    .ok_or_else(|| Error::InvalidPatch(format!("non-integer index {n}")))?;
                Ok(Self::scalar(index, value.clone()))
            }
            Value::Object(_) => {
                let slice: Slice = serde_json::from_value(index.clone())?;
                Ok(Self::range(slice, values_of(value)?))
            }
            Value::Array(parts) => {
                let (item, axes) = match parts.as_slice() {
                    [item, rest @ ..] if (1..=2).contains(&rest.len()) => (item, rest),
                    _ => {
                        return Err(Error::InvalidPatch(format!(
                            "multi-index must have 2 or 3 parts, got {}",
                            parts.len()
                        )));
                    }
                };
                let item = item
                    .as_i64()
                    .ok_or_else(|| Error::InvalidPatch(format!("non-integer item index {item}")))?;
                let first = Axis::from_json(&axes[0])?;
                let second = axes.get(1).map(Axis::from_json).transpose()?;
                Ok(Self::multi(item, first, second, values_of(value)?))
            }
            other => Err(Error::InvalidPatch(format!("invalid patch index {other}"))),
        }
    }

    /// Wire entry `[index, value]`
    #[must_use]
    pub fn to_json(&self) -> Value {
        let index = match self.index {
            PatchIndex::Scalar(i) => {
                let value = self.values.first().cloned().unwrap_or(Value::Null);
                return Value::Array(vec![Value::from(i), value]);
            }
            PatchIndex::Range(slice) => slice_json(slice),
            PatchIndex::Multi {
                item,
                first,
                second,
            } => {
                let mut parts = vec![Value::from(item), first.to_json()];
                parts.extend(second.map(Axis::to_json));
                Value::Array(parts)
            }
        };
        Value::Array(vec![index, Value::Array(self.values.clone())])
    }
}

fn values_of(value: &Value) -> Result<Vec<Value>> {
    match value {
        Value::Array(values) => Ok(values.clone()),
        other => Err(Error::InvalidPatch(format!("expected a list of values, got {other}"))),
    }
}

fn slice_json(slice: Slice) -> Value {
    serde_json::json!({"start": slice.start, "stop": slice.stop, "step": slice.step})
}

fn normalize_index(index: i64, len: usize) -> Result<usize> {
    let signed_len = i64::try_from(len).unwrap_or(i64::MAX);
    let resolved = if index < 0 { index + signed_len } else { index };
    usize::try_from(resolved)
        .ok()
        .filter(|&i| i < len)
        .ok_or(Error::IndexOutOfBounds { index, len })
}

/// A validated write, ready to apply without further checks.
#[derive(Debug, Clone, PartialEq)]
enum Write {
    /// Replace a row of a dynamic column
    Item { row: usize, value: Value },
    /// Overwrite an element of the fixed column
    Element { flat: usize, value: f64 },
    /// Overwrite an element of the nested array in a dynamic column row
    Nested { row: usize, flat: usize, value: f64 },
}

/// Resolved patches for one column, plus the rows they touch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PatchPlan {
    writes: Vec<Write>,
    touched: BTreeSet<usize>,
}

impl PatchPlan {
    /// Resolve and bounds-check every patch against `column`.
    ///
    /// Nothing is written; a plan that resolves can always be applied.
    pub fn resolve(column: &Column, patches: &[Patch]) -> Result<Self> {
        let mut plan = Self::default();
        for patch in patches {
            plan.resolve_one(column, patch)?;
        }
        Ok(plan)
    }

    fn resolve_one(&mut self, column: &Column, patch: &Patch) -> Result<()> {
        let len = column.len();
        match patch.index {
            PatchIndex::Scalar(index) => {
                let row = normalize_index(index, len)?;
                let [value] = patch.values.as_slice() else {
                    return Err(Error::ValueCountMismatch {
                        expected: 1,
                        got: patch.values.len(),
                    });
                };
                self.writes.push(column_write(column, row, value)?);
                self.touched.insert(row);
            }
            PatchIndex::Range(slice) => {
                let rows = slice.select(len)?;
                check_count(rows.len(), &patch.values)?;
                for (&row, value) in rows.iter().zip(&patch.values) {
                    self.writes.push(column_write(column, row, value)?);
                    self.touched.insert(row);
                }
            }
            PatchIndex::Multi {
                item,
                first,
                second,
            } => {
                let row = normalize_index(item, len)?;
                let Column::Dynamic(items) = column else {
                    return Err(Error::UnsupportedData(
                        "multi-index patch on a flat typed column".to_owned(),
                    ));
                };
                let Item::Array(array) = &items[row] else {
                    return Err(Error::UnsupportedData(format!(
                        "multi-index patch on row {row}, which is not an array"
                    )));
                };

                // a 1-D array is viewed as [1, n] with an implicit row 0
                let (shape, rows_axis, cols_axis) = match (array.shape(), second) {
                    (&[n], None) => ([1, n], Axis::Index(0), first),
                    (&[r, c], Some(second)) => ([r, c], first, second),
                    (shape, _) => {
                        return Err(Error::InvalidPatch(format!(
                            "{}-part index cannot address an array of shape {shape:?}",
                            if second.is_some() { 3 } else { 2 }
                        )));
                    }
                };

                let rows = rows_axis.select(shape[0])?;
                let cols = cols_axis.select(shape[1])?;
                check_count(rows.len() * cols.len(), &patch.values)?;

                let cells = rows
                    .iter()
                    .flat_map(|&i| cols.iter().map(move |&j| i * shape[1] + j));
                for (flat, value) in cells.zip(&patch.values) {
                    self.writes.push(Write::Nested {
                        row,
                        flat,
                        value: number(value)?,
                    });
                }
                self.touched.insert(row);
            }
        }
        Ok(())
    }

    /// Rows (or nested-array rows) the plan touches
    #[must_use]
    pub const fn touched(&self) -> &BTreeSet<usize> {
        &self.touched
    }

    /// Write every resolved cell into `column` and return the touched rows.
    ///
    /// `column` must be the column the plan was resolved against.
    pub fn apply(self, column: &mut Column) -> BTreeSet<usize> {
        for write in self.writes {
            match (write, &mut *column) {
                (Write::Item { row, value }, Column::Dynamic(items)) => {
                    items[row] = Item::Value(value);
                }
                (Write::Element { flat, value }, Column::Fixed(array)) => {
                    array.buffer_mut().set(flat, value);
                }
                (Write::Nested { row, flat, value }, Column::Dynamic(items)) => {
                    if let Item::Array(array) = &mut items[row] {
                        array.buffer_mut().set(flat, value);
                    }
                }
                _ => {}
            }
        }
        self.touched
    }
}

fn column_write(column: &Column, row: usize, value: &Value) -> Result<Write> {
    Ok(match column {
        Column::Dynamic(_) => Write::Item {
            row,
            value: value.clone(),
        },
        Column::Fixed(_) => Write::Element {
            flat: row,
            value: number(value)?,
        },
    })
}

fn number(value: &Value) -> Result<f64> {
    scalar_f64(value)
        .ok_or_else(|| Error::UnsupportedData(format!("cannot store {value} in a typed array")))
}

fn check_count(cells: usize, values: &[Value]) -> Result<()> {
    if cells == values.len() {
        Ok(())
    } else {
        Err(Error::ValueCountMismatch {
            expected: cells,
            got: values.len(),
        })
    }
}

/// Apply `patches` to `column` in order and return the touched rows.
///
/// All patches are resolved before any cell is written, so on error the
/// column is unchanged. Scalar and slice patches record the rows they write;
/// multi-index patches record the row holding the nested array.
pub fn patch_to_column(column: &mut Column, patches: &[Patch]) -> Result<BTreeSet<usize>> {
    let plan = PatchPlan::resolve(column, patches)?;
    Ok(plan.apply(column))
}
