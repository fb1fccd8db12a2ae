//! Column data sources and incremental updates.
//!
//! A data source is a table of named columns. Each column is either a
//! growable sequence of JSON values (possibly holding nested typed arrays)
//! or a fixed-kind numeric buffer. Two incremental updates are supported:
//!
//! - **stream**: append rows, optionally trimming the oldest to a rollover
//! - **patch**: overwrite cells addressed by index, slice or multi-index

mod column;
mod ndarray;
mod patch;
mod stream;
mod table;
mod wire;

pub use column::{Column, Item};
pub use ndarray::{DType, NdArray, TypedBuffer};
pub use patch::{Axis, Patch, PatchIndex, PatchPlan, Slice, patch_to_column};
pub use stream::{check_stream, stream_to_column};
pub use table::ColumnTable;
pub use wire::{decode_array, decode_column, decode_patch_values, encode_array, encode_column};
