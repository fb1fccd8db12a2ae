//! Named columns of one column data source.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{Map, Value};
use tracing::debug;

use super::column::Column;
use super::patch::{Patch, PatchPlan};
use super::stream::{check_stream, stream_to_column};
use super::wire::{decode_column, encode_column};
use crate::protocol::{BufferRef, Error, Result};

/// Column name to column storage
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnTable {
    columns: BTreeMap<String, Column>,
}

impl ColumnTable {
    /// Create an empty table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a column
    pub fn insert(&mut self, name: impl Into<String>, column: impl Into<Column>) -> Option<Column> {
        self.columns.insert(name.into(), column.into())
    }

    /// Get a column
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Column> {
        self.columns.get(name)
    }

    /// Remove a column
    pub fn remove(&mut self, name: &str) -> Option<Column> {
        self.columns.remove(name)
    }

    /// Number of columns
    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Whether the table has no columns
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Column names, sorted
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    /// Iterate `(name, column)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Column)> {
        self.columns.iter().map(|(name, column)| (name.as_str(), column))
    }

    /// Append every column of `data`, keeping at most `rollover` rows each.
    ///
    /// A non-empty table must receive exactly its own columns, all of the
    /// same length; an empty table takes whatever columns arrive. Every
    /// column is checked before any is modified.
    pub fn stream(&mut self, data: ColumnTable, rollover: Option<usize>) -> Result<()> {
        if !self.columns.is_empty() && !self.columns.keys().eq(data.columns.keys()) {
            let missing: Vec<&str> = self
                .names()
                .filter(|name| !data.columns.contains_key(*name))
                .collect();
            let extra: Vec<&str> = data
                .names()
                .filter(|name| !self.columns.contains_key(*name))
                .collect();
            return Err(Error::InvalidEvent(format!(
                "must stream updates to all existing columns (missing: {missing:?}, extra: {extra:?})"
            )));
        }

        let lengths: BTreeSet<usize> = data.columns.values().map(Column::len).collect();
        if lengths.len() > 1 {
            return Err(Error::InvalidEvent(
                "all streaming column updates must be the same length".to_owned(),
            ));
        }

        let empty = Column::default();
        for (name, incoming) in &data.columns {
            check_stream(self.columns.get(name).unwrap_or(&empty), incoming)?;
        }

        for (name, incoming) in data.columns {
            let existing = self.columns.remove(&name).unwrap_or_default();
            let streamed = stream_to_column(existing, incoming, rollover)?;
            self.columns.insert(name, streamed);
        }
        debug!(columns = self.columns.len(), ?rollover, "streamed table");
        Ok(())
    }

    /// Apply per-column patches and return the union of touched rows.
    ///
    /// Every plan is resolved before any column is written.
    pub fn patch(&mut self, patches: &BTreeMap<String, Vec<Patch>>) -> Result<BTreeSet<usize>> {
        let plans = patches
            .iter()
            .map(|(name, patches)| {
                let column = self
                    .columns
                    .get(name)
                    .ok_or_else(|| Error::UnknownColumn(name.clone()))?;
                Ok((name, PatchPlan::resolve(column, patches)?))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut touched = BTreeSet::new();
        for (name, plan) in plans {
            if let Some(column) = self.columns.get_mut(name) {
                touched.extend(plan.apply(column));
            }
        }
        debug!(columns = patches.len(), rows = touched.len(), "patched table");
        Ok(touched)
    }

    /// Replace columns with those of `data`.
    ///
    /// With `cols`, only the named columns are taken from `data`; otherwise
    /// the whole table is replaced.
    pub fn replace(&mut self, mut data: ColumnTable, cols: Option<&[String]>) {
        match cols {
            Some(cols) => {
                for name in cols {
                    if let Some(column) = data.columns.remove(name) {
                        self.columns.insert(name.clone(), column);
                    }
                }
            }
            None => *self = data,
        }
    }

    /// Encode as a JSON object, optionally moving typed arrays into `buffers`
    #[must_use]
    pub fn to_json(&self, mut buffers: Option<&mut Vec<BufferRef>>) -> Value {
        Value::Object(
            self.columns
                .iter()
                .map(|(name, column)| (name.clone(), encode_column(column, buffers.as_deref_mut())))
                .collect::<Map<_, _>>(),
        )
    }

    /// Decode a JSON object of columns
    pub fn from_json(value: &Value, buffers: &[BufferRef]) -> Result<Self> {
        let Value::Object(object) = value else {
            return Err(Error::UnsupportedData(format!("column data must be an object, got {value}")));
        };
        let columns = object
            .iter()
            .map(|(name, column)| Ok((name.clone(), decode_column(column, buffers)?)))
            .collect::<Result<BTreeMap<_, _>>>()?;
        Ok(Self { columns })
    }
}

impl<K: Into<String>, C: Into<Column>> FromIterator<(K, C)> for ColumnTable {
    fn from_iter<I: IntoIterator<Item = (K, C)>>(iter: I) -> Self {
        Self {
            columns: iter
                .into_iter()
                .map(|(name, column)| (name.into(), column.into()))
                .collect(),
        }
    }
}
