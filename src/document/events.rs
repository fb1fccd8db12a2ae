//! Document change events and their wire form.
//!
//! # Wire Format
//!
//! Every event encodes to a JSON object tagged with `kind`:
//!
//! ```text
//! ModelChanged      {kind, model: ref, attr, new}
//! ColumnDataChanged {kind, column_source: ref, new: columns, cols?}
//! ColumnsStreamed   {kind, column_source: ref, data: columns, rollover?}
//! ColumnsPatched    {kind, column_source: ref, patches: {column: [[index, value], ...]}}
//! RootAdded         {kind, model: ref}
//! RootRemoved       {kind, model: ref}
//! TitleChanged      {kind, title}
//! ```
//!
//! Events travel batched in `PATCH-DOC` messages whose content is
//! `{events: [...], references: [model definitions]}`.

use std::collections::BTreeMap;

use serde_json::{Map, Value, json};

use super::model::{Model, check_attr};
use super::value::{ObjectRef, PropValue, RefCollector, Resolve};
use crate::columns::{ColumnTable, Patch, decode_patch_values};
use crate::protocol::{BufferRef, Error, Message, MessageType, Result};

/// Options for encoding outgoing events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeOptions {
    /// Send typed arrays as attached binary buffers instead of inline base64
    pub binary_buffers: bool,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            binary_buffers: true,
        }
    }
}

/// Compact column-level description of a change to a data source's columns.
///
/// Attached to a [`DocumentEvent::ModelChanged`], it replaces the generic
/// attribute change on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnsHint {
    /// Columns replaced wholesale
    DataChanged {
        /// Replacement columns
        new: ColumnTable,
        /// Subset of columns to take from `new`
        cols: Option<Vec<String>>,
    },
    /// Rows appended
    Streamed {
        /// Rows to append, per column
        data: ColumnTable,
        /// Maximum retained length
        rollover: Option<usize>,
    },
    /// Cells overwritten
    Patched {
        /// Patches per column
        patches: BTreeMap<String, Vec<Patch>>,
    },
}

impl ColumnsHint {
    /// The standalone event this hint stands for
    #[must_use]
    pub fn into_event(self, column_source: ObjectRef) -> DocumentEvent {
        match self {
            Self::DataChanged { new, cols } => DocumentEvent::ColumnDataChanged {
                column_source,
                new,
                cols,
            },
            Self::Streamed { data, rollover } => DocumentEvent::ColumnsStreamed {
                column_source,
                data,
                rollover,
            },
            Self::Patched { patches } => DocumentEvent::ColumnsPatched {
                column_source,
                patches,
            },
        }
    }
}

/// A single replayable document mutation
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentEvent {
    /// A model attribute was assigned
    ModelChanged {
        /// Changed model
        model: ObjectRef,
        /// Attribute name; never the identity attribute
        attr: String,
        /// New value
        new: PropValue,
        /// Column-level form of the change, sent instead when present
        hint: Option<ColumnsHint>,
    },
    /// Columns of a data source were replaced
    ColumnDataChanged {
        /// Target data source
        column_source: ObjectRef,
        /// Replacement columns
        new: ColumnTable,
        /// Subset of columns to take from `new`
        cols: Option<Vec<String>>,
    },
    /// Rows were appended to a data source
    ColumnsStreamed {
        /// Target data source
        column_source: ObjectRef,
        /// Rows to append, per column
        data: ColumnTable,
        /// Maximum retained length
        rollover: Option<usize>,
    },
    /// Cells of a data source were overwritten
    ColumnsPatched {
        /// Target data source
        column_source: ObjectRef,
        /// Patches per column
        patches: BTreeMap<String, Vec<Patch>>,
    },
    /// A model became a document root
    RootAdded {
        /// New root
        model: ObjectRef,
    },
    /// A model stopped being a document root
    RootRemoved {
        /// Removed root
        model: ObjectRef,
    },
    /// The document title changed
    TitleChanged {
        /// New title
        title: String,
    },
}

impl DocumentEvent {
    /// Attribute change, rejecting the identity attribute
    pub fn model_changed(model: ObjectRef, attr: impl Into<String>, new: impl Into<PropValue>) -> Result<Self> {
        let attr = attr.into();
        check_attr(&attr)?;
        Ok(Self::ModelChanged {
            model,
            attr,
            new: new.into(),
            hint: None,
        })
    }

    /// Attach a column-level hint to an attribute change
    #[must_use]
    pub fn with_hint(mut self, columns: ColumnsHint) -> Self {
        if let Self::ModelChanged { hint, .. } = &mut self {
            *hint = Some(columns);
        }
        self
    }

    /// Wire `kind` tag
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::ModelChanged { .. } => "ModelChanged",
            Self::ColumnDataChanged { .. } => "ColumnDataChanged",
            Self::ColumnsStreamed { .. } => "ColumnsStreamed",
            Self::ColumnsPatched { .. } => "ColumnsPatched",
            Self::RootAdded { .. } => "RootAdded",
            Self::RootRemoved { .. } => "RootRemoved",
            Self::TitleChanged { .. } => "TitleChanged",
        }
    }

    /// Model the event targets, if any
    #[must_use]
    pub const fn target(&self) -> Option<&ObjectRef> {
        match self {
            Self::ModelChanged { model, .. } | Self::RootAdded { model } | Self::RootRemoved { model } => {
                Some(model)
            }
            Self::ColumnDataChanged { column_source, .. }
            | Self::ColumnsStreamed { column_source, .. }
            | Self::ColumnsPatched { column_source, .. } => Some(column_source),
            Self::TitleChanged { .. } => None,
        }
    }

    /// Encode as `(metadata, content)`, adding referenced models to `refs`.
    ///
    /// Typed arrays go to `buffers` when given, inline otherwise. A hinted
    /// attribute change encodes exactly as its hint.
    pub fn content_json(
        &self,
        refs: &mut RefCollector,
        buffers: Option<&mut Vec<BufferRef>>,
    ) -> Result<(Value, Value)> {
        let mut content = Map::new();
        content.insert("kind".to_owned(), self.kind().into());

        match self {
            Self::ModelChanged {
                model,
                hint: Some(hint),
                ..
            } => {
                return hint.clone().into_event(model.clone()).content_json(refs, buffers);
            }
            Self::ModelChanged {
                model,
                attr,
                new,
                hint: None,
            } => {
                check_attr(attr)?;
                // the changed model is already known to the peer
                let mut value_refs = RefCollector::new();
                value_refs.collect(new);
                value_refs.remove(&model.id);
                value_refs.into_iter().for_each(|r| refs.insert(r));

                content.insert("model".to_owned(), model.to_json());
                content.insert("attr".to_owned(), attr.as_str().into());
                content.insert("new".to_owned(), new.to_json());
            }
            Self::ColumnDataChanged {
                column_source,
                new,
                cols,
            } => {
                content.insert("column_source".to_owned(), column_source.to_json());
                content.insert("new".to_owned(), new.to_json(buffers));
                if let Some(cols) = cols {
                    content.insert("cols".to_owned(), json!(cols));
                }
            }
            Self::ColumnsStreamed {
                column_source,
                data,
                rollover,
            } => {
                content.insert("column_source".to_owned(), column_source.to_json());
                content.insert("data".to_owned(), data.to_json(buffers));
                if let Some(rollover) = rollover {
                    content.insert("rollover".to_owned(), json!(rollover));
                }
            }
            Self::ColumnsPatched {
                column_source,
                patches,
            } => {
                let patches: Map<String, Value> = patches
                    .iter()
                    .map(|(name, patches)| {
                        (name.clone(), Value::Array(patches.iter().map(Patch::to_json).collect()))
                    })
                    .collect();
                content.insert("column_source".to_owned(), column_source.to_json());
                content.insert("patches".to_owned(), Value::Object(patches));
            }
            Self::RootAdded { model } => {
                refs.insert(model.clone());
                content.insert("model".to_owned(), model.to_json());
            }
            Self::RootRemoved { model } => {
                content.insert("model".to_owned(), model.to_json());
            }
            Self::TitleChanged { title } => {
                content.insert("title".to_owned(), title.as_str().into());
            }
        }

        Ok((Value::Object(Map::new()), Value::Object(content)))
    }

    /// Decode one event object, resolving array buffers against `buffers`
    pub fn from_content(content: &Value, buffers: &[BufferRef]) -> Result<Self> {
        let kind = content
            .get("kind")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::InvalidEvent(format!("event without kind: {content}")))?;

        let event = match kind {
            "ModelChanged" => {
                let attr = str_field(content, "attr")?;
                check_attr(attr)?;
                Self::ModelChanged {
                    model: ref_field(content, "model")?,
                    attr: attr.to_owned(),
                    new: PropValue::from_json(field(content, "new")?),
                    hint: None,
                }
            }
            "ColumnDataChanged" => Self::ColumnDataChanged {
                column_source: ref_field(content, "column_source")?,
                new: ColumnTable::from_json(field(content, "new")?, buffers)?,
                cols: match content.get("cols") {
                    None | Some(Value::Null) => None,
                    Some(cols) => Some(serde_json::from_value(cols.clone())?),
                },
            },
            "ColumnsStreamed" => Self::ColumnsStreamed {
                column_source: ref_field(content, "column_source")?,
                data: ColumnTable::from_json(field(content, "data")?, buffers)?,
                rollover: match content.get("rollover") {
                    None | Some(Value::Null) => None,
                    Some(rollover) => Some(
                        rollover
                            .as_u64()
                            .and_then(|r| usize::try_from(r).ok())
                            .ok_or_else(|| Error::InvalidEvent(format!("invalid rollover {rollover}")))?,
                    ),
                },
            },
            "ColumnsPatched" => Self::ColumnsPatched {
                column_source: ref_field(content, "column_source")?,
                patches: decode_patches(field(content, "patches")?, buffers)?,
            },
            "RootAdded" => Self::RootAdded {
                model: ref_field(content, "model")?,
            },
            "RootRemoved" => Self::RootRemoved {
                model: ref_field(content, "model")?,
            },
            "TitleChanged" => Self::TitleChanged {
                title: str_field(content, "title")?.to_owned(),
            },
            other => return Err(Error::InvalidEvent(format!("unknown event kind {other:?}"))),
        };
        Ok(event)
    }

    /// Fold a following event into this one when the pair collapses to a
    /// single change. Returns whether `other` was absorbed.
    pub fn combine(&mut self, other: &Self) -> bool {
        match (self, other) {
            (
                Self::ModelChanged {
                    model,
                    attr,
                    new,
                    hint: None,
                },
                Self::ModelChanged {
                    model: other_model,
                    attr: other_attr,
                    new: other_new,
                    hint: None,
                },
            ) if model == other_model && attr == other_attr => {
                new.clone_from(other_new);
                true
            }
            (Self::TitleChanged { title }, Self::TitleChanged { title: other_title }) => {
                title.clone_from(other_title);
                true
            }
            _ => false,
        }
    }

    /// Wrap this event alone in a `PATCH-DOC` message
    pub fn to_message<R: Resolve + ?Sized>(&self, resolver: &R, options: EncodeOptions) -> Result<Message> {
        patch_doc_message(std::slice::from_ref(self), resolver, options)
    }
}

/// Build a `PATCH-DOC` message carrying `events` and the full definition of
/// every model they transitively reference that `resolver` knows.
pub fn patch_doc_message<R: Resolve + ?Sized>(
    events: &[DocumentEvent],
    resolver: &R,
    options: EncodeOptions,
) -> Result<Message> {
    let mut refs = RefCollector::new();
    let mut buffers = Vec::new();
    let mut contents = Vec::with_capacity(events.len());
    for event in events {
        let sink = options.binary_buffers.then_some(&mut buffers);
        let (_, content) = event.content_json(&mut refs, sink)?;
        contents.push(content);
    }

    refs.close_over(resolver);
    let references: Vec<Value> = refs
        .iter()
        .filter_map(|r| resolver.resolve(&r.id))
        .map(Model::to_json)
        .collect();

    let mut message = Message::create(
        MessageType::PatchDoc,
        json!({ "events": contents, "references": references }),
        Value::Object(Map::new()),
    );
    for (header, payload) in buffers {
        message.add_buffer(header, payload);
    }
    Ok(message)
}

fn field<'a>(content: &'a Value, name: &str) -> Result<&'a Value> {
    content
        .get(name)
        .ok_or_else(|| Error::InvalidEvent(format!("missing field {name:?}")))
}

fn str_field<'a>(content: &'a Value, name: &str) -> Result<&'a str> {
    field(content, name)?
        .as_str()
        .ok_or_else(|| Error::InvalidEvent(format!("field {name:?} must be a string")))
}

fn ref_field(content: &Value, name: &str) -> Result<ObjectRef> {
    let value = field(content, name)?;
    ObjectRef::from_json(value)
        .ok_or_else(|| Error::InvalidEvent(format!("field {name:?} is not a reference: {value}")))
}

fn decode_patches(value: &Value, buffers: &[BufferRef]) -> Result<BTreeMap<String, Vec<Patch>>> {
    let Value::Object(columns) = value else {
        return Err(Error::InvalidEvent(format!("patches must be an object, got {value}")));
    };

    columns
        .iter()
        .map(|(name, entries)| {
            let entries = entries
                .as_array()
                .ok_or_else(|| Error::InvalidPatch(format!("patches for {name:?} must be a list")))?;
            let patches = entries
                .iter()
                .map(|entry| decode_patch(entry, buffers))
                .collect::<Result<Vec<_>>>()?;
            Ok((name.clone(), patches))
        })
        .collect()
}

fn decode_patch(entry: &Value, buffers: &[BufferRef]) -> Result<Patch> {
    match entry.as_array().map(Vec::as_slice) {
        Some([index, value]) => {
            let value = decode_patch_values(value, buffers)?;
            Patch::from_json(&Value::Array(vec![index.clone(), value]))
        }
        _ => Patch::from_json(entry),
    }
}
