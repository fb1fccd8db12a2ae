//! Document model: typed models, column data sources and change events
//!
//! A [`Document`] owns a graph of [`Model`]s, the column tables of its data
//! sources and the list of root models. Local mutations are described as
//! [`DocumentEvent`]s, batched into `PATCH-DOC` messages for the peer, and
//! incoming `PATCH-DOC` messages are replayed through [`Document::apply`].

mod events;
mod model;
mod value;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, instrument};

pub use events::{ColumnsHint, DocumentEvent, EncodeOptions, patch_doc_message};
pub use model::{ID_ATTR, Model, ModelType, PropertyGroup, PropertyTable, check_attr};
pub use value::{ObjectRef, PropValue, RefCollector, RefVisitor, Resolve};

use crate::columns::ColumnTable;
use crate::protocol::{Error, Message, MessageType, Result};

/// Attribute holding the columns of a data source
pub const DATA_ATTR: &str = "data";

/// Rows touched by patches, per data source id
pub type TouchedRows = BTreeMap<String, BTreeSet<usize>>;

/// A synchronized document
#[derive(Debug, Clone, Default)]
pub struct Document {
    title: String,
    roots: Vec<String>,
    models: HashMap<String, Model>,
    types: HashMap<String, Arc<ModelType>>,
    sources: HashMap<String, ColumnTable>,
}

impl Document {
    /// Create an empty document
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a model type so definitions of it can be received
    pub fn register_type(&mut self, model_type: ModelType) -> Arc<ModelType> {
        let model_type = Arc::new(model_type);
        self.types
            .insert(model_type.name().to_owned(), Arc::clone(&model_type));
        model_type
    }

    /// Get a registered model type
    #[must_use]
    pub fn model_type(&self, name: &str) -> Option<&Arc<ModelType>> {
        self.types.get(name)
    }

    /// Add (or replace) a model and return a reference to it
    pub fn add_model(&mut self, model: Model) -> ObjectRef {
        let r = model.to_ref();
        self.models.insert(model.id().to_owned(), model);
        r
    }

    /// Attach column data to a model, making it a data source
    pub fn set_source(&mut self, id: &str, table: ColumnTable) -> Result<()> {
        self.require(id)?;
        self.sources.insert(id.to_owned(), table);
        Ok(())
    }

    /// Get a model
    #[must_use]
    pub fn model(&self, id: &str) -> Option<&Model> {
        self.models.get(id)
    }

    /// Get the columns of a data source
    #[must_use]
    pub fn source(&self, id: &str) -> Option<&ColumnTable> {
        self.sources.get(id)
    }

    /// Get title
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Ids of root models, in insertion order
    #[must_use]
    pub fn roots(&self) -> &[String] {
        &self.roots
    }

    /// Number of models
    #[must_use]
    pub fn len(&self) -> usize {
        self.models.len()
    }

    /// Whether the document holds no models
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Apply one event and return the rows it touched.
    ///
    /// Only patches report touched rows. Each event is applied entirely or
    /// not at all. An unhinted change to the `data` attribute of a data
    /// source replaces all of its columns.
    #[instrument(level = "debug", skip(self, event), fields(kind = event.kind()))]
    pub fn apply(&mut self, event: DocumentEvent) -> Result<BTreeSet<usize>> {
        match event {
            DocumentEvent::ModelChanged {
                model,
                hint: Some(hint),
                ..
            } => self.apply(hint.into_event(model)),
            DocumentEvent::ModelChanged {
                model,
                attr,
                new,
                hint: None,
            } => {
                if attr == DATA_ATTR && self.sources.contains_key(&model.id) {
                    let data = ColumnTable::from_json(&new.to_json(), &[])?;
                    self.source_mut(&model.id)?.replace(data, None);
                    return Ok(BTreeSet::new());
                }
                self.models
                    .get_mut(&model.id)
                    .ok_or(Error::UnknownModel(model.id))?
                    .set(&attr, new)?;
                Ok(BTreeSet::new())
            }
            DocumentEvent::ColumnDataChanged {
                column_source,
                new,
                cols,
            } => {
                self.source_mut(&column_source.id)?
                    .replace(new, cols.as_deref());
                Ok(BTreeSet::new())
            }
            DocumentEvent::ColumnsStreamed {
                column_source,
                data,
                rollover,
            } => {
                self.source_mut(&column_source.id)?.stream(data, rollover)?;
                Ok(BTreeSet::new())
            }
            DocumentEvent::ColumnsPatched {
                column_source,
                patches,
            } => self.source_mut(&column_source.id)?.patch(&patches),
            DocumentEvent::RootAdded { model } => {
                self.require(&model.id)?;
                if !self.roots.contains(&model.id) {
                    self.roots.push(model.id);
                }
                Ok(BTreeSet::new())
            }
            DocumentEvent::RootRemoved { model } => {
                let position = self
                    .roots
                    .iter()
                    .position(|id| *id == model.id)
                    .ok_or(Error::UnknownModel(model.id))?;
                self.roots.remove(position);
                Ok(BTreeSet::new())
            }
            DocumentEvent::TitleChanged { title } => {
                self.title = title;
                Ok(BTreeSet::new())
            }
        }
    }

    /// Batch `events` into one `PATCH-DOC` message with the definitions of
    /// every model they reference
    pub fn create_patch_message(&self, events: &[DocumentEvent], options: EncodeOptions) -> Result<Message> {
        patch_doc_message(events, self, options)
    }

    /// Replay a received `PATCH-DOC` message.
    ///
    /// Every event is decoded before anything changes. Referenced model
    /// definitions are then upserted and the events applied in order; an
    /// event that fails to apply stops the replay, leaving earlier events
    /// applied. Returns the rows touched in each patched data source.
    pub fn apply_patch_message(&mut self, message: &Message) -> Result<TouchedRows> {
        if message.message_type() != Some(MessageType::PatchDoc) {
            return Err(Error::InvalidEvent(format!(
                "expected a PATCH-DOC message, got {:?}",
                message.msgtype()
            )));
        }
        if !message.complete() {
            return Err(Error::IncompleteMessage);
        }
        let content = message.content().ok_or(Error::IncompleteMessage)?;

        let events = content
            .get("events")
            .and_then(Value::as_array)
            .ok_or_else(|| Error::InvalidEvent("PATCH-DOC without events".to_owned()))?
            .iter()
            .map(|event| DocumentEvent::from_content(event, message.buffers()))
            .collect::<Result<Vec<_>>>()?;

        if let Some(references) = content.get("references").and_then(Value::as_array) {
            for definition in references {
                self.upsert_definition(definition)?;
            }
        }

        let mut touched = TouchedRows::new();
        for event in events {
            let patched = match &event {
                DocumentEvent::ColumnsPatched { column_source, .. } => Some(column_source.id.clone()),
                _ => None,
            };
            let rows = self.apply(event)?;
            if let Some(id) = patched {
                touched.entry(id).or_default().extend(rows);
            }
        }
        debug!(sources = touched.len(), "applied PATCH-DOC");
        Ok(touched)
    }

    /// Create or update a model from its `{"id", "type", "attributes"}`
    /// definition
    pub fn upsert_definition(&mut self, definition: &Value) -> Result<ObjectRef> {
        let id = definition_text(definition, "id")?;
        let type_name = definition_text(definition, "type")?;

        let mut model = match self.models.get(id) {
            Some(existing) => existing.clone(),
            None => {
                let model_type = self
                    .types
                    .get(type_name)
                    .ok_or_else(|| Error::UnknownModelType(type_name.to_owned()))?;
                Model::new(id, Arc::clone(model_type))
            }
        };

        if let Some(attributes) = definition.get("attributes").and_then(Value::as_object) {
            for (attr, value) in attributes {
                model.set(attr, PropValue::from_json(value))?;
            }
        }
        Ok(self.add_model(model))
    }

    fn require(&self, id: &str) -> Result<&Model> {
        self.models
            .get(id)
            .ok_or_else(|| Error::UnknownModel(id.to_owned()))
    }

    fn source_mut(&mut self, id: &str) -> Result<&mut ColumnTable> {
        self.require(id)?;
        Ok(self.sources.entry(id.to_owned()).or_default())
    }
}

fn definition_text<'a>(definition: &'a Value, name: &str) -> Result<&'a str> {
    definition
        .get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| Error::InvalidEvent(format!("model definition without {name}: {definition}")))
}

impl Resolve for Document {
    fn resolve(&self, id: &str) -> Option<&Model> {
        self.models.get(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::columns::{Column, DType, Patch, Slice};
    use serde_json::json;

    fn document() -> Document {
        let mut doc = Document::new();
        let base = PropertyGroup::new("Model").with("name", PropValue::Null);
        let source = PropertyGroup::new("DataSource").with("selected", PropValue::Null);
        let plot = PropertyGroup::new("Plot")
            .with("source", PropValue::Null)
            .with("width", 600_i64);

        let cds = doc.register_type(ModelType::new("ColumnDataSource", [&base, &source]));
        let plot = doc.register_type(ModelType::new("Plot", [&base, &plot]));
        doc.register_type(ModelType::new("Selection", [&base]));

        doc.add_model(Model::new("cds1", cds));
        let mut p = Model::new("p1", plot);
        p.set("source", ObjectRef::new("cds1", "ColumnDataSource")).unwrap();
        doc.add_model(p);

        doc.set_source(
            "cds1",
            ColumnTable::from_iter([("x", Column::typed(DType::Float64, &[10.0, 20.0, 30.0, 40.0]))]),
        )
        .unwrap();
        doc
    }

    fn cds() -> ObjectRef {
        ObjectRef::new("cds1", "ColumnDataSource")
    }

    #[test]
    fn test_apply_patch_reports_rows() {
        let mut doc = document();
        let touched = doc
            .apply(DocumentEvent::ColumnsPatched {
                column_source: cds(),
                patches: BTreeMap::from([(
                    "x".to_owned(),
                    vec![Patch::range(Slice::range(1, 3), vec![json!(7), json!(8)])],
                )]),
            })
            .unwrap();

        assert_eq!(touched, BTreeSet::from([1, 2]));
        assert_eq!(
            doc.source("cds1").and_then(|t| t.get("x")),
            Some(&Column::typed(DType::Float64, &[10.0, 7.0, 8.0, 40.0]))
        );
    }

    #[test]
    fn test_apply_hinted_change_streams() {
        let mut doc = document();
        let event = DocumentEvent::model_changed(cds(), "name", PropValue::Null)
            .unwrap()
            .with_hint(ColumnsHint::Streamed {
                data: ColumnTable::from_iter([("x", Column::from_values([json!(50)]))]),
                rollover: Some(4),
            });
        doc.apply(event).unwrap();
        assert_eq!(
            doc.source("cds1").and_then(|t| t.get("x")),
            Some(&Column::typed(DType::Float64, &[20.0, 30.0, 40.0, 50.0]))
        );
    }

    #[test]
    fn test_unhinted_data_change_replaces_columns() {
        let mut doc = document();
        let data = PropValue::from_json(&json!({"y": [1, 2], "z": ["a", "b"]}));
        doc.apply(DocumentEvent::model_changed(cds(), DATA_ATTR, data).unwrap())
            .unwrap();

        let table = doc.source("cds1").unwrap();
        assert_eq!(table.names().collect::<Vec<_>>(), ["y", "z"]);
        assert_eq!(table.get("y"), Some(&Column::from_values([json!(1), json!(2)])));
        assert!(table.get("x").is_none());
    }

    #[test]
    fn test_unhinted_data_change_needs_a_source() {
        let mut doc = document();
        let err = doc
            .apply(
                DocumentEvent::model_changed(ObjectRef::new("p1", "Plot"), DATA_ATTR, PropValue::Null)
                    .unwrap(),
            )
            .unwrap_err();
        assert!(matches!(err, Error::UnknownProperty { .. }));
    }

    #[test]
    fn test_roots_and_title() {
        let mut doc = document();
        doc.apply(DocumentEvent::RootAdded {
            model: ObjectRef::new("p1", "Plot"),
        })
        .unwrap();
        doc.apply(DocumentEvent::RootAdded {
            model: ObjectRef::new("p1", "Plot"),
        })
        .unwrap();
        assert_eq!(doc.roots(), ["p1"]);

        doc.apply(DocumentEvent::RootRemoved {
            model: ObjectRef::new("p1", "Plot"),
        })
        .unwrap();
        assert!(doc.roots().is_empty());
        assert!(
            doc.apply(DocumentEvent::RootRemoved {
                model: ObjectRef::new("p1", "Plot"),
            })
            .is_err()
        );

        doc.apply(DocumentEvent::TitleChanged {
            title: "Sales".to_owned(),
        })
        .unwrap();
        assert_eq!(doc.title(), "Sales");
    }

    #[test]
    fn test_unknown_model() {
        let mut doc = document();
        let err = doc
            .apply(DocumentEvent::ColumnsStreamed {
                column_source: ObjectRef::new("missing", "ColumnDataSource"),
                data: ColumnTable::new(),
                rollover: None,
            })
            .unwrap_err();
        assert!(matches!(err, Error::UnknownModel(id) if id == "missing"));
    }

    #[test]
    fn test_patch_message_includes_references() {
        let doc = document();
        let event = DocumentEvent::RootAdded {
            model: ObjectRef::new("p1", "Plot"),
        };
        let message = doc.create_patch_message(&[event], EncodeOptions::default()).unwrap();

        assert_eq!(message.msgtype(), Some("PATCH-DOC"));
        let content = message.content().unwrap();
        let ids: Vec<_> = content["references"]
            .as_array()
            .unwrap()
            .iter()
            .map(|d| d["id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, ["cds1", "p1"]);
    }

    #[test]
    fn test_apply_patch_message_between_documents() {
        let sender = document();
        let mut receiver = document();

        let events = [
            DocumentEvent::ColumnsStreamed {
                column_source: cds(),
                data: ColumnTable::from_iter([("x", Column::typed(DType::Float64, &[50.0]))]),
                rollover: None,
            },
            DocumentEvent::ColumnsPatched {
                column_source: cds(),
                patches: BTreeMap::from([("x".to_owned(), vec![Patch::scalar(-1, json!(99))])]),
            },
            DocumentEvent::model_changed(ObjectRef::new("p1", "Plot"), "width", 800_i64).unwrap(),
        ];
        let message = sender
            .create_patch_message(&events, EncodeOptions::default())
            .unwrap();
        assert_eq!(message.num_buffers(), 1);

        let touched = receiver.apply_patch_message(&message).unwrap();
        assert_eq!(touched.get("cds1"), Some(&BTreeSet::from([4])));
        assert_eq!(
            receiver.source("cds1").and_then(|t| t.get("x")),
            Some(&Column::typed(DType::Float64, &[10.0, 20.0, 30.0, 40.0, 99.0]))
        );
        assert_eq!(
            receiver.model("p1").unwrap().get("width").unwrap(),
            &PropValue::from(800_i64)
        );
    }

    #[test]
    fn test_upsert_unknown_type() {
        let mut doc = document();
        let err = doc
            .upsert_definition(&json!({"id": "z", "type": "Nope", "attributes": {}}))
            .unwrap_err();
        assert!(matches!(err, Error::UnknownModelType(name) if name == "Nope"));
    }

    #[test]
    fn test_rejects_other_message_types() {
        let mut doc = document();
        let message = Message::create(MessageType::Ok, json!({}), json!({}));
        assert!(matches!(
            doc.apply_patch_message(&message),
            Err(Error::InvalidEvent(_))
        ));
    }
}
