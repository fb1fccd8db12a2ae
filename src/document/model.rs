//! Typed models and their property tables.
//!
//! A model type's properties come from named [`PropertyGroup`]s merged once,
//! when the type is built, into an immutable [`PropertyTable`]. Models share
//! their type through an `Arc` and store only the values explicitly set.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{Map, Value, json};

use super::value::{ObjectRef, PropValue, RefVisitor};
use crate::protocol::{Error, Result, generate_id};

/// Attribute that holds a model's identity; never settable
pub const ID_ATTR: &str = "id";

/// Named set of properties with their defaults
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyGroup {
    name: String,
    properties: Vec<(String, PropValue)>,
}

impl PropertyGroup {
    /// Create an empty group
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: Vec::new(),
        }
    }

    /// Add a property with its default value
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, default: impl Into<PropValue>) -> Self {
        self.properties.push((name.into(), default.into()));
        self
    }

    /// Get group name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Merged, read-only property declarations of one model type
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertyTable {
    defaults: BTreeMap<String, PropValue>,
}

impl PropertyTable {
    /// Merge groups in order; a later group overrides an earlier default
    #[must_use]
    pub fn merge<'a>(groups: impl IntoIterator<Item = &'a PropertyGroup>) -> Self {
        let mut defaults = BTreeMap::new();
        for group in groups {
            for (name, default) in &group.properties {
                defaults.insert(name.clone(), default.clone());
            }
        }
        Self { defaults }
    }

    /// Whether `attr` is declared
    #[must_use]
    pub fn contains(&self, attr: &str) -> bool {
        self.defaults.contains_key(attr)
    }

    /// Default value of `attr`
    #[must_use]
    pub fn default_of(&self, attr: &str) -> Option<&PropValue> {
        self.defaults.get(attr)
    }

    /// Declared property names, sorted
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.defaults.keys().map(String::as_str)
    }

    /// Number of declared properties
    #[must_use]
    pub fn len(&self) -> usize {
        self.defaults.len()
    }

    /// Whether nothing is declared
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.defaults.is_empty()
    }
}

/// A model type: name plus property table
#[derive(Debug, Clone, PartialEq)]
pub struct ModelType {
    name: String,
    table: PropertyTable,
}

impl ModelType {
    /// Build a type from property groups
    #[must_use]
    pub fn new<'a>(name: impl Into<String>, groups: impl IntoIterator<Item = &'a PropertyGroup>) -> Self {
        Self {
            name: name.into(),
            table: PropertyTable::merge(groups),
        }
    }

    /// Get type name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get property table
    #[must_use]
    pub const fn table(&self) -> &PropertyTable {
        &self.table
    }
}

/// One object of the document graph
#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    id: String,
    model_type: Arc<ModelType>,
    values: BTreeMap<String, PropValue>,
}

impl Model {
    /// Create a model with explicit id and every property at its default
    #[must_use]
    pub fn new(id: impl Into<String>, model_type: Arc<ModelType>) -> Self {
        Self {
            id: id.into(),
            model_type,
            values: BTreeMap::new(),
        }
    }

    /// Create a model with a generated unique id
    #[must_use]
    pub fn with_generated_id(model_type: Arc<ModelType>) -> Self {
        Self::new(generate_id(), model_type)
    }

    /// Get id
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Get type name
    #[must_use]
    pub fn type_name(&self) -> &str {
        self.model_type.name()
    }

    /// Get model type
    #[must_use]
    pub fn model_type(&self) -> &Arc<ModelType> {
        &self.model_type
    }

    /// Reference to this model
    #[must_use]
    pub fn to_ref(&self) -> ObjectRef {
        ObjectRef::new(self.id.clone(), self.type_name())
    }

    /// Current value of `attr`, falling back to the declared default
    pub fn get(&self, attr: &str) -> Result<&PropValue> {
        self.values
            .get(attr)
            .or_else(|| self.model_type.table.default_of(attr))
            .ok_or_else(|| self.unknown(attr))
    }

    /// Set `attr`, returning the previous explicit value.
    ///
    /// Fails for the identity attribute and for undeclared attributes.
    pub fn set(&mut self, attr: &str, value: impl Into<PropValue>) -> Result<Option<PropValue>> {
        check_attr(attr)?;
        if !self.model_type.table.contains(attr) {
            return Err(self.unknown(attr));
        }
        Ok(self.values.insert(attr.to_owned(), value.into()))
    }

    /// Walk references held by every property, defaults included
    pub fn visit_refs<V: RefVisitor + ?Sized>(&self, visitor: &mut V) {
        for name in self.model_type.table.names() {
            if let Ok(value) = self.get(name) {
                value.visit_refs(visitor);
            }
        }
    }

    /// Full definition `{"id", "type", "attributes"}`; only explicitly set
    /// attributes are included
    #[must_use]
    pub fn to_json(&self) -> Value {
        let attributes: Map<String, Value> = self
            .values
            .iter()
            .map(|(name, value)| (name.clone(), value.to_json()))
            .collect();
        json!({ "id": self.id, "type": self.type_name(), "attributes": attributes })
    }

    fn unknown(&self, attr: &str) -> Error {
        Error::UnknownProperty {
            model_type: self.type_name().to_owned(),
            attr: attr.to_owned(),
        }
    }
}

/// Reject the identity attribute as a change target
pub fn check_attr(attr: &str) -> Result<()> {
    if attr == ID_ATTR {
        Err(Error::IdentityMutation {
            attr: attr.to_owned(),
        })
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::RefCollector;

    fn range_type() -> Arc<ModelType> {
        let base = PropertyGroup::new("Model").with("name", PropValue::Null);
        let range = PropertyGroup::new("Range").with("start", 0_i64).with("end", 1_i64);
        Arc::new(ModelType::new("Range1d", [&base, &range]))
    }

    #[test]
    fn test_merge_overrides_defaults() {
        let a = PropertyGroup::new("A").with("x", 1_i64).with("y", 2_i64);
        let b = PropertyGroup::new("B").with("y", 3_i64);
        let table = PropertyTable::merge([&a, &b]);

        assert_eq!(table.len(), 2);
        assert_eq!(table.default_of("y"), Some(&PropValue::from(3_i64)));
    }

    #[test]
    fn test_get_and_set() {
        let mut model = Model::new("r1", range_type());
        assert_eq!(model.get("end").unwrap(), &PropValue::from(1_i64));

        assert_eq!(model.set("end", 10_i64).unwrap(), None);
        assert_eq!(model.get("end").unwrap(), &PropValue::from(10_i64));
        assert_eq!(model.to_json()["attributes"], json!({"end": 10}));
    }

    #[test]
    fn test_identity_is_not_settable() {
        let mut model = Model::new("r1", range_type());
        assert!(matches!(
            model.set("id", "r2"),
            Err(Error::IdentityMutation { attr }) if attr == "id"
        ));
        assert_eq!(model.id(), "r1");
    }

    #[test]
    fn test_unknown_property() {
        let mut model = Model::new("r1", range_type());
        assert!(matches!(model.set("nope", 1_i64), Err(Error::UnknownProperty { .. })));
        assert!(model.get("nope").is_err());
    }

    #[test]
    fn test_visit_refs_includes_set_values() {
        let group = PropertyGroup::new("Plot").with("x_range", PropValue::Null);
        let plot_type = Arc::new(ModelType::new("Plot", [&group]));
        let mut plot = Model::new("p1", plot_type);
        plot.set("x_range", ObjectRef::new("r1", "Range1d")).unwrap();

        let mut refs = RefCollector::new();
        plot.visit_refs(&mut refs);
        assert!(refs.contains("r1"));
    }
}
