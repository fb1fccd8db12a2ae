//! Property values and reference discovery.
//!
//! Property values form a closed shape: primitives, references to other
//! models, and lists or maps of those. Reference discovery is a visitor walk
//! over that shape, so it never depends on the runtime layout of a model.

use std::collections::{BTreeMap, btree_map};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use super::model::Model;

/// Lightweight `(id, type)` pointer to a model elsewhere in the document
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectRef {
    /// Model id
    pub id: String,
    /// Model type name
    #[serde(rename = "type")]
    pub type_name: String,
}

impl ObjectRef {
    /// Create a reference
    #[must_use]
    pub fn new(id: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            type_name: type_name.into(),
        }
    }

    /// Wire form `{"id": ..., "type": ...}`
    #[must_use]
    pub fn to_json(&self) -> Value {
        serde_json::json!({ "id": self.id, "type": self.type_name })
    }

    /// Parse the wire form; any other object is not a reference
    #[must_use]
    pub fn from_json(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        if object.len() != 2 {
            return None;
        }
        Some(Self::new(
            object.get("id")?.as_str()?,
            object.get("type")?.as_str()?,
        ))
    }
}

/// A model property value
#[derive(Debug, Clone, Default, PartialEq)]
pub enum PropValue {
    /// Absent value
    #[default]
    Null,
    /// Boolean
    Bool(bool),
    /// Number, integer or float
    Number(Number),
    /// String
    String(String),
    /// Reference to another model
    Ref(ObjectRef),
    /// Sequence of values
    List(Vec<PropValue>),
    /// String-keyed mapping of values
    Map(BTreeMap<String, PropValue>),
}

impl PropValue {
    /// Walk every reference reachable from this value
    pub fn visit_refs<V: RefVisitor + ?Sized>(&self, visitor: &mut V) {
        match self {
            Self::Ref(r) => visitor.visit_ref(r),
            Self::List(items) => items.iter().for_each(|item| item.visit_refs(visitor)),
            Self::Map(entries) => entries.values().for_each(|item| item.visit_refs(visitor)),
            Self::Null | Self::Bool(_) | Self::Number(_) | Self::String(_) => {}
        }
    }

    /// Get the reference, if this value is one
    #[must_use]
    pub const fn as_object_ref(&self) -> Option<&ObjectRef> {
        match self {
            Self::Ref(r) => Some(r),
            _ => None,
        }
    }

    /// JSON wire form
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Number(n) => Value::Number(n.clone()),
            Self::String(s) => Value::String(s.clone()),
            Self::Ref(r) => r.to_json(),
            Self::List(items) => Value::Array(items.iter().map(Self::to_json).collect()),
            Self::Map(entries) => Value::Object(
                entries
                    .iter()
                    .map(|(key, value)| (key.clone(), value.to_json()))
                    .collect::<Map<_, _>>(),
            ),
        }
    }

    /// Parse the JSON wire form; `{"id", "type"}` objects become references
    #[must_use]
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(*b),
            Value::Number(n) => Self::Number(n.clone()),
            Value::String(s) => Self::String(s.clone()),
            Value::Array(items) => Self::List(items.iter().map(Self::from_json).collect()),
            Value::Object(entries) => match ObjectRef::from_json(value) {
                Some(r) => Self::Ref(r),
                None => Self::Map(
                    entries
                        .iter()
                        .map(|(key, value)| (key.clone(), Self::from_json(value)))
                        .collect(),
                ),
            },
        }
    }
}

impl From<bool> for PropValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for PropValue {
    fn from(n: i64) -> Self {
        Self::Number(n.into())
    }
}

impl From<f64> for PropValue {
    fn from(n: f64) -> Self {
        Number::from_f64(n).map_or(Self::Null, Self::Number)
    }
}

impl From<&str> for PropValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_owned())
    }
}

impl From<String> for PropValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<ObjectRef> for PropValue {
    fn from(r: ObjectRef) -> Self {
        Self::Ref(r)
    }
}

impl From<Vec<PropValue>> for PropValue {
    fn from(items: Vec<PropValue>) -> Self {
        Self::List(items)
    }
}

/// Callback for each reference found while walking values
pub trait RefVisitor {
    /// Called once per reference occurrence
    fn visit_ref(&mut self, r: &ObjectRef);
}

/// Look up models by id
pub trait Resolve {
    /// Get the model with `id`, if known
    fn resolve(&self, id: &str) -> Option<&Model>;
}

/// Set of references, keyed and ordered by id
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefCollector {
    refs: BTreeMap<String, ObjectRef>,
}

impl RefCollector {
    /// Create an empty collector
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one reference
    pub fn insert(&mut self, r: ObjectRef) {
        self.refs.entry(r.id.clone()).or_insert(r);
    }

    /// Add every reference reachable from `value`
    pub fn collect(&mut self, value: &PropValue) {
        value.visit_refs(self);
    }

    /// Drop the reference with `id`
    pub fn remove(&mut self, id: &str) -> Option<ObjectRef> {
        self.refs.remove(id)
    }

    /// Whether a reference with `id` was collected
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.refs.contains_key(id)
    }

    /// Number of distinct references
    #[must_use]
    pub fn len(&self) -> usize {
        self.refs.len()
    }

    /// Whether nothing was collected
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    /// Collected references, ordered by id
    pub fn iter(&self) -> impl Iterator<Item = &ObjectRef> {
        self.refs.values()
    }

    /// Extend with every model transitively reachable through `resolver`.
    ///
    /// References the resolver does not know stay in the set but are not
    /// followed.
    pub fn close_over<R: Resolve + ?Sized>(&mut self, resolver: &R) {
        let mut pending: Vec<String> = self.refs.keys().cloned().collect();
        while let Some(id) = pending.pop() {
            let Some(model) = resolver.resolve(&id) else {
                continue;
            };
            let mut found = Self::new();
            model.visit_refs(&mut found);
            for (id, r) in found.refs {
                if let btree_map::Entry::Vacant(entry) = self.refs.entry(id) {
                    pending.push(entry.key().clone());
                    entry.insert(r);
                }
            }
        }
    }
}

impl RefVisitor for RefCollector {
    fn visit_ref(&mut self, r: &ObjectRef) {
        if !self.refs.contains_key(&r.id) {
            self.insert(r.clone());
        }
    }
}

impl IntoIterator for RefCollector {
    type Item = ObjectRef;
    type IntoIter = btree_map::IntoValues<String, ObjectRef>;

    fn into_iter(self) -> Self::IntoIter {
        self.refs.into_values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ref_detection() {
        let value = PropValue::from_json(&json!({"id": "p1", "type": "Range1d"}));
        assert_eq!(value, PropValue::Ref(ObjectRef::new("p1", "Range1d")));

        // extra keys make it a plain map
        let value = PropValue::from_json(&json!({"id": "p1", "type": "Range1d", "x": 1}));
        assert!(matches!(value, PropValue::Map(_)));
    }

    #[test]
    fn test_json_round_trip() {
        let wire = json!([1, 2.5, "s", null, true, {"a": {"id": "p2", "type": "T"}}]);
        assert_eq!(PropValue::from_json(&wire).to_json(), wire);
    }

    #[test]
    fn test_collect_nested_refs() {
        let value = PropValue::from_json(&json!({
            "renderers": [{"id": "a", "type": "GlyphRenderer"}, {"id": "b", "type": "GlyphRenderer"}],
            "x_range": {"id": "a", "type": "GlyphRenderer"},
            "title": "plot",
        }));
        let mut refs = RefCollector::new();
        refs.collect(&value);

        let ids: Vec<_> = refs.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["a", "b"]);
    }

    struct Counter(usize);

    impl RefVisitor for Counter {
        fn visit_ref(&mut self, _: &ObjectRef) {
            self.0 += 1;
        }
    }

    #[test]
    fn test_visitor_sees_every_occurrence() {
        let r = PropValue::Ref(ObjectRef::new("x", "T"));
        let value = PropValue::List(vec![r.clone(), PropValue::List(vec![r]), PropValue::Null]);
        let mut counter = Counter(0);
        value.visit_refs(&mut counter);
        assert_eq!(counter.0, 2);
    }
}
