//! Loaded records and their relation graph.

use std::cell::{Ref, RefCell, RefMut};
use std::collections::HashSet;
use std::rc::Rc;

use indexmap::{IndexMap, IndexSet};
use serde_json::{Map, Value};

use super::ModelRegistry;

/// A single loaded row with its eager-loaded relations.
#[derive(Debug, Clone, Default)]
pub struct Record {
    model: String,
    attributes: Map<String, Value>,
    hidden: IndexSet<String>,
    appends: IndexSet<String>,
    relations: IndexMap<String, Loaded>,
}

/// A loaded relation value.
#[derive(Debug, Clone)]
pub enum Loaded {
    One(Option<RecordHandle>),
    Many(Vec<RecordHandle>),
}

impl Loaded {
    /// Every record held by the relation.
    pub fn records(&self) -> Vec<RecordHandle> {
        match self {
            Loaded::One(Some(record)) => vec![record.clone()],
            Loaded::One(None) => Vec::new(),
            Loaded::Many(records) => records.clone(),
        }
    }
}

impl Record {
    pub fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
            ..Self::default()
        }
    }

    /// Build from a JSON object; non-object values produce an empty record.
    pub fn from_json(model: &str, value: Value) -> Self {
        let attributes = match value {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            model: model.to_string(),
            attributes,
            ..Self::default()
        }
    }

    pub fn with(mut self, name: &str, value: Value) -> Self {
        self.attributes.insert(name.to_string(), value);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    pub fn set_attribute(&mut self, name: &str, value: Value) {
        self.attributes.insert(name.to_string(), value);
    }

    pub fn attributes(&self) -> &Map<String, Value> {
        &self.attributes
    }

    pub fn set_relation(&mut self, name: &str, value: Loaded) {
        self.relations.insert(name.to_string(), value);
    }

    pub fn relation(&self, name: &str) -> Option<&Loaded> {
        self.relations.get(name)
    }

    pub fn relations(&self) -> &IndexMap<String, Loaded> {
        &self.relations
    }

    pub fn unset_relation(&mut self, name: &str) -> Option<Loaded> {
        self.relations.shift_remove(name)
    }

    /// Hide every attribute not named in `visible`. Relations are untouched.
    pub fn set_visible<'a>(&mut self, visible: impl IntoIterator<Item = &'a String>) {
        let visible: HashSet<&String> = visible.into_iter().collect();
        let hidden: Vec<String> = self
            .attributes
            .keys()
            .filter(|key| !visible.contains(key))
            .cloned()
            .collect();
        self.hidden.extend(hidden);
    }

    pub fn make_hidden(&mut self, name: &str) {
        self.hidden.insert(name.to_string());
    }

    pub fn is_hidden(&self, name: &str) -> bool {
        self.hidden.contains(name)
    }

    /// Attributes that survive hiding.
    pub fn visible_attributes(&self) -> Map<String, Value> {
        self.attributes
            .iter()
            .filter(|(key, _)| !self.hidden.contains(*key))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    /// Request computed attributes on serialization.
    pub fn append<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.appends.extend(names.into_iter().map(Into::into));
    }

    pub fn appends(&self) -> &IndexSet<String> {
        &self.appends
    }

    /// Serialize visible attributes, computed appends and loaded relations.
    ///
    /// A relation pointing back at a record already being serialized on the
    /// current path renders as `null`.
    pub fn to_json(&self, registry: &ModelRegistry) -> Value {
        let mut path = Vec::new();
        self.render(registry, &mut path)
    }

    fn render(&self, registry: &ModelRegistry, path: &mut Vec<usize>) -> Value {
        let mut out = self.visible_attributes();

        let descriptor = registry.get(&self.model);
        let defaults = descriptor.map(|d| d.appends()).unwrap_or_default();
        for name in defaults.iter().chain(self.appends.iter()) {
            if out.contains_key(name) {
                continue;
            }
            let value = descriptor
                .and_then(|d| d.get_accessor(name))
                .map(|accessor| accessor(self))
                .unwrap_or(Value::Null);
            out.insert(name.clone(), value);
        }

        for (name, loaded) in &self.relations {
            let value = match loaded {
                Loaded::One(None) => Value::Null,
                Loaded::One(Some(record)) => record.render(registry, path),
                Loaded::Many(records) => {
                    Value::Array(records.iter().map(|r| r.render(registry, path)).collect())
                }
            };
            out.insert(name.clone(), value);
        }

        Value::Object(out)
    }
}

/// Shared, mutable handle to a record.
///
/// Several relation paths may hold the same handle; identity is the
/// allocation, not the record's contents.
#[derive(Debug, Clone)]
pub struct RecordHandle(Rc<RefCell<Record>>);

impl RecordHandle {
    pub fn new(record: Record) -> Self {
        Self(Rc::new(RefCell::new(record)))
    }

    pub fn borrow(&self) -> Ref<'_, Record> {
        self.0.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, Record> {
        self.0.borrow_mut()
    }

    /// Identity of the underlying allocation.
    pub fn id(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }

    pub fn ptr_eq(&self, other: &RecordHandle) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Deep copy: the new handle and every related record are fresh
    /// allocations. Shared records stay shared within the copy.
    pub fn deep_clone(&self) -> RecordHandle {
        let mut copies = std::collections::HashMap::new();
        self.deep_clone_with(&mut copies)
    }

    fn deep_clone_with(&self, copies: &mut std::collections::HashMap<usize, RecordHandle>) -> RecordHandle {
        if let Some(copy) = copies.get(&self.id()) {
            return copy.clone();
        }

        let source = self.borrow();
        let copy = RecordHandle::new(Record {
            relations: IndexMap::new(),
            ..source.clone()
        });
        copies.insert(self.id(), copy.clone());

        for (name, loaded) in &source.relations {
            let cloned = match loaded {
                Loaded::One(record) => Loaded::One(record.as_ref().map(|r| r.deep_clone_with(copies))),
                Loaded::Many(records) => {
                    Loaded::Many(records.iter().map(|r| r.deep_clone_with(copies)).collect())
                }
            };
            copy.borrow_mut().set_relation(name, cloned);
        }
        copy
    }

    pub fn to_json(&self, registry: &ModelRegistry) -> Value {
        let mut path = Vec::new();
        self.render(registry, &mut path)
    }

    fn render(&self, registry: &ModelRegistry, path: &mut Vec<usize>) -> Value {
        if path.contains(&self.id()) {
            return Value::Null;
        }
        path.push(self.id());
        let value = self.borrow().render(registry, path);
        path.pop();
        value
    }
}

impl From<Record> for RecordHandle {
    fn from(record: Record) -> Self {
        RecordHandle::new(record)
    }
}
