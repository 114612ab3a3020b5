//! Evaluation-context records.
//!
//! A [`Record`] is one row under evaluation: an insertion-ordered field map
//! plus named scope fragments. Scopes carry the rows joined in under their
//! aliases and, for correlated subqueries, the outer query's row keyed by
//! the outer table's name.

use std::rc::Rc;

use indexmap::IndexMap;

use crate::value::Value;

/// One row under evaluation.
#[derive(Debug, Clone, Default)]
pub struct Record {
    values: IndexMap<String, Value>,
    scopes: IndexMap<String, Rc<Record>>,
}

impl Record {
    /// Creates an empty record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a record from field pairs.
    #[must_use]
    pub fn from_pairs(pairs: impl IntoIterator<Item = (String, Value)>) -> Self {
        Self {
            values: pairs.into_iter().collect(),
            scopes: IndexMap::new(),
        }
    }

    /// Reads a field.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Reads a field through a scope.
    #[must_use]
    pub fn get_scoped(&self, scope: &str, name: &str) -> Option<&Value> {
        self.scopes.get(scope).and_then(|record| record.get(name))
    }

    /// Returns the scope fragment registered under `name`.
    #[must_use]
    pub fn scope(&self, name: &str) -> Option<&Rc<Record>> {
        self.scopes.get(name)
    }

    /// Whether a scope with this name exists.
    #[must_use]
    pub fn has_scope(&self, name: &str) -> bool {
        self.scopes.contains_key(name)
    }

    /// Writes a field.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    /// Registers a scope fragment. Existing names are replaced.
    pub fn add_scope(&mut self, name: impl Into<String>, record: Rc<Record>) {
        self.scopes.insert(name.into(), record);
    }

    /// Copies every scope of `other` into this record, keeping existing
    /// entries on collision.
    pub fn inherit_scopes(&mut self, other: &Record) {
        for (name, scope) in &other.scopes {
            self.scopes
                .entry(name.clone())
                .or_insert_with(|| Rc::clone(scope));
        }
    }

    /// Merges the fields of `other`, keeping existing fields on collision.
    pub fn merge_values(&mut self, other: &Record) {
        for (name, value) in &other.values {
            self.values
                .entry(name.clone())
                .or_insert_with(|| value.clone());
        }
    }

    /// A scope fragment holding just this record's fields.
    #[must_use]
    pub fn as_scope(&self) -> Rc<Record> {
        Rc::new(Self {
            values: self.values.clone(),
            scopes: IndexMap::new(),
        })
    }

    /// Iterates fields in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    /// Field names in insertion order.
    pub fn field_names(&self) -> impl Iterator<Item = &String> {
        self.values.keys()
    }

    /// Number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the record has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
