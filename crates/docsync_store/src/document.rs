//! Documents and document identifiers.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::borrow::Borrow;
use std::fmt;

/// Unique key of a document within a store.
///
/// Identifiers are opaque strings; the store never interprets them.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    /// Creates an identifier from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh random identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the identifier is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for DocumentId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl Borrow<str> for DocumentId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// A JSON document.
///
/// `revision` and `sequence` are owned by the store: a local save bumps the
/// revision and assigns the next sequence number, whatever values the caller
/// passed in. A deleted document is kept as a tombstone with no properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    id: DocumentId,
    #[serde(default)]
    properties: Map<String, Value>,
    #[serde(default)]
    revision: u64,
    #[serde(default)]
    sequence: u64,
    #[serde(default)]
    deleted: bool,
}

impl Document {
    /// Creates an empty document with the given identifier.
    pub fn new(id: impl Into<DocumentId>) -> Self {
        Self {
            id: id.into(),
            properties: Map::new(),
            revision: 0,
            sequence: 0,
            deleted: false,
        }
    }

    /// Creates an empty document with a generated identifier.
    #[must_use]
    pub fn with_generated_id() -> Self {
        Self::new(DocumentId::generate())
    }

    /// Creates a tombstone for the given identifier.
    pub fn tombstone(id: impl Into<DocumentId>, revision: u64) -> Self {
        Self {
            id: id.into(),
            properties: Map::new(),
            revision,
            sequence: 0,
            deleted: true,
        }
    }

    /// Returns the document identifier.
    pub fn id(&self) -> &DocumentId {
        &self.id
    }

    /// Returns all properties.
    pub fn properties(&self) -> &Map<String, Value> {
        &self.properties
    }

    /// Returns a single property.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// Returns a string property, if present and a string.
    pub fn string(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(Value::as_str)
    }

    /// Sets a property.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Sets a string property.
    pub fn set_string(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.set(key, Value::String(value.into()))
    }

    /// Builder form of [`Document::set_string`].
    #[must_use]
    pub fn with_string(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_string(key, value);
        self
    }

    /// Removes a property, returning its previous value.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.properties.remove(key)
    }

    /// Returns the revision number (0 for a never-saved document).
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Returns the store sequence of the last write (0 if never saved).
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Returns true if this is a tombstone.
    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    /// Sets the revision. Used when importing revisions produced elsewhere.
    #[must_use]
    pub fn with_revision(mut self, revision: u64) -> Self {
        self.revision = revision;
        self
    }

    /// Returns true if both documents carry the same revision and body.
    pub fn same_revision(&self, other: &Document) -> bool {
        self.revision == other.revision
            && self.deleted == other.deleted
            && self.properties == other.properties
    }

    pub(crate) fn stamp(&mut self, revision: u64, sequence: u64) {
        self.revision = revision;
        self.sequence = sequence;
    }

    pub(crate) fn mark_deleted(&mut self) {
        self.properties.clear();
        self.deleted = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_properties() {
        let mut doc = Document::new("doc-0");
        assert_eq!(doc.string("test-key"), None);

        doc.set_string("test-key", "create");
        assert_eq!(doc.string("test-key"), Some("create"));

        doc.set("count", 3);
        assert_eq!(doc.string("count"), None);
        assert_eq!(doc.get("count"), Some(&Value::from(3)));
    }

    #[test]
    fn generated_ids_are_unique() {
        let a = Document::with_generated_id();
        let b = Document::with_generated_id();
        assert_ne!(a.id(), b.id());
        assert!(!a.id().is_empty());
    }

    #[test]
    fn tombstone_has_no_body() {
        let doc = Document::tombstone("gone", 4);
        assert!(doc.is_deleted());
        assert_eq!(doc.revision(), 4);
        assert!(doc.properties().is_empty());
    }

    #[test]
    fn json_shape() {
        let doc: Document =
            serde_json::from_str(r#"{"id":"doc-1","properties":{"test-key":"create"}}"#).unwrap();
        assert_eq!(doc.id().as_str(), "doc-1");
        assert_eq!(doc.string("test-key"), Some("create"));
        assert_eq!(doc.revision(), 0);
        assert!(!doc.is_deleted());
    }

    #[test]
    fn id_borrows_as_str() {
        let mut set = std::collections::BTreeSet::new();
        set.insert(DocumentId::new("doc-2"));
        assert!(set.contains("doc-2"));
    }
}
