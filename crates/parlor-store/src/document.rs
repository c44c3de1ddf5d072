//! Document and snapshot types exchanged with a [`DocumentStore`](crate::DocumentStore).

use serde_json::Value;

use crate::update::FieldUpdate;

/// A JSON object of document fields.
pub type Fields = serde_json::Map<String, Value>;

/// A stored document.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Store-assigned (or caller-chosen, for `put`) document id.
    pub id: String,
    /// Creation order within the store. Breaks ties between equal sort keys.
    pub seq: u64,
    /// Always a JSON object.
    pub fields: Value,
}

impl Document {
    /// Look up a (possibly dotted) field path, e.g. `lastMessage.text`.
    pub fn get(&self, path: &str) -> Option<&Value> {
        lookup(&self.fields, path)
    }
}

pub(crate) fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(value, |current, segment| current.as_object()?.get(segment))
}

/// The complete result set of a live query at one point in time.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Snapshot {
    pub documents: Vec<Document>,
}

impl Snapshot {
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Document> {
        self.documents.iter()
    }
}

impl IntoIterator for Snapshot {
    type Item = Document;
    type IntoIter = std::vec::IntoIter<Document>;

    fn into_iter(self) -> Self::IntoIter {
        self.documents.into_iter()
    }
}

/// Fields for a document about to be written, plus the paths the store must
/// fill with its own timestamp.
#[derive(Debug, Clone, Default)]
pub struct NewDocument {
    pub fields: Fields,
    pub server_timestamps: Vec<String>,
}

impl NewDocument {
    pub fn new(fields: Fields) -> Self {
        Self {
            fields,
            server_timestamps: Vec::new(),
        }
    }

    /// Have the store write its current timestamp at `path` on insert.
    pub fn with_server_timestamp(mut self, path: impl Into<String>) -> Self {
        self.server_timestamps.push(path.into());
        self
    }

    pub(crate) fn timestamp_updates(&self) -> Vec<FieldUpdate> {
        self.server_timestamps
            .iter()
            .map(FieldUpdate::server_timestamp)
            .collect()
    }
}
