//! Immutable materializations of query results.

use crate::common::{Document, Value};
use crate::errors::DocLinkResult;
use crate::reference::DocumentReference;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// One document as delivered by the transport, before it is wrapped into a
/// [DocumentSnapshot].
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DocumentRecord {
    pub path: String,
    pub data: Option<Document>,
}

impl DocumentRecord {
    pub fn new(path: impl Into<String>, data: Option<Document>) -> Self {
        DocumentRecord {
            path: path.into(),
            data,
        }
    }
}

/// The contents of a single document at a point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentSnapshot {
    reference: DocumentReference,
    data: Option<Document>,
}

impl DocumentSnapshot {
    pub fn new(reference: DocumentReference, data: Option<Document>) -> Self {
        DocumentSnapshot { reference, data }
    }

    /// Wraps a transport record, validating its path.
    pub fn from_record(record: DocumentRecord) -> DocLinkResult<Self> {
        let reference = DocumentReference::new(&record.path)?;
        Ok(DocumentSnapshot::new(reference, record.data))
    }

    pub fn reference(&self) -> &DocumentReference {
        &self.reference
    }

    pub fn id(&self) -> &str {
        self.reference.id()
    }

    /// `false` when the document did not exist at read time.
    pub fn exists(&self) -> bool {
        self.data.is_some()
    }

    pub fn data(&self) -> Option<&Document> {
        self.data.as_ref()
    }

    /// Value of `field` (dotted paths allowed), or [Value::Null] if absent.
    pub fn get(&self, field: &str) -> Value {
        self.data
            .as_ref()
            .map(|doc| doc.get(field))
            .unwrap_or_default()
    }
}

/// The result set of a query at a point in time.
///
/// Cloning shares the underlying documents; a snapshot fanned out to many
/// consumers is materialized only once.
#[derive(Debug, Clone)]
pub struct QuerySnapshot {
    documents: Arc<Vec<DocumentSnapshot>>,
    read_time: DateTime<Utc>,
}

impl QuerySnapshot {
    pub fn new(documents: Vec<DocumentSnapshot>) -> Self {
        QuerySnapshot {
            documents: Arc::new(documents),
            read_time: Utc::now(),
        }
    }

    /// Wraps a transport payload, validating every record.
    pub fn from_records(records: Vec<DocumentRecord>) -> DocLinkResult<Self> {
        let documents = records
            .into_iter()
            .map(DocumentSnapshot::from_record)
            .collect::<DocLinkResult<Vec<_>>>()?;
        Ok(QuerySnapshot::new(documents))
    }

    pub fn documents(&self) -> &[DocumentSnapshot] {
        &self.documents
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DocumentSnapshot> {
        self.documents.iter()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// When this snapshot was materialized locally.
    pub fn read_time(&self) -> DateTime<Utc> {
        self.read_time
    }
}

impl PartialEq for QuerySnapshot {
    fn eq(&self, other: &Self) -> bool {
        self.documents == other.documents
    }
}

impl<'a> IntoIterator for &'a QuerySnapshot {
    type Item = &'a DocumentSnapshot;
    type IntoIter = std::slice::Iter<'a, DocumentSnapshot>;

    fn into_iter(self) -> Self::IntoIter {
        self.documents.iter()
    }
}
