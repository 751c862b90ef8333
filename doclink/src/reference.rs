//! Locations of collections and documents in the remote database.
//!
//! A path alternates collection and document ids, so a collection path always
//! has an odd number of segments (`users`, `users/alice/posts`) and a document
//! path an even number (`users/alice`).

use crate::common::PATH_SEPARATOR;
use crate::config::QueryOptions;
use crate::errors::{DocLinkError, DocLinkResult, ErrorKind};
use crate::query::QueryDescriptor;
use im::Vector;
use itertools::Itertools;
use std::fmt::{Debug, Display, Formatter};
use std::hash::{Hash, Hasher};

/// Splits a slash separated path into validated segments.
pub(crate) fn parse_path(path: &str) -> DocLinkResult<Vector<String>> {
    if path.is_empty() {
        log::error!("Path must not be empty");
        return Err(DocLinkError::new("Path must not be empty", ErrorKind::InvalidPath));
    }
    if path.starts_with(PATH_SEPARATOR) || path.ends_with(PATH_SEPARATOR) {
        log::error!("Path '{}' starts or ends with a separator", path);
        return Err(DocLinkError::new(
            &format!("Invalid path '{}': must not start or end with '/'", path),
            ErrorKind::InvalidPath,
        ));
    }
    validate_segments(path.split(PATH_SEPARATOR).map(str::to_string).collect())
}

pub(crate) fn validate_segments(segments: Vector<String>) -> DocLinkResult<Vector<String>> {
    if segments.is_empty() {
        log::error!("Path must not be empty");
        return Err(DocLinkError::new("Path must not be empty", ErrorKind::InvalidPath));
    }
    if let Some(bad) = segments
        .iter()
        .find(|s| s.is_empty() || s.contains(PATH_SEPARATOR))
    {
        log::error!("Invalid path segment '{}' in {:?}", bad, segments);
        return Err(DocLinkError::new(
            &format!("Invalid path segment '{}': segments must be non-empty and must not contain '/'", bad),
            ErrorKind::InvalidPath,
        ));
    }
    Ok(segments)
}

pub(crate) fn join_path(segments: &Vector<String>) -> String {
    segments.iter().join(PATH_SEPARATOR)
}

/// A reference to a collection of documents.
///
/// Cheap to clone: the segments live in a persistent vector shared by every
/// query descriptor derived from this reference. Two references are equal when
/// their paths are equal.
#[derive(Clone)]
pub struct CollectionReference {
    segments: Vector<String>,
    options: QueryOptions,
}

impl CollectionReference {
    /// Parses a collection path such as `users` or `users/alice/posts`.
    ///
    /// # Errors
    ///
    /// Returns [ErrorKind::InvalidPath] for an empty path, an empty segment or an
    /// even number of segments.
    pub fn new(path: &str) -> DocLinkResult<Self> {
        Self::from_segments(parse_path(path)?)
    }

    pub fn from_segments(segments: impl IntoIterator<Item = impl Into<String>>) -> DocLinkResult<Self> {
        let segments = validate_segments(segments.into_iter().map(Into::into).collect())?;
        if segments.len() % 2 == 0 {
            log::error!("Collection path must have an odd number of segments: {:?}", segments);
            return Err(DocLinkError::new(
                &format!(
                    "Invalid collection path '{}': a collection path must have an odd number of segments",
                    join_path(&segments)
                ),
                ErrorKind::InvalidPath,
            ));
        }
        Ok(CollectionReference {
            segments,
            options: QueryOptions::default(),
        })
    }

    pub(crate) fn unchecked(segments: Vector<String>, options: QueryOptions) -> Self {
        CollectionReference { segments, options }
    }

    pub(crate) fn with_options(mut self, options: QueryOptions) -> Self {
        self.options = options;
        self
    }

    /// The id of this collection, i.e. the last path segment.
    pub fn id(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or_default()
    }

    pub fn path(&self) -> String {
        join_path(&self.segments)
    }

    pub fn segments(&self) -> &Vector<String> {
        &self.segments
    }

    /// The document owning this collection, or `None` for a root collection.
    pub fn parent(&self) -> Option<DocumentReference> {
        if self.segments.len() < 3 {
            return None;
        }
        let mut segments = self.segments.clone();
        segments.pop_back();
        Some(DocumentReference { segments })
    }

    /// A reference to the document `id` in this collection.
    pub fn document(&self, id: &str) -> DocLinkResult<DocumentReference> {
        let mut segments = self.segments.clone();
        segments.extend(parse_path(id)?);
        DocumentReference::from_segments(segments)
    }

    /// A reference to a new document with a random id.
    pub fn new_document(&self) -> DocumentReference {
        let mut segments = self.segments.clone();
        segments.push_back(uuid::Uuid::new_v4().simple().to_string());
        DocumentReference { segments }
    }

    /// An unfiltered query over every document of this collection.
    pub fn query(&self) -> QueryDescriptor {
        QueryDescriptor::with_options(self.segments.clone(), self.options)
    }
}

impl PartialEq for CollectionReference {
    fn eq(&self, other: &Self) -> bool {
        self.segments == other.segments
    }
}

impl Eq for CollectionReference {}

impl Hash for CollectionReference {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.segments.hash(state);
    }
}

impl Debug for CollectionReference {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "CollectionReference({})", self.path())
    }
}

impl Display for CollectionReference {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.path())
    }
}

/// A reference to a single document.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentReference {
    segments: Vector<String>,
}

impl DocumentReference {
    /// Parses a document path such as `users/alice`.
    ///
    /// # Errors
    ///
    /// Returns [ErrorKind::InvalidPath] for an empty path, an empty segment or an
    /// odd number of segments.
    pub fn new(path: &str) -> DocLinkResult<Self> {
        Self::from_segments(parse_path(path)?)
    }

    pub fn from_segments(segments: impl IntoIterator<Item = impl Into<String>>) -> DocLinkResult<Self> {
        let segments = validate_segments(segments.into_iter().map(Into::into).collect())?;
        if segments.len() % 2 != 0 {
            log::error!("Document path must have an even number of segments: {:?}", segments);
            return Err(DocLinkError::new(
                &format!(
                    "Invalid document path '{}': a document path must have an even number of segments",
                    join_path(&segments)
                ),
                ErrorKind::InvalidPath,
            ));
        }
        Ok(DocumentReference { segments })
    }

    pub fn id(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or_default()
    }

    pub fn path(&self) -> String {
        join_path(&self.segments)
    }

    pub fn segments(&self) -> &Vector<String> {
        &self.segments
    }

    /// The collection containing this document.
    pub fn parent(&self) -> CollectionReference {
        let mut segments = self.segments.clone();
        segments.pop_back();
        CollectionReference {
            segments,
            options: QueryOptions::default(),
        }
    }

    /// A reference to the sub-collection `id` of this document.
    pub fn collection(&self, id: &str) -> DocLinkResult<CollectionReference> {
        let mut segments = self.segments.clone();
        segments.extend(parse_path(id)?);
        CollectionReference::from_segments(segments)
    }
}

impl Debug for DocumentReference {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "DocumentReference({})", self.path())
    }
}

impl Display for DocumentReference {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.path())
    }
}
