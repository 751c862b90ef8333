use crate::common::*;
use crate::snapshot::DocumentSnapshot;
use std::fmt::Debug;

/// The position a cursor points at.
///
/// A document cursor is resolved by the transport into the equivalent literal
/// cursor using the document's value for the ordered field.
#[derive(Debug, Clone, PartialEq)]
pub enum CursorValue {
    Value(Value),
    Document(DocumentSnapshot),
}

impl CursorValue {
    pub fn is_document(&self) -> bool {
        matches!(self, CursorValue::Document(_))
    }

    pub(crate) fn to_parameter(&self) -> Value {
        match self {
            CursorValue::Value(v) => Value::Array(vec![v.clone()]),
            CursorValue::Document(doc) => {
                let mut map = std::collections::BTreeMap::new();
                map.insert(CURSOR_DOC_PATH.to_string(), Value::from(doc.reference().path()));
                map.insert(
                    CURSOR_DOC_DATA.to_string(),
                    doc.data().cloned().map(Value::from).unwrap_or_default(),
                );
                Value::Map(map)
            }
        }
    }
}

/// Which side of a result window a cursor bounds, and whether it is inclusive.
pub trait CursorBound: Copy + PartialEq + Debug + Send + Sync + 'static {
    /// Name of the cursor family, used in error messages.
    const FAMILY: &'static str;

    /// The serialized parameter name for this bound.
    fn parameter_name(&self, document: bool) -> &'static str;

    /// Inverse of [parameter_name](CursorBound::parameter_name).
    fn from_parameter_name(name: &str) -> Option<(Self, bool)>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StartBound {
    /// Results start at the cursor, inclusive.
    StartAt,
    /// Results start right after the cursor.
    StartAfter,
}

impl CursorBound for StartBound {
    const FAMILY: &'static str = "start";

    fn parameter_name(&self, document: bool) -> &'static str {
        match (self, document) {
            (StartBound::StartAt, false) => PARAM_START_AT,
            (StartBound::StartAt, true) => PARAM_START_AT_DOCUMENT,
            (StartBound::StartAfter, false) => PARAM_START_AFTER,
            (StartBound::StartAfter, true) => PARAM_START_AFTER_DOCUMENT,
        }
    }

    fn from_parameter_name(name: &str) -> Option<(Self, bool)> {
        match name {
            PARAM_START_AT => Some((StartBound::StartAt, false)),
            PARAM_START_AT_DOCUMENT => Some((StartBound::StartAt, true)),
            PARAM_START_AFTER => Some((StartBound::StartAfter, false)),
            PARAM_START_AFTER_DOCUMENT => Some((StartBound::StartAfter, true)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndBound {
    /// Results end at the cursor, inclusive.
    EndAt,
    /// Results end right after the cursor.
    EndAfter,
}

impl CursorBound for EndBound {
    const FAMILY: &'static str = "end";

    fn parameter_name(&self, document: bool) -> &'static str {
        match (self, document) {
            (EndBound::EndAt, false) => PARAM_END_AT,
            (EndBound::EndAt, true) => PARAM_END_AT_DOCUMENT,
            (EndBound::EndAfter, false) => PARAM_END_AFTER,
            (EndBound::EndAfter, true) => PARAM_END_AFTER_DOCUMENT,
        }
    }

    fn from_parameter_name(name: &str) -> Option<(Self, bool)> {
        match name {
            PARAM_END_AT => Some((EndBound::EndAt, false)),
            PARAM_END_AT_DOCUMENT => Some((EndBound::EndAt, true)),
            PARAM_END_AFTER => Some((EndBound::EndAfter, false)),
            PARAM_END_AFTER_DOCUMENT => Some((EndBound::EndAfter, true)),
            _ => None,
        }
    }
}

/// A start or end boundary of a query's result window.
#[derive(Debug, Clone, PartialEq)]
pub struct Cursor<B: CursorBound> {
    bound: B,
    value: CursorValue,
}

impl<B: CursorBound> Cursor<B> {
    pub fn new(bound: B, value: CursorValue) -> Self {
        Cursor { bound, value }
    }

    pub fn bound(&self) -> B {
        self.bound
    }

    pub fn value(&self) -> &CursorValue {
        &self.value
    }

    pub fn parameter_name(&self) -> &'static str {
        self.bound.parameter_name(self.value.is_document())
    }
}
