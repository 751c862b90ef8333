use crate::common::*;
use crate::errors::{DocLinkError, DocLinkResult, ErrorKind};
use crate::query::{CursorBound, CursorValue, EndBound, Operator, QueryDescriptor, StartBound};
use crate::reference::{parse_path, DocumentReference};
use crate::snapshot::DocumentSnapshot;
use indexmap::IndexMap;

/// The transport payload of a query: the joined collection path plus named
/// parameters.
///
/// Parameters appear in a fixed order: `where` (always present, possibly
/// empty), `orderBy`, the start cursor, the end cursor, `limit`. A literal
/// cursor is a one-element array; a document cursor is a map with `path` and
/// `data` keys.
///
/// ```text
/// path:       "users"
/// where:      [["age", ">=", 18]]
/// orderBy:    ["age", false]
/// startAfter: [21]
/// limit:      10
/// ```
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SerializedQuery {
    path: String,
    parameters: IndexMap<String, Value>,
}

impl SerializedQuery {
    pub fn new(path: String, parameters: IndexMap<String, Value>) -> Self {
        SerializedQuery { path, parameters }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn parameters(&self) -> &IndexMap<String, Value> {
        &self.parameters
    }

    pub fn parameter(&self, name: &str) -> Option<&Value> {
        self.parameters.get(name)
    }

    /// Rebuilds the descriptor this payload was serialized from.
    ///
    /// Parameters are re-applied through the regular builder methods, so the
    /// result obeys every descriptor invariant. `limit` is applied before
    /// `orderBy`, which keeps the default validation options happy.
    ///
    /// # Errors
    ///
    /// [ErrorKind::EncodingError] for unknown parameters or malformed values,
    /// [ErrorKind::InvalidPath] for a malformed path, or any builder error the
    /// parameters would trigger.
    pub fn to_descriptor(&self) -> DocLinkResult<QueryDescriptor> {
        let mut query = QueryDescriptor::new(parse_path(&self.path)?);

        if let Some(filters) = self.parameters.get(PARAM_WHERE) {
            for filter in expect_array(filters, PARAM_WHERE)? {
                query = match expect_array(filter, PARAM_WHERE)?.as_slice() {
                    [Value::String(field), Value::String(op), value] => {
                        let operator = Operator::from_symbol(op)?;
                        query.filter(crate::query::FieldFilter::new(
                            field.clone(),
                            Some(condition_for(operator, value.clone())),
                        ))?
                    }
                    _ => return Err(malformed(PARAM_WHERE, filter)),
                };
            }
        }

        if let Some(limit) = self.parameters.get(PARAM_LIMIT) {
            match limit {
                Value::I64(n) if *n >= 0 => query = query.limit(*n as u64)?,
                _ => return Err(malformed(PARAM_LIMIT, limit)),
            }
        }

        if let Some(order) = self.parameters.get(PARAM_ORDER_BY) {
            query = match expect_array(order, PARAM_ORDER_BY)?.as_slice() {
                [Value::String(field), Value::Bool(descending)] => {
                    query.order_by_with(field, SortOrder::from_descending(*descending))?
                }
                _ => return Err(malformed(PARAM_ORDER_BY, order)),
            };
        }

        for (name, value) in &self.parameters {
            if let Some((bound, document)) = StartBound::from_parameter_name(name) {
                query = query.with_start(bound, decode_cursor(name, value, document)?)?;
            } else if let Some((bound, document)) = EndBound::from_parameter_name(name) {
                query = query.with_end(bound, decode_cursor(name, value, document)?)?;
            } else if ![PARAM_WHERE, PARAM_ORDER_BY, PARAM_LIMIT].contains(&name.as_str()) {
                log::error!("Unknown query parameter '{}'", name);
                return Err(DocLinkError::new(
                    &format!("Unknown query parameter '{}'", name),
                    ErrorKind::EncodingError,
                ));
            }
        }

        Ok(query)
    }
}

fn condition_for(operator: Operator, value: Value) -> crate::query::Condition {
    use crate::query::Condition;
    match operator {
        Operator::Equal => Condition::IsEqualTo(value),
        Operator::LessThan => Condition::IsLessThan(value),
        Operator::LessThanOrEqual => Condition::IsLessThanOrEqualTo(value),
        Operator::GreaterThan => Condition::IsGreaterThan(value),
        Operator::GreaterThanOrEqual => Condition::IsGreaterThanOrEqualTo(value),
    }
}

fn decode_cursor(name: &str, value: &Value, document: bool) -> DocLinkResult<CursorValue> {
    if !document {
        return match expect_array(value, name)?.as_slice() {
            [literal] => Ok(CursorValue::Value(literal.clone())),
            _ => Err(malformed(name, value)),
        };
    }

    let map = value.as_map().ok_or_else(|| malformed(name, value))?;
    let path = map
        .get(CURSOR_DOC_PATH)
        .and_then(Value::as_string)
        .ok_or_else(|| malformed(name, value))?;
    let data = match map.get(CURSOR_DOC_DATA) {
        Some(Value::Map(data)) => Some(Document::from(data.clone())),
        Some(Value::Null) | None => None,
        Some(_) => return Err(malformed(name, value)),
    };
    let reference = DocumentReference::new(path)?;
    Ok(CursorValue::Document(DocumentSnapshot::new(reference, data)))
}

fn expect_array<'a>(value: &'a Value, name: &str) -> DocLinkResult<&'a Vec<Value>> {
    value.as_array().ok_or_else(|| malformed(name, value))
}

fn malformed(name: &str, value: &Value) -> DocLinkError {
    log::error!("Malformed query parameter '{}': {}", name, value);
    DocLinkError::new(
        &format!("Malformed query parameter '{}': {}", name, value),
        ErrorKind::EncodingError,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;
    use crate::query::field;
    use crate::reference::CollectionReference;

    fn posts() -> QueryDescriptor {
        CollectionReference::new("users/alice/posts").unwrap().query()
    }

    #[test]
    fn test_round_trip_through_json() {
        let query = posts()
            .filter(field("tags").eq(vec!["rust", "db"]))
            .unwrap()
            .filter(field("deleted").is_null(true))
            .unwrap()
            .limit(20)
            .unwrap()
            .order_by_descending("created")
            .unwrap()
            .start_at(100)
            .unwrap()
            .end_after(10)
            .unwrap();

        let payload = query.serialize();
        let json = serde_json::to_string(&payload).unwrap();
        let decoded: SerializedQuery = serde_json::from_str(&json).unwrap();

        assert_eq!(decoded, payload);
        assert_eq!(decoded.path(), "users/alice/posts");
        assert_eq!(decoded.to_descriptor().unwrap(), query);
    }

    #[test]
    fn test_round_trip_document_cursor() {
        let snapshot = DocumentSnapshot::new(
            DocumentReference::new("users/alice/posts/p1").unwrap(),
            Some(doc! { "created": 5, "title": "hello" }),
        );
        let query = posts()
            .order_by("created")
            .unwrap()
            .start_after_document(&snapshot)
            .unwrap();

        let payload = query.serialize();
        assert!(payload.parameter("startAfterDocument").is_some());
        assert_eq!(payload.to_descriptor().unwrap(), query);
    }

    #[test]
    fn test_unknown_parameter_rejected() {
        let mut parameters = IndexMap::new();
        parameters.insert("where".to_string(), Value::Array(vec![]));
        parameters.insert("offset".to_string(), Value::from(3));
        let payload = SerializedQuery::new("users".to_string(), parameters);
        assert_eq!(payload.to_descriptor().unwrap_err().kind(), &ErrorKind::EncodingError);
    }

    #[test]
    fn test_malformed_filter_rejected() {
        let mut parameters = IndexMap::new();
        parameters.insert(
            "where".to_string(),
            Value::from(vec![Value::from(vec![Value::from("age"), Value::from("~"), Value::from(1)])]),
        );
        let payload = SerializedQuery::new("users".to_string(), parameters);
        assert_eq!(payload.to_descriptor().unwrap_err().kind(), &ErrorKind::EncodingError);
    }

    #[test]
    fn test_invariants_enforced_on_decode() {
        let mut parameters = IndexMap::new();
        parameters.insert("startAt".to_string(), Value::from(vec![1]));
        let payload = SerializedQuery::new("users".to_string(), parameters);
        assert_eq!(payload.to_descriptor().unwrap_err().kind(), &ErrorKind::MissingOrderBy);
    }
}
