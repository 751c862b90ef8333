use crate::common::*;
use crate::config::QueryOptions;
use crate::errors::{DocLinkError, DocLinkResult, ErrorKind};
use crate::query::{
    Cursor, CursorBound, CursorValue, EndBound, FieldFilter, FilterCondition, SerializedQuery,
    StartBound,
};
use crate::reference::{join_path, CollectionReference};
use crate::snapshot::DocumentSnapshot;
use im::Vector;
use indexmap::IndexMap;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

/// The single ordering clause of a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    field: String,
    order: SortOrder,
}

impl OrderBy {
    pub fn new(field: impl Into<String>, order: SortOrder) -> Self {
        OrderBy {
            field: field.into(),
            order,
        }
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn order(&self) -> SortOrder {
        self.order
    }

    pub fn is_descending(&self) -> bool {
        self.order.is_descending()
    }
}

/// An immutable query: a collection location plus filters, ordering, cursors
/// and a limit.
///
/// Every builder method borrows `self` and returns a new descriptor; the
/// receiver is never modified, so holders of an earlier descriptor never
/// observe later refinements. Unchanged parts are shared structurally: the
/// location and filters live in persistent `im` vectors, the ordering clause
/// and cursors behind `Arc`s. Only the parameter being set is replaced.
///
/// All validation happens at the call that would break an invariant, so an
/// invalid descriptor cannot be constructed.
///
/// # Examples
///
/// ```rust
/// use doclink::query::field;
/// use doclink::reference::CollectionReference;
///
/// # fn main() -> doclink::errors::DocLinkResult<()> {
/// let users = CollectionReference::new("users")?;
/// let base = users.query();
/// let adults = base
///     .filter(field("age").gte(18))?
///     .order_by("age")?
///     .start_after(21)?;
///
/// assert!(base.filters().is_empty());
/// assert_eq!(adults.filters().len(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct QueryDescriptor {
    location: Vector<String>,
    filters: Vector<FilterCondition>,
    order: Option<Arc<OrderBy>>,
    start: Option<Arc<Cursor<StartBound>>>,
    end: Option<Arc<Cursor<EndBound>>>,
    limit: Option<u64>,
    options: QueryOptions,
}

impl QueryDescriptor {
    /// Creates an unfiltered descriptor for a location with default options.
    ///
    /// The location is taken as given; [CollectionReference] validates paths.
    pub fn new(location: Vector<String>) -> Self {
        QueryDescriptor::with_options(location, QueryOptions::default())
    }

    pub(crate) fn with_options(location: Vector<String>, options: QueryOptions) -> Self {
        QueryDescriptor {
            location,
            filters: Vector::new(),
            order: None,
            start: None,
            end: None,
            limit: None,
            options,
        }
    }

    pub fn location(&self) -> &Vector<String> {
        &self.location
    }

    pub fn path(&self) -> String {
        join_path(&self.location)
    }

    pub fn filters(&self) -> &Vector<FilterCondition> {
        &self.filters
    }

    pub fn order(&self) -> Option<&OrderBy> {
        self.order.as_deref()
    }

    pub fn has_order(&self) -> bool {
        self.order.is_some()
    }

    pub fn start_cursor(&self) -> Option<&Cursor<StartBound>> {
        self.start.as_deref()
    }

    pub fn end_cursor(&self) -> Option<&Cursor<EndBound>> {
        self.end.as_deref()
    }

    pub fn limit_value(&self) -> Option<u64> {
        self.limit
    }

    pub fn options(&self) -> QueryOptions {
        self.options
    }

    /// Appends one filter condition.
    ///
    /// A [FieldFilter] without a condition (a bare `field("x")`) is a no-op and
    /// returns an equal descriptor.
    ///
    /// # Errors
    ///
    /// * [ErrorKind::DuplicateCondition] if a structurally equal
    ///   `(field, operator, value)` triple is already present.
    /// * [ErrorKind::InvalidNullAssertion] for `is_null(false)`.
    pub fn filter(&self, filter: impl Into<FieldFilter>) -> DocLinkResult<QueryDescriptor> {
        let FieldFilter { field, condition } = filter.into();
        let condition = match condition {
            Some(condition) => condition,
            None => return Ok(self.clone()),
        };

        let (operator, value) = condition.resolve(&field)?;
        let candidate = FilterCondition::new(field, operator, value);
        if self.filters.iter().any(|existing| existing == &candidate) {
            log::error!("Condition '{}' is already present on {}", candidate, self.path());
            return Err(DocLinkError::new(
                &format!("Duplicate condition '{}': the query already contains it", candidate),
                ErrorKind::DuplicateCondition,
            ));
        }

        let mut filters = self.filters.clone();
        filters.push_back(candidate);
        Ok(QueryDescriptor {
            filters,
            ..self.clone()
        })
    }

    /// Orders results by `field`, ascending.
    ///
    /// # Errors
    ///
    /// [ErrorKind::AlreadyOrdered] if an ordering clause is already present;
    /// compound ordering is not supported.
    pub fn order_by(&self, field: &str) -> DocLinkResult<QueryDescriptor> {
        self.order_by_with(field, SortOrder::Ascending)
    }

    pub fn order_by_descending(&self, field: &str) -> DocLinkResult<QueryDescriptor> {
        self.order_by_with(field, SortOrder::Descending)
    }

    pub fn order_by_with(&self, field: &str, order: SortOrder) -> DocLinkResult<QueryDescriptor> {
        if let Some(existing) = &self.order {
            log::error!(
                "Query on {} is already ordered by '{}'",
                self.path(),
                existing.field()
            );
            return Err(DocLinkError::new(
                &format!(
                    "Query is already ordered by '{}': only one ordering clause is supported",
                    existing.field()
                ),
                ErrorKind::AlreadyOrdered,
            ));
        }

        Ok(QueryDescriptor {
            order: Some(Arc::new(OrderBy::new(field, order))),
            ..self.clone()
        })
    }

    /// Results start at `value` (inclusive) of the ordered field.
    pub fn start_at(&self, value: impl Into<Value>) -> DocLinkResult<QueryDescriptor> {
        self.with_start(StartBound::StartAt, CursorValue::Value(value.into()))
    }

    /// Results start at the position of a previously read document.
    pub fn start_at_document(&self, document: &DocumentSnapshot) -> DocLinkResult<QueryDescriptor> {
        self.with_start(StartBound::StartAt, CursorValue::Document(document.clone()))
    }

    /// Results start right after `value` of the ordered field.
    pub fn start_after(&self, value: impl Into<Value>) -> DocLinkResult<QueryDescriptor> {
        self.with_start(StartBound::StartAfter, CursorValue::Value(value.into()))
    }

    pub fn start_after_document(&self, document: &DocumentSnapshot) -> DocLinkResult<QueryDescriptor> {
        self.with_start(StartBound::StartAfter, CursorValue::Document(document.clone()))
    }

    /// Results end at `value` (inclusive) of the ordered field.
    pub fn end_at(&self, value: impl Into<Value>) -> DocLinkResult<QueryDescriptor> {
        self.with_end(EndBound::EndAt, CursorValue::Value(value.into()))
    }

    pub fn end_at_document(&self, document: &DocumentSnapshot) -> DocLinkResult<QueryDescriptor> {
        self.with_end(EndBound::EndAt, CursorValue::Document(document.clone()))
    }

    pub fn end_after(&self, value: impl Into<Value>) -> DocLinkResult<QueryDescriptor> {
        self.with_end(EndBound::EndAfter, CursorValue::Value(value.into()))
    }

    pub fn end_after_document(&self, document: &DocumentSnapshot) -> DocLinkResult<QueryDescriptor> {
        self.with_end(EndBound::EndAfter, CursorValue::Document(document.clone()))
    }

    pub(crate) fn with_start(&self, bound: StartBound, value: CursorValue) -> DocLinkResult<QueryDescriptor> {
        let cursor = self.check_cursor(self.start.as_deref(), bound, value)?;
        Ok(QueryDescriptor {
            start: Some(Arc::new(cursor)),
            ..self.clone()
        })
    }

    pub(crate) fn with_end(&self, bound: EndBound, value: CursorValue) -> DocLinkResult<QueryDescriptor> {
        let cursor = self.check_cursor(self.end.as_deref(), bound, value)?;
        Ok(QueryDescriptor {
            end: Some(Arc::new(cursor)),
            ..self.clone()
        })
    }

    fn check_cursor<B: CursorBound>(
        &self,
        existing: Option<&Cursor<B>>,
        bound: B,
        value: CursorValue,
    ) -> DocLinkResult<Cursor<B>> {
        let cursor = Cursor::new(bound, value);
        if self.order.is_none() {
            log::error!(
                "Cursor '{}' requested on unordered query {}",
                cursor.parameter_name(),
                self.path()
            );
            return Err(DocLinkError::new(
                &format!(
                    "Cannot set '{}' before an ordering clause: call order_by first",
                    cursor.parameter_name()
                ),
                ErrorKind::MissingOrderBy,
            ));
        }
        if let Some(existing) = existing {
            log::error!(
                "Cursor '{}' conflicts with '{}' on {}",
                cursor.parameter_name(),
                existing.parameter_name(),
                self.path()
            );
            return Err(DocLinkError::new(
                &format!(
                    "Cannot set '{}': a {} cursor '{}' is already set",
                    cursor.parameter_name(),
                    B::FAMILY,
                    existing.parameter_name()
                ),
                ErrorKind::CursorConflict,
            ));
        }
        Ok(cursor)
    }

    /// Bounds the number of results.
    ///
    /// Re-applying replaces the previous limit.
    ///
    /// # Errors
    ///
    /// * [ErrorKind::InvalidLimit] for `limit < 1` or `limit > i64::MAX`.
    /// * [ErrorKind::AlreadyOrdered] if an ordering clause is present, unless
    ///   [QueryOptions::allow_limit_after_order_by] is set.
    pub fn limit(&self, limit: u64) -> DocLinkResult<QueryDescriptor> {
        if limit < 1 || limit > i64::MAX as u64 {
            log::error!("Invalid limit {} on {}", limit, self.path());
            return Err(DocLinkError::new(
                &format!("Invalid limit {}: limit must be between 1 and {}", limit, i64::MAX),
                ErrorKind::InvalidLimit,
            ));
        }
        if self.order.is_some() && !self.options.allow_limit_after_order_by {
            log::error!("Limit requested after ordering on {}", self.path());
            return Err(DocLinkError::new(
                "Cannot set a limit on an ordered query: apply limit before order_by",
                ErrorKind::AlreadyOrdered,
            ));
        }

        Ok(QueryDescriptor {
            limit: Some(limit),
            ..self.clone()
        })
    }

    /// Serializes the descriptor into the payload handed to the transport.
    pub fn serialize(&self) -> SerializedQuery {
        let mut parameters = IndexMap::new();

        let filters = self
            .filters
            .iter()
            .map(|f| {
                Value::Array(vec![
                    Value::from(f.field()),
                    Value::from(f.operator().as_str()),
                    f.value().clone(),
                ])
            })
            .collect::<Vec<_>>();
        parameters.insert(PARAM_WHERE.to_string(), Value::Array(filters));

        if let Some(order) = &self.order {
            parameters.insert(
                PARAM_ORDER_BY.to_string(),
                Value::Array(vec![
                    Value::from(order.field()),
                    Value::from(order.is_descending()),
                ]),
            );
        }
        if let Some(start) = &self.start {
            parameters.insert(start.parameter_name().to_string(), start.value().to_parameter());
        }
        if let Some(end) = &self.end {
            parameters.insert(end.parameter_name().to_string(), end.value().to_parameter());
        }
        if let Some(limit) = self.limit {
            // limit() only accepts values that fit an i64
            parameters.insert(PARAM_LIMIT.to_string(), Value::I64(limit as i64));
        }

        SerializedQuery::new(self.path(), parameters)
    }

    /// A reference to the targeted collection, dropping every query parameter.
    pub fn to_location_reference(&self) -> CollectionReference {
        // a descriptor location is either validated by CollectionReference or
        // supplied directly; fall back to the raw segments for the latter
        match CollectionReference::from_segments(self.location.iter().cloned()) {
            Ok(reference) => reference.with_options(self.options),
            Err(_) => CollectionReference::unchecked(self.location.clone(), self.options),
        }
    }
}

impl PartialEq for QueryDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.location == other.location
            && self.filters == other.filters
            && self.order == other.order
            && self.start == other.start
            && self.end == other.end
            && self.limit == other.limit
    }
}

impl Debug for QueryDescriptor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryDescriptor")
            .field("path", &self.path())
            .field("filters", &self.filters)
            .field("order", &self.order)
            .field("start", &self.start)
            .field("end", &self.end)
            .field("limit", &self.limit)
            .finish()
    }
}
