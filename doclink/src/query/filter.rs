use crate::common::Value;
use crate::errors::{DocLinkError, DocLinkResult, ErrorKind};
use std::fmt::{Display, Formatter};

/// Comparison operator of a stored filter condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Equal,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
}

impl Operator {
    /// The wire symbol of the operator (`==`, `<`, `<=`, `>`, `>=`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Equal => "==",
            Operator::LessThan => "<",
            Operator::LessThanOrEqual => "<=",
            Operator::GreaterThan => ">",
            Operator::GreaterThanOrEqual => ">=",
        }
    }

    pub fn from_symbol(symbol: &str) -> DocLinkResult<Operator> {
        match symbol {
            "==" => Ok(Operator::Equal),
            "<" => Ok(Operator::LessThan),
            "<=" => Ok(Operator::LessThanOrEqual),
            ">" => Ok(Operator::GreaterThan),
            ">=" => Ok(Operator::GreaterThanOrEqual),
            other => Err(DocLinkError::new(
                &format!("Unknown filter operator '{}'", other),
                ErrorKind::EncodingError,
            )),
        }
    }
}

impl Display for Operator {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One named condition supplied to [`QueryDescriptor::filter`](crate::query::QueryDescriptor::filter).
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    IsEqualTo(Value),
    IsLessThan(Value),
    IsLessThanOrEqualTo(Value),
    IsGreaterThan(Value),
    IsGreaterThanOrEqualTo(Value),
    /// Shorthand for `== null`. Only `IsNull(true)` is accepted.
    IsNull(bool),
}

impl Condition {
    /// Resolves the condition into an operator and a comparison value.
    ///
    /// # Errors
    ///
    /// Returns [ErrorKind::InvalidNullAssertion] for `IsNull(false)`: asserting
    /// non-null is not expressible as a single comparison.
    pub fn resolve(self, field: &str) -> DocLinkResult<(Operator, Value)> {
        match self {
            Condition::IsEqualTo(v) => Ok((Operator::Equal, v)),
            Condition::IsLessThan(v) => Ok((Operator::LessThan, v)),
            Condition::IsLessThanOrEqualTo(v) => Ok((Operator::LessThanOrEqual, v)),
            Condition::IsGreaterThan(v) => Ok((Operator::GreaterThan, v)),
            Condition::IsGreaterThanOrEqualTo(v) => Ok((Operator::GreaterThanOrEqual, v)),
            Condition::IsNull(true) => Ok((Operator::Equal, Value::Null)),
            Condition::IsNull(false) => {
                log::error!("Null shorthand cannot assert non-null on field '{}'", field);
                Err(DocLinkError::new(
                    &format!(
                        "Invalid null assertion on field '{}': the null shorthand only supports is_null(true)",
                        field
                    ),
                    ErrorKind::InvalidNullAssertion,
                ))
            }
        }
    }
}

/// A stored `(field, operator, value)` triple.
///
/// Equality is structural: two conditions are equal when their fields and
/// operators match and their values are deeply equal.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterCondition {
    field: String,
    operator: Operator,
    value: Value,
}

impl FilterCondition {
    pub fn new(field: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Self {
        FilterCondition {
            field: field.into(),
            operator,
            value: value.into(),
        }
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn operator(&self) -> Operator {
        self.operator
    }

    pub fn value(&self) -> &Value {
        &self.value
    }
}

impl Display for FilterCondition {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {}", self.field, self.operator, self.value)
    }
}

/// A field name paired with at most one condition, ready to be applied to a query.
///
/// Built through [field]; a bare `field("x")` carries no condition and applying
/// it leaves the query unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldFilter {
    pub(crate) field: String,
    pub(crate) condition: Option<Condition>,
}

impl FieldFilter {
    pub fn new(field: impl Into<String>, condition: Option<Condition>) -> Self {
        FieldFilter {
            field: field.into(),
            condition,
        }
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn condition(&self) -> Option<&Condition> {
        self.condition.as_ref()
    }
}

/// Creates a fluent filter builder for the specified field name.
///
/// # Examples
///
/// ```rust
/// use doclink::query::field;
///
/// let adults = field("age").gte(18);
/// let unset = field("deleted_at").is_null(true);
/// ```
pub fn field(field_name: &str) -> FluentFilter {
    FluentFilter {
        field_name: field_name.to_string(),
    }
}

/// A fluent builder for a single condition on one field.
///
/// Every method consumes the builder and returns a [FieldFilter] holding exactly
/// one condition, so a call can never carry two conditions at once.
pub struct FluentFilter {
    field_name: String,
}

impl FluentFilter {
    /// Field is equal to `value`.
    #[inline]
    pub fn eq<T: Into<Value>>(self, value: T) -> FieldFilter {
        self.with(Condition::IsEqualTo(value.into()))
    }

    /// Field is less than `value`.
    #[inline]
    pub fn lt<T: Into<Value>>(self, value: T) -> FieldFilter {
        self.with(Condition::IsLessThan(value.into()))
    }

    /// Field is less than or equal to `value`.
    #[inline]
    pub fn lte<T: Into<Value>>(self, value: T) -> FieldFilter {
        self.with(Condition::IsLessThanOrEqualTo(value.into()))
    }

    /// Field is greater than `value`.
    #[inline]
    pub fn gt<T: Into<Value>>(self, value: T) -> FieldFilter {
        self.with(Condition::IsGreaterThan(value.into()))
    }

    /// Field is greater than or equal to `value`.
    #[inline]
    pub fn gte<T: Into<Value>>(self, value: T) -> FieldFilter {
        self.with(Condition::IsGreaterThanOrEqualTo(value.into()))
    }

    /// Field is null. `is_null(false)` is rejected when applied to a query.
    #[inline]
    pub fn is_null(self, is_null: bool) -> FieldFilter {
        self.with(Condition::IsNull(is_null))
    }

    fn with(self, condition: Condition) -> FieldFilter {
        FieldFilter {
            field: self.field_name,
            condition: Some(condition),
        }
    }
}

impl From<FluentFilter> for FieldFilter {
    fn from(value: FluentFilter) -> Self {
        FieldFilter {
            field: value.field_name,
            condition: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;

    #[test]
    fn test_operator_symbols() {
        for op in [
            Operator::Equal,
            Operator::LessThan,
            Operator::LessThanOrEqual,
            Operator::GreaterThan,
            Operator::GreaterThanOrEqual,
        ] {
            assert_eq!(Operator::from_symbol(op.as_str()).unwrap(), op);
        }
        assert_eq!(Operator::from_symbol("!=").unwrap_err().kind(), &ErrorKind::EncodingError);
    }

    #[test]
    fn test_fluent_builds_single_condition() {
        let filter = field("age").gte(18);
        assert_eq!(filter.field(), "age");
        assert_eq!(filter.condition(), Some(&Condition::IsGreaterThanOrEqualTo(Value::from(18))));
    }

    #[test]
    fn test_bare_field_has_no_condition() {
        let filter: FieldFilter = field("age").into();
        assert!(filter.condition().is_none());
    }

    #[test]
    fn test_resolve_is_null() {
        let (op, value) = Condition::IsNull(true).resolve("age").unwrap();
        assert_eq!(op, Operator::Equal);
        assert!(value.is_null());

        let err = Condition::IsNull(false).resolve("age").unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::InvalidNullAssertion);
    }

    #[test]
    fn test_resolve_comparisons() {
        assert_eq!(
            Condition::IsLessThan(Value::from(3)).resolve("n").unwrap(),
            (Operator::LessThan, Value::from(3))
        );
        assert_eq!(
            Condition::IsGreaterThan(Value::from(3)).resolve("n").unwrap(),
            (Operator::GreaterThan, Value::from(3))
        );
    }

    #[test]
    fn test_filter_condition_structural_equality() {
        let a = FilterCondition::new("tags", Operator::Equal, doc! { "x": [1, 2] });
        let b = FilterCondition::new("tags", Operator::Equal, doc! { "x": [1, 2] });
        let c = FilterCondition::new("tags", Operator::LessThan, doc! { "x": [1, 2] });
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.to_string(), "tags == {\"x\": [1, 2]}");
    }
}
