use backtrace::Backtrace;
use serde::{de, ser};
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::result::Result;

use crate::{atomic, Atomic};

/// Error kinds for doclink operations.
///
/// Builder kinds are raised synchronously by the query descriptor at the call
/// that breaks an invariant. Subscription kinds are delivered asynchronously,
/// either through a [`SnapshotStream`](crate::subscription::SnapshotStream) or
/// through the diagnostic `on_error` handler.
///
/// # Examples
///
/// ```rust,ignore
/// use doclink::errors::{DocLinkError, ErrorKind, DocLinkResult};
///
/// fn example() -> DocLinkResult<()> {
///     Err(DocLinkError::new("limit must be at least 1", ErrorKind::InvalidLimit))
/// }
/// ```
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum ErrorKind {
    // Query builder errors
    /// A structurally identical filter condition is already present
    DuplicateCondition,
    /// A second ordering clause, or a limit after ordering, was requested
    AlreadyOrdered,
    /// A cursor was requested before any ordering clause
    MissingOrderBy,
    /// A second cursor of the same family (start or end) was requested
    CursorConflict,
    /// A limit below 1 was requested
    InvalidLimit,
    /// The null shorthand was used to assert non-null
    InvalidNullAssertion,

    // Subscription lifecycle errors
    /// The transport rejected a subscription registration (terminal)
    RegistrationFailed,
    /// The transport rejected a subscription cleanup (non-fatal)
    UnregistrationFailed,
    /// The transport rejected a one-shot fetch
    FetchFailed,
    /// The listener registry was torn down with the connection
    ConnectionClosed,

    // Reference errors
    /// A collection or document path is malformed
    InvalidPath,

    // Data encoding errors
    /// Error encoding or decoding a query payload
    EncodingError,

    /// The operation is not valid in the current context
    InvalidOperation,

    /// Internal error (usually indicates a bug)
    InternalError,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::DuplicateCondition => write!(f, "Duplicate condition"),
            ErrorKind::AlreadyOrdered => write!(f, "Already ordered"),
            ErrorKind::MissingOrderBy => write!(f, "Missing order by"),
            ErrorKind::CursorConflict => write!(f, "Cursor conflict"),
            ErrorKind::InvalidLimit => write!(f, "Invalid limit"),
            ErrorKind::InvalidNullAssertion => write!(f, "Invalid null assertion"),
            ErrorKind::RegistrationFailed => write!(f, "Registration failed"),
            ErrorKind::UnregistrationFailed => write!(f, "Unregistration failed"),
            ErrorKind::FetchFailed => write!(f, "Fetch failed"),
            ErrorKind::ConnectionClosed => write!(f, "Connection closed"),
            ErrorKind::InvalidPath => write!(f, "Invalid path"),
            ErrorKind::EncodingError => write!(f, "Encoding error"),
            ErrorKind::InvalidOperation => write!(f, "Invalid operation"),
            ErrorKind::InternalError => write!(f, "Internal error"),
        }
    }
}

/// Custom doclink error type.
///
/// `DocLinkError` carries a message, a kind and an optional cause, and captures a
/// backtrace at construction for debugging.
///
/// # Examples
///
/// ```rust,ignore
/// use doclink::errors::{DocLinkError, ErrorKind};
///
/// let cause = DocLinkError::new("socket reset", ErrorKind::InternalError);
/// let err = DocLinkError::new_with_cause("listen rejected", ErrorKind::RegistrationFailed, cause);
/// ```
#[derive(Clone)]
pub struct DocLinkError {
    message: String,
    error_kind: ErrorKind,
    cause: Option<Box<DocLinkError>>,
    backtrace: Atomic<Backtrace>,
}

impl DocLinkError {
    /// Creates a new `DocLinkError` with the specified message and error kind.
    pub fn new(message: &str, error_kind: ErrorKind) -> Self {
        DocLinkError {
            message: message.to_string(),
            error_kind,
            cause: None,
            backtrace: atomic(Backtrace::new()),
        }
    }

    /// Creates a new `DocLinkError` chained to the error that caused it.
    pub fn new_with_cause(message: &str, error_kind: ErrorKind, cause: DocLinkError) -> Self {
        DocLinkError {
            message: message.to_string(),
            error_kind,
            cause: Some(Box::new(cause)),
            backtrace: atomic(Backtrace::new()),
        }
    }

    /// Wraps an error reported by a [`Transport`](crate::transport::Transport).
    ///
    /// The whole `anyhow` context chain is flattened into the cause message so
    /// nothing the transport reported is lost.
    pub fn from_transport(message: &str, error_kind: ErrorKind, err: anyhow::Error) -> Self {
        let cause = DocLinkError::new(&format!("{:#}", err), ErrorKind::InternalError);
        DocLinkError::new_with_cause(&format!("{}: {:#}", message, err), error_kind, cause)
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.error_kind
    }

    pub fn cause(&self) -> Option<&DocLinkError> {
        self.cause.as_deref()
    }
}

impl Display for DocLinkError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Debug for DocLinkError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        // print error message with stack trace followed by cause
        match &self.cause {
            Some(cause) => write!(f, "{}\nCaused by: {:?}", self.message, cause),
            None => write!(f, "{}\n{:?}", self.message, self.backtrace.read()),
        }
    }
}

impl Error for DocLinkError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self.cause {
            Some(cause) => Some(cause.as_ref()),
            None => None,
        }
    }
}

/// A result type alias for doclink operations.
pub type DocLinkResult<T> = Result<T, DocLinkError>;

impl de::Error for DocLinkError {
    fn custom<T: Display>(msg: T) -> Self {
        DocLinkError::new(&msg.to_string(), ErrorKind::EncodingError)
    }
}

impl ser::Error for DocLinkError {
    fn custom<T: Display>(msg: T) -> Self {
        DocLinkError::new(&msg.to_string(), ErrorKind::EncodingError)
    }
}

impl From<std::fmt::Error> for DocLinkError {
    fn from(err: std::fmt::Error) -> Self {
        DocLinkError::new(
            &format!("Formatting error: {}", err),
            ErrorKind::InternalError,
        )
    }
}

impl From<String> for DocLinkError {
    fn from(msg: String) -> Self {
        DocLinkError::new(&msg, ErrorKind::InternalError)
    }
}

impl From<&str> for DocLinkError {
    fn from(msg: &str) -> Self {
        DocLinkError::new(msg, ErrorKind::InternalError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_new_creates_error() {
        let error = DocLinkError::new("limit must be at least 1", ErrorKind::InvalidLimit);
        assert_eq!(error.message(), "limit must be at least 1");
        assert_eq!(error.kind(), &ErrorKind::InvalidLimit);
        assert!(error.cause().is_none());
        assert!(error.source().is_none());
    }

    #[test]
    fn test_new_with_cause_keeps_chain() {
        let cause = DocLinkError::new("socket reset", ErrorKind::InternalError);
        let error =
            DocLinkError::new_with_cause("listen rejected", ErrorKind::RegistrationFailed, cause);
        assert_eq!(error.kind(), &ErrorKind::RegistrationFailed);
        assert_eq!(error.cause().map(|c| c.message()), Some("socket reset"));
        assert!(error.source().is_some());
    }

    #[test]
    fn test_display_formats_message_only() {
        let error = DocLinkError::new("already ordered", ErrorKind::AlreadyOrdered);
        assert_eq!(format!("{}", error), "already ordered");
    }

    #[test]
    fn test_debug_formats_with_cause() {
        let cause = DocLinkError::new("socket reset", ErrorKind::InternalError);
        let error =
            DocLinkError::new_with_cause("listen rejected", ErrorKind::RegistrationFailed, cause);
        let formatted = format!("{:?}", error);
        assert!(formatted.contains("listen rejected"));
        assert!(formatted.contains("Caused by:"));
    }

    #[test]
    fn test_from_transport_flattens_context() {
        let err = Err::<(), _>(anyhow::anyhow!("permission denied"))
            .context("listen on users")
            .unwrap_err();
        let error = DocLinkError::from_transport("register failed", ErrorKind::RegistrationFailed, err);
        assert_eq!(error.kind(), &ErrorKind::RegistrationFailed);
        assert!(error.message().contains("listen on users"));
        assert!(error.message().contains("permission denied"));
        assert!(error.cause().is_some());
    }

    #[test]
    fn test_serde_errors_map_to_encoding() {
        let error = <DocLinkError as ser::Error>::custom("bad value");
        assert_eq!(error.kind(), &ErrorKind::EncodingError);
        let error = <DocLinkError as de::Error>::custom("bad payload");
        assert_eq!(error.kind(), &ErrorKind::EncodingError);
    }

    #[test]
    fn test_error_kind_display() {
        assert_eq!(ErrorKind::DuplicateCondition.to_string(), "Duplicate condition");
        assert_eq!(ErrorKind::CursorConflict.to_string(), "Cursor conflict");
        assert_eq!(ErrorKind::UnregistrationFailed.to_string(), "Unregistration failed");
    }
}
