//! Configuration management for a doclink client.

use crate::errors::DocLinkError;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

/// Validation switches applied by every [`QueryDescriptor`](crate::query::QueryDescriptor)
/// built from a configured client.
///
/// # Examples
///
/// ```rust
/// use doclink::config::QueryOptions;
///
/// let strict = QueryOptions::default();
/// assert!(!strict.allow_limit_after_order_by);
///
/// let lenient = QueryOptions::new().allow_limit_after_order_by(true);
/// assert!(lenient.allow_limit_after_order_by);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct QueryOptions {
    /// When `false` (the default), `limit` is rejected with
    /// [`ErrorKind::AlreadyOrdered`](crate::errors::ErrorKind::AlreadyOrdered) once an
    /// ordering clause is present. When `true`, `limit` and `order_by` may be
    /// applied in either order.
    pub allow_limit_after_order_by: bool,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allow_limit_after_order_by(mut self, allow: bool) -> Self {
        self.allow_limit_after_order_by = allow;
        self
    }
}

/// Callback receiving non-fatal subscription errors, such as a rejected
/// unregistration, that have no consumer left to deliver them to.
pub type OnErrorCallback = Arc<dyn Fn(&DocLinkError) + Send + Sync>;

/// Public interface for doclink client configuration.
///
/// Cloning is cheap; all clones share the same settings.
#[derive(Clone)]
pub struct DocLinkConfig {
    /// The pointer to implementation. Uses Arc for cheap cloning and thread safety.
    inner: Arc<DocLinkConfigInner>,
}

impl Default for DocLinkConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl DocLinkConfig {
    /// Creates a new configuration instance with default values.
    pub fn new() -> Self {
        DocLinkConfig {
            inner: Arc::new(DocLinkConfigInner {
                query_options: QueryOptions::default(),
                on_error: None,
            }),
        }
    }

    pub(crate) fn from_parts(query_options: QueryOptions, on_error: Option<OnErrorCallback>) -> Self {
        DocLinkConfig {
            inner: Arc::new(DocLinkConfigInner {
                query_options,
                on_error,
            }),
        }
    }

    /// Returns the query validation options.
    pub fn query_options(&self) -> QueryOptions {
        self.inner.query_options
    }

    /// Reports a non-fatal error through the diagnostic handler, if one is set.
    pub fn emit_error(&self, error: &DocLinkError) {
        if let Some(callback) = &self.inner.on_error {
            callback(error);
        }
    }

    pub fn has_error_handler(&self) -> bool {
        self.inner.on_error.is_some()
    }
}

impl Debug for DocLinkConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocLinkConfig")
            .field("query_options", &self.inner.query_options)
            .field("on_error", &self.inner.on_error.is_some())
            .finish()
    }
}

struct DocLinkConfigInner {
    query_options: QueryOptions,
    on_error: Option<OnErrorCallback>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_default_config() {
        let config = DocLinkConfig::default();
        assert_eq!(config.query_options(), QueryOptions::default());
        assert!(!config.has_error_handler());
        // no handler: must not panic
        config.emit_error(&DocLinkError::new("ignored", ErrorKind::UnregistrationFailed));
    }

    #[test]
    fn test_emit_error_invokes_handler() {
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        let config = DocLinkConfig::from_parts(
            QueryOptions::new(),
            Some(Arc::new(move |err: &DocLinkError| {
                assert_eq!(err.kind(), &ErrorKind::UnregistrationFailed);
                count_clone.fetch_add(1, Ordering::SeqCst);
            })),
        );

        let clone = config.clone();
        clone.emit_error(&DocLinkError::new("boom", ErrorKind::UnregistrationFailed));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(config.has_error_handler());
    }

    #[test]
    fn test_query_options_builder() {
        let options = QueryOptions::new().allow_limit_after_order_by(true);
        assert!(options.allow_limit_after_order_by);
    }

    #[test]
    fn test_debug_hides_callback() {
        let config = DocLinkConfig::default();
        let formatted = format!("{:?}", config);
        assert!(formatted.contains("on_error: false"));
    }
}
