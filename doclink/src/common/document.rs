use im::OrdMap;

use crate::common::{Value, FIELD_SEPARATOR};
use crate::errors::{DocLinkError, DocLinkResult, ErrorKind};
use std::collections::BTreeMap;
use std::fmt::{Debug, Display};

/// The field data of a remote document, held in a persistent ordered map.
///
/// Keys are [String]s and values are [Value]s. Nested objects are stored as
/// [Value::Map] and can be reached with a dotted path, so `doc.get("a.b")` looks
/// up key `b` inside the map stored under `a`.
///
/// ## Structural sharing
///
/// The backing `im::OrdMap` makes cloning O(1); `put` and `remove` produce a new
/// map that shares every untouched node with the old one. Snapshots hand out
/// documents freely without copying their contents.
#[derive(Clone, Eq, PartialEq, Default, serde::Deserialize, serde::Serialize)]
pub struct Document {
    data: OrdMap<String, Value>,
}

impl Document {
    /// Creates a new empty document.
    pub fn new() -> Self {
        Document {
            data: OrdMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Associates `value` with `key`.
    ///
    /// A dotted key writes into (and creates, if needed) nested maps:
    /// `put("address.city", "Paris")` stores `{"address": {"city": "Paris"}}`.
    ///
    /// # Errors
    ///
    /// Returns [ErrorKind::InvalidOperation] if the key or one of its dotted
    /// segments is empty.
    pub fn put<T: Into<Value>>(&mut self, key: &str, value: T) -> DocLinkResult<()> {
        let segments: Vec<&str> = key.split(FIELD_SEPARATOR).collect();
        if segments.iter().any(|s| s.is_empty()) {
            log::error!("Document does not support empty key segments: '{}'", key);
            return Err(DocLinkError::new(
                &format!("Document does not support empty key segments: '{}'", key),
                ErrorKind::InvalidOperation,
            ));
        }

        let value = value.into();
        match segments.split_first() {
            Some((head, [])) => {
                self.data = self.data.update(head.to_string(), value);
            }
            Some((head, rest)) => {
                let mut nested = match self.data.get(*head) {
                    Some(Value::Map(map)) => map.clone(),
                    _ => BTreeMap::new(),
                };
                deep_put(&mut nested, rest, value);
                self.data = self.data.update(head.to_string(), Value::Map(nested));
            }
            None => {}
        }
        Ok(())
    }

    /// Returns the value at `key` (dotted paths walk nested maps), or [Value::Null]
    /// when there is none.
    pub fn get(&self, key: &str) -> Value {
        self.get_ref(key).cloned().unwrap_or_default()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get_ref(key).is_some()
    }

    /// Removes a top level key, returning its value.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let (removed, data) = self.data.extract(key)?;
        self.data = data;
        Some(removed)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.data.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.data.keys()
    }

    pub(crate) fn into_map(self) -> BTreeMap<String, Value> {
        self.data.into_iter().collect()
    }

    fn get_ref(&self, key: &str) -> Option<&Value> {
        if let Some(value) = self.data.get(key) {
            return Some(value);
        }

        let mut segments = key.split(FIELD_SEPARATOR);
        let head = segments.next()?;
        let mut current = self.data.get(head)?;
        for segment in segments {
            current = match current {
                Value::Map(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }
}

fn deep_put(map: &mut BTreeMap<String, Value>, segments: &[&str], value: Value) {
    match segments.split_first() {
        Some((head, [])) => {
            map.insert(head.to_string(), value);
        }
        Some((head, rest)) => {
            let entry = map
                .entry(head.to_string())
                .or_insert_with(|| Value::Map(BTreeMap::new()));
            if !entry.is_map() {
                *entry = Value::Map(BTreeMap::new());
            }
            if let Value::Map(nested) = entry {
                deep_put(nested, rest, value);
            }
        }
        None => {}
    }
}

impl From<BTreeMap<String, Value>> for Document {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Document {
            data: map.into_iter().collect(),
        }
    }
}

impl FromIterator<(String, Value)> for Document {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Document {
            data: iter.into_iter().collect(),
        }
    }
}

impl Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.data.iter()).finish()
    }
}

impl Display for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(self, f)
    }
}

/// Creates a [Document] from key-value pairs.
///
/// ```rust
/// use doclink::doc;
///
/// let doc = doc! {
///     "name": "Alice",
///     "age": 30,
///     "address": { "city": "Paris" },
///     "tags": ["a", "b"],
/// };
/// assert_eq!(doc.get("address.city"), doclink::val!("Paris"));
/// ```
#[macro_export]
macro_rules! doc {
    () => {
        $crate::common::Document::new()
    };

    ($($key:tt : $value:tt),* $(,)?) => {
        {
            let mut doc = $crate::common::Document::new();
            $(
                doc.put($key, $crate::doc_value!($value))
                    .expect(&format!("Failed to put key {} in document", stringify!($key)));
            )*
            doc
        }
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! doc_value {
    // match a nested document
    ({ $($key:tt : $value:tt),* $(,)? }) => {
        $crate::common::Value::from($crate::doc!{ $($key : $value),* })
    };

    // match an array of values
    ([ $($value:tt),* $(,)? ]) => {
        $crate::common::Value::Array(vec![$($crate::doc_value!($value)),*])
    };

    ($value:expr) => {
        $crate::common::Value::from($value)
    };
}
