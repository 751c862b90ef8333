//! Immutable query descriptors and their transport payloads.
//!
//! A query starts from a collection and is refined through chained builder
//! calls, each returning a new [QueryDescriptor]:
//!
//! ```rust
//! use doclink::query::field;
//! use doclink::reference::CollectionReference;
//!
//! # fn main() -> doclink::errors::DocLinkResult<()> {
//! let query = CollectionReference::new("cities")?
//!     .query()
//!     .filter(field("country").eq("FR"))?
//!     .filter(field("population").gt(100_000))?
//!     .limit(10)?
//!     .order_by_descending("population")?;
//!
//! let payload = query.serialize();
//! assert_eq!(payload.path(), "cities");
//! # Ok(())
//! # }
//! ```
//!
//! # Invariants
//!
//! - Filters are `(field, operator, value)` triples; a structurally equal triple
//!   cannot be added twice.
//! - At most one ordering clause.
//! - Cursors need an ordering clause; at most one start and one end cursor.
//! - A limit is at least 1.

mod cursor;
mod descriptor;
mod filter;
mod serialized;

pub use cursor::*;
pub use descriptor::*;
pub use filter::*;
pub use serialized::*;
