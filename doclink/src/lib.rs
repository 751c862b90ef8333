#![allow(clippy::new_without_default)]
//! # doclink - Queries and Live Subscriptions for Remote Document Databases
//!
//! doclink is the client-side query core of a remote document database. It
//! builds query descriptors, serializes them for a transport, and turns them
//! into live streams of result snapshots multiplexed over one connection.
//!
//! ## Key Features
//!
//! - **Immutable Queries**: every builder call returns a new descriptor; earlier
//!   descriptors never observe later refinements
//! - **Eager Validation**: malformed queries are rejected at the call that breaks
//!   them, so an invalid descriptor can never be constructed
//! - **Live Queries**: one registration per subscription no matter how many
//!   consumers attach, unregistered when the last one leaves
//! - **Pluggable Transport**: the network is behind the [Transport](transport::Transport) trait
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use doclink::client::DocLink;
//! use doclink::query::field;
//! use futures_util::StreamExt;
//!
//! let db = DocLink::builder().transport(my_transport).build()?;
//!
//! let query = db
//!     .collection("users")?
//!     .query()
//!     .filter(field("age").gte(18))?
//!     .order_by("age")?
//!     .start_after(21)?;
//!
//! // one-shot
//! let snapshot = db.fetch_once(&query).await?;
//!
//! // live
//! let subscription = db.subscribe(&query);
//! let mut stream = subscription.listen();
//! while let Some(snapshot) = stream.next().await {
//!     println!("{} documents", snapshot?.len());
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`client`] - The client and its builder
//! - [`common`] - Values, documents and shared constants
//! - [`config`] - Client configuration and query validation options
//! - [`errors`] - Error types and result definitions
//! - [`query`] - Query descriptors, filters, cursors and their wire form
//! - [`reference`] - Collection and document references
//! - [`snapshot`] - Query results
//! - [`subscription`] - Live queries, the listener registry and snapshot sinks
//! - [`transport`] - The boundary to the remote database

pub mod client;
pub mod common;
pub mod config;
pub mod errors;
pub mod query;
pub mod reference;
pub mod snapshot;
pub mod subscription;
pub mod transport;

pub use common::{atomic, Atomic, Document, SortOrder, Value};
