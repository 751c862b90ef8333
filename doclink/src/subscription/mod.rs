//! Live queries multiplexed over one transport.
//!
//! A [SubscriptionMultiplexer] turns a [QueryDescriptor](crate::query::QueryDescriptor)
//! into a [QuerySubscription]. Each subscription registers its query with the
//! [Transport](crate::transport::Transport) when its first consumer attaches and
//! unregisters it when the last one leaves. Push events come back through the
//! [ListenerRegistry], addressed by [ListenerHandle](crate::transport::ListenerHandle),
//! and are broadcast to the consumers through the subscription's [SnapshotSink].
//!
//! ```text
//!   listen() ──► Pending ──register ok──► Active ──last drop──► Cancelled ──unregister──► Closed
//!                  │                                                ▲
//!                  └──────last drop, then register ok───────────────┘
//! ```

mod live;
mod multiplexer;
mod registry;
mod sink;

pub use live::*;
pub use multiplexer::*;
pub use registry::*;
pub use sink::*;
