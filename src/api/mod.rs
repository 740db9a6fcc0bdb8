//! REST API layer for the FleetDash backend.
//!
//! Three pieces, leaves first:
//!
//! - [`Transport`]: one network call per invocation, JSON in/out, bearer
//!   token auth.
//! - [`Deduplicator`]: collapses concurrent identical calls into one
//!   in-flight future with cooperative cancellation.
//! - [`FleetApi`]: typed data-access functions per resource family, wired
//!   through the TTL cache and the deduplicator.

pub mod client;
pub mod dedup;
pub mod error;
pub mod transport;

pub use client::FleetApi;
pub use dedup::Deduplicator;
pub use error::ApiError;
pub use transport::Transport;
