//! Request caching for dashboard reads.
//!
//! This module provides the process-wide [`CacheService`]: a TTL cache over
//! parsed JSON responses with pending-fill coalescing and pattern-based
//! invalidation. Mutating operations evict whole resource families by URL
//! prefix rather than tracking exact keys.

pub mod service;

pub use service::{CacheService, TTL_LONG, TTL_MEDIUM, TTL_SHORT};
