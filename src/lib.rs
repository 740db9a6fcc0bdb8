//! fleetdash-core - client-side data-access layer for the FleetDash dashboard.
//!
//! The dashboard UI is a thin rendering layer; everything with actual
//! concurrency concerns lives here:
//!
//! - [`api::Transport`]: the single HTTP primitive (JSON, bearer auth)
//! - [`api::Deduplicator`]: in-flight request coalescing and cancellation
//! - [`cache::CacheService`]: TTL cache with pattern invalidation
//! - [`polling`]: overlap-free timer-driven refresh
//! - [`api::FleetApi`]: typed functions per resource family wiring the above
//!
//! Many views independently request the same resource on mount, on interval
//! and on user action; this layer guarantees that at most one network call
//! per resource is outstanding at any instant, that stale values are never
//! served, and that teardown mid-flight never surfaces phantom errors.
//!
//! ```no_run
//! use fleetdash_core::{Config, FleetApi};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = Config::load()?;
//! let api = FleetApi::new(config.api_base_url.clone())?.with_token("jwt-from-session");
//!
//! // First call hits the network, second is served from cache.
//! let vehicles = api.get_vehicles(true).await?;
//! let again = api.get_vehicles(true).await?;
//!
//! // Guaranteed-current read right before editing.
//! let fresh = api.get_vehicles(false).await?;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod cache;
pub mod config;
pub mod models;
pub mod polling;

pub use api::{ApiError, Deduplicator, FleetApi, Transport};
pub use cache::{CacheService, TTL_LONG, TTL_MEDIUM, TTL_SHORT};
pub use config::Config;
pub use polling::{start_polling, PollingHandle};
