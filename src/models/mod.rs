//! Data models for FleetDash resources.
//!
//! One module per resource family as the backend exposes them:
//!
//! - `Task`, `TaskStatus`: work orders
//! - `Vehicle`, `Machinery`: fleet assets
//! - `Worker`, `User`: people and accounts
//! - `Notification`, `Organization`, `DashboardStats`
//!
//! Wire format is camelCase JSON; payload structs omit unset fields so
//! partial updates stay partial.

pub mod fleet;
pub mod notification;
pub mod organization;
pub mod person;
pub mod stats;
pub mod task;

pub use fleet::{AssetStatus, Machinery, MachineryPayload, Vehicle, VehiclePayload};
pub use notification::Notification;
pub use organization::{Organization, OrganizationPayload};
pub use person::{User, UserPayload, UserRole, Worker, WorkerPayload};
pub use stats::DashboardStats;
pub use task::{Task, TaskPayload, TaskStatus};
