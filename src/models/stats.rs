use serde::{Deserialize, Serialize};

#[cfg(feature = "ts")]
use ts_rs::TS;

/// Aggregated counters for the dashboard landing view.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(TS), ts(export))]
pub struct DashboardStats {
    #[serde(rename = "openTasks", default)]
    pub open_tasks: i64,
    #[serde(rename = "completedTasks", default)]
    pub completed_tasks: i64,
    #[serde(rename = "vehiclesTotal", default)]
    pub vehicles_total: i64,
    #[serde(rename = "vehiclesInService", default)]
    pub vehicles_in_service: i64,
    #[serde(rename = "machineryTotal", default)]
    pub machinery_total: i64,
    #[serde(rename = "workersActive", default)]
    pub workers_active: i64,
    #[serde(rename = "unreadNotifications", default)]
    pub unread_notifications: i64,
}
