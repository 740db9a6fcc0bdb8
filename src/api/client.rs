//! Typed data-access functions for the FleetDash backend.
//!
//! One group of functions per resource family. Reads flow cache →
//! deduplicator → transport; mutations skip the cache, run through the
//! deduplicator (double-submits collapse) and evict the whole resource
//! family by URL prefix on success.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::cache::{CacheService, TTL_LONG, TTL_MEDIUM, TTL_SHORT};
use crate::models::{
    DashboardStats, Machinery, MachineryPayload, Notification, Organization, OrganizationPayload,
    Task, TaskPayload, User, UserPayload, Vehicle, VehiclePayload, Worker, WorkerPayload,
};

use super::{ApiError, Deduplicator, Transport};

// Resource paths double as cache keys and invalidation prefixes.
const TASKS_PATH: &str = "/tasks";
const VEHICLES_PATH: &str = "/vehicles";
const MACHINERY_PATH: &str = "/machinery";
const WORKERS_PATH: &str = "/workers";
const NOTIFICATIONS_PATH: &str = "/notifications";
const ORGANIZATIONS_PATH: &str = "/organizations";
const USERS_PATH: &str = "/users";
const DASHBOARD_STATS_PATH: &str = "/dashboard/stats";

/// Data-access facade over the FleetDash REST API.
///
/// Holds the transport plus the process-wide cache and deduplicator. Clone
/// shares all three, so every view in the dashboard observes the same cache
/// discipline.
#[derive(Clone)]
pub struct FleetApi {
    transport: Transport,
    dedup: Arc<Deduplicator>,
    cache: Arc<CacheService>,
}

impl FleetApi {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Ok(Self {
            transport: Transport::new(base_url)?,
            dedup: Arc::new(Deduplicator::new()),
            cache: Arc::new(CacheService::new()),
        })
    }

    /// Create a FleetApi with the given bearer token, sharing the connection
    /// pool, cache and deduplicator of this one.
    pub fn with_token(&self, token: impl Into<String>) -> Self {
        Self {
            transport: self.transport.with_token(token),
            dedup: Arc::clone(&self.dedup),
            cache: Arc::clone(&self.cache),
        }
    }

    pub fn set_token(&mut self, token: impl Into<String>) {
        self.transport.set_token(token);
    }

    /// Global teardown: abort every in-flight request and drop all cached
    /// state. Called on logout.
    pub fn logout_teardown(&self) {
        debug!("tearing down data-access layer");
        self.dedup.cancel_all();
        self.cache.clear();
    }

    // ===== Tasks =====

    pub async fn get_tasks(&self, use_cache: bool) -> Result<Vec<Task>> {
        let value = self.fetch_cached(TASKS_PATH, TTL_SHORT, use_cache).await?;
        parse_items(&value).context("Failed to parse tasks response")
    }

    pub async fn create_task(&self, payload: &TaskPayload) -> Result<Task> {
        self.create(TASKS_PATH, payload)
            .await
            .context("Failed to create task")
    }

    pub async fn update_task(&self, id: i64, payload: &TaskPayload) -> Result<Task> {
        self.update(TASKS_PATH, id, payload)
            .await
            .context("Failed to update task")
    }

    pub async fn delete_task(&self, id: i64) -> Result<()> {
        self.delete(TASKS_PATH, id)
            .await
            .context("Failed to delete task")
    }

    // ===== Vehicles =====

    pub async fn get_vehicles(&self, use_cache: bool) -> Result<Vec<Vehicle>> {
        let value = self
            .fetch_cached(VEHICLES_PATH, TTL_MEDIUM, use_cache)
            .await?;
        parse_items(&value).context("Failed to parse vehicles response")
    }

    pub async fn create_vehicle(&self, payload: &VehiclePayload) -> Result<Vehicle> {
        self.create(VEHICLES_PATH, payload)
            .await
            .context("Failed to create vehicle")
    }

    pub async fn update_vehicle(&self, id: i64, payload: &VehiclePayload) -> Result<Vehicle> {
        self.update(VEHICLES_PATH, id, payload)
            .await
            .context("Failed to update vehicle")
    }

    pub async fn delete_vehicle(&self, id: i64) -> Result<()> {
        self.delete(VEHICLES_PATH, id)
            .await
            .context("Failed to delete vehicle")
    }

    // ===== Machinery =====

    pub async fn get_machinery(&self, use_cache: bool) -> Result<Vec<Machinery>> {
        let value = self
            .fetch_cached(MACHINERY_PATH, TTL_MEDIUM, use_cache)
            .await?;
        parse_items(&value).context("Failed to parse machinery response")
    }

    pub async fn create_machinery(&self, payload: &MachineryPayload) -> Result<Machinery> {
        self.create(MACHINERY_PATH, payload)
            .await
            .context("Failed to create machinery")
    }

    pub async fn update_machinery(&self, id: i64, payload: &MachineryPayload) -> Result<Machinery> {
        self.update(MACHINERY_PATH, id, payload)
            .await
            .context("Failed to update machinery")
    }

    pub async fn delete_machinery(&self, id: i64) -> Result<()> {
        self.delete(MACHINERY_PATH, id)
            .await
            .context("Failed to delete machinery")
    }

    // ===== Workers =====

    pub async fn get_workers(&self, use_cache: bool) -> Result<Vec<Worker>> {
        let value = self.fetch_cached(WORKERS_PATH, TTL_LONG, use_cache).await?;
        parse_items(&value).context("Failed to parse workers response")
    }

    pub async fn create_worker(&self, payload: &WorkerPayload) -> Result<Worker> {
        self.create(WORKERS_PATH, payload)
            .await
            .context("Failed to create worker")
    }

    pub async fn update_worker(&self, id: i64, payload: &WorkerPayload) -> Result<Worker> {
        self.update(WORKERS_PATH, id, payload)
            .await
            .context("Failed to update worker")
    }

    pub async fn delete_worker(&self, id: i64) -> Result<()> {
        self.delete(WORKERS_PATH, id)
            .await
            .context("Failed to delete worker")
    }

    // ===== Notifications =====

    pub async fn get_notifications(&self, use_cache: bool) -> Result<Vec<Notification>> {
        let value = self
            .fetch_cached(NOTIFICATIONS_PATH, TTL_SHORT, use_cache)
            .await?;
        parse_items(&value).context("Failed to parse notifications response")
    }

    pub async fn mark_notification_read(&self, id: i64) -> Result<()> {
        let path = format!("{}/{}/read", NOTIFICATIONS_PATH, id);
        self.execute(Method::PUT, path, Some(serde_json::json!({})))
            .await
            .context("Failed to mark notification read")?;
        self.cache.invalidate_pattern(NOTIFICATIONS_PATH);
        Ok(())
    }

    pub async fn delete_notification(&self, id: i64) -> Result<()> {
        self.delete(NOTIFICATIONS_PATH, id)
            .await
            .context("Failed to delete notification")
    }

    // ===== Organizations =====

    pub async fn get_organizations(&self, use_cache: bool) -> Result<Vec<Organization>> {
        let value = self
            .fetch_cached(ORGANIZATIONS_PATH, TTL_LONG, use_cache)
            .await?;
        parse_items(&value).context("Failed to parse organizations response")
    }

    pub async fn create_organization(&self, payload: &OrganizationPayload) -> Result<Organization> {
        self.create(ORGANIZATIONS_PATH, payload)
            .await
            .context("Failed to create organization")
    }

    pub async fn update_organization(
        &self,
        id: i64,
        payload: &OrganizationPayload,
    ) -> Result<Organization> {
        self.update(ORGANIZATIONS_PATH, id, payload)
            .await
            .context("Failed to update organization")
    }

    pub async fn delete_organization(&self, id: i64) -> Result<()> {
        self.delete(ORGANIZATIONS_PATH, id)
            .await
            .context("Failed to delete organization")
    }

    // ===== Users =====

    pub async fn get_users(&self, use_cache: bool) -> Result<Vec<User>> {
        let value = self.fetch_cached(USERS_PATH, TTL_LONG, use_cache).await?;
        parse_items(&value).context("Failed to parse users response")
    }

    pub async fn create_user(&self, payload: &UserPayload) -> Result<User> {
        self.create(USERS_PATH, payload)
            .await
            .context("Failed to create user")
    }

    pub async fn update_user(&self, id: i64, payload: &UserPayload) -> Result<User> {
        self.update(USERS_PATH, id, payload)
            .await
            .context("Failed to update user")
    }

    pub async fn delete_user(&self, id: i64) -> Result<()> {
        self.delete(USERS_PATH, id)
            .await
            .context("Failed to delete user")
    }

    // ===== Dashboard stats =====

    pub async fn get_dashboard_stats(&self, use_cache: bool) -> Result<DashboardStats> {
        let value = self
            .fetch_cached(DASHBOARD_STATS_PATH, TTL_MEDIUM, use_cache)
            .await?;
        serde_json::from_value(value.as_ref().clone())
            .context("Failed to parse dashboard stats response")
    }

    // ===== Plumbing =====

    /// Cached read: cache → deduplicator → transport. The request path is the
    /// cache key.
    async fn fetch_cached(
        &self,
        path: &'static str,
        ttl: Duration,
        use_cache: bool,
    ) -> Result<Arc<Value>, ApiError> {
        let dedup = Arc::clone(&self.dedup);
        let transport = self.transport.clone();
        self.cache
            .cached_fetch(path, ttl, use_cache, move || {
                let key = Deduplicator::request_key(&Method::GET, path, None);
                dedup.dedupe(&key, move || async move { transport.get(path).await })
            })
            .await
    }

    /// Uncached call through the deduplicator, used by mutations.
    async fn execute(
        &self,
        method: Method,
        path: String,
        body: Option<Value>,
    ) -> Result<Arc<Value>, ApiError> {
        let key = Deduplicator::request_key(&method, &path, body.as_ref());
        let transport = self.transport.clone();
        self.dedup
            .dedupe(&key, move || async move {
                transport.call(method, &path, body.as_ref()).await
            })
            .await
    }

    async fn create<P: serde::Serialize, T: DeserializeOwned>(
        &self,
        family: &'static str,
        payload: &P,
    ) -> Result<T> {
        let body = serde_json::to_value(payload).context("Failed to serialize payload")?;
        let value = self
            .execute(Method::POST, family.to_string(), Some(body))
            .await?;
        self.cache.invalidate_pattern(family);
        parse_item(&value)
    }

    async fn update<P: serde::Serialize, T: DeserializeOwned>(
        &self,
        family: &'static str,
        id: i64,
        payload: &P,
    ) -> Result<T> {
        let body = serde_json::to_value(payload).context("Failed to serialize payload")?;
        let path = format!("{}/{}", family, id);
        let value = self.execute(Method::PUT, path, Some(body)).await?;
        self.cache.invalidate_pattern(family);
        parse_item(&value)
    }

    async fn delete(&self, family: &'static str, id: i64) -> Result<()> {
        let path = format!("{}/{}", family, id);
        self.execute(Method::DELETE, path, None).await?;
        self.cache.invalidate_pattern(family);
        Ok(())
    }
}

/// Parse a list response. The backend wraps collections in an `{"items":
/// [...]}` envelope; a bare array is tolerated for older endpoints.
fn parse_items<T: DeserializeOwned>(value: &Value) -> Result<Vec<T>> {
    let items = match value {
        Value::Object(map) => map
            .get("items")
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("list response missing 'items' field"))?,
        Value::Array(_) => value.clone(),
        other => anyhow::bail!("unexpected list response shape: {}", other),
    };
    serde_json::from_value(items).context("Failed to parse list items")
}

fn parse_item<T: DeserializeOwned>(value: &Value) -> Result<T> {
    serde_json::from_value(value.clone()).context("Failed to parse item response")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_items_enveloped() {
        let value = json!({"items": [
            {"id": 1, "title": "Oil change", "description": null, "status": "pending",
             "assigneeId": null, "vehicleId": 3, "dueDate": null, "createdAt": null}
        ]});
        let tasks: Vec<Task> = parse_items(&value).expect("enveloped list parses");
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].title, "Oil change");
    }

    #[test]
    fn test_parse_items_bare_array() {
        let value = json!([
            {"id": 2, "licensePlate": "AB-123-CD", "make": null, "model": null,
             "year": null, "odometerKm": null, "status": "active"}
        ]);
        let vehicles: Vec<Vehicle> = parse_items(&value).expect("bare list parses");
        assert_eq!(vehicles[0].plate, "AB-123-CD");
    }

    #[test]
    fn test_parse_items_rejects_scalar() {
        let result: Result<Vec<Task>> = parse_items(&json!("nope"));
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_items_missing_envelope_field() {
        let result: Result<Vec<Task>> = parse_items(&json!({"data": []}));
        assert!(result.is_err());
    }
}
