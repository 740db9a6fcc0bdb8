use serde::{Deserialize, Serialize};

#[cfg(feature = "ts")]
use ts_rs::TS;

/// Work-order lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "ts", derive(TS), ts(export))]
pub enum TaskStatus {
    Pending,
    InProgress,
    Done,
    Cancelled,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "Pending"),
            TaskStatus::InProgress => write!(f, "In Progress"),
            TaskStatus::Done => write!(f, "Done"),
            TaskStatus::Cancelled => write!(f, "Cancelled"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(TS), ts(export))]
pub struct Task {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    #[serde(rename = "assigneeId")]
    pub assignee_id: Option<i64>,
    #[serde(rename = "vehicleId")]
    pub vehicle_id: Option<i64>,
    #[serde(rename = "dueDate")]
    pub due_date: Option<String>,
    #[serde(rename = "createdAt")]
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl Task {
    pub fn is_open(&self) -> bool {
        matches!(self.status, TaskStatus::Pending | TaskStatus::InProgress)
    }
}

/// Body for task create/update requests. `None` fields are omitted so a
/// partial update does not clobber what the form left untouched.
#[derive(Debug, Clone, Default, Serialize)]
#[cfg_attr(feature = "ts", derive(TS), ts(export))]
pub struct TaskPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(rename = "assigneeId", skip_serializing_if = "Option::is_none")]
    pub assignee_id: Option<i64>,
    #[serde(rename = "vehicleId", skip_serializing_if = "Option::is_none")]
    pub vehicle_id: Option<i64>,
    #[serde(rename = "dueDate", skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_deserializes_from_api_shape() {
        let json = r#"{
            "id": 17,
            "title": "Replace brake pads",
            "description": null,
            "status": "in_progress",
            "assigneeId": 4,
            "vehicleId": 12,
            "dueDate": "2025-11-03",
            "createdAt": "2025-10-21T08:30:00Z"
        }"#;

        let task: Task = serde_json::from_str(json).expect("task parses");
        assert_eq!(task.id, 17);
        assert_eq!(task.status, TaskStatus::InProgress);
        assert_eq!(task.assignee_id, Some(4));
        assert!(task.is_open());
    }

    #[test]
    fn test_payload_omits_unset_fields() {
        let payload = TaskPayload {
            status: Some(TaskStatus::Done),
            ..Default::default()
        };
        let body = serde_json::to_value(&payload).expect("payload serializes");
        assert_eq!(body, serde_json::json!({"status": "done"}));
    }
}
