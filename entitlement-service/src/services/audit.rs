//! Audit trail for group and member mutations. Every workflow writes a
//! success or failure record; audit delivery never fails the request.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuditStatus {
    Success,
    Failure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuditAction {
    Create,
    Read,
    Update,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    pub id: Uuid,
    pub action: AuditAction,
    pub status: AuditStatus,
    pub message: String,
    pub user: String,
    pub data_partition_id: String,
    pub resources: Vec<String>,
    pub timestamp: i64,
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, record: AuditRecord);
}

/// Default sink: audit records land on the `audit` log target.
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, record: AuditRecord) {
        match serde_json::to_string(&record) {
            Ok(payload) => {
                tracing::info!(target: "audit", payload = %payload, "Audit record")
            }
            Err(e) => tracing::warn!(error = %e, "Failed to serialize audit record"),
        }
    }
}

/// Captures audit records for assertions.
pub struct RecordingAuditSink {
    pub records: std::sync::Mutex<Vec<AuditRecord>>,
}

impl Default for RecordingAuditSink {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingAuditSink {
    pub fn new() -> Self {
        Self {
            records: std::sync::Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl AuditSink for RecordingAuditSink {
    async fn record(&self, record: AuditRecord) {
        if let Ok(mut records) = self.records.lock() {
            records.push(record);
        }
    }
}

/// Per-request audit writer. Captures the requester and partition once so
/// workflow call sites only name the touched resources.
pub struct AuditLogger {
    sink: std::sync::Arc<dyn AuditSink>,
    user: String,
    data_partition_id: String,
}

impl AuditLogger {
    pub fn new(sink: std::sync::Arc<dyn AuditSink>, user: &str, data_partition_id: &str) -> Self {
        Self {
            sink,
            user: if user.is_empty() {
                "unknown".to_string()
            } else {
                user.to_string()
            },
            data_partition_id: data_partition_id.to_string(),
        }
    }

    pub async fn create_group_success(&self, group_id: &str) {
        self.group_event(AuditAction::Create, AuditStatus::Success, "Create group", group_id)
            .await;
    }

    pub async fn create_group_failure(&self, group_id: &str) {
        self.group_event(AuditAction::Create, AuditStatus::Failure, "Create group", group_id)
            .await;
    }

    pub async fn update_group_success(&self, group_id: &str) {
        self.group_event(AuditAction::Update, AuditStatus::Success, "Update group", group_id)
            .await;
    }

    pub async fn update_group_failure(&self, group_id: &str) {
        self.group_event(AuditAction::Update, AuditStatus::Failure, "Update group", group_id)
            .await;
    }

    pub async fn delete_group_success(&self, group_id: &str) {
        self.group_event(AuditAction::Delete, AuditStatus::Success, "Delete group", group_id)
            .await;
    }

    pub async fn delete_group_failure(&self, group_id: &str) {
        self.group_event(AuditAction::Delete, AuditStatus::Failure, "Delete group", group_id)
            .await;
    }

    pub async fn add_member_success(&self, group_id: &str, member_id: &str, role: &str) {
        self.member_added_event(AuditStatus::Success, group_id, member_id, role)
            .await;
    }

    pub async fn add_member_failure(&self, group_id: &str, member_id: &str, role: &str) {
        self.member_added_event(AuditStatus::Failure, group_id, member_id, role)
            .await;
    }

    pub async fn remove_member_success(&self, group_id: &str, member_id: &str, requester_id: &str) {
        self.member_removed_event(AuditStatus::Success, group_id, member_id, requester_id)
            .await;
    }

    pub async fn remove_member_failure(&self, group_id: &str, member_id: &str, requester_id: &str) {
        self.member_removed_event(AuditStatus::Failure, group_id, member_id, requester_id)
            .await;
    }

    pub async fn list_members_success(&self, group_id: &str) {
        self.group_event(AuditAction::Read, AuditStatus::Success, "List members of group", group_id)
            .await;
    }

    pub async fn list_members_failure(&self, group_id: &str) {
        self.group_event(AuditAction::Read, AuditStatus::Failure, "List members of group", group_id)
            .await;
    }

    async fn group_event(&self, action: AuditAction, status: AuditStatus, verb: &str, group_id: &str) {
        self.write(
            action,
            status,
            format!("{} {}", verb, group_id),
            vec![self.data_partition_id.clone(), group_id.to_string()],
        )
        .await;
    }

    async fn member_added_event(
        &self,
        status: AuditStatus,
        group_id: &str,
        member_id: &str,
        role: &str,
    ) {
        self.write(
            AuditAction::Update,
            status,
            format!("Add entity {} to group {} as {}", member_id, group_id, role),
            vec![
                self.data_partition_id.clone(),
                group_id.to_string(),
                member_id.to_string(),
                role.to_string(),
            ],
        )
        .await;
    }

    async fn member_removed_event(
        &self,
        status: AuditStatus,
        group_id: &str,
        member_id: &str,
        requester_id: &str,
    ) {
        self.write(
            AuditAction::Delete,
            status,
            format!(
                "Remove entity {} from group {} as requested by {}",
                member_id, group_id, requester_id
            ),
            vec![
                self.data_partition_id.clone(),
                group_id.to_string(),
                member_id.to_string(),
                requester_id.to_string(),
            ],
        )
        .await;
    }

    async fn write(
        &self,
        action: AuditAction,
        status: AuditStatus,
        message: String,
        resources: Vec<String>,
    ) {
        self.sink
            .record(AuditRecord {
                id: Uuid::new_v4(),
                action,
                status,
                message,
                user: self.user.clone(),
                data_partition_id: self.data_partition_id.clone(),
                resources,
                timestamp: Utc::now().timestamp_millis(),
            })
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_success_and_failure_records_pair_up() {
        let sink = Arc::new(RecordingAuditSink::new());
        let logger = AuditLogger::new(Arc::clone(&sink) as Arc<dyn AuditSink>, "admin@x.com", "dp");

        logger.create_group_success("data.x@dp.group.com").await;
        logger.create_group_failure("data.y@dp.group.com").await;

        let records = sink.records.lock().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].status, AuditStatus::Success);
        assert_eq!(records[1].status, AuditStatus::Failure);
        assert_eq!(records[0].message, "Create group data.x@dp.group.com");
        assert_eq!(
            records[0].resources,
            vec!["dp".to_string(), "data.x@dp.group.com".to_string()]
        );
    }

    #[tokio::test]
    async fn test_empty_user_is_recorded_as_unknown() {
        let sink = Arc::new(RecordingAuditSink::new());
        let logger = AuditLogger::new(Arc::clone(&sink) as Arc<dyn AuditSink>, "", "dp");
        logger
            .remove_member_success("data.x@dp.group.com", "bob@x.com", "admin@x.com")
            .await;
        assert_eq!(sink.records.lock().unwrap()[0].user, "unknown");
    }
}
