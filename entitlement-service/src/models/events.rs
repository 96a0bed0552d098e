//! Change event model - downstream notifications for membership mutations.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChangeEventKind {
    GroupChanged,
    GroupDeleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeEventAction {
    Add,
    Remove,
    Replace,
}

/// Event emitted after a successful mutation so downstream consumers can
/// refresh derived authorization state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    pub event_id: Uuid,
    pub kind: ChangeEventKind,
    pub group: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_group_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<ChangeEventAction>,
    pub modified_by: String,
    /// Epoch milliseconds.
    pub modified_on: i64,
}

impl ChangeEvent {
    fn new(kind: ChangeEventKind, group: &str, modified_by: &str) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            kind,
            group: group.to_string(),
            user: None,
            updated_group_email: None,
            action: None,
            modified_by: modified_by.to_string(),
            modified_on: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn member_added(group: &str, member: &str, modified_by: &str) -> Self {
        let mut event = Self::new(ChangeEventKind::GroupChanged, group, modified_by);
        event.user = Some(member.to_string());
        event.action = Some(ChangeEventAction::Add);
        event
    }

    pub fn member_removed(group: &str, member: &str, modified_by: &str) -> Self {
        let mut event = Self::new(ChangeEventKind::GroupChanged, group, modified_by);
        event.user = Some(member.to_string());
        event.action = Some(ChangeEventAction::Remove);
        event
    }

    pub fn group_renamed(group: &str, updated_group_email: &str, modified_by: &str) -> Self {
        let mut event = Self::new(ChangeEventKind::GroupChanged, group, modified_by);
        event.updated_group_email = Some(updated_group_email.to_string());
        event.action = Some(ChangeEventAction::Replace);
        event
    }

    pub fn group_deleted(group: &str, modified_by: &str) -> Self {
        Self::new(ChangeEventKind::GroupDeleted, group, modified_by)
    }
}
