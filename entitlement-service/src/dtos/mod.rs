//! Request and response shapes of the workflow layer.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::Role;

static GROUP_NAME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9{}_.-]{3,128}$").expect("valid group name pattern"));

static FREE_TEXT_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^[-A-Za-z0-9 _./,;:'"!@&+%#$]{0,255}$"#).expect("valid free text pattern")
});

/// Identity and tenancy of the caller, attached to every workflow call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub requester_id: String,
    pub partition_id: String,
    /// When present, list results are narrowed to groups visible to this app.
    pub app_id: Option<String>,
}

impl RequestContext {
    pub fn new(requester_id: &str, partition_id: &str) -> Self {
        Self {
            requester_id: requester_id.to_string(),
            partition_id: partition_id.to_string(),
            app_id: None,
        }
    }

    pub fn with_app_id(mut self, app_id: &str) -> Self {
        self.app_id = Some(app_id.to_string());
        self
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateGroupDto {
    #[validate(regex(path = *GROUP_NAME_PATTERN, message = "Invalid group name"))]
    pub name: String,
    #[serde(default)]
    #[validate(regex(path = *FREE_TEXT_PATTERN, message = "Invalid group description"))]
    pub description: String,
}

impl CreateGroupDto {
    pub fn new(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AddMemberDto {
    #[validate(email(message = "Invalid member email format"))]
    pub email: String,
    pub role: Role,
}

impl AddMemberDto {
    pub fn new(email: &str, role: Role) -> Self {
        Self {
            email: email.to_string(),
            role,
        }
    }
}

/// Partial update of a group. Either field may be present; a rename runs
/// before an app-id replacement when both are.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateGroupDto {
    #[validate(regex(path = *GROUP_NAME_PATTERN, message = "Invalid group name"))]
    pub rename: Option<String>,
    pub app_ids: Option<Vec<String>>,
}

impl UpdateGroupDto {
    pub fn rename(name: &str) -> Self {
        Self {
            rename: Some(name.to_string()),
            app_ids: None,
        }
    }

    pub fn replace_app_ids(app_ids: Vec<String>) -> Self {
        Self {
            rename: None,
            app_ids: Some(app_ids),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateGroupResponse {
    pub name: String,
    pub email: String,
    pub app_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MembersCountResponse {
    pub group_email: String,
    pub members_count: usize,
}
