//! Entity node model - users and groups of the membership graph.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Kind of a graph node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NodeType {
    User,
    Group,
}

/// A vertex of the per-partition membership graph.
///
/// Group ids are email-shaped (`name@domain`); user ids are whatever identity
/// the caller presents, lowercased. Node ids are unique within a partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityNode {
    pub node_id: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub data_partition_id: String,
    #[serde(default)]
    pub app_ids: HashSet<String>,
}

impl EntityNode {
    /// Upper bound on direct parents a single node may accumulate inside one
    /// partition.
    pub const MAX_PARENTS: usize = 5000;

    const ROOT_DATA_GROUP_NAME: &'static str = "users.data.root";
    const ROOT_USERS_GROUP_NAME: &'static str = "users";

    /// Create a group node. Name and id are normalized to lowercase.
    pub fn new_group(name: &str, description: &str, partition_id: &str, domain: &str) -> Self {
        let name = name.to_lowercase();
        Self {
            node_id: format!("{}@{}", name, domain),
            node_type: NodeType::Group,
            name,
            description: description.to_string(),
            data_partition_id: partition_id.to_string(),
            app_ids: HashSet::new(),
        }
    }

    /// Synthesize the user node for the caller of an operation.
    pub fn member_node_for_requester(requester_id: &str, partition_id: &str) -> Self {
        let id = requester_id.to_lowercase();
        Self {
            node_id: id.clone(),
            node_type: NodeType::User,
            name: id,
            description: String::new(),
            data_partition_id: partition_id.to_string(),
            app_ids: HashSet::new(),
        }
    }

    /// Synthesize a user node for a member that has never been written to
    /// storage. The description keeps the caller-supplied spelling.
    pub fn member_node_for_new_user(member_id: &str, partition_id: &str) -> Self {
        let id = member_id.to_lowercase();
        Self {
            node_id: id.clone(),
            node_type: NodeType::User,
            name: id,
            description: member_id.to_string(),
            data_partition_id: partition_id.to_string(),
            app_ids: HashSet::new(),
        }
    }

    /// Synthesize a group node from its email alone. The partition id is the
    /// first label of the domain part.
    pub fn from_group_email(group_email: &str) -> Self {
        let email = group_email.to_lowercase();
        let (name, domain) = email.split_once('@').unwrap_or((email.as_str(), ""));
        let partition_id = domain.split('.').next().unwrap_or_default();
        Self {
            node_id: email.clone(),
            node_type: NodeType::Group,
            name: name.to_string(),
            description: String::new(),
            data_partition_id: partition_id.to_string(),
            app_ids: HashSet::new(),
        }
    }

    /// Rebuild a group node from an ancestor projection.
    pub fn from_parent_reference(parent: &super::ParentReference) -> Self {
        Self {
            node_id: parent.id.clone(),
            node_type: NodeType::Group,
            name: parent.name.clone(),
            description: parent.description.clone(),
            data_partition_id: parent.data_partition_id.clone(),
            app_ids: HashSet::new(),
        }
    }

    /// Email of the partition-wide data root group.
    pub fn root_data_group_email(domain: &str) -> String {
        format!("{}@{}", Self::ROOT_DATA_GROUP_NAME, domain)
    }

    /// Key that identifies this node across partitions.
    pub fn unique_identifier(&self) -> String {
        format!("{}-{}", self.node_id, self.data_partition_id)
    }

    pub fn is_group(&self) -> bool {
        self.node_type == NodeType::Group
    }

    pub fn is_user(&self) -> bool {
        self.node_type == NodeType::User
    }

    /// Data groups carry entitlements to data records.
    pub fn is_data_group(&self) -> bool {
        self.is_group() && self.name.to_lowercase().starts_with("data.")
    }

    /// User groups collect identities. Sharing groups are excluded even
    /// though their names carry the `users.` prefix.
    pub fn is_user_group(&self) -> bool {
        let name = self.name.to_lowercase();
        self.is_group()
            && (name.starts_with("users.") || name.starts_with("user.") || self.is_root_users_group())
            && !name.starts_with("users.sharing_")
    }

    /// Service groups gate access to platform services.
    pub fn is_service_group(&self) -> bool {
        self.is_group() && self.name.to_lowercase().starts_with("service.")
    }

    /// The partition-wide group every user belongs to.
    pub fn is_root_users_group(&self) -> bool {
        self.is_group() && self.name.eq_ignore_ascii_case(Self::ROOT_USERS_GROUP_NAME)
    }

    /// The group under which all data groups of a partition hang.
    pub fn is_users_data_root_group(&self) -> bool {
        self.is_group() && self.name.eq_ignore_ascii_case(Self::ROOT_DATA_GROUP_NAME)
    }

    /// Groups granting blanket platform permissions.
    pub fn is_platform_permission_group(&self) -> bool {
        self.is_group() && self.name.to_lowercase().starts_with("users.datalake.")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(name: &str) -> EntityNode {
        EntityNode::new_group(name, "", "dp", "dp.group.com")
    }

    #[test]
    fn test_new_group_normalizes_to_lowercase() {
        let node = group("Data.Default.Viewers");
        assert_eq!(node.node_id, "data.default.viewers@dp.group.com");
        assert_eq!(node.name, "data.default.viewers");
        assert!(node.is_group());
    }

    #[test]
    fn test_member_node_for_new_user_keeps_description_spelling() {
        let node = EntityNode::member_node_for_new_user("Alice@X.com", "dp");
        assert_eq!(node.node_id, "alice@x.com");
        assert_eq!(node.description, "Alice@X.com");
        assert!(node.is_user());
    }

    #[test]
    fn test_data_group_classification() {
        assert!(group("data.default.owners").is_data_group());
        assert!(!group("users.myusers").is_data_group());
    }

    #[test]
    fn test_user_group_classification_excludes_sharing_groups() {
        assert!(group("users.myusers").is_user_group());
        assert!(group("user.finance").is_user_group());
        assert!(group("users").is_user_group());
        assert!(!group("users.sharing_abc123").is_user_group());
        assert!(!group("service.storage.admin").is_user_group());
    }

    #[test]
    fn test_root_group_recognition() {
        assert!(group("users").is_root_users_group());
        assert!(group("Users.Data.Root").is_users_data_root_group());
        assert!(!group("users.data.root.extra").is_users_data_root_group());
        assert!(group("users.datalake.ops").is_platform_permission_group());
    }

    #[test]
    fn test_from_group_email_extracts_partition() {
        let node = EntityNode::from_group_email("Data.X@dp.group.com");
        assert_eq!(node.node_id, "data.x@dp.group.com");
        assert_eq!(node.name, "data.x");
        assert_eq!(node.data_partition_id, "dp");
        assert!(node.is_group());
    }

    #[test]
    fn test_root_data_group_email() {
        assert_eq!(
            EntityNode::root_data_group_email("dp.group.com"),
            "users.data.root@dp.group.com"
        );
    }

    #[test]
    fn test_serde_uses_type_field() {
        let node = group("data.x");
        let json = serde_json::to_string(&node).unwrap();
        assert!(json.contains("\"type\":\"GROUP\""));
        let back: EntityNode = serde_json::from_str(&json).unwrap();
        assert_eq!(back, node);
    }
}
