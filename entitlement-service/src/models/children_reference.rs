//! Direct-member projection model.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::{EntityNode, NodeType, Role};

/// Lightweight view of a direct member of a group, including the role the
/// membership edge carries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChildrenReference {
    pub id: String,
    #[serde(default)]
    pub data_partition_id: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub role: Role,
}

impl ChildrenReference {
    pub fn from_node(member_node: &EntityNode, role: Role) -> Self {
        Self {
            id: member_node.node_id.clone(),
            data_partition_id: member_node.data_partition_id.clone(),
            node_type: member_node.node_type,
            role,
        }
    }

    pub fn is_group(&self) -> bool {
        self.node_type == NodeType::Group
    }

    pub fn is_user(&self) -> bool {
        self.node_type == NodeType::User
    }

    pub fn is_owner(&self) -> bool {
        self.role == Role::Owner
    }

    pub fn is_users_data_root_group(&self) -> bool {
        self.id.starts_with("users.data.root@")
    }
}

/// Result of the descendant traversal: every user id reachable under a group
/// and the number of traversal rounds it took to converge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildrenTreeDto {
    pub child_user_ids: HashSet<String>,
    pub max_depth: usize,
}
