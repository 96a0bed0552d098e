//! Ancestor projection model.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::{EntityNode, GroupType};

/// Lightweight view of a group reachable from a node, as produced by the
/// ancestor traversal. The `id` field serializes as `email` because that is
/// the shape list results are consumed in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParentReference {
    #[serde(rename = "email")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub data_partition_id: String,
}

impl ParentReference {
    pub fn from_node(group_node: &EntityNode) -> Self {
        Self {
            id: group_node.node_id.clone(),
            name: group_node.name.clone(),
            description: group_node.description.clone(),
            data_partition_id: group_node.data_partition_id.clone(),
        }
    }

    pub fn is_root_users_group(&self) -> bool {
        self.name.eq_ignore_ascii_case("users")
    }

    pub fn is_data_group(&self) -> bool {
        self.name.to_lowercase().starts_with("data.")
    }

    /// Sharing groups are excluded even though their names carry the
    /// `users.` prefix.
    pub fn is_user_group(&self) -> bool {
        let name = self.name.to_lowercase();
        (name.starts_with("users.") || name.starts_with("user.") || self.is_root_users_group())
            && !name.starts_with("users.sharing_")
    }

    pub fn is_service_group(&self) -> bool {
        self.name.to_lowercase().starts_with("service.")
    }

    pub fn matches_group_type(&self, group_type: GroupType) -> bool {
        match group_type {
            GroupType::Data => self.is_data_group(),
            GroupType::User => self.is_user_group(),
            GroupType::Service => self.is_service_group(),
        }
    }
}

/// Result of the ancestor traversal: the full reachable-ancestor set and the
/// number of traversal rounds it took to converge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentTreeDto {
    pub parent_references: HashSet<ParentReference>,
    pub max_depth: usize,
}
