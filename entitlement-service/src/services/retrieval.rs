//! Read-only traversal over the membership graph.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::future::try_join_all;
use service_core::error::AppError;

use crate::models::{
    ChildrenReference, ChildrenTreeDto, EntityNode, ParentReference, ParentTreeDto, Role,
};
use crate::storage::GraphStore;

use super::error::ServiceError;

/// Closure queries used by every workflow. Strictly read-only: nothing in
/// here mutates the graph.
#[derive(Clone)]
pub struct RetrievalService {
    store: Arc<dyn GraphStore>,
}

impl RetrievalService {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self { store }
    }

    /// Every group reachable upward from `member_node`, breadth first. A
    /// visited set keyed by node id and partition makes the traversal
    /// terminate on cyclic graphs; each frontier level costs one batched
    /// storage call per partition.
    pub async fn load_all_parents(
        &self,
        member_node: &EntityNode,
    ) -> Result<ParentTreeDto, AppError> {
        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(Self::visit_key(
            &member_node.node_id,
            &member_node.data_partition_id,
        ));

        let direct_parents = self
            .store
            .load_direct_parents(
                &member_node.data_partition_id,
                std::slice::from_ref(&member_node.node_id),
            )
            .await?;
        let mut all_parents: HashSet<ParentReference> = direct_parents.iter().cloned().collect();
        let mut frontier = direct_parents;
        let mut max_depth = 1;

        while !frontier.is_empty() {
            max_depth += 1;
            let mut by_partition: HashMap<String, Vec<String>> = HashMap::new();
            for parent in frontier.drain(..) {
                let key = Self::visit_key(&parent.id, &parent.data_partition_id);
                if visited.insert(key) {
                    by_partition
                        .entry(parent.data_partition_id.clone())
                        .or_default()
                        .push(parent.id);
                }
            }
            for (partition_id, node_ids) in by_partition {
                let next = self
                    .store
                    .load_direct_parents(&partition_id, &node_ids)
                    .await?;
                for parent in next {
                    all_parents.insert(parent.clone());
                    frontier.push(parent);
                }
            }
        }

        Ok(ParentTreeDto {
            parent_references: all_parents,
            max_depth,
        })
    }

    /// Every user reachable downward from `node`, breadth first. Only group
    /// children are descended into; a user node resolves to itself.
    pub async fn load_all_children_users(
        &self,
        node: &EntityNode,
    ) -> Result<ChildrenTreeDto, AppError> {
        if node.is_user() {
            return Ok(ChildrenTreeDto {
                child_user_ids: HashSet::from([node.node_id.clone()]),
                max_depth: 1,
            });
        }

        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(Self::visit_key(&node.node_id, &node.data_partition_id));
        let mut child_user_ids: HashSet<String> = HashSet::new();
        let mut frontier: Vec<(String, String)> =
            vec![(node.node_id.clone(), node.data_partition_id.clone())];
        let mut max_depth = 0;

        while !frontier.is_empty() {
            max_depth += 1;
            let loads = frontier
                .iter()
                .map(|(node_id, partition_id)| self.store.load_direct_children(partition_id, node_id));
            let levels = try_join_all(loads).await?;

            let mut next = Vec::new();
            for child in levels.into_iter().flatten() {
                if child.is_user() {
                    child_user_ids.insert(child.id);
                } else if visited.insert(Self::visit_key(&child.id, &child.data_partition_id)) {
                    next.push((child.id, child.data_partition_id));
                }
            }
            frontier = next;
        }

        Ok(ChildrenTreeDto {
            child_user_ids,
            max_depth,
        })
    }

    pub async fn get_node(
        &self,
        node_id: &str,
        partition_id: &str,
    ) -> Result<Option<EntityNode>, AppError> {
        self.store.get_node(node_id, partition_id).await
    }

    /// Load a group or fail with the canonical not-found error.
    pub async fn group_existence_validation(
        &self,
        group_id: &str,
        partition_id: &str,
    ) -> Result<EntityNode, AppError> {
        self.store
            .get_node(group_id, partition_id)
            .await?
            .ok_or_else(|| ServiceError::GroupNotFound(group_id.to_string()).into())
    }

    /// Resolve the node a removal targets. Group-shaped emails stay
    /// synthesized from the email itself; everything else is a user.
    pub fn member_node_for_removal(
        &self,
        member_email: &str,
        partition_id: &str,
        partition_domain: &str,
    ) -> EntityNode {
        if member_email.ends_with(&format!("@{}", partition_domain)) {
            EntityNode::from_group_email(member_email)
        } else {
            EntityNode::member_node_for_new_user(member_email, partition_id)
        }
    }

    pub async fn load_direct_children(
        &self,
        partition_id: &str,
        group_id: &str,
    ) -> Result<Vec<ChildrenReference>, AppError> {
        self.store.load_direct_children(partition_id, group_id).await
    }

    pub async fn load_direct_parents(
        &self,
        partition_id: &str,
        node_id: &str,
    ) -> Result<Vec<ParentReference>, AppError> {
        self.store
            .load_direct_parents(partition_id, &[node_id.to_string()])
            .await
    }

    pub async fn has_direct_child(
        &self,
        group: &EntityNode,
        child: &ChildrenReference,
    ) -> Result<bool, AppError> {
        self.store.has_direct_child(group, child).await
    }

    /// The direct edge between `member_node` and `group`, if one exists,
    /// owner probe first.
    pub async fn direct_child_reference(
        &self,
        member_node: &EntityNode,
        group: &EntityNode,
    ) -> Result<Option<ChildrenReference>, AppError> {
        for role in [Role::Owner, Role::Member] {
            let candidate = ChildrenReference::from_node(member_node, role);
            if self.store.has_direct_child(group, &candidate).await? {
                return Ok(Some(candidate));
            }
        }
        Ok(None)
    }

    /// Drop groups a given app cannot see. Nodes are re-read so a stale
    /// projection can never widen visibility.
    pub async fn filter_parents_by_app_id(
        &self,
        parents: HashSet<ParentReference>,
        partition_id: &str,
        app_id: &str,
    ) -> Result<HashSet<ParentReference>, AppError> {
        let loads = parents
            .iter()
            .map(|parent| self.store.get_node(&parent.id, partition_id));
        let nodes = try_join_all(loads).await?;

        let disallowed: HashSet<String> = nodes
            .into_iter()
            .flatten()
            .filter(|node| !node.app_ids.is_empty() && !node.app_ids.contains(app_id))
            .map(|node| node.node_id)
            .collect();

        Ok(parents
            .into_iter()
            .filter(|parent| !disallowed.contains(&parent.id))
            .collect())
    }

    /// Direct member count, optionally narrowed to one role.
    pub async fn count_members(
        &self,
        group: &EntityNode,
        role: Option<Role>,
    ) -> Result<usize, AppError> {
        let children = self
            .store
            .load_direct_children(&group.data_partition_id, &group.node_id)
            .await?;
        Ok(match role {
            Some(role) => children.iter().filter(|child| child.role == role).count(),
            None => children.len(),
        })
    }

    fn visit_key(node_id: &str, partition_id: &str) -> String {
        format!("{}-{}", node_id, partition_id)
    }
}
