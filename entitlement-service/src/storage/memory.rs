//! In-memory reference backend over adjacency lists.

use async_trait::async_trait;
use dashmap::DashMap;
use service_core::error::AppError;

use crate::models::{ChildrenReference, EntityNode, ParentReference};

use super::GraphStore;

/// Adjacency-list store keyed by `(node_id, partition_id)`. Every map entry
/// is touched under its own shard lock, which gives the record-level
/// atomicity the operation protocol relies on.
#[derive(Debug, Default)]
pub struct InMemoryGraphStore {
    nodes: DashMap<String, EntityNode>,
    children: DashMap<String, Vec<ChildrenReference>>,
    parents: DashMap<String, Vec<ParentReference>>,
}

impl InMemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(node_id: &str, partition_id: &str) -> String {
        format!("{}-{}", node_id, partition_id)
    }

    fn node_key(node: &EntityNode) -> String {
        node.unique_identifier()
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    async fn get_node(
        &self,
        node_id: &str,
        partition_id: &str,
    ) -> Result<Option<EntityNode>, AppError> {
        Ok(self
            .nodes
            .get(&Self::key(node_id, partition_id))
            .map(|entry| entry.value().clone()))
    }

    async fn create_node(&self, node: &EntityNode) -> Result<(), AppError> {
        match self.nodes.entry(Self::node_key(node)) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                if node.is_group() {
                    Err(AppError::Conflict(anyhow::anyhow!("This group already exists")))
                } else {
                    Err(AppError::Conflict(anyhow::anyhow!(
                        "Node {} already exists",
                        node.node_id
                    )))
                }
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(node.clone());
                Ok(())
            }
        }
    }

    async fn update_node(&self, node: &EntityNode) -> Result<(), AppError> {
        match self.nodes.entry(Self::node_key(node)) {
            dashmap::mapref::entry::Entry::Occupied(mut entry) => {
                entry.insert(node.clone());
                Ok(())
            }
            dashmap::mapref::entry::Entry::Vacant(_) => Err(AppError::NotFound(anyhow::anyhow!(
                "Group {} is not found",
                node.node_id
            ))),
        }
    }

    async fn delete_node(&self, node_id: &str, partition_id: &str) -> Result<(), AppError> {
        let key = Self::key(node_id, partition_id);
        if self.nodes.remove(&key).is_none() {
            return Err(AppError::NotFound(anyhow::anyhow!(
                "Group {} is not found",
                node_id
            )));
        }
        self.children.remove(&key);
        self.parents.remove(&key);
        Ok(())
    }

    async fn add_edge(
        &self,
        group: &EntityNode,
        child: &ChildrenReference,
    ) -> Result<(), AppError> {
        if !child
            .data_partition_id
            .eq_ignore_ascii_case(&group.data_partition_id)
        {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Cross partition membership is not allowed"
            )));
        }

        {
            let mut children = self
                .children
                .entry(Self::node_key(group))
                .or_default();
            if children.iter().any(|existing| existing.id == child.id) {
                return Err(AppError::Conflict(anyhow::anyhow!(
                    "{} is already a member of group {}",
                    child.id,
                    group.node_id
                )));
            }
            children.push(child.clone());
        }

        let mut parents = self
            .parents
            .entry(Self::key(&child.id, &child.data_partition_id))
            .or_default();
        parents.retain(|existing| existing.id != group.node_id);
        parents.push(ParentReference::from_node(group));
        Ok(())
    }

    async fn remove_edge(
        &self,
        group_id: &str,
        child_id: &str,
        partition_id: &str,
    ) -> Result<(), AppError> {
        let removed = match self.children.get_mut(&Self::key(group_id, partition_id)) {
            Some(mut children) => {
                let before = children.len();
                children.retain(|child| child.id != child_id);
                children.len() < before
            }
            None => false,
        };
        if !removed {
            return Err(AppError::NotFound(anyhow::anyhow!(
                "Member {} not found in group {}",
                child_id,
                group_id
            )));
        }

        if let Some(mut parents) = self.parents.get_mut(&Self::key(child_id, partition_id)) {
            parents.retain(|parent| parent.id != group_id);
        }
        Ok(())
    }

    async fn has_direct_child(
        &self,
        group: &EntityNode,
        child: &ChildrenReference,
    ) -> Result<bool, AppError> {
        Ok(self
            .children
            .get(&Self::node_key(group))
            .map(|children| {
                children
                    .iter()
                    .any(|existing| existing.id == child.id && existing.role == child.role)
            })
            .unwrap_or(false))
    }

    async fn load_direct_children(
        &self,
        partition_id: &str,
        group_id: &str,
    ) -> Result<Vec<ChildrenReference>, AppError> {
        Ok(self
            .children
            .get(&Self::key(group_id, partition_id))
            .map(|children| children.clone())
            .unwrap_or_default())
    }

    async fn load_direct_parents(
        &self,
        partition_id: &str,
        node_ids: &[String],
    ) -> Result<Vec<ParentReference>, AppError> {
        let mut result = Vec::new();
        for node_id in node_ids {
            if let Some(parents) = self.parents.get(&Self::key(node_id, partition_id)) {
                result.extend(parents.iter().cloned());
            }
        }
        Ok(result)
    }

    async fn rename_group(
        &self,
        group: &EntityNode,
        new_name: &str,
        new_node_id: &str,
    ) -> Result<(), AppError> {
        let partition_id = &group.data_partition_id;
        let old_key = Self::key(&group.node_id, partition_id);
        let new_key = Self::key(new_node_id, partition_id);

        if self.nodes.contains_key(&new_key) {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Group {} already exists",
                new_node_id
            )));
        }
        let Some((_, mut node)) = self.nodes.remove(&old_key) else {
            return Err(AppError::NotFound(anyhow::anyhow!(
                "Group {} is not found",
                group.node_id
            )));
        };
        node.node_id = new_node_id.to_string();
        node.name = new_name.to_string();
        self.nodes.insert(new_key.clone(), node.clone());

        // Edge endpoints referencing the old id move with the node.
        let children = match self.children.remove(&old_key) {
            Some((_, children)) => {
                self.children.insert(new_key.clone(), children.clone());
                children
            }
            None => Vec::new(),
        };
        for child in &children {
            if let Some(mut parents) = self
                .parents
                .get_mut(&Self::key(&child.id, &child.data_partition_id))
            {
                for parent in parents.iter_mut() {
                    if parent.id == group.node_id {
                        parent.id = new_node_id.to_string();
                        parent.name = new_name.to_string();
                    }
                }
            }
        }

        let parents = match self.parents.remove(&old_key) {
            Some((_, parents)) => {
                self.parents.insert(new_key, parents.clone());
                parents
            }
            None => Vec::new(),
        };
        for parent in &parents {
            if let Some(mut siblings) = self
                .children
                .get_mut(&Self::key(&parent.id, &parent.data_partition_id))
            {
                for sibling in siblings.iter_mut() {
                    if sibling.id == group.node_id {
                        sibling.id = new_node_id.to_string();
                    }
                }
            }
        }
        Ok(())
    }
}
