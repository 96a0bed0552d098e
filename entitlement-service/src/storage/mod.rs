//! Storage port for the membership graph and its in-memory reference backend.

pub mod memory;
pub mod operations;

use async_trait::async_trait;
use service_core::error::AppError;

use crate::models::{ChildrenReference, EntityNode, ParentReference};

pub use memory::InMemoryGraphStore;
pub use operations::{
    AddEdgeOperation, CreateNodeOperation, DeleteNodeOperation, Operation, OperationRunner,
    RemoveEdgeOperation, RenameGroupOperation, UpdateAppIdsOperation,
};

/// Single-hop primitives over the membership graph. Backends guarantee
/// record-level atomicity per call; multi-step workflows get their atomicity
/// from the compensating operation protocol, not from the store.
///
/// Error contract: `create_node` and `add_edge` fail with `Conflict` when the
/// target already exists, `update_node`, `delete_node` and `remove_edge` fail
/// with `NotFound` when it does not. Those two kinds signal a concurrent
/// mutation won the race and suppress compensation.
#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn get_node(
        &self,
        node_id: &str,
        partition_id: &str,
    ) -> Result<Option<EntityNode>, AppError>;

    async fn create_node(&self, node: &EntityNode) -> Result<(), AppError>;

    /// Replace the stored metadata (description, app ids) of a node.
    async fn update_node(&self, node: &EntityNode) -> Result<(), AppError>;

    async fn delete_node(&self, node_id: &str, partition_id: &str) -> Result<(), AppError>;

    /// Attach `child` as a direct member of `group`. Both endpoints must live
    /// in the same partition.
    async fn add_edge(&self, group: &EntityNode, child: &ChildrenReference)
        -> Result<(), AppError>;

    async fn remove_edge(
        &self,
        group_id: &str,
        child_id: &str,
        partition_id: &str,
    ) -> Result<(), AppError>;

    /// Role-exact direct membership probe.
    async fn has_direct_child(
        &self,
        group: &EntityNode,
        child: &ChildrenReference,
    ) -> Result<bool, AppError>;

    async fn load_direct_children(
        &self,
        partition_id: &str,
        group_id: &str,
    ) -> Result<Vec<ChildrenReference>, AppError>;

    /// Direct parents of every node in `node_ids`, in one batched call. The
    /// ancestor traversal leans on this to keep one storage round-trip per
    /// frontier level.
    async fn load_direct_parents(
        &self,
        partition_id: &str,
        node_ids: &[String],
    ) -> Result<Vec<ParentReference>, AppError>;

    /// Rename a group in a single storage step: the node record and every
    /// edge endpoint referencing the old id move together.
    async fn rename_group(
        &self,
        group: &EntityNode,
        new_name: &str,
        new_node_id: &str,
    ) -> Result<(), AppError>;
}
