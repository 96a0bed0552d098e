//! Compensating operations for multi-step graph mutations.
//!
//! A workflow builds an ordered list of operations, and the runner executes
//! them one by one while keeping an undo stack of everything that succeeded.
//! On failure the stack is unwound in reverse order, except when the failure
//! is a conflict or a missing record: those mean a concurrent mutation
//! already won the race and compensating would clobber its writes.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use service_core::error::AppError;

use crate::models::{ChildrenReference, EntityNode};

use super::GraphStore;

#[async_trait]
pub trait Operation: Send + Sync {
    async fn execute(&self) -> Result<(), AppError>;

    /// Compensate a previously successful `execute`. Must be safe to call
    /// exactly once per successful execute.
    async fn undo(&self) -> Result<(), AppError>;

    /// Short label for rollback logging.
    fn describe(&self) -> String;
}

pub struct CreateNodeOperation {
    store: Arc<dyn GraphStore>,
    node: EntityNode,
}

impl CreateNodeOperation {
    pub fn new(store: Arc<dyn GraphStore>, node: EntityNode) -> Self {
        Self { store, node }
    }
}

#[async_trait]
impl Operation for CreateNodeOperation {
    async fn execute(&self) -> Result<(), AppError> {
        self.store.create_node(&self.node).await
    }

    async fn undo(&self) -> Result<(), AppError> {
        self.store
            .delete_node(&self.node.node_id, &self.node.data_partition_id)
            .await
    }

    fn describe(&self) -> String {
        format!("create node {}", self.node.node_id)
    }
}

pub struct DeleteNodeOperation {
    store: Arc<dyn GraphStore>,
    node: EntityNode,
}

impl DeleteNodeOperation {
    pub fn new(store: Arc<dyn GraphStore>, node: EntityNode) -> Self {
        Self { store, node }
    }
}

#[async_trait]
impl Operation for DeleteNodeOperation {
    async fn execute(&self) -> Result<(), AppError> {
        self.store
            .delete_node(&self.node.node_id, &self.node.data_partition_id)
            .await
    }

    async fn undo(&self) -> Result<(), AppError> {
        self.store.create_node(&self.node).await
    }

    fn describe(&self) -> String {
        format!("delete node {}", self.node.node_id)
    }
}

pub struct AddEdgeOperation {
    store: Arc<dyn GraphStore>,
    group: EntityNode,
    child: ChildrenReference,
}

impl AddEdgeOperation {
    pub fn new(store: Arc<dyn GraphStore>, group: EntityNode, child: ChildrenReference) -> Self {
        Self { store, group, child }
    }
}

#[async_trait]
impl Operation for AddEdgeOperation {
    async fn execute(&self) -> Result<(), AppError> {
        self.store.add_edge(&self.group, &self.child).await
    }

    async fn undo(&self) -> Result<(), AppError> {
        self.store
            .remove_edge(
                &self.group.node_id,
                &self.child.id,
                &self.group.data_partition_id,
            )
            .await
    }

    fn describe(&self) -> String {
        format!("add edge {} -> {}", self.group.node_id, self.child.id)
    }
}

pub struct RemoveEdgeOperation {
    store: Arc<dyn GraphStore>,
    group: EntityNode,
    /// Captured before removal so the undo can restore the exact role.
    child: ChildrenReference,
}

impl RemoveEdgeOperation {
    pub fn new(store: Arc<dyn GraphStore>, group: EntityNode, child: ChildrenReference) -> Self {
        Self { store, group, child }
    }
}

#[async_trait]
impl Operation for RemoveEdgeOperation {
    async fn execute(&self) -> Result<(), AppError> {
        self.store
            .remove_edge(
                &self.group.node_id,
                &self.child.id,
                &self.group.data_partition_id,
            )
            .await
    }

    async fn undo(&self) -> Result<(), AppError> {
        self.store.add_edge(&self.group, &self.child).await
    }

    fn describe(&self) -> String {
        format!("remove edge {} -> {}", self.group.node_id, self.child.id)
    }
}

pub struct UpdateAppIdsOperation {
    store: Arc<dyn GraphStore>,
    node: EntityNode,
    app_ids: HashSet<String>,
}

impl UpdateAppIdsOperation {
    pub fn new(store: Arc<dyn GraphStore>, node: EntityNode, app_ids: HashSet<String>) -> Self {
        Self { store, node, app_ids }
    }
}

#[async_trait]
impl Operation for UpdateAppIdsOperation {
    async fn execute(&self) -> Result<(), AppError> {
        let mut updated = self.node.clone();
        updated.app_ids = self.app_ids.clone();
        self.store.update_node(&updated).await
    }

    async fn undo(&self) -> Result<(), AppError> {
        self.store.update_node(&self.node).await
    }

    fn describe(&self) -> String {
        format!("update app ids of {}", self.node.node_id)
    }
}

pub struct RenameGroupOperation {
    store: Arc<dyn GraphStore>,
    group: EntityNode,
    new_name: String,
    new_node_id: String,
}

impl RenameGroupOperation {
    pub fn new(
        store: Arc<dyn GraphStore>,
        group: EntityNode,
        new_name: String,
        new_node_id: String,
    ) -> Self {
        Self {
            store,
            group,
            new_name,
            new_node_id,
        }
    }
}

#[async_trait]
impl Operation for RenameGroupOperation {
    async fn execute(&self) -> Result<(), AppError> {
        self.store
            .rename_group(&self.group, &self.new_name, &self.new_node_id)
            .await
    }

    async fn undo(&self) -> Result<(), AppError> {
        let mut renamed = self.group.clone();
        renamed.node_id = self.new_node_id.clone();
        renamed.name = self.new_name.clone();
        self.store
            .rename_group(&renamed, &self.group.name, &self.group.node_id)
            .await
    }

    fn describe(&self) -> String {
        format!("rename group {} to {}", self.group.node_id, self.new_node_id)
    }
}

/// Executes operation lists with compensation on failure.
pub struct OperationRunner;

impl OperationRunner {
    /// Run every operation in order. On failure the already-executed prefix
    /// is undone in reverse order and the original error is returned; the
    /// undo stack is always drained before returning.
    pub async fn run(operations: Vec<Box<dyn Operation>>) -> Result<(), AppError> {
        let mut executed: Vec<Box<dyn Operation>> = Vec::with_capacity(operations.len());
        for operation in operations {
            match operation.execute().await {
                Ok(()) => executed.push(operation),
                Err(err) => {
                    Self::rollback(executed, &err).await;
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    async fn rollback(mut executed: Vec<Box<dyn Operation>>, cause: &AppError) {
        if matches!(cause, AppError::Conflict(_) | AppError::NotFound(_)) {
            tracing::warn!(
                error = %cause,
                "Concurrent mutation detected, skipping rollback of {} operations",
                executed.len()
            );
            executed.clear();
            return;
        }
        while let Some(operation) = executed.pop() {
            if let Err(undo_err) = operation.undo().await {
                tracing::error!(
                    operation = %operation.describe(),
                    error = %undo_err,
                    "Failed to undo operation during rollback"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct ScriptedOperation {
        label: String,
        fail_with: Option<fn() -> AppError>,
        undo_log: Arc<Mutex<Vec<String>>>,
    }

    impl ScriptedOperation {
        fn ok(label: &str, undo_log: &Arc<Mutex<Vec<String>>>) -> Box<dyn Operation> {
            Box::new(Self {
                label: label.to_string(),
                fail_with: None,
                undo_log: Arc::clone(undo_log),
            })
        }

        fn failing(
            label: &str,
            undo_log: &Arc<Mutex<Vec<String>>>,
            fail_with: fn() -> AppError,
        ) -> Box<dyn Operation> {
            Box::new(Self {
                label: label.to_string(),
                fail_with: Some(fail_with),
                undo_log: Arc::clone(undo_log),
            })
        }
    }

    #[async_trait]
    impl Operation for ScriptedOperation {
        async fn execute(&self) -> Result<(), AppError> {
            match self.fail_with {
                Some(make_err) => Err(make_err()),
                None => Ok(()),
            }
        }

        async fn undo(&self) -> Result<(), AppError> {
            self.undo_log.lock().unwrap().push(self.label.clone());
            Ok(())
        }

        fn describe(&self) -> String {
            self.label.clone()
        }
    }

    #[tokio::test]
    async fn test_success_never_calls_undo() {
        let undo_log = Arc::new(Mutex::new(Vec::new()));
        let ops = vec![
            ScriptedOperation::ok("first", &undo_log),
            ScriptedOperation::ok("second", &undo_log),
        ];
        OperationRunner::run(ops).await.unwrap();
        assert!(undo_log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failure_unwinds_executed_prefix_in_reverse() {
        let undo_log = Arc::new(Mutex::new(Vec::new()));
        let ops = vec![
            ScriptedOperation::ok("first", &undo_log),
            ScriptedOperation::ok("second", &undo_log),
            ScriptedOperation::failing("third", &undo_log, || {
                AppError::InternalError(anyhow::anyhow!("transient storage failure"))
            }),
        ];
        let err = OperationRunner::run(ops).await.unwrap_err();
        assert_eq!(err.status_code(), 500);
        assert_eq!(*undo_log.lock().unwrap(), vec!["second", "first"]);
    }

    #[tokio::test]
    async fn test_conflict_suppresses_rollback() {
        let undo_log = Arc::new(Mutex::new(Vec::new()));
        let ops = vec![
            ScriptedOperation::ok("first", &undo_log),
            ScriptedOperation::failing("second", &undo_log, || {
                AppError::Conflict(anyhow::anyhow!("already exists"))
            }),
        ];
        let err = OperationRunner::run(ops).await.unwrap_err();
        assert_eq!(err.status_code(), 409);
        assert!(undo_log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_not_found_suppresses_rollback() {
        let undo_log = Arc::new(Mutex::new(Vec::new()));
        let ops = vec![
            ScriptedOperation::ok("first", &undo_log),
            ScriptedOperation::failing("second", &undo_log, || {
                AppError::NotFound(anyhow::anyhow!("gone"))
            }),
        ];
        let err = OperationRunner::run(ops).await.unwrap_err();
        assert_eq!(err.status_code(), 404);
        assert!(undo_log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failing_op_itself_is_not_undone() {
        let undo_log = Arc::new(Mutex::new(Vec::new()));
        let ops = vec![ScriptedOperation::failing("only", &undo_log, || {
            AppError::InternalError(anyhow::anyhow!("boom"))
        })];
        OperationRunner::run(ops).await.unwrap_err();
        assert!(undo_log.lock().unwrap().is_empty());
    }
}
