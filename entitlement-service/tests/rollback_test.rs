//! Integration tests for the compensating-transaction protocol: transient
//! failures roll the graph back, concurrent-mutation failures do not.

mod common;

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use common::{ctx, email, TestApp};
use entitlement_service::dtos::{AddMemberDto, CreateGroupDto};
use entitlement_service::models::{ChildrenReference, EntityNode, ParentReference, Role};
use entitlement_service::storage::{GraphStore, InMemoryGraphStore};
use service_core::error::AppError;

#[derive(Clone, Copy)]
enum FailureKind {
    Transient,
    Conflict,
}

impl FailureKind {
    fn to_error(self) -> AppError {
        match self {
            FailureKind::Transient => AppError::ServiceUnavailable("storage offline".to_string()),
            FailureKind::Conflict => AppError::Conflict(anyhow::anyhow!("concurrent mutation")),
        }
    }
}

/// Store wrapper that fails the nth mutating call after being armed. Reads
/// and compensation calls after the failure pass through untouched.
struct FlakyStore {
    inner: InMemoryGraphStore,
    countdown: AtomicI64,
    kind: Mutex<FailureKind>,
}

impl FlakyStore {
    fn new() -> Self {
        Self {
            inner: InMemoryGraphStore::new(),
            countdown: AtomicI64::new(i64::MAX),
            kind: Mutex::new(FailureKind::Transient),
        }
    }

    /// Fail the `nth` mutating call from now with the given kind.
    fn arm(&self, nth: i64, kind: FailureKind) {
        *self.kind.lock().unwrap() = kind;
        self.countdown.store(nth, Ordering::SeqCst);
    }

    fn trip(&self) -> Result<(), AppError> {
        if self.countdown.fetch_sub(1, Ordering::SeqCst) == 1 {
            Err(self.kind.lock().unwrap().to_error())
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl GraphStore for FlakyStore {
    async fn get_node(
        &self,
        node_id: &str,
        partition_id: &str,
    ) -> Result<Option<EntityNode>, AppError> {
        self.inner.get_node(node_id, partition_id).await
    }

    async fn create_node(&self, node: &EntityNode) -> Result<(), AppError> {
        self.trip()?;
        self.inner.create_node(node).await
    }

    async fn update_node(&self, node: &EntityNode) -> Result<(), AppError> {
        self.trip()?;
        self.inner.update_node(node).await
    }

    async fn delete_node(&self, node_id: &str, partition_id: &str) -> Result<(), AppError> {
        self.trip()?;
        self.inner.delete_node(node_id, partition_id).await
    }

    async fn add_edge(
        &self,
        group: &EntityNode,
        child: &ChildrenReference,
    ) -> Result<(), AppError> {
        self.trip()?;
        self.inner.add_edge(group, child).await
    }

    async fn remove_edge(
        &self,
        group_id: &str,
        child_id: &str,
        partition_id: &str,
    ) -> Result<(), AppError> {
        self.trip()?;
        self.inner.remove_edge(group_id, child_id, partition_id).await
    }

    async fn has_direct_child(
        &self,
        group: &EntityNode,
        child: &ChildrenReference,
    ) -> Result<bool, AppError> {
        self.inner.has_direct_child(group, child).await
    }

    async fn load_direct_children(
        &self,
        partition_id: &str,
        group_id: &str,
    ) -> Result<Vec<ChildrenReference>, AppError> {
        self.inner.load_direct_children(partition_id, group_id).await
    }

    async fn load_direct_parents(
        &self,
        partition_id: &str,
        node_ids: &[String],
    ) -> Result<Vec<ParentReference>, AppError> {
        self.inner.load_direct_parents(partition_id, node_ids).await
    }

    async fn rename_group(
        &self,
        group: &EntityNode,
        new_name: &str,
        new_node_id: &str,
    ) -> Result<(), AppError> {
        self.trip()?;
        self.inner.rename_group(group, new_name, new_node_id).await
    }
}

#[tokio::test]
async fn transient_failure_mid_create_rolls_everything_back() {
    let flaky = Arc::new(FlakyStore::new());
    let app = TestApp::spawn_with_store(flaky.clone()).await;

    // Creating a data group runs three steps: node, owner edge, data-root
    // edge. Fail the third and expect the first two undone.
    flaky.arm(3, FailureKind::Transient);
    let err = app
        .state
        .groups
        .create_group(CreateGroupDto::new("data.x", ""), &ctx("alice@x.com"))
        .await
        .expect_err("Create should surface the storage failure");
    assert_eq!(err.status_code(), 503);

    let node = app
        .state
        .store
        .get_node(&email("data.x"), common::TEST_PARTITION)
        .await
        .unwrap();
    assert!(node.is_none(), "Rollback should delete the half-created node");
    assert!(app.ancestor_emails("alice@x.com").await.is_empty());

    // The store works again, so a retry goes through cleanly.
    app.create_group("data.x", "alice@x.com").await;
    assert!(app.ancestor_emails("alice@x.com").await.contains(&email("data.x")));
}

#[tokio::test]
async fn conflict_mid_create_keeps_completed_steps() {
    let flaky = Arc::new(FlakyStore::new());
    let app = TestApp::spawn_with_store(flaky.clone()).await;

    // Node creation succeeds, the owner edge hits a concurrent-mutation
    // conflict. Compensation is skipped, so the node survives.
    flaky.arm(2, FailureKind::Conflict);
    let err = app
        .state
        .groups
        .create_group(CreateGroupDto::new("users.raced", ""), &ctx("alice@x.com"))
        .await
        .expect_err("Create should surface the conflict");
    assert_eq!(err.status_code(), 409);

    let node = app
        .state
        .store
        .get_node(&email("users.raced"), common::TEST_PARTITION)
        .await
        .unwrap();
    assert!(node.is_some(), "Conflict must not trigger compensation");
    let children = app
        .state
        .store
        .load_direct_children(common::TEST_PARTITION, &email("users.raced"))
        .await
        .unwrap();
    assert!(children.is_empty(), "The failed edge must not exist");
}

#[tokio::test]
async fn transient_failure_in_add_member_leaves_no_edge() {
    let flaky = Arc::new(FlakyStore::new());
    let app = TestApp::spawn_with_store(flaky.clone()).await;
    app.create_group("users.first", "alice@x.com").await;

    flaky.arm(1, FailureKind::Transient);
    let err = app
        .state
        .members
        .add_member(
            &email("users.first"),
            AddMemberDto::new("bob@x.com", Role::Member),
            &ctx("alice@x.com"),
        )
        .await
        .expect_err("Add should surface the storage failure");
    assert_eq!(err.status_code(), 503);

    assert!(app.ancestor_emails("bob@x.com").await.is_empty());
    let children = app
        .state
        .members
        .list_members(&email("users.first"), None, &ctx("alice@x.com"))
        .await
        .unwrap();
    assert!(children.iter().all(|child| child.id != "bob@x.com"));
}

#[tokio::test]
async fn failed_delete_restores_every_removed_edge() {
    let flaky = Arc::new(FlakyStore::new());
    let app = TestApp::spawn_with_store(flaky.clone()).await;
    app.create_group("users.first", "alice@x.com").await;
    app.add_member(&email("users.first"), "bob@x.com", Role::Member, "alice@x.com")
        .await;

    // Two edge removals succeed, deleting the node itself fails. Both
    // memberships must come back.
    flaky.arm(3, FailureKind::Transient);
    let err = app
        .state
        .groups
        .delete_group(&email("users.first"), &ctx("alice@x.com"))
        .await
        .expect_err("Delete should surface the storage failure");
    assert_eq!(err.status_code(), 503);

    let children = app
        .state
        .members
        .list_members(&email("users.first"), None, &ctx("alice@x.com"))
        .await
        .unwrap();
    let mut ids: Vec<&str> = children.iter().map(|child| child.id.as_str()).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec!["alice@x.com", "bob@x.com"]);
    assert!(app.ancestor_emails("bob@x.com").await.contains(&email("users.first")));
}
