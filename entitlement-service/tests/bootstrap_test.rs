//! Integration tests for partition bootstrap provisioning and the
//! privileged groups it creates.

mod common;

use common::{ctx, email, test_config, TestApp, SERVICE_PRINCIPAL, TEST_PARTITION};
use entitlement_service::dtos::CreateGroupDto;
use entitlement_service::models::Role;
use entitlement_service::services::DEFAULT_GROUP_NAMES;

#[tokio::test]
async fn provisioning_is_idempotent() {
    let app = TestApp::spawn_bare(test_config());

    let created = app
        .state
        .bootstrap
        .provision_partition(TEST_PARTITION)
        .await
        .expect("First provision should succeed");
    assert_eq!(created.len(), DEFAULT_GROUP_NAMES.len());

    let again = app
        .state
        .bootstrap
        .provision_partition(TEST_PARTITION)
        .await
        .expect("Second provision should succeed");
    assert!(again.is_empty(), "Existing groups must not be recreated");
}

#[tokio::test]
async fn principal_owns_the_provisioned_groups() {
    let app = TestApp::spawn().await;

    let ancestors = app.ancestor_emails(SERVICE_PRINCIPAL).await;
    for name in DEFAULT_GROUP_NAMES {
        assert!(
            ancestors.contains(&email(name)),
            "Principal should sit in {}: {:?}",
            name,
            ancestors
        );
    }

    let owners = app
        .state
        .members
        .list_members(
            &email("service.entitlements.admin"),
            Some(Role::Owner),
            &ctx(SERVICE_PRINCIPAL),
        )
        .await
        .expect("Principal should be able to list members");
    assert!(owners.iter().any(|child| child.id == SERVICE_PRINCIPAL.to_lowercase()));
}

#[tokio::test]
async fn datalake_groups_nest_under_the_root_users_group() {
    let app = TestApp::spawn().await;

    let children = app
        .state
        .members
        .list_members(&email("users"), None, &ctx(SERVICE_PRINCIPAL))
        .await
        .expect("Principal should be able to list the root group");
    let ids: Vec<&str> = children.iter().map(|child| child.id.as_str()).collect();
    assert!(ids.contains(&email("users.data.root").as_str()));
    assert!(ids.contains(&email("users.datalake.ops").as_str()));
    assert!(ids.contains(&email("users.datalake.admins").as_str()));
}

#[tokio::test]
async fn ops_membership_grants_management_everywhere() {
    let app = TestApp::spawn().await;
    app.create_group("users.private", "alice@x.com").await;
    app.add_member(
        &email("users.datalake.ops"),
        "dave@x.com",
        Role::Member,
        SERVICE_PRINCIPAL,
    )
    .await;

    // dave owns nothing, but ops membership carries owner-level rights.
    app.add_member(&email("users.private"), "carol@x.com", Role::Member, "dave@x.com")
        .await;
    let impacted = app
        .state
        .groups
        .delete_group(&email("users.private"), &ctx("dave@x.com"))
        .await
        .expect("Ops member should be able to delete the group");
    assert!(impacted.contains("carol@x.com"));
}

#[tokio::test]
async fn data_groups_require_a_provisioned_partition() {
    let app = TestApp::spawn_bare(test_config());

    let err = app
        .state
        .groups
        .create_group(CreateGroupDto::new("data.x", ""), &ctx("alice@x.com"))
        .await
        .expect_err("Data group creation needs the data root group");
    assert_eq!(err.status_code(), 404);
    assert_eq!(
        err.to_response().message,
        format!("Group {} is not found", email("users.data.root"))
    );
}

#[tokio::test]
async fn data_root_parent_quota_caps_data_group_creation() {
    let mut config = test_config();
    config.quota.data_root_max_parents = 2;
    let app = TestApp::spawn_with_config(config).await;

    // The data root already sits in the root users group, so the second data
    // group pushes its parent count to the limit.
    app.create_group("data.a", "alice@x.com").await;
    let err = app
        .state
        .groups
        .create_group(CreateGroupDto::new("data.b", ""), &ctx("alice@x.com"))
        .await
        .expect_err("Data root parent quota should trip");
    assert_eq!(err.status_code(), 412);
    assert!(err.to_response().message.contains("group quota hit"));
}
