//! A lookup control's lifecycle: create mode, commit, edit, field changes.

mod common;

use common::Harness;
use polylookup::config::ControlConfig;
use polylookup::metadata::LinkShape;
use polylookup::session::{LookupSession, PendingSelection};
use polylookup::templating::RecordContext;
use polylookup::test_utils::{StoreFixture, ids};
use polylookup::watch::FieldWatcher;
use serde_json::json;

fn connection_control() -> ControlConfig {
    ControlConfig {
        link_relationship: Some("contact_connections2".to_string()),
        link_shape: LinkShape::Connection,
        ..ControlConfig::new("account", "account_connections1")
    }
}

#[tokio::test]
async fn test_create_mode_then_commit_then_edit() {
    let harness = Harness::new();
    let session = LookupSession::new(harness.api.clone(), connection_control(), 10).unwrap();

    // Host record not saved yet: nothing is associated, picks stay local.
    assert!(session.associated(None).await.unwrap().is_empty());
    let page = session.search("", &RecordContext::new()).await.unwrap().unwrap();
    let mut pending = PendingSelection::new();
    for record in page.records.iter().take(2) {
        pending.add(record.target_id.clone(), record.target_display_name.clone());
    }
    assert_eq!(harness.api.calls("create_record"), 0);

    let created = session.commit(&mut pending, ids::ACCOUNT).await.unwrap();
    assert_eq!(created, 2);
    assert!(pending.is_empty());
    assert_eq!(harness.api.records("connection").len(), 2);

    let listed = session.associated(Some(ids::ACCOUNT)).await.unwrap();
    assert_eq!(listed.len(), 2);
    session.remove(ids::ACCOUNT, &listed[0]).await.unwrap();
    assert!(session.is_stale());
    assert_eq!(session.associated(Some(ids::ACCOUNT)).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_field_watch_lives_as_long_as_the_subscription() {
    let harness = Harness::with_store(StoreFixture::sample());
    let config = ControlConfig {
        view: Some("Contacts by Parent".to_string()),
        custom_filter: Some(r#"<filter><condition attribute="ownerid" operator="eq" value="{{ ownerid.id }}" /></filter>"#.to_string()),
        ..ControlConfig::new("account", "account_contacts")
    };
    let session = LookupSession::new(harness.api.clone(), config, 10).unwrap();
    assert_eq!(session.watched_fields().await.unwrap(), vec!["parentcustomerid", "ownerid"]);

    let watcher = FieldWatcher::new();
    let subscription = session.watch(&watcher).await.unwrap();
    let record = RecordContext::new().with("parentcustomerid", json!({ "id": ids::ACCOUNT }));

    session.search("ann", &record).await.unwrap();
    session.search("ann", &record).await.unwrap();
    assert_eq!(harness.api.calls("retrieve_multiple"), 1);

    assert_eq!(watcher.notify("name", json!("Fabrikam")), 0);
    assert_eq!(watcher.notify("ownerid", json!({ "id": "u1" })), 1);
    session.search("ann", &record).await.unwrap();
    assert_eq!(harness.api.calls("retrieve_multiple"), 2);

    drop(subscription);
    assert_eq!(watcher.subscriber_count(), 0);
    assert_eq!(watcher.notify("ownerid", json!(null)), 0);
}

#[tokio::test]
async fn test_search_results_follow_the_host_record() {
    let harness = Harness::new();
    let config = ControlConfig {
        view: Some("Contacts by Parent".to_string()),
        ..ControlConfig::new("account", "account_contacts")
    };
    let session = LookupSession::new(harness.api.clone(), config, 10).unwrap();
    let other_account = "a0000000-0000-0000-0000-000000000002";
    let first = RecordContext::new().with("parentcustomerid", json!({ "id": ids::ACCOUNT }));
    let second = RecordContext::new().with("parentcustomerid", json!({ "id": other_account }));

    session.search("", &first).await.unwrap();
    assert!(harness.api.last_query().unwrap().template.unwrap().contains(ids::ACCOUNT));

    session.search("", &second).await.unwrap();
    assert_eq!(harness.api.calls("retrieve_multiple"), 2);
    assert!(harness.api.last_query().unwrap().template.unwrap().contains(other_account));

    // Same values for the view's fields: served from cache.
    session.search("", &first.clone().with("name", json!("Contoso"))).await.unwrap();
    session.search("", &second).await.unwrap();
    assert_eq!(harness.api.calls("retrieve_multiple"), 2);
}
