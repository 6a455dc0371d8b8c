//! Listing, searching and mutating associations for every shape.

mod common;

use common::{Harness, all_shape_keys, custom_key, many_to_many_key};
use polylookup::association::SearchRequest;
use polylookup::core::LookupError;
use polylookup::metadata::LinkIdKind;
use polylookup::test_utils::{StoreFixture, ids};
use serde_json::json;

#[tokio::test]
async fn test_list_without_source_record_is_empty() {
    let harness = Harness::new();
    for key in all_shape_keys() {
        let descriptor = harness.descriptor(&key).await;
        let records = harness.builder.list_associated(&descriptor, None).await.unwrap();
        assert!(records.is_empty(), "{}", descriptor.shape.kind());
    }
    assert_eq!(harness.api.calls("retrieve_multiple"), 0);
}

#[tokio::test]
async fn test_associate_then_list_for_every_shape() {
    for key in all_shape_keys() {
        let harness = Harness::new();
        let descriptor = harness.descriptor(&key).await;
        let kind = descriptor.shape.kind();

        let link_row = harness.builder.associate(&descriptor, ids::ACCOUNT, ids::CONTACT_ANN).await.unwrap();
        assert_eq!(link_row.is_some(), descriptor.shape.link_join().is_some(), "{kind}");

        let records = harness.builder.list_associated(&descriptor, Some(ids::ACCOUNT)).await.unwrap();
        assert_eq!(records.len(), 1, "{kind}");
        assert_eq!(records[0].target_id, ids::CONTACT_ANN, "{kind}");
        assert_eq!(records[0].target_display_name, "Ann Archer", "{kind}");
        assert_eq!(records[0].intersect_row_id, link_row, "{kind}");
    }
}

#[tokio::test]
async fn test_associate_then_disassociate_for_every_shape() {
    for key in all_shape_keys() {
        let harness = Harness::new();
        let descriptor = harness.descriptor(&key).await;
        let kind = descriptor.shape.link_id_kind();

        harness.builder.associate(&descriptor, ids::ACCOUNT, ids::CONTACT_BOB).await.unwrap();
        harness.builder.associate(&descriptor, ids::ACCOUNT, ids::CONTACT_CARA).await.unwrap();
        let records = harness.builder.list_associated(&descriptor, Some(ids::ACCOUNT)).await.unwrap();
        assert_eq!(records.len(), 2);

        for record in &records {
            let id = record.link_id(kind).unwrap();
            harness.builder.disassociate(&descriptor, ids::ACCOUNT, id).await.unwrap();
        }
        let records = harness.builder.list_associated(&descriptor, Some(ids::ACCOUNT)).await.unwrap();
        assert!(records.is_empty(), "{}", descriptor.shape.kind());
    }
}

#[tokio::test]
async fn test_wrong_identifier_kind_fails() {
    for key in all_shape_keys() {
        let harness = Harness::new();
        let descriptor = harness.descriptor(&key).await;
        let link_row = harness.builder.associate(&descriptor, ids::ACCOUNT, ids::CONTACT_ANN).await.unwrap();

        let wrong_id = match descriptor.shape.link_id_kind() {
            LinkIdKind::TargetId => "e0000000-0000-0000-0000-00000000dead".to_string(),
            LinkIdKind::IntersectRowId => ids::CONTACT_ANN.to_string(),
        };
        let err = harness.builder.disassociate(&descriptor, ids::ACCOUNT, &wrong_id).await.unwrap_err();
        assert!(matches!(err, LookupError::AssociationError { .. }), "{err}");

        let records = harness.builder.list_associated(&descriptor, Some(ids::ACCOUNT)).await.unwrap();
        assert_eq!(records.len(), 1, "nothing may be removed on a rejected call");
        assert_eq!(records[0].intersect_row_id, link_row);
    }
}

#[tokio::test]
async fn test_search_requests_one_extra_row() {
    // Three sample contacts plus six generated ones.
    let harness = Harness::with_store(StoreFixture::sample().with_generated_contacts(6));
    let descriptor = harness.descriptor(&many_to_many_key()).await;

    let page = harness.builder.search(&descriptor, &SearchRequest::new("", 8)).await.unwrap();
    assert_eq!(harness.api.last_query().unwrap().top, Some(9));
    assert_eq!(page.records.len(), 8);
    assert!(page.has_more);

    let page = harness.builder.search(&descriptor, &SearchRequest::new("", 9)).await.unwrap();
    assert_eq!(harness.api.last_query().unwrap().top, Some(10));
    assert_eq!(page.records.len(), 9);
    assert!(!page.has_more);

    let page = harness.builder.search(&descriptor, &SearchRequest::new("generated 00", 3)).await.unwrap();
    assert_eq!(page.records.len(), 3);
    assert!(page.has_more);
}

#[tokio::test]
async fn test_connectionrow_scenario() {
    let harness = Harness::new();
    let descriptor = harness.descriptor(&custom_key()).await;

    let row_id = harness
        .builder
        .associate(&descriptor, ids::ACCOUNT, ids::CONTACT_BOB)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(harness.api.calls("create_record"), 1);

    let rows = harness.api.records("connectionrow");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("sourceid"), Some(&json!(ids::ACCOUNT)));
    assert_eq!(rows[0].get("targetid"), Some(&json!(ids::CONTACT_BOB)));

    harness.builder.disassociate(&descriptor, ids::ACCOUNT, &row_id).await.unwrap();
    assert_eq!(harness.api.calls("delete_record"), 1);
    assert_eq!(harness.api.calls("disassociate"), 0);
    assert!(harness.api.records("connectionrow").is_empty());
    assert_eq!(harness.api.records("contact").len(), 3);
}

#[tokio::test]
async fn test_records_of_other_sources_are_not_listed() {
    let harness = Harness::new();
    let descriptor = harness.descriptor(&custom_key()).await;
    harness.builder.associate(&descriptor, ids::ACCOUNT, ids::CONTACT_ANN).await.unwrap();

    let other = "a0000000-0000-0000-0000-000000000002";
    let records = harness.builder.list_associated(&descriptor, Some(other)).await.unwrap();
    assert!(records.is_empty());

    let braced = format!("{{{}}}", ids::ACCOUNT.to_uppercase());
    let records = harness.builder.list_associated(&descriptor, Some(&braced)).await.unwrap();
    assert_eq!(records.len(), 1);
}
