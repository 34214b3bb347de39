//! Bulk executor driving the Sync Client against a mock API

use serde_json::json;
use std::sync::Arc;
use syncro_sdk::{
    BulkAction, BulkExecutor, BulkStatus, Plan, SdkConfig, Subscription, SubscriptionStatus,
    SubscriptionStore, SyncClient,
};
use tokio::sync::Mutex;
use tokio_test::assert_ok;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn subscription(id: &str, name: &str) -> Subscription {
    serde_json::from_value(json!({
        "id": id,
        "name": name,
        "provider": name,
        "price": 10.0,
        "billing_cycle": "monthly"
    }))
    .unwrap()
}

fn store_with_selection(ids: &[&str]) -> Mutex<SubscriptionStore> {
    let mut store = SubscriptionStore::new(Plan::Pro);
    store.load(ids.iter().map(|id| subscription(id, &format!("Service {id}"))).collect());
    for id in ids {
        store.select(id).unwrap();
    }
    Mutex::new(store)
}

#[tokio::test]
async fn test_bulk_pause_through_client() {
    let server = MockServer::start().await;
    for id in ["s1", "s3"] {
        Mock::given(method("PATCH"))
            .and(path(format!("/api/subscriptions/{id}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;
    }
    Mock::given(method("PATCH"))
        .and(path("/api/subscriptions/s2"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({ "error": "db down" })))
        .expect(1)
        .mount(&server)
        .await;

    let client = Arc::new(SyncClient::new(SdkConfig::new(server.uri())).unwrap());
    let mut reports = client.events().subscribe_bulk();
    let executor = BulkExecutor::new(Arc::clone(&client), client.events().clone());
    let store = store_with_selection(&["s1", "s2", "s3"]);

    let report = assert_ok!(executor.execute(&store, BulkAction::Pause).await);

    assert_eq!(report.status(), BulkStatus::Partial);
    assert_eq!(report.succeeded_ids, vec!["s1", "s3"]);
    assert_eq!(report.failed[0].subscription_id, "s2");
    assert_eq!(report.failed[0].error, "db down");
    assert_eq!(reports.recv().await.unwrap(), report);

    let store = store.lock().await;
    assert_eq!(store.get("s1").unwrap().status, SubscriptionStatus::Paused);
    assert_eq!(store.get("s2").unwrap().status, SubscriptionStatus::Active);
    assert_eq!(store.get("s3").unwrap().status, SubscriptionStatus::Paused);
    assert!(store.selected_ids().is_empty());
}

#[tokio::test]
async fn test_bulk_delete_then_undo() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(204))
        .expect(2)
        .mount(&server)
        .await;

    let client = Arc::new(SyncClient::new(SdkConfig::new(server.uri())).unwrap());
    let executor = BulkExecutor::new(Arc::clone(&client), client.events().clone());
    let store = store_with_selection(&["s1", "s2"]);

    let report = assert_ok!(executor.execute(&store, BulkAction::Delete).await);
    assert_eq!(report.status(), BulkStatus::Success);

    let mut store = store.lock().await;
    assert!(store.is_empty());
    assert!(store.undo());
    assert_eq!(store.len(), 2);
    assert!(store.redo());
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_bulk_with_empty_selection_is_rejected() {
    let client = Arc::new(SyncClient::new(SdkConfig::default()).unwrap());
    let executor = BulkExecutor::new(Arc::clone(&client), client.events().clone());
    let store = Mutex::new(SubscriptionStore::default());

    let err = tokio_test::assert_err!(executor.execute(&store, BulkAction::Cancel).await);
    assert_eq!(err, syncro_sdk::SdkError::EmptySelection);
}
