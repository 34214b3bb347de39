//! Event listener integration tests against a mock JSON-RPC node

use serde_json::json;
use std::time::Duration;
use syncro_sdk::events::{EventCursor, EventSource, RpcEventSource};
use syncro_sdk::{
    EventBus, EventListener, ListenerConfig, ListenerState, SdkConfig, SdkError, SdkEvent, SyncClient,
};
use wiremock::matchers::{body_partial_json, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn get_events_response() -> serde_json::Value {
    json!({
        "jsonrpc": "2.0",
        "id": 1,
        "result": {
            "latestLedger": 2048,
            "cursor": "0000008796093022208-0000000002",
            "events": [
                {
                    "type": "contract",
                    "ledger": 2047,
                    "ledgerClosedAt": "2026-10-01T12:00:00Z",
                    "contractId": "CSUBSCRIPTIONS",
                    "id": "0000008791798054912-0000000001",
                    "txHash": "aa11",
                    "topicJson": [{ "symbol": "renewal_attempt" }],
                    "valueJson": { "map": [
                        { "key": { "symbol": "subscription_id" }, "val": { "string": "sub-1" } },
                        { "key": { "symbol": "success" }, "val": { "bool": true } }
                    ]}
                },
                {
                    "type": "contract",
                    "ledger": 2048,
                    "contractId": "CSUBSCRIPTIONS",
                    "id": "0000008796093022208-0000000002",
                    "topicJson": [{ "symbol": "renewal_failed" }, { "string": "sub-2" }],
                    "valueJson": { "map": [
                        { "key": { "symbol": "reason" }, "val": { "string": "insufficient balance" } }
                    ]}
                }
            ]
        }
    })
}

fn source_for(server: &MockServer) -> RpcEventSource {
    RpcEventSource::new(
        server.uri(),
        vec!["CSUBSCRIPTIONS".to_string()],
        50,
        Duration::from_secs(5),
    )
    .unwrap()
}

#[tokio::test]
async fn test_rpc_source_requests_json_events_from_start_ledger() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({
            "method": "getEvents",
            "params": {
                "startLedger": 2000,
                "xdrFormat": "json",
                "pagination": { "limit": 50 }
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(get_events_response()))
        .expect(1)
        .mount(&server)
        .await;

    let batch = tokio_test::assert_ok!(source_for(&server).fetch(None, Some(2000)).await);

    assert_eq!(batch.events.len(), 2);
    assert_eq!(batch.latest_ledger, 2048);
    assert_eq!(
        batch.cursor,
        Some(EventCursor::new("0000008796093022208-0000000002"))
    );
}

#[tokio::test]
async fn test_rpc_source_uses_latest_ledger_without_position() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "method": "getLatestLedger" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": { "id": "abc", "protocolVersion": 21, "sequence": 4096 }
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({
            "method": "getEvents",
            "params": { "startLedger": 4096 }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 2,
            "result": { "latestLedger": 4096, "events": [] }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let batch = source_for(&server).fetch(None, None).await.unwrap();

    assert!(batch.events.is_empty());
    assert_eq!(batch.cursor, None);
}

#[tokio::test]
async fn test_rpc_error_object_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": { "code": -32600, "message": "startLedger must be within the ledger range" }
        })))
        .mount(&server)
        .await;

    let err = source_for(&server)
        .fetch(Some(&EventCursor::new("c1")), None)
        .await
        .unwrap_err();

    assert_eq!(
        err,
        SdkError::Rpc {
            code: -32600,
            message: "startLedger must be within the ledger range".into()
        }
    );
}

#[tokio::test]
async fn test_client_listener_publishes_renewals_in_order() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "method": "getEvents" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(get_events_response()))
        .mount(&server)
        .await;

    let client = SyncClient::new(SdkConfig::default()).unwrap();
    let mut all = client.events().subscribe_all();
    let config = ListenerConfig {
        rpc_url: server.uri(),
        contract_ids: vec!["CSUBSCRIPTIONS".into()],
        poll_interval: Duration::from_millis(20),
        start_ledger: Some(2000),
        ..Default::default()
    };

    let handle = client.listen_to_events(config).unwrap();

    let mut received = Vec::new();
    while received.len() < 3 {
        let event = tokio::time::timeout(Duration::from_secs(5), all.recv())
            .await
            .expect("event within timeout")
            .expect("bus open");
        received.push(event);
    }

    match &received[..] {
        [SdkEvent::RenewalAttempt(first), SdkEvent::RenewalAttempt(synthetic), SdkEvent::RenewalFailed(failed)] =>
        {
            assert!(first.success);
            assert_eq!(first.subscription_id, "sub-1");
            assert!(!synthetic.success);
            assert_eq!(failed.subscription_id, "sub-2");
            assert_eq!(failed.reason.as_deref(), Some("insufficient balance"));
        }
        other => panic!("unexpected events: {:?}", other),
    }

    handle.stop().await;
    handle.stop().await;
    assert_eq!(handle.state(), ListenerState::Stopped);
}

#[tokio::test]
async fn test_listener_requires_contract_ids() {
    let result = EventListener::new(ListenerConfig::default(), EventBus::new());
    assert!(matches!(result, Err(SdkError::Validation(_))));
}

#[tokio::test]
async fn test_no_events_after_stop() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let bus = EventBus::new();
    let config = ListenerConfig {
        rpc_url: server.uri(),
        contract_ids: vec!["CSUBSCRIPTIONS".into()],
        poll_interval: Duration::from_millis(10),
        start_ledger: Some(1),
        ..Default::default()
    };
    let handle = EventListener::new(config, bus.clone())
        .unwrap()
        .start();

    let mut errors = bus.subscribe_event_error();
    let first = tokio::time::timeout(Duration::from_secs(5), errors.recv())
        .await
        .expect("error event within timeout")
        .expect("bus open");
    assert!(first.message.starts_with("RPC getEvents failed"));

    handle.stop().await;
    while errors.try_recv().is_ok() {}
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(errors.try_recv().is_err());
}
