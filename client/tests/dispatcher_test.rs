//! Request dispatcher tests: headers, error mapping and retry policy.

mod common;

use std::time::Duration;

use common::{client_with, test_client, test_config, url, MockTransport};
use parsekit_client::dispatcher::{HEADER_CLIENT_KEY, HEADER_MASTER_KEY, HEADER_REQUEST_ID};
use parsekit_client::{backoff_delay, Error, Method, RequestOptions, TransportError};
use parsekit_engine::codes;
use serde_json::json;

// ============================================================================
// Retry policy
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_503_retries_with_increasing_delay_then_surfaces() {
    let transport = MockTransport::new();
    for _ in 0..5 {
        transport.respond(503, json!({"code": 1, "error": "unavailable"}));
    }
    let client = test_client(&transport);

    let err = client
        .dispatcher()
        .get("classes/GameScore", &[], &RequestOptions::default())
        .await
        .unwrap_err();

    // One initial attempt plus limit - 1 retries
    assert_eq!(transport.request_count(), 5);
    assert_eq!(err.status(), Some(503));
    assert_eq!(err.code(), 1);
    assert_eq!(err.message(), "unavailable");

    let gaps = transport.gaps();
    assert_eq!(gaps.len(), 4);
    assert!(gaps.windows(2).all(|w| w[0] < w[1]), "gaps: {gaps:?}");
    for (attempt, gap) in gaps.iter().enumerate() {
        assert!(*gap >= backoff_delay(Duration::from_millis(100), attempt as u32));
    }
}

#[tokio::test(start_paused = true)]
async fn test_404_never_retries() {
    let transport = MockTransport::new();
    transport.respond(404, json!({"code": 101, "error": "Object not found."}));
    let client = test_client(&transport);

    let err = client
        .dispatcher()
        .get("classes/GameScore/missing", &[], &RequestOptions::default())
        .await
        .unwrap_err();

    assert_eq!(transport.request_count(), 1);
    assert!(err.is_not_found());
}

#[tokio::test(start_paused = true)]
async fn test_connectivity_failure_retried_until_success() {
    let transport = MockTransport::new();
    transport
        .fail(TransportError::new("connection refused"))
        .fail(TransportError::timeout("timed out"))
        .respond(200, json!({"results": []}));
    let client = test_client(&transport);

    let body = client
        .dispatcher()
        .get("classes/GameScore", &[], &RequestOptions::default())
        .await
        .unwrap();

    assert_eq!(body, json!({"results": []}));
    assert_eq!(transport.request_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_connectivity_surfaces_last_error() {
    let transport = MockTransport::new();
    transport
        .fail(TransportError::new("connection refused"))
        .fail(TransportError::timeout("timed out"));
    let client = client_with(test_config().with_request_attempt_limit(2), &transport);

    let err = client
        .dispatcher()
        .get("classes/GameScore", &[], &RequestOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Connectivity { timeout: true, .. }));
    assert_eq!(err.code(), codes::TIMEOUT);
}

#[tokio::test(start_paused = true)]
async fn test_attempt_limit_of_one_disables_retries() {
    let transport = MockTransport::new();
    transport.respond(500, json!({"code": 1, "error": "boom"}));
    let client = client_with(test_config().with_request_attempt_limit(1), &transport);

    let result = client
        .dispatcher()
        .post("classes/GameScore", json!({}), &RequestOptions::default())
        .await;

    assert!(result.is_err());
    assert_eq!(transport.request_count(), 1);
}

// ============================================================================
// Headers and idempotency
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_idempotency_id_stable_across_retries() {
    let transport = MockTransport::new();
    transport
        .respond(502, json!({"code": 1, "error": "bad gateway"}))
        .respond(201, json!({"objectId": "g1"}));
    let client = client_with(test_config().with_idempotency(true), &transport);

    client
        .dispatcher()
        .post("classes/GameScore", json!({"score": 1}), &RequestOptions::default())
        .await
        .unwrap();

    let requests = transport.requests();
    let first = requests[0].header(HEADER_REQUEST_ID).unwrap();
    let second = requests[1].header(HEADER_REQUEST_ID).unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_idempotency_only_for_post_and_put() {
    let transport = MockTransport::new();
    transport
        .respond(200, json!({}))
        .respond(200, json!({}))
        .respond(200, json!({}));
    let client = client_with(test_config().with_idempotency(true), &transport);
    let dispatcher = client.dispatcher();
    let options = RequestOptions::default();

    dispatcher.get("classes/A", &[], &options).await.unwrap();
    dispatcher.put("classes/A/1", json!({}), &options).await.unwrap();
    dispatcher.delete("classes/A/1", &options).await.unwrap();

    let requests = transport.requests();
    assert!(requests[0].header(HEADER_REQUEST_ID).is_none());
    assert!(requests[1].header(HEADER_REQUEST_ID).is_some());
    assert!(requests[2].header(HEADER_REQUEST_ID).is_none());
}

#[tokio::test]
async fn test_no_idempotency_when_disabled() {
    let transport = MockTransport::new();
    transport.respond(201, json!({}));
    let client = test_client(&transport);

    client
        .dispatcher()
        .post("classes/A", json!({}), &RequestOptions::default())
        .await
        .unwrap();
    assert!(transport.last_request().header(HEADER_REQUEST_ID).is_none());
}

#[tokio::test]
async fn test_request_shape() {
    let transport = MockTransport::new();
    transport.respond(200, json!({"ok": true}));
    let client = client_with(test_config().with_master_key("master"), &transport);

    client
        .dispatcher()
        .request(
            Method::Get,
            "/schemas",
            &[("limit".to_string(), "1".to_string())],
            None,
            &RequestOptions::master(),
        )
        .await
        .unwrap();

    let request = transport.last_request();
    assert_eq!(request.method, Method::Get);
    assert_eq!(request.url, url("schemas"));
    assert_eq!(request.query_param("limit"), Some("1"));
    assert_eq!(request.header("X-Parse-Application-Id"), Some("test-app"));
    assert_eq!(request.header(HEADER_MASTER_KEY), Some("master"));
    assert!(request.header(HEADER_CLIENT_KEY).is_none());
}

#[tokio::test]
async fn test_invalid_success_body() {
    let transport = MockTransport::new();
    transport.respond_raw(200, "<html>");
    let client = test_client(&transport);

    let err = client
        .dispatcher()
        .get("classes/A", &[], &RequestOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.code(), codes::INVALID_JSON);
}
