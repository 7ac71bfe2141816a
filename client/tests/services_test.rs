//! Users, files, cloud functions and schema maintenance.

mod common;

use std::collections::BTreeMap;
use std::sync::Arc;

use common::{client_with, test_client, test_config, url, MockTransport};
use parsekit_client::dispatcher::{HEADER_MASTER_KEY, HEADER_SESSION_TOKEN};
use parsekit_client::user::CURRENT_USER_KEY;
use parsekit_client::{delete_all, Error, KeyValueStore, MemoryStore, Method};
use parsekit_engine::{codes, FileRef, Record, Value};
use serde_json::json;

// ============================================================================
// Users
// ============================================================================

#[tokio::test]
async fn test_sign_up_persists_current_user() {
    let transport = MockTransport::new();
    transport.respond(
        201,
        json!({
            "objectId": "u1",
            "createdAt": "2024-01-01T00:00:00.000Z",
            "sessionToken": "r:new",
        }),
    );
    let store = Arc::new(MemoryStore::new());
    let client = test_client(&transport).with_storage(store.clone());

    let mut extra = BTreeMap::new();
    extra.insert("phone".to_string(), Value::from("555-0100"));
    let user = client
        .sign_up("sean", "secret", Some("sean@example.com"), extra)
        .await
        .unwrap();

    let request = transport.last_request();
    assert_eq!(request.method, Method::Post);
    assert_eq!(request.url, url("users"));
    assert_eq!(
        request.body,
        Some(json!({
            "username": "sean",
            "password": "secret",
            "email": "sean@example.com",
            "phone": "555-0100",
        }))
    );

    assert_eq!(user.object_id(), Some("u1"));
    assert_eq!(user.session_token(), Some("r:new"));
    assert!(!user.record().contains("password"));
    assert!(!user.record().is_dirty());
    assert!(store.get_string(CURRENT_USER_KEY).await.unwrap().is_some());

    let current = client.current_user().await.unwrap().unwrap();
    assert_eq!(current.username().as_deref(), Some("sean"));
    assert_eq!(current.session_token(), Some("r:new"));
}

#[tokio::test]
async fn test_login_and_logout() {
    let transport = MockTransport::new();
    transport
        .respond(
            200,
            json!({"objectId": "u1", "username": "sean", "sessionToken": "r:abc"}),
        )
        .respond(200, json!({}));
    let client = test_client(&transport);

    let user = client.login("sean", "secret").await.unwrap();
    assert_eq!(user.session_token(), Some("r:abc"));
    let login = transport.last_request();
    assert_eq!(login.url, url("login"));
    assert_eq!(login.body, Some(json!({"username": "sean", "password": "secret"})));

    client.logout().await.unwrap();
    let logout = transport.last_request();
    assert_eq!(logout.url, url("logout"));
    assert_eq!(logout.header(HEADER_SESSION_TOKEN), Some("r:abc"));
    assert!(client.current_user().await.unwrap().is_none());
}

#[tokio::test]
async fn test_logout_clears_session_even_on_failure() {
    let transport = MockTransport::new();
    transport
        .respond(200, json!({"objectId": "u1", "sessionToken": "r:abc"}))
        .respond(400, json!({"code": 209, "error": "invalid session token"}));
    let client = test_client(&transport);

    client.login("sean", "secret").await.unwrap();
    let err = client.logout().await.unwrap_err();

    assert_eq!(err.code(), 209);
    assert!(client.current_user().await.unwrap().is_none());
}

#[tokio::test]
async fn test_logout_without_user_is_noop() {
    let transport = MockTransport::new();
    let client = test_client(&transport);

    client.logout().await.unwrap();
    assert_eq!(transport.request_count(), 0);
}

#[tokio::test]
async fn test_me_uses_given_session() {
    let transport = MockTransport::new();
    transport.respond(200, json!({"objectId": "u1", "username": "sean"}));
    let client = test_client(&transport);

    let user = client.me("r:xyz").await.unwrap();

    let request = transport.last_request();
    assert_eq!(request.url, url("users/me"));
    assert_eq!(request.header(HEADER_SESSION_TOKEN), Some("r:xyz"));
    assert_eq!(user.session_token(), Some("r:xyz"));
    assert_eq!(user.record().class_name(), "_User");
}

#[tokio::test]
async fn test_password_reset() {
    let transport = MockTransport::new();
    transport.respond(200, json!({}));
    let client = test_client(&transport);

    client.request_password_reset("sean@example.com").await.unwrap();

    let request = transport.last_request();
    assert_eq!(request.url, url("requestPasswordReset"));
    assert_eq!(request.body, Some(json!({"email": "sean@example.com"})));
}

// ============================================================================
// Files
// ============================================================================

#[tokio::test]
async fn test_upload_file() {
    let transport = MockTransport::new();
    transport.respond(
        201,
        json!({"name": "abc_hello.txt", "url": "http://files.example.com/abc_hello.txt"}),
    );
    let client = test_client(&transport);

    let file = client
        .upload_file("hello.txt", b"hello", Some("text/plain"))
        .await
        .unwrap();

    let request = transport.last_request();
    assert_eq!(request.url, url("files/hello.txt"));
    assert_eq!(
        request.body,
        Some(json!({"base64": "aGVsbG8=", "_ContentType": "text/plain"}))
    );
    assert_eq!(file.name, "abc_hello.txt");
    assert_eq!(
        file.url.as_deref(),
        Some("http://files.example.com/abc_hello.txt")
    );
}

#[tokio::test]
async fn test_upload_rejects_bad_name_locally() {
    let transport = MockTransport::new();
    let client = test_client(&transport);

    let err = client.upload_file("../etc", b"x", None).await.unwrap_err();

    assert_eq!(err.code(), codes::INVALID_FILE_NAME);
    assert_eq!(transport.request_count(), 0);
}

#[tokio::test]
async fn test_delete_file_requires_master_key() {
    let transport = MockTransport::new();
    let client = test_client(&transport);
    let file = FileRef::new("abc_hello.txt", None);

    let err = client.delete_file(&file).await.unwrap_err();
    assert!(matches!(err, Error::NotInitialized(_)));

    transport.respond(200, json!({}));
    let client = client_with(test_config().with_master_key("master"), &transport);
    client.delete_file(&file).await.unwrap();

    let request = transport.last_request();
    assert_eq!(request.method, Method::Delete);
    assert_eq!(request.url, url("files/abc_hello.txt"));
    assert_eq!(request.header(HEADER_MASTER_KEY), Some("master"));
}

// ============================================================================
// Cloud functions
// ============================================================================

#[tokio::test]
async fn test_run_function_decodes_result() {
    let transport = MockTransport::new();
    transport.respond(
        200,
        json!({"result": {"total": 3, "when": {"__type": "Date", "iso": "2024-01-01T00:00:00.000Z"}}}),
    );
    let client = test_client(&transport);

    let mut params = BTreeMap::new();
    params.insert("movie".to_string(), Value::from("The Matrix"));
    let result = client
        .run_function("averageStars", Value::Map(params))
        .await
        .unwrap();

    let request = transport.last_request();
    assert_eq!(request.url, url("functions/averageStars"));
    assert_eq!(request.body, Some(json!({"movie": "The Matrix"})));

    let map = result.as_map().unwrap();
    assert_eq!(map["total"], Value::from(3));
    assert!(map["when"].as_date().is_some());
}

#[tokio::test]
async fn test_run_function_without_result() {
    let transport = MockTransport::new();
    transport.respond(200, json!({}));
    let client = test_client(&transport);

    let result = client.run_function("ping", Value::Null).await.unwrap();

    assert!(result.is_null());
    assert_eq!(transport.last_request().body, Some(json!({})));
}

// ============================================================================
// Schema maintenance
// ============================================================================

#[tokio::test]
async fn test_schema_calls_need_master_key() {
    let transport = MockTransport::new();
    let client = test_client(&transport);

    assert!(client.schemas().await.is_err());
    assert!(client.delete_schema("GameScore").await.is_err());
    assert_eq!(transport.request_count(), 0);
}

#[tokio::test]
async fn test_schemas_and_delete_schema() {
    let transport = MockTransport::new();
    transport
        .respond(200, json!({"results": [{"className": "GameScore", "fields": {}}]}))
        .respond(200, json!({}));
    let client = client_with(test_config().with_master_key("master"), &transport);

    let schemas = client.schemas().await.unwrap();
    assert_eq!(schemas[0]["className"], "GameScore");

    client.delete_schema("GameScore").await.unwrap();
    let request = transport.last_request();
    assert_eq!(request.method, Method::Delete);
    assert_eq!(request.url, url("schemas/GameScore"));
}

#[tokio::test]
async fn test_delete_all_swallows_failures() {
    let transport = MockTransport::new();
    transport
        .respond(200, json!({}))
        .respond(403, json!({"code": 119, "error": "denied"}))
        .respond(200, json!({}));
    let client = test_client(&transport);

    let mut records = vec![
        Record::with_id("GameScore", "a"),
        Record::with_id("GameScore", "b"),
        Record::new("GameScore"),
        Record::with_id("GameScore", "c"),
    ];
    let deleted = delete_all(&client, &mut records).await;

    assert_eq!(deleted, 2);
    assert_eq!(transport.request_count(), 3);
    assert!(!records[0].is_saved());
    assert!(records[1].is_saved());
}
