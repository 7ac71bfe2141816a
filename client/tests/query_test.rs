//! Query execution tests against a scripted backend.

mod common;

use common::{test_client, url, MockTransport};
use parsekit_client::{Method, QueryExt};
use parsekit_engine::{GeoPoint, Query, Record, Value};
use serde_json::{json, Value as Json};

fn where_param(request: &parsekit_client::HttpRequest) -> Json {
    serde_json::from_str(request.query_param("where").unwrap()).unwrap()
}

#[tokio::test]
async fn test_find_serializes_params_and_decodes_in_order() {
    let transport = MockTransport::new();
    transport.respond(
        200,
        json!({"results": [
            {"objectId": "b", "score": 30},
            {"objectId": "a", "score": 20},
        ]}),
    );
    let client = test_client(&transport);

    let results = Query::new("GameScore")
        .where_greater_than("score", 10)
        .where_less_than("score", 50)
        .include("owner")
        .order_by_descending("score")
        .limit(2)
        .find(&client)
        .await
        .unwrap();

    let request = transport.last_request();
    assert_eq!(request.method, Method::Get);
    assert_eq!(request.url, url("classes/GameScore"));
    assert_eq!(where_param(&request), json!({"score": {"$gt": 10, "$lt": 50}}));
    assert_eq!(request.query_param("include"), Some("owner"));
    assert_eq!(request.query_param("order"), Some("-score"));
    assert_eq!(request.query_param("limit"), Some("2"));
    assert_eq!(request.query_param("skip"), None);
    assert_eq!(request.query_param("keys"), None);

    let ids: Vec<_> = results.iter().map(|r| r.object_id().unwrap()).collect();
    assert_eq!(ids, vec!["b", "a"]);
    assert!(results.iter().all(|r| r.class_name() == "GameScore"));
    assert!(results.iter().all(|r| !r.is_dirty()));
}

#[tokio::test]
async fn test_empty_query_sends_no_params() {
    let transport = MockTransport::new();
    transport.respond(200, json!({"results": []}));
    let client = test_client(&transport);

    let results = Query::new("GameScore").find(&client).await.unwrap();

    assert!(results.is_empty());
    assert!(transport.last_request().query.is_empty());
}

#[tokio::test]
async fn test_first_forces_limit_one() {
    let transport = MockTransport::new();
    transport
        .respond(200, json!({"results": [{"objectId": "a"}]}))
        .respond(200, json!({"results": []}));
    let client = test_client(&transport);
    let query = Query::new("GameScore").where_equal_to("player", "Sean").limit(50);

    let first = query.first(&client).await.unwrap();
    assert_eq!(first.unwrap().object_id(), Some("a"));
    assert_eq!(transport.last_request().query_param("limit"), Some("1"));

    assert!(query.first(&client).await.unwrap().is_none());
}

#[tokio::test]
async fn test_count_uses_count_flag() {
    let transport = MockTransport::new();
    transport.respond(200, json!({"results": [], "count": 42}));
    let client = test_client(&transport);

    let count = Query::new("GameScore")
        .where_exists("score")
        .limit(10)
        .count(&client)
        .await
        .unwrap();

    assert_eq!(count, 42);
    let request = transport.last_request();
    assert_eq!(request.query_param("count"), Some("1"));
    assert_eq!(request.query_param("limit"), Some("0"));
    assert_eq!(where_param(&request), json!({"score": {"$exists": true}}));
}

#[tokio::test]
async fn test_get_missing_returns_none() {
    let transport = MockTransport::new();
    transport.respond(404, json!({"code": 101, "error": "Object not found."}));
    let client = test_client(&transport);

    let found = Query::new("GameScore").get(&client, "nope").await.unwrap();

    assert!(found.is_none());
    assert_eq!(transport.last_request().url, url("classes/GameScore/nope"));
}

#[tokio::test]
async fn test_get_propagates_other_errors() {
    let transport = MockTransport::new();
    transport.respond(403, json!({"code": 119, "error": "Permission denied"}));
    let client = test_client(&transport);

    let err = Query::new("GameScore").get(&client, "g1").await.unwrap_err();

    assert_eq!(err.code(), 119);
    assert_eq!(transport.request_count(), 1);
}

#[tokio::test]
async fn test_get_returns_record_with_projection() {
    let transport = MockTransport::new();
    transport.respond(200, json!({"objectId": "g1", "score": 5}));
    let client = test_client(&transport);

    let record = Query::new("GameScore")
        .where_equal_to("ignored", true)
        .keys(["score"])
        .get(&client, "g1")
        .await
        .unwrap()
        .unwrap();

    assert_eq!(record.get("score"), Some(Value::from(5)));
    let request = transport.last_request();
    assert_eq!(request.query_param("keys"), Some("score"));
    assert_eq!(request.query_param("where"), None);
}

#[tokio::test]
async fn test_geo_and_regex_constraints_on_wire() {
    let transport = MockTransport::new();
    transport.respond(200, json!({"results": []}));
    let client = test_client(&transport);

    Query::new("Place")
        .where_within_kilometers("location", GeoPoint::new(10.0, 20.0).unwrap(), 5.0)
        .where_starts_with("name", "St. ")
        .find(&client)
        .await
        .unwrap();

    let clause = where_param(&transport.last_request());
    assert_eq!(
        clause["location"]["$nearSphere"],
        json!({"__type": "GeoPoint", "latitude": 10.0, "longitude": 20.0})
    );
    assert_eq!(clause["name"]["$regex"], "^St\\. ");
}

#[tokio::test]
async fn test_relation_query_targets_members() {
    let transport = MockTransport::new();
    transport.respond(200, json!({"results": [{"objectId": "t1"}]}));
    let client = test_client(&transport);

    let mut post = Record::with_id("Post", "p1");
    let tag = Record::with_id("Tag", "t1");
    let mut tags = post.relation("tags");
    tags.add([&tag]).unwrap();
    let members = tags.query().find(&client).await.unwrap();

    let request = transport.last_request();
    assert_eq!(request.url, url("classes/Tag"));
    assert_eq!(
        where_param(&request),
        json!({"$relatedTo": {
            "object": {"__type": "Pointer", "className": "Post", "objectId": "p1"},
            "key": "tags"
        }})
    );
    assert_eq!(members[0].class_name(), "Tag");
}
