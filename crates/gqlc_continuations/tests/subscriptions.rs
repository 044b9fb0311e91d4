//! Subscribing to continuations through the schema.

mod common;

use common::{data, init_tracing, request, Fixture};
use futures::StreamExt;
use gqlc_continuations::{ContinuationConfig, MemoryAdapter};
use gqlc_runtime::{Context, PathSegment};
use serde_json::json;
use std::time::Duration;
use tokio::time::Instant;

const THREE_CONTINUATIONS: &str = r"{
  slow: continuation(waitMs: 0) {
    ... on Continuation { continuationId }
    ... on Query { remoteStats(simulateDelay: 300) { data } }
  }
  fast: continuation(waitMs: 0) {
    ... on Continuation { continuationId }
    ... on Query { remoteStats(simulateDelay: 100) { data } }
  }
  medium: continuation(waitMs: 0) {
    ... on Continuation { continuationId }
    ... on Query { remoteStats(simulateDelay: 200) { data } }
  }
}";

const SUBSCRIBE_LIST: &str = r"
subscription Results($ids: [String!]!) {
  subscribeContinuationList(continuationIds: $ids) {
    continuationId
    value {
      __typename
      ... on Query { remoteStats { data } }
    }
  }
}
";

fn fixture() -> Fixture {
    init_tracing();
    Fixture::new(ContinuationConfig::new(MemoryAdapter::new()))
}

#[tokio::test(start_paused = true)]
async fn test_single_subscription_yields_the_value() {
    let fixture = fixture();
    let issued = data(
        fixture
            .run(
                "{ continuation(waitMs: 0) { ... on Continuation { continuationId } } }",
                json!({}),
            )
            .await,
    );
    let id = issued["continuation"]["continuationId"].as_str().unwrap().to_string();

    let query = r"
        subscription One($id: String!) {
          subscribeContinuation(continuationId: $id) {
            __typename
          }
        }
    ";
    let events: Vec<_> = fixture
        .executor
        .subscribe(request(query, json!({"id": id}), Context::new()))
        .await
        .expect("subscription starts")
        .collect()
        .await;

    assert_eq!(events.len(), 1);
    assert_eq!(
        events[0].data,
        Some(json!({"subscribeContinuation": {"__typename": "Query"}}))
    );
}

#[tokio::test(start_paused = true)]
async fn test_list_subscription_follows_completion_order() {
    let fixture = fixture();
    let issued = data(fixture.run(THREE_CONTINUATIONS, json!({})).await);
    let slow = issued["slow"]["continuationId"].as_str().unwrap().to_string();
    let fast = issued["fast"]["continuationId"].as_str().unwrap().to_string();
    let medium = issued["medium"]["continuationId"].as_str().unwrap().to_string();

    let started = Instant::now();
    let stream = fixture
        .executor
        .subscribe(request(
            SUBSCRIBE_LIST,
            json!({"ids": [slow, fast, medium]}),
            Context::new(),
        ))
        .await
        .expect("subscription starts");
    let events: Vec<_> = stream.collect().await;
    assert!(started.elapsed() >= Duration::from_millis(300));

    let order: Vec<_> = events
        .iter()
        .map(|event| {
            let event = &event.data.as_ref().expect("event data")["subscribeContinuationList"];
            assert_eq!(
                event["value"],
                json!({"__typename": "Query", "remoteStats": {"data": "Remote Stats Data!"}})
            );
            event["continuationId"].as_str().unwrap().to_string()
        })
        .collect();
    assert_eq!(order, vec![fast, medium, slow]);
    assert_eq!(fixture.stats_calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_list_subscription_reads_aliased_values() {
    let fixture = fixture();
    let issued = data(fixture.run(THREE_CONTINUATIONS, json!({})).await);
    let fast = issued["fast"]["continuationId"].as_str().unwrap().to_string();

    let query = r"
        subscription Aliased($ids: [String!]!) {
          subscribeContinuationList(continuationIds: $ids) {
            id: continuationId
            stats: value { ... on Query { remoteStats { data } } }
          }
        }
    ";
    let events: Vec<_> = fixture
        .executor
        .subscribe(request(query, json!({"ids": [fast.clone()]}), Context::new()))
        .await
        .expect("subscription starts")
        .collect()
        .await;

    assert_eq!(
        events[0].data,
        Some(json!({
            "subscribeContinuationList": {
                "id": fast,
                "stats": {"remoteStats": {"data": "Remote Stats Data!"}}
            }
        }))
    );
}

#[tokio::test(start_paused = true)]
async fn test_unknown_ids_arrive_as_failed_events() {
    let fixture = fixture();
    let issued = data(fixture.run(THREE_CONTINUATIONS, json!({})).await);
    let fast = issued["fast"]["continuationId"].as_str().unwrap().to_string();

    let events: Vec<_> = fixture
        .executor
        .subscribe(request(
            SUBSCRIBE_LIST,
            json!({"ids": ["missing", fast]}),
            Context::new(),
        ))
        .await
        .expect("subscription starts")
        .collect()
        .await;
    assert_eq!(events.len(), 2);

    let missing = &events[0];
    assert_eq!(
        missing.data,
        Some(json!({"subscribeContinuationList": {"continuationId": "missing", "value": null}}))
    );
    let errors = missing.errors.as_ref().expect("failure is reported");
    assert_eq!(errors[0].code(), Some("CONTINUATION_NOT_FOUND"));
    assert_eq!(
        errors[0].path,
        Some(vec![
            PathSegment::from("subscribeContinuationList"),
            PathSegment::from("value"),
        ])
    );
    assert!(events[1].errors.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_subscriptions_respect_authorization() {
    init_tracing();
    let fixture = Fixture::new(
        ContinuationConfig::new(MemoryAdapter::new()).with_authorize(|_, _| false),
    );
    let issued = data(fixture.run(THREE_CONTINUATIONS, json!({})).await);
    let fast = issued["fast"]["continuationId"].as_str().unwrap().to_string();

    let Err(response) = fixture
        .executor
        .subscribe(request(SUBSCRIBE_LIST, json!({"ids": [fast]}), Context::new()))
        .await
    else {
        panic!("unauthorized subscription started");
    };
    let errors = response.errors.expect("rejection is reported");
    assert_eq!(errors[0].code(), Some("CONTINUATION_UNAUTHORIZED"));
}
