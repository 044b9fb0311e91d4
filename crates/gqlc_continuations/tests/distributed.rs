//! Continuations stored through the distributed adapter.

mod common;

use async_trait::async_trait;
use common::{continuation_id, data, init_tracing, Fixture};
use gqlc_continuations::{
    BackendError, ContinuationConfig, DistributedAdapter, KeyValueStore, LocalStore,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

const ISSUE: &str = r"{
  continuation(waitMs: 0) {
    ... on Continuation { continuationId }
    ... on Query { remoteStats { data } }
  }
}";

const RESOLVE: &str = r"
query Resolve($continuationId: String!) {
  resolveContinuation(continuationId: $continuationId) {
    ... on Query { remoteStats { data } }
  }
}
";

fn fixture(store: Arc<dyn KeyValueStore>, local: &LocalStore) -> Fixture {
    init_tracing();
    let adapter = DistributedAdapter::new(store, Arc::new(local.clone()));
    Fixture::new(ContinuationConfig::new(adapter))
}

#[tokio::test(start_paused = true)]
async fn test_resolves_across_adapter_instances() {
    let store = LocalStore::new();
    let issuer = fixture(Arc::new(store.clone()), &store);
    let resolver = fixture(Arc::new(store.clone()), &store);

    let issued = data(issuer.run(ISSUE, json!({})).await);
    let id = continuation_id(&issued["continuation"]);

    let started = Instant::now();
    let resolved = data(resolver.run(RESOLVE, json!({"continuationId": id})).await);
    assert_eq!(
        resolved,
        json!({"resolveContinuation": {"remoteStats": {"data": "Remote Stats Data!"}}})
    );
    assert!(started.elapsed() <= Duration::from_millis(100));
    assert_eq!(store.subscriber_channels(), 0);
    assert_eq!(issuer.stats_calls() + resolver.stats_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_unknown_ids_are_not_found() {
    let store = LocalStore::new();
    let fixture = fixture(Arc::new(store.clone()), &store);
    let response = fixture
        .run(RESOLVE, json!({"continuationId": "never-issued"}))
        .await;
    let errors = response.errors.expect("not found is reported");
    assert_eq!(errors[0].code(), Some("CONTINUATION_NOT_FOUND"));
}

/// Applies writes after a delay but publishes immediately, like a replica
/// that trails its pub/sub channel.
struct LaggingStore {
    inner: LocalStore,
    lag: Duration,
}

#[async_trait]
impl KeyValueStore for LaggingStore {
    async fn get(&self, key: &str) -> Result<Option<String>, BackendError> {
        self.inner.get(key).await
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), BackendError> {
        let (inner, lag) = (self.inner.clone(), self.lag);
        let (key, value) = (key.to_string(), value.to_string());
        tokio::spawn(async move {
            tokio::time::sleep(lag).await;
            let _ = inner.set_ex(&key, &value, ttl).await;
        });
        Ok(())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, BackendError> {
        self.inner.expire(key, ttl).await
    }

    async fn exists(&self, key: &str) -> Result<bool, BackendError> {
        self.inner.exists(key).await
    }

    async fn del(&self, key: &str) -> Result<(), BackendError> {
        let (inner, lag) = (self.inner.clone(), self.lag);
        let key = key.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(lag).await;
            let _ = inner.del(&key).await;
        });
        Ok(())
    }

    async fn publish(&self, channel: &str, message: &str) -> Result<usize, BackendError> {
        self.inner.publish(channel, message).await
    }
}

#[tokio::test(start_paused = true)]
async fn test_announcements_ahead_of_writes_are_rechecked() {
    let local = LocalStore::new();
    let lagging = Arc::new(LaggingStore {
        inner: local.clone(),
        lag: Duration::from_millis(40),
    });
    let fixture = fixture(lagging, &local);

    let issued = data(fixture.run(ISSUE, json!({})).await);
    let id = continuation_id(&issued["continuation"]);
    // Let the pending flag land.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let resolved = data(fixture.run(RESOLVE, json!({"continuationId": id})).await);
    assert_eq!(
        resolved["resolveContinuation"]["remoteStats"]["data"],
        "Remote Stats Data!"
    );
}
