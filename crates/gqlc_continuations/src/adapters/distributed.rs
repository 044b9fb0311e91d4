//! Continuation storage over a shared key/value store and pub/sub channel.
//!
//! Each continuation uses three names:
//!
//! - `<prefix><id>:pending`: set while the execution runs, holds the start time
//! - `<prefix><id>`: the serialized response once the execution settles
//! - `gqlc-pub:<id>`: the channel a completion is announced on
//!
//! Announcements are hints only. Waiters always re-read the store, so a
//! message that overtakes the value write just causes another wait.

use crate::adapter::{ContinuationAdapter, PendingExecution};
use crate::error::{log_error, BackendError, ContinuationError, ErrorCallback};
use crate::token::ContinuationId;
use async_trait::async_trait;
use chrono::Utc;
use futures::stream::{BoxStream, StreamExt};
use gqlc_runtime::{Context, Response};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// A key/value store with per-key expiry.
#[async_trait]
pub trait KeyValueStore: Send + Sync + 'static {
    async fn get(&self, key: &str) -> Result<Option<String>, BackendError>;

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), BackendError>;

    /// Resets the expiry of an existing key. Returns false if the key is absent.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, BackendError>;

    async fn exists(&self, key: &str) -> Result<bool, BackendError>;

    async fn del(&self, key: &str) -> Result<(), BackendError>;

    /// Publishes a message. Returns the number of receivers.
    async fn publish(&self, channel: &str, message: &str) -> Result<usize, BackendError>;
}

/// Subscribes to pub/sub channels.
///
/// Dropping the returned stream releases the subscription.
#[async_trait]
pub trait MessageSubscriber: Send + Sync + 'static {
    async fn subscribe(&self, channel: &str) -> Result<BoxStream<'static, String>, BackendError>;
}

/// Expiry of the stored keys, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Expires {
    pub pending_flag: u64,
    pub completed_value: u64,
    pub retrieved_value: u64,
}

impl Default for Expires {
    fn default() -> Self {
        Self {
            pending_flag: 600,
            completed_value: 600,
            retrieved_value: 60,
        }
    }
}

/// Distributed adapter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DistributedAdapterConfig {
    pub key_prefix: String,
    pub expires: Expires,
    /// Milliseconds between store re-checks while waiting on a pending result.
    pub recheck_interval_ms: u64,
}

impl Default for DistributedAdapterConfig {
    fn default() -> Self {
        Self {
            key_prefix: "gqlc:".to_string(),
            expires: Expires::default(),
            recheck_interval_ms: 250,
        }
    }
}

struct Inner {
    store: Arc<dyn KeyValueStore>,
    subscriber: Arc<dyn MessageSubscriber>,
    config: DistributedAdapterConfig,
    on_error: ErrorCallback,
}

impl Inner {
    fn value_key(&self, id: &ContinuationId) -> String {
        format!("{}{}", self.config.key_prefix, id)
    }

    fn pending_key(&self, id: &ContinuationId) -> String {
        format!("{}{}:pending", self.config.key_prefix, id)
    }

    fn report(&self, error: impl Into<ContinuationError>) {
        (self.on_error)(&error.into());
    }

    /// Reads the completed value, refreshing its expiry.
    async fn fetch(&self, id: &ContinuationId) -> Result<Option<Response>, ContinuationError> {
        let key = self.value_key(id);
        let Some(raw) = self.store.get(&key).await? else {
            return Ok(None);
        };
        let ttl = Duration::from_secs(self.config.expires.retrieved_value);
        if let Err(error) = self.store.expire(&key, ttl).await {
            self.report(error);
        }
        Ok(Some(serde_json::from_str(&raw)?))
    }

    /// Persists a settled execution, then announces it.
    async fn complete(&self, id: &ContinuationId, response: Response) {
        let raw = match serde_json::to_string(&response) {
            Ok(raw) => raw,
            Err(error) => return self.report(error),
        };
        let ttl = Duration::from_secs(self.config.expires.completed_value);
        if let Err(error) = self.store.set_ex(&self.value_key(id), &raw, ttl).await {
            return self.report(error);
        }
        if let Err(error) = self.store.del(&self.pending_key(id)).await {
            self.report(error);
        }
        if let Err(error) = self.store.publish(&channel_name(id), "1").await {
            self.report(error);
        }
    }
}

fn channel_name(id: &ContinuationId) -> String {
    format!("gqlc-pub:{id}")
}

/// Stores continuation results in a shared backend so any instance can
/// resolve a continuation issued by another.
#[derive(Clone)]
pub struct DistributedAdapter {
    inner: Arc<Inner>,
}

impl DistributedAdapter {
    pub fn new(store: Arc<dyn KeyValueStore>, subscriber: Arc<dyn MessageSubscriber>) -> Self {
        Self::with_config(store, subscriber, DistributedAdapterConfig::default())
    }

    pub fn with_config(
        store: Arc<dyn KeyValueStore>,
        subscriber: Arc<dyn MessageSubscriber>,
        config: DistributedAdapterConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                subscriber,
                config,
                on_error: log_error(),
            }),
        }
    }

    /// Sets the callback for background store and pub/sub failures.
    #[must_use]
    pub fn with_on_error<F>(self, on_error: F) -> Self
    where
        F: Fn(&ContinuationError) + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(Inner {
                store: Arc::clone(&self.inner.store),
                subscriber: Arc::clone(&self.inner.subscriber),
                config: self.inner.config.clone(),
                on_error: Arc::new(on_error),
            }),
        }
    }

    pub fn config(&self) -> &DistributedAdapterConfig {
        &self.inner.config
    }
}

impl std::fmt::Debug for DistributedAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DistributedAdapter")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ContinuationAdapter for DistributedAdapter {
    async fn has_result(
        &self,
        id: &ContinuationId,
        _ctx: &Context,
    ) -> Result<bool, ContinuationError> {
        Ok(self.inner.store.exists(&self.inner.value_key(id)).await?)
    }

    async fn store_result(
        &self,
        execution: PendingExecution,
        _ctx: &Context,
    ) -> Result<ContinuationId, ContinuationError> {
        let id = ContinuationId::generate();
        let ttl = Duration::from_secs(self.inner.config.expires.pending_flag);
        self.inner
            .store
            .set_ex(&self.inner.pending_key(&id), &Utc::now().to_rfc3339(), ttl)
            .await?;

        let inner = Arc::clone(&self.inner);
        let task_id = id.clone();
        tokio::spawn(async move {
            let response = match execution.await {
                Ok(response) => response,
                Err(error) => {
                    inner.report(error.clone());
                    Response::error(error.to_field_error())
                }
            };
            inner.complete(&task_id, response).await;
        });

        Ok(id)
    }

    async fn resolve_result(
        &self,
        id: &ContinuationId,
        _ctx: &Context,
    ) -> Result<Response, ContinuationError> {
        let inner = &self.inner;
        if let Some(response) = inner.fetch(id).await? {
            return Ok(response);
        }
        let pending_key = inner.pending_key(id);
        if !inner.store.exists(&pending_key).await? {
            return Err(ContinuationError::NotFound(id.clone()));
        }

        let mut messages = match inner.subscriber.subscribe(&channel_name(id)).await {
            Ok(messages) => Some(messages),
            Err(error) => {
                inner.report(error);
                None
            }
        };
        let recheck = Duration::from_millis(inner.config.recheck_interval_ms);

        loop {
            // The execution may have completed before the subscription was in place.
            if let Some(response) = inner.fetch(id).await? {
                return Ok(response);
            }
            if !inner.store.exists(&pending_key).await? {
                return inner
                    .fetch(id)
                    .await?
                    .ok_or_else(|| ContinuationError::NotFound(id.clone()));
            }

            let closed = match messages.as_mut() {
                Some(stream) => tokio::select! {
                    message = stream.next() => message.is_none(),
                    () = tokio::time::sleep(recheck) => false,
                },
                None => {
                    tokio::time::sleep(recheck).await;
                    false
                }
            };
            if closed {
                inner.report(BackendError::SubscriptionClosed(channel_name(id)));
                messages = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::LocalStore;
    use serde_json::json;

    fn adapter(store: &LocalStore) -> DistributedAdapter {
        DistributedAdapter::new(Arc::new(store.clone()), Arc::new(store.clone()))
    }

    fn delayed(ms: u64) -> PendingExecution {
        PendingExecution::new(async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Response::data(json!({"remoteStats": {"data": "Remote Stats Data!"}}))
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_flag_then_value() {
        let store = LocalStore::new();
        let adapter = adapter(&store);
        let ctx = Context::new();
        let id = adapter.store_result(delayed(100), &ctx).await.unwrap();

        let pending = store.get(&format!("gqlc:{id}:pending")).await.unwrap().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(&pending).is_ok());
        assert!(!adapter.has_result(&id, &ctx).await.unwrap());

        let response = adapter.resolve_result(&id, &ctx).await.unwrap();
        assert_eq!(response.data.unwrap()["remoteStats"]["data"], "Remote Stats Data!");
        assert!(adapter.has_result(&id, &ctx).await.unwrap());
        assert!(!store.exists(&format!("gqlc:{id}:pending")).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retrieval_shortens_expiry() {
        let store = LocalStore::new();
        let adapter = adapter(&store);
        let ctx = Context::new();
        let id = adapter.store_result(delayed(1), &ctx).await.unwrap();
        adapter.resolve_result(&id, &ctx).await.unwrap();

        tokio::time::sleep(Duration::from_secs(59)).await;
        assert!(adapter.has_result(&id, &ctx).await.unwrap());
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(!adapter.has_result(&id, &ctx).await.unwrap());
    }

    #[tokio::test]
    async fn test_unknown_id_is_not_found() {
        let store = LocalStore::new();
        let id = ContinuationId::generate();
        let error = adapter(&store).resolve_result(&id, &Context::new()).await.unwrap_err();
        assert_eq!(error, ContinuationError::NotFound(id));
    }

    #[tokio::test]
    async fn test_corrupt_value_is_a_serialization_error() {
        let store = LocalStore::new();
        let id = ContinuationId::generate();
        store
            .set_ex(&format!("gqlc:{id}"), "not json", Duration::from_secs(5))
            .await
            .unwrap();
        let error = adapter(&store).resolve_result(&id, &Context::new()).await.unwrap_err();
        assert!(matches!(error, ContinuationError::Serialization(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_key_prefix() {
        let store = LocalStore::new();
        let config: DistributedAdapterConfig =
            serde_json::from_value(json!({"key_prefix": "app:"})).unwrap();
        assert_eq!(config.expires.retrieved_value, 60);
        let adapter = DistributedAdapter::with_config(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            config,
        );
        let ctx = Context::new();
        let id = adapter.store_result(delayed(1), &ctx).await.unwrap();
        adapter.resolve_result(&id, &ctx).await.unwrap();
        assert!(store.exists(&format!("app:{id}")).await.unwrap());
    }
}
