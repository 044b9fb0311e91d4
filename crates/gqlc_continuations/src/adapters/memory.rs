//! In-process continuation storage.
//!
//! Records live in a map guarded by a mutex. Pending records hold a watch
//! channel that the execution task fills once it settles; completed records
//! are evicted by a timer once their TTL has passed.

use crate::adapter::{ContinuationAdapter, PendingExecution};
use crate::error::{log_error, ContinuationError, ErrorCallback};
use crate::token::ContinuationId;
use async_trait::async_trait;
use gqlc_runtime::{Context, Response};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// Memory adapter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryAdapterConfig {
    /// Seconds a completed record is kept after the execution settles.
    pub completed_ttl_secs: u64,
    /// Seconds a record is kept after it was last retrieved.
    pub retrieved_ttl_secs: u64,
}

impl Default for MemoryAdapterConfig {
    fn default() -> Self {
        Self {
            completed_ttl_secs: 600,
            retrieved_ttl_secs: 10,
        }
    }
}

enum Record {
    Pending(watch::Receiver<Option<Response>>),
    Completed {
        response: Response,
        expires_at: Instant,
    },
}

struct Inner {
    records: Mutex<FxHashMap<ContinuationId, Record>>,
    config: MemoryAdapterConfig,
    on_error: ErrorCallback,
}

impl Inner {
    fn completed_ttl(&self) -> Duration {
        Duration::from_secs(self.config.completed_ttl_secs)
    }

    fn retrieved_ttl(&self) -> Duration {
        Duration::from_secs(self.config.retrieved_ttl_secs)
    }

    /// Returns the completed response and restarts its retrieval TTL.
    fn retrieve(&self, id: &ContinuationId) -> Option<Response> {
        let now = Instant::now();
        let mut records = self.records.lock();
        match records.get_mut(id) {
            Some(Record::Completed {
                response,
                expires_at,
            }) if *expires_at > now => {
                *expires_at = now + self.retrieved_ttl();
                Some(response.clone())
            }
            _ => None,
        }
    }
}

/// Keeps continuation results in process memory.
///
/// Results are lost on restart and are only visible to this process.
#[derive(Clone)]
pub struct MemoryAdapter {
    inner: Arc<Inner>,
}

impl MemoryAdapter {
    pub fn new() -> Self {
        Self::with_config(MemoryAdapterConfig::default())
    }

    pub fn with_config(config: MemoryAdapterConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                records: Mutex::new(FxHashMap::default()),
                config,
                on_error: log_error(),
            }),
        }
    }

    /// Sets the callback for failed background executions.
    #[must_use]
    pub fn with_on_error<F>(self, on_error: F) -> Self
    where
        F: Fn(&ContinuationError) + Send + Sync + 'static,
    {
        let records = std::mem::take(&mut *self.inner.records.lock());
        Self {
            inner: Arc::new(Inner {
                records: Mutex::new(records),
                config: self.inner.config.clone(),
                on_error: Arc::new(on_error),
            }),
        }
    }

    /// Number of pending and completed records.
    pub fn len(&self) -> usize {
        self.inner.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryAdapter")
            .field("config", &self.inner.config)
            .field("records", &self.len())
            .finish()
    }
}

/// Removes a completed record once its deadline passes.
///
/// Retrievals move the deadline, so the timer re-arms until it observes an
/// expired record.
fn schedule_eviction(inner: Weak<Inner>, id: ContinuationId) {
    tokio::spawn(async move {
        loop {
            let deadline = {
                let Some(inner) = inner.upgrade() else { return };
                let records = inner.records.lock();
                let deadline = match records.get(&id) {
                    Some(Record::Completed { expires_at, .. }) => *expires_at,
                    _ => return,
                };
                deadline
            };
            tokio::time::sleep_until(deadline).await;

            let Some(inner) = inner.upgrade() else { return };
            let mut records = inner.records.lock();
            if let Some(Record::Completed { expires_at, .. }) = records.get(&id) {
                if *expires_at <= Instant::now() {
                    records.remove(&id);
                    tracing::debug!(continuation_id = %id, "evicted expired continuation");
                    return;
                }
            }
        }
    });
}

#[async_trait]
impl ContinuationAdapter for MemoryAdapter {
    async fn has_result(
        &self,
        id: &ContinuationId,
        _ctx: &Context,
    ) -> Result<bool, ContinuationError> {
        let now = Instant::now();
        let mut records = self.inner.records.lock();
        match records.get(id) {
            Some(Record::Completed { expires_at, .. }) if *expires_at > now => Ok(true),
            Some(Record::Completed { .. }) => {
                records.remove(id);
                tracing::debug!(continuation_id = %id, "evicted expired continuation");
                Ok(false)
            }
            _ => Ok(false),
        }
    }

    async fn store_result(
        &self,
        execution: PendingExecution,
        _ctx: &Context,
    ) -> Result<ContinuationId, ContinuationError> {
        let id = ContinuationId::generate();
        let (tx, rx) = watch::channel(None);
        self.inner.records.lock().insert(id.clone(), Record::Pending(rx));

        let inner = Arc::clone(&self.inner);
        let task_id = id.clone();
        tokio::spawn(async move {
            let response = match execution.await {
                Ok(response) => response,
                Err(error) => {
                    (inner.on_error)(&error);
                    Response::error(error.to_field_error())
                }
            };
            inner.records.lock().insert(
                task_id.clone(),
                Record::Completed {
                    response: response.clone(),
                    expires_at: Instant::now() + inner.completed_ttl(),
                },
            );
            // Waiters re-read the map, so the record is committed before notifying.
            let _ = tx.send(Some(response));
            schedule_eviction(Arc::downgrade(&inner), task_id);
        });

        Ok(id)
    }

    async fn resolve_result(
        &self,
        id: &ContinuationId,
        _ctx: &Context,
    ) -> Result<Response, ContinuationError> {
        let mut rx = {
            let now = Instant::now();
            let mut records = self.inner.records.lock();
            match records.get_mut(id) {
                Some(Record::Completed {
                    response,
                    expires_at,
                }) if *expires_at > now => {
                    *expires_at = now + self.inner.retrieved_ttl();
                    return Ok(response.clone());
                }
                Some(Record::Pending(rx)) => rx.clone(),
                _ => return Err(ContinuationError::NotFound(id.clone())),
            }
        };

        let settled = match rx.wait_for(Option::is_some).await {
            Ok(response) => response.clone(),
            Err(_) => None,
        };
        match (self.inner.retrieve(id), settled) {
            (Some(response), _) | (None, Some(response)) => Ok(response),
            (None, None) => Err(ContinuationError::Backend(format!(
                "continuation {id} was dropped before it settled"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gqlc_runtime::FieldError;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn delayed(ms: u64, value: serde_json::Value) -> PendingExecution {
        PendingExecution::new(async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Response::data(value)
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolve_waits_for_pending_execution() {
        let adapter = MemoryAdapter::new();
        let ctx = Context::new();
        let id = adapter.store_result(delayed(500, json!({"a": 1})), &ctx).await.unwrap();

        assert!(!adapter.has_result(&id, &ctx).await.unwrap());
        let started = Instant::now();
        let response = adapter.resolve_result(&id, &ctx).await.unwrap();
        assert_eq!(response.data, Some(json!({"a": 1})));
        assert!(started.elapsed() >= Duration::from_millis(500));
        assert!(adapter.has_result(&id, &ctx).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_completed_result_is_rereadable() {
        let adapter = MemoryAdapter::new();
        let ctx = Context::new();
        let id = adapter.store_result(delayed(1, json!(1)), &ctx).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        let first = adapter.resolve_result(&id, &ctx).await.unwrap();
        let second = adapter.resolve_result(&id, &ctx).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_unknown_id_is_not_found() {
        let adapter = MemoryAdapter::new();
        let id = ContinuationId::generate();
        let error = adapter.resolve_result(&id, &Context::new()).await.unwrap_err();
        assert_eq!(error, ContinuationError::NotFound(id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_records_expire_after_retrieval_ttl() {
        let adapter = MemoryAdapter::with_config(MemoryAdapterConfig {
            completed_ttl_secs: 60,
            retrieved_ttl_secs: 5,
        });
        let ctx = Context::new();
        let id = adapter.store_result(delayed(1, json!(1)), &ctx).await.unwrap();
        adapter.resolve_result(&id, &ctx).await.unwrap();

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert!(adapter.has_result(&id, &ctx).await.unwrap());
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(!adapter.has_result(&id, &ctx).await.unwrap());
        assert!(adapter.is_empty());
        assert!(matches!(
            adapter.resolve_result(&id, &ctx).await,
            Err(ContinuationError::NotFound(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unretrieved_records_expire_after_completed_ttl() {
        let adapter = MemoryAdapter::with_config(MemoryAdapterConfig {
            completed_ttl_secs: 30,
            retrieved_ttl_secs: 5,
        });
        let ctx = Context::new();
        let id = adapter.store_result(delayed(1, json!(1)), &ctx).await.unwrap();
        tokio::time::sleep(Duration::from_secs(29)).await;
        assert!(adapter.has_result(&id, &ctx).await.unwrap());
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(adapter.is_empty());
    }

    #[tokio::test]
    async fn test_failed_execution_reports_and_completes() {
        let failures = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&failures);
        let adapter = MemoryAdapter::new().with_on_error(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let ctx = Context::new();
        let handle = tokio::spawn(async {
            if true {
                panic!("boom");
            }
            Response::error(FieldError::new("unreachable"))
        });
        let id = adapter
            .store_result(PendingExecution::from_handle(handle), &ctx)
            .await
            .unwrap();

        let response = adapter.resolve_result(&id, &ctx).await.unwrap();
        assert!(response.has_errors());
        assert_eq!(
            response.errors.unwrap()[0].code(),
            Some("CONTINUATION_BACKEND_ERROR")
        );
        assert_eq!(failures.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_config_defaults_from_partial_json() {
        let config: MemoryAdapterConfig =
            serde_json::from_value(json!({"retrieved_ttl_secs": 3})).unwrap();
        assert_eq!(config.completed_ttl_secs, 600);
        assert_eq!(config.retrieved_ttl_secs, 3);
    }
}
