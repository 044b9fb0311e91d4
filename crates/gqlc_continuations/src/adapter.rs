//! Storage adapter contract.
//!
//! An adapter owns the lifetime of stored continuation results: it registers
//! an execution as pending when its deadline passes, records the response
//! once the execution settles, and hands the response out to later callers.

use crate::error::ContinuationError;
use crate::token::ContinuationId;
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use gqlc_runtime::{Context, Response};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};
use tokio::task::JoinHandle;

/// An execution that missed its deadline and is still running.
pub struct PendingExecution {
    inner: BoxFuture<'static, Result<Response, ContinuationError>>,
}

impl PendingExecution {
    /// Wraps the task running the execution.
    pub fn from_handle(handle: JoinHandle<Response>) -> Self {
        Self {
            inner: handle
                .map(|joined| {
                    joined.map_err(|e| {
                        ContinuationError::Backend(format!("continuation execution failed: {e}"))
                    })
                })
                .boxed(),
        }
    }

    /// Wraps any future producing the response.
    pub fn new<F>(future: F) -> Self
    where
        F: Future<Output = Response> + Send + 'static,
    {
        Self {
            inner: future.map(Ok).boxed(),
        }
    }
}

impl Future for PendingExecution {
    type Output = Result<Response, ContinuationError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        self.inner.as_mut().poll(cx)
    }
}

impl fmt::Debug for PendingExecution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingExecution").finish_non_exhaustive()
    }
}

/// Called once per identifier by [`ContinuationAdapter::subscribe_results`].
pub type ResultCallback =
    Arc<dyn Fn(ContinuationId, Result<Response, ContinuationError>) + Send + Sync>;

/// Stores and retrieves continuation results.
#[async_trait]
pub trait ContinuationAdapter: Send + Sync + 'static {
    /// Returns true if [`resolve_result`](Self::resolve_result) would return
    /// a completed response right now.
    async fn has_result(&self, id: &ContinuationId, ctx: &Context)
        -> Result<bool, ContinuationError>;

    /// Registers a pending execution and returns its identifier.
    ///
    /// The identifier is resolvable as soon as this returns, before the
    /// execution settles.
    async fn store_result(
        &self,
        execution: PendingExecution,
        ctx: &Context,
    ) -> Result<ContinuationId, ContinuationError>;

    /// Returns the completed response, waiting for it if still pending.
    async fn resolve_result(
        &self,
        id: &ContinuationId,
        ctx: &Context,
    ) -> Result<Response, ContinuationError>;

    /// Calls `on_each` for every identifier as it completes.
    ///
    /// Callbacks stop once the returned handle is cancelled or dropped.
    fn subscribe_results(
        self: Arc<Self>,
        ids: Vec<ContinuationId>,
        ctx: Context,
        on_each: ResultCallback,
    ) -> SubscriptionHandle {
        let cancelled = Arc::new(AtomicBool::new(false));
        let tasks = ids
            .into_iter()
            .map(|id| {
                let adapter = Arc::clone(&self);
                let ctx = ctx.clone();
                let on_each = Arc::clone(&on_each);
                let cancelled = Arc::clone(&cancelled);
                tokio::spawn(async move {
                    let result = adapter.resolve_result(&id, &ctx).await;
                    if !cancelled.load(Ordering::Acquire) {
                        on_each(id, result);
                    }
                })
            })
            .collect();
        SubscriptionHandle::new(cancelled, tasks)
    }
}

/// Cancels a result subscription. Cancels on drop.
#[derive(Debug)]
pub struct SubscriptionHandle {
    cancelled: Arc<AtomicBool>,
    tasks: Vec<JoinHandle<()>>,
}

impl SubscriptionHandle {
    pub fn new(cancelled: Arc<AtomicBool>, tasks: Vec<JoinHandle<()>>) -> Self {
        Self { cancelled, tasks }
    }

    /// A handle with nothing to cancel.
    pub fn empty() -> Self {
        Self::new(Arc::new(AtomicBool::new(false)), Vec::new())
    }

    /// Stops further callbacks and releases the per-identifier waits.
    pub fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }
        for task in &self.tasks {
            task.abort();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}
