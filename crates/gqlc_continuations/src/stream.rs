//! Fan-in of continuation completions.

use crate::adapter::{ContinuationAdapter, ResultCallback, SubscriptionHandle};
use crate::error::ContinuationError;
use crate::token::ContinuationId;
use futures::Stream;
use gqlc_runtime::{Context, Response};
use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};
use tokio::sync::mpsc;

/// One completed continuation.
#[derive(Debug)]
pub struct ContinuationEvent {
    pub continuation_id: ContinuationId,
    pub result: Result<Response, ContinuationError>,
}

/// Yields one event per distinct identifier, in completion order.
///
/// The stream ends once every identifier has completed. Dropping it, or
/// calling [`cancel`](Self::cancel), releases the pending waits.
#[derive(Debug)]
pub struct ContinuationStream {
    receiver: mpsc::Receiver<ContinuationEvent>,
    remaining: usize,
    handle: Option<SubscriptionHandle>,
}

impl ContinuationStream {
    pub fn new(
        adapter: Arc<dyn ContinuationAdapter>,
        ids: impl IntoIterator<Item = ContinuationId>,
        ctx: Context,
    ) -> Self {
        let mut awaiting = FxHashSet::default();
        let ids: Vec<ContinuationId> = ids
            .into_iter()
            .filter(|id| awaiting.insert(id.clone()))
            .collect();
        let (sender, receiver) = mpsc::channel(ids.len().max(1));
        if ids.is_empty() {
            return Self {
                receiver,
                remaining: 0,
                handle: None,
            };
        }

        let awaiting = Mutex::new(awaiting);
        let on_each: ResultCallback = Arc::new(move |continuation_id, result| {
            if awaiting.lock().remove(&continuation_id) {
                // Capacity equals the number of identifiers, so this cannot be full.
                let _ = sender.try_send(ContinuationEvent {
                    continuation_id,
                    result,
                });
            }
        });
        let remaining = ids.len();
        let handle = adapter.subscribe_results(ids, ctx, on_each);
        Self {
            receiver,
            remaining,
            handle: Some(handle),
        }
    }

    /// Number of identifiers that have not completed yet.
    pub fn remaining(&self) -> usize {
        self.remaining
    }

    /// Stops the stream. Idempotent.
    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.cancel();
        }
        self.receiver.close();
        self.remaining = 0;
    }
}

impl Stream for ContinuationStream {
    type Item = ContinuationEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Option<Self::Item>> {
        if self.remaining == 0 {
            self.handle = None;
            return Poll::Ready(None);
        }
        match self.receiver.poll_recv(cx) {
            Poll::Ready(Some(event)) => {
                self.remaining -= 1;
                if self.remaining == 0 {
                    self.handle = None;
                }
                Poll::Ready(Some(event))
            }
            Poll::Ready(None) => {
                self.remaining = 0;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining))
    }
}
