//! In-process key/value store and pub/sub.
//!
//! Backs a [`DistributedAdapter`](super::DistributedAdapter) on a single node
//! and in tests. Expiry is checked when a key is read, and expired keys are
//! swept on every write.

use super::distributed::{KeyValueStore, MessageSubscriber};
use crate::error::BackendError;
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;

const CHANNEL_CAPACITY: usize = 16;

#[derive(Default)]
struct Inner {
    entries: Mutex<FxHashMap<String, (String, Instant)>>,
    channels: Mutex<FxHashMap<String, broadcast::Sender<String>>>,
}

/// Shared in-process store. Clones share the same data.
#[derive(Clone, Default)]
pub struct LocalStore {
    inner: Arc<Inner>,
}

impl LocalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys held, including expired ones not yet swept.
    pub fn stored_keys(&self) -> usize {
        self.inner.entries.lock().len()
    }

    /// Number of channels with at least one live subscriber.
    pub fn subscriber_channels(&self) -> usize {
        let mut channels = self.inner.channels.lock();
        channels.retain(|_, sender| sender.receiver_count() > 0);
        channels.len()
    }

    fn live_entry<R>(
        &self,
        key: &str,
        f: impl FnOnce(&mut (String, Instant)) -> R,
    ) -> Option<R> {
        let mut entries = self.inner.entries.lock();
        match entries.get_mut(key) {
            Some(entry) if entry.1 > Instant::now() => Some(f(entry)),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }
}

impl std::fmt::Debug for LocalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStore")
            .field("entries", &self.inner.entries.lock().len())
            .field("channels", &self.inner.channels.lock().len())
            .finish()
    }
}

#[async_trait]
impl KeyValueStore for LocalStore {
    async fn get(&self, key: &str) -> Result<Option<String>, BackendError> {
        Ok(self.live_entry(key, |(value, _)| value.clone()))
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), BackendError> {
        let now = Instant::now();
        let mut entries = self.inner.entries.lock();
        entries.retain(|_, (_, expires_at)| *expires_at > now);
        entries.insert(key.to_string(), (value.to_string(), now + ttl));
        Ok(())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, BackendError> {
        Ok(self
            .live_entry(key, |(_, expires_at)| *expires_at = Instant::now() + ttl)
            .is_some())
    }

    async fn exists(&self, key: &str) -> Result<bool, BackendError> {
        Ok(self.live_entry(key, |_| ()).is_some())
    }

    async fn del(&self, key: &str) -> Result<(), BackendError> {
        self.inner.entries.lock().remove(key);
        Ok(())
    }

    async fn publish(&self, channel: &str, message: &str) -> Result<usize, BackendError> {
        let mut channels = self.inner.channels.lock();
        let Some(sender) = channels.get(channel) else {
            return Ok(0);
        };
        match sender.send(message.to_string()) {
            Ok(receivers) => Ok(receivers),
            Err(_) => {
                channels.remove(channel);
                Ok(0)
            }
        }
    }
}

#[async_trait]
impl MessageSubscriber for LocalStore {
    async fn subscribe(&self, channel: &str) -> Result<BoxStream<'static, String>, BackendError> {
        let receiver = self
            .inner
            .channels
            .lock()
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe();

        Ok(stream::unfold(receiver, |mut receiver| async move {
            loop {
                match receiver.recv().await {
                    Ok(message) => return Some((message, receiver)),
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        })
        .boxed())
    }
}
