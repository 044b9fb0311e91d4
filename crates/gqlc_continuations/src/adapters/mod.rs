//! Storage adapter implementations.

mod distributed;
mod local;
mod memory;

pub use distributed::{
    DistributedAdapter, DistributedAdapterConfig, Expires, KeyValueStore, MessageSubscriber,
};
pub use local::LocalStore;
pub use memory::{MemoryAdapter, MemoryAdapterConfig};
