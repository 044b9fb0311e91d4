//! Query continuations for gqlc.
//!
//! A continuation field races the execution of its subtree against a short
//! deadline. If the subtree settles in time its data is returned inline;
//! otherwise the caller receives a token and the execution keeps running in
//! the background, behind a [`ContinuationAdapter`]. Tokens are exchanged for
//! the completed data with `resolveContinuation` or the continuation
//! subscriptions.
//!
//! This crate provides:
//! - `augment`: Schema augmentation and resolver decoration
//! - `subquery`: Standalone documents for continuation subtrees
//! - `resolver`: The deadline race and the resolve/subscribe fields
//! - `path_tracker` and `guard`: Structural extraction beneath settled continuations
//! - `adapter` and `adapters`: Storage of pending and completed results
//! - `stream`: Fan-in of completion events

pub mod adapter;
pub mod adapters;
pub mod augment;
pub mod config;
pub mod error;
pub mod guard;
pub mod interleave;
pub mod path_tracker;
pub mod resolver;
pub mod stream;
pub mod subquery;
pub mod token;

pub use adapter::{ContinuationAdapter, PendingExecution, ResultCallback, SubscriptionHandle};
pub use adapters::{
    DistributedAdapter, DistributedAdapterConfig, Expires, KeyValueStore, LocalStore,
    MemoryAdapter, MemoryAdapterConfig, MessageSubscriber,
};
pub use augment::{add_continuations_to_schema, ContinuationSchema};
pub use config::{
    AuthorizeFn, ContinuationConfig, ContinuationFieldOptions, DefaultExecute, ExecuteFn, Lookup,
    TypeContinuationConfig, WrapNodes,
};
pub use error::{BackendError, ConfigError, ContinuationError, ErrorCallback};
pub use stream::{ContinuationEvent, ContinuationStream};
pub use subquery::Subquery;
pub use token::{ContinuationId, ContinuationToken};
