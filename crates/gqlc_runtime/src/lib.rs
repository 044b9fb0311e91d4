//! Runtime for gqlc.
//!
//! This crate provides the GraphQL execution runtime:
//! - `schema`: Schema definition and building
//! - `resolver`: Field, type and subscription resolvers
//! - `scope`: Per-execution identity and typed storage
//! - `executor`: Query, mutation and subscription execution

pub mod executor;
pub mod resolver;
pub mod schema;
pub mod scope;

pub use executor::{
    value_to_json, Context, Executor, ExecutorConfig, FieldError, PathSegment, Request, Response,
    ResponseStream,
};
pub use resolver::{
    AsyncFnResolver, BoxedResolver, BoxedSubscriptionResolver, BoxedTypeResolver, DefaultResolver,
    EventStream, FnResolver, FnTypeResolver, Resolver, ResolverArgs, ResolverError,
    ResolverFuture, ResolverInfo, ResolverMap, ResolverResult, SubscriptionFuture,
    SubscriptionResolver, TypeResolver, TypenameResolver,
};
pub use schema::{
    EnumDef, FieldDef, InputObjectDef, InputValueDef, InterfaceDef, ObjectDef, ScalarDef, Schema,
    SchemaBuilder, TypeDef, TypeRef, UnionDef,
};
pub use scope::ExecutionScope;
