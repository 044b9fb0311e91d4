//! Resolver decoration that prevents double execution.
//!
//! Beneath a settled continuation the parent objects already hold the
//! materialized subtree, so wrapped resolvers read their value from the
//! parent instead of running again.

use crate::path_tracker::is_marked;
use gqlc_runtime::{
    BoxedResolver, BoxedTypeResolver, Context, FieldError, Resolver, ResolverArgs, ResolverError,
    ResolverFuture, ResolverInfo, ResolverResult, TypeResolver, TypenameResolver,
};
use serde_json::Value;

/// Reads the field's value from an already materialized parent.
pub fn extract(parent: &Value, info: &ResolverInfo) -> ResolverResult {
    match parent.get(&info.response_key) {
        Some(value) => match FieldError::from_embedded(value) {
            Some(error) => Err(ResolverError::Upstream(error)),
            None => Ok(value.clone()),
        },
        None => Ok(Value::Null),
    }
}

/// Runs the wrapped resolver unless the field lies beneath a settled continuation.
pub struct GuardedResolver {
    inner: BoxedResolver,
}

impl GuardedResolver {
    pub fn new(inner: BoxedResolver) -> Self {
        Self { inner }
    }

    pub fn boxed(inner: BoxedResolver) -> BoxedResolver {
        Box::new(Self::new(inner))
    }
}

impl Resolver for GuardedResolver {
    fn resolve<'a>(
        &'a self,
        parent: &'a Value,
        args: &'a ResolverArgs,
        ctx: &'a Context,
        info: &'a ResolverInfo,
    ) -> ResolverFuture<'a> {
        if is_marked(&info.scope, &info.path) {
            let value = extract(parent, info);
            return Box::pin(async move { value });
        }
        self.inner.resolve(parent, args, ctx, info)
    }
}

/// Resolves abstract types from `__typename` beneath a settled continuation.
pub struct GuardedTypeResolver {
    inner: BoxedTypeResolver,
}

impl GuardedTypeResolver {
    pub fn new(inner: BoxedTypeResolver) -> Self {
        Self { inner }
    }

    pub fn boxed(inner: BoxedTypeResolver) -> BoxedTypeResolver {
        Box::new(Self::new(inner))
    }
}

impl TypeResolver for GuardedTypeResolver {
    fn resolve_type(&self, value: &Value, ctx: &Context, info: &ResolverInfo) -> Option<String> {
        if is_marked(&info.scope, &info.path) {
            return TypenameResolver.resolve_type(value, ctx, info);
        }
        self.inner.resolve_type(value, ctx, info)
    }
}
