//! Resolver system for gqlc.
//!
//! This module provides the resolver traits and the table the executor looks
//! resolvers up in.

use crate::executor::{Context, Executor, FieldError, PathSegment};
use crate::scope::ExecutionScope;
use futures::stream::BoxStream;
use gqlc_syntax::{FragmentDefinition, SelectionSet, VariableDefinition};
use indexmap::IndexMap;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Arguments passed to a resolver.
#[derive(Debug, Clone, Default)]
pub struct ResolverArgs {
    args: HashMap<String, Value>,
}

impl ResolverArgs {
    /// Creates new resolver args.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates resolver args from a list of (name, value) pairs.
    pub fn from_pairs(pairs: Vec<(String, Value)>) -> Self {
        Self {
            args: pairs.into_iter().collect(),
        }
    }

    /// Gets an argument by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.args.get(name)
    }

    /// Gets an argument as a specific type.
    pub fn get_as<T: serde::de::DeserializeOwned>(&self, name: &str) -> Option<T> {
        self.args
            .get(name)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Gets a required argument, returning an error if not found.
    pub fn require<T: serde::de::DeserializeOwned>(&self, name: &str) -> Result<T, ResolverError> {
        self.args
            .get(name)
            .ok_or_else(|| ResolverError::MissingArgument(name.to_string()))
            .and_then(|v| {
                serde_json::from_value(v.clone())
                    .map_err(|e| ResolverError::ArgumentParseError(name.to_string(), e.to_string()))
            })
    }

    /// Returns all arguments.
    pub fn all(&self) -> &HashMap<String, Value> {
        &self.args
    }

    /// Returns true if empty.
    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// Sets an argument.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.args.insert(name.into(), value);
    }
}

/// Info about the field being resolved.
#[derive(Debug, Clone)]
pub struct ResolverInfo {
    /// The field name being resolved.
    pub field_name: String,

    /// The key the field occupies in the response (alias or field name).
    pub response_key: String,

    /// The return type, printed in SDL form.
    pub return_type: String,

    /// The parent type name.
    pub parent_type: String,

    /// Path to this field.
    pub path: Vec<PathSegment>,

    /// The field's sub-selection, merged across every node with the same response key.
    pub selection_set: Option<Arc<SelectionSet>>,

    /// Fragment definitions of the executing document.
    pub fragments: Arc<IndexMap<String, FragmentDefinition>>,

    /// Variable definitions of the executing operation.
    pub variable_definitions: Arc<Vec<VariableDefinition>>,

    /// Coerced variable values of the executing operation.
    pub variable_values: Arc<serde_json::Map<String, Value>>,

    /// Storage scoped to the current top-level execution.
    pub scope: Arc<ExecutionScope>,

    /// The executor running this field, if any.
    pub executor: Option<Executor>,
}

impl ResolverInfo {
    /// Creates new resolver info outside of an execution.
    pub fn new(field_name: impl Into<String>, parent_type: impl Into<String>) -> Self {
        let field_name = field_name.into();
        Self {
            response_key: field_name.clone(),
            field_name,
            return_type: String::new(),
            parent_type: parent_type.into(),
            path: Vec::new(),
            selection_set: None,
            fragments: Arc::default(),
            variable_definitions: Arc::default(),
            variable_values: Arc::default(),
            scope: Arc::new(ExecutionScope::new()),
            executor: None,
        }
    }

    /// Sets the return type.
    pub fn with_return_type(mut self, ty: impl Into<String>) -> Self {
        self.return_type = ty.into();
        self
    }

    /// Sets the path.
    pub fn with_path(mut self, path: Vec<PathSegment>) -> Self {
        self.path = path;
        self
    }

    /// Sets the response key.
    pub fn with_response_key(mut self, key: impl Into<String>) -> Self {
        self.response_key = key.into();
        self
    }

    /// Sets the sub-selection.
    pub fn with_selection_set(mut self, selection_set: Arc<SelectionSet>) -> Self {
        self.selection_set = Some(selection_set);
        self
    }

    /// Sets the execution scope.
    pub fn with_scope(mut self, scope: Arc<ExecutionScope>) -> Self {
        self.scope = scope;
        self
    }
}

/// Result type for resolvers.
pub type ResolverResult = Result<Value, ResolverError>;

/// Future type for async resolvers.
pub type ResolverFuture<'a> = Pin<Box<dyn Future<Output = ResolverResult> + Send + 'a>>;

/// Error from a resolver.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ResolverError {
    /// Field not found.
    #[error("Field not found: {0}")]
    FieldNotFound(String),

    /// Missing required argument.
    #[error("Missing required argument: {0}")]
    MissingArgument(String),

    /// Argument parse error.
    #[error("Failed to parse argument '{0}': {1}")]
    ArgumentParseError(String, String),

    /// Null value for non-nullable field.
    #[error("Null value for non-nullable field: {0}")]
    NullValue(String),

    /// Custom error.
    #[error("{0}")]
    Custom(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// An error carried over from another execution, extensions included.
    #[error("{}", .0.message)]
    Upstream(FieldError),
}

impl From<ResolverError> for FieldError {
    fn from(error: ResolverError) -> Self {
        match error {
            ResolverError::Upstream(error) => error,
            other => FieldError::new(other.to_string()),
        }
    }
}

impl From<FieldError> for ResolverError {
    fn from(error: FieldError) -> Self {
        Self::Upstream(error)
    }
}

/// Trait for field resolvers.
pub trait Resolver: Send + Sync {
    /// Resolves a field value.
    fn resolve<'a>(
        &'a self,
        parent: &'a Value,
        args: &'a ResolverArgs,
        ctx: &'a Context,
        info: &'a ResolverInfo,
    ) -> ResolverFuture<'a>;
}

/// A boxed resolver.
pub type BoxedResolver = Box<dyn Resolver>;

/// A sync resolver function.
pub type SyncResolverFn =
    Arc<dyn Fn(&Value, &ResolverArgs, &Context, &ResolverInfo) -> ResolverResult + Send + Sync>;

/// A wrapper for sync resolver functions.
pub struct FnResolver {
    func: SyncResolverFn,
}

impl FnResolver {
    /// Creates a new function resolver.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Value, &ResolverArgs, &Context, &ResolverInfo) -> ResolverResult
            + Send
            + Sync
            + 'static,
    {
        Self { func: Arc::new(f) }
    }
}

impl Resolver for FnResolver {
    fn resolve<'a>(
        &'a self,
        parent: &'a Value,
        args: &'a ResolverArgs,
        ctx: &'a Context,
        info: &'a ResolverInfo,
    ) -> ResolverFuture<'a> {
        let result = (self.func)(parent, args, ctx, info);
        Box::pin(async move { result })
    }
}

/// An async resolver function type.
pub type AsyncResolverFn = Arc<
    dyn Fn(Value, ResolverArgs, Context, ResolverInfo) -> ResolverFuture<'static> + Send + Sync,
>;

/// A wrapper for async resolver functions.
pub struct AsyncFnResolver {
    func: AsyncResolverFn,
}

impl AsyncFnResolver {
    /// Creates a new async function resolver.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(Value, ResolverArgs, Context, ResolverInfo) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ResolverResult> + Send + 'static,
    {
        Self {
            func: Arc::new(move |parent, args, ctx, info| Box::pin(f(parent, args, ctx, info))),
        }
    }
}

impl Resolver for AsyncFnResolver {
    fn resolve<'a>(
        &'a self,
        parent: &'a Value,
        args: &'a ResolverArgs,
        ctx: &'a Context,
        info: &'a ResolverInfo,
    ) -> ResolverFuture<'a> {
        let fut = (self.func)(parent.clone(), args.clone(), ctx.clone(), info.clone());
        Box::pin(fut)
    }
}

/// Default resolver that accesses properties from the parent object.
pub struct DefaultResolver;

impl Resolver for DefaultResolver {
    fn resolve<'a>(
        &'a self,
        parent: &'a Value,
        _args: &'a ResolverArgs,
        _ctx: &'a Context,
        info: &'a ResolverInfo,
    ) -> ResolverFuture<'a> {
        let field_name = &info.field_name;
        let result = match parent {
            Value::Object(map) => Ok(map
                .get(field_name)
                .or_else(|| map.get(&to_snake_case(field_name)))
                .cloned()
                .unwrap_or(Value::Null)),
            Value::Null => Ok(Value::Null),
            _ => Err(ResolverError::FieldNotFound(field_name.clone())),
        };
        Box::pin(async move { result })
    }
}

/// Converts camelCase to snake_case.
fn to_snake_case(s: &str) -> String {
    let mut result = String::with_capacity(s.len() + 4);
    for (i, c) in s.chars().enumerate() {
        if c.is_uppercase() {
            if i > 0 {
                result.push('_');
            }
            result.extend(c.to_lowercase());
        } else {
            result.push(c);
        }
    }
    result
}

/// Decides the concrete object type of a value returned for an abstract type.
pub trait TypeResolver: Send + Sync {
    /// Returns the object type name, or `None` if it cannot be determined.
    fn resolve_type(&self, value: &Value, ctx: &Context, info: &ResolverInfo) -> Option<String>;
}

/// A boxed type resolver.
pub type BoxedTypeResolver = Box<dyn TypeResolver>;

/// Type resolver that reads the `__typename` key of the value.
pub struct TypenameResolver;

impl TypeResolver for TypenameResolver {
    fn resolve_type(&self, value: &Value, _ctx: &Context, _info: &ResolverInfo) -> Option<String> {
        value
            .get("__typename")
            .and_then(Value::as_str)
            .map(str::to_string)
    }
}

/// A wrapper for type resolver functions.
pub struct FnTypeResolver<F>(pub F);

impl<F> TypeResolver for FnTypeResolver<F>
where
    F: Fn(&Value, &Context, &ResolverInfo) -> Option<String> + Send + Sync,
{
    fn resolve_type(&self, value: &Value, ctx: &Context, info: &ResolverInfo) -> Option<String> {
        (self.0)(value, ctx, info)
    }
}

/// Stream of source events for a subscription field.
pub type EventStream = BoxStream<'static, ResolverResult>;

/// Future returned by [`SubscriptionResolver::subscribe`].
pub type SubscriptionFuture<'a> =
    Pin<Box<dyn Future<Output = Result<EventStream, ResolverError>> + Send + 'a>>;

/// Produces the source event stream of a subscription root field.
///
/// Every event becomes the root value of one execution of the subscription's
/// selection set, so the field's regular resolver sees the event as its parent.
pub trait SubscriptionResolver: Send + Sync {
    fn subscribe<'a>(
        &'a self,
        args: &'a ResolverArgs,
        ctx: &'a Context,
        info: &'a ResolverInfo,
    ) -> SubscriptionFuture<'a>;
}

/// A boxed subscription resolver.
pub type BoxedSubscriptionResolver = Box<dyn SubscriptionResolver>;

/// Storage for resolvers organized by type and field.
#[derive(Default)]
pub struct ResolverMap {
    /// Resolvers indexed by "TypeName.fieldName".
    resolvers: HashMap<String, BoxedResolver>,

    /// Default resolver for unregistered fields.
    default_resolver: Option<BoxedResolver>,

    /// Type resolvers indexed by abstract type name.
    type_resolvers: HashMap<String, BoxedTypeResolver>,

    /// Type resolver for abstract types without a registered one.
    default_type_resolver: Option<BoxedTypeResolver>,

    /// Subscription source resolvers indexed by "TypeName.fieldName".
    subscriptions: HashMap<String, BoxedSubscriptionResolver>,
}

fn coordinate(type_name: &str, field_name: &str) -> String {
    format!("{}.{}", type_name, field_name)
}

impl ResolverMap {
    /// Creates a new resolver map.
    pub fn new() -> Self {
        Self {
            resolvers: HashMap::new(),
            default_resolver: Some(Box::new(DefaultResolver)),
            type_resolvers: HashMap::new(),
            default_type_resolver: Some(Box::new(TypenameResolver)),
            subscriptions: HashMap::new(),
        }
    }

    /// Registers a resolver for a specific type and field.
    pub fn register<R: Resolver + 'static>(
        &mut self,
        type_name: impl Into<String>,
        field_name: impl Into<String>,
        resolver: R,
    ) {
        self.register_boxed(type_name, field_name, Box::new(resolver));
    }

    /// Registers an already boxed resolver.
    pub fn register_boxed(
        &mut self,
        type_name: impl Into<String>,
        field_name: impl Into<String>,
        resolver: BoxedResolver,
    ) {
        let key = coordinate(&type_name.into(), &field_name.into());
        self.resolvers.insert(key, resolver);
    }

    /// Registers a sync function as a resolver.
    pub fn register_fn<F>(
        &mut self,
        type_name: impl Into<String>,
        field_name: impl Into<String>,
        f: F,
    ) where
        F: Fn(&Value, &ResolverArgs, &Context, &ResolverInfo) -> ResolverResult
            + Send
            + Sync
            + 'static,
    {
        self.register(type_name, field_name, FnResolver::new(f));
    }

    /// Registers an async function as a resolver.
    pub fn register_async<F, Fut>(
        &mut self,
        type_name: impl Into<String>,
        field_name: impl Into<String>,
        f: F,
    ) where
        F: Fn(Value, ResolverArgs, Context, ResolverInfo) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ResolverResult> + Send + 'static,
    {
        self.register(type_name, field_name, AsyncFnResolver::new(f));
    }

    /// Registers a type resolver for an interface or union.
    pub fn register_type_resolver<R: TypeResolver + 'static>(
        &mut self,
        type_name: impl Into<String>,
        resolver: R,
    ) {
        self.type_resolvers
            .insert(type_name.into(), Box::new(resolver));
    }

    /// Registers the source stream resolver of a subscription field.
    pub fn register_subscription<R: SubscriptionResolver + 'static>(
        &mut self,
        type_name: impl Into<String>,
        field_name: impl Into<String>,
        resolver: R,
    ) {
        let key = coordinate(&type_name.into(), &field_name.into());
        self.subscriptions.insert(key, Box::new(resolver));
    }

    /// Gets a resolver for a type and field.
    pub fn get(&self, type_name: &str, field_name: &str) -> Option<&dyn Resolver> {
        self.resolvers
            .get(&coordinate(type_name, field_name))
            .map(|r| r.as_ref())
            .or(self.default_resolver.as_deref())
    }

    /// Returns true if a resolver was registered for exactly this field.
    pub fn contains(&self, type_name: &str, field_name: &str) -> bool {
        self.resolvers
            .contains_key(&coordinate(type_name, field_name))
    }

    /// Gets the type resolver for an abstract type.
    pub fn type_resolver(&self, type_name: &str) -> Option<&dyn TypeResolver> {
        self.type_resolvers
            .get(type_name)
            .map(|r| r.as_ref())
            .or(self.default_type_resolver.as_deref())
    }

    /// Gets the subscription source resolver for a type and field.
    pub fn subscription(
        &self,
        type_name: &str,
        field_name: &str,
    ) -> Option<&dyn SubscriptionResolver> {
        self.subscriptions
            .get(&coordinate(type_name, field_name))
            .map(|r| r.as_ref())
    }

    /// Sets the default resolver.
    pub fn set_default<R: Resolver + 'static>(&mut self, resolver: R) {
        self.default_resolver = Some(Box::new(resolver));
    }

    /// Removes the default resolver.
    pub fn remove_default(&mut self) {
        self.default_resolver = None;
    }

    /// Replaces every registered field resolver with `wrap(type, field, resolver)`.
    pub fn wrap_all<F>(mut self, wrap: F) -> Self
    where
        F: Fn(&str, &str, BoxedResolver) -> BoxedResolver,
    {
        self.resolvers = self
            .resolvers
            .into_iter()
            .map(|(key, resolver)| {
                let wrapped = match key.split_once('.') {
                    Some((type_name, field_name)) => wrap(type_name, field_name, resolver),
                    None => resolver,
                };
                (key, wrapped)
            })
            .collect();
        self
    }

    /// Replaces the default resolver with `wrap(resolver)`.
    pub fn wrap_default<F>(mut self, wrap: F) -> Self
    where
        F: FnOnce(BoxedResolver) -> BoxedResolver,
    {
        self.default_resolver = self.default_resolver.take().map(wrap);
        self
    }

    /// Replaces every type resolver, the default included, with `wrap(type, resolver)`.
    ///
    /// The default type resolver is passed with an empty type name.
    pub fn wrap_type_resolvers<F>(mut self, wrap: F) -> Self
    where
        F: Fn(&str, BoxedTypeResolver) -> BoxedTypeResolver,
    {
        self.type_resolvers = self
            .type_resolvers
            .into_iter()
            .map(|(name, resolver)| {
                let wrapped = wrap(&name, resolver);
                (name, wrapped)
            })
            .collect();
        self.default_type_resolver = self.default_type_resolver.take().map(|r| wrap("", r));
        self
    }
}

impl Debug for ResolverMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolverMap")
            .field("resolver_count", &self.resolvers.len())
            .field("has_default", &self.default_resolver.is_some())
            .field("type_resolver_count", &self.type_resolvers.len())
            .field("subscription_count", &self.subscriptions.len())
            .finish()
    }
}
