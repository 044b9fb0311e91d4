//! Continuation configuration.

use crate::adapter::ContinuationAdapter;
use crate::error::{log_error, ContinuationError, ErrorCallback};
use crate::token::ContinuationId;
use futures::future::BoxFuture;
use futures::FutureExt;
use gqlc_runtime::{Context, Executor, Request, Response};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

/// Runs a continuation's subquery.
///
/// The default runs it on the executor that reached the continuation field.
/// Override it to add request-scoped behavior around deferred executions.
pub trait ExecuteFn: Send + Sync {
    fn execute(&self, executor: Executor, request: Request) -> BoxFuture<'static, Response>;
}

impl<F, Fut> ExecuteFn for F
where
    F: Fn(Executor, Request) -> Fut + Send + Sync,
    Fut: Future<Output = Response> + Send + 'static,
{
    fn execute(&self, executor: Executor, request: Request) -> BoxFuture<'static, Response> {
        self(executor, request).boxed()
    }
}

/// Runs the subquery with [`Executor::execute`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultExecute;

impl ExecuteFn for DefaultExecute {
    fn execute(&self, executor: Executor, request: Request) -> BoxFuture<'static, Response> {
        async move { executor.execute(request).await }.boxed()
    }
}

/// Decides whether a context may read a continuation.
pub type AuthorizeFn = Arc<dyn Fn(&ContinuationId, &Context) -> bool + Send + Sync>;

/// The query field and argument that look a node up by its identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lookup {
    pub field: String,
    pub argument: String,
}

impl Lookup {
    pub fn new(field: impl Into<String>, argument: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            argument: argument.into(),
        }
    }
}

impl Default for Lookup {
    fn default() -> Self {
        Self::new("node", "id")
    }
}

/// Options of one type's `continuation` field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContinuationFieldOptions {
    /// Default of the `waitMs` argument. Falls back to the global default.
    pub wait_ms: Option<i64>,
    /// Declare the field nullable.
    pub nullable: bool,
    /// How the type is looked up when its subtree is re-executed.
    pub lookup: Option<Lookup>,
}

impl ContinuationFieldOptions {
    #[must_use]
    pub fn with_wait_ms(mut self, wait_ms: i64) -> Self {
        self.wait_ms = Some(wait_ms);
        self
    }

    #[must_use]
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    #[must_use]
    pub fn with_lookup(mut self, lookup: Lookup) -> Self {
        self.lookup = Some(lookup);
        self
    }
}

/// Per-type continuation setting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeContinuationConfig {
    /// The type gets no `continuation` field.
    Disabled,
    Enabled(ContinuationFieldOptions),
}

/// Which `Node` implementations get a `continuation` field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum WrapNodes {
    /// Every implementation the lookup field can fetch.
    #[default]
    All,
    None,
    /// Only these types. A type that cannot be looked up is a configuration error.
    Only(Vec<String>),
}

/// Configuration for [`add_continuations_to_schema`](crate::add_continuations_to_schema).
#[derive(Clone)]
pub struct ContinuationConfig {
    pub(crate) adapter: Arc<dyn ContinuationAdapter>,
    pub(crate) default_wait_ms: i64,
    pub(crate) type_config: HashMap<String, TypeContinuationConfig>,
    pub(crate) wrap_nodes: WrapNodes,
    pub(crate) node_id_field: String,
    pub(crate) resolve_recursively: bool,
    pub(crate) execute: Arc<dyn ExecuteFn>,
    pub(crate) add_subscription_field: bool,
    pub(crate) authorize: Option<AuthorizeFn>,
    pub(crate) on_error: ErrorCallback,
}

impl ContinuationConfig {
    pub fn new<A: ContinuationAdapter>(adapter: A) -> Self {
        Self::from_adapter(Arc::new(adapter))
    }

    pub fn from_adapter(adapter: Arc<dyn ContinuationAdapter>) -> Self {
        Self {
            adapter,
            default_wait_ms: 10,
            type_config: HashMap::new(),
            wrap_nodes: WrapNodes::default(),
            node_id_field: "id".to_string(),
            resolve_recursively: true,
            execute: Arc::new(DefaultExecute),
            add_subscription_field: true,
            authorize: None,
            on_error: log_error(),
        }
    }

    #[must_use]
    pub fn with_default_wait_ms(mut self, wait_ms: i64) -> Self {
        self.default_wait_ms = wait_ms;
        self
    }

    #[must_use]
    pub fn with_type_config(
        mut self,
        type_name: impl Into<String>,
        config: TypeContinuationConfig,
    ) -> Self {
        self.type_config.insert(type_name.into(), config);
        self
    }

    #[must_use]
    pub fn with_field_options(
        self,
        type_name: impl Into<String>,
        options: ContinuationFieldOptions,
    ) -> Self {
        self.with_type_config(type_name, TypeContinuationConfig::Enabled(options))
    }

    #[must_use]
    pub fn disable_type(self, type_name: impl Into<String>) -> Self {
        self.with_type_config(type_name, TypeContinuationConfig::Disabled)
    }

    #[must_use]
    pub fn with_wrap_nodes(mut self, wrap_nodes: WrapNodes) -> Self {
        self.wrap_nodes = wrap_nodes;
        self
    }

    #[must_use]
    pub fn with_node_id_field(mut self, field: impl Into<String>) -> Self {
        self.node_id_field = field.into();
        self
    }

    /// Resolve nested continuation tokens that already have a result.
    #[must_use]
    pub fn resolve_continuations_recursively(mut self, enabled: bool) -> Self {
        self.resolve_recursively = enabled;
        self
    }

    #[must_use]
    pub fn with_execute<E: ExecuteFn + 'static>(mut self, execute: E) -> Self {
        self.execute = Arc::new(execute);
        self
    }

    /// Add the `subscribeContinuation` and `subscribeContinuationList` fields.
    #[must_use]
    pub fn with_subscription_field(mut self, enabled: bool) -> Self {
        self.add_subscription_field = enabled;
        self
    }

    #[must_use]
    pub fn with_authorize<F>(mut self, authorize: F) -> Self
    where
        F: Fn(&ContinuationId, &Context) -> bool + Send + Sync + 'static,
    {
        self.authorize = Some(Arc::new(authorize));
        self
    }

    #[must_use]
    pub fn with_on_error<F>(mut self, on_error: F) -> Self
    where
        F: Fn(&ContinuationError) + Send + Sync + 'static,
    {
        self.on_error = Arc::new(on_error);
        self
    }

    pub fn adapter(&self) -> &Arc<dyn ContinuationAdapter> {
        &self.adapter
    }

    pub fn default_wait_ms(&self) -> i64 {
        self.default_wait_ms
    }

    /// Options of a type, or `None` if the type opted out.
    pub fn field_options(&self, type_name: &str) -> Option<ContinuationFieldOptions> {
        match self.type_config.get(type_name) {
            Some(TypeContinuationConfig::Disabled) => None,
            Some(TypeContinuationConfig::Enabled(options)) => Some(options.clone()),
            None => Some(ContinuationFieldOptions::default()),
        }
    }

    /// Fails with [`ContinuationError::Unauthorized`] if the hook denies access.
    pub fn authorize(&self, id: &ContinuationId, ctx: &Context) -> Result<(), ContinuationError> {
        match &self.authorize {
            Some(authorize) if !authorize(id, ctx) => {
                Err(ContinuationError::Unauthorized(id.clone()))
            }
            _ => Ok(()),
        }
    }

    pub(crate) fn report(&self, error: &ContinuationError) {
        (self.on_error)(error);
    }
}

impl std::fmt::Debug for ContinuationConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContinuationConfig")
            .field("default_wait_ms", &self.default_wait_ms)
            .field("type_config", &self.type_config)
            .field("wrap_nodes", &self.wrap_nodes)
            .field("node_id_field", &self.node_id_field)
            .field("resolve_recursively", &self.resolve_recursively)
            .field("add_subscription_field", &self.add_subscription_field)
            .field("has_authorize", &self.authorize.is_some())
            .finish_non_exhaustive()
    }
}
