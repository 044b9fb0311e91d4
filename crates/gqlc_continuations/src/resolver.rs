//! Continuation field resolvers.
//!
//! `continuation` fields run their subtree as a separate execution and race
//! it against the field's `waitMs`. A subtree that settles in time is
//! returned inline and its path is marked, so the resolvers beneath it read
//! the materialized data instead of running again. A subtree that misses
//! the deadline keeps running under the adapter, and the field returns a
//! token.

use crate::adapter::PendingExecution;
use crate::config::ContinuationConfig;
use crate::error::ContinuationError;
use crate::guard::extract;
use crate::interleave::{interleave_errors, unwrap_target};
use crate::path_tracker::{is_marked, mark};
use crate::stream::{ContinuationEvent, ContinuationStream};
use crate::subquery::{extract_for_field, NodeWrap};
use crate::token::{ContinuationId, ContinuationToken};
use futures::StreamExt;
use gqlc_runtime::{
    Context, Executor, PathSegment, Request, Resolver, ResolverArgs, ResolverError,
    ResolverFuture, ResolverInfo, ResolverResult, Response, SubscriptionFuture,
    SubscriptionResolver,
};
use gqlc_syntax::ast::{FragmentDefinition, Selection, SelectionSet};
use indexmap::IndexMap;
use rustc_hash::FxHashSet;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;

/// Resolves a `continuation` field.
pub struct ContinuationFieldResolver {
    config: Arc<ContinuationConfig>,
    node: Option<NodeWrap>,
    default_wait_ms: u64,
}

impl ContinuationFieldResolver {
    pub fn new(
        config: Arc<ContinuationConfig>,
        node: Option<NodeWrap>,
        default_wait_ms: u64,
    ) -> Self {
        Self {
            config,
            node,
            default_wait_ms,
        }
    }

    fn wait_duration(&self, args: &ResolverArgs) -> Result<Duration, ContinuationError> {
        match args.get("waitMs") {
            None | Some(Value::Null) => Ok(Duration::from_millis(self.default_wait_ms)),
            Some(value) => value
                .as_u64()
                .map(Duration::from_millis)
                .ok_or_else(|| ContinuationError::InvalidWaitMs(value.to_string())),
        }
    }

    async fn race(
        &self,
        parent: &Value,
        args: &ResolverArgs,
        ctx: &Context,
        info: &ResolverInfo,
    ) -> ResolverResult {
        let wait = self.wait_duration(args)?;
        let executor = info.executor.clone().ok_or_else(|| {
            ResolverError::Internal("continuation fields must run inside an executor".into())
        })?;
        let subquery = extract_for_field(info, self.node.as_ref())?;

        let mut variables = Map::new();
        for name in &subquery.variable_names {
            if let Some(value) = info.variable_values.get(name) {
                variables.insert(name.clone(), value.clone());
            }
        }
        if let Some(variable) = &subquery.node_variable {
            let id = self.node_id(parent, ctx, info, &executor).await?;
            variables.insert(variable.clone(), id);
        }

        let request = Request::new(Arc::clone(&subquery.document))
            .with_variables(variables)
            .with_context(ctx.clone());
        let execution = self.config.execute.execute(executor, request);
        let target = subquery.target_field.clone();
        let mut handle = tokio::spawn(async move {
            let response = execution.await;
            match target {
                Some(field) => unwrap_target(response, &field),
                None => response,
            }
        });

        match tokio::time::timeout(wait, &mut handle).await {
            Ok(Ok(response)) => {
                tracing::debug!(path = ?info.path, "continuation settled inline");
                let data = interleave_errors(response)?;
                mark(&info.scope, &info.path);
                Ok(data)
            }
            Ok(Err(error)) => Err(ResolverError::Internal(format!(
                "continuation execution failed: {error}"
            ))),
            Err(_) => {
                let execution = PendingExecution::from_handle(handle);
                let id = self
                    .config
                    .adapter
                    .store_result(execution, ctx)
                    .await
                    .map_err(|error| {
                        self.config.report(&error);
                        error
                    })?;
                tracing::debug!(continuation_id = %id, path = ?info.path, "issued continuation");
                Ok(ContinuationToken::new(id).to_value())
            }
        }
    }

    /// Computes the parent's identifier with its own resolver.
    async fn node_id(
        &self,
        parent: &Value,
        ctx: &Context,
        info: &ResolverInfo,
        executor: &Executor,
    ) -> ResolverResult {
        let field = &self.config.node_id_field;
        let resolver = executor
            .resolvers()
            .get(&info.parent_type, field)
            .ok_or_else(|| ResolverError::FieldNotFound(format!("{}.{field}", info.parent_type)))?;

        let mut id_info = info.clone();
        id_info.field_name.clone_from(field);
        id_info.response_key.clone_from(field);
        id_info.selection_set = None;
        id_info.path.pop();
        id_info.path.push(PathSegment::Field(field.clone()));
        if let Some(def) = executor.schema().field(&info.parent_type, field) {
            id_info.return_type = def.ty.to_string();
        }
        resolver
            .resolve(parent, &ResolverArgs::new(), ctx, &id_info)
            .await
    }

    /// Beneath a settled continuation the value is already materialized.
    /// A nested token is swapped for its result when one is available.
    async fn resolve_nested(
        &self,
        parent: &Value,
        ctx: &Context,
        info: &ResolverInfo,
    ) -> ResolverResult {
        let value = extract(parent, info)?;
        if !self.config.resolve_recursively {
            return Ok(value);
        }
        let Some(token) = ContinuationToken::from_value(&value) else {
            return Ok(value);
        };
        let id = token.continuation_id;
        let adapter = &self.config.adapter;
        match adapter.has_result(&id, ctx).await {
            Ok(true) => {}
            Ok(false) => return Ok(value),
            Err(error) => {
                self.config.report(&error);
                return Ok(value);
            }
        }
        self.config.authorize(&id, ctx)?;
        match adapter.resolve_result(&id, ctx).await {
            Ok(response) => Ok(interleave_errors(response)?),
            Err(ContinuationError::NotFound(_)) => {
                tracing::warn!(continuation_id = %id, "continuation had a result but was not found");
                Err(ContinuationError::Backend(format!("continuation {id} expired while resolving"))
                    .into())
            }
            Err(error) => Err(error.into()),
        }
    }
}

impl Resolver for ContinuationFieldResolver {
    fn resolve<'a>(
        &'a self,
        parent: &'a Value,
        args: &'a ResolverArgs,
        ctx: &'a Context,
        info: &'a ResolverInfo,
    ) -> ResolverFuture<'a> {
        Box::pin(async move {
            if is_marked(&info.scope, &info.path) {
                self.resolve_nested(parent, ctx, info).await
            } else {
                self.race(parent, args, ctx, info).await
            }
        })
    }
}

/// Resolves `resolveContinuation(continuationId:)`.
pub struct ResolveContinuationResolver {
    config: Arc<ContinuationConfig>,
}

impl ResolveContinuationResolver {
    pub fn new(config: Arc<ContinuationConfig>) -> Self {
        Self { config }
    }
}

impl Resolver for ResolveContinuationResolver {
    fn resolve<'a>(
        &'a self,
        _parent: &'a Value,
        args: &'a ResolverArgs,
        ctx: &'a Context,
        info: &'a ResolverInfo,
    ) -> ResolverFuture<'a> {
        Box::pin(async move {
            let id = ContinuationId::from(args.require::<String>("continuationId")?);
            self.config.authorize(&id, ctx)?;
            let response = self.config.adapter.resolve_result(&id, ctx).await?;
            let data = interleave_errors(response)?;
            mark(&info.scope, &info.path);
            Ok(data)
        })
    }
}

/// Source stream of `subscribeContinuation` and `subscribeContinuationList`.
///
/// Each event is `{ continuationId, response }`, with the raw response of
/// the deferred execution.
pub struct ContinuationSubscription {
    config: Arc<ContinuationConfig>,
    list: bool,
}

impl ContinuationSubscription {
    pub fn single(config: Arc<ContinuationConfig>) -> Self {
        Self {
            config,
            list: false,
        }
    }

    pub fn list(config: Arc<ContinuationConfig>) -> Self {
        Self { config, list: true }
    }
}

/// A failed resolution travels as an error response, so list events keep
/// their identifier.
fn event_value(event: ContinuationEvent) -> ResolverResult {
    let response = event
        .result
        .unwrap_or_else(|error| Response::error(error.to_field_error()));
    let response = serde_json::to_value(&response).map_err(ContinuationError::from)?;
    Ok(json!({
        "continuationId": event.continuation_id.as_str(),
        "response": response,
    }))
}

fn event_response(event: &Value) -> Result<Response, ResolverError> {
    let response = event.get("response").cloned().unwrap_or(Value::Null);
    serde_json::from_value(response).map_err(|e| ContinuationError::from(e).into())
}

impl SubscriptionResolver for ContinuationSubscription {
    fn subscribe<'a>(
        &'a self,
        args: &'a ResolverArgs,
        ctx: &'a Context,
        _info: &'a ResolverInfo,
    ) -> SubscriptionFuture<'a> {
        Box::pin(async move {
            let ids: Vec<ContinuationId> = if self.list {
                args.require::<Vec<String>>("continuationIds")?
                    .into_iter()
                    .map(ContinuationId::from)
                    .collect()
            } else {
                vec![ContinuationId::from(args.require::<String>("continuationId")?)]
            };
            for id in &ids {
                self.config.authorize(id, ctx)?;
            }
            let stream = ContinuationStream::new(Arc::clone(&self.config.adapter), ids, ctx.clone());
            Ok(stream.map(event_value).boxed())
        })
    }
}

/// Resolves `subscribeContinuation` from its source event.
pub struct SubscribedValueResolver;

impl Resolver for SubscribedValueResolver {
    fn resolve<'a>(
        &'a self,
        parent: &'a Value,
        _args: &'a ResolverArgs,
        _ctx: &'a Context,
        info: &'a ResolverInfo,
    ) -> ResolverFuture<'a> {
        Box::pin(async move {
            let data = interleave_errors(event_response(parent)?)?;
            mark(&info.scope, &info.path);
            Ok(data)
        })
    }
}

/// Resolves `subscribeContinuationList` into a `ContinuationResolvedEvent`.
pub struct ResolvedEventResolver;

impl Resolver for ResolvedEventResolver {
    fn resolve<'a>(
        &'a self,
        parent: &'a Value,
        _args: &'a ResolverArgs,
        _ctx: &'a Context,
        info: &'a ResolverInfo,
    ) -> ResolverFuture<'a> {
        Box::pin(async move {
            let continuation_id = parent.get("continuationId").cloned().unwrap_or(Value::Null);
            let mut event = Map::new();
            event.insert("continuationId".into(), continuation_id);
            match interleave_errors(event_response(parent)?) {
                Ok(data) => {
                    // Marked paths are read by response key, aliases included.
                    for key in response_keys(info, "value") {
                        let mut path = info.path.clone();
                        path.push(PathSegment::Field(key.clone()));
                        mark(&info.scope, &path);
                        event.insert(key, data.clone());
                    }
                    event.insert("value".into(), data);
                }
                Err(error) => {
                    event.insert("value".into(), error.embed());
                }
            }
            Ok(Value::Object(event))
        })
    }
}

/// Response keys under which the field's selection set requests `field_name`.
fn response_keys(info: &ResolverInfo, field_name: &str) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(set) = &info.selection_set {
        let mut visited = FxHashSet::default();
        collect_response_keys(set, &info.fragments, field_name, &mut visited, &mut keys);
    }
    keys
}

fn collect_response_keys(
    set: &SelectionSet,
    fragments: &IndexMap<String, FragmentDefinition>,
    field_name: &str,
    visited: &mut FxHashSet<String>,
    keys: &mut Vec<String>,
) {
    for selection in &set.selections {
        match selection {
            Selection::Field(field) => {
                let key = field.response_key();
                if field.name.value == field_name && !keys.iter().any(|k| k == key) {
                    keys.push(key.to_string());
                }
            }
            Selection::InlineFragment(inline) => {
                collect_response_keys(&inline.selection_set, fragments, field_name, visited, keys);
            }
            Selection::FragmentSpread(spread) => {
                if !visited.insert(spread.name.value.clone()) {
                    continue;
                }
                if let Some(fragment) = fragments.get(&spread.name.value) {
                    collect_response_keys(&fragment.selection_set, fragments, field_name, visited, keys);
                }
            }
        }
    }
}
