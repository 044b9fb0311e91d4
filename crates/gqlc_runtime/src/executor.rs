//! Query execution for gqlc.

use crate::resolver::{ResolverArgs, ResolverInfo, ResolverMap};
use crate::schema::{FieldDef, Schema, TypeDef, TypeRef};
use crate::scope::ExecutionScope;
use futures::future::{join_all, BoxFuture};
use futures::stream::{BoxStream, StreamExt};
use gqlc_syntax::ast::{
    self, Argument, Directive, Document, FieldSelection, FragmentDefinition, OperationType,
    Selection, SelectionSet, VariableDefinition,
};
use gqlc_syntax::SyntaxError;
use indexmap::IndexMap;
use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Executor configuration.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Maximum response path depth before a field is refused.
    pub max_depth: usize,
    /// Emit a trace event for every resolved field.
    pub tracing: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_depth: 64,
            tracing: false,
        }
    }
}

/// Stream of responses produced by a subscription.
pub type ResponseStream = BoxStream<'static, Response>;

/// The query executor.
///
/// Cloning is cheap: the schema and resolvers are shared.
#[derive(Clone)]
pub struct Executor {
    schema: Arc<Schema>,
    resolvers: Arc<ResolverMap>,
    config: ExecutorConfig,
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("config", &self.config)
            .field("type_count", &self.schema.types.len())
            .finish()
    }
}

impl Executor {
    /// Creates an executor for a schema and its resolvers.
    pub fn new(schema: Schema, resolvers: ResolverMap) -> Self {
        Self::from_parts(Arc::new(schema), Arc::new(resolvers))
    }

    /// Creates an executor from shared parts.
    pub fn from_parts(schema: Arc<Schema>, resolvers: Arc<ResolverMap>) -> Self {
        Self {
            schema,
            resolvers,
            config: ExecutorConfig::default(),
        }
    }

    /// Replaces the configuration.
    pub fn with_config(mut self, config: ExecutorConfig) -> Self {
        self.config = config;
        self
    }

    /// Gets a reference to the schema.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Gets a reference to the resolvers.
    pub fn resolvers(&self) -> &ResolverMap {
        &self.resolvers
    }

    /// Executes a query or mutation.
    pub async fn execute(&self, request: Request) -> Response {
        let prepared = match self.prepare(&request) {
            Ok(prepared) => prepared,
            Err(response) => return response,
        };
        if prepared.operation_type == OperationType::Subscription {
            return Response::error(FieldError::new(
                "Subscription operations must be run with subscribe",
            ));
        }
        self.run(prepared, request.context, request.root_value).await
    }

    /// Starts a subscription.
    ///
    /// Every source event is executed against the operation's selection set
    /// in a fresh execution scope, with the event as root value.
    pub async fn subscribe(&self, request: Request) -> Result<ResponseStream, Response> {
        let prepared = self.prepare(&request)?;
        if prepared.operation_type != OperationType::Subscription {
            return Err(Response::error(FieldError::new(format!(
                "Expected a subscription operation, found {}",
                prepared.operation_type.as_str()
            ))));
        }

        let ctx = ExecutionContext::new(self.clone(), prepared.clone(), request.context.clone());
        let root_type = prepared.root_type.clone();
        let sets = vec![Arc::clone(&prepared.root_set)];
        let mut fields = IndexMap::new();
        let mut visited = FxHashSet::default();
        for set in &sets {
            collect_fields(&ctx, &root_type, set, &mut visited, &mut fields);
        }
        if fields.len() != 1 {
            return Err(Response::error(FieldError::new(
                "A subscription must select exactly one root field",
            )));
        }
        let Some((response_key, nodes)) = fields.into_iter().next() else {
            return Err(Response::error(FieldError::new("Empty subscription")));
        };
        let field = nodes[0];
        let path = vec![PathSegment::Field(response_key.to_string())];
        let field_error = |error: FieldError| Response::error(error.with_path(path.clone()));

        let Some(field_def) = self.schema.field(&root_type, &field.name.value) else {
            return Err(field_error(FieldError::new(format!(
                "Cannot query field \"{}\" on type \"{}\".",
                field.name, root_type
            ))));
        };
        let Some(source) = self.resolvers.subscription(&root_type, &field.name.value) else {
            return Err(field_error(FieldError::new(format!(
                "No subscription resolver for {}.{}",
                root_type, field.name
            ))));
        };
        let args = coerce_arguments(field_def, &field.arguments, &ctx.variables)
            .map_err(field_error)?;
        let info = ctx.resolver_info(&root_type, field_def, field, response_key, &nodes, path.clone());

        let events = source
            .subscribe(&args, &ctx.context, &info)
            .await
            .map_err(|e| field_error(FieldError::from(e)))?;

        let executor = self.clone();
        let context = request.context;
        let stream = events.then(move |event| {
            let executor = executor.clone();
            let prepared = prepared.clone();
            let context = context.clone();
            let path = path.clone();
            async move {
                match event {
                    Ok(root) => executor.run(prepared, context, root).await,
                    Err(error) => Response::error(FieldError::from(error).with_path(path)),
                }
            }
        });
        Ok(stream.boxed())
    }

    /// Selects the operation and coerces its variables.
    fn prepare(&self, request: &Request) -> Result<Prepared, Response> {
        let document = &request.document;
        let operation = document
            .operation(request.operation_name.as_deref())
            .ok_or_else(|| {
                let message = match &request.operation_name {
                    Some(name) => format!("Unknown operation named \"{name}\"."),
                    None if document.operations().next().is_none() => {
                        "Document does not contain any operations.".to_string()
                    }
                    None => {
                        "Must provide operation name if query contains multiple operations."
                            .to_string()
                    }
                };
                Response::error(FieldError::new(message))
            })?;

        let root_type = self
            .schema
            .root_type(operation.operation)
            .ok_or_else(|| {
                Response::error(FieldError::new(format!(
                    "Schema is not configured to execute {} operations.",
                    operation.operation.as_str()
                )))
            })?
            .to_string();

        let variables = coerce_variables(&operation.variables, &request.variables)
            .map_err(Response::errors)?;

        let fragments = document
            .fragments()
            .map(|frag| (frag.name.value.clone(), frag.clone()))
            .collect();

        Ok(Prepared {
            operation_type: operation.operation,
            root_type,
            root_set: Arc::new(operation.selection_set.clone()),
            fragments: Arc::new(fragments),
            variable_definitions: Arc::new(operation.variables.clone()),
            variables: Arc::new(variables),
        })
    }

    /// Runs a prepared operation in a fresh scope.
    async fn run(&self, prepared: Prepared, context: Context, root: Value) -> Response {
        let serial = prepared.operation_type == OperationType::Mutation;
        let ctx = ExecutionContext::new(self.clone(), prepared, context);
        let sets = vec![Arc::clone(&ctx.prepared.root_set)];
        let root_type = ctx.prepared.root_type.clone();

        let data = execute_fields(&ctx, &root_type, &root, &sets, &[], serial).await;

        let errors = std::mem::take(&mut *ctx.errors.lock());
        Response {
            data: Some(data),
            errors: (!errors.is_empty()).then_some(errors),
        }
    }
}

/// An operation request.
#[derive(Debug, Clone)]
pub struct Request {
    /// The parsed document.
    pub document: Arc<Document>,
    /// The operation to run, required when the document has several.
    pub operation_name: Option<String>,
    /// Raw variable values.
    pub variables: Map<String, Value>,
    /// Request-scoped data handed to every resolver.
    pub context: Context,
    /// The value root fields are resolved against.
    pub root_value: Value,
}

impl Request {
    /// Creates a request for a parsed document.
    pub fn new(document: impl Into<Arc<Document>>) -> Self {
        Self {
            document: document.into(),
            operation_name: None,
            variables: Map::new(),
            context: Context::new(),
            root_value: Value::Object(Map::new()),
        }
    }

    /// Parses `source` into a request.
    pub fn parse(source: &str) -> Result<Self, SyntaxError> {
        gqlc_syntax::parse(source).map(Self::new)
    }

    /// Sets the operation name.
    pub fn with_operation_name(mut self, name: impl Into<String>) -> Self {
        self.operation_name = Some(name.into());
        self
    }

    /// Replaces all variables.
    pub fn with_variables(mut self, variables: Map<String, Value>) -> Self {
        self.variables = variables;
        self
    }

    /// Sets one variable.
    pub fn with_variable(mut self, name: impl Into<String>, value: Value) -> Self {
        self.variables.insert(name.into(), value);
        self
    }

    /// Sets the context.
    pub fn with_context(mut self, context: Context) -> Self {
        self.context = context;
        self
    }

    /// Sets the root value.
    pub fn with_root_value(mut self, root_value: Value) -> Self {
        self.root_value = root_value;
        self
    }
}

/// An operation ready to run.
#[derive(Debug, Clone)]
struct Prepared {
    operation_type: OperationType,
    root_type: String,
    root_set: Arc<SelectionSet>,
    fragments: Arc<IndexMap<String, FragmentDefinition>>,
    variable_definitions: Arc<Vec<VariableDefinition>>,
    variables: Arc<Map<String, Value>>,
}

/// State of one execution.
struct ExecutionContext {
    executor: Executor,
    prepared: Prepared,
    context: Context,
    scope: Arc<ExecutionScope>,
    variables: Arc<Map<String, Value>>,
    errors: Mutex<Vec<FieldError>>,
}

impl ExecutionContext {
    fn new(executor: Executor, prepared: Prepared, context: Context) -> Self {
        Self {
            executor,
            variables: Arc::clone(&prepared.variables),
            prepared,
            context,
            scope: Arc::new(ExecutionScope::new()),
            errors: Mutex::new(Vec::new()),
        }
    }

    fn schema(&self) -> &Schema {
        &self.executor.schema
    }

    fn push_error(&self, error: FieldError, path: &[PathSegment]) {
        self.errors.lock().push(error.with_path(path.to_vec()));
    }

    fn resolver_info(
        &self,
        parent_type: &str,
        field_def: &FieldDef,
        field: &FieldSelection,
        response_key: &str,
        nodes: &[&FieldSelection],
        path: Vec<PathSegment>,
    ) -> ResolverInfo {
        ResolverInfo {
            field_name: field.name.value.clone(),
            response_key: response_key.to_string(),
            return_type: field_def.ty.to_string(),
            parent_type: parent_type.to_string(),
            path,
            selection_set: merged_selection_set(nodes),
            fragments: Arc::clone(&self.prepared.fragments),
            variable_definitions: Arc::clone(&self.prepared.variable_definitions),
            variable_values: Arc::clone(&self.variables),
            scope: Arc::clone(&self.scope),
            executor: Some(self.executor.clone()),
        }
    }
}

/// Returns the sub-selection of a field, merged across nodes sharing its response key.
fn merged_selection_set(nodes: &[&FieldSelection]) -> Option<Arc<SelectionSet>> {
    let mut sets = nodes.iter().filter_map(|node| node.selection_set.as_ref());
    let first = sets.next()?;
    let rest: Vec<_> = sets.collect();
    if rest.is_empty() {
        return Some(Arc::clone(first));
    }
    let mut merged = SelectionSet::clone(first);
    for set in rest {
        merged.selections.extend(set.selections.iter().cloned());
    }
    Some(Arc::new(merged))
}

/// Collects fields of `selection_set` that apply to `object_type`, grouped by response key.
fn collect_fields<'s>(
    ctx: &'s ExecutionContext,
    object_type: &str,
    selection_set: &'s SelectionSet,
    visited: &mut FxHashSet<&'s str>,
    fields: &mut IndexMap<&'s str, Vec<&'s FieldSelection>>,
) {
    for selection in &selection_set.selections {
        match selection {
            Selection::Field(field) => {
                if should_include(&field.directives, &ctx.variables) {
                    fields.entry(field.response_key()).or_default().push(field);
                }
            }
            Selection::InlineFragment(inline) => {
                if !should_include(&inline.directives, &ctx.variables) {
                    continue;
                }
                let applies = inline
                    .type_condition
                    .as_ref()
                    .map_or(true, |cond| ctx.schema().is_possible_type(&cond.value, object_type));
                if applies {
                    collect_fields(ctx, object_type, &inline.selection_set, visited, fields);
                }
            }
            Selection::FragmentSpread(spread) => {
                if !should_include(&spread.directives, &ctx.variables)
                    || !visited.insert(&spread.name.value)
                {
                    continue;
                }
                let Some(fragment) = ctx.prepared.fragments.get(&spread.name.value) else {
                    continue;
                };
                if ctx
                    .schema()
                    .is_possible_type(&fragment.type_condition.value, object_type)
                {
                    collect_fields(ctx, object_type, &fragment.selection_set, visited, fields);
                }
            }
        }
    }
}

/// Evaluates `@skip` and `@include`.
fn should_include(directives: &[Directive], variables: &Map<String, Value>) -> bool {
    let condition = |name: &str| {
        directives
            .iter()
            .find(|d| d.name.value == name)
            .and_then(|d| d.arguments.iter().find(|a| a.name.value == "if"))
            .map(|arg| value_to_json(&arg.value, variables) == Value::Bool(true))
    };
    condition("skip") != Some(true) && condition("include") != Some(false)
}

/// Executes the fields of `sets` against `parent`.
fn execute_fields<'a>(
    ctx: &'a ExecutionContext,
    object_type: &'a str,
    parent: &'a Value,
    sets: &'a [Arc<SelectionSet>],
    path: &'a [PathSegment],
    serial: bool,
) -> BoxFuture<'a, Value> {
    Box::pin(async move {
        if path.len() > ctx.executor.config.max_depth {
            ctx.push_error(
                FieldError::new(format!(
                    "Maximum execution depth of {} exceeded",
                    ctx.executor.config.max_depth
                )),
                path,
            );
            return Value::Null;
        }

        let mut fields = IndexMap::new();
        let mut visited = FxHashSet::default();
        for set in sets {
            collect_fields(ctx, object_type, set, &mut visited, &mut fields);
        }

        let mut result = Map::with_capacity(fields.len());
        if serial {
            for (key, nodes) in &fields {
                let value = execute_field(ctx, object_type, parent, key, nodes, path).await;
                result.insert((*key).to_string(), value);
            }
        } else {
            let values = join_all(fields.iter().map(|(key, nodes)| {
                execute_field(ctx, object_type, parent, key, nodes, path)
            }))
            .await;
            for ((key, _), value) in fields.iter().zip(values) {
                result.insert((*key).to_string(), value);
            }
        }
        Value::Object(result)
    })
}

/// Resolves and completes one field.
async fn execute_field(
    ctx: &ExecutionContext,
    object_type: &str,
    parent: &Value,
    response_key: &str,
    nodes: &[&FieldSelection],
    parent_path: &[PathSegment],
) -> Value {
    let field = nodes[0];
    let mut path = parent_path.to_vec();
    path.push(PathSegment::Field(response_key.to_string()));

    if field.name.value == "__typename" {
        return Value::String(object_type.to_string());
    }

    let Some(field_def) = ctx.schema().field(object_type, &field.name.value) else {
        ctx.push_error(
            FieldError::new(format!(
                "Cannot query field \"{}\" on type \"{}\".",
                field.name, object_type
            )),
            &path,
        );
        return Value::Null;
    };

    let args = match coerce_arguments(field_def, &field.arguments, &ctx.variables) {
        Ok(args) => args,
        Err(error) => {
            ctx.push_error(error, &path);
            return Value::Null;
        }
    };

    let info = ctx.resolver_info(object_type, field_def, field, response_key, nodes, path.clone());
    if ctx.executor.config.tracing {
        tracing::trace!(path = ?path, parent_type = object_type, "resolving field");
    }

    let resolved = match ctx.executor.resolvers.get(object_type, &field.name.value) {
        Some(resolver) => resolver.resolve(parent, &args, &ctx.context, &info).await,
        None => Ok(parent.get(&field.name.value).cloned().unwrap_or(Value::Null)),
    };

    match resolved {
        Ok(value) => {
            let sets: Vec<_> = nodes
                .iter()
                .filter_map(|node| node.selection_set.clone())
                .collect();
            complete_value(ctx, &field_def.ty, &info, &sets, &path, value).await
        }
        Err(error) => {
            ctx.push_error(FieldError::from(error), &path);
            Value::Null
        }
    }
}

/// Completes a resolved value against its declared type.
fn complete_value<'a>(
    ctx: &'a ExecutionContext,
    ty: &'a TypeRef,
    info: &'a ResolverInfo,
    sets: &'a [Arc<SelectionSet>],
    path: &'a [PathSegment],
    value: Value,
) -> BoxFuture<'a, Value> {
    Box::pin(async move {
        if let Some(error) = FieldError::from_embedded(&value) {
            ctx.push_error(error, path);
            return Value::Null;
        }
        match ty {
            TypeRef::NonNull(inner) => {
                if value.is_null() {
                    ctx.push_error(
                        FieldError::new(format!(
                            "Cannot return null for non-nullable field {}.{}.",
                            info.parent_type, info.field_name
                        )),
                        path,
                    );
                    return Value::Null;
                }
                complete_value(ctx, inner, info, sets, path, value).await
            }
            _ if value.is_null() => Value::Null,
            TypeRef::List(inner) => {
                let Value::Array(items) = value else {
                    ctx.push_error(
                        FieldError::new(format!(
                            "Expected a list for field {}.{}.",
                            info.parent_type, info.field_name
                        )),
                        path,
                    );
                    return Value::Null;
                };
                let paths: Vec<_> = (0..items.len())
                    .map(|i| {
                        let mut item_path = path.to_vec();
                        item_path.push(PathSegment::Index(i));
                        item_path
                    })
                    .collect();
                let completed = join_all(
                    items
                        .into_iter()
                        .zip(&paths)
                        .map(|(item, item_path)| complete_value(ctx, inner, info, sets, item_path, item)),
                )
                .await;
                Value::Array(completed)
            }
            TypeRef::Named(name) => complete_named(ctx, name, info, sets, path, value).await,
        }
    })
}

async fn complete_named(
    ctx: &ExecutionContext,
    type_name: &str,
    info: &ResolverInfo,
    sets: &[Arc<SelectionSet>],
    path: &[PathSegment],
    value: Value,
) -> Value {
    match ctx.schema().get_type(type_name) {
        Some(TypeDef::Scalar(_) | TypeDef::Enum(_)) => value,
        Some(TypeDef::Object(_)) => {
            execute_fields(ctx, type_name, &value, sets, path, false).await
        }
        Some(TypeDef::Interface(_) | TypeDef::Union(_)) => {
            let resolved = ctx
                .executor
                .resolvers
                .type_resolver(type_name)
                .and_then(|resolver| resolver.resolve_type(&value, &ctx.context, info))
                .filter(|object| {
                    ctx.schema().object(object).is_some()
                        && ctx.schema().is_possible_type(type_name, object)
                });
            match resolved {
                Some(object_type) => {
                    execute_fields(ctx, &object_type, &value, sets, path, false).await
                }
                None => {
                    ctx.push_error(
                        FieldError::new(format!(
                            "Abstract type \"{}\" must resolve to an object type at runtime for field \"{}.{}\".",
                            type_name, info.parent_type, info.field_name
                        )),
                        path,
                    );
                    Value::Null
                }
            }
        }
        Some(TypeDef::InputObject(_)) | None => {
            ctx.push_error(
                FieldError::new(format!("Type \"{type_name}\" cannot be used as an output type.")),
                path,
            );
            Value::Null
        }
    }
}

/// Converts a literal to JSON, substituting variables. Missing variables become null.
pub fn value_to_json(value: &ast::Value, variables: &Map<String, Value>) -> Value {
    match value {
        ast::Value::Variable(name) => variables.get(&name.value).cloned().unwrap_or(Value::Null),
        ast::Value::Int(i, _) => Value::from(*i),
        ast::Value::Float(f, _) => serde_json::Number::from_f64(*f).map_or(Value::Null, Value::Number),
        ast::Value::String(s, _) => Value::String(s.clone()),
        ast::Value::Boolean(b, _) => Value::Bool(*b),
        ast::Value::Null(_) => Value::Null,
        ast::Value::Enum(name) => Value::String(name.value.clone()),
        ast::Value::List(items, _) => {
            Value::Array(items.iter().map(|item| value_to_json(item, variables)).collect())
        }
        ast::Value::Object(fields, _) => Value::Object(
            fields
                .iter()
                .map(|(name, value)| (name.value.clone(), value_to_json(value, variables)))
                .collect(),
        ),
    }
}

/// Coerces operation variables, applying defaults.
fn coerce_variables(
    definitions: &[VariableDefinition],
    provided: &Map<String, Value>,
) -> Result<Map<String, Value>, Vec<FieldError>> {
    let mut coerced = Map::new();
    let mut errors = Vec::new();
    for def in definitions {
        let name = &def.name.value;
        match provided.get(name) {
            Some(Value::Null) if def.ty.is_non_null() => errors.push(FieldError::new(format!(
                "Variable \"${name}\" of non-null type \"{}\" must not be null.",
                def.ty
            ))),
            Some(value) => {
                coerced.insert(name.clone(), value.clone());
            }
            None => match &def.default_value {
                Some(default) => {
                    coerced.insert(name.clone(), value_to_json(default, &Map::new()));
                }
                None if def.ty.is_non_null() => errors.push(FieldError::new(format!(
                    "Variable \"${name}\" of required type \"{}\" was not provided.",
                    def.ty
                ))),
                None => {}
            },
        }
    }
    if errors.is_empty() {
        Ok(coerced)
    } else {
        Err(errors)
    }
}

/// Coerces field arguments, applying schema defaults.
fn coerce_arguments(
    field_def: &FieldDef,
    arguments: &[Argument],
    variables: &Map<String, Value>,
) -> Result<ResolverArgs, FieldError> {
    let mut args = ResolverArgs::new();
    for (name, def) in &field_def.arguments {
        let provided = arguments
            .iter()
            .find(|arg| &arg.name.value == name)
            .and_then(|arg| match &arg.value {
                ast::Value::Variable(var) => variables.get(&var.value).cloned(),
                literal => Some(value_to_json(literal, variables)),
            });
        let value = match (provided, &def.default_value) {
            (Some(value), _) => value,
            (None, Some(default)) => default.clone(),
            (None, None) => {
                if matches!(def.ty, TypeRef::NonNull(_)) {
                    return Err(FieldError::new(format!(
                        "Argument \"{name}\" of required type \"{}\" was not provided.",
                        def.ty
                    )));
                }
                continue;
            }
        };
        if value.is_null() && matches!(def.ty, TypeRef::NonNull(_)) {
            return Err(FieldError::new(format!(
                "Argument \"{name}\" of non-null type \"{}\" must not be null.",
                def.ty
            )));
        }
        args.set(name.clone(), value);
    }
    Ok(args)
}

/// Request-scoped data handed to resolvers.
#[derive(Debug, Clone, Default)]
pub struct Context {
    /// Request-scoped data.
    pub data: HashMap<String, serde_json::Value>,
}

impl Context {
    /// Creates a new context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a value in the context.
    pub fn set<T: Serialize>(&mut self, key: impl Into<String>, value: T) {
        if let Ok(v) = serde_json::to_value(value) {
            self.data.insert(key.into(), v);
        }
    }

    /// Sets a value and returns the context.
    pub fn with<T: Serialize>(mut self, key: impl Into<String>, value: T) -> Self {
        self.set(key, value);
        self
    }

    /// Gets a value from the context.
    pub fn get<T: for<'de> Deserialize<'de>>(&self, key: &str) -> Option<T> {
        self.data
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

/// A GraphQL response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// The data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    /// The errors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<FieldError>>,
}

impl Response {
    /// Creates a successful response with data.
    pub fn data(data: serde_json::Value) -> Self {
        Self {
            data: Some(data),
            errors: None,
        }
    }

    /// Creates an error response.
    pub fn error(error: FieldError) -> Self {
        Self::errors(vec![error])
    }

    /// Creates an error response with multiple errors.
    pub fn errors(errors: Vec<FieldError>) -> Self {
        Self {
            data: None,
            errors: Some(errors),
        }
    }

    /// Returns true if the response has errors.
    pub fn has_errors(&self) -> bool {
        self.errors.as_ref().is_some_and(|e| !e.is_empty())
    }

    /// Returns true if the response has data.
    pub fn has_data(&self) -> bool {
        self.data.as_ref().is_some_and(|d| !d.is_null())
    }
}

/// A field error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldError {
    /// The error message.
    pub message: String,
    /// The path to the field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<PathSegment>>,
    /// Error extensions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<HashMap<String, serde_json::Value>>,
}

/// A path segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    Field(String),
    Index(usize),
}

impl From<&str> for PathSegment {
    fn from(key: &str) -> Self {
        Self::Field(key.to_string())
    }
}

impl From<usize> for PathSegment {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

impl FieldError {
    /// Creates a new field error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            path: None,
            extensions: None,
        }
    }

    /// Adds a path to the error.
    pub fn with_path(mut self, path: Vec<PathSegment>) -> Self {
        self.path = Some(path);
        self
    }

    /// Adds an extension.
    pub fn with_extension(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extensions
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value);
        self
    }

    /// Sets the error code extension.
    pub fn with_code(self, code: impl Into<String>) -> Self {
        self.with_extension("code", serde_json::Value::String(code.into()))
    }

    /// Returns the error code extension, if any.
    pub fn code(&self) -> Option<&str> {
        self.extensions
            .as_ref()
            .and_then(|ext| ext.get("code"))
            .and_then(serde_json::Value::as_str)
    }

    /// Encodes the error as a value that completes as this error when resolved.
    ///
    /// The path is not encoded; it is assigned where the value is completed.
    pub fn embed(&self) -> Value {
        let mut inner = Map::new();
        inner.insert("message".to_string(), Value::String(self.message.clone()));
        if let Some(extensions) = &self.extensions {
            let extensions = extensions
                .iter()
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect();
            inner.insert("extensions".to_string(), Value::Object(extensions));
        }
        let mut outer = Map::new();
        outer.insert(EMBEDDED_ERROR_KEY.to_string(), Value::Object(inner));
        Value::Object(outer)
    }

    /// Decodes a value produced by [`FieldError::embed`].
    pub fn from_embedded(value: &Value) -> Option<Self> {
        let outer = value.as_object().filter(|obj| obj.len() == 1)?;
        let inner = outer.get(EMBEDDED_ERROR_KEY)?.as_object()?;
        let message = inner.get("message")?.as_str()?;
        let extensions = inner.get("extensions").and_then(Value::as_object).map(|ext| {
            ext.iter()
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect()
        });
        Some(Self {
            message: message.to_string(),
            path: None,
            extensions,
        })
    }
}

/// Key of the object produced by [`FieldError::embed`].
const EMBEDDED_ERROR_KEY: &str = "__fieldError";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::FnTypeResolver;
    use crate::schema::{InputValueDef, InterfaceDef, ObjectDef, SchemaBuilder, UnionDef};
    use serde_json::json;

    fn test_schema() -> Schema {
        SchemaBuilder::new()
            .query_type("Query")
            .interface(
                InterfaceDef::new("Node").with_field(FieldDef::new("id", TypeRef::required("ID"))),
            )
            .object(
                ObjectDef::new("User")
                    .implements("Node")
                    .with_field(FieldDef::new("id", TypeRef::required("ID")))
                    .with_field(FieldDef::new("name", TypeRef::named("String")))
                    .with_field(FieldDef::new(
                        "friends",
                        TypeRef::list(TypeRef::required("User")),
                    )),
            )
            .object(
                ObjectDef::new("Post").with_field(FieldDef::new("title", TypeRef::named("String"))),
            )
            .union(UnionDef::new("SearchResult", ["User", "Post"]))
            .object(
                ObjectDef::new("Query")
                    .with_field(
                        FieldDef::new("user", TypeRef::named("User")).with_argument(
                            InputValueDef::new("id", TypeRef::named("ID"))
                                .with_default(json!("1")),
                        ),
                    )
                    .with_field(
                        FieldDef::new("node", TypeRef::named("Node"))
                            .with_argument(InputValueDef::new("id", TypeRef::required("ID"))),
                    )
                    .with_field(FieldDef::new(
                        "search",
                        TypeRef::list(TypeRef::named("SearchResult")),
                    ))
                    .with_field(FieldDef::new("required", TypeRef::required("String")))
                    .with_field(FieldDef::new("failing", TypeRef::named("String"))),
            )
            .build()
    }

    fn test_executor() -> Executor {
        let mut resolvers = ResolverMap::new();
        resolvers.register_fn("Query", "user", |_, args, _, _| {
            let id: String = args.require("id")?;
            Ok(json!({"id": id, "name": format!("User {id}"), "friends": [{"id": "2", "name": "Bob"}]}))
        });
        resolvers.register_fn("Query", "node", |_, args, _, _| {
            let id: String = args.require("id")?;
            Ok(json!({"kind": "User", "id": id}))
        });
        resolvers.register_fn("Query", "search", |_, _, _, _| {
            Ok(json!([
                {"__typename": "User", "id": "1", "name": "Alice"},
                {"__typename": "Post", "title": "Hello"}
            ]))
        });
        resolvers.register_fn("Query", "required", |_, _, _, _| Ok(Value::Null));
        resolvers.register_fn("Query", "failing", |_, _, _, _| {
            Err(crate::ResolverError::Custom("nope".into()))
        });
        resolvers.register_type_resolver(
            "Node",
            FnTypeResolver(|value: &Value, _: &Context, _: &ResolverInfo| {
                value.get("kind").and_then(Value::as_str).map(str::to_string)
            }),
        );
        Executor::new(test_schema(), resolvers)
    }

    async fn run(source: &str) -> Response {
        test_executor().execute(Request::parse(source).unwrap()).await
    }

    #[tokio::test]
    async fn test_execute_nested_fields() {
        let response = run("{ user(id: \"7\") { id name friends { name } } }").await;
        assert!(!response.has_errors());
        assert_eq!(
            response.data,
            Some(json!({"user": {"id": "7", "name": "User 7", "friends": [{"name": "Bob"}]}}))
        );
    }

    #[tokio::test]
    async fn test_argument_defaults_and_aliases() {
        let response = run("{ first: user { id } second: user(id: \"2\") { id } }").await;
        assert_eq!(
            response.data,
            Some(json!({"first": {"id": "1"}, "second": {"id": "2"}}))
        );
    }

    #[tokio::test]
    async fn test_variables_and_directives() {
        let request = Request::parse(
            "query Q($id: ID!, $withName: Boolean = false) { user(id: $id) { id name @include(if: $withName) } }",
        )
        .unwrap()
        .with_variable("id", json!("3"));
        let response = test_executor().execute(request).await;
        assert_eq!(response.data, Some(json!({"user": {"id": "3"}})));
    }

    #[tokio::test]
    async fn test_missing_required_variable() {
        let response = run("query Q($id: ID!) { node(id: $id) { id } }").await;
        assert!(response.data.is_none());
        assert!(response.errors.unwrap()[0].message.contains("$id"));
    }

    #[tokio::test]
    async fn test_fragments_and_type_conditions() {
        let response = run(
            "{ search { __typename ...UserFields ... on Post { title } } }
             fragment UserFields on User { name }",
        )
        .await;
        assert_eq!(
            response.data,
            Some(json!({"search": [
                {"__typename": "User", "name": "Alice"},
                {"__typename": "Post", "title": "Hello"}
            ]}))
        );
    }

    #[tokio::test]
    async fn test_interface_uses_type_resolver() {
        let response = run("{ node(id: \"5\") { id ... on User { __typename } } }").await;
        assert_eq!(
            response.data,
            Some(json!({"node": {"id": "5", "__typename": "User"}}))
        );
    }

    #[tokio::test]
    async fn test_errors_carry_paths() {
        let response = run("{ failing required }").await;
        assert_eq!(response.data, Some(json!({"failing": null, "required": null})));
        let errors = response.errors.unwrap();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].message, "nope");
        assert_eq!(errors[0].path, Some(vec![PathSegment::from("failing")]));
        assert_eq!(errors[1].path, Some(vec![PathSegment::from("required")]));
    }

    #[tokio::test]
    async fn test_unknown_operation() {
        let request = Request::parse("query A { required } query B { required }").unwrap();
        let response = test_executor().execute(request).await;
        assert!(response.errors.unwrap()[0].message.contains("operation name"));

        let request = Request::parse("query A { failing } query B { failing }")
            .unwrap()
            .with_operation_name("B");
        let response = test_executor().execute(request).await;
        assert_eq!(response.data, Some(json!({"failing": null})));
    }

    #[tokio::test]
    async fn test_embedded_errors_complete_as_field_errors() {
        let mut resolvers = ResolverMap::new();
        resolvers.register_fn("Query", "search", |_, _, _, _| {
            let error = FieldError::new("hidden").with_code("HIDDEN");
            Ok(json!([{"__typename": "Post", "title": "ok"}, error.embed()]))
        });
        let executor = Executor::new(test_schema(), resolvers);
        let response = executor
            .execute(Request::parse("{ search { ... on Post { title } } }").unwrap())
            .await;
        assert_eq!(response.data, Some(json!({"search": [{"title": "ok"}, null]})));
        let errors = response.errors.unwrap();
        assert_eq!(errors[0].message, "hidden");
        assert_eq!(errors[0].code(), Some("HIDDEN"));
        assert_eq!(
            errors[0].path,
            Some(vec![PathSegment::from("search"), PathSegment::from(1)])
        );
    }

    #[test]
    fn test_embed_roundtrip_drops_path() {
        let error = FieldError::new("boom")
            .with_path(vec![PathSegment::from("a")])
            .with_extension("retry", json!(false));
        let decoded = FieldError::from_embedded(&error.embed()).unwrap();
        assert_eq!(decoded.message, "boom");
        assert_eq!(decoded.path, None);
        assert_eq!(decoded.extensions.unwrap()["retry"], json!(false));
        assert!(FieldError::from_embedded(&json!({"message": "boom"})).is_none());
    }

    #[test]
    fn test_response_serialization() {
        let response = Response {
            data: Some(json!({"a": 1})),
            errors: Some(vec![FieldError::new("bad")
                .with_path(vec![PathSegment::from("a"), PathSegment::from(0)])
                .with_code("BAD")]),
        };
        let text = serde_json::to_string(&response).unwrap();
        let back: Response = serde_json::from_str(&text).unwrap();
        assert_eq!(back, response);
        assert_eq!(back.errors.unwrap()[0].code(), Some("BAD"));
    }
}
