//! Adds continuation types, fields and resolvers to a schema.

use crate::config::{ContinuationConfig, ContinuationFieldOptions, WrapNodes};
use crate::error::ConfigError;
use crate::guard::{GuardedResolver, GuardedTypeResolver};
use crate::resolver::{
    ContinuationFieldResolver, ContinuationSubscription, ResolveContinuationResolver,
    ResolvedEventResolver, SubscribedValueResolver,
};
use crate::subquery::NodeWrap;
use crate::token::CONTINUATION_TYPE;
use gqlc_runtime::{
    Executor, FieldDef, InputValueDef, ObjectDef, ResolverMap, Schema, TypeDef, TypeRef, UnionDef,
};
use serde_json::json;
use std::sync::Arc;

pub const ALL_CONTINUATION_TYPES: &str = "AllContinuationTypes";
pub const RESOLVED_EVENT_TYPE: &str = "ContinuationResolvedEvent";
const NODE_INTERFACE: &str = "Node";

/// An augmented schema with its decorated resolvers.
#[derive(Debug)]
pub struct ContinuationSchema {
    pub schema: Schema,
    pub resolvers: ResolverMap,
}

impl ContinuationSchema {
    pub fn executor(self) -> Executor {
        Executor::new(self.schema, self.resolvers)
    }
}

/// A type that gets a `continuation` field.
struct Bearer {
    type_name: String,
    node: Option<NodeWrap>,
    wait_ms: u64,
    nullable: bool,
}

/// Adds continuations to `schema`.
///
/// The root query type and every identity-addressable `Node` implementation
/// get a `continuation(waitMs: Int)` field, and the query type gets
/// `resolveContinuation`. Every existing resolver is wrapped so it is not
/// run again beneath a settled continuation.
pub fn add_continuations_to_schema(
    mut schema: Schema,
    resolvers: ResolverMap,
    config: ContinuationConfig,
) -> Result<ContinuationSchema, ConfigError> {
    let default_wait_ms = validate_wait("the default", config.default_wait_ms)?;
    for type_name in config.type_config.keys() {
        if schema.object(type_name).is_none() {
            return Err(ConfigError::UnknownType(type_name.clone()));
        }
    }
    let query_type = schema
        .query_type
        .clone()
        .filter(|name| schema.object(name).is_some())
        .ok_or(ConfigError::MissingQueryType)?;
    if schema.get_type(CONTINUATION_TYPE).is_some() {
        return Err(ConfigError::TypeConflict(CONTINUATION_TYPE.to_string()));
    }

    let mut bearers = Vec::new();
    if let Some(options) = config.field_options(&query_type) {
        bearers.push(bearer(&query_type, None, &options, default_wait_ms)?);
    }
    for (type_name, node) in node_types(&schema, &config, &query_type)? {
        if let Some(options) = config.field_options(&type_name) {
            bearers.push(bearer(&type_name, Some(node), &options, default_wait_ms)?);
        }
    }

    schema.add_type(TypeDef::Object(
        ObjectDef::new(CONTINUATION_TYPE)
            .with_field(FieldDef::new("continuationId", TypeRef::required("String"))),
    ));
    for bearer in &bearers {
        let union_name = format!("{}Continuation", bearer.type_name);
        add_union(&mut schema, &union_name, [CONTINUATION_TYPE, bearer.type_name.as_str()])?;
        let ty = if bearer.nullable {
            TypeRef::named(union_name)
        } else {
            TypeRef::required(union_name)
        };
        let field = FieldDef::new("continuation", ty).with_argument(
            InputValueDef::new("waitMs", TypeRef::named("Int")).with_default(json!(bearer.wait_ms)),
        );
        add_field(&mut schema, &bearer.type_name, field)?;
    }

    let config = Arc::new(config);
    let mut resolvers = resolvers
        .wrap_all(|_, _, resolver| GuardedResolver::boxed(resolver))
        .wrap_default(GuardedResolver::boxed)
        .wrap_type_resolvers(|_, resolver| GuardedTypeResolver::boxed(resolver));

    if bearers.is_empty() {
        tracing::debug!("no type accepts continuations");
        return Ok(ContinuationSchema { schema, resolvers });
    }

    add_union(
        &mut schema,
        ALL_CONTINUATION_TYPES,
        bearers.iter().map(|b| b.type_name.as_str()),
    )?;
    add_field(
        &mut schema,
        &query_type,
        FieldDef::new("resolveContinuation", TypeRef::named(ALL_CONTINUATION_TYPES))
            .with_argument(InputValueDef::new("continuationId", TypeRef::required("String"))),
    )?;
    resolvers.register(
        query_type.as_str(),
        "resolveContinuation",
        ResolveContinuationResolver::new(Arc::clone(&config)),
    );

    if config.add_subscription_field {
        let subscription_type = add_subscription_fields(&mut schema)?;
        resolvers.register_subscription(
            subscription_type.as_str(),
            "subscribeContinuation",
            ContinuationSubscription::single(Arc::clone(&config)),
        );
        resolvers.register(
            subscription_type.as_str(),
            "subscribeContinuation",
            SubscribedValueResolver,
        );
        resolvers.register_subscription(
            subscription_type.as_str(),
            "subscribeContinuationList",
            ContinuationSubscription::list(Arc::clone(&config)),
        );
        resolvers.register(
            subscription_type.as_str(),
            "subscribeContinuationList",
            ResolvedEventResolver,
        );
    }

    let names: Vec<&str> = bearers.iter().map(|b| b.type_name.as_str()).collect();
    tracing::debug!(types = ?names, "added continuation fields");
    for bearer in bearers {
        resolvers.register(
            bearer.type_name,
            "continuation",
            ContinuationFieldResolver::new(Arc::clone(&config), bearer.node, bearer.wait_ms),
        );
    }

    Ok(ContinuationSchema { schema, resolvers })
}

fn validate_wait(scope: &str, wait_ms: i64) -> Result<u64, ConfigError> {
    u64::try_from(wait_ms).map_err(|_| ConfigError::InvalidWaitMs {
        scope: scope.to_string(),
        value: wait_ms,
    })
}

fn bearer(
    type_name: &str,
    node: Option<NodeWrap>,
    options: &ContinuationFieldOptions,
    default_wait_ms: u64,
) -> Result<Bearer, ConfigError> {
    let wait_ms = match options.wait_ms {
        Some(wait_ms) => validate_wait(type_name, wait_ms)?,
        None => default_wait_ms,
    };
    Ok(Bearer {
        type_name: type_name.to_string(),
        node,
        wait_ms,
        nullable: options.nullable,
    })
}

/// `Node` implementations whose subtrees can be re-entered from the query root.
///
/// With [`WrapNodes::All`], implementations the lookup field cannot fetch are
/// skipped; types named in [`WrapNodes::Only`] must be fetchable.
fn node_types(
    schema: &Schema,
    config: &ContinuationConfig,
    query_type: &str,
) -> Result<Vec<(String, NodeWrap)>, ConfigError> {
    let requested: &[String] = match &config.wrap_nodes {
        WrapNodes::All => &[],
        WrapNodes::None => return Ok(Vec::new()),
        WrapNodes::Only(names) => names,
    };
    for name in requested {
        if schema.object(name).is_none() {
            return Err(ConfigError::UnknownType(name.clone()));
        }
        if !schema.implements(name, NODE_INTERFACE) {
            return Err(ConfigError::MissingIdentityField {
                type_name: name.clone(),
                reason: format!("it does not implement {NODE_INTERFACE}"),
            });
        }
    }
    if schema.interface(NODE_INTERFACE).is_none() {
        return Ok(Vec::new());
    }

    let mut types = Vec::new();
    for type_name in schema.implementations(NODE_INTERFACE) {
        let explicit = requested.iter().any(|name| name == type_name);
        if type_name == query_type || (!requested.is_empty() && !explicit) {
            continue;
        }
        let Some(options) = config.field_options(type_name) else {
            continue;
        };
        let lookup = options.lookup.unwrap_or_default();
        let argument_type = schema
            .field(query_type, &lookup.field)
            .and_then(|field| field.arguments.get(&lookup.argument))
            .map(|argument| argument.ty.clone());
        let Some(argument_type) = argument_type else {
            if explicit {
                return Err(ConfigError::MissingIdentityField {
                    type_name: type_name.to_string(),
                    reason: format!(
                        "{query_type}.{}({}:) is not defined",
                        lookup.field, lookup.argument
                    ),
                });
            }
            tracing::debug!(
                type_name,
                lookup = %lookup.field,
                "skipping node type without a lookup field"
            );
            continue;
        };
        if schema.field(type_name, &config.node_id_field).is_none() {
            return Err(ConfigError::MissingIdentityField {
                type_name: type_name.to_string(),
                reason: format!("it has no {} field", config.node_id_field),
            });
        }
        types.push((type_name.to_string(), NodeWrap::new(lookup, &argument_type)));
    }
    Ok(types)
}

fn add_union<'a>(
    schema: &mut Schema,
    name: &str,
    members: impl IntoIterator<Item = &'a str>,
) -> Result<(), ConfigError> {
    if schema.get_type(name).is_some() {
        return Err(ConfigError::TypeConflict(name.to_string()));
    }
    schema.add_type(TypeDef::Union(UnionDef::new(name, members)));
    Ok(())
}

fn add_field(schema: &mut Schema, type_name: &str, field: FieldDef) -> Result<(), ConfigError> {
    let object = schema
        .object_mut(type_name)
        .ok_or_else(|| ConfigError::UnknownType(type_name.to_string()))?;
    if object.fields.contains_key(&field.name) {
        return Err(ConfigError::FieldConflict {
            type_name: type_name.to_string(),
            field: field.name,
        });
    }
    object.fields.insert(field.name.clone(), field);
    Ok(())
}

/// Adds the subscription fields and returns the subscription root's name.
fn add_subscription_fields(schema: &mut Schema) -> Result<String, ConfigError> {
    if schema.get_type(RESOLVED_EVENT_TYPE).is_some() {
        return Err(ConfigError::TypeConflict(RESOLVED_EVENT_TYPE.to_string()));
    }
    schema.add_type(TypeDef::Object(
        ObjectDef::new(RESOLVED_EVENT_TYPE)
            .with_field(FieldDef::new("continuationId", TypeRef::required("String")))
            .with_field(FieldDef::new("value", TypeRef::named(ALL_CONTINUATION_TYPES))),
    ));

    let root = match schema.subscription_type.clone() {
        Some(name) => name,
        None => {
            let name = if schema.get_type("Subscription").is_some() {
                "SubscriptionSchemaType"
            } else {
                "Subscription"
            };
            if schema.get_type(name).is_some() {
                return Err(ConfigError::TypeConflict(name.to_string()));
            }
            schema.add_type(TypeDef::Object(ObjectDef::new(name)));
            schema.subscription_type = Some(name.to_string());
            name.to_string()
        }
    };

    add_field(
        schema,
        &root,
        FieldDef::new("subscribeContinuation", TypeRef::named(ALL_CONTINUATION_TYPES))
            .with_argument(InputValueDef::new("continuationId", TypeRef::required("String"))),
    )?;
    add_field(
        schema,
        &root,
        FieldDef::new("subscribeContinuationList", TypeRef::named(RESOLVED_EVENT_TYPE))
            .with_argument(InputValueDef::new(
                "continuationIds",
                TypeRef::non_null(TypeRef::list(TypeRef::required("String"))),
            )),
    )?;
    Ok(root)
}
