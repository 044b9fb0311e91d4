//! Shared schema for the continuation integration tests.
//!
//! `Query.remoteStats` and `User.remoteProfile` sleep for `simulateDelay`
//! milliseconds and count their invocations.

#![allow(dead_code)]

use gqlc_continuations::{add_continuations_to_schema, ContinuationConfig};
use gqlc_runtime::{
    Context, Executor, FieldDef, InputValueDef, InterfaceDef, ObjectDef, Request, ResolverError,
    ResolverMap, Response, Schema, SchemaBuilder, TypeRef,
};
use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub struct Fixture {
    pub executor: Executor,
    pub stats_calls: Arc<AtomicUsize>,
    pub profile_calls: Arc<AtomicUsize>,
}

impl Fixture {
    pub fn new(config: ContinuationConfig) -> Self {
        let stats_calls = Arc::new(AtomicUsize::new(0));
        let profile_calls = Arc::new(AtomicUsize::new(0));
        let resolvers = resolvers(Arc::clone(&stats_calls), Arc::clone(&profile_calls));
        let executor = add_continuations_to_schema(schema(), resolvers, config)
            .expect("fixture schema accepts continuations")
            .executor();
        Self {
            executor,
            stats_calls,
            profile_calls,
        }
    }

    pub async fn run(&self, query: &str, variables: Value) -> Response {
        self.run_with_context(query, variables, Context::new()).await
    }

    pub async fn run_with_context(&self, query: &str, variables: Value, ctx: Context) -> Response {
        self.executor.execute(request(query, variables, ctx)).await
    }

    pub fn stats_calls(&self) -> usize {
        self.stats_calls.load(Ordering::SeqCst)
    }

    pub fn profile_calls(&self) -> usize {
        self.profile_calls.load(Ordering::SeqCst)
    }
}

pub fn request(query: &str, variables: Value, ctx: Context) -> Request {
    let variables = match variables {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    Request::parse(query)
        .expect("test query parses")
        .with_variables(variables)
        .with_context(ctx)
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Asserts a response has no errors and returns its data.
pub fn data(response: Response) -> Value {
    assert!(response.errors.is_none(), "unexpected errors: {:?}", response.errors);
    response.data.expect("response has data")
}

pub fn continuation_id(value: &Value) -> String {
    assert_eq!(value["__typename"], "Continuation", "not a token: {value}");
    value["continuationId"]
        .as_str()
        .expect("token carries an id")
        .to_string()
}

fn user(id: u64) -> Value {
    json!({"__typename": "User", "id": id, "name": "Example User"})
}

fn delay(args: &gqlc_runtime::ResolverArgs) -> Duration {
    Duration::from_millis(args.get_as::<u64>("simulateDelay").unwrap_or_default())
}

pub fn schema() -> Schema {
    let id = || FieldDef::new("id", TypeRef::required("ID"));
    let error_field = || FieldDef::new("errorField", TypeRef::named("String"));
    let test_arg = || {
        FieldDef::new("testArg", TypeRef::named("Int"))
            .with_argument(InputValueDef::new("testArg", TypeRef::required("Int")))
    };
    let simulate_delay =
        |ms: u64| InputValueDef::new("simulateDelay", TypeRef::named("Int")).with_default(json!(ms));

    SchemaBuilder::new()
        .query_type("Query")
        .interface(InterfaceDef::new("Node").with_field(id()))
        .object(
            ObjectDef::new("UserRemoteProfile")
                .with_field(FieldDef::new("data", TypeRef::named("String")))
                .with_field(error_field())
                .with_field(test_arg()),
        )
        .object(
            ObjectDef::new("User")
                .implements("Node")
                .with_field(id())
                .with_field(FieldDef::new("name", TypeRef::named("String")))
                .with_field(
                    FieldDef::new("remoteProfile", TypeRef::named("UserRemoteProfile"))
                        .with_argument(simulate_delay(2000)),
                )
                .with_field(FieldDef::new(
                    "friends",
                    TypeRef::list(TypeRef::named("User")),
                )),
        )
        .object(
            ObjectDef::new("RemoteStats")
                .with_field(FieldDef::new("data", TypeRef::named("String")))
                .with_field(test_arg())
                .with_field(error_field()),
        )
        .object(
            ObjectDef::new("Query")
                .with_field(
                    FieldDef::new("node", TypeRef::named("Node"))
                        .with_argument(InputValueDef::new("id", TypeRef::required("ID"))),
                )
                .with_field(FieldDef::new("viewer", TypeRef::named("User")))
                .with_field(FieldDef::new("userList", TypeRef::list(TypeRef::named("User"))))
                .with_field(
                    FieldDef::new("remoteStats", TypeRef::named("RemoteStats"))
                        .with_argument(simulate_delay(100)),
                ),
        )
        .build()
}

pub fn resolvers(stats_calls: Arc<AtomicUsize>, profile_calls: Arc<AtomicUsize>) -> ResolverMap {
    let mut resolvers = ResolverMap::new();

    resolvers.register_fn("User", "id", |parent, _, _, info| {
        Ok(json!(format!("{}:{}", info.parent_type, parent["id"])))
    });
    resolvers.register_fn("Query", "viewer", |_, _, _, _| Ok(user(1)));
    resolvers.register_fn("Query", "userList", |_, _, _, _| {
        Ok((0..10).map(user).collect())
    });
    resolvers.register_fn("User", "friends", |parent, _, _, _| {
        let id = parent["id"].as_u64().unwrap_or_default();
        Ok(json!([user(id + 1), user(id + 2)]))
    });
    resolvers.register_fn("Query", "node", |_, args, _, _| {
        let global_id: String = args.require("id")?;
        match global_id.split_once(':') {
            Some(("User", id)) => {
                let id = id
                    .parse()
                    .map_err(|_| ResolverError::Custom(format!("bad user id {id}")))?;
                Ok(user(id))
            }
            _ => Ok(Value::Null),
        }
    });
    resolvers.register_async("Query", "remoteStats", move |_, args, _, _| {
        stats_calls.fetch_add(1, Ordering::SeqCst);
        async move {
            tokio::time::sleep(delay(&args)).await;
            Ok(json!({"data": "Remote Stats Data!"}))
        }
    });
    resolvers.register_async("User", "remoteProfile", move |_, args, _, _| {
        profile_calls.fetch_add(1, Ordering::SeqCst);
        async move {
            tokio::time::sleep(delay(&args)).await;
            Ok(json!({"data": "Remote Profile Data!"}))
        }
    });
    for type_name in ["RemoteStats", "UserRemoteProfile"] {
        resolvers.register_fn(type_name, "errorField", |_, _, _, _| {
            Err(ResolverError::Custom("Error Field Test".into()))
        });
        resolvers.register_fn(type_name, "testArg", |_, args, _, _| {
            Ok(json!(args.require::<i64>("testArg")?))
        });
    }
    resolvers
}
