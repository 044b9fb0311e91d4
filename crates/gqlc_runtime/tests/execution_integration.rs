//! Integration tests for query, mutation and subscription execution.

use futures::stream::{self, StreamExt};
use gqlc_runtime::{
    Context, EventStream, ExecutionScope, Executor, FieldDef, InputValueDef, ObjectDef, Request,
    ResolverArgs, ResolverError, ResolverInfo, ResolverMap, SchemaBuilder, SubscriptionFuture,
    SubscriptionResolver, TypeRef,
};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;

struct Ticks;

impl SubscriptionResolver for Ticks {
    fn subscribe<'a>(
        &'a self,
        args: &'a ResolverArgs,
        _ctx: &'a Context,
        _info: &'a ResolverInfo,
    ) -> SubscriptionFuture<'a> {
        Box::pin(async move {
            let count: u64 = args.require("count")?;
            let events: EventStream = stream::iter(0..count)
                .map(|n| {
                    if n == 1 {
                        Err(ResolverError::Custom("tick failed".into()))
                    } else {
                        Ok(json!({"tick": n}))
                    }
                })
                .boxed();
            Ok(events)
        })
    }
}

fn executor(log: Arc<Mutex<Vec<String>>>) -> Executor {
    let schema = SchemaBuilder::new()
        .query_type("Query")
        .mutation_type("Mutation")
        .subscription_type("Subscription")
        .object(ObjectDef::new("Query").with_field(FieldDef::new("scope", TypeRef::required("Int"))))
        .object(
            ObjectDef::new("Mutation")
                .with_field(FieldDef::new("slow", TypeRef::named("String")))
                .with_field(FieldDef::new("fast", TypeRef::named("String"))),
        )
        .object(
            ObjectDef::new("Subscription").with_field(
                FieldDef::new("tick", TypeRef::named("Int"))
                    .with_argument(InputValueDef::new("count", TypeRef::required("Int"))),
            ),
        )
        .build();

    let mut resolvers = ResolverMap::new();
    resolvers.register_fn("Query", "scope", |_, _, _, info| {
        Ok(json!(info.scope.id()))
    });
    let slow_log = Arc::clone(&log);
    resolvers.register_async("Mutation", "slow", move |_, _, _, _| {
        let log = Arc::clone(&slow_log);
        async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            log.lock().unwrap().push("slow".to_string());
            Ok(json!("slow"))
        }
    });
    resolvers.register_async("Mutation", "fast", move |_, _, _, _| {
        let log = Arc::clone(&log);
        async move {
            log.lock().unwrap().push("fast".to_string());
            Ok(json!("fast"))
        }
    });
    resolvers.register_subscription("Subscription", "tick", Ticks);
    Executor::new(schema, resolvers)
}

#[tokio::test(start_paused = true)]
async fn test_mutation_fields_run_in_order() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let executor = executor(Arc::clone(&log));
    let response = executor
        .execute(Request::parse("mutation { slow fast }").unwrap())
        .await;
    assert_eq!(response.data, Some(json!({"slow": "slow", "fast": "fast"})));
    assert_eq!(*log.lock().unwrap(), vec!["slow", "fast"]);
}

#[tokio::test]
async fn test_every_execution_gets_a_fresh_scope() {
    let executor = executor(Arc::default());
    let first = executor
        .execute(Request::parse("{ a: scope b: scope }").unwrap())
        .await
        .data
        .unwrap();
    let second = executor
        .execute(Request::parse("{ a: scope }").unwrap())
        .await
        .data
        .unwrap();
    assert_eq!(first["a"], first["b"]);
    assert_ne!(first["a"], second["a"]);
    assert!(second["a"].as_u64().unwrap() < ExecutionScope::new().id());
}

#[tokio::test]
async fn test_subscription_events_become_root_values() {
    let executor = executor(Arc::default());
    let request = Request::parse("subscription { tick(count: 3) }").unwrap();
    let responses: Vec<_> = executor
        .subscribe(request)
        .await
        .unwrap()
        .collect()
        .await;

    assert_eq!(responses.len(), 3);
    assert_eq!(responses[0].data, Some(json!({"tick": 0})));
    assert!(responses[1].data.is_none());
    assert_eq!(responses[1].errors.as_ref().unwrap()[0].message, "tick failed");
    assert_eq!(responses[2].data, Some(json!({"tick": 2})));
}

#[tokio::test]
async fn test_subscribe_rejects_queries_and_missing_arguments() {
    let executor = executor(Arc::default());

    let Err(response) = executor.subscribe(Request::parse("{ scope }").unwrap()).await else {
        panic!("query accepted as subscription");
    };
    assert!(response.has_errors());

    let Err(response) = executor
        .subscribe(Request::parse("subscription { tick }").unwrap())
        .await
    else {
        panic!("missing argument accepted");
    };
    let error = &response.errors.unwrap()[0];
    assert!(error.message.contains("count"));
    assert_eq!(error.path, Some(vec!["tick".into()]));
}

#[tokio::test]
async fn test_execute_rejects_subscriptions() {
    let executor = executor(Arc::default());
    let response = executor
        .execute(Request::parse("subscription { tick(count: 1) }").unwrap())
        .await;
    assert!(response.data.is_none());
    assert!(response.errors.unwrap()[0].message.contains("subscribe"));
}
