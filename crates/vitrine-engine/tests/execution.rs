use std::sync::{Arc, Mutex};

use serde_json::json;
use vitrine_engine::{
    registry::{
        resolvers::{BoxResolverFuture, CustomResolver, ResolvedValue, Resolver, ResolverArguments, ResolverContext},
        InterfaceType, MetaField, MetaInputValue, MetaType, ObjectType, Registry,
    },
    ConstValue, Error, PathSegment, Request, Schema, Variables,
};

/// Execution order log, injected through schema data.
#[derive(Default)]
struct Log(Mutex<Vec<&'static str>>);

fn resolve_artworks<'a>(
    _ctx: ResolverContext<'a>,
    _args: ResolverArguments,
    _parent: Option<ResolvedValue>,
) -> BoxResolverFuture<'a> {
    Box::pin(async move {
        Ok(ResolvedValue::new(json!([
            {"id": "rat", "title": "Rat"},
            {"id": "girl", "title": "Girl With Balloon"},
        ])))
    })
}

fn resolve_artwork<'a>(
    _ctx: ResolverContext<'a>,
    args: ResolverArguments,
    _parent: Option<ResolvedValue>,
) -> BoxResolverFuture<'a> {
    Box::pin(async move {
        let id = match args.get("id") {
            Some(ConstValue::String(id)) => id.clone(),
            _ => return Err(Error::new("artwork requires an id")),
        };
        Ok(ResolvedValue::new(json!({"id": id, "title": "Rat"})))
    })
}

fn resolve_untitled<'a>(
    _ctx: ResolverContext<'a>,
    _args: ResolverArguments,
    _parent: Option<ResolvedValue>,
) -> BoxResolverFuture<'a> {
    Box::pin(async move { Ok(ResolvedValue::new(json!([{"id": "rat"}]))) })
}

fn resolve_entity<'a>(
    _ctx: ResolverContext<'a>,
    _args: ResolverArguments,
    _parent: Option<ResolvedValue>,
) -> BoxResolverFuture<'a> {
    Box::pin(async move {
        Ok(ResolvedValue::new(json!({
            "__typename": "Artist",
            "id": "kusama",
            "name": "Yayoi Kusama",
        })))
    })
}

fn record_first<'a>(
    ctx: ResolverContext<'a>,
    _args: ResolverArguments,
    _parent: Option<ResolvedValue>,
) -> BoxResolverFuture<'a> {
    Box::pin(async move {
        let log = ctx.data::<Arc<Log>>()?;
        log.0.lock().unwrap().push("first:start");
        tokio::task::yield_now().await;
        log.0.lock().unwrap().push("first:end");
        Ok(ResolvedValue::new(json!({"ok": true})))
    })
}

fn record_second<'a>(
    ctx: ResolverContext<'a>,
    _args: ResolverArguments,
    _parent: Option<ResolvedValue>,
) -> BoxResolverFuture<'a> {
    Box::pin(async move {
        let log = ctx.data::<Arc<Log>>()?;
        log.0.lock().unwrap().push("second:start");
        tokio::task::yield_now().await;
        log.0.lock().unwrap().push("second:end");
        Ok(ResolvedValue::new(json!({"ok": true})))
    })
}

fn test_registry() -> Registry {
    let mut registry = Registry::new();
    registry.insert_type(MetaType::Object(ObjectType::new(
        "Artwork",
        [MetaField::new("id", "ID!"), MetaField::new("title", "String!")],
    )));
    registry.insert_type(MetaType::Object(ObjectType::new(
        "Artist",
        [MetaField::new("id", "ID!"), MetaField::new("name", "String")],
    )));
    registry.insert_type(MetaType::Interface(
        InterfaceType::new("Entity", [MetaField::new("id", "ID!")])
            .with_possible_types(["Artist".to_string(), "Artwork".to_string()]),
    ));
    registry.insert_type(MetaType::Object(ObjectType::new(
        "Payload",
        [MetaField::new("ok", "Boolean!")],
    )));
    registry.insert_type(MetaType::Object(ObjectType::new(
        "Query",
        [
            MetaField::new("artworks", "[Artwork]").with_resolver(CustomResolver::new("artworks", resolve_artworks)),
            MetaField::new("artwork", "Artwork")
                .with_argument(MetaInputValue::new("id", "ID!"))
                .with_resolver(CustomResolver::new("artwork", resolve_artwork)),
            MetaField::new("untitled", "[Artwork]").with_resolver(CustomResolver::new("untitled", resolve_untitled)),
            MetaField::new("entity", "Entity").with_resolver(CustomResolver::new("entity", resolve_entity)),
            MetaField::new("first", "Payload").with_resolver(CustomResolver::new("first", record_first)),
            MetaField::new("second", "Payload").with_resolver(CustomResolver::new("second", record_second)),
        ],
    )));
    registry.insert_type(MetaType::Object(ObjectType::new(
        "Mutation",
        [
            MetaField::new("first", "Payload").with_resolver(CustomResolver::new("first", record_first)),
            MetaField::new("second", "Payload").with_resolver(CustomResolver::new("second", record_second)),
        ],
    )));
    registry.mutation_type = Some("Mutation".to_string());
    registry
}

#[tokio::test]
async fn resolves_fields_and_aliases() {
    let response = Schema::new(test_registry())
        .execute("{ works: artworks { id title } }")
        .await;

    assert!(response.errors.is_empty(), "{:?}", response.errors);
    assert_eq!(
        response.data,
        json!({"works": [
            {"id": "rat", "title": "Rat"},
            {"id": "girl", "title": "Girl With Balloon"},
        ]})
    );
}

#[tokio::test]
async fn substitutes_variables() {
    let request = Request::new("query($id: ID!) { artwork(id: $id) { id } }")
        .variables(Variables::from_json(json!({"id": "girl"})));
    let response = Schema::new(test_registry()).execute(request).await;

    assert!(response.errors.is_empty(), "{:?}", response.errors);
    assert_eq!(response.data, json!({"artwork": {"id": "girl"}}));
}

#[tokio::test]
async fn duplicate_selections_merge_deeply() {
    let response = Schema::new(test_registry())
        .execute(r#"{ artwork(id: "rat") { id } artwork(id: "rat") { title } }"#)
        .await;

    assert!(response.errors.is_empty(), "{:?}", response.errors);
    assert_eq!(response.data, json!({"artwork": {"id": "rat", "title": "Rat"}}));
}

#[tokio::test]
async fn null_bubbles_to_the_nearest_nullable_ancestor() {
    // `title` is non-null and missing upstream, so the list item nulls out
    let response = Schema::new(test_registry()).execute("{ untitled { id title } }").await;

    assert_eq!(response.data, json!({"untitled": [null]}));
    assert_eq!(response.errors.len(), 1);
    assert_eq!(
        response.errors[0].path,
        vec![
            PathSegment::Field("untitled".to_string()),
            PathSegment::Index(0),
            PathSegment::Field("title".to_string()),
        ]
    );
}

#[tokio::test]
async fn interface_fragments_use_the_payload_typename() {
    let response = Schema::new(test_registry())
        .execute("{ entity { id __typename ... on Artist { name } ... on Artwork { title } } }")
        .await;

    assert!(response.errors.is_empty(), "{:?}", response.errors);
    assert_eq!(
        response.data,
        json!({"entity": {"id": "kusama", "__typename": "Artist", "name": "Yayoi Kusama"}})
    );
}

#[tokio::test]
async fn named_fragments_are_resolved() {
    let response = Schema::new(test_registry())
        .execute("{ artworks { ...Work } } fragment Work on Artwork { id title }")
        .await;

    assert!(response.errors.is_empty(), "{:?}", response.errors);
    assert_eq!(response.data["artworks"][0], json!({"id": "rat", "title": "Rat"}));
}

#[tokio::test]
async fn skip_and_include_prune_selections_before_execution() {
    let request = Request::new(
        "query($detailed: Boolean!) { artworks { id title @skip(if: true) } entity @include(if: $detailed) { id } }",
    )
    .variables(Variables::from_json(json!({"detailed": false})));
    let response = Schema::new(test_registry()).execute(request).await;

    assert!(response.errors.is_empty(), "{:?}", response.errors);
    assert_eq!(
        response.data,
        json!({"artworks": [{"id": "rat"}, {"id": "girl"}]})
    );
}

#[tokio::test]
async fn query_root_fields_run_concurrently() {
    let log = Arc::new(Log::default());
    let schema = Schema::build(test_registry()).data(Arc::clone(&log)).finish();

    // resolvers find the log through schema data, no request data needed
    let response = schema.execute("{ first { ok } second { ok } }").await;

    assert!(response.errors.is_empty(), "{:?}", response.errors);
    let entries = log.0.lock().unwrap().clone();
    assert_eq!(entries, vec!["first:start", "second:start", "first:end", "second:end"]);
}

#[tokio::test]
async fn mutation_root_fields_run_serially() {
    let log = Arc::new(Log::default());
    let schema = Schema::new(test_registry());

    let response = schema
        .execute(Request::new("mutation { first { ok } second { ok } }").data(Arc::clone(&log)))
        .await;

    assert!(response.errors.is_empty(), "{:?}", response.errors);
    let entries = log.0.lock().unwrap().clone();
    assert_eq!(entries, vec!["first:start", "first:end", "second:start", "second:end"]);
}

#[tokio::test]
async fn unknown_fields_are_errors() {
    let response = Schema::new(test_registry()).execute("{ nope }").await;

    assert_eq!(response.data, serde_json::Value::Null);
    assert_eq!(response.errors.len(), 1);
    assert!(response.errors[0].message.contains("nope"), "{:?}", response.errors);
}

#[tokio::test]
async fn responses_carry_a_normalized_trace_resource() {
    let response = Schema::new(test_registry())
        .execute(r#"{ artwork(id: "rat") { id } }"#)
        .await;

    let trace = response.extensions.trace.as_ref().unwrap();
    assert!(trace.resource.contains(r#"id: """#), "{}", trace.resource);
    assert!(!trace.resource.contains("rat"), "{}", trace.resource);
}

#[tokio::test]
async fn composite_resolvers_are_trace_decorated_once() {
    let schema = Schema::new(test_registry());
    let artwork = schema.registry().types.get("Query").unwrap().field("artwork").unwrap();
    assert!(matches!(&artwork.resolver, Resolver::Traced(inner) if !inner.is_traced()));

    // a second build pass over an already-decorated registry changes nothing
    let rebuilt = Schema::new(schema.registry().clone());
    let artwork = rebuilt.registry().types.get("Query").unwrap().field("artwork").unwrap();
    assert!(matches!(&artwork.resolver, Resolver::Traced(inner) if !inner.is_traced()));
}
