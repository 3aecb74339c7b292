//! The loader and the engine together: sibling fields resolved concurrently
//! by the engine coalesce into a single upstream flight.

use std::sync::{Arc, Mutex};

use serde_json::json;
use vitrine_engine::{
    registry::{
        resolvers::{BoxResolverFuture, CustomResolver, ResolvedValue, ResolverArguments, ResolverContext},
        MetaField, MetaInputValue, MetaType, ObjectType, Registry,
    },
    ConstValue, Error, Request, Schema,
};
use vitrine_gateway::{
    fetch::{FetchResult, Fetcher, FetcherInner},
    Credentials, RequestContext, TrackedEntityLoaderConfig,
};

type Calls = Arc<Mutex<Vec<(String, serde_json::Value)>>>;

struct FakeFetcher {
    calls: Calls,
    records: Vec<serde_json::Value>,
}

#[async_trait::async_trait]
impl FetcherInner for FakeFetcher {
    async fn fetch(&self, path: &str, params: &serde_json::Value) -> FetchResult<serde_json::Value> {
        self.calls.lock().unwrap().push((path.to_string(), params.clone()));
        Ok(serde_json::Value::Array(self.records.clone()))
    }
}

fn resolve_artwork<'a>(
    ctx: ResolverContext<'a>,
    args: ResolverArguments,
    _parent: Option<ResolvedValue>,
) -> BoxResolverFuture<'a> {
    Box::pin(async move {
        let request = ctx.data::<RequestContext>()?;
        let id = match args.get("id") {
            Some(ConstValue::String(id)) => id.clone(),
            _ => return Err(Error::new("artwork requires an id")),
        };
        let loader = request.tracked_entity_loader(TrackedEntityLoaderConfig::new("collection", "ids", "isSaved"));
        Ok(ResolvedValue::new(loader.load(id).await?))
    })
}

fn artwork_schema() -> Schema {
    let mut registry = Registry::new();
    registry.insert_type(MetaType::Object(ObjectType::new(
        "Artwork",
        [MetaField::new("id", "ID!"), MetaField::new("isSaved", "Boolean!")],
    )));
    registry.insert_type(MetaType::Object(ObjectType::new(
        "Query",
        [MetaField::new("artwork", "Artwork")
            .with_argument(MetaInputValue::new("id", "ID!"))
            .with_resolver(CustomResolver::new("artwork", resolve_artwork))],
    )));
    Schema::new(registry)
}

#[tokio::test]
async fn sibling_fields_share_one_upstream_flight() {
    let calls = Calls::default();
    let fetcher = Fetcher::new(FakeFetcher {
        calls: Arc::clone(&calls),
        records: vec![json!({"id": "a", "title": "A"})],
    });

    let response = artwork_schema()
        .execute(
            Request::new(r#"{ a: artwork(id: "a") { id isSaved } b: artwork(id: "b") { id isSaved } }"#)
                .data(RequestContext::new(Credentials::anonymous(), fetcher)),
        )
        .await;

    assert!(response.errors.is_empty(), "{:?}", response.errors);
    assert_eq!(
        response.data,
        json!({
            "a": { "id": "a", "isSaved": true },
            "b": { "id": "b", "isSaved": false },
        })
    );
    assert_eq!(calls.lock().unwrap().len(), 1, "expected a single batched fetch");
}

#[tokio::test]
async fn loader_caches_are_not_shared_across_requests() {
    let calls = Calls::default();
    let schema = artwork_schema();

    for _ in 0..2 {
        let fetcher = Fetcher::new(FakeFetcher {
            calls: Arc::clone(&calls),
            records: vec![json!({"id": "a"})],
        });
        let response = schema
            .execute(
                Request::new(r#"{ artwork(id: "a") { id isSaved } }"#)
                    .data(RequestContext::new(Credentials::anonymous(), fetcher)),
            )
            .await;
        assert!(response.errors.is_empty(), "{:?}", response.errors);
    }

    assert_eq!(calls.lock().unwrap().len(), 2, "each request pays its own fetch");
}
