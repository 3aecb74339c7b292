use std::sync::{Arc, Mutex};

use serde_json::json;
use vitrine_gateway::{
    fetch::{FetchResult, Fetcher, FetcherInner},
    Credentials, RequestContext, TrackedEntityLoader, TrackedEntityLoaderConfig,
};

type Calls = Arc<Mutex<Vec<(String, serde_json::Value)>>>;

struct FakeFetcher {
    calls: Calls,
    records: Vec<serde_json::Value>,
    envelope: bool,
}

#[async_trait::async_trait]
impl FetcherInner for FakeFetcher {
    async fn fetch(&self, path: &str, params: &serde_json::Value) -> FetchResult<serde_json::Value> {
        self.calls.lock().unwrap().push((path.to_string(), params.clone()));
        let records = serde_json::Value::Array(self.records.clone());
        Ok(if self.envelope {
            json!({ "body": records })
        } else {
            records
        })
    }
}

fn fetcher(calls: &Calls, records: Vec<serde_json::Value>, envelope: bool) -> Fetcher {
    Fetcher::new(FakeFetcher {
        calls: Arc::clone(calls),
        records,
        envelope,
    })
}

#[tokio::test]
async fn known_ids_are_merged_with_the_tracking_flag() {
    let calls = Calls::default();
    let loader = TrackedEntityLoader::new(
        TrackedEntityLoaderConfig::new("collection", "ids", "is_saved"),
        fetcher(&calls, vec![json!({"id": "banksy-rat", "title": "Rat"})], false),
    );

    let value = loader.load("banksy-rat").await.unwrap();

    assert_eq!(value, json!({"id": "banksy-rat", "title": "Rat", "is_saved": true}));
}

#[tokio::test]
async fn unknown_ids_resolve_to_a_synthesized_untracked_record() {
    let calls = Calls::default();
    let loader = TrackedEntityLoader::new(
        TrackedEntityLoaderConfig::new("collection", "ids", "is_saved"),
        fetcher(&calls, vec![], false),
    );

    let value = loader.load("unknown").await.unwrap();

    assert_eq!(value, json!({"id": "unknown", "is_saved": false}));
}

#[tokio::test]
async fn same_tick_loads_make_one_upstream_call() {
    let calls = Calls::default();
    let loader = TrackedEntityLoader::new(
        TrackedEntityLoaderConfig::new("collection", "ids", "is_saved").param("private", true),
        fetcher(&calls, vec![json!({"id": "a"})], false),
    );

    let (a, b) = tokio::join!(loader.load("a"), loader.load("b"));

    assert_eq!(a.unwrap()["is_saved"], json!(true));
    assert_eq!(b.unwrap()["is_saved"], json!(false));

    let calls = calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    let (path, params) = &calls[0];
    assert_eq!(path, "collection");
    assert_eq!(params["ids"], json!(["a", "b"]));
    assert_eq!(params["size"], json!(2));
    assert_eq!(params["private"], json!(true));
}

#[tokio::test]
async fn unwraps_envelope_and_entity_key_path() {
    let calls = Calls::default();
    let loader = TrackedEntityLoader::new(
        TrackedEntityLoaderConfig::new("follows/artists", "artists", "is_followed").entity_key_path("artist"),
        fetcher(&calls, vec![json!({"artist": {"id": "kusama"}})], true),
    );

    let value = loader.load("kusama").await.unwrap();

    assert_eq!(value, json!({"id": "kusama", "is_followed": true}));
}

#[tokio::test]
async fn request_context_memoizes_loaders_per_endpoint() {
    let calls = Calls::default();
    let context = RequestContext::new(Credentials::anonymous(), fetcher(&calls, vec![], false));

    let first = context.tracked_entity_loader(TrackedEntityLoaderConfig::new("collection", "ids", "is_saved"));
    let second = context.tracked_entity_loader(TrackedEntityLoaderConfig::new("collection", "ids", "is_saved"));
    let other = context.tracked_entity_loader(TrackedEntityLoaderConfig::new("follows/artists", "artists", "is_followed"));

    assert!(Arc::ptr_eq(&first, &second));
    assert!(!Arc::ptr_eq(&first, &other));
}

#[tokio::test]
async fn require_user_rejects_anonymous_callers() {
    let calls = Calls::default();

    let anonymous = RequestContext::new(Credentials::anonymous(), fetcher(&calls, vec![], false));
    let error = anonymous.require_user().unwrap_err();
    assert_eq!(error.message, "You must be signed in to perform this action.");

    let signed_in = RequestContext::new(Credentials::for_user("token", "user-1"), fetcher(&calls, vec![], false));
    assert_eq!(signed_in.require_user().unwrap(), "user-1");
}
