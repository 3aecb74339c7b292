use std::collections::HashMap;

use dataloader::{DataLoader, LoadError, Loader};
use serde_json::json;
use vitrine_engine::Error;

use crate::fetch::{FetchError, Fetcher};

/// How a tracked-entity endpoint is shaped.
#[derive(Debug, Clone)]
pub struct TrackedEntityLoaderConfig {
    /// The upstream path serving the batched lookup.
    pub path: String,
    /// The plural id query parameter, e.g. `artworks`.
    pub param_key: String,
    /// The synthetic boolean merged into every loaded value, e.g. `is_saved`.
    pub tracking_key: String,
    /// Dotted path unwrapping each record down to the entity, for endpoints
    /// returning wrapper nodes.
    pub entity_key_path: Option<String>,
    /// Dotted path of the entity id within the (unwrapped) record.
    pub entity_id_key_path: String,
    pub batch_size: usize,
    /// Extra static query parameters sent with every batch.
    pub params: serde_json::Map<String, serde_json::Value>,
}

impl TrackedEntityLoaderConfig {
    pub fn new(path: impl Into<String>, param_key: impl Into<String>, tracking_key: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            param_key: param_key.into(),
            tracking_key: tracking_key.into(),
            entity_key_path: None,
            entity_id_key_path: "id".to_string(),
            batch_size: 200,
            params: serde_json::Map::new(),
        }
    }

    #[must_use]
    pub fn entity_key_path(mut self, path: impl Into<String>) -> Self {
        self.entity_key_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn entity_id_key_path(mut self, path: impl Into<String>) -> Self {
        self.entity_id_key_path = path.into();
        self
    }

    #[must_use]
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    #[must_use]
    pub fn param(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub(crate) fn cache_key(&self) -> String {
        format!("{}:{}", self.path, self.tracking_key)
    }
}

struct TrackedEntityBatch {
    config: TrackedEntityLoaderConfig,
    fetcher: Fetcher,
}

#[async_trait::async_trait]
impl Loader<String> for TrackedEntityBatch {
    type Value = serde_json::Value;
    type Error = FetchError;

    async fn load(&self, ids: &[String]) -> Result<Vec<serde_json::Value>, FetchError> {
        let config = &self.config;

        let mut params = config.params.clone();
        params.insert(config.param_key.clone(), json!(ids));
        params.insert("size".to_string(), json!(ids.len()));
        let response = self.fetcher.fetch(&config.path, &serde_json::Value::Object(params)).await?;

        // plain list, or a `body` envelope around one
        let records = match response {
            serde_json::Value::Array(records) => records,
            serde_json::Value::Object(mut envelope) => match envelope.remove("body") {
                Some(serde_json::Value::Array(records)) => records,
                _ => {
                    return Err(FetchError::MalformedResponse {
                        path: config.path.clone(),
                        message: "expected a list of records".to_string(),
                    });
                }
            },
            _ => {
                return Err(FetchError::MalformedResponse {
                    path: config.path.clone(),
                    message: "expected a list of records".to_string(),
                });
            }
        };

        let mut by_id: HashMap<String, serde_json::Value> = HashMap::new();
        for record in records {
            let entity = match &config.entity_key_path {
                Some(path) => select_path(&record, path).cloned().unwrap_or(serde_json::Value::Null),
                None => record,
            };
            if let Some(id) = select_path(&entity, &config.entity_id_key_path).and_then(serde_json::Value::as_str) {
                by_id.insert(id.to_string(), entity.clone());
            }
        }

        // one value per id, always: ids the upstream does not know get a
        // synthesized record with the tracking flag off
        Ok(ids
            .iter()
            .map(|id| match by_id.get(id) {
                Some(entity) => {
                    let mut entity = entity.clone();
                    if let Some(object) = entity.as_object_mut() {
                        object.insert(config.tracking_key.clone(), json!(true));
                    }
                    entity
                }
                None => {
                    let mut object = serde_json::Map::new();
                    object.insert("id".to_string(), json!(id));
                    object.insert(config.tracking_key.clone(), json!(false));
                    serde_json::Value::Object(object)
                }
            })
            .collect())
    }
}

/// Batches per-entity membership lookups ("is this artwork saved", "is this
/// artist followed") into one upstream call per scheduling tick, and answers
/// for every id whether it is tracked. A missing id is never an error.
pub struct TrackedEntityLoader {
    loader: DataLoader<TrackedEntityBatch, String>,
}

impl TrackedEntityLoader {
    pub fn new(config: TrackedEntityLoaderConfig, fetcher: Fetcher) -> Self {
        let batch_size = config.batch_size;
        Self {
            loader: DataLoader::new(TrackedEntityBatch { config, fetcher }).max_batch_size(batch_size),
        }
    }

    /// The entity merged with `{tracking_key: true}`, or a synthesized
    /// `{id, tracking_key: false}` when the upstream does not know the id.
    pub async fn load(&self, id: impl Into<String>) -> Result<serde_json::Value, Error> {
        self.loader.load_one(id.into()).await.map_err(|error| match error {
            LoadError::BatchDispatch(fetch_error) => fetch_error.into(),
            other => Error::new(other.to_string()),
        })
    }
}

fn select_path<'a>(value: &'a serde_json::Value, path: &str) -> Option<&'a serde_json::Value> {
    path.split('.').try_fold(value, |value, key| value.get(key))
}
