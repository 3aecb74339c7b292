use std::{ops::Deref, sync::Arc};

use url::Url;
use vitrine_engine::Error;

pub type FetchResult<T> = Result<T, FetchError>;

/// Errors are `Clone` so one failed batch flight can be reported to every
/// key waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("upstream request to `{path}` failed: {message}")]
    Upstream {
        path: String,
        message: String,
        status: Option<u16>,
    },
    #[error("upstream response from `{path}` was malformed: {message}")]
    MalformedResponse { path: String, message: String },
}

impl FetchError {
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Upstream { status, .. } => *status,
            FetchError::MalformedResponse { .. } => None,
        }
    }
}

impl From<FetchError> for Error {
    fn from(error: FetchError) -> Self {
        match error.status() {
            Some(status) => Error::new_with_status(error.to_string(), status),
            None => Error::new(error.to_string()),
        }
    }
}

/// The upstream call contract. `params` is a JSON object; how it is encoded
/// on the wire is the implementation's business.
#[async_trait::async_trait]
pub trait FetcherInner: Send + Sync {
    async fn fetch(&self, path: &str, params: &serde_json::Value) -> FetchResult<serde_json::Value>;
}

#[derive(Clone)]
pub struct Fetcher {
    inner: Arc<dyn FetcherInner>,
}

impl Fetcher {
    pub fn new(fetcher: impl FetcherInner + 'static) -> Self {
        Self {
            inner: Arc::new(fetcher),
        }
    }
}

impl Deref for Fetcher {
    type Target = Arc<dyn FetcherInner>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

/// The stock HTTP implementation: GET with the params flattened to query
/// string pairs, arrays as repeated keys, and the access token passed in an
/// `X-Access-Token` header.
pub struct HttpFetcher {
    client: reqwest::Client,
    base_url: Url,
    access_token: Option<String>,
}

impl HttpFetcher {
    /// `base_url` should end with a slash, otherwise its last path segment
    /// is replaced when joining.
    pub fn new(base_url: Url) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            access_token: None,
        }
    }

    #[must_use]
    pub fn with_access_token(mut self, access_token: Option<String>) -> Self {
        self.access_token = access_token;
        self
    }
}

#[async_trait::async_trait]
impl FetcherInner for HttpFetcher {
    async fn fetch(&self, path: &str, params: &serde_json::Value) -> FetchResult<serde_json::Value> {
        let url = self.base_url.join(path).map_err(|error| FetchError::Upstream {
            path: path.to_string(),
            message: error.to_string(),
            status: None,
        })?;

        let mut request = self.client.get(url).query(&query_pairs(params));
        if let Some(token) = &self.access_token {
            request = request.header("X-Access-Token", token);
        }

        tracing::debug!(path, "fetching upstream");
        let response = request.send().await.map_err(|error| FetchError::Upstream {
            path: path.to_string(),
            message: error.to_string(),
            status: error.status().map(|status| status.as_u16()),
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Upstream {
                path: path.to_string(),
                message: format!("upstream returned {status}"),
                status: Some(status.as_u16()),
            });
        }

        response.json().await.map_err(|error| FetchError::MalformedResponse {
            path: path.to_string(),
            message: error.to_string(),
        })
    }
}

fn query_pairs(params: &serde_json::Value) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    if let serde_json::Value::Object(map) = params {
        for (key, value) in map {
            match value {
                serde_json::Value::Array(items) => {
                    for item in items {
                        pairs.push((key.clone(), scalar_param(item)));
                    }
                }
                other => pairs.push((key.clone(), scalar_param(other))),
            }
        }
    }
    pairs
}

fn scalar_param(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(value) => value.clone(),
        other => other.to_string(),
    }
}
