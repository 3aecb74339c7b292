use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use vitrine_engine::Error;

use crate::{
    auth::Credentials,
    fetch::Fetcher,
    loaders::{TrackedEntityLoader, TrackedEntityLoaderConfig},
};

/// Everything a request's resolvers share: the caller's credentials, the
/// upstream fetcher, and the request's loaders.
///
/// Built once per request and attached to the engine request through its
/// data map; resolvers reach it with `ctx.data::<RequestContext>()`. Dropped
/// with the request, which is what keeps loader caches request-scoped.
pub struct RequestContext {
    credentials: Credentials,
    fetcher: Fetcher,
    tracked_loaders: Mutex<HashMap<String, Arc<TrackedEntityLoader>>>,
}

impl RequestContext {
    pub fn new(credentials: Credentials, fetcher: Fetcher) -> Self {
        Self {
            credentials,
            fetcher,
            tracked_loaders: Mutex::new(HashMap::new()),
        }
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn fetcher(&self) -> &Fetcher {
        &self.fetcher
    }

    /// The signed-in user's id, or the failure an unauthenticated caller
    /// sees on fields that need one.
    pub fn require_user(&self) -> Result<&str, Error> {
        self.credentials
            .user_id
            .as_deref()
            .ok_or_else(|| Error::new("You must be signed in to perform this action."))
    }

    /// The request's loader for a tracked-entity endpoint. One loader per
    /// endpoint and tracking key: sibling resolvers asking for the same
    /// configuration share its batch and cache.
    pub fn tracked_entity_loader(&self, config: TrackedEntityLoaderConfig) -> Arc<TrackedEntityLoader> {
        let mut loaders = self.tracked_loaders.lock().expect("loader map poisoned");
        loaders
            .entry(config.cache_key())
            .or_insert_with(|| Arc::new(TrackedEntityLoader::new(config, self.fetcher.clone())))
            .clone()
    }
}
