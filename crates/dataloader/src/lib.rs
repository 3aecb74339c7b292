//! Request-scoped batching and caching of keyed lookups.
//!
//! A [`DataLoader`] coalesces the individual `load_one` calls made while a
//! request's resolver tree is being executed into batched calls to a
//! [`Loader`]. Calls made within one scheduling tick are dispatched as a
//! single batch once the synchronous portion of the tick has finished, so a
//! query selecting fifty artworks costs one upstream round-trip rather than
//! fifty.
//!
//! A loader instance belongs to exactly one request. Its cache is dropped
//! with it; nothing is ever shared across requests.

use std::{
    collections::HashMap,
    hash::Hash,
    sync::{Arc, Mutex},
    time::Duration,
};

use futures_channel::oneshot;
use indexmap::IndexMap;

/// Batch function contract for a [`DataLoader`].
///
/// `load` receives the deduplicated keys pending for one batch and must
/// return one value per key, in the same order. Returning a different number
/// of values is a contract violation that fails the whole batch.
#[async_trait::async_trait]
pub trait Loader<K>: Send + Sync + 'static
where
    K: Send + Sync + Hash + Eq + Clone + 'static,
{
    type Value: Send + Sync + Clone + 'static;
    type Error: Send + Sync + Clone + std::fmt::Display + 'static;

    async fn load(&self, keys: &[K]) -> Result<Vec<Self::Value>, Self::Error>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadError<E> {
    /// The batch function itself failed. Every key pending in the batch
    /// observes the same error.
    #[error("{0}")]
    BatchDispatch(E),
    /// The batch function broke the positional contract.
    #[error("batch function returned {returned} results for {requested} keys")]
    MismatchedBatchSize { requested: usize, returned: usize },
    /// The runtime dropped the dispatch task before it settled.
    #[error("batch was dropped before dispatch completed")]
    BatchDropped,
}

type PendingBatch<K, V, E> = IndexMap<K, Vec<oneshot::Sender<Result<V, LoadError<E>>>>>;

struct State<K, V, E> {
    pending: PendingBatch<K, V, E>,
    /// Waiters for batches already dispatched upstream. A key stays here
    /// until its flight settles, so a load arriving mid-flight joins the
    /// open flight instead of starting a second one.
    in_flight: HashMap<K, Vec<oneshot::Sender<Result<V, LoadError<E>>>>>,
    flush_scheduled: bool,
    cache: HashMap<K, V>,
}

impl<K, V, E> Default for State<K, V, E> {
    fn default() -> Self {
        Self {
            pending: PendingBatch::default(),
            in_flight: HashMap::new(),
            flush_scheduled: false,
            cache: HashMap::new(),
        }
    }
}

/// A per-request batching and caching wrapper around a [`Loader`].
pub struct DataLoader<T, K>
where
    K: Send + Sync + Hash + Eq + Clone + 'static,
    T: Loader<K>,
{
    loader: Arc<T>,
    delay: Duration,
    max_batch_size: usize,
    cache_enabled: bool,
    state: Arc<Mutex<State<K, T::Value, T::Error>>>,
}

impl<T, K> DataLoader<T, K>
where
    K: Send + Sync + Hash + Eq + Clone + 'static,
    T: Loader<K>,
{
    pub fn new(loader: T) -> Self {
        Self {
            loader: Arc::new(loader),
            delay: Duration::from_millis(1),
            max_batch_size: 200,
            cache_enabled: true,
            state: Arc::new(Mutex::new(State::default())),
        }
    }

    /// How long a batch accumulates before it is dispatched. The delay only
    /// needs to outlive the synchronous portion of the current tick; it is
    /// not a debounce.
    #[must_use]
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Keys beyond this limit cause the current batch to be dispatched
    /// immediately and a fresh one to be opened.
    #[must_use]
    pub fn max_batch_size(mut self, max_batch_size: usize) -> Self {
        assert!(max_batch_size >= 1, "max_batch_size must be at least 1");
        self.max_batch_size = max_batch_size;
        self
    }

    #[must_use]
    pub fn cache(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        self
    }

    /// Loads one key, joining the current batch.
    ///
    /// Equal keys within one loader resolve to the same value and trigger at
    /// most one upstream flight, whether they are waiting on the same batch,
    /// joining a flight already upstream, or served from the cache
    /// afterwards.
    pub async fn load_one(&self, key: K) -> Result<T::Value, LoadError<T::Error>> {
        let receiver = {
            let mut state = self.state.lock().expect("dataloader state poisoned");

            if self.cache_enabled {
                if let Some(value) = state.cache.get(&key) {
                    return Ok(value.clone());
                }
            }

            let (sender, receiver) = oneshot::channel();
            if let Some(waiters) = state.pending.get_mut(&key) {
                waiters.push(sender);
            } else if let Some(waiters) = state.in_flight.get_mut(&key) {
                waiters.push(sender);
            } else {
                if state.pending.len() >= self.max_batch_size {
                    let batch = std::mem::take(&mut state.pending);
                    let keys: Vec<K> = batch.keys().cloned().collect();
                    for (key, waiters) in batch {
                        state.in_flight.insert(key, waiters);
                    }
                    self.spawn_dispatch(keys);
                }
                state.pending.insert(key, vec![sender]);
                if !state.flush_scheduled {
                    state.flush_scheduled = true;
                    self.spawn_flush();
                }
            }
            receiver
        };

        receiver.await.map_err(|_| LoadError::BatchDropped)?
    }

    /// Loads many keys; all of them join the same tick and therefore,
    /// capacity permitting, the same batch.
    pub async fn load_many<I>(&self, keys: I) -> Result<Vec<T::Value>, LoadError<T::Error>>
    where
        I: IntoIterator<Item = K>,
    {
        futures_util::future::try_join_all(keys.into_iter().map(|key| self.load_one(key))).await
    }

    fn spawn_flush(&self) {
        let state = Arc::clone(&self.state);
        let loader = Arc::clone(&self.loader);
        let cache_enabled = self.cache_enabled;
        let delay = self.delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let keys: Vec<K> = {
                let mut state = state.lock().expect("dataloader state poisoned");
                state.flush_scheduled = false;
                let batch = std::mem::take(&mut state.pending);
                let keys = batch.keys().cloned().collect();
                for (key, waiters) in batch {
                    state.in_flight.insert(key, waiters);
                }
                keys
            };
            if !keys.is_empty() {
                dispatch(loader, state, cache_enabled, keys).await;
            }
        });
    }

    fn spawn_dispatch(&self, keys: Vec<K>) {
        let state = Arc::clone(&self.state);
        let loader = Arc::clone(&self.loader);
        let cache_enabled = self.cache_enabled;
        tokio::spawn(async move {
            dispatch(loader, state, cache_enabled, keys).await;
        });
    }
}

async fn dispatch<T, K>(
    loader: Arc<T>,
    state: Arc<Mutex<State<K, T::Value, T::Error>>>,
    cache_enabled: bool,
    keys: Vec<K>,
) where
    K: Send + Sync + Hash + Eq + Clone + 'static,
    T: Loader<K>,
{
    tracing::debug!(batch_size = keys.len(), "dispatching loader batch");

    let outcome = match loader.load(&keys).await {
        Ok(values) if values.len() == keys.len() => Ok(values),
        Ok(values) => {
            tracing::error!(
                requested = keys.len(),
                returned = values.len(),
                "batch function broke the positional contract"
            );
            Err(LoadError::MismatchedBatchSize {
                requested: keys.len(),
                returned: values.len(),
            })
        }
        Err(error) => Err(LoadError::BatchDispatch(error)),
    };

    // waiters are drained under the same lock that admits late joiners, so a
    // key is either answered here or still open for a fresh batch
    let mut state = state.lock().expect("dataloader state poisoned");
    match outcome {
        Ok(values) => {
            for (key, value) in keys.into_iter().zip(values) {
                if let Some(waiters) = state.in_flight.remove(&key) {
                    for waiter in waiters {
                        let _ = waiter.send(Ok(value.clone()));
                    }
                }
                if cache_enabled {
                    state.cache.insert(key, value);
                }
            }
        }
        Err(error) => {
            for key in &keys {
                if let Some(waiters) = state.in_flight.remove(key) {
                    for waiter in waiters {
                        let _ = waiter.send(Err(error.clone()));
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RecordingLoader {
        calls: Arc<Mutex<Vec<Vec<String>>>>,
        fail_with: Option<String>,
        drop_last: bool,
        latency: Option<Duration>,
    }

    impl RecordingLoader {
        fn new(calls: Arc<Mutex<Vec<Vec<String>>>>) -> Self {
            Self {
                calls,
                fail_with: None,
                drop_last: false,
                latency: None,
            }
        }
    }

    #[async_trait::async_trait]
    impl Loader<String> for RecordingLoader {
        type Value = String;
        type Error = String;

        async fn load(&self, keys: &[String]) -> Result<Vec<String>, String> {
            self.calls.lock().unwrap().push(keys.to_vec());
            if let Some(latency) = self.latency {
                tokio::time::sleep(latency).await;
            }
            if let Some(message) = &self.fail_with {
                return Err(message.clone());
            }
            let mut values: Vec<String> = keys.iter().map(|key| key.to_uppercase()).collect();
            if self.drop_last {
                values.pop();
            }
            Ok(values)
        }
    }

    #[tokio::test]
    async fn coalesces_same_tick_loads_into_one_batch() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let loader = DataLoader::new(RecordingLoader::new(Arc::clone(&calls)));

        let (a, b, a2) = tokio::join!(
            loader.load_one("a".to_string()),
            loader.load_one("b".to_string()),
            loader.load_one("a".to_string()),
        );

        assert_eq!(a.unwrap(), "A");
        assert_eq!(b.unwrap(), "B");
        assert_eq!(a2.unwrap(), "A");
        assert_eq!(*calls.lock().unwrap(), vec![vec!["a".to_string(), "b".to_string()]]);
    }

    #[tokio::test]
    async fn repeated_loads_hit_the_cache() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let loader = DataLoader::new(RecordingLoader::new(Arc::clone(&calls)));

        let first = loader.load_one("a".to_string()).await.unwrap();
        let second = loader.load_one("a".to_string()).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn pending_keys_are_deduplicated_even_without_cache() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let loader = DataLoader::new(RecordingLoader::new(Arc::clone(&calls))).cache(false);

        let (first, second) = tokio::join!(
            loader.load_one("a".to_string()),
            loader.load_one("a".to_string()),
        );

        assert_eq!(first.unwrap(), "A");
        assert_eq!(second.unwrap(), "A");
        assert_eq!(*calls.lock().unwrap(), vec![vec!["a".to_string()]]);

        // With the cache off, a later tick goes upstream again.
        loader.load_one("a".to_string()).await.unwrap();
        assert_eq!(calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn loads_issued_mid_flight_join_the_open_flight() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut inner = RecordingLoader::new(Arc::clone(&calls));
        inner.latency = Some(Duration::from_millis(50));
        let loader = Arc::new(DataLoader::new(inner));

        let first = tokio::spawn({
            let loader = Arc::clone(&loader);
            async move { loader.load_one("a".to_string()).await }
        });
        // let the flush fire and the batch go upstream before loading again
        tokio::time::sleep(Duration::from_millis(10)).await;
        let second = loader.load_one("a".to_string()).await;

        assert_eq!(first.await.unwrap().unwrap(), "A");
        assert_eq!(second.unwrap(), "A");
        assert_eq!(*calls.lock().unwrap(), vec![vec!["a".to_string()]]);
    }

    #[tokio::test]
    async fn separate_loader_instances_do_not_share_results() {
        let first_calls = Arc::new(Mutex::new(Vec::new()));
        let second_calls = Arc::new(Mutex::new(Vec::new()));
        let first = DataLoader::new(RecordingLoader::new(Arc::clone(&first_calls)));
        let second = DataLoader::new(RecordingLoader::new(Arc::clone(&second_calls)));

        first.load_one("a".to_string()).await.unwrap();
        second.load_one("a".to_string()).await.unwrap();

        assert_eq!(first_calls.lock().unwrap().len(), 1);
        assert_eq!(second_calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn overflowing_the_batch_size_opens_a_new_batch() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let loader = DataLoader::new(RecordingLoader::new(Arc::clone(&calls))).max_batch_size(2);

        let values = loader
            .load_many(["k0", "k1", "k2"].map(String::from))
            .await
            .unwrap();

        assert_eq!(values, vec!["K0", "K1", "K2"]);
        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        let mut seen: Vec<String> = calls.iter().flatten().cloned().collect();
        seen.sort();
        assert_eq!(seen, vec!["k0", "k1", "k2"]);
        assert!(calls.iter().all(|batch| batch.len() <= 2));
    }

    #[tokio::test]
    async fn mismatched_batch_size_fails_the_whole_batch() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut inner = RecordingLoader::new(Arc::clone(&calls));
        inner.drop_last = true;
        let loader = DataLoader::new(inner);

        let (a, b) = tokio::join!(
            loader.load_one("a".to_string()),
            loader.load_one("b".to_string()),
        );

        let expected = LoadError::MismatchedBatchSize {
            requested: 2,
            returned: 1,
        };
        assert_eq!(a.unwrap_err(), expected);
        assert_eq!(b.unwrap_err(), expected);
    }

    #[tokio::test]
    async fn batch_errors_reach_every_pending_key() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut inner = RecordingLoader::new(Arc::clone(&calls));
        inner.fail_with = Some("upstream unreachable".to_string());
        let loader = DataLoader::new(inner);

        let (a, b) = tokio::join!(
            loader.load_one("a".to_string()),
            loader.load_one("b".to_string()),
        );

        assert_eq!(
            a.unwrap_err(),
            LoadError::BatchDispatch("upstream unreachable".to_string())
        );
        assert_eq!(
            b.unwrap_err(),
            LoadError::BatchDispatch("upstream unreachable".to_string())
        );
        // Errors are not cached; the next tick retries upstream.
        let _ = loader.load_one("a".to_string()).await;
        assert_eq!(calls.lock().unwrap().len(), 2);
    }
}
