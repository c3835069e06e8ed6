use crate::cache::{Expiring, ExpiringLruCache};
use crate::metadata::{ClusterSnapshot, MetadataError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, trace};

/// Cache of cluster snapshots keyed by cluster alias.
pub type MetadataCache = LoadingCache<String, ClusterSnapshot, MetadataError>;

type LoadResult<V, E> = Option<Result<Arc<V>, E>>;
type InFlight<K, V, E> = Mutex<HashMap<K, watch::Receiver<LoadResult<V, E>>>>;

/// Read-through cache that runs at most one loader per missing key.
///
/// Callers that ask for a key while a load is running wait for that load and
/// get a clone of its result, error included. Failed loads are not stored.
pub struct LoadingCache<K: Hash + Eq, V, E> {
    entries: ExpiringLruCache<K, Arc<V>>,
    in_flight: InFlight<K, V, E>,
    admission: Option<fn(&V) -> bool>,
}

impl<K, V, E> LoadingCache<K, V, E>
where
    K: Hash + Eq + Clone,
    E: Clone,
{
    pub fn new(entries: ExpiringLruCache<K, Arc<V>>) -> Self {
        Self {
            entries,
            in_flight: Mutex::new(HashMap::new()),
            admission: None,
        }
    }

    /// Only successful values accepted by `admit` are stored; the rest are
    /// still handed to every waiting caller.
    pub fn with_admission(mut self, admit: fn(&V) -> bool) -> Self {
        self.admission = Some(admit);
        self
    }

    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        self.entries.get(key)
    }

    pub fn invalidate(&self, key: &K) -> bool {
        self.entries.invalidate(key)
    }

    pub fn size(&self) -> usize {
        self.entries.size()
    }

    pub async fn get_or_load<F, Fut>(&self, key: K, loader: F) -> Result<Arc<V>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let sender = loop {
            if let Some(value) = self.entries.get(&key) {
                trace!(cache = self.entries.name(), "Cache hit");
                return Ok(value);
            }

            let mut receiver = {
                let mut in_flight = self.in_flight.lock();
                // A load may have finished between the lookup above and taking the lock.
                if let Some(value) = self.entries.get(&key) {
                    return Ok(value);
                }
                match in_flight.get(&key) {
                    Some(receiver) => receiver.clone(),
                    None => {
                        let (sender, receiver) = watch::channel(None);
                        in_flight.insert(key.clone(), receiver);
                        break sender;
                    }
                }
            };

            debug!(cache = self.entries.name(), "Waiting for running load");
            let published = receiver
                .wait_for(Option::is_some)
                .await
                .ok()
                .and_then(|result| result.clone());

            // No result means the loading caller went away; race for the slot again.
            if let Some(result) = published {
                return result;
            }
        };

        let slot = InFlightSlot {
            in_flight: &self.in_flight,
            key: Some(key.clone()),
        };

        debug!(cache = self.entries.name(), "Cache miss, loading");
        let result = loader().await.map(Arc::new);

        if let Ok(value) = &result {
            if self.admission.map_or(true, |admit| admit(value)) {
                self.entries.put(key, value.clone());
            }
        }

        drop(slot);
        sender.send_replace(Some(result.clone()));

        result
    }
}

impl<K, V, E> Expiring for LoadingCache<K, V, E>
where
    K: Hash + Eq + Clone + Send + 'static,
    V: Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    fn name(&self) -> &'static str {
        self.entries.name()
    }

    fn purge_expired(&self) -> usize {
        self.entries.purge_expired()
    }
}

/// Frees the in-flight slot of a key when the loading caller finishes or is dropped.
struct InFlightSlot<'a, K: Hash + Eq, V, E> {
    in_flight: &'a InFlight<K, V, E>,
    key: Option<K>,
}

impl<K: Hash + Eq, V, E> Drop for InFlightSlot<'_, K, V, E> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            self.in_flight.lock().remove(&key);
        }
    }
}
