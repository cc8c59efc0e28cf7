//! Per-key deduplication of concurrent fetches.
//!
//! When N callers request the same key before the first in-flight fetch for
//! that key settles, exactly one producer runs; every caller receives the
//! same result or the same error. The producer runs in its own task, so a
//! caller abandoning its wait never cancels a fetch other callers share.
//!
//! A failed producer call is never cached: the registration is removed
//! before the result is delivered to any waiter, so the very next call for
//! that key starts a fresh fetch.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use tracing::debug;

use crate::error::{ApiError, Result};

type Registry<K, T> = Arc<Mutex<HashMap<K, broadcast::Sender<Result<T>>>>>;

/// De-duplicates concurrent fetches for the same key.
///
/// The in-flight registry is the only state; locking covers bookkeeping
/// only, never the fetch itself.
pub struct Coalescer<K, T> {
    in_flight: Registry<K, T>,
}

impl<K, T> Default for Coalescer<K, T>
where
    K: Eq + Hash + Clone + Send + 'static,
    T: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, T> Coalescer<K, T>
where
    K: Eq + Hash + Clone + Send + 'static,
    T: Clone + Send + 'static,
{
    pub fn new() -> Self {
        Self {
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Fetch the value for `key`, joining an in-flight fetch if one exists.
    ///
    /// If no fetch for `key` is pending, `producer()` is spawned as its own
    /// task; the registration is removed — success or failure — before the
    /// result reaches any waiter.
    pub async fn fetch<F, Fut>(&self, key: K, producer: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let mut rx = {
            let mut in_flight = self.in_flight.lock().expect("in-flight registry poisoned");
            if let Some(tx) = in_flight.get(&key) {
                debug!("joining in-flight fetch");
                tx.subscribe()
            } else {
                let (tx, rx) = broadcast::channel(1);
                in_flight.insert(key.clone(), tx.clone());
                drop(in_flight);

                let guard = Deregister {
                    in_flight: Arc::clone(&self.in_flight),
                    key,
                };
                let fut = producer();
                tokio::spawn(async move {
                    let result = fut.await;
                    // Deregister before delivery, so a failure can be retried
                    // cleanly by the next caller.
                    drop(guard);
                    let _ = tx.send(result);
                });
                rx
            }
        };

        match rx.recv().await {
            Ok(result) => result,
            // The producer task died without delivering; surface as a
            // transient failure so a retry can start a fresh fetch.
            Err(_) => Err(ApiError::Transport(
                "in-flight fetch was abandoned".to_string(),
            )),
        }
    }

    #[cfg(test)]
    fn in_flight_len(&self) -> usize {
        self.in_flight.lock().expect("in-flight registry poisoned").len()
    }
}

/// Removes a key from the registry on drop, even if the producer panics.
struct Deregister<K: Eq + Hash, T> {
    in_flight: Registry<K, T>,
    key: K,
}

impl<K: Eq + Hash, T> Drop for Deregister<K, T> {
    fn drop(&mut self) {
        if let Ok(mut in_flight) = self.in_flight.lock() {
            in_flight.remove(&self.key);
        }
    }
}
