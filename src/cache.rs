//! Content-addressed result cache with single-flight computation.
//!
//! Keys are SHA-256 fingerprints of the normalized input; concurrent requests
//! for one key share a single computation. Failures are never stored: a
//! waiter that already joined a failed slot computes in it next.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::sync::{Mutex, OnceCell};
use tracing::debug;

use crate::api::PackResponse;
use crate::config::AlgorithmConfig;
use crate::error::{PackingError, Result};
use crate::model::Vehicle;
use crate::optimizer::PackingInput;

#[derive(Serialize)]
struct FingerprintSource<'a> {
    vehicle: Option<&'a Vehicle>,
    items: Vec<String>,
    rejected: Vec<String>,
    route: &'a [String],
    config: AlgorithmConfig,
}

/// Fingerprint of a packing input and the configuration it runs with.
///
/// Item order does not matter; the configuration's name and default flag
/// are ignored so that identically tuned configurations share entries.
pub fn fingerprint(input: &PackingInput, config: &AlgorithmConfig) -> Result<String> {
    let mut items = input
        .items
        .iter()
        .map(encode)
        .collect::<Result<Vec<_>>>()?;
    items.sort();

    let mut rejected = input
        .rejected
        .iter()
        .map(|entry| encode(&(&entry.item, &entry.reason)))
        .collect::<Result<Vec<_>>>()?;
    rejected.sort();

    let mut config = config.clone();
    config.name.clear();
    config.is_default = false;

    let source = FingerprintSource {
        vehicle: input.vehicle.as_ref(),
        items,
        rejected,
        route: &input.route,
        config,
    };
    let digest = Sha256::digest(encode(&source)?.as_bytes());
    Ok(hex::encode(digest))
}

fn encode<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string(value)
        .map_err(|err| PackingError::Internal(format!("cannot fingerprint request: {}", err)))
}

#[derive(Default)]
struct Entries {
    cells: HashMap<String, Arc<OnceCell<PackResponse>>>,
    /// Insertion order, oldest first.
    order: VecDeque<String>,
}

/// Bounded response cache.
pub struct ResultCache {
    capacity: usize,
    entries: Mutex<Entries>,
}

impl ResultCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(Entries::default()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of keys currently held, in-flight ones included.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.cells.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Returns the cached response for `key` or computes it.
    ///
    /// The flag is `true` when the response was produced by another call.
    pub async fn get_or_compute<F, Fut>(&self, key: &str, compute: F) -> Result<(PackResponse, bool)>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<PackResponse>>,
    {
        let cell = self.cell_for(key).await;
        let mut computed = false;
        let flag = &mut computed;
        let outcome = cell
            .get_or_try_init(move || async move {
                *flag = true;
                compute().await
            })
            .await
            .cloned();

        match outcome {
            Ok(response) => {
                debug!("Cache {} for {}", if computed { "fill" } else { "hit" }, key);
                Ok((response, !computed))
            }
            Err(err) => {
                self.forget_failed(key, &cell).await;
                Err(err)
            }
        }
    }

    async fn cell_for(&self, key: &str) -> Arc<OnceCell<PackResponse>> {
        let mut entries = self.entries.lock().await;
        if let Some(cell) = entries.cells.get(key) {
            return Arc::clone(cell);
        }

        let cell = Arc::new(OnceCell::new());
        entries.cells.insert(key.to_string(), Arc::clone(&cell));
        entries.order.push_back(key.to_string());
        while entries.cells.len() > self.capacity.max(1) {
            match entries.order.pop_front() {
                Some(oldest) => {
                    debug!("Evicting cached result {}", oldest);
                    entries.cells.remove(&oldest);
                }
                None => break,
            }
        }
        cell
    }

    /// Drops an empty slot nobody else is waiting on.
    ///
    /// New callers only obtain the slot under the entries lock, so a strong
    /// count of two (map and caller) means no waiter holds it.
    async fn forget_failed(&self, key: &str, cell: &Arc<OnceCell<PackResponse>>) {
        let mut entries = self.entries.lock().await;
        let unused = entries.cells.get(key).is_some_and(|current| {
            Arc::ptr_eq(current, cell) && !current.initialized() && Arc::strong_count(cell) == 2
        });
        if unused {
            entries.cells.remove(key);
            entries.order.retain(|k| k != key);
        }
    }
}
