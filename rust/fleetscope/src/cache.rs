//! Memoization layer: aggregate bundles keyed by the exact filter tuple,
//! and the TTL'd filter-option lookup.

use crate::{
    error::Result,
    filter::FilterSelection,
    models::{AggregateBundle, Table, ViewKind},
    query::{FetchEngine, FilterOptions},
};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};
use tracing::{debug, warn};

/// Seam between the cache and the fetchers. Production wires in the
/// `FetchEngine`; tests substitute an instrumented fake.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, view: ViewKind, selection: &FilterSelection) -> AggregateBundle;
    async fn filter_options(&self) -> Result<FilterOptions>;
    async fn uid_examples(&self, selection: &FilterSelection) -> Table;
}

#[async_trait]
impl Fetch for FetchEngine {
    async fn fetch(&self, view: ViewKind, selection: &FilterSelection) -> AggregateBundle {
        FetchEngine::fetch(self, view, selection).await
    }

    async fn filter_options(&self) -> Result<FilterOptions> {
        FetchEngine::filter_options(self).await
    }

    async fn uid_examples(&self, selection: &FilterSelection) -> Table {
        FetchEngine::uid_examples(self, selection).await
    }
}

struct OptionsEntry {
    fetched_at: Instant,
    options: Arc<FilterOptions>,
}

/// Aggregate entries never expire within the process lifetime; the input
/// domain (distinct filter tuples) is bounded by human interaction rate.
/// Filter options expire after the configured TTL.
pub struct ResultCache {
    fetcher: Arc<dyn Fetch>,
    aggregates: RwLock<HashMap<(ViewKind, FilterSelection), Arc<AggregateBundle>>>,
    options: Mutex<Option<OptionsEntry>>,
    options_ttl: Duration,
}

impl ResultCache {
    pub fn new(fetcher: Arc<dyn Fetch>, options_ttl: Duration) -> Self {
        Self {
            fetcher,
            aggregates: RwLock::new(HashMap::new()),
            options: Mutex::new(None),
            options_ttl,
        }
    }

    /// Memoized bundle for (view, selection). Whatever the fetcher
    /// returned is cached, failure bundles included; only a process
    /// restart clears aggregate entries.
    pub async fn bundle(&self, view: ViewKind, selection: &FilterSelection) -> Arc<AggregateBundle> {
        let key = (view, selection.clone());
        if let Some(hit) = self.aggregates.read().get(&key) {
            return hit.clone();
        }

        debug!(view = view.as_str(), "aggregate cache miss");
        // Computed without holding the lock: two racing misses fetch
        // twice and the last insert wins, which is harmless.
        let bundle = Arc::new(self.fetcher.fetch(view, selection).await);
        self.aggregates.write().insert(key, bundle.clone());
        bundle
    }

    /// Filter options with TTL expiry. A failed lookup degrades to the
    /// empty-but-complete fallback, which is cached for the TTL like a
    /// success.
    pub async fn filter_options(&self) -> Arc<FilterOptions> {
        if let Some(entry) = self.options.lock().as_ref() {
            if entry.fetched_at.elapsed() < self.options_ttl {
                return entry.options.clone();
            }
        }

        let options = match self.fetcher.filter_options().await {
            Ok(options) => options,
            Err(err) => {
                warn!(error = %err, "serving empty filter option sets");
                FilterOptions::empty()
            }
        };

        let options = Arc::new(options);
        *self.options.lock() = Some(OptionsEntry {
            fetched_at: Instant::now(),
            options: options.clone(),
        });
        options
    }

    /// UID examples are fetched on demand, never memoized.
    pub async fn uid_examples(&self, selection: &FilterSelection) -> Table {
        self.fetcher.uid_examples(selection).await
    }
}
