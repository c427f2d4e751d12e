use crate::normalize::{Dataset, QualityReport};
use crate::types::ExtractionStrategy;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use moka::future::Cache;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Opaque identifier a store hands back for a persisted dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatasetHandle {
    pub id: String,
    pub location: String,
}

/// Finished scrape handed to a store.
#[derive(Debug, Clone, Serialize)]
pub struct StoredScrape {
    pub scrape_id: String,
    pub url: Url,
    pub strategy: ExtractionStrategy,
    pub dataset: Dataset,
    pub quality: QualityReport,
    pub pages_visited: usize,
    pub created_at: DateTime<Utc>,
}

/// Persistence collaborator. Formats and locations are its own business.
pub trait DatasetStore: Send + Sync {
    fn persist<'a>(&'a self, scrape: &'a StoredScrape) -> BoxFuture<'a, anyhow::Result<DatasetHandle>>;
}

/// In-process store with time-based expiry.
#[derive(Clone)]
pub struct MemoryStore {
    scrapes: Cache<String, Arc<StoredScrape>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_limits(10_000, Duration::from_secs(60 * 30))
    }

    pub fn with_limits(capacity: u64, ttl: Duration) -> Self {
        Self {
            scrapes: Cache::builder()
                .max_capacity(capacity)
                .time_to_live(ttl)
                .build(),
        }
    }

    pub async fn get(&self, scrape_id: &str) -> Option<Arc<StoredScrape>> {
        self.scrapes.get(scrape_id).await
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DatasetStore for MemoryStore {
    fn persist<'a>(&'a self, scrape: &'a StoredScrape) -> BoxFuture<'a, anyhow::Result<DatasetHandle>> {
        Box::pin(async move {
            let id = scrape.scrape_id.clone();
            self.scrapes.insert(id.clone(), Arc::new(scrape.clone())).await;
            debug!("Stored {} rows under {}", scrape.dataset.len(), id);
            Ok(DatasetHandle {
                location: format!("memory://{}", id),
                id,
            })
        })
    }
}
