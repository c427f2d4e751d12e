pub mod config;
pub mod crawl;
pub mod detect;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod normalize;
pub mod orchestrator;
pub mod probe;
pub mod store;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::ScraperConfig;
pub use crawl::{crawl, find_next_link, CrawlOutcome, Termination};
pub use detect::{detect, detect_strategies};
pub use error::{ErrorKind, ExtractError, FetchError, ScrapeError};
pub use extract::extract;
pub use fetch::{Connector, Document, Fetch, HttpConnector, HttpFetcher, LoggingFetcher, RawPage};
pub use normalize::{normalize, Cell, ColumnKind, Dataset, QualityReport};
pub use orchestrator::Scraper;
pub use probe::{probe, probe_document, try_probe};
pub use store::{DatasetHandle, DatasetStore, MemoryStore, StoredScrape};
pub use types::*;

/// Install a `RUST_LOG`-driven fmt subscriber. Safe to call more than once.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}
