use crate::config::ScraperConfig;
use crate::crawl::crawl;
use crate::detect::detect;
use crate::error::{FetchError, ScrapeError};
use crate::fetch::{Connector, Fetch, HttpConnector, LoggingFetcher};
use crate::normalize::normalize;
use crate::probe::{probe, try_probe};
use crate::store::{DatasetStore, StoredScrape};
use crate::types::{DetectionResult, ExtractionStrategy, ProbeResult, ScrapeResult};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{error, info, warn};
use url::Url;
use uuid::Uuid;

/// Entry point tying probe, detection, crawl and normalization together.
#[derive(Clone)]
pub struct Scraper {
    config: ScraperConfig,
    connector: Arc<dyn Connector>,
    store: Option<Arc<dyn DatasetStore>>,
}

impl std::fmt::Debug for Scraper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scraper")
            .field("config", &self.config)
            .field("store_enabled", &self.store.is_some())
            .finish()
    }
}

fn parse_target(url: &str) -> Result<Url, ScrapeError> {
    Url::parse(url.trim()).map_err(|e| ScrapeError::InvalidUrl(format!("{}: {}", url, e)))
}

fn failure(scrape_id: String, err: &ScrapeError, created_at: DateTime<Utc>) -> ScrapeResult {
    ScrapeResult {
        success: false,
        scrape_id,
        message: err.to_string(),
        error: Some(err.to_string()),
        error_kind: Some(err.kind()),
        record_count: None,
        columns: Vec::new(),
        preview: Vec::new(),
        pages_visited: 0,
        strategy: None,
        dataset: None,
        handle: None,
        created_at: created_at.to_rfc3339(),
    }
}

impl Scraper {
    pub fn new(config: ScraperConfig) -> Self {
        let connector = Arc::new(HttpConnector::new(config.clone()));
        Self::with_connector(config, connector)
    }

    pub fn with_connector(config: ScraperConfig, connector: Arc<dyn Connector>) -> Self {
        Self {
            config,
            connector,
            store: None,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn DatasetStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn config(&self) -> &ScraperConfig {
        &self.config
    }

    /// Fresh session; its connections are released when it drops.
    fn session(&self) -> Result<LoggingFetcher<Box<dyn Fetch>>, FetchError> {
        Ok(LoggingFetcher::new(self.connector.connect()?))
    }

    pub async fn probe(&self, url: &str) -> ProbeResult {
        let target = match parse_target(url) {
            Ok(target) => target,
            Err(e) => return ProbeResult::invalid(e.to_string()),
        };
        match self.session() {
            Ok(fetcher) => probe(&fetcher, &target).await,
            Err(e) => ProbeResult::invalid(e.to_string()),
        }
    }

    pub async fn detect(&self, url: &str) -> DetectionResult {
        let target = match parse_target(url) {
            Ok(target) => target,
            Err(e) => return DetectionResult::failed(e.to_string()),
        };
        match self.session() {
            Ok(fetcher) => detect(&fetcher, &target).await,
            Err(e) => DetectionResult::failed(e.to_string()),
        }
    }

    /// Scrape `url` end to end. Always returns a result carrying a fresh scrape id.
    pub async fn run(
        &self,
        url: &str,
        strategy: Option<ExtractionStrategy>,
        max_pages: Option<usize>,
    ) -> ScrapeResult {
        let scrape_id = Uuid::new_v4().to_string();
        let created_at = Utc::now();
        info!("Starting scrape {} for {}", scrape_id, url);

        match self.execute(&scrape_id, url, strategy, max_pages, created_at).await {
            Ok(result) => result,
            Err(err) => {
                error!("Scrape {} failed: {}", scrape_id, err);
                failure(scrape_id, &err, created_at)
            }
        }
    }

    async fn execute(
        &self,
        scrape_id: &str,
        url: &str,
        strategy: Option<ExtractionStrategy>,
        max_pages: Option<usize>,
        created_at: DateTime<Utc>,
    ) -> Result<ScrapeResult, ScrapeError> {
        let target = parse_target(url)?;
        let fetcher = self.session()?;

        // unreachable pages surface as typed fetch errors
        try_probe(&fetcher, &target).await?;

        let strategy = match strategy {
            Some(strategy) => strategy,
            None => detect(&fetcher, &target)
                .await
                .recommended_strategy
                .ok_or(ScrapeError::NoStrategyDetected)?,
        };
        info!(
            "Using {} strategy with selector '{}' (confidence {:.2})",
            strategy.kind, strategy.selector, strategy.confidence
        );

        let pages = self.config.clamp_pages(max_pages);
        let outcome = crawl(&fetcher, &target, &strategy, pages, self.config.max_rows).await;
        drop(fetcher);

        if outcome.records.is_empty() {
            warn!("Crawl of {} ended with no records ({:?})", target, outcome.termination);
            return Err(ScrapeError::NoDataExtracted);
        }

        let dataset = normalize(&outcome.records);
        if dataset.is_empty() {
            return Err(ScrapeError::NoDataExtracted);
        }

        let handle = match &self.store {
            Some(store) => {
                let stored = StoredScrape {
                    scrape_id: scrape_id.to_string(),
                    url: target.clone(),
                    strategy: strategy.clone(),
                    quality: dataset.quality(),
                    dataset: dataset.clone(),
                    pages_visited: outcome.pages_visited,
                    created_at,
                };
                match store.persist(&stored).await {
                    Ok(handle) => Some(handle),
                    Err(e) => {
                        warn!("Failed to persist scrape {}: {:#}", scrape_id, e);
                        None
                    }
                }
            }
            None => None,
        };

        info!(
            "Scrape {} finished: {} records from {} pages",
            scrape_id,
            dataset.len(),
            outcome.pages_visited
        );

        Ok(ScrapeResult {
            success: true,
            scrape_id: scrape_id.to_string(),
            message: format!(
                "Successfully scraped {} records from {} pages",
                dataset.len(),
                outcome.pages_visited
            ),
            error: None,
            error_kind: None,
            record_count: Some(dataset.len()),
            columns: dataset.columns().to_vec(),
            preview: dataset.preview(self.config.preview_rows),
            pages_visited: outcome.pages_visited,
            strategy: Some(strategy),
            dataset: Some(dataset),
            handle,
            created_at: created_at.to_rfc3339(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::store::MemoryStore;
    use crate::test_support::{StaticConnector, StaticFetcher};
    use serde_json::json;

    fn priced_page(rows: &[(&str, &str)], next: Option<&str>) -> String {
        let mut html = String::from("<html><head><title>Prices</title></head><body><table><tr><th>Name</th><th>Price</th></tr>");
        for (name, price) in rows {
            html.push_str(&format!("<tr><td>{}</td><td>{}</td></tr>", name, price));
        }
        html.push_str("</table>");
        if let Some(next) = next {
            html.push_str(&format!(r#"<a rel="next" href="{}">Next</a>"#, next));
        }
        html.push_str("</body></html>");
        html
    }

    fn build(fetcher: StaticFetcher) -> (Scraper, StaticConnector) {
        let connector = StaticConnector::new(fetcher);
        let scraper = Scraper::with_connector(ScraperConfig::default(), Arc::new(connector.clone()));
        (scraper, connector)
    }

    fn three_pages() -> StaticFetcher {
        StaticFetcher::new()
            .page("https://shop.example/1", priced_page(&[("A", "$10"), ("B", "$20")], Some("/2")))
            .page("https://shop.example/2", priced_page(&[("C", "$30")], Some("/3")))
            .page("https://shop.example/3", priced_page(&[("D", "$40")], None))
    }

    #[tokio::test]
    async fn test_single_page_run_with_detection() {
        let (scraper, connector) = build(three_pages());
        let result = scraper.run("https://shop.example/1", None, Some(1)).await;

        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.record_count, Some(2));
        assert_eq!(result.pages_visited, 1);
        assert_eq!(result.columns, vec!["Name", "Price"]);
        assert_eq!(
            serde_json::Value::Array(result.preview.iter().cloned().map(serde_json::Value::Object).collect()),
            json!([{"Name": "A", "Price": 10.0}, {"Name": "B", "Price": 20.0}])
        );
        assert!(Uuid::parse_str(&result.scrape_id).is_ok());
        assert!(result.handle.is_none());
        assert_eq!(connector.opened(), 1);
        assert_eq!(connector.live(), 0);
    }

    #[tokio::test]
    async fn test_full_crawl_and_store() {
        let store = Arc::new(MemoryStore::new());
        let (scraper, connector) = build(three_pages());
        let scraper = scraper.with_store(store.clone());

        let strategy = ExtractionStrategy::table("table");
        let result = scraper.run("https://shop.example/1", Some(strategy), None).await;

        assert!(result.success);
        assert_eq!(result.record_count, Some(4));
        assert_eq!(result.pages_visited, 3);
        // probe plus three crawled pages; no detection with a supplied strategy
        assert_eq!(connector.fetcher().requests(), 4);

        let handle = result.handle.unwrap();
        let stored = store.get(&handle.id).await.unwrap();
        assert_eq!(stored.dataset.len(), 4);
        assert_eq!(stored.pages_visited, 3);
    }

    #[tokio::test]
    async fn test_page_budget_is_clamped() {
        let mut fetcher = StaticFetcher::new();
        for i in 1..=5 {
            fetcher = fetcher.page(
                &format!("https://shop.example/{}", i),
                priced_page(&[(&format!("item{}", i), "1")], Some(&format!("/{}", i + 1))),
            );
        }
        let connector = StaticConnector::new(fetcher);
        let config = ScraperConfig {
            max_pages: 2,
            ..ScraperConfig::default()
        };
        let scraper = Scraper::with_connector(config, Arc::new(connector));

        let result = scraper.run("https://shop.example/1", Some(ExtractionStrategy::table("table")), Some(100)).await;
        assert_eq!(result.pages_visited, 2);
        assert_eq!(result.record_count, Some(2));
    }

    #[tokio::test]
    async fn test_unreachable_url_fails_fast() {
        let (scraper, connector) = build(StaticFetcher::new());
        let result = scraper.run("https://nowhere.example/", None, None).await;

        assert!(!result.success);
        assert_eq!(result.error_kind, Some(ErrorKind::Fetch));
        assert_eq!(result.message, "HTTP 404: Not Found");
        assert!(!result.scrape_id.is_empty());
        assert_eq!(connector.fetcher().requests(), 1);
        assert_eq!(connector.live(), 0);
    }

    #[tokio::test]
    async fn test_network_failure_is_a_fetch_error() {
        let (scraper, connector) = build(StaticFetcher::new().failing("https://down.example/"));
        let result = scraper.run("https://down.example/", None, None).await;

        assert!(!result.success);
        assert_eq!(result.error_kind, Some(ErrorKind::Fetch));
        assert!(result.message.starts_with("Failed to fetch URL"));
        assert_eq!(connector.live(), 0);
    }

    #[tokio::test]
    async fn test_malformed_url_opens_no_session() {
        let (scraper, connector) = build(StaticFetcher::new());
        let result = scraper.run("not a url", None, None).await;

        assert!(!result.success);
        assert_eq!(result.error_kind, Some(ErrorKind::InvalidUrl));
        assert_eq!(connector.opened(), 0);
    }

    #[tokio::test]
    async fn test_no_structure_detected() {
        let fetcher = StaticFetcher::new().page("https://example.com/", "<html><body><p>Just prose.</p></body></html>");
        let (scraper, connector) = build(fetcher);
        let result = scraper.run("https://example.com/", None, None).await;

        assert!(!result.success);
        assert_eq!(result.error_kind, Some(ErrorKind::NoStrategyDetected));
        assert_eq!(result.message, "No suitable data structure detected");
        assert_eq!(connector.live(), 0);
    }

    #[tokio::test]
    async fn test_no_data_extracted() {
        let (scraper, _) = build(three_pages());
        let strategy = ExtractionStrategy::repeated_sections(".card");
        let result = scraper.run("https://shop.example/1", Some(strategy), None).await;
        assert_eq!(result.error_kind, Some(ErrorKind::NoDataExtracted));
        assert_eq!(result.message, "No data extracted");

        let (scraper, _) = build(three_pages());
        let result = scraper.run("https://shop.example/1", Some(ExtractionStrategy::list_items(".missing")), None).await;
        assert_eq!(result.error_kind, Some(ErrorKind::NoDataExtracted));
    }

    #[tokio::test]
    async fn test_probe_and_detect_sessions() {
        let (scraper, connector) = build(three_pages());

        let probed = scraper.probe("https://shop.example/1").await;
        assert!(probed.valid);
        assert_eq!(probed.title.as_deref(), Some("Prices"));
        assert_eq!(probed.tables_found, Some(1));

        let detected = scraper.detect("https://shop.example/1").await;
        assert!(detected.success);
        assert_eq!(detected.recommended_strategy.unwrap().estimated_rows, Some(3));

        assert!(!scraper.probe("::").await.valid);
        assert_eq!(connector.opened(), 2);
        assert_eq!(connector.live(), 0);
    }
}
