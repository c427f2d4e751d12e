use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_USER_AGENT: &str = "ScrapeEase/1.0 (Web Scraping Platform)";

/// Tunables for fetching, crawling and result shaping.
#[derive(Debug, Clone)]
pub struct ScraperConfig {
    /// Hard ceiling on pages visited by one crawl.
    pub max_pages: usize,
    /// Page budget used when the caller does not supply one.
    pub default_pages: usize,
    pub request_timeout: Duration,
    /// Retries after the first attempt; 0 disables retrying.
    pub max_retries: u32,
    pub retry_initial_interval: Duration,
    pub retry_max_interval: Duration,
    pub max_connections: usize,
    pub max_connections_per_host: usize,
    pub user_agent: String,
    /// Extra PEM root certificate trusted by the HTTP client.
    pub ca_cert: Option<PathBuf>,
    pub preview_rows: usize,
    /// Upper bound on raw records accumulated by one crawl.
    pub max_rows: usize,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            max_pages: 50,
            default_pages: 10,
            request_timeout: Duration::from_secs(30),
            max_retries: 3,
            retry_initial_interval: Duration::from_millis(200),
            retry_max_interval: Duration::from_secs(2),
            max_connections: 10,
            max_connections_per_host: 5,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            ca_cert: None,
            preview_rows: 5,
            max_rows: 10_000,
        }
    }
}

impl ScraperConfig {
    /// Defaults overlaid with `SCRAPER_*` environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_pages: env_or("SCRAPER_MAX_PAGES", defaults.max_pages),
            default_pages: env_or("SCRAPER_DEFAULT_PAGES", defaults.default_pages),
            request_timeout: Duration::from_secs(env_or(
                "SCRAPER_REQUEST_TIMEOUT_SECS",
                defaults.request_timeout.as_secs(),
            )),
            max_retries: env_or("SCRAPER_MAX_RETRIES", defaults.max_retries),
            retry_initial_interval: Duration::from_millis(env_or(
                "SCRAPER_RETRY_INITIAL_MS",
                defaults.retry_initial_interval.as_millis() as u64,
            )),
            retry_max_interval: Duration::from_millis(env_or(
                "SCRAPER_RETRY_MAX_MS",
                defaults.retry_max_interval.as_millis() as u64,
            )),
            max_connections: env_or("SCRAPER_MAX_CONNECTIONS", defaults.max_connections),
            max_connections_per_host: env_or(
                "SCRAPER_MAX_CONNECTIONS_PER_HOST",
                defaults.max_connections_per_host,
            ),
            user_agent: env::var("SCRAPER_USER_AGENT").unwrap_or(defaults.user_agent),
            ca_cert: env::var("SCRAPER_CA_CERT").ok().map(PathBuf::from),
            preview_rows: env_or("SCRAPER_PREVIEW_ROWS", defaults.preview_rows),
            max_rows: env_or("SCRAPER_MAX_ROWS", defaults.max_rows),
        }
    }

    /// Resolve a caller-supplied page budget against the configured ceiling.
    pub fn clamp_pages(&self, requested: Option<usize>) -> usize {
        let ceiling = self.max_pages.max(1);
        requested
            .unwrap_or(self.default_pages)
            .clamp(1, ceiling)
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => match raw.trim().parse::<T>() {
            Ok(v) => v,
            Err(_) => {
                warn!("Ignoring unparsable {}={:?}, using default", key, raw);
                default
            }
        },
        Err(_) => default,
    }
}
