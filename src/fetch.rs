use crate::config::ScraperConfig;
use crate::error::FetchError;
use anyhow::Context;
use backoff::future::retry;
use backoff::ExponentialBackoffBuilder;
use futures::future::BoxFuture;
use reqwest::Client;
use scraper::{Html, Selector};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use url::Url;

/// Body and status of one successful GET.
#[derive(Debug, Clone)]
pub struct RawPage {
    pub url: Url,
    pub status: u16,
    pub body: String,
}

/// Parsed, read-only view of one fetched page.
///
/// `Html` is not `Send`, so a `Document` is built and dropped between
/// suspension points, never held across one.
pub struct Document {
    pub url: Url,
    pub status: u16,
    pub html: Html,
    pub title: Option<String>,
}

impl Document {
    pub fn parse(page: RawPage) -> Self {
        Self::from_html(page.url, page.status, &page.body)
    }

    pub fn from_html(url: Url, status: u16, body: &str) -> Self {
        let html = Html::parse_document(body);
        let title = Selector::parse("title").ok().and_then(|sel| {
            html.select(&sel)
                .next()
                .map(|el| el.text().collect::<String>().trim().to_string())
                .filter(|t| !t.is_empty())
        });
        Self { url, status, html, title }
    }
}

/// Single-document fetch capability.
pub trait Fetch: Send + Sync {
    fn fetch<'a>(&'a self, url: &'a Url) -> BoxFuture<'a, Result<RawPage, FetchError>>;
}

impl<F: Fetch + ?Sized> Fetch for Box<F> {
    fn fetch<'a>(&'a self, url: &'a Url) -> BoxFuture<'a, Result<RawPage, FetchError>> {
        (**self).fetch(url)
    }
}

impl<F: Fetch + ?Sized> Fetch for Arc<F> {
    fn fetch<'a>(&'a self, url: &'a Url) -> BoxFuture<'a, Result<RawPage, FetchError>> {
        (**self).fetch(url)
    }
}

/// Opens a fresh fetch session; the session's connections die with it.
pub trait Connector: Send + Sync {
    fn connect(&self) -> Result<Box<dyn Fetch>, FetchError>;
}

pub struct HttpConnector {
    config: ScraperConfig,
}

impl HttpConnector {
    pub fn new(config: ScraperConfig) -> Self {
        Self { config }
    }
}

impl Connector for HttpConnector {
    fn connect(&self) -> Result<Box<dyn Fetch>, FetchError> {
        let fetcher = HttpFetcher::new(&self.config)
            .map_err(|e| FetchError::Network(format!("{:#}", e)))?;
        Ok(Box::new(fetcher))
    }
}

pub fn build_http_client(config: &ScraperConfig) -> anyhow::Result<Client> {
    let mut builder = Client::builder()
        .timeout(config.request_timeout)
        .redirect(reqwest::redirect::Policy::limited(10))
        .pool_max_idle_per_host(config.max_connections_per_host)
        .user_agent(config.user_agent.clone());

    if let Some(cert_path) = &config.ca_cert {
        let pem = std::fs::read(cert_path)
            .with_context(|| format!("Failed to read TLS CA certificate at {}", cert_path.display()))?;
        let cert = reqwest::Certificate::from_pem(&pem)
            .with_context(|| format!("Failed to parse TLS CA certificate at {}", cert_path.display()))?;
        info!("Loaded TLS CA certificate from {}", cert_path.display());
        builder = builder.add_root_certificate(cert);
    }

    builder.build().context("Failed to build HTTP client")
}

/// reqwest-backed fetcher with bounded connections and retry on transient failures.
pub struct HttpFetcher {
    client: Client,
    total_permits: Arc<Semaphore>,
    host_permits: Mutex<HashMap<String, Arc<Semaphore>>>,
    per_host_limit: usize,
    max_retries: u32,
    retry_initial_interval: std::time::Duration,
    retry_max_interval: std::time::Duration,
}

impl HttpFetcher {
    pub fn new(config: &ScraperConfig) -> anyhow::Result<Self> {
        Ok(Self::with_client(build_http_client(config)?, config))
    }

    /// Use an already configured client; limits and retry come from `config`.
    pub fn with_client(client: Client, config: &ScraperConfig) -> Self {
        Self {
            client,
            total_permits: Arc::new(Semaphore::new(config.max_connections.max(1))),
            host_permits: Mutex::new(HashMap::new()),
            per_host_limit: config.max_connections_per_host.max(1),
            max_retries: config.max_retries,
            retry_initial_interval: config.retry_initial_interval,
            retry_max_interval: config.retry_max_interval,
        }
    }

    fn permits_for_host(&self, url: &Url) -> Arc<Semaphore> {
        let host = url.host_str().unwrap_or_default().to_string();
        let mut hosts = self
            .host_permits
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        hosts
            .entry(host)
            .or_insert_with(|| Arc::new(Semaphore::new(self.per_host_limit)))
            .clone()
    }

    async fn fetch_once(&self, url: &Url) -> Result<RawPage, FetchError> {
        let closed = |_| FetchError::Network("connection pool closed".to_string());
        let _total = self.total_permits.acquire().await.map_err(closed)?;
        let host_permits = self.permits_for_host(url);
        let _host = host_permits.acquire().await.map_err(closed)?;

        let response = self
            .client
            .get(url.clone())
            .header("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8")
            .header("Accept-Language", "en-US,en;q=0.5")
            .send()
            .await
            .map_err(FetchError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("Unknown").to_string(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Body(e.to_string()))?;

        Ok(RawPage {
            url: url.clone(),
            status: status.as_u16(),
            body,
        })
    }
}

impl Fetch for HttpFetcher {
    fn fetch<'a>(&'a self, url: &'a Url) -> BoxFuture<'a, Result<RawPage, FetchError>> {
        Box::pin(async move {
            if url.scheme() != "http" && url.scheme() != "https" {
                return Err(FetchError::InvalidUrl {
                    url: url.to_string(),
                    reason: "URL must use HTTP or HTTPS protocol".to_string(),
                });
            }

            let policy = ExponentialBackoffBuilder::new()
                .with_initial_interval(self.retry_initial_interval)
                .with_max_interval(self.retry_max_interval)
                .with_max_elapsed_time(None)
                .build();
            let attempts = AtomicU32::new(0);
            let attempts = &attempts;
            let max_retries = self.max_retries;

            retry(policy, move || async move {
                let attempt = attempts.fetch_add(1, Ordering::SeqCst);
                match self.fetch_once(url).await {
                    Ok(page) => Ok(page),
                    Err(err) if err.is_transient() && attempt < max_retries => {
                        warn!("Fetch attempt {} for {} failed, retrying: {}", attempt + 1, url, err);
                        Err(backoff::Error::transient(err))
                    }
                    Err(err) => Err(backoff::Error::permanent(err)),
                }
            })
            .await
        })
    }
}

/// Request-logging interceptor around any fetcher.
pub struct LoggingFetcher<F> {
    inner: F,
}

impl<F: Fetch> LoggingFetcher<F> {
    pub fn new(inner: F) -> Self {
        Self { inner }
    }
}

impl<F: Fetch> Fetch for LoggingFetcher<F> {
    fn fetch<'a>(&'a self, url: &'a Url) -> BoxFuture<'a, Result<RawPage, FetchError>> {
        Box::pin(async move {
            let started = Instant::now();
            let result = self.inner.fetch(url).await;
            let elapsed_ms = started.elapsed().as_millis();
            match &result {
                Ok(page) => debug!(
                    "GET {} -> {} ({} bytes, {}ms)",
                    url,
                    page.status,
                    page.body.len(),
                    elapsed_ms
                ),
                Err(e) => warn!("GET {} failed after {}ms: {}", url, elapsed_ms, e),
            }
            result
        })
    }
}
