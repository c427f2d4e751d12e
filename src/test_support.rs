//! In-memory fetchers shared by the unit tests.

use crate::error::FetchError;
use crate::fetch::{Connector, Document, Fetch, RawPage};
use futures::future::BoxFuture;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use url::Url;

pub fn url(s: &str) -> Url {
    Url::parse(s).unwrap()
}

pub fn doc(page_url: &str, html: &str) -> Document {
    Document::from_html(url(page_url), 200, html)
}

fn key(s: &str) -> String {
    url(s).to_string()
}

/// Serves canned pages; unknown URLs answer 404.
#[derive(Clone, Default)]
pub struct StaticFetcher {
    pages: Arc<HashMap<String, String>>,
    failing: Arc<HashSet<String>>,
    requests: Arc<AtomicUsize>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, page_url: &str, html: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.pages).insert(key(page_url), html.into());
        self
    }

    /// Fail `page_url` with a network error.
    pub fn failing(mut self, page_url: &str) -> Self {
        Arc::make_mut(&mut self.failing).insert(key(page_url));
        self
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl Fetch for StaticFetcher {
    fn fetch<'a>(&'a self, url: &'a Url) -> BoxFuture<'a, Result<RawPage, FetchError>> {
        Box::pin(async move {
            self.requests.fetch_add(1, Ordering::SeqCst);
            let k = url.to_string();
            if self.failing.contains(&k) {
                return Err(FetchError::Network(format!("connection refused: {}", url)));
            }
            match self.pages.get(&k) {
                Some(body) => Ok(RawPage {
                    url: url.clone(),
                    status: 200,
                    body: body.clone(),
                }),
                None => Err(FetchError::Status {
                    status: 404,
                    reason: "Not Found".to_string(),
                }),
            }
        })
    }
}

/// Hands out [`StaticFetcher`] sessions and tracks how many are still open.
#[derive(Clone, Default)]
pub struct StaticConnector {
    fetcher: StaticFetcher,
    opened: Arc<AtomicUsize>,
    live: Arc<AtomicUsize>,
}

impl StaticConnector {
    pub fn new(fetcher: StaticFetcher) -> Self {
        Self {
            fetcher,
            ..Self::default()
        }
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn fetcher(&self) -> &StaticFetcher {
        &self.fetcher
    }
}

struct Session {
    fetcher: StaticFetcher,
    live: Arc<AtomicUsize>,
}

impl Drop for Session {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Fetch for Session {
    fn fetch<'a>(&'a self, url: &'a Url) -> BoxFuture<'a, Result<RawPage, FetchError>> {
        self.fetcher.fetch(url)
    }
}

impl Connector for StaticConnector {
    fn connect(&self) -> Result<Box<dyn Fetch>, FetchError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        self.live.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(Session {
            fetcher: self.fetcher.clone(),
            live: self.live.clone(),
        }))
    }
}
