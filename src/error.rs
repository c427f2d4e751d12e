use serde::{Deserialize, Serialize};

/// Failure to obtain a document.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchError {
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("HTTP {status}: {reason}")]
    Status { status: u16, reason: String },

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Failed to fetch URL: {0}")]
    Network(String),

    #[error("Failed to read response body: {0}")]
    Body(String),
}

impl FetchError {
    pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout(err.to_string())
        } else {
            FetchError::Network(err.to_string())
        }
    }

    /// Whether another attempt could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Status { status, .. } => *status >= 500,
            FetchError::Timeout(_) | FetchError::Network(_) | FetchError::Body(_) => true,
            FetchError::InvalidUrl { .. } => false,
        }
    }
}

/// Failure to pull records out of one parsed page.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ExtractError {
    #[error("No elements found with selector: {0}")]
    SelectorNotFound(String),

    #[error("Invalid CSS selector '{selector}': {reason}")]
    InvalidSelector { selector: String, reason: String },

    #[error("Strategy type {0} has no page extractor")]
    Unsupported(String),
}

/// Failures surfaced at the orchestrator boundary.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ScrapeError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error("No suitable data structure detected")]
    NoStrategyDetected,

    #[error("No data extracted")]
    NoDataExtracted,

    #[error("Normalization failed: {0}")]
    Normalization(String),
}

/// Coarse classification a caller can branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidUrl,
    Fetch,
    SelectorNotFound,
    NoStrategyDetected,
    NoDataExtracted,
    Normalization,
}

impl ScrapeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ScrapeError::InvalidUrl(_) => ErrorKind::InvalidUrl,
            ScrapeError::Fetch(FetchError::InvalidUrl { .. }) => ErrorKind::InvalidUrl,
            ScrapeError::Fetch(_) => ErrorKind::Fetch,
            ScrapeError::Extract(_) => ErrorKind::SelectorNotFound,
            ScrapeError::NoStrategyDetected => ErrorKind::NoStrategyDetected,
            ScrapeError::NoDataExtracted => ErrorKind::NoDataExtracted,
            ScrapeError::Normalization(_) => ErrorKind::Normalization,
        }
    }
}
