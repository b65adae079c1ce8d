use thiserror::Error;

/// Engine-level failures. Per-page failures never surface here, they are
/// collected into [`crate::CrawlResult::errors`] as [`PageError`].
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Task rejected: crawler is shutting down")]
    Rejected,

    #[error("Interrupted while waiting for workers to terminate")]
    Interrupted,

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Failure of the fetch capability for a single address.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Failure while extracting links from an already fetched document.
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Cannot resolve links against {url}: {source}")]
    InvalidBase {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Parse error: {0}")]
    Parse(String),
}

/// What the error map records for an address.
#[derive(Error, Debug)]
pub enum PageError {
    #[error("Invalid URL {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Link extraction failed: {0}")]
    Extract(#[from] ExtractError),
}

impl PageError {
    /// Short label used by reports.
    pub fn kind(&self) -> &'static str {
        match self {
            PageError::InvalidUrl { .. } => "invalid-url",
            PageError::Fetch(_) => "fetch",
            PageError::Extract(_) => "extract",
        }
    }
}

pub type Result<T> = std::result::Result<T, ScanError>;
