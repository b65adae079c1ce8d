use crate::error::{ExtractError, FetchError};
use async_trait::async_trait;

/// Turns an address into a document. Called concurrently from many workers.
#[async_trait]
pub trait Downloader: Send + Sync {
    async fn download(&self, url: &str) -> Result<Box<dyn Document>, FetchError>;
}

/// A fetched document that can list the addresses it links to.
pub trait Document: Send {
    fn extract_links(&self) -> Result<Vec<String>, ExtractError>;
}
