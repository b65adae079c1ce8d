use crate::error::PageError;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Outcome of one traversal. Built once the last level settled and never
/// mutated afterwards.
#[derive(Debug, Clone, Default)]
pub struct CrawlResult {
    pub seed: String,
    /// Successfully fetched addresses, in completion order.
    pub downloaded: Vec<String>,
    /// Last failure recorded per address.
    pub errors: HashMap<String, Arc<PageError>>,
    /// Addresses dropped because the crawler was shutting down. They appear
    /// in neither `downloaded` nor `errors`.
    pub aborted: Vec<String>,
}

impl CrawlResult {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && self.aborted.is_empty()
    }

    /// Error messages keyed by address, sorted for stable output.
    pub fn error_messages(&self) -> BTreeMap<String, String> {
        self.errors
            .iter()
            .map(|(url, error)| (url.clone(), error.to_string()))
            .collect()
    }
}
