use crate::error::{Result, ScanError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const DEFAULT_USER_AGENT: &str = "Trawl/0.1 (https://github.com/trapdoorsec/trawl)";

/// Crawler tuning knobs. Every field has a default, so a JSON file only
/// needs the keys it wants to change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Fetch workers.
    pub downloaders: usize,
    /// Link extraction workers.
    pub extractors: usize,
    /// Concurrent fetches allowed against one host.
    pub per_host: usize,
    pub timeout_secs: u64,
    pub max_redirects: usize,
    pub user_agent: String,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            downloaders: 10,
            extractors: 4,
            per_host: 2,
            timeout_secs: 10,
            max_redirects: 5,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl CrawlerConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.downloaders == 0 {
            return Err(ScanError::Config("downloaders must be at least 1".to_string()));
        }
        if self.extractors == 0 {
            return Err(ScanError::Config("extractors must be at least 1".to_string()));
        }
        if self.per_host == 0 {
            return Err(ScanError::Config("per_host must be at least 1".to_string()));
        }
        if self.timeout_secs == 0 {
            return Err(ScanError::Config("timeout_secs must be at least 1".to_string()));
        }
        Ok(())
    }
}
