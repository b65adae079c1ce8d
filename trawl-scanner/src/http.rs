use crate::config::CrawlerConfig;
use crate::document::{Document, Downloader};
use crate::error::{ExtractError, FetchError, Result};
use async_trait::async_trait;
use reqwest::Client;
use scraper::{Html, Selector};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// [`Downloader`] backed by a pooled reqwest client.
#[derive(Debug, Clone)]
pub struct HttpDownloader {
    client: Client,
}

impl HttpDownloader {
    pub fn new() -> Result<Self> {
        Self::from_config(&CrawlerConfig::default())
    }

    pub fn from_config(config: &CrawlerConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(timeout)
            .connect_timeout(timeout / 2)
            .pool_max_idle_per_host(config.per_host.max(1))
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Downloader for HttpDownloader {
    async fn download(&self, url: &str) -> std::result::Result<Box<dyn Document>, FetchError> {
        debug!("Fetching {}", url);

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        // Links resolve against where redirects ended up, not where we started.
        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let body = response.text().await?;

        Ok(Box::new(HtmlDocument::new(final_url, content_type, body)))
    }
}

/// A fetched page. Parsing is deferred to [`Document::extract_links`] so the
/// expensive part runs on the extraction pool.
#[derive(Debug, Clone)]
pub struct HtmlDocument {
    url: String,
    content_type: Option<String>,
    body: String,
}

impl HtmlDocument {
    pub fn new(url: String, content_type: Option<String>, body: String) -> Self {
        Self {
            url,
            content_type,
            body,
        }
    }

    pub fn is_html(&self) -> bool {
        self.content_type
            .as_ref()
            .map(|ct| ct.contains("text/html") || ct.contains("application/xhtml+xml"))
            .unwrap_or(false)
    }
}

impl Document for HtmlDocument {
    fn extract_links(&self) -> std::result::Result<Vec<String>, ExtractError> {
        if !self.is_html() {
            return Ok(Vec::new());
        }

        let base = Url::parse(&self.url).map_err(|source| ExtractError::InvalidBase {
            url: self.url.clone(),
            source,
        })?;
        let selector =
            Selector::parse("a[href]").map_err(|e| ExtractError::Parse(e.to_string()))?;

        let document = Html::parse_document(&self.body);
        let links: Vec<String> = document
            .select(&selector)
            .filter_map(|element| element.value().attr("href"))
            .filter_map(|href| resolve_url(&base, href))
            .collect();

        debug!("Found {} links on {}", links.len(), self.url);
        Ok(links)
    }
}

/// Resolves `href` against `base`, dropping the fragment. Returns `None` for
/// hrefs that do not point at another document.
pub fn resolve_url(base: &Url, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty()
        || href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with('#')
    {
        return None;
    }

    let mut resolved = base.join(href).ok()?;
    resolved.set_fragment(None);
    Some(resolved.to_string())
}
