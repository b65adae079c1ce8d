use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tracing::{info, warn};
use trawl_scanner::crawler::ProgressCallback;
use trawl_scanner::{CrawlResult, CrawlerConfig, Downloader, HttpDownloader, WebCrawler};
use url::Url;

/// Options for configuring a crawl operation
#[derive(Debug, Clone)]
pub struct CrawlOptions {
    pub urls: Vec<String>,
    /// Levels to fetch per seed; the seed itself is level 0.
    pub depth: usize,
    /// Substrings; any address containing one is skipped.
    pub excludes: Vec<String>,
    pub config: CrawlerConfig,
    pub show_progress_bars: bool,
}

/// Callback for reporting crawl progress
pub type CrawlProgressCallback = Arc<dyn Fn(String) + Send + Sync>;

/// One seed's traversal together with how it was run.
#[derive(Debug, Clone)]
pub struct HostCrawl {
    pub result: CrawlResult,
    pub depth: usize,
    pub elapsed: Duration,
}

impl HostCrawl {
    pub fn seed(&self) -> &str {
        &self.result.seed
    }
}

/// Extract the path component from a URL
pub fn extract_url_path(url: &str) -> String {
    Url::parse(url)
        .ok()
        .map(|u| {
            let path = u.path().to_string();
            if path.is_empty() || path == "/" {
                "/".to_string()
            } else {
                path
            }
        })
        .unwrap_or_else(|| url.to_string())
}

/// Crawl every seed in `options` over HTTP.
pub async fn execute_crawl<F>(
    options: CrawlOptions,
    progress_callback: Option<CrawlProgressCallback>,
    interrupt: F,
) -> Result<Vec<HostCrawl>, String>
where
    F: Future<Output = ()>,
{
    let downloader = HttpDownloader::from_config(&options.config)
        .map_err(|e| format!("Failed to build HTTP client: {}", e))?;
    execute_crawl_with(options, Arc::new(downloader), progress_callback, interrupt).await
}

/// Crawl every seed in `options` with the given downloader.
///
/// Seeds are crawled one after another on a single crawler, so the worker
/// pools and per-host limits are shared, while each seed gets its own
/// visited set. The crawler is closed before returning; if `interrupt`
/// fires while it drains, the whole crawl is reported as aborted.
pub async fn execute_crawl_with<F>(
    options: CrawlOptions,
    downloader: Arc<dyn Downloader>,
    progress_callback: Option<CrawlProgressCallback>,
    interrupt: F,
) -> Result<Vec<HostCrawl>, String>
where
    F: Future<Output = ()>,
{
    let CrawlOptions {
        urls,
        depth,
        excludes,
        config,
        show_progress_bars,
    } = options;

    if urls.is_empty() {
        return Err("No URLs to crawl".to_string());
    }

    let progress_bar = if show_progress_bars {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
            pb.set_style(style);
        }
        pb.enable_steady_tick(Duration::from_millis(100));
        pb.set_message("Starting crawl...");
        Some(pb)
    } else {
        None
    };

    let fetched = Arc::new(AtomicUsize::new(0));
    let internal_progress_callback: ProgressCallback = {
        let pb = progress_bar.clone();
        let count = fetched.clone();
        Arc::new(move |level: usize, url: String| {
            let n = count.fetch_add(1, Ordering::Relaxed) + 1;
            if let Some(ref pb) = pb {
                pb.set_message(format!(
                    "Level {} | {} fetched | {}",
                    level,
                    n,
                    extract_url_path(&url)
                ));
            }
        })
    };

    let crawler = WebCrawler::from_config(downloader, &config)
        .map_err(|e| format!("Invalid crawler configuration: {}", e))?
        .with_progress_callback(internal_progress_callback);
    let excludes: HashSet<String> = excludes.into_iter().collect();

    let mut crawls = Vec::with_capacity(urls.len());
    for (idx, url) in urls.iter().enumerate() {
        if let Some(ref callback) = progress_callback
            && urls.len() > 1
        {
            callback(format!("Crawling host {}/{}: {}", idx + 1, urls.len(), url));
        }

        let started = Instant::now();
        let result = crawler.download(url, depth, &excludes).await;

        if let Some(ref callback) = progress_callback
            && !result.errors.is_empty()
        {
            callback(format!(
                "[!]  {} of {} addresses failed under {}",
                result.errors.len(),
                result.downloaded.len() + result.errors.len(),
                url
            ));
        }

        crawls.push(HostCrawl {
            result,
            depth,
            elapsed: started.elapsed(),
        });
    }

    if let Some(ref pb) = progress_bar {
        let total = fetched.load(Ordering::Relaxed);
        pb.finish_with_message(format!("Crawl complete! {} URLs fetched", total));
    }

    if let Err(e) = crawler.close_with(interrupt).await {
        warn!("Crawler did not close cleanly: {}", e);
        return Err(format!("Crawl aborted: {}", e));
    }

    info!("Crawled {} seeds", crawls.len());
    Ok(crawls)
}
