use crate::admission::KeyedAdmission;
use crate::barrier::{Arrival, LevelBarrier};
use crate::config::CrawlerConfig;
use crate::document::{Document, Downloader};
use crate::error::{ExtractError, PageError, Result, ScanError};
use crate::host::host_of;
use crate::pool::WorkerPool;
use crate::result::CrawlResult;
use dashmap::{DashMap, DashSet};
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Called with `(level, url)` right before an address is fetched.
pub type ProgressCallback = Arc<dyn Fn(usize, String) + Send + Sync>;

/// Breadth-first crawler with separate fetch and extraction pools.
///
/// Fetches go through a [`KeyedAdmission`] keyed by host, so no host sees
/// more than `per_host` concurrent requests. Extraction runs on its own pool.
/// Each call to [`download`](WebCrawler::download) owns its own visited set
/// and result containers; the pools are shared across calls.
pub struct WebCrawler {
    downloader: Arc<dyn Downloader>,
    fetchers: KeyedAdmission<String>,
    extractors: Arc<WorkerPool>,
    progress_callback: Option<ProgressCallback>,
}

/// Where a fetched address stands once its fetch task is done.
enum Stage {
    Failed(PageError),
    Fetched(Box<dyn Document>),
}

/// Per-traversal state shared with the workers.
struct Run {
    excludes: Vec<String>,
    visited: DashSet<String>,
    downloaded: Mutex<Vec<String>>,
    errors: DashMap<String, Arc<PageError>>,
    aborted: Mutex<Vec<String>>,
    next: Mutex<Vec<String>>,
}

impl Run {
    fn new(excludes: &HashSet<String>) -> Self {
        Self {
            excludes: excludes.iter().cloned().collect(),
            visited: DashSet::new(),
            downloaded: Mutex::new(Vec::new()),
            errors: DashMap::new(),
            aborted: Mutex::new(Vec::new()),
            next: Mutex::new(Vec::new()),
        }
    }

    fn is_excluded(&self, url: &str) -> bool {
        self.excludes.iter().any(|pattern| url.contains(pattern.as_str()))
    }

    /// Exclusion check plus atomic visited insert. True if `url` should be
    /// fetched.
    fn admit(&self, url: &str) -> bool {
        !self.is_excluded(url) && self.visited.insert(url.to_string())
    }

    fn record_error(&self, url: &str, error: PageError) {
        warn!("Crawl error for {}: {}", url, error);
        self.errors.insert(url.to_string(), Arc::new(error));
    }

    async fn snapshot(&self, seed: &str) -> CrawlResult {
        CrawlResult {
            seed: seed.to_string(),
            downloaded: self.downloaded.lock().await.clone(),
            errors: self
                .errors
                .iter()
                .map(|entry| (entry.key().clone(), entry.value().clone()))
                .collect(),
            aborted: self.aborted.lock().await.clone(),
        }
    }
}

impl WebCrawler {
    /// Starts both worker pools. Must be called inside a tokio runtime.
    pub fn new(
        downloader: Arc<dyn Downloader>,
        downloaders: usize,
        extractors: usize,
        per_host: usize,
    ) -> Self {
        let fetchers = KeyedAdmission::new(WorkerPool::new("fetch", downloaders), per_host);
        info!(
            "Starting crawler with {} downloaders, {} extractors, {} per host",
            downloaders,
            extractors,
            fetchers.bound()
        );
        Self {
            downloader,
            fetchers,
            extractors: Arc::new(WorkerPool::new("extract", extractors)),
            progress_callback: None,
        }
    }

    pub fn from_config(downloader: Arc<dyn Downloader>, config: &CrawlerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(
            downloader,
            config.downloaders,
            config.extractors,
            config.per_host,
        ))
    }

    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    /// [`download`](WebCrawler::download) without excludes.
    pub async fn download_all(&self, seed: &str, depth: usize) -> CrawlResult {
        self.download(seed, depth, &HashSet::new()).await
    }

    /// Crawls `depth` levels starting at `seed`. Level 0 is the seed itself,
    /// so `depth = 1` fetches only the seed and `depth = 0` fetches nothing.
    ///
    /// Addresses containing any of `excludes` are skipped wherever they are
    /// met. Never fails: per-page failures are collected in the result.
    pub async fn download(
        &self,
        seed: &str,
        depth: usize,
        excludes: &HashSet<String>,
    ) -> CrawlResult {
        info!("Starting crawl of {} to depth {}", seed, depth);

        let run = Arc::new(Run::new(excludes));
        let mut frontier = Vec::new();
        if run.admit(seed) {
            frontier.push(seed.to_string());
        } else {
            debug!("Seed {} is excluded", seed);
        }

        for level in 0..depth {
            if frontier.is_empty() {
                break;
            }
            info!("Level {}: {} addresses", level, frontier.len());

            let barrier = LevelBarrier::arm(frontier.len() + 1);
            for url in frontier.drain(..) {
                let arrival = Arrival::new(&barrier);
                self.submit_fetch(&run, level, url, arrival).await;
            }
            barrier.arrive_and_wait().await;

            frontier = std::mem::take(&mut *run.next.lock().await);
        }

        let result = run.snapshot(seed).await;
        info!(
            "Crawl of {} complete. Downloaded {} pages, {} errors",
            seed,
            result.downloaded.len(),
            result.errors.len()
        );
        result
    }

    async fn submit_fetch(&self, run: &Arc<Run>, level: usize, url: String, arrival: Arrival) {
        let host = match host_of(&url) {
            Ok(host) => host,
            Err(source) => {
                run.record_error(
                    &url,
                    PageError::InvalidUrl {
                        url: url.clone(),
                        source,
                    },
                );
                return;
            }
        };

        let task = {
            let run = run.clone();
            let url = url.clone();
            let downloader = self.downloader.clone();
            let extractors = self.extractors.clone();
            let progress = self.progress_callback.clone();

            async move {
                if let Some(ref callback) = progress {
                    callback(level, url.clone());
                }
                let stage = match downloader.download(&url).await {
                    Ok(document) => Stage::Fetched(document),
                    Err(e) => Stage::Failed(PageError::Fetch(e)),
                };
                Self::advance(run, &extractors, url, stage, arrival).await;
            }
        };

        // A rejected task is dropped together with its arrival, so the level
        // still settles.
        if let Err(e) = self.fetchers.submit(task, host) {
            warn!("Fetch of {} not scheduled: {}", url, e);
            run.aborted.lock().await.push(url);
        }
    }

    /// Consumes a fetch outcome. The arrival either drops here or moves into
    /// the extraction job.
    async fn advance(
        run: Arc<Run>,
        extractors: &WorkerPool,
        url: String,
        stage: Stage,
        arrival: Arrival,
    ) {
        match stage {
            Stage::Failed(error) => {
                run.record_error(&url, error);
                drop(arrival);
            }
            Stage::Fetched(document) => {
                run.downloaded.lock().await.push(url.clone());

                let page = url.clone();
                let job = Box::pin(async move {
                    let links = document.extract_links();
                    Self::expand(&run, &page, links).await;
                    drop(arrival);
                });
                if extractors.submit(job).is_err() {
                    warn!("Extraction of {} not scheduled: pool is shut down", url);
                }
            }
        }
    }

    async fn expand(run: &Run, url: &str, links: std::result::Result<Vec<String>, ExtractError>) {
        match links {
            Ok(links) => {
                let found = links.len();
                let admitted: Vec<String> = links.into_iter().filter(|l| run.admit(l)).collect();
                debug!("{}: {} links, {} new", url, found, admitted.len());
                if !admitted.is_empty() {
                    run.next.lock().await.extend(admitted);
                }
            }
            Err(e) => run.record_error(url, PageError::Extract(e)),
        }
    }

    /// Stops accepting work on both pools without waiting.
    pub fn shutdown(&self) {
        self.fetchers.shutdown();
        self.extractors.shutdown();
    }

    /// Shuts both pools down and waits until every worker has exited.
    pub async fn close(&self) -> Result<()> {
        self.close_with(std::future::pending()).await
    }

    /// [`close`](WebCrawler::close), watching `interrupt` while waiting.
    ///
    /// An interrupt does not cut the wait short; it is reported as
    /// [`ScanError::Interrupted`] once everything has drained. Signal
    /// handling belongs to the caller.
    pub async fn close_with<F>(&self, interrupt: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        self.shutdown();

        let drained = async {
            self.fetchers.terminated().await;
            self.extractors.terminated().await;
        };
        tokio::pin!(drained);
        tokio::pin!(interrupt);

        let mut interrupted = false;
        loop {
            tokio::select! {
                biased;
                _ = &mut interrupt, if !interrupted => {
                    warn!("Interrupted while closing crawler; waiting for workers to finish");
                    interrupted = true;
                }
                _ = &mut drained => break,
            }
        }

        debug!("Crawler closed");
        if interrupted {
            Err(ScanError::Interrupted)
        } else {
            Ok(())
        }
    }
}
