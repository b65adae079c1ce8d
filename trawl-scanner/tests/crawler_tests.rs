// Tests for the level-synchronized crawl engine

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;
use trawl_scanner::{Document, Downloader, ExtractError, FetchError, PageError, WebCrawler};

// ============================================================================
// In-memory web
// ============================================================================

#[derive(Clone)]
enum Behaviour {
    Links(Vec<&'static str>),
    FetchFails,
    ExtractFails,
}

/// A fetched page; `links: None` makes extraction fail.
struct FakePage {
    url: String,
    links: Option<Vec<String>>,
}

impl Document for FakePage {
    fn extract_links(&self) -> Result<Vec<String>, ExtractError> {
        self.links
            .clone()
            .ok_or_else(|| ExtractError::Parse(format!("cannot parse {}", self.url)))
    }
}

struct FakeWeb {
    pages: HashMap<String, Behaviour>,
    fetched: Mutex<Vec<String>>,
}

impl FakeWeb {
    fn new(pages: &[(&str, Behaviour)]) -> Arc<Self> {
        Arc::new(Self {
            pages: pages
                .iter()
                .map(|(url, behaviour)| (url.to_string(), behaviour.clone()))
                .collect(),
            fetched: Mutex::new(Vec::new()),
        })
    }

    fn fetch_count(&self, url: &str) -> usize {
        self.fetched.lock().unwrap().iter().filter(|u| *u == url).count()
    }

    fn total_fetches(&self) -> usize {
        self.fetched.lock().unwrap().len()
    }
}

#[async_trait]
impl Downloader for FakeWeb {
    async fn download(&self, url: &str) -> Result<Box<dyn Document>, FetchError> {
        self.fetched.lock().unwrap().push(url.to_string());
        match self.pages.get(url) {
            Some(Behaviour::Links(links)) => Ok(Box::new(FakePage {
                url: url.to_string(),
                links: Some(links.iter().map(|l| l.to_string()).collect()),
            })),
            Some(Behaviour::ExtractFails) => Ok(Box::new(FakePage {
                url: url.to_string(),
                links: None,
            })),
            Some(Behaviour::FetchFails) | None => {
                Err(FetchError::Other(format!("no route to {}", url)))
            }
        }
    }
}

const A: &str = "http://site.example/a";
const B: &str = "http://site.example/b";
const C: &str = "http://site.example/c";
const D: &str = "http://site.example/d";

fn sorted(mut urls: Vec<String>) -> Vec<String> {
    urls.sort();
    urls
}

fn crawler(web: Arc<FakeWeb>) -> WebCrawler {
    WebCrawler::new(web, 4, 2, 2)
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_all_pages_reachable_within_levels_are_downloaded() {
    let web = FakeWeb::new(&[
        (A, Behaviour::Links(vec![B, C])),
        (B, Behaviour::Links(vec![D])),
        (C, Behaviour::Links(vec![])),
        (D, Behaviour::Links(vec![])),
    ]);
    let crawler = crawler(web.clone());

    let result = crawler.download_all(A, 3).await;

    assert_eq!(sorted(result.downloaded.clone()), vec![A, B, C, D]);
    assert!(result.errors.is_empty());
    assert!(result.is_clean());
    crawler.close().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_discoveries_of_last_level_are_not_fetched() {
    let web = FakeWeb::new(&[
        (A, Behaviour::Links(vec![B, C])),
        (B, Behaviour::Links(vec![D])),
        (C, Behaviour::Links(vec![])),
        (D, Behaviour::Links(vec![])),
    ]);
    let crawler = crawler(web.clone());

    let result = crawler.download_all(A, 2).await;

    assert_eq!(sorted(result.downloaded), vec![A, B, C]);
    assert_eq!(web.fetch_count(D), 0);
    crawler.close().await.unwrap();
}

#[tokio::test]
async fn test_depth_zero_fetches_nothing() {
    let web = FakeWeb::new(&[(A, Behaviour::Links(vec![B]))]);
    let crawler = crawler(web.clone());

    let result = crawler.download_all(A, 0).await;

    assert!(result.downloaded.is_empty());
    assert!(result.errors.is_empty());
    assert_eq!(web.total_fetches(), 0);
    crawler.close().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_fetch_failure_is_recorded() {
    let web = FakeWeb::new(&[(A, Behaviour::Links(vec![B])), (B, Behaviour::FetchFails)]);
    let crawler = crawler(web);

    let result = crawler.download_all(A, 2).await;

    assert_eq!(result.downloaded, vec![A]);
    assert_eq!(result.errors.len(), 1);
    assert!(matches!(*result.errors[B], PageError::Fetch(_)));
    crawler.close().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_extract_failure_counts_as_downloaded_and_failed() {
    let web = FakeWeb::new(&[(A, Behaviour::ExtractFails)]);
    let crawler = crawler(web);

    let result = crawler.download_all(A, 3).await;

    assert_eq!(result.downloaded, vec![A]);
    assert_eq!(result.errors.len(), 1);
    assert!(matches!(*result.errors[A], PageError::Extract(_)));
    assert_eq!(result.errors[A].kind(), "extract");
    crawler.close().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_malformed_address_is_never_fetched() {
    let web = FakeWeb::new(&[
        (A, Behaviour::Links(vec!["::not a url::", B])),
        (B, Behaviour::Links(vec![])),
    ]);
    let crawler = crawler(web.clone());

    let result = crawler.download_all(A, 2).await;

    assert_eq!(sorted(result.downloaded), vec![A, B]);
    assert!(matches!(
        *result.errors["::not a url::"],
        PageError::InvalidUrl { .. }
    ));
    assert_eq!(web.fetch_count("::not a url::"), 0);
    crawler.close().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_each_address_fetched_once() {
    // Every page links to every other page and to itself.
    let all = vec![A, B, C, D];
    let web = FakeWeb::new(&[
        (A, Behaviour::Links(all.clone())),
        (B, Behaviour::Links(all.clone())),
        (C, Behaviour::Links(all.clone())),
        (D, Behaviour::Links(all.clone())),
    ]);
    let crawler = crawler(web.clone());

    let result = crawler.download_all(A, 5).await;

    assert_eq!(sorted(result.downloaded), vec![A, B, C, D]);
    for url in all {
        assert_eq!(web.fetch_count(url), 1, "{} fetched more than once", url);
    }
    crawler.close().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_excluded_addresses_are_never_touched() {
    let excluded_page = "http://site.example/private/x";
    let behind_excluded = "http://site.example/only-from-private";
    let web = FakeWeb::new(&[
        (A, Behaviour::Links(vec![B, excluded_page])),
        (B, Behaviour::Links(vec![])),
        (excluded_page, Behaviour::Links(vec![behind_excluded])),
        (behind_excluded, Behaviour::Links(vec![])),
    ]);
    let crawler = crawler(web.clone());
    let excludes: HashSet<String> = ["/private/".to_string()].into();

    let result = crawler.download(A, 4, &excludes).await;

    assert_eq!(sorted(result.downloaded), vec![A, B]);
    assert!(result.errors.is_empty());
    assert_eq!(web.fetch_count(excluded_page), 0);
    assert_eq!(web.fetch_count(behind_excluded), 0);
    crawler.close().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_repeated_crawls_do_not_share_state() {
    let web = FakeWeb::new(&[
        (A, Behaviour::Links(vec![B, C])),
        (B, Behaviour::FetchFails),
        (C, Behaviour::Links(vec![D])),
        (D, Behaviour::ExtractFails),
    ]);
    let crawler = crawler(web.clone());

    let first = crawler.download_all(A, 3).await;
    let second = crawler.download_all(A, 3).await;

    assert_eq!(sorted(first.downloaded.clone()), sorted(second.downloaded.clone()));
    assert_eq!(first.error_messages(), second.error_messages());
    assert_eq!(sorted(first.downloaded), vec![A, C, D]);
    assert_eq!(web.fetch_count(A), 2);
    crawler.close().await.unwrap();
}

#[tokio::test]
async fn test_crawl_after_shutdown_is_aborted_not_failed() {
    let web = FakeWeb::new(&[(A, Behaviour::Links(vec![B]))]);
    let crawler = crawler(web.clone());
    crawler.shutdown();

    let result = tokio::time::timeout(Duration::from_secs(5), crawler.download_all(A, 2))
        .await
        .expect("crawl hung after shutdown");

    assert!(result.downloaded.is_empty());
    assert!(result.errors.is_empty());
    assert_eq!(result.aborted, vec![A]);
    assert!(!result.is_clean());
    assert_eq!(web.total_fetches(), 0);
    crawler.close().await.unwrap();
}

// ============================================================================
// Per-host admission
// ============================================================================

/// Pages whose fetches park on a gate so concurrency can be observed.
/// With `onward` set, every spoke links to its own `/next` page.
struct GatedWeb {
    hub: String,
    spokes: Vec<String>,
    onward: bool,
    gate: Semaphore,
    in_flight: Mutex<HashMap<String, usize>>,
    peak: Mutex<HashMap<String, usize>>,
    started: AtomicUsize,
    fetched: Mutex<Vec<String>>,
}

impl GatedWeb {
    fn new(hub: &str, spokes: Vec<String>, onward: bool) -> Arc<Self> {
        Arc::new(Self {
            hub: hub.to_string(),
            spokes,
            onward,
            gate: Semaphore::new(0),
            in_flight: Mutex::new(HashMap::new()),
            peak: Mutex::new(HashMap::new()),
            started: AtomicUsize::new(0),
            fetched: Mutex::new(Vec::new()),
        })
    }

    async fn wait_for_started(&self, n: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.started.load(Ordering::SeqCst) < n {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .expect("fetches never started");
    }
}

#[async_trait]
impl Downloader for GatedWeb {
    async fn download(&self, url: &str) -> Result<Box<dyn Document>, FetchError> {
        self.fetched.lock().unwrap().push(url.to_string());
        if url == self.hub {
            return Ok(Box::new(FakePage {
                url: url.to_string(),
                links: Some(self.spokes.clone()),
            }));
        }

        let host = url::Url::parse(url).unwrap().host_str().unwrap().to_string();
        {
            let mut in_flight = self.in_flight.lock().unwrap();
            let now = in_flight.entry(host.clone()).or_insert(0);
            *now += 1;
            let mut peak = self.peak.lock().unwrap();
            let max = peak.entry(host.clone()).or_insert(0);
            *max = (*max).max(*now);
        }
        self.started.fetch_add(1, Ordering::SeqCst);

        let _permit = self.gate.acquire().await.unwrap();
        *self.in_flight.lock().unwrap().get_mut(&host).unwrap() -= 1;

        let links = if self.onward {
            vec![format!("{}/next", url)]
        } else {
            Vec::new()
        };
        Ok(Box::new(FakePage {
            url: url.to_string(),
            links: Some(links),
        }))
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_per_host_bound_holds_under_load() {
    let mut spokes: Vec<String> = (0..6).map(|i| format!("http://busy.example/{}", i)).collect();
    spokes.extend((0..2).map(|i| format!("http://quiet.example/{}", i)));

    let web = GatedWeb::new("http://hub.example/", spokes, false);
    let crawler = Arc::new(WebCrawler::new(web.clone(), 16, 2, 2));

    let crawl = {
        let crawler = crawler.clone();
        tokio::spawn(async move { crawler.download_all("http://hub.example/", 2).await })
    };

    // Two busy fetches plus both quiet ones can start; the other four wait.
    web.wait_for_started(4).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(web.started.load(Ordering::SeqCst), 4);

    web.gate.add_permits(100);
    let result = tokio::time::timeout(Duration::from_secs(5), crawl)
        .await
        .expect("crawl hung")
        .unwrap();

    assert_eq!(result.downloaded.len(), 9);
    let peak = web.peak.lock().unwrap().clone();
    assert_eq!(peak["busy.example"], 2);
    assert_eq!(peak["quiet.example"], 2);
    crawler.close().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_shutdown_mid_level_keeps_fetched_pages_without_expanding() {
    let spokes: Vec<String> = (0..5)
        .flat_map(|h| (0..2).map(move |i| format!("http://host{}.example/{}", h, i)))
        .collect();
    let web = GatedWeb::new("http://hub.example/", spokes.clone(), true);
    let crawler = Arc::new(WebCrawler::new(web.clone(), 16, 2, 2));

    let crawl = {
        let crawler = crawler.clone();
        tokio::spawn(async move { crawler.download_all("http://hub.example/", 3).await })
    };

    // Every spoke is in flight; their extraction will find the pool closed.
    web.wait_for_started(10).await;
    crawler.shutdown();
    web.gate.add_permits(100);

    let result = tokio::time::timeout(Duration::from_secs(5), crawl)
        .await
        .expect("crawl hung after shutdown")
        .unwrap();

    let mut expected = spokes;
    expected.push("http://hub.example/".to_string());
    assert_eq!(sorted(result.downloaded), sorted(expected));
    assert!(result.errors.is_empty());
    assert!(result.aborted.is_empty());
    assert!(!web.fetched.lock().unwrap().iter().any(|u| u.ends_with("/next")));
    assert_eq!(web.started.load(Ordering::SeqCst), 10);
    crawler.close().await.unwrap();
}

// ============================================================================
// Misbehaving collaborators
// ============================================================================

struct PanickingWeb;

#[async_trait]
impl Downloader for PanickingWeb {
    async fn download(&self, url: &str) -> Result<Box<dyn Document>, FetchError> {
        if url.ends_with("/boom") {
            panic!("downloader bug");
        }
        Ok(Box::new(FakePage {
            url: url.to_string(),
            links: Some(vec!["http://site.example/boom".to_string(), B.to_string()]),
        }))
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_panicking_fetch_does_not_stall_the_level() {
    let crawler = WebCrawler::new(Arc::new(PanickingWeb), 4, 2, 2);

    let result = tokio::time::timeout(Duration::from_secs(5), crawler.download_all(A, 3))
        .await
        .expect("level never settled");

    assert_eq!(sorted(result.downloaded), vec![A, B]);
    crawler.close().await.unwrap();
}
