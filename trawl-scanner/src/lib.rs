pub mod admission;
pub mod barrier;
pub mod config;
pub mod crawler;
pub mod document;
pub mod error;
pub mod host;
pub mod http;
pub mod pool;
pub mod result;

pub use admission::KeyedAdmission;
pub use config::CrawlerConfig;
pub use crawler::WebCrawler;
pub use document::{Document, Downloader};
pub use error::{ExtractError, FetchError, PageError, ScanError};
pub use http::{HtmlDocument, HttpDownloader};
pub use pool::WorkerPool;
pub use result::CrawlResult;
