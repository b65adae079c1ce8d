pub mod crawl;
pub mod report;

pub use crawl::{
    CrawlOptions, CrawlProgressCallback, HostCrawl, execute_crawl, execute_crawl_with,
    extract_url_path,
};
pub use report::{ReportFormat, generate_crawl_report, generate_json_report, save_report};
