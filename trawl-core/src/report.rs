// Report generation from crawl results

use crate::crawl::{HostCrawl, extract_url_path};
use colored::{ColoredString, Colorize};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use trawl_scanner::{FetchError, PageError};
use url::Url;

const RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportFormat {
    Text,
    Json,
}

impl ReportFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "text" | "txt" => Some(ReportFormat::Text),
            "json" => Some(ReportFormat::Json),
            _ => None,
        }
    }

    pub fn render(&self, crawls: &[HostCrawl]) -> Result<String, String> {
        match self {
            ReportFormat::Text => Ok(generate_crawl_report(crawls)),
            ReportFormat::Json => generate_json_report(crawls),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
struct Totals {
    downloaded: usize,
    errors: usize,
    aborted: usize,
}

fn totals(crawls: &[HostCrawl]) -> Totals {
    crawls.iter().fold(Totals::default(), |acc, crawl| Totals {
        downloaded: acc.downloaded + crawl.result.downloaded.len(),
        errors: acc.errors + crawl.result.errors.len(),
        aborted: acc.aborted + crawl.result.aborted.len(),
    })
}

fn host_label(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_string()))
        .unwrap_or_else(|| "(no host)".to_string())
}

/// HTTP statuses colored by class; other failures by kind.
fn status_label(error: &PageError) -> ColoredString {
    match error {
        PageError::Fetch(FetchError::Status { status, .. }) => {
            let code = status.to_string();
            match status {
                100..=199 => code.white(),
                200..=299 => code.green(),
                300..=399 => code.cyan(),
                400..=499 => code.yellow(),
                _ => code.red(),
            }
        }
        other => other.kind().red(),
    }
}

/// Errors of one crawl, sorted by address.
fn sorted_errors(crawl: &HostCrawl) -> Vec<(&String, &PageError)> {
    let mut errors: Vec<(&String, &PageError)> = crawl
        .result
        .errors
        .iter()
        .map(|(url, error)| (url, error.as_ref()))
        .collect();
    errors.sort_by(|a, b| a.0.cmp(b.0));
    errors
}

/// Generate a human readable report, grouped by seed and then by host.
pub fn generate_crawl_report(crawls: &[HostCrawl]) -> String {
    let totals = totals(crawls);

    let mut report = String::new();
    report.push_str(RULE);
    report.push_str("\n\n# Summary:\n");
    report.push_str(&format!("  Seeds crawled: {}\n", crawls.len()));
    report.push_str(&format!("  Pages downloaded: {}\n", totals.downloaded));
    report.push_str(&format!("  Errors: {}\n", totals.errors));
    if totals.aborted > 0 {
        report.push_str(&format!("  Aborted: {}\n", totals.aborted));
    }
    report.push('\n');
    report.push_str(RULE);
    report.push_str("\n\n");

    for crawl in crawls {
        report.push_str(&format!(
            "## {} (depth {}, {:.2?})\n\n",
            crawl.seed(),
            crawl.depth,
            crawl.elapsed
        ));

        let mut by_host: BTreeMap<String, Vec<&str>> = BTreeMap::new();
        for url in &crawl.result.downloaded {
            by_host.entry(host_label(url)).or_default().push(url);
        }

        for (host, urls) in by_host.iter_mut() {
            urls.sort();
            report.push_str(&format!("### {}\n", host));
            report.push_str(&format!("  {} pages downloaded\n\n", urls.len()));
            for url in urls.iter() {
                report.push_str(&format!("  {} {}\n", "✓".green(), extract_url_path(url)));
            }
            report.push('\n');
        }

        let errors = sorted_errors(crawl);
        if !errors.is_empty() {
            report.push_str(&format!("### Errors ({})\n", errors.len()));
            for (url, error) in errors {
                report.push_str(&format!(
                    "  {} {} {}\n",
                    status_label(error),
                    url,
                    error.to_string().dimmed()
                ));
            }
            report.push('\n');
        }

        if !crawl.result.aborted.is_empty() {
            report.push_str(&format!(
                "### Aborted ({})\n",
                crawl.result.aborted.len()
            ));
            for url in &crawl.result.aborted {
                report.push_str(&format!("  {} {}\n", "✗".yellow(), url));
            }
            report.push('\n');
        }
    }

    report
}

fn crawl_json(crawl: &HostCrawl) -> serde_json::Value {
    let mut downloaded = crawl.result.downloaded.clone();
    downloaded.sort();

    let errors: Vec<serde_json::Value> = sorted_errors(crawl)
        .into_iter()
        .map(|(url, error)| {
            let status = match error {
                PageError::Fetch(FetchError::Status { status, .. }) => Some(*status),
                _ => None,
            };
            serde_json::json!({
                "url": url,
                "kind": error.kind(),
                "status": status,
                "message": error.to_string(),
            })
        })
        .collect();

    serde_json::json!({
        "seed": crawl.seed(),
        "depth": crawl.depth,
        "elapsed_ms": crawl.elapsed.as_millis() as u64,
        "downloaded": downloaded,
        "errors": errors,
        "aborted": crawl.result.aborted,
    })
}

/// Generate a JSON report. Address lists are sorted so output is stable
/// across runs.
pub fn generate_json_report(crawls: &[HostCrawl]) -> Result<String, String> {
    let json_report = serde_json::json!({
        "report": {
            "metadata": {
                "generator": "Trawl",
                "version": env!("CARGO_PKG_VERSION"),
                "generated_at": chrono::Utc::now().to_rfc3339(),
                "format": "json"
            },
            "summary": {
                "seeds": crawls.len(),
                "totals": totals(crawls)
            },
            "crawls": crawls.iter().map(crawl_json).collect::<Vec<_>>()
        }
    });

    serde_json::to_string_pretty(&json_report)
        .map_err(|e| format!("Failed to render JSON report: {}", e))
}

pub fn save_report(content: &str, path: &Path) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(content.as_bytes())?;
    Ok(())
}
