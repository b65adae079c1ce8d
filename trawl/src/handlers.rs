use anyhow::{Context, anyhow};
use clap::ArgMatches;
use colored::Colorize;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;
use trawl_core::crawl::{CrawlOptions, CrawlProgressCallback, execute_crawl};
use trawl_core::report::{ReportFormat, save_report};
use trawl_scanner::CrawlerConfig;
use url::Url;

// Helper functions for crawl handler

/// Load URLs from either a file or a single URL argument
pub fn load_urls_from_source(
    url: Option<&Url>,
    hosts_file: Option<&PathBuf>,
) -> Result<Vec<String>, String> {
    if let Some(hosts_file_path) = hosts_file {
        load_urls_from_file(hosts_file_path)
    } else if let Some(url) = url {
        Ok(vec![url.as_str().to_string()])
    } else {
        Err("Either --url or --hosts-file must be provided".to_string())
    }
}

/// Load and parse URLs from a file. Blank lines and `#` comments are skipped.
pub fn load_urls_from_file(path: &PathBuf) -> Result<Vec<String>, String> {
    let content = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read hosts file {}: {}", path.display(), e))?;

    let urls: Vec<String> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(parse_url_line)
        .collect();

    if urls.is_empty() {
        return Err(format!("No valid URLs found in {}", path.display()));
    }

    Ok(urls)
}

/// Parse a single line as a URL, trying to add http:// if needed
pub fn parse_url_line(line: &str) -> Option<String> {
    if let Ok(url) = Url::parse(line)
        && url.has_host()
    {
        return Some(line.to_string());
    }

    let with_scheme = format!("http://{}", line);
    if Url::parse(&with_scheme).is_ok() {
        return Some(with_scheme);
    }

    eprintln!("{}  Skipping invalid URL '{}'", "⚠".yellow(), line);
    None
}

/// Crawler configuration from `--config` (or defaults) with explicit flags
/// layered on top.
pub fn build_config(args: &ArgMatches) -> anyhow::Result<CrawlerConfig> {
    let mut config = match args.get_one::<PathBuf>("config") {
        Some(path) => CrawlerConfig::from_json_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => CrawlerConfig::default(),
    };

    if let Some(n) = args.get_one::<usize>("downloaders") {
        config.downloaders = *n;
    }
    if let Some(n) = args.get_one::<usize>("extractors") {
        config.extractors = *n;
    }
    if let Some(n) = args.get_one::<usize>("per-host") {
        config.per_host = *n;
    }
    if let Some(secs) = args.get_one::<u64>("timeout") {
        config.timeout_secs = *secs;
    }

    config.validate().context("Invalid crawler settings")?;
    debug!(?config, "Resolved crawler configuration");
    Ok(config)
}

/// Installs the global subscriber. `RUST_LOG` wins unless `verbose` is set.
pub fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    // A second init (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

pub fn print_banner() {
    eprintln!(
        "{} {}",
        "trawl".bright_cyan().bold(),
        env!("CARGO_PKG_VERSION").bright_white()
    );
    eprintln!("{}", "═".repeat(60).bright_blue().bold());
}

/// Owns Ctrl-C for the rest of the process. The first press while `crawling`
/// is set wakes the returned [`Notify`] so the crawler can report the
/// interrupt after draining; any other press exits with status 130.
pub fn spawn_interrupt_listener(crawling: Arc<AtomicBool>) -> Arc<Notify> {
    let interrupt = Arc::new(Notify::new());
    let notify = interrupt.clone();

    tokio::spawn(async move {
        let mut forwarded = false;
        while tokio::signal::ctrl_c().await.is_ok() {
            if crawling.load(Ordering::SeqCst) && !forwarded {
                forwarded = true;
                eprintln!(
                    "{}  Interrupt received, crawl will be reported as aborted (Ctrl-C again to quit)",
                    "⚠".yellow()
                );
                notify.notify_one();
            } else {
                std::process::exit(130);
            }
        }
        warn!("Could not listen for Ctrl-C");
    });

    interrupt
}

pub async fn handle_crawl(args: &ArgMatches) -> anyhow::Result<()> {
    let quiet = args.get_flag("quiet");

    let urls = load_urls_from_source(
        args.get_one::<Url>("url"),
        args.get_one::<PathBuf>("hosts-file"),
    )
    .map_err(|e| anyhow!(e))?;
    let config = build_config(args)?;
    let depth = args.get_one::<usize>("depth").copied().unwrap_or(2);
    let excludes: Vec<String> = args
        .get_many::<String>("exclude")
        .map(|patterns| patterns.cloned().collect())
        .unwrap_or_default();

    let format_name = args
        .get_one::<String>("format")
        .map(String::as_str)
        .unwrap_or("text");
    let format = ReportFormat::from_str(format_name)
        .ok_or_else(|| anyhow!("Unsupported report format: {}", format_name))?;

    if !quiet {
        eprintln!("{} {}", "Seeds:".bold(), urls.len());
        eprintln!("{} {}", "Depth:".bold(), depth);
        eprintln!(
            "{} {} downloaders, {} extractors, {} per host",
            "Workers:".bold(),
            config.downloaders,
            config.extractors,
            config.per_host
        );
        if !excludes.is_empty() {
            eprintln!("{} {}", "Excluding:".bold(), excludes.join(", "));
        }
        eprintln!();
    }

    let progress_callback: Option<CrawlProgressCallback> = if quiet {
        None
    } else {
        Some(Arc::new(|msg: String| eprintln!("{}", msg)))
    };

    let options = CrawlOptions {
        urls,
        depth,
        excludes,
        config,
        show_progress_bars: !quiet,
    };
    let crawling = Arc::new(AtomicBool::new(true));
    let interrupt = spawn_interrupt_listener(crawling.clone());
    let crawls = execute_crawl(options, progress_callback, async move {
        interrupt.notified().await
    })
    .await;
    crawling.store(false, Ordering::SeqCst);
    let crawls = crawls.map_err(|e| anyhow!(e))?;

    let report = format.render(&crawls).map_err(|e| anyhow!(e))?;

    match args.get_one::<PathBuf>("output") {
        Some(path) => {
            save_report(&report, path)
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
            if !quiet {
                eprintln!(
                    "{} Report saved to {}",
                    "✓".green().bold(),
                    path.display()
                );
            }
        }
        None => print!("{}", report),
    }

    Ok(())
}
