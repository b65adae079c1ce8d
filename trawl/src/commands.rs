use crate::CLAP_STYLING;
use clap::{arg, command};
use url::Url;

pub fn command_argument_builder() -> clap::Command {
    clap::Command::new("trawl")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("trawl")
        .styles(CLAP_STYLING)
        .arg(
            arg!(-q --"quiet" "Suppress banner and non-essential output")
                .required(false)
                .global(true),
        )
        .arg(
            arg!(-v --"verbose" "Log engine activity at debug level")
                .required(false)
                .global(true),
        )
        .subcommand_required(false)
        .subcommand(
            command!("crawl")
                .about(
                    "Crawl a host or collection of hosts breadth first, a fixed number of \
                levels deep.",
                )
                .arg(
                    arg!(-u --"url" <URL>)
                        .required(false)
                        .help("The URL to start crawling from")
                        .value_parser(clap::value_parser!(Url))
                        .conflicts_with("hosts-file"),
                )
                .arg(
                    arg!(-H --"hosts-file" <PATH>)
                        .required(false)
                        .help("Path to a newline-delimited file of seed URLs")
                        .value_parser(clap::value_parser!(std::path::PathBuf))
                        .conflicts_with("url"),
                )
                .arg(
                    arg!(-d --"depth" <LEVELS>)
                        .required(false)
                        .help("Levels to fetch per seed; the seed itself is the first level")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("2"),
                )
                .arg(
                    arg!(-x --"exclude" <PATTERN>)
                        .required(false)
                        .help("Skip any URL containing PATTERN (repeatable)")
                        .action(clap::ArgAction::Append),
                )
                .arg(
                    arg!(--"downloaders" <NUM_WORKERS>)
                        .required(false)
                        .help("Fetch workers [config default: 10]")
                        .value_parser(clap::value_parser!(usize)),
                )
                .arg(
                    arg!(--"extractors" <NUM_WORKERS>)
                        .required(false)
                        .help("Link extraction workers [config default: 4]")
                        .value_parser(clap::value_parser!(usize)),
                )
                .arg(
                    arg!(--"per-host" <NUM>)
                        .required(false)
                        .help("Concurrent fetches allowed against one host [config default: 2]")
                        .value_parser(clap::value_parser!(usize)),
                )
                .arg(
                    arg!(--"timeout" <SECONDS>)
                        .required(false)
                        .help("Per-request timeout in seconds [config default: 10]")
                        .value_parser(clap::value_parser!(u64)),
                )
                .arg(
                    arg!(-c --"config" <PATH>)
                        .required(false)
                        .help("JSON crawler configuration; explicit flags take precedence")
                        .value_parser(clap::value_parser!(std::path::PathBuf)),
                )
                .arg(
                    arg!(-f --"format" <FORMAT>)
                        .required(false)
                        .help("Report format: text, json")
                        .value_parser(["text", "json"])
                        .default_value("text"),
                )
                .arg(
                    arg!(-o --"output" <PATH>)
                        .required(false)
                        .help("Save report to file (default: display to screen)")
                        .value_parser(clap::value_parser!(std::path::PathBuf)),
                ),
        )
}
