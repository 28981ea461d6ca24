use crate::CLAP_STYLING;
use clap::{arg, command};
use std::path::PathBuf;

pub(crate) fn command_argument_builder() -> clap::Command {
    clap::Command::new("flowmap")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("flowmap")
        .styles(CLAP_STYLING)
        .arg(
            arg!(-q --"quiet" "Suppress banner and non-essential output")
                .required(false)
                .global(true),
        )
        .arg(
            arg!(-v --"verbose" "Enable debug logging")
                .required(false)
                .global(true),
        )
        .subcommand_required(false)
        .subcommand(
            command!("classify")
                .about("Show which service each URL would be mapped to")
                .arg(
                    arg!(<URL> ...)
                        .required(true)
                        .help("One or more absolute URLs"),
                ),
        )
        .subcommand(
            command!("watch")
                .about(
                    "Issue requests through an intercepted client and report the outbound \
                traffic map.",
                )
                .arg(
                    arg!([URL] ...)
                        .required(false)
                        .help("URLs to request")
                        .conflicts_with("urls-file"),
                )
                .arg(
                    arg!(-U --"urls-file" <PATH>)
                        .required(false)
                        .help("Path to a newline-delimited file of URLs to request")
                        .value_parser(clap::value_parser!(PathBuf)),
                )
                .arg(
                    arg!(--"event")
                        .required(false)
                        .help("Use the event-style client instead of the promise-style one")
                        .action(clap::ArgAction::SetTrue),
                )
                .arg(
                    arg!(-m --"method" <METHOD>)
                        .required(false)
                        .help("HTTP method for every request")
                        .default_value("GET"),
                )
                .arg(
                    arg!(-c --"config" <PATH>)
                        .required(false)
                        .help("Monitor config file (JSON)"),
                )
                .arg(
                    arg!(-t --"timeout" <SECONDS>)
                        .required(false)
                        .help("Request timeout in seconds")
                        .value_parser(clap::value_parser!(u64))
                        .default_value("30"),
                )
                .arg(
                    arg!(-o --"output" <PATH>)
                        .required(false)
                        .help("Save report to file (default: display to screen)")
                        .value_parser(clap::value_parser!(PathBuf)),
                )
                .arg(
                    arg!(-f --"format" <FORMAT>)
                        .required(false)
                        .help("Report format: text, json, csv, markdown")
                        .value_parser(["text", "json", "csv", "markdown"])
                        .default_value("text"),
                )
                .arg(
                    arg!(-e --"export" <DIR>)
                        .required(false)
                        .help("Write the network-flow JSON export into this directory")
                        .value_parser(clap::value_parser!(PathBuf)),
                ),
        )
}
