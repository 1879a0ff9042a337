use crate::CLAP_STYLING;
use clap::{arg, command};
use followgraph_core::ingest::DEFAULT_BASE_URL;
use std::path::PathBuf;

pub(crate) const DEFAULT_CONFIG_DIR: &str = "~/.config/followgraph/";

fn db_arg() -> clap::Arg {
    arg!(--"db" <DIR>)
        .required(false)
        .help("Directory holding followgraph.db")
        .default_value(DEFAULT_CONFIG_DIR)
}

pub(crate) fn command_argument_builder() -> clap::Command {
    clap::Command::new("followgraph")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("followgraph")
        .styles(CLAP_STYLING)
        .arg(arg!(-q --"quiet" "Suppress progress spinners and non-essential output").required(false))
        .subcommand_required(true)
        .subcommand(
            command!("init")
                .about("Initializes the followgraph database on your filesystem")
                .arg(
                    arg!([PATH])
                        .required(false)
                        .help("Location to store the followgraph database")
                        .default_value(DEFAULT_CONFIG_DIR),
                )
                .arg(
                    arg!(-f --"force")
                        .help("Overwrites any existing database at the specified location.")
                        .required(false),
                ),
        )
        .subcommand(
            command!("seed")
                .about("Stores the root user whose followers will be crawled")
                .arg(
                    arg!(-u --"handle" <HANDLE>)
                        .required(true)
                        .help("The user's handle (url token)"),
                )
                .arg(
                    arg!(-i --"external-id" <ID>)
                        .required(true)
                        .help("The user's id as issued by the source API"),
                )
                .arg(
                    arg!(-n --"name" <NAME>)
                        .required(false)
                        .help("Display name"),
                )
                .arg(db_arg()),
        )
        .subcommand(
            command!("crawl")
                .about("Crawls every follower of a seeded root user into the database")
                .arg(
                    arg!(-r --"root" <HANDLE>)
                        .required(true)
                        .help("Handle of the user whose followers are crawled"),
                )
                .arg(db_arg())
                .arg(
                    arg!(--"base-url" <URL>)
                        .required(false)
                        .help("Base URL of the followers API")
                        .default_value(DEFAULT_BASE_URL),
                )
                .arg(
                    arg!(-l --"limit" <NUM>)
                        .required(false)
                        .help("Followers requested per page")
                        .value_parser(clap::value_parser!(u32).range(1..))
                        .default_value("20"),
                )
                .arg(
                    arg!(-t --"timeout" <SECS>)
                        .required(false)
                        .help("Per-request timeout in seconds")
                        .value_parser(clap::value_parser!(u64).range(1..))
                        .default_value("10"),
                )
                .arg(
                    arg!(--"delay-ms" <MS>)
                        .required(false)
                        .help("Pause between pages in milliseconds")
                        .value_parser(clap::value_parser!(u64))
                        .default_value("500"),
                )
                .arg(
                    arg!(--"retries" <NUM>)
                        .required(false)
                        .help("Retries per page after a failed request")
                        .value_parser(clap::value_parser!(u32))
                        .default_value("2"),
                )
                .arg(
                    arg!(-p --"proxies-file" <PATH>)
                        .required(false)
                        .help("Newline-delimited proxies (host:port or scheme://host:port)")
                        .value_parser(clap::value_parser!(PathBuf)),
                )
                .arg(
                    arg!(-a --"user-agents-file" <PATH>)
                        .required(false)
                        .help("Newline-delimited user agents to rotate through")
                        .value_parser(clap::value_parser!(PathBuf)),
                )
                .arg(
                    arg!(--"require-proxy")
                        .required(false)
                        .help("Fail instead of requesting from the local address when no proxy is usable")
                        .action(clap::ArgAction::SetTrue),
                )
                .arg(
                    arg!(-f --"format" <FORMAT>)
                        .required(false)
                        .help("Report format: text, json")
                        .value_parser(["text", "json"])
                        .default_value("text"),
                ),
        )
        .subcommand(
            command!("orphans")
                .about("Lists stored users with no follow edge that were never crawled as a root")
                .arg(db_arg()),
        )
}
