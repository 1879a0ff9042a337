use clap::ArgMatches;
use colored::Colorize;
use followgraph_core::crawl::{CrawlOptions, execute_crawl, generate_crawl_report};
use followgraph_core::data::Database;
use followgraph_core::model::NewUser;
use followgraph_core::store::UserStore;
use followgraph_fetch::{
    HttpPageFetcher, ProxyEndpoint, ProxyFallback, ProxyPool, UserAgentRotation,
};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

pub const DATABASE_FILE: &str = "followgraph.db";

/// Install the fmt subscriber; `RUST_LOG` overrides the default `info` level.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

/// Expand `~` and append the database file name.
pub fn resolve_db_path(config_dir: &str) -> PathBuf {
    let expanded = shellexpand::tilde(config_dir);
    Path::new(expanded.as_ref()).join(DATABASE_FILE)
}

/// Open an existing database, refusing to silently create one in the wrong place.
pub fn open_database(config_dir: &str) -> Result<Database, String> {
    let db_path = resolve_db_path(config_dir);
    if !Database::exists(&db_path) {
        return Err(format!(
            "No database at {}. Run `followgraph init` first",
            db_path.display()
        ));
    }
    Database::new(&db_path)
        .map_err(|e| format!("Failed to open database {}: {}", db_path.display(), e))
}

/// Lines of a config file with blanks and `#` comments removed.
fn content_lines(content: &str) -> impl Iterator<Item = &str> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
}

/// Load and parse proxies from a file
pub fn load_proxies_from_file(path: &PathBuf) -> Result<Vec<ProxyEndpoint>, String> {
    let content = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read proxies file {}: {}", path.display(), e))?;

    let proxies: Vec<ProxyEndpoint> = content_lines(&content).filter_map(parse_proxy_line).collect();

    if proxies.is_empty() {
        return Err(format!("No valid proxies found in {}", path.display()));
    }

    Ok(proxies)
}

/// Parse a single line as a proxy, warning on lines that do not parse
pub fn parse_proxy_line(line: &str) -> Option<ProxyEndpoint> {
    match ProxyEndpoint::parse(line) {
        Ok(proxy) => Some(proxy),
        Err(e) => {
            eprintln!("⚠️  Skipping invalid proxy '{}': {}", line, e);
            None
        }
    }
}

pub fn load_user_agents_from_file(path: &PathBuf) -> Result<Vec<String>, String> {
    let content = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read user agents file {}: {}", path.display(), e))?;

    let agents: Vec<String> = content_lines(&content).map(str::to_string).collect();

    if agents.is_empty() {
        return Err(format!("No user agents found in {}", path.display()));
    }

    Ok(agents)
}

fn fail(msg: impl std::fmt::Display) -> ! {
    eprintln!("{} {}", "✗".red().bold(), msg);
    std::process::exit(1);
}

fn confirm(msg: &str) -> bool {
    print!("{} ", msg.bright_cyan().bold());
    if io::stdout().flush().is_err() {
        return false;
    }
    let mut response = String::new();
    if io::stdin().read_line(&mut response).is_err() {
        return false;
    }
    let response = response.trim().to_lowercase();
    response == "y" || response == "yes"
}

pub fn handle_init(args: &ArgMatches) {
    let config_dir = args
        .get_one::<String>("PATH")
        .map(String::as_str)
        .unwrap_or("~/.config/followgraph/");
    let force = args.get_flag("force");
    let db_path = resolve_db_path(config_dir);

    if Database::exists(&db_path) {
        if !force {
            println!("[WARNING] A database already exists at {}", db_path.display());
            if !confirm("This will delete every stored user and edge. Continue? [y/N]:") {
                println!("\nInitialization cancelled.");
                return;
            }
        }
        if let Err(e) = Database::drop(&db_path) {
            fail(format!("Failed to delete {}: {}", db_path.display(), e));
        }
    }

    if let Some(parent) = db_path.parent()
        && let Err(e) = fs::create_dir_all(parent)
    {
        fail(format!("Failed to create {}: {}", parent.display(), e));
    }

    if let Err(e) = Database::new(&db_path) {
        fail(format!("Failed to create database: {}", e));
    }

    println!("{} Database: {}", "✓".green().bold(), db_path.display());
}

pub fn handle_seed(args: &ArgMatches) {
    let handle = args.get_one::<String>("handle").map(String::as_str).unwrap_or_default();
    let external_id = args
        .get_one::<String>("external-id")
        .map(String::as_str)
        .unwrap_or_default();
    let name = args.get_one::<String>("name").cloned().unwrap_or_default();
    let db_dir = args.get_one::<String>("db").map(String::as_str).unwrap_or_default();

    let db = open_database(db_dir).unwrap_or_else(|e| fail(e));

    match db.find_by_handle(handle) {
        Ok(Some(existing)) => {
            println!(
                "{} {} is already stored (id {})",
                "✓".green().bold(),
                existing.handle,
                existing.id
            );
            return;
        }
        Ok(None) => {}
        Err(e) => fail(e),
    }

    match db.insert_user(&NewUser::new(external_id, handle).with_name(name)) {
        Ok(user) => println!(
            "{} Seeded {} (id {})",
            "✓".green().bold(),
            user.handle,
            user.id
        ),
        Err(e) => fail(format!("Failed to seed {}: {}", handle, e)),
    }
}

pub async fn handle_crawl(sub_matches: &ArgMatches, quiet: bool) {
    init_tracing();

    let root = sub_matches.get_one::<String>("root").cloned().unwrap_or_default();
    let db_dir = sub_matches.get_one::<String>("db").map(String::as_str).unwrap_or_default();
    let base_url = sub_matches.get_one::<String>("base-url").cloned().unwrap_or_default();
    let limit = *sub_matches.get_one::<u32>("limit").unwrap_or(&20);
    let timeout = *sub_matches.get_one::<u64>("timeout").unwrap_or(&10);
    let delay_ms = *sub_matches.get_one::<u64>("delay-ms").unwrap_or(&500);
    let retries = *sub_matches.get_one::<u32>("retries").unwrap_or(&2);
    let proxies_file = sub_matches.get_one::<PathBuf>("proxies-file");
    let agents_file = sub_matches.get_one::<PathBuf>("user-agents-file");
    let require_proxy = sub_matches.get_flag("require-proxy");
    let format = sub_matches
        .get_one::<String>("format")
        .map(String::as_str)
        .unwrap_or("text");

    let db = open_database(db_dir).unwrap_or_else(|e| fail(e));

    let proxies = match proxies_file {
        Some(path) => load_proxies_from_file(path).unwrap_or_else(|e| fail(e)),
        None => Vec::new(),
    };
    let fallback = if require_proxy {
        ProxyFallback::Refuse
    } else {
        ProxyFallback::LocalAddress
    };
    let pool = ProxyPool::new(proxies).with_fallback(fallback);

    let agents = match agents_file {
        Some(path) => load_user_agents_from_file(path).unwrap_or_else(|e| fail(e)),
        None => Vec::new(),
    };
    let rotation = UserAgentRotation::new(agents);

    let fetcher = HttpPageFetcher::with_timeout(Duration::from_secs(timeout))
        .unwrap_or_else(|e| fail(e));

    if !quiet {
        println!("\n🕸️  Crawling followers of {}", root);
        println!("Page size: {}", limit);
        println!(
            "Proxies: {}",
            if pool.is_empty() {
                "none (local address)".to_string()
            } else {
                pool.len().to_string()
            }
        );
        println!("User agents: {}\n", rotation.len());
    }

    let mut options = CrawlOptions::new(root);
    options.base_url = base_url;
    options.page_size = limit;
    options.page_delay = Duration::from_millis(delay_ms);
    options.max_retries = retries;
    options.proxies = Arc::new(pool);
    options.user_agents = Arc::new(rotation);
    options.show_progress_bars = !quiet;

    let outcome = match execute_crawl(&db, Arc::new(fetcher), options).await {
        Ok(outcome) => outcome,
        Err(e) => fail(format!("Crawl failed: {}", e)),
    };

    match format {
        "json" => match serde_json::to_string_pretty(&outcome) {
            Ok(json) => println!("{}", json),
            Err(e) => fail(e),
        },
        _ => print!("{}", generate_crawl_report(&outcome)),
    }
}

pub fn handle_orphans(args: &ArgMatches) {
    let db_dir = args.get_one::<String>("db").map(String::as_str).unwrap_or_default();
    let db = open_database(db_dir).unwrap_or_else(|e| fail(e));

    let orphans = db.find_orphan_users().unwrap_or_else(|e| fail(e));
    if orphans.is_empty() {
        println!("{} No users are missing a follow edge", "✓".green().bold());
        return;
    }

    println!("{} users without a follow edge:", orphans.len());
    for user in orphans {
        println!("  {} {} ({})", user.id, user.handle, user.external_id);
    }
}
