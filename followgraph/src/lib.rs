pub mod handlers;

// Re-export commonly used handler functions for convenience
pub use handlers::{
    load_proxies_from_file, load_user_agents_from_file, open_database, parse_proxy_line,
    resolve_db_path,
};

// Re-export crawl functionality from followgraph-core
pub use followgraph_core::crawl::{CrawlOptions, CrawlOutcome, execute_crawl, generate_crawl_report};
