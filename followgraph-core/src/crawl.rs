use crate::data::Database;
use crate::error::IngestError;
use crate::ingest::{
    CrawlSummary, DEFAULT_BASE_URL, DEFAULT_PAGE_SIZE, FollowerIngestion, PageProgress,
    PageProgressCallback,
};
use followgraph_fetch::{NoProxy, PageFetcher, ProxyProvider, UserAgentProvider, UserAgentRotation};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Options for configuring a crawl operation
pub struct CrawlOptions {
    pub root_handle: String,
    pub base_url: String,
    pub page_size: u32,
    pub page_delay: Duration,
    pub max_retries: u32,
    pub retry_backoff: Duration,
    pub proxies: Arc<dyn ProxyProvider>,
    pub user_agents: Arc<dyn UserAgentProvider>,
    pub show_progress_bars: bool,
}

impl CrawlOptions {
    pub fn new(root_handle: impl Into<String>) -> Self {
        Self {
            root_handle: root_handle.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            page_delay: Duration::ZERO,
            max_retries: 0,
            retry_backoff: Duration::from_millis(500),
            proxies: Arc::new(NoProxy),
            user_agents: Arc::new(UserAgentRotation::default()),
            show_progress_bars: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlOutcome {
    pub session_id: String,
    pub summary: CrawlSummary,
}

/// Run one follower crawl inside a crawl session.
/// The session is marked failed with the error text when the crawl fails.
pub async fn execute_crawl(
    db: &Database,
    fetcher: Arc<dyn PageFetcher>,
    options: CrawlOptions,
) -> Result<CrawlOutcome, IngestError> {
    let CrawlOptions {
        root_handle,
        base_url,
        page_size,
        page_delay,
        max_retries,
        retry_backoff,
        proxies,
        user_agents,
        show_progress_bars,
    } = options;

    let session_id = db.create_session(&root_handle)?;

    let progress_bar = if show_progress_bars {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.enable_steady_tick(Duration::from_millis(100));
        pb.set_message(format!("Crawling followers of {}...", root_handle));
        Some(Arc::new(pb))
    } else {
        None
    };

    let mut ingestion = FollowerIngestion::new(db, fetcher)
        .with_base_url(base_url)
        .with_page_size(page_size)
        .with_page_delay(page_delay)
        .with_retries(max_retries, retry_backoff)
        .with_proxy_provider(proxies)
        .with_user_agents(user_agents);

    if let Some(ref pb) = progress_bar {
        let pb_clone = pb.clone();
        let callback: PageProgressCallback = Arc::new(move |progress: PageProgress| {
            pb_clone.set_message(format!(
                "Page {}: {}/{} followers covered, {} new",
                progress.pages_fetched,
                (progress.offset + u64::from(progress.limit)).min(progress.total_count),
                progress.total_count,
                progress.new_users
            ));
        });
        ingestion = ingestion.with_progress_callback(callback);
    }

    match ingestion.run(&root_handle).await {
        Ok(summary) => {
            db.complete_session(&session_id, summary.pages_fetched, summary.users_inserted)?;
            if let Some(ref pb) = progress_bar {
                pb.finish_with_message(format!(
                    "Crawl complete! {} pages, {} new followers",
                    summary.pages_fetched, summary.users_inserted
                ));
            }
            Ok(CrawlOutcome {
                session_id,
                summary,
            })
        }
        Err(e) => {
            if let Some(ref pb) = progress_bar {
                pb.abandon_with_message(format!("Crawl failed: {}", e));
            }
            if let Err(session_err) = db.fail_session(&session_id, &e.to_string()) {
                warn!("Could not mark session {} as failed: {}", session_id, session_err);
            }
            Err(e)
        }
    }
}

/// Generate a crawl report from the outcome
pub fn generate_crawl_report(outcome: &CrawlOutcome) -> String {
    let summary = &outcome.summary;

    let mut report = String::new();
    report.push_str("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n\n");
    report.push_str("# Summary:\n");
    report.push_str(&format!("  Session: {}\n", outcome.session_id));
    report.push_str(&format!(
        "  Root user: {} (id {})\n",
        summary.root_handle, summary.followee_id
    ));
    report.push_str(&format!("  Followers reported: {}\n", summary.total_count));
    report.push_str(&format!("  Pages fetched: {}\n", summary.pages_fetched));
    report.push_str(&format!("  New users stored: {}\n", summary.users_inserted));
    report.push_str(&format!("  Follow edges stored: {}\n", summary.edges_inserted));
    report.push_str(&format!("  Already known: {}\n", summary.users_skipped));
    report.push_str("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n");

    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_lists_counts() {
        let outcome = CrawlOutcome {
            session_id: "s-1".to_string(),
            summary: CrawlSummary {
                root_handle: "alice".to_string(),
                followee_id: 1,
                pages_fetched: 2,
                total_count: 25,
                users_inserted: 25,
                edges_inserted: 25,
                users_skipped: 0,
            },
        };

        let report = generate_crawl_report(&outcome);
        assert!(report.contains("Root user: alice (id 1)"));
        assert!(report.contains("Pages fetched: 2"));
        assert!(report.contains("New users stored: 25"));
        assert!(report.contains("Session: s-1"));
    }
}
