use crate::error::IngestError;
use crate::model::{FollowEdge, FollowerPage, NewUser, PaginationCursor, UserRecord};
use crate::parse::parse_follower_page;
use crate::store::{EdgeStore, StoreResult, UserStore};
use followgraph_fetch::{
    FetchError, NoProxy, PageFetcher, ProxyFallback, ProxyProvider, UserAgentProvider,
    UserAgentRotation, followers_url,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://www.zhihu.com/api/v4";
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Reported after every processed page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageProgress {
    pub pages_fetched: u64,
    pub offset: u64,
    pub limit: u32,
    pub total_count: u64,
    pub new_users: usize,
}

pub type PageProgressCallback = Arc<dyn Fn(PageProgress) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlSummary {
    pub root_handle: String,
    pub followee_id: i64,
    pub pages_fetched: u64,
    pub total_count: u64,
    pub users_inserted: u64,
    pub edges_inserted: u64,
    pub users_skipped: u64,
}

/// Walks the followers of one root user page by page and stores every follower not seen before,
/// together with a follow edge pointing at the root.
pub struct FollowerIngestion<'s, S> {
    store: &'s S,
    fetcher: Arc<dyn PageFetcher>,
    proxies: Arc<dyn ProxyProvider>,
    user_agents: Arc<dyn UserAgentProvider>,
    base_url: String,
    page_size: u32,
    page_delay: Duration,
    max_retries: u32,
    retry_backoff: Duration,
    progress_callback: Option<PageProgressCallback>,
}

impl<'s, S> FollowerIngestion<'s, S>
where
    S: UserStore + EdgeStore,
{
    pub fn new(store: &'s S, fetcher: Arc<dyn PageFetcher>) -> Self {
        Self {
            store,
            fetcher,
            proxies: Arc::new(NoProxy),
            user_agents: Arc::new(UserAgentRotation::default()),
            base_url: DEFAULT_BASE_URL.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            page_delay: Duration::ZERO,
            max_retries: 0,
            retry_backoff: Duration::from_millis(500),
            progress_callback: None,
        }
    }

    pub fn with_proxy_provider(mut self, proxies: Arc<dyn ProxyProvider>) -> Self {
        self.proxies = proxies;
        self
    }

    pub fn with_user_agents(mut self, user_agents: Arc<dyn UserAgentProvider>) -> Self {
        self.user_agents = user_agents;
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Zero is bumped to one so the cursor always moves.
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_page_delay(mut self, delay: Duration) -> Self {
        self.page_delay = delay;
        self
    }

    pub fn with_retries(mut self, max_retries: u32, backoff: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_backoff = backoff;
        self
    }

    pub fn with_progress_callback(mut self, callback: PageProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    pub async fn run(&self, root_handle: &str) -> Result<CrawlSummary, IngestError> {
        let Some(followee) = self.store.find_by_handle(root_handle)? else {
            error!(
                "User '{}' has to be stored before its followers can be linked to it",
                root_handle
            );
            return Err(IngestError::RootUserNotSeeded(root_handle.to_string()));
        };

        info!("Crawling users following {}", root_handle);

        let mut cursor = PaginationCursor::new(self.page_size);
        let mut summary = CrawlSummary {
            root_handle: root_handle.to_string(),
            followee_id: followee.id,
            pages_fetched: 0,
            total_count: 0,
            users_inserted: 0,
            edges_inserted: 0,
            users_skipped: 0,
        };

        loop {
            let page = self.fetch_page(root_handle, &cursor).await?;
            summary.pages_fetched += 1;
            summary.total_count = page.total_count;

            if page.total_count == 0 {
                info!("{} has no followers", root_handle);
                self.report_progress(&summary, &cursor, 0);
                break;
            }

            debug!(
                "Page at offset {} holds {} of {} followers",
                cursor.offset,
                page.records.len(),
                page.total_count
            );

            let (new_users, skipped) = self.deduplicate(page.records)?;
            summary.users_skipped += skipped;
            info!("Storing {} new users from offset {}", new_users.len(), cursor.offset);

            let new_count = new_users.len();
            for user in new_users {
                let follower = self.store.insert_user(&user)?;
                summary.users_inserted += 1;

                self.store.insert_edge(&FollowEdge {
                    followee_id: followee.id,
                    follower_id: follower.id,
                })?;
                summary.edges_inserted += 1;
            }

            self.report_progress(&summary, &cursor, new_count);

            if !cursor.has_more(page.total_count) {
                info!("Finished crawling the followers of {}", root_handle);
                break;
            }

            info!(
                "Covered {} of {} followers, moving to the next page",
                cursor.consumed(),
                page.total_count
            );
            cursor.advance();

            if !self.page_delay.is_zero() {
                tokio::time::sleep(self.page_delay).await;
            }
        }

        Ok(summary)
    }

    async fn fetch_page(
        &self,
        root_handle: &str,
        cursor: &PaginationCursor,
    ) -> Result<FollowerPage, IngestError> {
        let offset = cursor.offset;
        let url = followers_url(&self.base_url, root_handle, offset, cursor.limit)
            .map_err(|source| IngestError::Fetch { offset, source })?;

        let body = self.fetch_with_retry(&url, offset).await?;
        parse_follower_page(&body).map_err(|source| IngestError::Parse { offset, source })
    }

    async fn fetch_with_retry(&self, url: &Url, offset: u64) -> Result<String, IngestError> {
        let mut attempt = 0;

        loop {
            let proxy = self.proxies.active_proxy();
            if proxy.is_none() && self.proxies.fallback() == ProxyFallback::Refuse {
                return Err(IngestError::Fetch {
                    offset,
                    source: FetchError::NoProxyAvailable,
                });
            }
            let user_agent = self.user_agents.current_user_agent();

            let err = match self.fetcher.fetch(url, proxy.as_ref(), &user_agent).await {
                Ok(body) => return Ok(body),
                Err(e) => e,
            };

            if let Some(ref proxy) = proxy
                && err.blames_proxy()
            {
                self.proxies.report_failure(proxy);
            }

            if attempt >= self.max_retries {
                return Err(IngestError::Fetch {
                    offset,
                    source: err,
                });
            }

            let backoff = self.retry_backoff.saturating_mul(2u32.saturating_pow(attempt));
            attempt += 1;
            warn!(
                "Fetching {} failed: {} (retry {}/{} in {:?})",
                url, err, attempt, self.max_retries, backoff
            );
            tokio::time::sleep(backoff).await;
        }
    }

    /// Candidates whose external id is not stored yet, in page order. One store lookup per page.
    fn deduplicate(&self, records: Vec<UserRecord>) -> StoreResult<(Vec<NewUser>, u64)> {
        let external_ids: HashSet<String> = records.iter().map(|r| r.id.clone()).collect();
        let existing: HashSet<String> = self
            .store
            .find_all_by_external_ids(&external_ids)?
            .into_iter()
            .map(|u| u.external_id)
            .collect();

        let mut seen = HashSet::new();
        let mut skipped = 0;
        let mut fresh = Vec::with_capacity(records.len());

        for record in records {
            if existing.contains(&record.id) || !seen.insert(record.id.clone()) {
                skipped += 1;
                continue;
            }
            fresh.push(NewUser::from(record));
        }

        Ok((fresh, skipped))
    }

    fn report_progress(&self, summary: &CrawlSummary, cursor: &PaginationCursor, new_users: usize) {
        if let Some(ref callback) = self.progress_callback {
            callback(PageProgress {
                pages_fetched: summary.pages_fetched,
                offset: cursor.offset,
                limit: cursor.limit,
                total_count: summary.total_count,
                new_users,
            });
        }
    }
}
