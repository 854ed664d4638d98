//! The paginated crawl loop
//!
//! One coordinating task walks the search pages in order. Within a page,
//! detail fetches fan out to a bounded worker set over a shared queue and
//! the loop only moves on once every worker has drained out (the join
//! barrier): all of a page's artifacts are durable before extraction runs.
//! Page N+1 never starts before page N is extracted and loaded.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::extract::{DataExtractor, ExtractSummary};
use crate::proxy::pool::ProxyPool;
use crate::scrape::artifacts::ArtifactStore;
use crate::scrape::client::FetchClient;
use crate::site::SiteApi;
use crate::Result;

/// Default bound on concurrent detail workers
const DEFAULT_MAX_WORKERS: usize = 10;

/// Default sleep before a forced pool refresh when a page fetch fails
const DEFAULT_REFRESH_BACKOFF_SECS: u64 = 300;

/// A detail job is dropped after this many failed fetch rounds. The
/// original queue re-enqueued failing items forever; a permanently
/// unfetchable listing would have livelocked the page.
const MAX_JOB_ATTEMPTS: u32 = 3;

/// Configuration for the crawl orchestrator
#[derive(Debug, Clone)]
pub struct ScraperConfig {
    /// Soft wall-clock budget, checked between pages only
    pub execution_time: Option<Duration>,
    pub start_page: u64,
    /// Last page to process, inclusive
    pub end_page: Option<u64>,
    pub max_workers: usize,
    pub refresh_backoff: Duration,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            execution_time: None,
            start_page: 0,
            end_page: None,
            max_workers: DEFAULT_MAX_WORKERS,
            refresh_backoff: Duration::from_secs(DEFAULT_REFRESH_BACKOFF_SECS),
        }
    }
}

impl ScraperConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_execution_time(mut self, budget: Duration) -> Self {
        self.execution_time = Some(budget);
        self
    }

    pub fn with_start_page(mut self, page: u64) -> Self {
        self.start_page = page;
        self
    }

    pub fn with_end_page(mut self, page: u64) -> Self {
        self.end_page = Some(page);
        self
    }

    pub fn with_max_workers(mut self, workers: usize) -> Self {
        self.max_workers = workers;
        self
    }

    pub fn with_refresh_backoff(mut self, backoff: Duration) -> Self {
        self.refresh_backoff = backoff;
        self
    }
}

/// Why the crawl stopped. Budget exhaustion is normal termination, not an
/// error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    TimeBudget,
    PageLimit,
    SiteExhausted,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::TimeBudget => write!(f, "time ending"),
            StopReason::PageLimit => write!(f, "page ending"),
            StopReason::SiteExhausted => write!(f, "site ending"),
        }
    }
}

/// Termination test evaluated after each page; any satisfied condition
/// stops the crawl.
pub fn check_termination(
    elapsed: Duration,
    execution_time: Option<Duration>,
    next_page: u64,
    end_page: Option<u64>,
    total_pages: Option<u64>,
    total_results: Option<u64>,
) -> Option<StopReason> {
    if let Some(budget) = execution_time {
        if elapsed > budget {
            return Some(StopReason::TimeBudget);
        }
    }
    if let Some(end) = end_page {
        if next_page > end {
            return Some(StopReason::PageLimit);
        }
    }
    if total_results == Some(0) {
        return Some(StopReason::SiteExhausted);
    }
    if let Some(total) = total_pages {
        if next_page > total {
            return Some(StopReason::SiteExhausted);
        }
    }
    None
}

/// Worker count for one page: never more workers than live proxies or
/// queued items justify.
pub fn worker_count(live_proxies: usize, max_workers: usize, queue_len: usize) -> usize {
    live_proxies.min(max_workers).min(queue_len)
}

#[derive(Debug, Clone)]
struct DetailJob {
    ad_id: i64,
    attempts: u32,
}

/// The crawl orchestrator
pub struct WebScraper {
    config: ScraperConfig,
    api: SiteApi,
    pool: Arc<ProxyPool>,
    client: FetchClient,
    artifacts: ArtifactStore,
    extractor: DataExtractor,
}

impl WebScraper {
    pub fn new(
        config: ScraperConfig,
        api: SiteApi,
        pool: Arc<ProxyPool>,
        client: FetchClient,
        artifacts: ArtifactStore,
        extractor: DataExtractor,
    ) -> Self {
        Self {
            config,
            api,
            pool,
            client,
            artifacts,
            extractor,
        }
    }

    /// Run the crawl to one of its termination conditions.
    pub async fn run(&mut self) -> Result<StopReason> {
        info!(
            start_page = self.config.start_page,
            end_page = ?self.config.end_page,
            artifacts = %self.artifacts.root().display(),
            "starting web scraper"
        );

        if self.pool.is_empty() {
            self.pool.refresh().await?;
        }

        let started = Instant::now();
        let mut page = self.config.start_page;
        let mut totals = ExtractSummary::default();

        loop {
            let page_started = Instant::now();
            let search = self.fetch_search_page(page).await;
            self.artifacts.write_page(page, &search).await?;

            let stubs = self
                .extractor
                .filter_new_stubs(SiteApi::announcement_stubs(&search));
            let workers = worker_count(self.pool.len(), self.config.max_workers, stubs.len());
            info!(page, announcements = stubs.len(), workers, "dispatching detail fetches");

            if workers > 0 {
                let jobs = stubs
                    .into_iter()
                    .map(|stub| DetailJob {
                        ad_id: stub.ad_id,
                        attempts: 0,
                    })
                    .collect();
                self.fetch_details(page, jobs, workers).await;
            }

            let details = self.artifacts.read_details(page).await?;
            let summary = self.extractor.extract_page(&search, &details).await;
            totals += summary;
            info!(
                page,
                details = details.len(),
                new_announcements = summary.new_announcements,
                new_vehicles = summary.new_vehicles,
                new_sellers = summary.new_sellers,
                elapsed_secs = page_started.elapsed().as_secs(),
                "page complete"
            );

            page += 1;
            let reason = check_termination(
                started.elapsed(),
                self.config.execution_time,
                page,
                self.config.end_page,
                SiteApi::total_pages(&search),
                SiteApi::total_results(&search),
            );
            if let Some(reason) = reason {
                info!(
                    %reason,
                    pages = page - self.config.start_page,
                    new_announcements = totals.new_announcements,
                    new_vehicles = totals.new_vehicles,
                    new_sellers = totals.new_sellers,
                    "finished crawling"
                );
                return Ok(reason);
            }
        }
    }

    /// Fetch one search page, refreshing the pool and backing off for as
    /// long as it stays exhausted. The page number is never skipped.
    async fn fetch_search_page(&self, page: u64) -> Value {
        loop {
            let request = self.api.search_by_published_date(page);
            match self.client.fetch_json(&request).await {
                Ok(search) => return search,
                Err(error) => {
                    warn!(
                        page,
                        %error,
                        backoff_secs = self.config.refresh_backoff.as_secs(),
                        "search fetch failed; backing off before refresh"
                    );
                    tokio::time::sleep(self.config.refresh_backoff).await;
                    if let Err(error) = self.pool.refresh().await {
                        warn!(%error, "proxy pool refresh failed");
                    }
                }
            }
        }
    }

    /// Fan one page's detail jobs out to `workers` tasks over a shared
    /// queue and block until every task drains out. A failed job goes back
    /// on the queue with its attempt counter bumped, up to the bound.
    async fn fetch_details(&self, page: u64, jobs: VecDeque<DetailJob>, workers: usize) {
        let queue = Arc::new(Mutex::new(jobs));
        let mut join_set = JoinSet::new();

        for worker in 0..workers {
            let queue = Arc::clone(&queue);
            let client = self.client.clone();
            let api = self.api.clone();
            let artifacts = self.artifacts.clone();

            join_set.spawn(async move {
                loop {
                    let job = queue.lock().expect("detail queue lock poisoned").pop_front();
                    let Some(mut job) = job else { break };

                    let request = api.announcement_detail(job.ad_id);
                    match client.fetch_json(&request).await {
                        Ok(detail) => {
                            if let Err(error) = artifacts.write_detail(page, job.ad_id, &detail).await
                            {
                                warn!(worker, page, ad_id = job.ad_id, %error, "artifact write failed");
                            }
                        }
                        Err(_) => {
                            job.attempts += 1;
                            if job.attempts < MAX_JOB_ATTEMPTS {
                                queue
                                    .lock()
                                    .expect("detail queue lock poisoned")
                                    .push_back(job);
                            } else {
                                warn!(
                                    worker,
                                    page,
                                    ad_id = job.ad_id,
                                    attempts = job.attempts,
                                    "detail dropped after repeated failures"
                                );
                            }
                        }
                    }
                }
            });
        }

        while join_set.join_next().await.is_some() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;
    use crate::extract::EntityCache;
    use crate::proxy::checker::ProxyChecker;
    use crate::proxy::pool::PoolConfig;
    use crate::scrape::client::FetchConfig;
    use crate::site::SITE_NAME;
    use tempfile::tempdir;

    #[test]
    fn test_termination_time_budget() {
        let reason = check_termination(
            Duration::from_secs(61),
            Some(Duration::from_secs(60)),
            3,
            None,
            Some(100),
            Some(5000),
        );
        assert_eq!(reason, Some(StopReason::TimeBudget));
        assert_eq!(reason.unwrap().to_string(), "time ending");
    }

    #[test]
    fn test_termination_single_page_window() {
        // start_page = end_page = 5: after page 5 the next page is 6 and
        // the crawl stops with the page-ending reason.
        let reason = check_termination(
            Duration::from_secs(1),
            None,
            6,
            Some(5),
            Some(100),
            Some(5000),
        );
        assert_eq!(reason, Some(StopReason::PageLimit));
        assert_eq!(reason.unwrap().to_string(), "page ending");
    }

    #[test]
    fn test_termination_zero_results_stops_after_first_page() {
        let reason = check_termination(Duration::from_secs(1), None, 1, None, Some(0), Some(0));
        assert_eq!(reason, Some(StopReason::SiteExhausted));
    }

    #[test]
    fn test_termination_past_reported_total_pages() {
        let reason = check_termination(Duration::from_secs(1), None, 13, None, Some(12), Some(1180));
        assert_eq!(reason, Some(StopReason::SiteExhausted));

        let keep_going =
            check_termination(Duration::from_secs(1), None, 12, None, Some(12), Some(1180));
        assert_eq!(keep_going, None);
    }

    #[test]
    fn test_worker_count_bounds() {
        assert_eq!(worker_count(50, 10, 100), 10);
        assert_eq!(worker_count(3, 10, 100), 3);
        assert_eq!(worker_count(50, 10, 2), 2);
        assert_eq!(worker_count(0, 10, 100), 0);
    }

    #[tokio::test]
    async fn test_fetch_details_drops_jobs_after_bounded_attempts() {
        // An empty pool makes every fetch report exhaustion; the queue must
        // still drain instead of spinning forever, leaving no artifacts.
        let db = Database::connect("sqlite::memory:").await.unwrap();
        let pool = Arc::new(
            ProxyPool::new(Vec::new(), ProxyChecker::new(), PoolConfig::new()).unwrap(),
        );
        let dir = tempdir().unwrap();
        let artifacts = ArtifactStore::open(dir.path().to_path_buf());
        let scraper = WebScraper::new(
            ScraperConfig::new(),
            SiteApi::new(),
            Arc::clone(&pool),
            FetchClient::new(Arc::clone(&pool), FetchConfig::default()),
            artifacts.clone(),
            DataExtractor::new(db, EntityCache::empty(), SITE_NAME, "test"),
        );

        let jobs = VecDeque::from(vec![
            DetailJob { ad_id: 1, attempts: 0 },
            DetailJob { ad_id: 2, attempts: 0 },
        ]);
        scraper.fetch_details(0, jobs, 2).await;

        assert!(artifacts.read_details(0).await.unwrap().is_empty());
    }
}
