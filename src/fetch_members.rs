//! Member listing for a single channel.
//!
//! Pages through the channel's participant list at increasing offsets, one
//! request at a time. Flood-wait signals are honoured without limit,
//! unclassified failures are retried against a per-call budget, and a
//! permission error ends the listing early. Whatever was gathered is always
//! returned; early stops are reported through the log only.

use crate::api::{ApiError, MemberDirectory, SearchFilter};
use crate::channel::{ChannelRef, ChannelRefError};
use crate::config::FetchConfig;
use crate::schemas::{ChannelInfo, MemberRecord};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Error, Debug)]
pub enum ScrapeError {
    /// The reference could not be parsed or the directory does not know it
    #[error("Invalid channel reference: {0}")]
    InvalidChannel(String),

    #[error("Channel lookup failed: {0}")]
    Resolve(#[source] ApiError),
}

impl From<ChannelRefError> for ScrapeError {
    fn from(err: ChannelRefError) -> Self {
        ScrapeError::InvalidChannel(err.to_string())
    }
}

/// Listing parameters for one call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchParams {
    pub page_size: u32,
    pub max_retries: u32,
    pub retry_delay: Duration,
    /// Pause between full pages
    pub page_pause: Duration,
}

impl Default for FetchParams {
    fn default() -> Self {
        Self::from(&FetchConfig::default())
    }
}

impl From<&FetchConfig> for FetchParams {
    fn from(config: &FetchConfig) -> Self {
        Self {
            page_size: config.page_size.max(1),
            max_retries: config.max_retries,
            retry_delay: config.retry_delay(),
            page_pause: config.page_pause(),
        }
    }
}

/// Loop state, owned by a single `fetch_all` call.
#[derive(Debug)]
struct FetchState {
    offset: u64,
    accumulated: Vec<MemberRecord>,
    retries_remaining: u32,
}

impl FetchState {
    fn new(max_retries: u32) -> Self {
        Self {
            offset: 0,
            accumulated: Vec::new(),
            retries_remaining: max_retries,
        }
    }
}

/// What to do after one page request
enum Step {
    Continue(FetchState),
    Done(FetchState),
}

/// Drives the paged member listing against a [`MemberDirectory`].
pub struct PaginatedFetcher<'a, D: MemberDirectory + ?Sized> {
    directory: &'a D,
    params: FetchParams,
}

impl<'a, D: MemberDirectory + ?Sized> PaginatedFetcher<'a, D> {
    pub fn new(directory: &'a D, params: FetchParams) -> Self {
        Self { directory, params }
    }

    /// Resolve a parsed reference to a channel entity.
    pub async fn resolve(&self, reference: &ChannelRef) -> Result<ChannelInfo, ScrapeError> {
        match self.directory.resolve_channel(reference).await {
            Ok(channel) => Ok(channel),
            Err(ApiError::InvalidChannel(reason)) => {
                Err(ScrapeError::InvalidChannel(format!("{}: {}", reference, reason)))
            }
            Err(e) => Err(ScrapeError::Resolve(e)),
        }
    }

    /// Fetch every member of `channel`, in listing order.
    ///
    /// Never fails: a permission error or an exhausted retry budget ends the
    /// listing and the members gathered so far are returned.
    pub async fn fetch_all(&self, channel: &ChannelInfo) -> Vec<MemberRecord> {
        let filter = SearchFilter::none();
        let mut state = FetchState::new(self.params.max_retries);

        loop {
            state = match self.step(channel, &filter, state).await {
                Step::Continue(state) => state,
                Step::Done(state) => return state.accumulated,
            };
        }
    }

    async fn step(&self, channel: &ChannelInfo, filter: &SearchFilter, mut state: FetchState) -> Step {
        let page_size = self.params.page_size;
        debug!("Requesting {} members at offset {}", page_size, state.offset);

        match self
            .directory
            .request_page(channel, filter, state.offset, page_size)
            .await
        {
            Ok(page) => {
                if page.is_empty() {
                    return Step::Done(state);
                }

                let received = page.len();
                state.accumulated.extend(page.records);
                state.offset += received as u64;
                info!("Retrieved {} participants so far.", state.accumulated.len());

                if received < page_size as usize {
                    // Short page: end of the list
                    return Step::Done(state);
                }

                tokio::time::sleep(self.params.page_pause).await;
                Step::Continue(state)
            }
            Err(ApiError::RateLimited { wait }) => {
                warn!("Hit rate limit. Waiting for {} seconds.", wait.as_secs());
                tokio::time::sleep(wait).await;
                Step::Continue(state)
            }
            Err(ApiError::PermissionDenied(reason)) => {
                error!(
                    "Admin rights are required to fetch all participants ({}). Stopping with {} participants.",
                    reason,
                    state.accumulated.len()
                );
                Step::Done(state)
            }
            Err(e) => {
                error!("Error retrieving participants: {}", e);
                if state.retries_remaining > 0 {
                    info!(
                        "Retrying in {} seconds... ({} retries left)",
                        self.params.retry_delay.as_secs(),
                        state.retries_remaining
                    );
                    tokio::time::sleep(self.params.retry_delay).await;
                    state.retries_remaining -= 1;
                    Step::Continue(state)
                } else {
                    error!(
                        "Max retries reached. Stopping participant retrieval with {} participants.",
                        state.accumulated.len()
                    );
                    Step::Done(state)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schemas::PageResult;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio::time::Instant;

    /// Scripted response for one request
    enum Reply {
        Page(usize),
        Flood(u64),
        Denied,
        Broken,
    }

    /// Directory that answers requests from a script and records offsets.
    /// Page replies hand out sequential ids starting at the requested offset.
    struct ScriptedDirectory {
        replies: Mutex<VecDeque<Reply>>,
        offsets: Mutex<Vec<u64>>,
    }

    impl ScriptedDirectory {
        fn new(replies: Vec<Reply>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                offsets: Mutex::new(Vec::new()),
            }
        }

        fn offsets(&self) -> Vec<u64> {
            self.offsets.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MemberDirectory for ScriptedDirectory {
        async fn resolve_channel(&self, reference: &ChannelRef) -> Result<ChannelInfo, ApiError> {
            match reference {
                ChannelRef::Username(name) if name == "missing_chan" => {
                    Err(ApiError::InvalidChannel("USERNAME_NOT_OCCUPIED".into()))
                }
                ChannelRef::Username(name) if name == "flaky_chan" => {
                    Err(ApiError::Transient("HTTP 502".into()))
                }
                _ => Ok(channel()),
            }
        }

        async fn request_page(
            &self,
            _channel: &ChannelInfo,
            filter: &SearchFilter,
            offset: u64,
            limit: u32,
        ) -> Result<PageResult, ApiError> {
            assert_eq!(filter, &SearchFilter::none());
            self.offsets.lock().unwrap().push(offset);
            let reply = self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .expect("request past end of script");
            match reply {
                Reply::Page(n) => {
                    assert!(n <= limit as usize);
                    let records = (0..n as i64)
                        .map(|i| MemberRecord::bare(offset as i64 + i))
                        .collect();
                    Ok(PageResult::new(records))
                }
                Reply::Flood(secs) => Err(ApiError::RateLimited {
                    wait: Duration::from_secs(secs),
                }),
                Reply::Denied => Err(ApiError::PermissionDenied("CHAT_ADMIN_REQUIRED".into())),
                Reply::Broken => Err(ApiError::Transient("connection reset".into())),
            }
        }
    }

    fn channel() -> ChannelInfo {
        ChannelInfo {
            id: 100,
            title: Some("Test".into()),
            username: Some("test_chan".into()),
            participants_count: Some(550),
        }
    }

    fn params(page_size: u32, max_retries: u32) -> FetchParams {
        FetchParams {
            page_size,
            max_retries,
            retry_delay: Duration::from_secs(30),
            page_pause: Duration::from_secs(1),
        }
    }

    fn ids(records: &[MemberRecord]) -> Vec<i64> {
        records.iter().map(|r| r.id).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_page_ends_listing() {
        let directory = ScriptedDirectory::new(vec![Reply::Page(200), Reply::Page(200), Reply::Page(150)]);
        let fetcher = PaginatedFetcher::new(&directory, params(200, 5));

        let records = fetcher.fetch_all(&channel()).await;

        assert_eq!(records.len(), 550);
        assert_eq!(ids(&records), (0..550).collect::<Vec<i64>>());
        assert_eq!(directory.offsets(), vec![0, 200, 400]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_page_ends_listing() {
        let directory = ScriptedDirectory::new(vec![Reply::Page(3), Reply::Page(3), Reply::Page(0)]);
        let fetcher = PaginatedFetcher::new(&directory, params(3, 5));

        let records = fetcher.fetch_all(&channel()).await;

        assert_eq!(ids(&records), vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(directory.offsets(), vec![0, 3, 6]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_channel() {
        let directory = ScriptedDirectory::new(vec![Reply::Page(0)]);
        let fetcher = PaginatedFetcher::new(&directory, params(200, 5));

        let start = Instant::now();
        assert!(fetcher.fetch_all(&channel()).await.is_empty());
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_between_full_pages_only() {
        let directory = ScriptedDirectory::new(vec![Reply::Page(2), Reply::Page(2), Reply::Page(1)]);
        let fetcher = PaginatedFetcher::new(&directory, params(2, 5));

        let start = Instant::now();
        fetcher.fetch_all(&channel()).await;

        // Two full pages, two pauses; none after the short page
        assert_eq!(start.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_retries_same_offset() {
        let directory = ScriptedDirectory::new(vec![Reply::Page(200), Reply::Flood(5), Reply::Page(0)]);
        let fetcher = PaginatedFetcher::new(&directory, params(200, 5));

        let start = Instant::now();
        let records = fetcher.fetch_all(&channel()).await;

        assert_eq!(records.len(), 200);
        assert_eq!(directory.offsets(), vec![0, 200, 200]);
        // One page pause plus the five second flood wait
        assert_eq!(start.elapsed(), Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_does_not_spend_retry_budget() {
        let mut script: Vec<Reply> = (0..20).map(|_| Reply::Flood(1)).collect();
        script.push(Reply::Broken);
        script.push(Reply::Page(4));
        let directory = ScriptedDirectory::new(script);
        let fetcher = PaginatedFetcher::new(&directory, params(10, 1));

        let records = fetcher.fetch_all(&channel()).await;

        assert_eq!(ids(&records), vec![0, 1, 2, 3]);
        assert_eq!(directory.offsets(), vec![0; 22]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_budget_exhaustion() {
        // One full page, then failures at offset 5 until the budget is gone
        let mut script = vec![Reply::Page(5)];
        script.extend((0..4).map(|_| Reply::Broken));
        let directory = ScriptedDirectory::new(script);
        let fetcher = PaginatedFetcher::new(&directory, params(5, 3));

        let start = Instant::now();
        let records = fetcher.fetch_all(&channel()).await;

        assert_eq!(ids(&records), vec![0, 1, 2, 3, 4]);
        assert_eq!(directory.offsets(), vec![0, 5, 5, 5, 5]);
        // Page pause plus three retry delays
        assert_eq!(start.elapsed(), Duration::from_secs(1 + 3 * 30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_budget_is_per_call_not_per_page() {
        let directory = ScriptedDirectory::new(vec![
            Reply::Broken,
            Reply::Page(2),
            Reply::Broken,
            Reply::Broken,
        ]);
        let fetcher = PaginatedFetcher::new(&directory, params(2, 2));

        let records = fetcher.fetch_all(&channel()).await;

        assert_eq!(ids(&records), vec![0, 1]);
        assert_eq!(directory.offsets(), vec![0, 0, 2, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_retries_stops_on_first_failure() {
        let directory = ScriptedDirectory::new(vec![Reply::Broken]);
        let fetcher = PaginatedFetcher::new(&directory, params(200, 0));

        let start = Instant::now();
        assert!(fetcher.fetch_all(&channel()).await.is_empty());
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient_failure() {
        let directory = ScriptedDirectory::new(vec![Reply::Page(3), Reply::Broken, Reply::Page(1)]);
        let fetcher = PaginatedFetcher::new(&directory, params(3, 5));

        let records = fetcher.fetch_all(&channel()).await;

        assert_eq!(ids(&records), vec![0, 1, 2, 3]);
        assert_eq!(directory.offsets(), vec![0, 3, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permission_denied_short_circuits() {
        let directory = ScriptedDirectory::new(vec![Reply::Page(4), Reply::Page(4), Reply::Denied]);
        let fetcher = PaginatedFetcher::new(&directory, params(4, 5));

        let records = fetcher.fetch_all(&channel()).await;

        assert_eq!(ids(&records), (0..8).collect::<Vec<i64>>());
        assert_eq!(directory.offsets(), vec![0, 4, 8]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permission_denied_on_first_page() {
        let directory = ScriptedDirectory::new(vec![Reply::Denied]);
        let fetcher = PaginatedFetcher::new(&directory, params(200, 5));
        assert!(fetcher.fetch_all(&channel()).await.is_empty());
        assert_eq!(directory.offsets(), vec![0]);
    }

    #[tokio::test]
    async fn test_resolve_maps_unknown_channel() {
        let directory = ScriptedDirectory::new(Vec::new());
        let fetcher = PaginatedFetcher::new(&directory, FetchParams::default());

        let reference = ChannelRef::Username("missing_chan".into());
        match fetcher.resolve(&reference).await {
            Err(ScrapeError::InvalidChannel(msg)) => assert!(msg.contains("@missing_chan")),
            other => panic!("unexpected {other:?}"),
        }

        let reference = ChannelRef::Username("flaky_chan".into());
        assert!(matches!(
            fetcher.resolve(&reference).await,
            Err(ScrapeError::Resolve(ApiError::Transient(_)))
        ));

        let found = fetcher.resolve(&ChannelRef::Id(100)).await.unwrap();
        assert_eq!(found, channel());
    }

    #[test]
    fn test_unparseable_reference_is_invalid_channel() {
        let err: ScrapeError = ChannelRef::parse("not a channel").unwrap_err().into();
        assert!(matches!(err, ScrapeError::InvalidChannel(_)));
    }

    #[test]
    fn test_params_from_config() {
        let config = FetchConfig {
            page_size: 0,
            max_retries: 2,
            retry_delay_secs: 7,
            page_pause_ms: 250,
        };
        let params = FetchParams::from(&config);
        assert_eq!(params.page_size, 1);
        assert_eq!(params.max_retries, 2);
        assert_eq!(params.retry_delay, Duration::from_secs(7));
        assert_eq!(params.page_pause, Duration::from_millis(250));
    }
}
