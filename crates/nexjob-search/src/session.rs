//! One search session: a single task reacting to user commands, debounce expiry, and fetch completions.

use std::sync::Arc;

use nexjob_adapters::{JobSource, SourceError};
use nexjob_core::{AnalyticsEvent, FacetKind, FilterState, Job, JobsPage};
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, warn};

use crate::debounce::Debouncer;
use crate::pagination::{ApplyOutcome, FetchTicket, PageStatus, PaginationController};
use crate::state::{SearchEdit, SearchStateSync};
use crate::{AnalyticsSink, NoopAnalytics, SessionConfig, FETCH_FAILED_MESSAGE};

const CHANNEL_CAPACITY: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchCommand {
    Edit(SearchEdit),
    /// Search immediately, skipping the quiet period (Enter key).
    SubmitNow,
    SentinelVisible,
    Retry,
}

#[derive(Debug, Clone)]
pub struct PageSnapshot {
    pub generation: u64,
    pub jobs: Vec<Job>,
    pub current_page: u32,
    pub has_more: bool,
    pub total_jobs: u64,
    pub status: PageStatus,
    pub fallback: bool,
    pub filters: FilterState,
    pub active_filter_count: usize,
}

#[derive(Debug, Clone)]
pub enum SearchEvent {
    Results(PageSnapshot),
    /// Replace the address bar in place, without navigation.
    UrlReplaced(String),
    FetchFailed { page: u32, message: String },
}

type FetchOutcome = (FetchTicket, Result<JobsPage, SourceError>);

pub struct SearchSession {
    source: Arc<dyn JobSource>,
    sync: SearchStateSync,
    /// State as of the search currently being paged through.
    active: SearchStateSync,
    pager: PaginationController,
    debouncer: Debouncer<()>,
    analytics: Arc<dyn AnalyticsSink>,
}

impl SearchSession {
    pub fn new(source: Arc<dyn JobSource>, sync: SearchStateSync, config: &SessionConfig) -> Self {
        Self {
            source,
            active: sync.clone(),
            sync,
            pager: PaginationController::new(config.page_size),
            debouncer: Debouncer::new(config.debounce),
            analytics: Arc::new(NoopAnalytics),
        }
    }

    pub fn with_analytics(mut self, analytics: Arc<dyn AnalyticsSink>) -> Self {
        self.analytics = analytics;
        self
    }

    pub fn spawn(self) -> SearchHandle {
        let (commands, command_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (event_tx, events) = mpsc::channel(CHANNEL_CAPACITY);
        let task = tokio::spawn(self.run(command_rx, event_tx));
        SearchHandle {
            commands,
            events,
            task,
        }
    }

    /// Runs until the command channel closes or nobody listens for events.
    pub async fn run(
        mut self,
        mut commands: mpsc::Receiver<SearchCommand>,
        events: mpsc::Sender<SearchEvent>,
    ) {
        let mut fetches: JoinSet<FetchOutcome> = JoinSet::new();
        let ticket = self.pager.begin_search();
        self.spawn_fetch(&mut fetches, ticket, true);

        loop {
            tokio::select! {
                command = commands.recv() => {
                    let Some(command) = command else { break };
                    self.handle_command(command, &mut fetches);
                }
                () = self.debouncer.expired(), if self.debouncer.is_pending() => {
                    self.start_search(&mut fetches);
                }
                Some(joined) = fetches.join_next(), if !fetches.is_empty() => {
                    match joined {
                        Ok((ticket, result)) => {
                            if !self.on_fetch_done(ticket, result, &events).await {
                                break;
                            }
                        }
                        Err(err) => warn!(error = %err, "search fetch task failed"),
                    }
                }
            }
        }

        fetches.abort_all();
        debug!("search session stopped");
    }

    fn handle_command(&mut self, command: SearchCommand, fetches: &mut JoinSet<FetchOutcome>) {
        match command {
            SearchCommand::Edit(edit) => {
                if let SearchEdit::ToggleFacet {
                    kind,
                    value,
                    selected: true,
                } = &edit
                {
                    self.analytics.record(&AnalyticsEvent::FilterApplied {
                        facet: kind.key().to_string(),
                        value: value.clone(),
                    });
                }
                if self.sync.apply(edit) {
                    self.debouncer.schedule(());
                }
            }
            SearchCommand::SubmitNow => self.start_search(fetches),
            SearchCommand::SentinelVisible => {
                if let Some(ticket) = self.pager.on_sentinel_visible() {
                    self.spawn_fetch(fetches, ticket, false);
                }
            }
            SearchCommand::Retry => {
                if let Some(ticket) = self.pager.retry() {
                    self.spawn_fetch(fetches, ticket, false);
                }
            }
        }
    }

    fn start_search(&mut self, fetches: &mut JoinSet<FetchOutcome>) {
        self.debouncer.cancel();
        self.active = self.sync.clone();
        let filters = self.active.effective();
        let keyword = filters.keyword.trim();
        if !keyword.is_empty() {
            self.analytics.record(&AnalyticsEvent::Search {
                term: keyword.to_string(),
                location: (!filters.province.is_empty()).then(|| filters.province.clone()),
                category: filters.facets.values(FacetKind::Category).first().cloned(),
            });
        }
        let ticket = self.pager.begin_search();
        self.spawn_fetch(fetches, ticket, false);
    }

    /// The very first load degrades to fallback data instead of failing.
    fn spawn_fetch(&self, fetches: &mut JoinSet<FetchOutcome>, ticket: FetchTicket, first_load: bool) {
        let source = Arc::clone(&self.source);
        let filters = self.active.effective().clone();
        let per_page = self.pager.page_size();
        debug!(generation = ticket.generation, page = ticket.page, "fetching jobs");
        fetches.spawn(async move {
            let result = if first_load {
                Ok(source
                    .fetch_jobs_or_fallback(&filters, ticket.page, per_page)
                    .await)
            } else {
                source.fetch_jobs(&filters, ticket.page, per_page).await
            };
            (ticket, result)
        });
    }

    /// Returns false once the event receiver is gone.
    async fn on_fetch_done(
        &mut self,
        ticket: FetchTicket,
        result: Result<JobsPage, SourceError>,
        events: &mpsc::Sender<SearchEvent>,
    ) -> bool {
        let result = result.map_err(|err| {
            warn!(page = ticket.page, error = %err, "job search fetch failed");
            FETCH_FAILED_MESSAGE.to_string()
        });

        match self.pager.apply(ticket, result) {
            ApplyOutcome::Discarded => {
                debug!(
                    generation = ticket.generation,
                    page = ticket.page,
                    current = self.pager.generation(),
                    "discarding stale page"
                );
                true
            }
            ApplyOutcome::Applied { .. } => {
                if events.send(SearchEvent::Results(self.snapshot())).await.is_err() {
                    return false;
                }
                if ticket.page == 1 && ticket.generation > 1 {
                    if let Some(url) = self.active.url_sync() {
                        return events.send(SearchEvent::UrlReplaced(url)).await.is_ok();
                    }
                }
                true
            }
            ApplyOutcome::Failed => events
                .send(SearchEvent::FetchFailed {
                    page: ticket.page,
                    message: self
                        .pager
                        .last_error()
                        .unwrap_or(FETCH_FAILED_MESSAGE)
                        .to_string(),
                })
                .await
                .is_ok(),
        }
    }

    fn snapshot(&self) -> PageSnapshot {
        PageSnapshot {
            generation: self.pager.generation(),
            jobs: self.pager.jobs().to_vec(),
            current_page: self.pager.current_page(),
            has_more: self.pager.has_more(),
            total_jobs: self.pager.total_jobs(),
            status: self.pager.status(),
            fallback: self.pager.is_fallback(),
            filters: self.active.effective().clone(),
            active_filter_count: self.active.active_filter_count(),
        }
    }
}

pub struct SearchHandle {
    commands: mpsc::Sender<SearchCommand>,
    events: mpsc::Receiver<SearchEvent>,
    task: JoinHandle<()>,
}

impl SearchHandle {
    /// Returns false once the session has stopped.
    pub async fn send(&self, command: SearchCommand) -> bool {
        self.commands.send(command).await.is_ok()
    }

    pub async fn next_event(&mut self) -> Option<SearchEvent> {
        self.events.recv().await
    }

    pub async fn shutdown(self) {
        let SearchHandle {
            commands,
            events,
            task,
        } = self;
        drop(commands);
        drop(events);
        if let Err(err) = task.await {
            warn!(error = %err, "search session ended abnormally");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::RouteLock;
    use async_trait::async_trait;
    use nexjob_adapters::{fallback, ConnectionReport};
    use nexjob_core::{Article, FilterData};
    use std::sync::Mutex;
    use std::time::Duration;

    struct ScriptedSource {
        total_pages: u32,
        slow: Option<(&'static str, u32)>,
        calls: Mutex<Vec<(String, u32)>>,
    }

    impl ScriptedSource {
        fn new(total_pages: u32) -> Self {
            Self {
                total_pages,
                slow: None,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn slow_on(mut self, keyword: &'static str, page: u32) -> Self {
            self.slow = Some((keyword, page));
            self
        }

        fn calls(&self) -> Vec<(String, u32)> {
            self.calls.lock().expect("calls").clone()
        }
    }

    #[async_trait]
    impl JobSource for ScriptedSource {
        fn source_id(&self) -> &'static str {
            "scripted"
        }

        async fn fetch_jobs(
            &self,
            filters: &FilterState,
            page: u32,
            _per_page: u32,
        ) -> Result<JobsPage, SourceError> {
            let keyword = filters.keyword.clone();
            self.calls.lock().expect("calls").push((keyword.clone(), page));
            if self.slow == Some((keyword.as_str(), page)) {
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
            let jobs: Vec<Job> = (0..2)
                .map(|i| Job {
                    id: format!("{keyword}-{page}-{i}"),
                    ..fallback::sample_job()
                })
                .collect();
            Ok(JobsPage {
                raw_count: jobs.len(),
                jobs,
                total_pages: self.total_pages,
                total_jobs: u64::from(self.total_pages) * 2,
                current_page: page,
                has_more: page < self.total_pages,
                fallback: false,
            })
        }

        async fn fetch_job_by_slug(&self, _slug: &str) -> Option<Job> {
            None
        }

        async fn fetch_job_by_id(&self, _id: &str) -> Option<Job> {
            None
        }

        async fn fetch_filter_data(&self) -> FilterData {
            fallback::filter_data()
        }

        async fn fetch_articles(&self, _limit: Option<u32>) -> Vec<Article> {
            Vec::new()
        }

        async fn fetch_article_by_slug(&self, _slug: &str) -> Option<Article> {
            None
        }

        async fn test_connection(&self) -> ConnectionReport {
            ConnectionReport::ok("scripted")
        }

        async fn test_filters_connection(&self) -> ConnectionReport {
            ConnectionReport::ok("scripted")
        }
    }

    #[derive(Default)]
    struct RecordingAnalytics {
        events: Mutex<Vec<AnalyticsEvent>>,
    }

    impl AnalyticsSink for RecordingAnalytics {
        fn record(&self, event: &AnalyticsEvent) {
            self.events.lock().expect("events").push(event.clone());
        }
    }

    async fn next_results(handle: &mut SearchHandle) -> PageSnapshot {
        match handle.next_event().await {
            Some(SearchEvent::Results(snapshot)) => snapshot,
            other => panic!("expected results, got {other:?}"),
        }
    }

    fn keyword(value: &str) -> SearchCommand {
        SearchCommand::Edit(SearchEdit::SetKeyword(value.to_string()))
    }

    #[tokio::test(start_paused = true)]
    async fn rapid_keyword_edits_issue_one_request() {
        let source = Arc::new(ScriptedSource::new(3));
        let analytics = Arc::new(RecordingAnalytics::default());
        let mut handle = SearchSession::new(
            source.clone(),
            SearchStateSync::new(RouteLock::none()),
            &SessionConfig::default(),
        )
        .with_analytics(analytics.clone())
        .spawn();

        let initial = next_results(&mut handle).await;
        assert_eq!(initial.jobs.len(), 2);

        for value in ["r", "re", "react"] {
            assert!(handle.send(keyword(value)).await);
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        let snapshot = next_results(&mut handle).await;
        assert_eq!(snapshot.filters.keyword, "react");
        assert_eq!(snapshot.current_page, 1);
        assert_eq!(
            source.calls(),
            vec![(String::new(), 1), ("react".to_string(), 1)]
        );
        match handle.next_event().await {
            Some(SearchEvent::UrlReplaced(url)) => assert_eq!(url, "/lowongan-kerja/?search=react"),
            other => panic!("expected url sync, got {other:?}"),
        }

        let recorded = analytics.events.lock().expect("events").clone();
        assert_eq!(
            recorded,
            vec![AnalyticsEvent::Search {
                term: "react".into(),
                location: None,
                category: None,
            }]
        );
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stale_next_page_is_discarded_after_new_search() {
        let source = Arc::new(ScriptedSource::new(3).slow_on("", 2));
        let mut handle = SearchSession::new(
            source.clone(),
            SearchStateSync::new(RouteLock::none()),
            &SessionConfig::default(),
        )
        .spawn();

        next_results(&mut handle).await;
        assert!(handle.send(SearchCommand::SentinelVisible).await);
        assert!(handle.send(keyword("kasir")).await);
        assert!(handle.send(SearchCommand::SubmitNow).await);

        let snapshot = next_results(&mut handle).await;
        assert_eq!(snapshot.generation, 2);
        assert!(snapshot.jobs.iter().all(|j| j.id.starts_with("kasir-1-")));
        assert!(matches!(
            handle.next_event().await,
            Some(SearchEvent::UrlReplaced(_))
        ));

        // The slow page-2 response for the old search lands later and must not surface.
        let late = tokio::time::timeout(Duration::from_secs(30), handle.next_event()).await;
        assert!(late.is_err(), "unexpected event {late:?}");
        assert!(source.calls().contains(&(String::new(), 2)));
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn infinite_scroll_appends_until_exhausted() {
        let source = Arc::new(ScriptedSource::new(2));
        let mut handle = SearchSession::new(
            source,
            SearchStateSync::new(RouteLock::none()),
            &SessionConfig::default(),
        )
        .spawn();

        next_results(&mut handle).await;
        assert!(handle.send(SearchCommand::SentinelVisible).await);
        // Duplicate trigger while page 2 is loading is ignored.
        assert!(handle.send(SearchCommand::SentinelVisible).await);
        let snapshot = next_results(&mut handle).await;
        let ids: Vec<_> = snapshot.jobs.iter().map(|j| j.id.as_str()).collect();
        assert_eq!(ids, vec!["-1-0", "-1-1", "-2-0", "-2-1"]);
        assert_eq!(snapshot.status, PageStatus::Exhausted);

        assert!(handle.send(SearchCommand::SentinelVisible).await);
        let quiet = tokio::time::timeout(Duration::from_secs(5), handle.next_event()).await;
        assert!(quiet.is_err());
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn route_locked_sessions_do_not_touch_the_url() {
        let source = Arc::new(ScriptedSource::new(1));
        let mut handle = SearchSession::new(
            source,
            SearchStateSync::new(RouteLock::category("Sales")),
            &SessionConfig::default(),
        )
        .spawn();

        let initial = next_results(&mut handle).await;
        assert_eq!(initial.filters.facets.categories, vec!["Sales"]);
        assert_eq!(initial.active_filter_count, 0);

        assert!(handle.send(keyword("admin")).await);
        let snapshot = next_results(&mut handle).await;
        assert_eq!(snapshot.active_filter_count, 1);
        let quiet = tokio::time::timeout(Duration::from_secs(5), handle.next_event()).await;
        assert!(quiet.is_err());
        handle.shutdown().await;
    }
}
