//! Infinite-scroll page accumulation with stale-response protection.

use std::collections::HashSet;

use nexjob_core::{Job, JobsPage};
use serde::Serialize;

/// Scroll state of the list.
///
/// `Exhausted` is decided from the CMS's raw page count, not from what survives local filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PageStatus {
    Idle,
    FetchingFirstPage,
    FetchingNextPage,
    Exhausted,
    Error,
}

/// Identifies one outstanding fetch. Results carrying an old generation are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FetchTicket {
    pub generation: u64,
    pub page: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied { appended: usize },
    Failed,
    Discarded,
}

#[derive(Debug, Clone)]
pub struct PaginationController {
    page_size: u32,
    generation: u64,
    current_page: u32,
    jobs: Vec<Job>,
    seen: HashSet<String>,
    has_more: bool,
    total_jobs: u64,
    status: PageStatus,
    in_flight: Option<FetchTicket>,
    failed: Option<FetchTicket>,
    last_error: Option<String>,
    fallback: bool,
}

impl PaginationController {
    pub fn new(page_size: u32) -> Self {
        Self {
            page_size: page_size.max(1),
            generation: 0,
            current_page: 0,
            jobs: Vec::new(),
            seen: HashSet::new(),
            has_more: false,
            total_jobs: 0,
            status: PageStatus::Idle,
            in_flight: None,
            failed: None,
            last_error: None,
            fallback: false,
        }
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn status(&self) -> PageStatus {
        self.status
    }

    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    pub fn current_page(&self) -> u32 {
        self.current_page
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn total_jobs(&self) -> u64 {
        self.total_jobs
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn is_fallback(&self) -> bool {
        self.fallback
    }

    pub fn in_flight(&self) -> Option<FetchTicket> {
        self.in_flight
    }

    /// Starts a new search: clears results and supersedes anything in flight.
    pub fn begin_search(&mut self) -> FetchTicket {
        self.generation += 1;
        self.current_page = 0;
        self.jobs.clear();
        self.seen.clear();
        self.has_more = true;
        self.total_jobs = 0;
        self.failed = None;
        self.last_error = None;
        self.fallback = false;
        self.status = PageStatus::FetchingFirstPage;
        let ticket = FetchTicket {
            generation: self.generation,
            page: 1,
        };
        self.in_flight = Some(ticket);
        ticket
    }

    /// Requests the next page when the sentinel scrolls into view, unless one is already loading.
    pub fn on_sentinel_visible(&mut self) -> Option<FetchTicket> {
        if self.in_flight.is_some()
            || !self.has_more
            || self.current_page == 0
            || self.status != PageStatus::Idle
        {
            return None;
        }
        let ticket = FetchTicket {
            generation: self.generation,
            page: self.current_page + 1,
        };
        self.in_flight = Some(ticket);
        self.status = PageStatus::FetchingNextPage;
        Some(ticket)
    }

    /// Re-issues the page that failed last.
    pub fn retry(&mut self) -> Option<FetchTicket> {
        if self.status != PageStatus::Error || self.in_flight.is_some() {
            return None;
        }
        let ticket = self.failed.take()?;
        if ticket.generation != self.generation {
            return None;
        }
        self.last_error = None;
        self.status = if ticket.page == 1 {
            PageStatus::FetchingFirstPage
        } else {
            PageStatus::FetchingNextPage
        };
        self.in_flight = Some(ticket);
        Some(ticket)
    }

    /// Folds a fetch result into the list.
    ///
    /// The list ends only when the CMS reports no further page or returns zero raw posts. A page
    /// whose posts are all removed by local filtering keeps `has_more` set, so scrolling continues.
    pub fn apply(&mut self, ticket: FetchTicket, result: Result<JobsPage, String>) -> ApplyOutcome {
        if self.in_flight != Some(ticket) {
            return ApplyOutcome::Discarded;
        }
        self.in_flight = None;

        match result {
            Ok(page) => {
                let mut appended = 0;
                for job in page.jobs {
                    if self.seen.insert(job.id.clone()) {
                        self.jobs.push(job);
                        appended += 1;
                    }
                }
                self.current_page = ticket.page;
                self.total_jobs = page.total_jobs;
                self.fallback |= page.fallback;
                // A page that narrows to nothing locally still advances; only an empty CMS page ends the list.
                self.has_more = page.has_more && page.raw_count > 0;
                self.status = if self.has_more {
                    PageStatus::Idle
                } else {
                    PageStatus::Exhausted
                };
                ApplyOutcome::Applied { appended }
            }
            Err(message) => {
                self.has_more = false;
                self.failed = Some(ticket);
                self.last_error = Some(message);
                self.status = PageStatus::Error;
                ApplyOutcome::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexjob_adapters::fallback::sample_job;

    fn job(id: &str) -> Job {
        Job {
            id: id.into(),
            slug: format!("job-{id}"),
            ..sample_job()
        }
    }

    fn page(ids: &[&str], has_more: bool) -> JobsPage {
        JobsPage {
            jobs: ids.iter().map(|id| job(id)).collect(),
            total_pages: if has_more { 9 } else { 1 },
            total_jobs: 100,
            current_page: 1,
            has_more,
            raw_count: ids.len(),
            fallback: false,
        }
    }

    fn ids(pager: &PaginationController) -> Vec<&str> {
        pager.jobs().iter().map(|j| j.id.as_str()).collect()
    }

    #[test]
    fn pages_append_in_arrival_order_without_duplicates() {
        let mut pager = PaginationController::new(24);
        let first = pager.begin_search();
        assert_eq!(
            pager.apply(first, Ok(page(&["1", "2", "3"], true))),
            ApplyOutcome::Applied { appended: 3 }
        );
        let second = pager.on_sentinel_visible().expect("page 2");
        assert_eq!(second.page, 2);
        assert_eq!(
            pager.apply(second, Ok(page(&["3", "4"], true))),
            ApplyOutcome::Applied { appended: 1 }
        );
        assert_eq!(ids(&pager), vec!["1", "2", "3", "4"]);
        assert_eq!(pager.current_page(), 2);
    }

    #[test]
    fn sentinel_is_ignored_while_loading_or_before_first_page() {
        let mut pager = PaginationController::new(24);
        assert!(pager.on_sentinel_visible().is_none());
        let first = pager.begin_search();
        assert!(pager.on_sentinel_visible().is_none());
        pager.apply(first, Ok(page(&["1"], true)));
        assert!(pager.on_sentinel_visible().is_some());
        assert!(pager.on_sentinel_visible().is_none());
        assert_eq!(pager.status(), PageStatus::FetchingNextPage);
    }

    #[test]
    fn stale_generation_results_are_discarded() {
        let mut pager = PaginationController::new(24);
        let first = pager.begin_search();
        pager.apply(first, Ok(page(&["1"], true)));
        let old_second = pager.on_sentinel_visible().expect("page 2");

        let fresh = pager.begin_search();
        assert_eq!(
            pager.apply(old_second, Ok(page(&["old"], true))),
            ApplyOutcome::Discarded
        );
        assert_eq!(pager.status(), PageStatus::FetchingFirstPage);
        pager.apply(fresh, Ok(page(&["9"], false)));
        assert_eq!(ids(&pager), vec!["9"]);
    }

    #[test]
    fn empty_cms_page_exhausts() {
        let mut pager = PaginationController::new(24);
        let first = pager.begin_search();
        pager.apply(first, Ok(page(&["1"], true)));
        let second = pager.on_sentinel_visible().expect("page 2");
        pager.apply(second, Ok(page(&[], true)));
        assert_eq!(pager.status(), PageStatus::Exhausted);
        assert!(!pager.has_more());
        assert!(pager.on_sentinel_visible().is_none());
    }

    #[test]
    fn locally_filtered_empty_page_keeps_scrolling() {
        let mut pager = PaginationController::new(24);
        let first = pager.begin_search();
        let mut filtered = page(&[], true);
        filtered.raw_count = 24;
        pager.apply(first, Ok(filtered));
        assert_eq!(pager.status(), PageStatus::Idle);
        assert_eq!(pager.on_sentinel_visible().map(|t| t.page), Some(2));
    }

    #[test]
    fn failure_on_later_page_keeps_results_and_can_retry() {
        let mut pager = PaginationController::new(24);
        let first = pager.begin_search();
        pager.apply(first, Ok(page(&["1", "2"], true)));
        let second = pager.on_sentinel_visible().expect("page 2");
        assert_eq!(
            pager.apply(second, Err("timeout".into())),
            ApplyOutcome::Failed
        );
        assert_eq!(pager.status(), PageStatus::Error);
        assert!(!pager.has_more());
        assert_eq!(ids(&pager), vec!["1", "2"]);
        assert!(pager.on_sentinel_visible().is_none());

        let retried = pager.retry().expect("retry");
        assert_eq!(retried, second);
        assert!(pager.retry().is_none());
        pager.apply(retried, Ok(page(&["3"], false)));
        assert_eq!(ids(&pager), vec!["1", "2", "3"]);
        assert_eq!(pager.status(), PageStatus::Exhausted);
    }
}
