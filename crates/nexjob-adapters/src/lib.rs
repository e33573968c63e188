//! Job source contracts + the WordPress CMS client.

use async_trait::async_trait;
use nexjob_core::{facets, Article, FilterData, FilterState, Job, JobsPage};
use nexjob_storage::FetchError;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

pub mod fallback;
pub mod memory;
pub mod text;
pub mod wordpress;

pub use memory::MemorySource;
pub use wordpress::WordPressSource;

pub const CRATE_NAME: &str = "nexjob-adapters";

pub const RELATED_JOBS_LIMIT: usize = 4;
pub const RELATED_ARTICLES_LIMIT: usize = 3;

/// Jobs scanned when picking related postings.
const RELATED_SCAN_SIZE: u32 = 100;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("invalid CMS payload from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid CMS url: {0}")]
    Url(#[from] url::ParseError),
    #[error("{0}")]
    Message(String),
}

/// Outcome of probing a CMS endpoint from the admin screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionReport {
    pub ok: bool,
    pub detail: String,
}

impl ConnectionReport {
    pub fn ok(detail: impl Into<String>) -> Self {
        Self {
            ok: true,
            detail: detail.into(),
        }
    }

    pub fn failed(detail: impl Into<String>) -> Self {
        Self {
            ok: false,
            detail: detail.into(),
        }
    }
}

#[async_trait]
pub trait JobSource: Send + Sync {
    fn source_id(&self) -> &'static str;

    /// One page from the CMS, narrowed locally by every facet the CMS cannot filter on.
    async fn fetch_jobs(
        &self,
        filters: &FilterState,
        page: u32,
        per_page: u32,
    ) -> Result<JobsPage, SourceError>;

    async fn fetch_job_by_slug(&self, slug: &str) -> Option<Job>;

    async fn fetch_job_by_id(&self, id: &str) -> Option<Job>;

    /// Never fails; an unreachable CMS yields the built-in taxonomy.
    async fn fetch_filter_data(&self) -> FilterData;

    async fn fetch_articles(&self, limit: Option<u32>) -> Vec<Article>;

    async fn fetch_article_by_slug(&self, slug: &str) -> Option<Article>;

    async fn test_connection(&self) -> ConnectionReport;

    async fn test_filters_connection(&self) -> ConnectionReport;

    /// First-load listing path: failures degrade to the fallback dataset.
    async fn fetch_jobs_or_fallback(
        &self,
        filters: &FilterState,
        page: u32,
        per_page: u32,
    ) -> JobsPage {
        match self.fetch_jobs(filters, page, per_page).await {
            Ok(page) => page,
            Err(err) => {
                warn!(source = self.source_id(), page, error = %err, "job listing failed; serving fallback");
                fallback::jobs_page(filters)
            }
        }
    }

    async fn fetch_related_jobs(&self, current_id: &str, category: &str, limit: usize) -> Vec<Job> {
        let page = match self
            .fetch_jobs(&FilterState::default(), 1, RELATED_SCAN_SIZE)
            .await
        {
            Ok(page) => page,
            Err(err) => {
                warn!(source = self.source_id(), error = %err, "related jobs unavailable");
                return Vec::new();
            }
        };
        let category = category.to_lowercase();
        page.jobs
            .into_iter()
            .filter(|job| job.id != current_id && job.category.to_lowercase().contains(&category))
            .take(limit)
            .collect()
    }

    async fn fetch_related_articles(&self, current_id: &str, limit: usize) -> Vec<Article> {
        self.fetch_articles(None)
            .await
            .into_iter()
            .filter(|article| article.id != current_id)
            .take(limit)
            .collect()
    }
}

/// Applies the local facet pass and sort to raw CMS jobs.
pub fn narrow_page(raw: Vec<Job>, filters: &FilterState, keyword: facets::KeywordMode) -> Vec<Job> {
    let mut jobs = facets::apply_with(&raw, filters, keyword);
    if filters.sort == nexjob_core::SortOrder::Newest {
        facets::sort_newest_first(&mut jobs);
    }
    jobs
}
