//! In-process job source over a fixed dataset; backs offline mode and tests.

use async_trait::async_trait;
use nexjob_core::{Article, FilterData, FilterState, Job, JobsPage, KeywordMode};

use crate::{fallback, narrow_page, ConnectionReport, JobSource, SourceError};

#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    jobs: Vec<Job>,
    articles: Vec<Article>,
    filter_data: FilterData,
}

impl MemorySource {
    pub fn new(jobs: Vec<Job>, articles: Vec<Article>, filter_data: FilterData) -> Self {
        Self {
            jobs,
            articles,
            filter_data,
        }
    }

    /// The built-in sample job, article, and taxonomy.
    pub fn builtin() -> Self {
        Self::new(
            vec![fallback::sample_job()],
            vec![fallback::sample_article()],
            fallback::filter_data(),
        )
    }

    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }
}

#[async_trait]
impl JobSource for MemorySource {
    fn source_id(&self) -> &'static str {
        "memory"
    }

    /// Pages over the keyword matches, like the CMS search endpoint, then narrows locally.
    async fn fetch_jobs(
        &self,
        filters: &FilterState,
        page: u32,
        per_page: u32,
    ) -> Result<JobsPage, SourceError> {
        let page = page.max(1);
        let per_page = per_page.max(1) as usize;
        let keyword_only = FilterState {
            keyword: filters.keyword.clone(),
            ..FilterState::default()
        };
        let matched = nexjob_core::apply_with(&self.jobs, &keyword_only, KeywordMode::Local);
        let total_jobs = matched.len() as u64;
        let total_pages = matched.len().div_ceil(per_page).max(1) as u32;
        let raw: Vec<Job> = matched
            .into_iter()
            .skip((page as usize - 1) * per_page)
            .take(per_page)
            .collect();
        let raw_count = raw.len();

        Ok(JobsPage {
            jobs: narrow_page(raw, filters, KeywordMode::Remote),
            total_pages,
            total_jobs,
            current_page: page,
            has_more: page < total_pages,
            raw_count,
            fallback: false,
        })
    }

    async fn fetch_job_by_slug(&self, slug: &str) -> Option<Job> {
        self.jobs.iter().find(|j| j.slug == slug).cloned()
    }

    async fn fetch_job_by_id(&self, id: &str) -> Option<Job> {
        self.jobs.iter().find(|j| j.id == id).cloned()
    }

    async fn fetch_filter_data(&self) -> FilterData {
        self.filter_data.clone()
    }

    async fn fetch_articles(&self, limit: Option<u32>) -> Vec<Article> {
        let limit = limit.map(|l| l as usize).unwrap_or(usize::MAX);
        self.articles.iter().take(limit).cloned().collect()
    }

    async fn fetch_article_by_slug(&self, slug: &str) -> Option<Article> {
        self.articles.iter().find(|a| a.slug == slug).cloned()
    }

    async fn test_connection(&self) -> ConnectionReport {
        ConnectionReport::ok(format!("{} postings in memory", self.jobs.len()))
    }

    async fn test_filters_connection(&self) -> ConnectionReport {
        ConnectionReport::ok(format!(
            "{} provinces in memory",
            self.filter_data.provinces.len()
        ))
    }
}
