//! WordPress REST client for the `lowongan-kerja` post type, posts, and the filters endpoint.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use indexmap::IndexMap;
use nexjob_core::{AdminSettings, Article, FilterData, FilterState, Job, JobsPage, KeywordMode};
use nexjob_storage::{FetchError, FetchedResponse, HttpClientConfig, HttpFetcher};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use tracing::{debug, warn};
use url::Url;

use crate::text::{decode_entities, preferred_description};
use crate::{fallback, narrow_page, ConnectionReport, JobSource, SourceError};

pub const TOTAL_PAGES_HEADER: &str = "x-wp-totalpages";
pub const TOTAL_HEADER: &str = "x-wp-total";

#[derive(Debug, Clone)]
pub struct WordPressSource {
    http: HttpFetcher,
    api_base: String,
    filters_url: String,
}

impl WordPressSource {
    pub fn new(http: HttpFetcher, settings: &AdminSettings) -> Self {
        Self {
            http,
            api_base: settings.api_url.trim().trim_end_matches('/').to_string(),
            filters_url: settings.filters_api_url.trim().to_string(),
        }
    }

    /// Builds a dedicated fetcher carrying the settings' bearer token.
    pub fn from_settings(settings: &AdminSettings, http: HttpClientConfig) -> anyhow::Result<Self> {
        let fetcher = HttpFetcher::new(http.with_bearer_token(&settings.auth_token))?;
        Ok(Self::new(fetcher, settings))
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    fn endpoint(&self, path: &str) -> Result<Url, SourceError> {
        Ok(Url::parse(&format!("{}/{}", self.api_base, path))?)
    }

    pub fn jobs_url(&self, search: Option<&str>, page: u32, per_page: u32) -> Result<Url, SourceError> {
        let mut url = self.endpoint("lowongan-kerja")?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("per_page", &per_page.to_string())
                .append_pair("page", &page.to_string())
                .append_key_only("_embed");
            if let Some(search) = search {
                query.append_pair("search", search);
            }
        }
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &Url) -> Result<(T, FetchedResponse), SourceError> {
        let response = self.http.get(url.as_str()).await?;
        let parsed = serde_json::from_slice(&response.body).map_err(|source| SourceError::Decode {
            url: url.to_string(),
            source,
        })?;
        Ok((parsed, response))
    }

    async fn try_job_by_slug(&self, slug: &str) -> Result<Option<Job>, SourceError> {
        let mut url = self.endpoint("lowongan-kerja")?;
        url.query_pairs_mut()
            .append_pair("slug", slug)
            .append_key_only("_embed");
        let (posts, _) = self.get_json::<Vec<WpJob>>(&url).await?;
        Ok(posts.into_iter().next().map(WpJob::into_job))
    }

    async fn try_job_by_id(&self, id: &str) -> Result<Option<Job>, SourceError> {
        let mut url = self.endpoint(&format!("lowongan-kerja/{id}"))?;
        url.query_pairs_mut().append_key_only("_embed");
        match self.get_json::<WpJob>(&url).await {
            Ok((post, _)) => Ok(Some(post.into_job())),
            Err(SourceError::Fetch(FetchError::HttpStatus { status: 404, .. })) => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn try_filter_data(&self) -> Result<FilterData, SourceError> {
        let url = Url::parse(&self.filters_url)?;
        let (raw, _) = self.get_json::<WpFilterData>(&url).await?;
        Ok(raw.into_filter_data())
    }

    async fn try_articles(&self, limit: Option<u32>) -> Result<Vec<Article>, SourceError> {
        let mut url = self.endpoint("posts")?;
        {
            let mut query = url.query_pairs_mut();
            query.append_key_only("_embed");
            if let Some(limit) = limit {
                query.append_pair("per_page", &limit.to_string());
            }
        }
        let (posts, _) = self.get_json::<Vec<WpPost>>(&url).await?;
        Ok(posts.into_iter().map(WpPost::into_article).collect())
    }

    async fn try_article_by_slug(&self, slug: &str) -> Result<Option<Article>, SourceError> {
        let mut url = self.endpoint("posts")?;
        url.query_pairs_mut()
            .append_pair("slug", slug)
            .append_key_only("_embed");
        let (posts, _) = self.get_json::<Vec<WpPost>>(&url).await?;
        Ok(posts.into_iter().next().map(WpPost::into_article))
    }
}

#[async_trait]
impl JobSource for WordPressSource {
    fn source_id(&self) -> &'static str {
        "wordpress"
    }

    async fn fetch_jobs(
        &self,
        filters: &FilterState,
        page: u32,
        per_page: u32,
    ) -> Result<JobsPage, SourceError> {
        let page = page.max(1);
        let query = filters.server_query();
        let url = self.jobs_url(query.search.as_deref(), page, per_page)?;

        let (posts, response) = match self.get_json::<Vec<WpJob>>(&url).await {
            Ok(ok) => ok,
            // WordPress answers 400 for a page past the end.
            Err(SourceError::Fetch(FetchError::HttpStatus { status: 400, .. })) if page > 1 => {
                debug!(page, "page past the end of the listing");
                return Ok(JobsPage {
                    jobs: Vec::new(),
                    total_pages: page - 1,
                    total_jobs: 0,
                    current_page: page,
                    has_more: false,
                    raw_count: 0,
                    fallback: false,
                });
            }
            Err(err) => return Err(err),
        };

        let total_pages = response
            .header_number(TOTAL_PAGES_HEADER)
            .map(|n| n as u32)
            .unwrap_or(1);
        let total_jobs = response.header_number(TOTAL_HEADER).unwrap_or(0);
        let raw: Vec<Job> = posts.into_iter().map(WpJob::into_job).collect();
        let raw_count = raw.len();
        let jobs = narrow_page(raw, filters, KeywordMode::Remote);
        debug!(page, raw_count, kept = jobs.len(), total_pages, "jobs page fetched");

        Ok(JobsPage {
            jobs,
            total_pages,
            total_jobs,
            current_page: page,
            has_more: page < total_pages,
            raw_count,
            fallback: false,
        })
    }

    async fn fetch_job_by_slug(&self, slug: &str) -> Option<Job> {
        match self.try_job_by_slug(slug).await {
            Ok(job) => job,
            Err(err) => {
                warn!(slug, error = %err, "job lookup by slug failed");
                None
            }
        }
    }

    async fn fetch_job_by_id(&self, id: &str) -> Option<Job> {
        if id.is_empty() || !id.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        match self.try_job_by_id(id).await {
            Ok(job) => job,
            Err(err) => {
                warn!(id, error = %err, "job lookup by id failed");
                None
            }
        }
    }

    async fn fetch_filter_data(&self) -> FilterData {
        match self.try_filter_data().await {
            Ok(data) => data,
            Err(err) => {
                warn!(error = %err, "filter data unavailable; using built-in taxonomy");
                fallback::filter_data()
            }
        }
    }

    async fn fetch_articles(&self, limit: Option<u32>) -> Vec<Article> {
        match self.try_articles(limit).await {
            Ok(articles) => articles,
            Err(err) => {
                warn!(error = %err, "articles unavailable; using built-in article");
                vec![fallback::sample_article()]
            }
        }
    }

    async fn fetch_article_by_slug(&self, slug: &str) -> Option<Article> {
        match self.try_article_by_slug(slug).await {
            Ok(article) => article,
            Err(err) => {
                warn!(slug, error = %err, "article lookup failed");
                None
            }
        }
    }

    async fn test_connection(&self) -> ConnectionReport {
        let url = match self.jobs_url(None, 1, 1) {
            Ok(url) => url,
            Err(err) => return ConnectionReport::failed(err.to_string()),
        };
        match self.get_json::<Vec<WpJob>>(&url).await {
            Ok((posts, response)) => {
                let total = response.header_number(TOTAL_HEADER).unwrap_or(posts.len() as u64);
                let sample = posts
                    .first()
                    .map(|p| decode_entities(&p.title.rendered))
                    .unwrap_or_else(|| "no postings yet".to_string());
                ConnectionReport::ok(format!("{total} postings; latest: {sample}"))
            }
            Err(err) => ConnectionReport::failed(err.to_string()),
        }
    }

    async fn test_filters_connection(&self) -> ConnectionReport {
        match self.try_filter_data().await {
            Ok(data) => ConnectionReport::ok(format!(
                "{} provinces, {} categories",
                data.provinces.len(),
                data.categories.len()
            )),
            Err(err) => ConnectionReport::failed(err.to_string()),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct WpRendered {
    #[serde(default)]
    rendered: String,
}

#[derive(Debug, Deserialize)]
struct WpJob {
    id: u64,
    #[serde(default)]
    slug: String,
    #[serde(default)]
    title: WpRendered,
    #[serde(default)]
    content: WpRendered,
    #[serde(default)]
    excerpt: WpRendered,
    #[serde(default)]
    link: String,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    date_gmt: Option<String>,
    /// WordPress sends `[]` instead of `{}` when a post has no meta.
    #[serde(default)]
    meta: JsonValue,
}

impl WpJob {
    fn into_job(self) -> Job {
        let meta = &self.meta;
        let text = |key: &str, default: &str| {
            let value = meta_str(meta, key).unwrap_or(default);
            let value = if value.is_empty() { default } else { value };
            decode_entities(value)
        };
        let seo_title = decode_entities(
            meta_str(meta, "rank_math_title")
                .filter(|t| !t.trim().is_empty())
                .unwrap_or(&self.title.rendered),
        );
        let seo_description = preferred_description(
            &self.excerpt.rendered,
            meta_str(meta, "rank_math_description").unwrap_or(""),
        );
        let link = meta_str(meta, "nexjob_link_loker")
            .filter(|l| !l.trim().is_empty())
            .unwrap_or(&self.link)
            .to_string();

        Job {
            id: self.id.to_string(),
            title: decode_entities(&self.title.rendered),
            content: self.content.rendered.clone(),
            company_name: text("nexjob_nama_perusahaan", "Perusahaan"),
            category: text("nexjob_kategori_pekerjaan", ""),
            province: text("nexjob_lokasi_provinsi", ""),
            city: text("nexjob_lokasi_kota", ""),
            job_type: text("nexjob_tipe_pekerjaan", "Full Time"),
            education: text("nexjob_pendidikan", ""),
            industry: text("nexjob_industri", ""),
            experience: text("nexjob_pengalaman_kerja", ""),
            tag: text("nexjob_tag_loker", ""),
            gender: text("nexjob_gender", ""),
            salary: text("nexjob_gaji", "Negosiasi"),
            work_policy: text("nexjob_kebijakan_kerja", ""),
            source: text("nexjob_sumber_loker", "Nexjob"),
            link,
            created_at: parse_wp_date(self.date_gmt.as_deref())
                .or_else(|| parse_wp_date(self.date.as_deref())),
            seo_title: (!seo_title.is_empty()).then_some(seo_title),
            seo_description: (!seo_description.is_empty()).then_some(seo_description),
            slug: self.slug,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WpPost {
    id: u64,
    #[serde(default)]
    slug: String,
    #[serde(default)]
    title: WpRendered,
    #[serde(default)]
    excerpt: WpRendered,
    #[serde(default)]
    content: WpRendered,
    #[serde(default)]
    date_gmt: Option<String>,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    modified_gmt: Option<String>,
    #[serde(default)]
    meta: JsonValue,
    #[serde(default, rename = "_embedded")]
    embedded: JsonValue,
}

impl WpPost {
    fn into_article(self) -> Article {
        let embedded = &self.embedded;
        let featured_media_url = embedded
            .get("wp:featuredmedia")
            .and_then(|m| m.get(0))
            .and_then(|m| json_str(m, &["source_url"]))
            .map(ToString::to_string);
        let author_name = embedded
            .get("author")
            .and_then(|a| a.get(0))
            .and_then(|a| json_str(a, &["name"]).or_else(|| json_str(a, &["display_name"])))
            .map(decode_entities);
        let term_names = |index: usize| -> Vec<String> {
            embedded
                .get("wp:term")
                .and_then(|t| t.get(index))
                .and_then(JsonValue::as_array)
                .map(|terms| {
                    terms
                        .iter()
                        .filter_map(|t| json_str(t, &["name"]))
                        .map(decode_entities)
                        .collect()
                })
                .unwrap_or_default()
        };

        let seo_title = decode_entities(
            meta_str(&self.meta, "rank_math_title")
                .filter(|t| !t.trim().is_empty())
                .unwrap_or(&self.title.rendered),
        );
        let seo_description = preferred_description(
            &self.excerpt.rendered,
            meta_str(&self.meta, "rank_math_description").unwrap_or(""),
        );

        Article {
            id: self.id.to_string(),
            slug: self.slug,
            title: decode_entities(&self.title.rendered),
            excerpt: decode_entities(&self.excerpt.rendered),
            content: self.content.rendered,
            published_at: parse_wp_date(self.date_gmt.as_deref())
                .or_else(|| parse_wp_date(self.date.as_deref())),
            modified_at: parse_wp_date(self.modified_gmt.as_deref()),
            featured_media_url,
            author_name,
            categories: term_names(0),
            tags: term_names(1),
            seo_title,
            seo_description,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WpFilterData {
    nexjob_lokasi_provinsi: IndexMap<String, Vec<String>>,
    nexjob_kategori_pekerjaan: Vec<String>,
    nexjob_tipe_pekerjaan: Vec<String>,
    nexjob_pengalaman_kerja: Vec<String>,
    nexjob_pendidikan: Vec<String>,
    nexjob_kebijakan_kerja: Vec<String>,
    nexjob_industri: Vec<String>,
}

impl WpFilterData {
    fn into_filter_data(self) -> FilterData {
        let decode_all = |values: Vec<String>| -> Vec<String> {
            let mut out: Vec<String> = Vec::with_capacity(values.len());
            for value in values.iter().map(|v| decode_entities(v)) {
                if !out.contains(&value) {
                    out.push(value);
                }
            }
            out
        };
        let mut provinces: IndexMap<String, Vec<String>> = IndexMap::new();
        for (province, cities) in self.nexjob_lokasi_provinsi {
            provinces
                .entry(decode_entities(&province))
                .or_default()
                .extend(decode_all(cities));
        }
        for cities in provinces.values_mut() {
            let deduped = decode_all(std::mem::take(cities));
            *cities = deduped;
        }

        FilterData {
            provinces,
            categories: decode_all(self.nexjob_kategori_pekerjaan),
            job_types: decode_all(self.nexjob_tipe_pekerjaan),
            experiences: decode_all(self.nexjob_pengalaman_kerja),
            educations: decode_all(self.nexjob_pendidikan),
            work_policies: decode_all(self.nexjob_kebijakan_kerja),
            industries: decode_all(self.nexjob_industri),
        }
    }
}

fn json_str<'a>(value: &'a JsonValue, path: &[&str]) -> Option<&'a str> {
    let mut cur = value;
    for segment in path {
        cur = cur.get(*segment)?;
    }
    cur.as_str()
}

fn meta_str<'a>(meta: &'a JsonValue, key: &str) -> Option<&'a str> {
    json_str(meta, &[key])
}

/// WordPress dates come without an offset; `*_gmt` fields are UTC.
fn parse_wp_date(value: Option<&str>) -> Option<DateTime<Utc>> {
    let value = value?.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}
