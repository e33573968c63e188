//! Home, job detail, and article pages.

use std::sync::Arc;

use askama::Template;
use axum::{
    extract::{Extension, Path as AxumPath, State},
    response::{IntoResponse, Redirect, Response},
};
use chrono::{DateTime, Utc};
use nexjob_adapters::{text, RELATED_ARTICLES_LIMIT, RELATED_JOBS_LIMIT};
use nexjob_core::{taxonomy_slug, AnalyticsEvent, Article, FilterState};

use crate::listing::{job_cards, JobCard};
use crate::seo::{self, Crumb, PageMeta};
use crate::session::ClientId;
use crate::{not_found, render_html, AppState, Chrome};

const FEATURED_JOBS: u32 = 6;
const HOME_ARTICLES: u32 = 3;

#[derive(Debug, Clone)]
pub struct LinkView {
    pub label: String,
    pub href: String,
}

#[derive(Debug, Clone)]
pub struct ArticleCard {
    pub title: String,
    pub href: String,
    pub excerpt: String,
    pub published: String,
    pub image: String,
    pub author: String,
    pub category: String,
}

impl ArticleCard {
    fn from_article(article: &Article) -> Self {
        Self {
            title: article.title.clone(),
            href: article.detail_path(),
            excerpt: seo::article_description(article),
            published: format_date(article.published_at),
            image: article.featured_media_url.clone().unwrap_or_default(),
            author: article.author_name.clone().unwrap_or_else(|| "Tim Nexjob".into()),
            category: article.categories.first().cloned().unwrap_or_default(),
        }
    }
}

fn format_date(date: Option<DateTime<Utc>>) -> String {
    date.map(|d| d.format("%d/%m/%Y").to_string()).unwrap_or_default()
}

#[derive(Template)]
#[template(path = "home.html")]
struct HomeTemplate {
    chrome: Chrome,
    provinces: Vec<String>,
    categories: Vec<LinkView>,
    featured: Vec<JobCard>,
    articles: Vec<ArticleCard>,
}

#[derive(Debug, Clone)]
pub struct Fact {
    pub label: &'static str,
    pub value: String,
}

#[derive(Template)]
#[template(path = "job_detail.html")]
struct JobDetailTemplate {
    chrome: Chrome,
    job: JobCard,
    content: String,
    facts: Vec<Fact>,
    tags: Vec<String>,
    category_link: Option<LinkView>,
    location_link: Option<LinkView>,
    apply_href: String,
    related: Vec<JobCard>,
}

#[derive(Template)]
#[template(path = "articles.html")]
struct ArticlesTemplate {
    chrome: Chrome,
    heading: String,
    description: String,
    articles: Vec<ArticleCard>,
}

#[derive(Template)]
#[template(path = "article_detail.html")]
struct ArticleDetailTemplate {
    chrome: Chrome,
    article: ArticleCard,
    content: String,
    tags: Vec<String>,
    related: Vec<ArticleCard>,
}

pub async fn home_handler(
    State(state): State<Arc<AppState>>,
    Extension(client): Extension<ClientId>,
) -> Response {
    let source = state.source().await;
    let data = source.fetch_filter_data().await;
    let page = source
        .fetch_jobs_or_fallback(&FilterState::default(), 1, FEATURED_JOBS)
        .await;
    let articles = source.fetch_articles(Some(HOME_ARTICLES)).await;
    let settings = state.settings().await;
    let base = state.config.site_url_trimmed().to_string();

    state.track(AnalyticsEvent::PageView {
        path: "/".into(),
        page_type: "home".into(),
        category: None,
        location: None,
    });

    let meta = PageMeta::website(
        settings.home_title.clone(),
        settings.home_description.clone(),
        format!("{base}/"),
    );
    let json_ld = seo::script_body(&[seo::website(&base, &settings), seo::organization(&base)]);
    render_html(HomeTemplate {
        chrome: state.chrome(meta, json_ld),
        provinces: data.province_names().into_iter().map(str::to_string).collect(),
        categories: data
            .categories
            .iter()
            .map(|c| LinkView {
                label: c.clone(),
                href: format!("/lowongan-kerja/kategori/{}/", taxonomy_slug(c)),
            })
            .collect(),
        featured: job_cards(&state, &client, &page.jobs).await,
        articles: articles.iter().map(ArticleCard::from_article).collect(),
    })
}

pub async fn job_detail_handler(
    State(state): State<Arc<AppState>>,
    Extension(client): Extension<ClientId>,
    AxumPath(slug): AxumPath<String>,
) -> Response {
    let source = state.source().await;
    let Some(job) = source.fetch_job_by_slug(&slug).await else {
        return not_found(&state, "Lowongan kerja tidak ditemukan atau sudah ditutup.");
    };
    let related = source
        .fetch_related_jobs(&job.id, &job.category, RELATED_JOBS_LIMIT)
        .await;
    let base = state.config.site_url_trimmed().to_string();

    state.track(AnalyticsEvent::PageView {
        path: job.detail_path(),
        page_type: "job_detail".into(),
        category: Some(job.category.clone()).filter(|c| !c.is_empty()),
        location: Some(job.city.clone()).filter(|c| !c.is_empty()),
    });

    let meta = PageMeta::article(
        seo::job_title(&job),
        seo::job_description(&job, 160),
        format!("{base}{}", job.detail_path()),
    );
    let json_ld = seo::script_body(&[
        seo::job_posting(&base, &job),
        seo::breadcrumbs(
            &base,
            &[Crumb::link("Lowongan Kerja", "/lowongan-kerja/"), Crumb::here(job.title.clone())],
        ),
    ]);

    let facts = [
        ("Tipe Pekerjaan", &job.job_type),
        ("Kategori", &job.category),
        ("Pengalaman", &job.experience),
        ("Pendidikan", &job.education),
        ("Industri", &job.industry),
        ("Kebijakan Kerja", &job.work_policy),
        ("Gaji", &job.salary),
        ("Jenis Kelamin", &job.gender),
        ("Sumber", &job.source),
    ]
    .into_iter()
    .filter(|(_, value)| !value.trim().is_empty())
    .map(|(label, value)| Fact {
        label,
        value: value.clone(),
    })
    .collect();

    let bookmarked = match state.bookmarks_for(&client) {
        Ok(bookmarks) => bookmarks.is_bookmarked(&job.id).await.unwrap_or(false),
        Err(_) => false,
    };
    let link = |label: &str, href: String| {
        (!label.is_empty()).then(|| LinkView {
            label: label.to_string(),
            href,
        })
    };
    render_html(JobDetailTemplate {
        chrome: state.chrome(meta, json_ld),
        content: job.content.clone(),
        tags: job.tags(),
        category_link: link(
            &job.category,
            format!("/lowongan-kerja/kategori/{}/", taxonomy_slug(&job.category)),
        ),
        location_link: link(
            &job.city,
            format!("/lowongan-kerja/lokasi/{}/", taxonomy_slug(&job.city)),
        ),
        apply_href: format!("{}apply", job.detail_path()),
        facts,
        job: JobCard::from_job(&job, bookmarked),
        related: job_cards(&state, &client, &related).await,
    })
}

/// Records the click, then leaves for the employer's application page.
pub async fn apply_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(slug): AxumPath<String>,
) -> Response {
    let Some(job) = state.source().await.fetch_job_by_slug(&slug).await else {
        return not_found(&state, "Lowongan kerja tidak ditemukan atau sudah ditutup.");
    };
    state.track(AnalyticsEvent::JobApplicationClick {
        job_id: job.id.clone(),
        title: job.title.clone(),
        company: job.company_name.clone(),
    });
    if job.link.starts_with("http://") || job.link.starts_with("https://") {
        Redirect::to(&job.link).into_response()
    } else {
        Redirect::to(&job.detail_path()).into_response()
    }
}

pub async fn articles_handler(State(state): State<Arc<AppState>>) -> Response {
    let articles = state.source().await.fetch_articles(None).await;
    let settings = state.settings().await;
    let base = state.config.site_url_trimmed().to_string();

    state.track(AnalyticsEvent::PageView {
        path: "/artikel/".into(),
        page_type: "article_listing".into(),
        category: None,
        location: None,
    });

    let meta = PageMeta::website(
        settings.articles_title.clone(),
        settings.articles_description.clone(),
        format!("{base}/artikel/"),
    );
    let json_ld = seo::script_body(&[
        seo::breadcrumbs(&base, &[Crumb::here("Tips Karir")]),
        seo::article_list(&base, &articles),
    ]);
    render_html(ArticlesTemplate {
        chrome: state.chrome(meta, json_ld),
        heading: "Tips & Panduan Karir".into(),
        description: settings.articles_description,
        articles: articles.iter().map(ArticleCard::from_article).collect(),
    })
}

pub async fn article_detail_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(slug): AxumPath<String>,
) -> Response {
    let source = state.source().await;
    let Some(article) = source.fetch_article_by_slug(&slug).await else {
        return not_found(&state, "Artikel tidak ditemukan.");
    };
    let related = source
        .fetch_related_articles(&article.id, RELATED_ARTICLES_LIMIT)
        .await;
    let base = state.config.site_url_trimmed().to_string();

    state.track(AnalyticsEvent::ArticleRead {
        article_id: article.id.clone(),
        title: article.title.clone(),
        category: article.categories.first().cloned(),
    });

    let title = if article.seo_title.trim().is_empty() {
        format!("{} - Nexjob", article.title)
    } else {
        text::decode_entities(&article.seo_title)
    };
    let meta = PageMeta::article(
        title,
        seo::article_description(&article),
        format!("{base}{}", article.detail_path()),
    );
    let json_ld = seo::script_body(&[
        seo::blog_posting(&base, &article),
        seo::breadcrumbs(
            &base,
            &[Crumb::link("Tips Karir", "/artikel/"), Crumb::here(article.title.clone())],
        ),
    ]);
    render_html(ArticleDetailTemplate {
        chrome: state.chrome(meta, json_ld),
        article: ArticleCard::from_article(&article),
        content: article.content.clone(),
        tags: article.tags.clone(),
        related: related.iter().map(ArticleCard::from_article).collect(),
    })
}
