//! Job listing pages: query parsing, the filter sidebar, and the htmx results partial.

use std::sync::Arc;

use askama::Template;
use axum::{
    extract::{Extension, Path as AxumPath, RawQuery, State},
    http::{header::HeaderName, HeaderValue},
    response::Response,
};
use chrono::Utc;
use nexjob_core::{
    relative_posted_label, taxonomy_slug, AnalyticsEvent, FacetKind, FilterData, Job, JobsPage,
    LocationType, SortOrder,
};
use nexjob_search::{FilterTarget, ListingQuery, RouteLock, SearchEdit, SearchStateSync, FETCH_FAILED_MESSAGE};

use crate::seo::{self, Crumb, PageMeta};
use crate::session::ClientId;
use crate::{not_found, render_html, AppState, Chrome};

const RESULTS_PATH: &str = "/lowongan-kerja/results";
const LISTING_PATH: &str = "/lowongan-kerja/";

/// Everything the listing URL can carry. Facets repeat their key once per value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingParams {
    pub query: ListingQuery,
    pub facets: Vec<(FacetKind, String)>,
    pub sort: Option<SortOrder>,
    pub page: u32,
    pub lock: RouteLock,
}

impl ListingParams {
    pub fn parse(raw: Option<&str>) -> Self {
        let mut params = Self {
            page: 1,
            ..Self::default()
        };
        let mut lock_category = None;
        let mut lock_location = None;
        for (key, value) in url::form_urlencoded::parse(raw.unwrap_or_default().as_bytes()) {
            let value = value.trim().to_string();
            match key.as_ref() {
                "search" => params.query.search = Some(value),
                "location" => params.query.location = Some(value),
                "category" => params.query.category = Some(value),
                "sort" => {
                    params.sort = match value.as_str() {
                        "relevant" => Some(SortOrder::Relevant),
                        "newest" => Some(SortOrder::Newest),
                        _ => None,
                    }
                }
                "page" => params.page = value.parse().unwrap_or(1).max(1),
                "lock_category" if !value.is_empty() => lock_category = Some(value),
                "lock_province" if !value.is_empty() => {
                    lock_location = Some((value, LocationType::Province))
                }
                "lock_city" if !value.is_empty() => lock_location = Some((value, LocationType::City)),
                other => {
                    if let Some(kind) = FacetKind::from_key(other) {
                        if !value.is_empty() {
                            params.facets.push((kind, value));
                        }
                    }
                }
            }
        }
        params.lock = RouteLock {
            category: lock_category,
            location: lock_location,
        };
        params
    }

    pub fn with_lock(mut self, lock: RouteLock) -> Self {
        self.lock = lock;
        self
    }

    pub fn to_sync(&self) -> SearchStateSync {
        let mut sync = SearchStateSync::hydrate(self.lock.clone(), &self.query);
        for (kind, value) in &self.facets {
            sync.apply(SearchEdit::ToggleFacet {
                kind: *kind,
                value: value.clone(),
                selected: true,
            });
        }
        if let Some(sort) = self.sort {
            sync.apply(SearchEdit::SetSort(sort));
        }
        sync
    }
}

/// Serializes a search state back into listing query parameters, lock included.
pub fn encode_state(sync: &SearchStateSync, page: Option<u32>) -> String {
    let state = sync.effective();
    let lock = sync.lock();
    let mut query = url::form_urlencoded::Serializer::new(String::new());
    let keyword = state.keyword.trim();
    if !keyword.is_empty() {
        query.append_pair("search", keyword);
    }
    if lock.location.is_none() && !state.province.is_empty() {
        query.append_pair("location", &state.province);
    }
    for kind in FacetKind::ALL {
        for value in state.facets.values(kind) {
            if !lock.is_locked(kind, value) {
                query.append_pair(kind.key(), value);
            }
        }
    }
    if state.sort == SortOrder::Relevant {
        query.append_pair("sort", "relevant");
    }
    if let Some(category) = &lock.category {
        query.append_pair("lock_category", category);
    }
    match &lock.location {
        Some((name, LocationType::Province)) => {
            query.append_pair("lock_province", name);
        }
        Some((name, LocationType::City)) => {
            query.append_pair("lock_city", name);
        }
        None => {}
    }
    if let Some(page) = page {
        query.append_pair("page", &page.to_string());
    }
    query.finish()
}

/// Route a lock renders under.
pub fn lock_path(lock: &RouteLock) -> String {
    if let Some(category) = &lock.category {
        return format!("/lowongan-kerja/kategori/{}/", taxonomy_slug(category));
    }
    if let Some((location, _)) = &lock.location {
        return format!("/lowongan-kerja/lokasi/{}/", taxonomy_slug(location));
    }
    LISTING_PATH.to_string()
}

#[derive(Debug, Clone)]
pub struct JobCard {
    pub id: String,
    pub title: String,
    pub company_name: String,
    pub location: String,
    pub job_type: String,
    pub salary: String,
    pub category: String,
    pub posted: String,
    pub href: String,
    pub excerpt: String,
    pub bookmarked: bool,
}

impl JobCard {
    pub fn from_job(job: &Job, bookmarked: bool) -> Self {
        let location = [job.city.as_str(), job.province.as_str()]
            .into_iter()
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join(", ");
        Self {
            id: job.id.clone(),
            title: job.title.clone(),
            company_name: job.company_name.clone(),
            location,
            job_type: job.job_type.clone(),
            salary: job.salary.clone(),
            category: job.category.clone(),
            posted: relative_posted_label(job.created_at, Utc::now()),
            href: job.detail_path(),
            excerpt: seo::card_excerpt(job),
            bookmarked,
        }
    }
}

/// Cards marked against the visitor's saved ids; an unreadable set marks none.
pub async fn job_cards(state: &AppState, client: &ClientId, jobs: &[Job]) -> Vec<JobCard> {
    let saved = match state.bookmarks_for(client) {
        Ok(bookmarks) => bookmarks.list().await.unwrap_or_default(),
        Err(_) => Vec::new(),
    };
    jobs.iter()
        .map(|job| JobCard::from_job(job, saved.contains(&job.id)))
        .collect()
}

#[derive(Debug, Clone)]
pub struct ChipView {
    pub label: String,
    pub href: String,
}

#[derive(Debug, Clone)]
pub struct FacetOption {
    pub value: String,
    pub checked: bool,
    pub locked: bool,
}

#[derive(Debug, Clone)]
pub struct FacetGroup {
    pub key: &'static str,
    pub label: &'static str,
    pub options: Vec<FacetOption>,
}

#[derive(Debug, Clone)]
pub struct HiddenField {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone)]
pub struct SelectOption {
    pub value: String,
    pub selected: bool,
}

#[derive(Template)]
#[template(path = "results_partial.html")]
pub struct ResultsPartialTemplate {
    pub cards: Vec<JobCard>,
    pub append: bool,
    pub chips: Vec<ChipView>,
    pub clear_href: String,
    pub total_jobs: u64,
    pub fallback: bool,
    pub error: String,
    pub retry_url: String,
    pub next_url: String,
}

#[derive(Template)]
#[template(path = "listing.html")]
struct ListingTemplate {
    chrome: Chrome,
    heading: String,
    locked_label: String,
    hidden_lock: Vec<HiddenField>,
    keyword: String,
    provinces: Vec<SelectOption>,
    province_locked: bool,
    groups: Vec<FacetGroup>,
    relevant: bool,
    results_html: String,
}

fn sidebar(sync: &SearchStateSync, data: &FilterData) -> (Vec<SelectOption>, Vec<FacetGroup>) {
    let state = sync.effective();
    let provinces = data
        .province_names()
        .into_iter()
        .map(|p| SelectOption {
            selected: p == state.province,
            value: p.to_string(),
        })
        .collect();
    let groups = FacetKind::ALL
        .into_iter()
        .map(|kind| {
            let mut values: Vec<String> = if kind == FacetKind::City && !state.province.is_empty() {
                data.provinces
                    .get(&state.province)
                    .cloned()
                    .unwrap_or_default()
            } else {
                data.options(kind).into_iter().map(str::to_string).collect()
            };
            for selected in state.facets.values(kind) {
                if !values.contains(selected) {
                    values.push(selected.clone());
                }
            }
            FacetGroup {
                key: kind.key(),
                label: kind.label(),
                options: values
                    .into_iter()
                    .map(|value| FacetOption {
                        checked: state.facets.contains(kind, &value),
                        locked: sync.lock().is_locked(kind, &value),
                        value,
                    })
                    .collect(),
            }
        })
        .filter(|group| !group.options.is_empty())
        .collect();
    (provinces, groups)
}

fn chips(sync: &SearchStateSync) -> (Vec<ChipView>, String) {
    let path = lock_path(sync.lock());
    let href_for = |edit: SearchEdit| {
        let mut next = sync.clone();
        next.apply(edit);
        let query = encode_state(&next, None);
        if query.is_empty() {
            path.clone()
        } else {
            format!("{path}?{query}")
        }
    };
    let chips = sync
        .chips()
        .into_iter()
        .map(|chip| ChipView {
            href: href_for(SearchEdit::RemoveFilter(chip.target.clone())),
            label: match chip.target {
                FilterTarget::Province => format!("Provinsi: {}", chip.label),
                _ => chip.label,
            },
        })
        .collect();
    (chips, href_for(SearchEdit::ClearAll))
}

fn results_template(
    sync: &SearchStateSync,
    page_number: u32,
    cards: Vec<JobCard>,
    page: Option<&JobsPage>,
) -> ResultsPartialTemplate {
    let (chips, clear_href) = chips(sync);
    let next_url = match page {
        Some(p) if p.has_more && p.raw_count > 0 => {
            format!("{RESULTS_PATH}?{}", encode_state(sync, Some(page_number + 1)))
        }
        _ => String::new(),
    };
    ResultsPartialTemplate {
        cards,
        append: page_number > 1,
        chips,
        clear_href,
        total_jobs: page.map(|p| p.total_jobs).unwrap_or_default(),
        fallback: page.map(|p| p.fallback).unwrap_or_default(),
        error: if page.is_none() {
            FETCH_FAILED_MESSAGE.to_string()
        } else {
            String::new()
        },
        retry_url: format!("{RESULTS_PATH}?{}", encode_state(sync, Some(page_number))),
        next_url,
    }
}

async fn render_listing(state: Arc<AppState>, client: ClientId, params: ListingParams) -> Response {
    let source = state.source().await;
    let sync = params.to_sync();
    let data = source.fetch_filter_data().await;
    let page = source
        .fetch_jobs_or_fallback(sync.effective(), 1, state.page_size)
        .await;
    let cards = job_cards(&state, &client, &page.jobs).await;
    let results_html = match results_template(&sync, 1, cards, Some(&page)).render() {
        Ok(html) => html,
        Err(err) => return crate::server_error(anyhow::anyhow!(err.to_string())),
    };

    let lock = sync.lock();
    let state_filter = sync.effective();
    let category = lock.category.clone().or_else(|| state_filter.facets.categories.first().cloned());
    let location = lock
        .location
        .as_ref()
        .map(|(name, _)| name.clone())
        .or_else(|| (!state_filter.province.is_empty()).then(|| state_filter.province.clone()));

    let settings = state.settings().await;
    let base = state.config.site_url_trimmed().to_string();
    let (meta, heading, crumbs) = if lock.is_active() {
        let title = seo::listing_title(category.as_deref(), location.as_deref());
        let crumb = match (&lock.category, &lock.location) {
            (Some(c), _) => format!("Kategori: {c}"),
            (None, Some((l, _))) => format!("Lokasi: {l}"),
            _ => String::new(),
        };
        (
            PageMeta::website(
                title.clone(),
                seo::listing_description(category.as_deref(), location.as_deref()),
                format!("{base}{LISTING_PATH}"),
            ),
            title.trim_end_matches(" - Nexjob").to_string(),
            vec![Crumb::link("Lowongan Kerja", LISTING_PATH), Crumb::here(crumb)],
        )
    } else {
        (
            PageMeta::website(
                settings.jobs_title.clone(),
                settings.jobs_description.clone(),
                format!("{base}{LISTING_PATH}"),
            ),
            "Lowongan Kerja".to_string(),
            vec![Crumb::here("Lowongan Kerja")],
        )
    };
    let json_ld = seo::script_body(&[
        seo::breadcrumbs(&base, &crumbs),
        seo::job_list(&base, &page.jobs),
    ]);

    state.track(AnalyticsEvent::PageView {
        path: lock_path(lock),
        page_type: "job_listing".into(),
        category: category.clone(),
        location: location.clone(),
    });

    let hidden_lock = url::form_urlencoded::parse(encode_state(&SearchStateSync::new(lock.clone()), None).as_bytes())
        .map(|(name, value)| HiddenField {
            name: name.into_owned(),
            value: value.into_owned(),
        })
        .collect();
    let (provinces, groups) = sidebar(&sync, &data);
    render_html(ListingTemplate {
        chrome: state.chrome(meta, json_ld),
        heading,
        locked_label: match &lock.location {
            Some((name, _)) => name.clone(),
            None => String::new(),
        },
        hidden_lock,
        keyword: state_filter.keyword.clone(),
        province_locked: lock.location.is_some(),
        provinces,
        groups,
        relevant: state_filter.sort == SortOrder::Relevant,
        results_html,
    })
}

pub async fn listing_handler(
    State(state): State<Arc<AppState>>,
    Extension(client): Extension<ClientId>,
    RawQuery(raw): RawQuery,
) -> Response {
    let params = ListingParams::parse(raw.as_deref()).with_lock(RouteLock::none());
    render_listing(state, client, params).await
}

pub async fn category_handler(
    State(state): State<Arc<AppState>>,
    Extension(client): Extension<ClientId>,
    AxumPath(slug): AxumPath<String>,
    RawQuery(raw): RawQuery,
) -> Response {
    let data = state.source().await.fetch_filter_data().await;
    let Some(category) = data.category_by_slug(&slug).map(str::to_string) else {
        return not_found(&state, "Kategori tidak ditemukan");
    };
    let params = ListingParams::parse(raw.as_deref()).with_lock(RouteLock::category(category));
    render_listing(state, client, params).await
}

pub async fn location_handler(
    State(state): State<Arc<AppState>>,
    Extension(client): Extension<ClientId>,
    AxumPath(slug): AxumPath<String>,
    RawQuery(raw): RawQuery,
) -> Response {
    let data = state.source().await.fetch_filter_data().await;
    let Some((location, kind)) = data.location_by_slug(&slug) else {
        return not_found(&state, "Lokasi tidak ditemukan");
    };
    let params = ListingParams::parse(raw.as_deref()).with_lock(RouteLock::location(location, kind));
    render_listing(state, client, params).await
}

/// One page of results for htmx. Page 1 replaces the list; later pages append in place of the sentinel.
pub async fn results_handler(
    State(state): State<Arc<AppState>>,
    Extension(client): Extension<ClientId>,
    RawQuery(raw): RawQuery,
) -> Response {
    let params = ListingParams::parse(raw.as_deref());
    let sync = params.to_sync();
    let source = state.source().await;
    let result = source
        .fetch_jobs(sync.effective(), params.page, state.page_size)
        .await;

    let template = match result {
        Ok(page) => {
            let cards = job_cards(&state, &client, &page.jobs).await;
            results_template(&sync, params.page, cards, Some(&page))
        }
        Err(err) => {
            tracing::warn!(page = params.page, error = %err, "listing page fetch failed");
            results_template(&sync, params.page, Vec::new(), None)
        }
    };

    if params.page == 1 {
        let filters = sync.effective();
        if !filters.keyword.trim().is_empty() {
            state.track(AnalyticsEvent::Search {
                term: filters.keyword.trim().to_string(),
                location: (!filters.province.is_empty()).then(|| filters.province.clone()),
                category: filters.facets.categories.first().cloned(),
            });
        }
        for chip in sync.chips() {
            if let FilterTarget::Facet { kind, value } = chip.target {
                state.track(AnalyticsEvent::FilterApplied {
                    facet: kind.key().to_string(),
                    value,
                });
            }
        }
    }

    let mut resp = render_html(template);
    if params.page == 1 {
        if let Some(url) = sync.url_sync() {
            if let Ok(value) = HeaderValue::from_str(&url) {
                resp.headers_mut()
                    .insert(HeaderName::from_static("hx-replace-url"), value);
            }
        }
    }
    resp
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_collects_repeated_facets_and_lock() {
        let params = ListingParams::parse(Some(
            "search=kasir&location=Jawa+Barat&cities=Bandung&cities=Bekasi&jobTypes=Full+Time&sort=relevant&page=3&lock_category=Sales",
        ));
        assert_eq!(params.query.search.as_deref(), Some("kasir"));
        assert_eq!(params.page, 3);
        assert_eq!(params.sort, Some(SortOrder::Relevant));
        assert_eq!(params.lock, RouteLock::category("Sales"));
        assert_eq!(
            params.facets,
            vec![
                (FacetKind::City, "Bandung".to_string()),
                (FacetKind::City, "Bekasi".to_string()),
                (FacetKind::JobType, "Full Time".to_string()),
            ]
        );
        let sync = params.to_sync();
        assert_eq!(sync.effective().facets.categories, vec!["Sales"]);
        assert_eq!(sync.active_filter_count(), 5);
    }

    #[test]
    fn garbage_page_defaults_to_first() {
        assert_eq!(ListingParams::parse(Some("page=abc")).page, 1);
        assert_eq!(ListingParams::parse(Some("page=0")).page, 1);
        assert_eq!(ListingParams::parse(None).page, 1);
    }

    #[test]
    fn encode_round_trips_through_parse() {
        let params = ListingParams::parse(Some(
            "search=data+analyst&educations=S1&lock_city=Bandung&cities=Bekasi",
        ));
        let sync = params.to_sync();
        let encoded = encode_state(&sync, Some(2));
        let reparsed = ListingParams::parse(Some(&encoded));
        assert_eq!(reparsed.page, 2);
        assert_eq!(reparsed.to_sync().effective(), sync.effective());
        assert!(!encoded.contains("cities=Bandung"));
    }

    #[test]
    fn lock_paths_use_taxonomy_slugs() {
        assert_eq!(
            lock_path(&RouteLock::category("Akuntansi & Keuangan")),
            "/lowongan-kerja/kategori/akuntansi-keuangan/"
        );
        assert_eq!(
            lock_path(&RouteLock::location("DKI Jakarta", LocationType::Province)),
            "/lowongan-kerja/lokasi/dki-jakarta/"
        );
        assert_eq!(lock_path(&RouteLock::none()), "/lowongan-kerja/");
    }

    #[test]
    fn chips_link_to_state_without_that_filter() {
        let sync = ListingParams::parse(Some("search=react&educations=S1")).to_sync();
        let (chips, clear) = chips(&sync);
        assert_eq!(chips.len(), 2);
        assert_eq!(chips[0].label, "\"react\"");
        assert_eq!(chips[0].href, "/lowongan-kerja/?educations=S1");
        assert_eq!(chips[1].href, "/lowongan-kerja/?search=react");
        assert_eq!(clear, "/lowongan-kerja/");
    }
}
