//! Core domain model, site configuration, and facet filtering for Nexjob.

use chrono::{DateTime, Duration, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

pub mod facets;

pub use facets::{apply, apply_with, sort_newest_first, KeywordMode};

pub const CRATE_NAME: &str = "nexjob-core";

/// Number of jobs requested per page by every listing view.
pub const DEFAULT_PAGE_SIZE: u32 = 24;

/// Canonical job posting after CMS normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub slug: String,
    pub title: String,
    /// Rich-text body, kept as markup.
    pub content: String,
    pub company_name: String,
    pub category: String,
    pub province: String,
    pub city: String,
    pub job_type: String,
    pub education: String,
    pub industry: String,
    pub experience: String,
    /// Comma-joined tag string as stored in the CMS.
    pub tag: String,
    pub gender: String,
    pub salary: String,
    pub work_policy: String,
    pub link: String,
    pub source: String,
    pub created_at: Option<DateTime<Utc>>,
    pub seo_title: Option<String>,
    pub seo_description: Option<String>,
}

impl Job {
    pub fn tags(&self) -> Vec<String> {
        split_tags(&self.tag)
    }

    pub fn detail_path(&self) -> String {
        format!("/lowongan-kerja/{}/", self.slug)
    }
}

pub fn split_tags(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Canonical blog article.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    pub id: String,
    pub slug: String,
    pub title: String,
    pub excerpt: String,
    pub content: String,
    pub published_at: Option<DateTime<Utc>>,
    pub modified_at: Option<DateTime<Utc>>,
    pub featured_media_url: Option<String>,
    pub author_name: Option<String>,
    pub categories: Vec<String>,
    pub tags: Vec<String>,
    pub seo_title: String,
    pub seo_description: String,
}

impl Article {
    pub fn detail_path(&self) -> String {
        format!("/artikel/{}/", self.slug)
    }
}

/// Taxonomy snapshot used to populate the filter sidebar and resolve route slugs.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FilterData {
    pub provinces: IndexMap<String, Vec<String>>,
    pub categories: Vec<String>,
    pub job_types: Vec<String>,
    pub experiences: Vec<String>,
    pub educations: Vec<String>,
    pub work_policies: Vec<String>,
    pub industries: Vec<String>,
}

impl FilterData {
    pub fn province_names(&self) -> Vec<&str> {
        self.provinces.keys().map(String::as_str).collect()
    }

    /// Every city across provinces, first occurrence wins.
    pub fn all_cities(&self) -> Vec<&str> {
        let mut seen = std::collections::HashSet::new();
        self.provinces
            .values()
            .flatten()
            .map(String::as_str)
            .filter(|c| seen.insert(*c))
            .collect()
    }

    pub fn options(&self, kind: FacetKind) -> Vec<&str> {
        match kind {
            FacetKind::City => self.all_cities(),
            FacetKind::JobType => self.job_types.iter().map(String::as_str).collect(),
            FacetKind::Experience => self.experiences.iter().map(String::as_str).collect(),
            FacetKind::Education => self.educations.iter().map(String::as_str).collect(),
            FacetKind::Industry => self.industries.iter().map(String::as_str).collect(),
            FacetKind::WorkPolicy => self.work_policies.iter().map(String::as_str).collect(),
            FacetKind::Category => self.categories.iter().map(String::as_str).collect(),
        }
    }

    pub fn category_by_slug(&self, slug: &str) -> Option<&str> {
        self.categories
            .iter()
            .find(|c| taxonomy_slug(c) == slug)
            .map(String::as_str)
    }

    /// Provinces are matched before cities.
    pub fn location_by_slug(&self, slug: &str) -> Option<(String, LocationType)> {
        if let Some(province) = self.provinces.keys().find(|p| taxonomy_slug(p) == slug) {
            return Some((province.clone(), LocationType::Province));
        }
        self.provinces
            .values()
            .flatten()
            .find(|c| taxonomy_slug(c) == slug)
            .map(|c| (c.clone(), LocationType::City))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationType {
    Province,
    City,
}

/// URL slug for a taxonomy value: lowercase ASCII alphanumerics joined by single dashes.
pub fn taxonomy_slug(value: &str) -> String {
    value
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
}

/// One independently selectable filter dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FacetKind {
    City,
    JobType,
    Experience,
    Education,
    Industry,
    WorkPolicy,
    Category,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchRule {
    Substring,
    Exact,
}

impl FacetKind {
    pub const ALL: [FacetKind; 7] = [
        FacetKind::City,
        FacetKind::Category,
        FacetKind::JobType,
        FacetKind::Experience,
        FacetKind::Education,
        FacetKind::Industry,
        FacetKind::WorkPolicy,
    ];

    pub fn key(self) -> &'static str {
        match self {
            FacetKind::City => "cities",
            FacetKind::JobType => "jobTypes",
            FacetKind::Experience => "experiences",
            FacetKind::Education => "educations",
            FacetKind::Industry => "industries",
            FacetKind::WorkPolicy => "workPolicies",
            FacetKind::Category => "categories",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.key() == key)
    }

    pub fn label(self) -> &'static str {
        match self {
            FacetKind::City => "Kota",
            FacetKind::JobType => "Tipe Pekerjaan",
            FacetKind::Experience => "Pengalaman",
            FacetKind::Education => "Pendidikan",
            FacetKind::Industry => "Industri",
            FacetKind::WorkPolicy => "Kebijakan Kerja",
            FacetKind::Category => "Kategori Pekerjaan",
        }
    }

    pub fn rule(self) -> MatchRule {
        match self {
            FacetKind::JobType | FacetKind::Education | FacetKind::WorkPolicy => MatchRule::Exact,
            FacetKind::City | FacetKind::Experience | FacetKind::Industry | FacetKind::Category => {
                MatchRule::Substring
            }
        }
    }

    pub fn job_field(self, job: &Job) -> &str {
        match self {
            FacetKind::City => &job.city,
            FacetKind::JobType => &job.job_type,
            FacetKind::Experience => &job.experience,
            FacetKind::Education => &job.education,
            FacetKind::Industry => &job.industry,
            FacetKind::WorkPolicy => &job.work_policy,
            FacetKind::Category => &job.category,
        }
    }
}

/// Multi-select facet selections. An empty list means no constraint.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FacetBag {
    pub cities: Vec<String>,
    pub job_types: Vec<String>,
    pub experiences: Vec<String>,
    pub educations: Vec<String>,
    pub industries: Vec<String>,
    pub work_policies: Vec<String>,
    pub categories: Vec<String>,
}

impl FacetBag {
    pub fn values(&self, kind: FacetKind) -> &[String] {
        match kind {
            FacetKind::City => &self.cities,
            FacetKind::JobType => &self.job_types,
            FacetKind::Experience => &self.experiences,
            FacetKind::Education => &self.educations,
            FacetKind::Industry => &self.industries,
            FacetKind::WorkPolicy => &self.work_policies,
            FacetKind::Category => &self.categories,
        }
    }

    pub fn values_mut(&mut self, kind: FacetKind) -> &mut Vec<String> {
        match kind {
            FacetKind::City => &mut self.cities,
            FacetKind::JobType => &mut self.job_types,
            FacetKind::Experience => &mut self.experiences,
            FacetKind::Education => &mut self.educations,
            FacetKind::Industry => &mut self.industries,
            FacetKind::WorkPolicy => &mut self.work_policies,
            FacetKind::Category => &mut self.categories,
        }
    }

    pub fn contains(&self, kind: FacetKind, value: &str) -> bool {
        self.values(kind).iter().any(|v| v == value)
    }

    /// Adds the value when `selected` and removes it otherwise. Returns whether the bag changed.
    pub fn set_selected(&mut self, kind: FacetKind, value: &str, selected: bool) -> bool {
        let values = self.values_mut(kind);
        let present = values.iter().any(|v| v == value);
        match (selected, present) {
            (true, false) => {
                values.push(value.to_string());
                true
            }
            (false, true) => {
                values.retain(|v| v != value);
                true
            }
            _ => false,
        }
    }

    pub fn is_empty(&self) -> bool {
        FacetKind::ALL.iter().all(|k| self.values(*k).is_empty())
    }

    pub fn selected_count(&self) -> usize {
        FacetKind::ALL.iter().map(|k| self.values(*k).len()).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Newest,
    /// Keep CMS order.
    Relevant,
}

/// Everything the user can constrain a search by.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FilterState {
    pub keyword: String,
    pub province: String,
    pub facets: FacetBag,
    pub sort: SortOrder,
}

impl FilterState {
    /// The part of the filter the CMS search endpoint understands.
    pub fn server_query(&self) -> ServerQuery {
        let keyword = self.keyword.trim();
        ServerQuery {
            search: (!keyword.is_empty()).then(|| keyword.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ServerQuery {
    pub search: Option<String>,
}

/// One page of listing results after local facet filtering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobsPage {
    pub jobs: Vec<Job>,
    pub total_pages: u32,
    pub total_jobs: u64,
    pub current_page: u32,
    pub has_more: bool,
    /// Items the CMS returned before local filtering.
    pub raw_count: usize,
    /// Served from the built-in fallback dataset.
    pub fallback: bool,
}

/// Indonesian relative time label shown on job cards.
pub fn relative_posted_label(created_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    let Some(created_at) = created_at else {
        return "Baru saja".to_string();
    };
    let diff = (now - created_at).abs();
    let minutes = diff.num_minutes();
    let hours = ceil_div(minutes.max(1), 60);
    if hours < 24 {
        return if hours == 1 {
            "1 jam lalu".to_string()
        } else {
            format!("{hours} jam lalu")
        };
    }
    let days = ceil_div(minutes, 60 * 24);
    if days == 1 {
        "1 hari lalu".to_string()
    } else if days < 7 {
        format!("{days} hari lalu")
    } else if days < 30 {
        format!("{} minggu lalu", ceil_div(days, 7))
    } else {
        format!("{} bulan lalu", ceil_div(days, 30))
    }
}

fn ceil_div(a: i64, b: i64) -> i64 {
    (a + b - 1) / b
}

/// Canonical site paths end with a slash unless they carry a file extension, query, or fragment.
pub fn ensure_trailing_slash(path: &str) -> String {
    if path.contains('.') || path.contains('?') || path.contains('#') || path.ends_with('/') {
        path.to_string()
    } else {
        format!("{path}/")
    }
}

/// Admin-editable connection and SEO settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminSettings {
    pub api_url: String,
    pub filters_api_url: String,
    pub auth_token: String,
    pub site_title: String,
    pub site_description: String,
    pub home_title: String,
    pub home_description: String,
    pub jobs_title: String,
    pub jobs_description: String,
    pub articles_title: String,
    pub articles_description: String,
}

impl AdminSettings {
    pub fn defaults_for(config: &SiteConfig) -> Self {
        let name = &config.site_name;
        Self {
            api_url: config.wp_api_url.clone(),
            filters_api_url: config.wp_filters_api_url.clone(),
            auth_token: config.wp_auth_token.clone(),
            site_title: format!("{name} - Find Your Dream Job"),
            site_description: config.site_description.clone(),
            home_title: format!("{name} - Temukan Karir Impianmu"),
            home_description: config.site_description.clone(),
            jobs_title: format!("Lowongan Kerja - {name}"),
            jobs_description:
                "Temukan lowongan kerja terbaru dari berbagai perusahaan terpercaya di Indonesia"
                    .to_string(),
            articles_title: format!("Tips & Panduan Karir - {name}"),
            articles_description:
                "Artikel dan panduan terbaru untuk membantu perjalanan karir Anda".to_string(),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),
    #[error("invalid URL in {key}: {value}")]
    InvalidUrl { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct SiteConfig {
    pub site_url: String,
    pub site_name: String,
    pub site_description: String,
    pub wp_api_url: String,
    pub wp_filters_api_url: String,
    pub wp_auth_token: String,
    pub ga_id: Option<String>,
    pub gtm_id: Option<String>,
    pub data_dir: std::path::PathBuf,
    pub web_port: u16,
    pub http_timeout_secs: u64,
    pub user_agent: String,
    pub admin_email: Option<String>,
    pub admin_password_sha256: Option<String>,
    /// HMAC key for visitor and admin cookies; a random one is used when unset.
    pub session_secret: Option<String>,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            site_url: "https://nexjob.tech".to_string(),
            site_name: "Nexjob".to_string(),
            site_description: "Platform pencarian kerja terpercaya di Indonesia".to_string(),
            wp_api_url: "https://staging.nexjob.tech/wp-json/wp/v2".to_string(),
            wp_filters_api_url: "https://staging.nexjob.tech/wp-json/nex/v1/filters-data"
                .to_string(),
            wp_auth_token: String::new(),
            ga_id: None,
            gtm_id: None,
            data_dir: std::path::PathBuf::from("./data"),
            web_port: 8000,
            http_timeout_secs: 20,
            user_agent: "nexjob/0.1".to_string(),
            admin_email: None,
            admin_password_sha256: None,
            session_secret: None,
        }
    }
}

impl SiteConfig {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let defaults = Self::default();
        let var = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());
        Self {
            site_url: var("NEXJOB_SITE_URL").unwrap_or(defaults.site_url),
            site_name: var("NEXJOB_SITE_NAME").unwrap_or(defaults.site_name),
            site_description: var("NEXJOB_SITE_DESCRIPTION").unwrap_or(defaults.site_description),
            wp_api_url: var("NEXJOB_WP_API_URL").unwrap_or(defaults.wp_api_url),
            wp_filters_api_url: var("NEXJOB_WP_FILTERS_API_URL")
                .unwrap_or(defaults.wp_filters_api_url),
            wp_auth_token: var("NEXJOB_WP_AUTH_TOKEN").unwrap_or_default(),
            ga_id: var("NEXJOB_GA_ID"),
            gtm_id: var("NEXJOB_GTM_ID"),
            data_dir: var("NEXJOB_DATA_DIR")
                .map(std::path::PathBuf::from)
                .unwrap_or(defaults.data_dir),
            web_port: var("NEXJOB_WEB_PORT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.web_port),
            http_timeout_secs: var("NEXJOB_HTTP_TIMEOUT_SECS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.http_timeout_secs),
            user_agent: var("NEXJOB_USER_AGENT").unwrap_or(defaults.user_agent),
            admin_email: var("NEXJOB_ADMIN_EMAIL"),
            admin_password_sha256: var("NEXJOB_ADMIN_PASSWORD_SHA256")
                .map(|h| h.to_ascii_lowercase()),
            session_secret: var("NEXJOB_SESSION_SECRET"),
        }
    }

    /// Startup validation of the settings every page needs.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (key, value) in [
            ("NEXJOB_SITE_URL", &self.site_url),
            ("NEXJOB_WP_API_URL", &self.wp_api_url),
            ("NEXJOB_WP_FILTERS_API_URL", &self.wp_filters_api_url),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Missing(key));
            }
            let parsed = Url::parse(value).map_err(|_| ConfigError::InvalidUrl {
                key,
                value: value.clone(),
            })?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(ConfigError::InvalidUrl {
                    key,
                    value: value.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn site_url_trimmed(&self) -> &str {
        self.site_url.trim_end_matches('/')
    }
}

/// Outbound analytics events. Delivery is best-effort and never blocks a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AnalyticsEvent {
    PageView {
        path: String,
        page_type: String,
        category: Option<String>,
        location: Option<String>,
    },
    Search {
        term: String,
        location: Option<String>,
        category: Option<String>,
    },
    FilterApplied {
        facet: String,
        value: String,
    },
    BookmarkToggled {
        job_id: String,
        added: bool,
    },
    JobApplicationClick {
        job_id: String,
        title: String,
        company: String,
    },
    ArticleRead {
        article_id: String,
        title: String,
        category: Option<String>,
    },
}

impl AnalyticsEvent {
    pub fn name(&self) -> &'static str {
        match self {
            AnalyticsEvent::PageView { .. } => "page_view",
            AnalyticsEvent::Search { .. } => "search",
            AnalyticsEvent::FilterApplied { .. } => "filter_used",
            AnalyticsEvent::BookmarkToggled { added: true, .. } => "bookmark_add",
            AnalyticsEvent::BookmarkToggled { added: false, .. } => "bookmark_remove",
            AnalyticsEvent::JobApplicationClick { .. } => "job_application_click",
            AnalyticsEvent::ArticleRead { .. } => "article_read",
        }
    }
}

/// Days a posting stays valid after publication for structured data.
pub fn valid_through(created_at: DateTime<Utc>) -> DateTime<Utc> {
    created_at + Duration::days(30)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn taxonomy_slugs_match_route_segments() {
        assert_eq!(taxonomy_slug("DKI Jakarta"), "dki-jakarta");
        assert_eq!(taxonomy_slug("Akuntansi & Keuangan"), "akuntansi-keuangan");
        assert_eq!(taxonomy_slug("  Sales -- Retail "), "sales-retail");
        assert_eq!(taxonomy_slug("S1/D4"), "s1d4");
    }

    #[test]
    fn location_slug_prefers_province_over_city() {
        let mut data = FilterData::default();
        data.provinces.insert("Bali".into(), vec!["Denpasar".into()]);
        data.provinces
            .insert("Jawa Barat".into(), vec!["Bali".into(), "Bandung".into()]);

        assert_eq!(
            data.location_by_slug("bali"),
            Some(("Bali".to_string(), LocationType::Province))
        );
        assert_eq!(
            data.location_by_slug("bandung"),
            Some(("Bandung".to_string(), LocationType::City))
        );
        assert_eq!(data.location_by_slug("mars"), None);
    }

    #[test]
    fn tags_are_split_trimmed_and_non_empty() {
        assert_eq!(
            split_tags("React.js, Frontend ,,  TypeScript,"),
            vec!["React.js", "Frontend", "TypeScript"]
        );
        assert!(split_tags("").is_empty());
    }

    #[test]
    fn facet_bag_selection_is_idempotent() {
        let mut bag = FacetBag::default();
        assert!(bag.set_selected(FacetKind::City, "Bandung", true));
        assert!(!bag.set_selected(FacetKind::City, "Bandung", true));
        assert_eq!(bag.cities, vec!["Bandung"]);
        assert!(bag.set_selected(FacetKind::City, "Bandung", false));
        assert!(!bag.set_selected(FacetKind::City, "Bandung", false));
        assert!(bag.is_empty());
    }

    #[test]
    fn server_query_only_carries_keyword() {
        let mut state = FilterState::default();
        state.province = "Bali".into();
        state.facets.job_types.push("Full Time".into());
        assert_eq!(state.server_query().search, None);
        state.keyword = "  react  ".into();
        assert_eq!(state.server_query().search.as_deref(), Some("react"));
    }

    #[test]
    fn relative_labels_follow_card_wording() {
        let now = Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).single().unwrap();
        assert_eq!(relative_posted_label(None, now), "Baru saja");
        assert_eq!(
            relative_posted_label(Some(now - Duration::minutes(30)), now),
            "1 jam lalu"
        );
        assert_eq!(
            relative_posted_label(Some(now - Duration::hours(5)), now),
            "5 jam lalu"
        );
        assert_eq!(
            relative_posted_label(Some(now - Duration::hours(30)), now),
            "2 hari lalu"
        );
        assert_eq!(
            relative_posted_label(Some(now - Duration::days(10)), now),
            "2 minggu lalu"
        );
        assert_eq!(
            relative_posted_label(Some(now - Duration::days(45)), now),
            "2 bulan lalu"
        );
    }

    #[test]
    fn trailing_slash_rules() {
        assert_eq!(ensure_trailing_slash("/lowongan-kerja"), "/lowongan-kerja/");
        assert_eq!(ensure_trailing_slash("/artikel/"), "/artikel/");
        assert_eq!(ensure_trailing_slash("/logo.png"), "/logo.png");
        assert_eq!(ensure_trailing_slash("/lowongan-kerja?search=x"), "/lowongan-kerja?search=x");
    }

    #[test]
    fn config_validation_rejects_bad_urls() {
        let mut config = SiteConfig::default();
        assert_eq!(config.validate(), Ok(()));

        config.wp_api_url = "   ".into();
        assert_eq!(config.validate(), Err(ConfigError::Missing("NEXJOB_WP_API_URL")));

        config.wp_api_url = "ftp://cms.example".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidUrl { key: "NEXJOB_WP_API_URL", .. })
        ));
    }

    #[test]
    fn admin_defaults_use_site_name() {
        let config = SiteConfig {
            site_name: "Kerjaku".into(),
            ..SiteConfig::default()
        };
        let settings = AdminSettings::defaults_for(&config);
        assert_eq!(settings.home_title, "Kerjaku - Temukan Karir Impianmu");
        assert_eq!(settings.jobs_title, "Lowongan Kerja - Kerjaku");
        assert_eq!(settings.api_url, config.wp_api_url);
    }

    #[test]
    fn analytics_events_serialize_with_tag() {
        let event = AnalyticsEvent::BookmarkToggled {
            job_id: "42".into(),
            added: true,
        };
        assert_eq!(event.name(), "bookmark_add");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "bookmark_toggled");
        assert_eq!(json["job_id"], "42");
    }
}
