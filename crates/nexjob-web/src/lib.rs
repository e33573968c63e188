//! Axum + Askama site for Nexjob.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use askama::Template;
use axum::{
    extract::{Path as AxumPath, State},
    http::{StatusCode, Uri},
    middleware,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Router,
};
use chrono::{Datelike, Utc};
use nexjob_adapters::{JobSource, WordPressSource};
use nexjob_core::{ensure_trailing_slash, AdminSettings, AnalyticsEvent, SiteConfig, DEFAULT_PAGE_SIZE};
use nexjob_search::{AnalyticsSink, TracingAnalytics};
use nexjob_storage::{
    AdminCredentials, AdminSessionStore, BookmarkStore, HttpClientConfig, LocalStore, SettingsStore,
    StoreError, StoreWatcher,
};
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub mod admin;
pub mod bookmarks;
pub mod listing;
pub mod pages;
pub mod seo;
pub mod session;

use seo::PageMeta;
use session::{ClientId, SessionTokens};

pub const CRATE_NAME: &str = "nexjob-web";

/// How often the data directory is checked for writes from other processes.
pub const STORE_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Builds the job source for a given set of admin settings.
pub type SourceBuilder =
    Arc<dyn Fn(&AdminSettings) -> anyhow::Result<Arc<dyn JobSource>> + Send + Sync>;

pub struct AppState {
    pub config: SiteConfig,
    pub store: LocalStore,
    pub settings_store: SettingsStore,
    pub sessions: AdminSessionStore,
    pub tokens: SessionTokens,
    pub page_size: u32,
    source: RwLock<Arc<dyn JobSource>>,
    source_builder: SourceBuilder,
    analytics: Arc<dyn AnalyticsSink>,
    _watcher: Option<StoreWatcher>,
}

impl AppState {
    /// State over a fixed source; saving settings keeps serving it.
    pub fn new(config: SiteConfig, source: Arc<dyn JobSource>) -> Self {
        let fixed = source.clone();
        let builder: SourceBuilder = Arc::new(move |_| Ok(fixed.clone()));
        Self::assemble(config, source, builder)
    }

    /// Production wiring: validated config, WordPress client built from the saved settings.
    pub async fn from_config(config: SiteConfig) -> anyhow::Result<Self> {
        config.validate().context("invalid site configuration")?;
        let http = HttpClientConfig::from_site(&config);
        let builder: SourceBuilder = Arc::new(move |settings| {
            let source = WordPressSource::from_settings(settings, http.clone())?;
            Ok(Arc::new(source) as Arc<dyn JobSource>)
        });
        let store = LocalStore::new(&config.data_dir);
        let settings = SettingsStore::new(store, AdminSettings::defaults_for(&config))
            .get()
            .await
            .context("failed to read saved admin settings")?;
        let source = builder(&settings)?;
        let mut state = Self::assemble(config, source, builder);
        state.watch_store(STORE_POLL_INTERVAL).await?;
        Ok(state)
    }

    /// Re-broadcasts data-directory changes made by other processes, such as the CLI.
    pub async fn watch_store(&mut self, every: Duration) -> anyhow::Result<()> {
        let watcher = self
            .store
            .watch(every)
            .await
            .context("failed to watch the data directory")?;
        self._watcher = Some(watcher);
        Ok(())
    }

    fn assemble(config: SiteConfig, source: Arc<dyn JobSource>, source_builder: SourceBuilder) -> Self {
        let store = LocalStore::new(&config.data_dir);
        Self {
            settings_store: SettingsStore::new(store.clone(), AdminSettings::defaults_for(&config)),
            sessions: AdminSessionStore::new(store.clone(), AdminCredentials::from_site(&config)),
            tokens: SessionTokens::from_site(&config),
            store,
            page_size: DEFAULT_PAGE_SIZE,
            source: RwLock::new(source),
            source_builder,
            analytics: Arc::new(TracingAnalytics),
            _watcher: None,
            config,
        }
    }

    /// The saved jobs of one visitor.
    pub fn bookmarks_for(&self, client: &ClientId) -> Result<BookmarkStore, StoreError> {
        BookmarkStore::for_client(self.store.clone(), client.as_str())
    }

    /// Cookies carry `Secure` when the site is served over https.
    pub fn secure_cookies(&self) -> bool {
        self.config.site_url.starts_with("https://")
    }

    pub fn with_analytics(mut self, analytics: Arc<dyn AnalyticsSink>) -> Self {
        self.analytics = analytics;
        self
    }

    pub async fn source(&self) -> Arc<dyn JobSource> {
        self.source.read().await.clone()
    }

    /// Swaps in a client built from `settings`; the old one keeps serving in-flight requests.
    pub async fn reload_source(&self, settings: &AdminSettings) -> anyhow::Result<()> {
        let source = (self.source_builder)(settings)?;
        info!(source = source.source_id(), api = %settings.api_url, "job source rebuilt");
        *self.source.write().await = source;
        Ok(())
    }

    /// Saved settings, or the environment defaults when the store is unreadable.
    pub async fn settings(&self) -> AdminSettings {
        match self.settings_store.get().await {
            Ok(settings) => settings,
            Err(err) => {
                warn!(error = %err, "admin settings unreadable; using defaults");
                self.settings_store.defaults().clone()
            }
        }
    }

    pub fn track(&self, event: AnalyticsEvent) {
        self.analytics.record(&event);
    }

    pub fn chrome(&self, meta: PageMeta, json_ld: String) -> Chrome {
        Chrome {
            meta,
            json_ld,
            site_name: self.config.site_name.clone(),
            ga_id: self.config.ga_id.clone().unwrap_or_default(),
            gtm_id: self.config.gtm_id.clone().unwrap_or_default(),
            year: Utc::now().year(),
        }
    }
}

/// Layout data every full page carries.
#[derive(Debug, Clone)]
pub struct Chrome {
    pub meta: PageMeta,
    pub json_ld: String,
    pub site_name: String,
    pub ga_id: String,
    pub gtm_id: String,
    pub year: i32,
}

#[derive(Template)]
#[template(path = "not_found.html")]
struct NotFoundTemplate {
    chrome: Chrome,
    message: String,
}

pub fn app(state: AppState) -> Router {
    let state = Arc::new(state);
    Router::new()
        .route("/", get(pages::home_handler))
        .route("/lowongan-kerja/", get(listing::listing_handler))
        .route("/lowongan-kerja/results", get(listing::results_handler))
        .route("/lowongan-kerja/kategori/{slug}/", get(listing::category_handler))
        .route("/lowongan-kerja/lokasi/{slug}/", get(listing::location_handler))
        .route("/lowongan-kerja/{slug}/", get(pages::job_detail_handler))
        .route("/lowongan-kerja/{slug}/apply", get(pages::apply_handler))
        .route("/artikel/", get(pages::articles_handler))
        .route("/artikel/{slug}/", get(pages::article_detail_handler))
        .route("/bookmarks/", get(bookmarks::bookmarks_handler))
        .route("/bookmarks/count", get(bookmarks::count_handler))
        .route("/bookmarks/events", get(bookmarks::events_handler))
        .route("/bookmarks/{id}/toggle", post(bookmarks::toggle_handler))
        .route("/bookmark/", get(|| async { Redirect::permanent("/bookmarks/") }))
        .route("/admin/", get(admin::admin_handler))
        .route("/admin/login", post(admin::login_handler))
        .route("/admin/logout", post(admin::logout_handler))
        .route("/admin/settings", post(admin::save_settings_handler))
        .route("/admin/settings/reset", post(admin::reset_settings_handler))
        .route("/admin/test-connection", post(admin::test_connection_handler))
        .route("/jobs", get(|| async { Redirect::permanent("/lowongan-kerja/") }))
        .route("/jobs/{slug}", get(legacy_job_handler))
        .route("/articles", get(|| async { Redirect::permanent("/artikel/") }))
        .route("/articles/{slug}", get(legacy_article_handler))
        .fallback(fallback_handler)
        .layer(middleware::from_fn_with_state(state.clone(), session::client_cookie))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(state: AppState) -> anyhow::Result<()> {
    let port = state.config.web_port;
    let listener = TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("failed to bind port {port}"))?;
    info!(port, "nexjob web listening");
    axum::serve(listener, app(state)).await?;
    Ok(())
}

pub async fn serve_from_env() -> anyhow::Result<()> {
    let state = AppState::from_config(SiteConfig::from_env()).await?;
    serve(state).await
}

async fn legacy_job_handler(AxumPath(slug): AxumPath<String>) -> Redirect {
    Redirect::permanent(&format!("/lowongan-kerja/{slug}/"))
}

async fn legacy_article_handler(AxumPath(slug): AxumPath<String>) -> Redirect {
    Redirect::permanent(&format!("/artikel/{slug}/"))
}

/// Adds the canonical trailing slash, otherwise 404.
async fn fallback_handler(State(state): State<Arc<AppState>>, uri: Uri) -> Response {
    let path = uri.path();
    let canonical = ensure_trailing_slash(path);
    if canonical != path {
        let target = match uri.query() {
            Some(query) => format!("{canonical}?{query}"),
            None => canonical,
        };
        return Redirect::permanent(&target).into_response();
    }
    not_found(&state, "Halaman yang Anda cari tidak ditemukan.")
}

pub(crate) fn not_found(state: &AppState, message: &str) -> Response {
    let meta = PageMeta::website(
        "Halaman Tidak Ditemukan - Nexjob",
        message,
        format!("{}/", state.config.site_url_trimmed()),
    );
    let mut resp = render_html(NotFoundTemplate {
        chrome: state.chrome(meta, String::new()),
        message: message.to_string(),
    });
    *resp.status_mut() = StatusCode::NOT_FOUND;
    resp
}

fn render_html<T: Template>(tpl: T) -> Response {
    match tpl.render() {
        Ok(html) => Html(html).into_response(),
        Err(err) => server_error(anyhow::anyhow!(err.to_string())),
    }
}

fn server_error(err: anyhow::Error) -> Response {
    warn!(error = %err, "request failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Html(format!("Server error: {}", err)),
    )
        .into_response()
}
