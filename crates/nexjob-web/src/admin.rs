//! Admin screen: login, connection settings, and CMS connection probes.

use std::sync::Arc;

use askama::Template;
use axum::{
    extract::{Form, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
};
use chrono::Utc;
use nexjob_adapters::ConnectionReport;
use nexjob_core::AdminSettings;
use nexjob_storage::{AdminSession, SettingsOverrides};
use serde::Deserialize;
use tracing::info;

use crate::seo::PageMeta;
use crate::session::{cookie, set_cookie, ADMIN_COOKIE};
use crate::{render_html, server_error, AppState, Chrome};

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct SettingField {
    pub name: &'static str,
    pub label: &'static str,
    pub value: String,
    pub secret: bool,
    /// A secret is stored; its field still renders empty.
    pub has_value: bool,
    pub multiline: bool,
}

fn setting_fields(settings: &AdminSettings) -> Vec<SettingField> {
    let field = |name: &'static str, label: &'static str, value: &String| SettingField {
        name,
        label,
        value: value.clone(),
        secret: false,
        has_value: !value.is_empty(),
        multiline: name.ends_with("Description"),
    };
    vec![
        field("apiUrl", "WordPress API URL", &settings.api_url),
        field("filtersApiUrl", "Filters API URL", &settings.filters_api_url),
        SettingField {
            secret: true,
            value: String::new(),
            ..field("authToken", "Auth Token", &settings.auth_token)
        },
        field("siteTitle", "Judul Situs", &settings.site_title),
        field("siteDescription", "Deskripsi Situs", &settings.site_description),
        field("homeTitle", "Judul Beranda", &settings.home_title),
        field("homeDescription", "Deskripsi Beranda", &settings.home_description),
        field("jobsTitle", "Judul Halaman Lowongan", &settings.jobs_title),
        field("jobsDescription", "Deskripsi Halaman Lowongan", &settings.jobs_description),
        field("articlesTitle", "Judul Halaman Artikel", &settings.articles_title),
        field("articlesDescription", "Deskripsi Halaman Artikel", &settings.articles_description),
    ]
}

#[derive(Template)]
#[template(path = "admin.html")]
struct AdminTemplate {
    chrome: Chrome,
    login_enabled: bool,
    signed_in_as: String,
    error: String,
    notice: String,
    fields: Vec<SettingField>,
}

#[derive(Debug, Clone)]
pub struct ReportView {
    pub label: &'static str,
    pub report: ConnectionReport,
}

#[derive(Template)]
#[template(path = "connection_partial.html")]
struct ConnectionPartialTemplate {
    reports: Vec<ReportView>,
}

/// Session id named by a valid `nexjob_admin` cookie.
fn session_id(state: &AppState, headers: &HeaderMap) -> Option<String> {
    cookie(headers, ADMIN_COOKIE).and_then(|token| state.tokens.verify_admin(token))
}

async fn current_session(state: &AppState, headers: &HeaderMap) -> Result<Option<AdminSession>, Response> {
    let Some(id) = session_id(state, headers) else {
        return Ok(None);
    };
    state
        .sessions
        .current(&id, Utc::now())
        .await
        .map_err(|err| server_error(err.into()))
}

async fn admin_page(
    state: &AppState,
    session: Option<AdminSession>,
    status: StatusCode,
    error: &str,
    notice: &str,
) -> Response {
    let meta = PageMeta::website(
        "Admin - Nexjob",
        "Pengaturan situs Nexjob",
        format!("{}/admin/", state.config.site_url_trimmed()),
    );
    let fields = if session.is_some() {
        setting_fields(&state.settings().await)
    } else {
        Vec::new()
    };
    let mut resp = render_html(AdminTemplate {
        chrome: state.chrome(meta, String::new()),
        login_enabled: state.sessions.login_enabled(),
        signed_in_as: session.map(|s| s.email).unwrap_or_default(),
        error: error.to_string(),
        notice: notice.to_string(),
        fields,
    });
    *resp.status_mut() = status;
    resp
}

pub async fn admin_handler(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    match current_session(&state, &headers).await {
        Ok(session) => admin_page(&state, session, StatusCode::OK, "", "").await,
        Err(resp) => resp,
    }
}

pub async fn login_handler(State(state): State<Arc<AppState>>, Form(form): Form<LoginForm>) -> Response {
    if !state.sessions.login_enabled() {
        return admin_page(
            &state,
            None,
            StatusCode::FORBIDDEN,
            "Login admin belum dikonfigurasi.",
            "",
        )
        .await;
    }
    let now = Utc::now();
    match state.sessions.login(&form.email, &form.password, now).await {
        Ok(Some(session)) => {
            let token = match state.tokens.issue_admin(&session, now) {
                Ok(token) => token,
                Err(err) => return server_error(err),
            };
            let max_age = (session.expires_at() - now).num_seconds();
            let mut resp = Redirect::to("/admin/").into_response();
            if let Some(value) = set_cookie(ADMIN_COOKIE, &token, max_age, state.secure_cookies()) {
                resp.headers_mut().append(header::SET_COOKIE, value);
            }
            resp
        }
        Ok(None) => {
            admin_page(
                &state,
                None,
                StatusCode::UNAUTHORIZED,
                "Email atau password salah.",
                "",
            )
            .await
        }
        Err(err) => server_error(err.into()),
    }
}

pub async fn logout_handler(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    if let Some(id) = session_id(&state, &headers) {
        if let Err(err) = state.sessions.logout(&id).await {
            return server_error(err.into());
        }
    }
    let mut resp = Redirect::to("/admin/").into_response();
    if let Some(value) = set_cookie(ADMIN_COOKIE, "", 0, state.secure_cookies()) {
        resp.headers_mut().append(header::SET_COOKIE, value);
    }
    resp
}

async fn require_session(state: &AppState, headers: &HeaderMap) -> Result<AdminSession, Response> {
    match current_session(state, headers).await? {
        Some(session) => Ok(session),
        None => Err(admin_page(
            state,
            None,
            StatusCode::UNAUTHORIZED,
            "Silakan login terlebih dahulu.",
            "",
        )
        .await),
    }
}

/// Trims every value. Blank endpoint URLs fall back to the defaults and a blank token keeps the saved one.
fn normalize(mut changes: SettingsOverrides) -> Result<SettingsOverrides, String> {
    for value in [
        &mut changes.api_url,
        &mut changes.filters_api_url,
        &mut changes.auth_token,
        &mut changes.site_title,
        &mut changes.site_description,
        &mut changes.home_title,
        &mut changes.home_description,
        &mut changes.jobs_title,
        &mut changes.jobs_description,
        &mut changes.articles_title,
        &mut changes.articles_description,
    ] {
        if let Some(v) = value {
            *v = v.trim().to_string();
        }
    }
    if changes.auth_token.as_deref() == Some("") {
        changes.auth_token = None;
    }
    for (label, value) in [
        ("WordPress API URL", &mut changes.api_url),
        ("Filters API URL", &mut changes.filters_api_url),
    ] {
        if value.as_deref() == Some("") {
            *value = None;
        }
        if let Some(url) = value.as_deref() {
            let parsed = url::Url::parse(url).map_err(|_| format!("{label} tidak valid: {url}"))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(format!("{label} harus memakai http atau https."));
            }
        }
    }
    Ok(changes)
}

pub async fn save_settings_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(changes): Form<SettingsOverrides>,
) -> Response {
    let session = match require_session(&state, &headers).await {
        Ok(session) => session,
        Err(resp) => return resp,
    };
    let changes = match normalize(changes) {
        Ok(changes) => changes,
        Err(message) => {
            return admin_page(&state, Some(session), StatusCode::BAD_REQUEST, &message, "").await
        }
    };
    let settings = match state.settings_store.save(changes).await {
        Ok(settings) => settings,
        Err(err) => return server_error(err.into()),
    };
    if let Err(err) = state.reload_source(&settings).await {
        return admin_page(
            &state,
            Some(session),
            StatusCode::BAD_REQUEST,
            &format!("Pengaturan tersimpan, tetapi koneksi gagal dibuat: {err}"),
            "",
        )
        .await;
    }
    info!(email = %session.email, "admin settings saved");
    admin_page(&state, Some(session), StatusCode::OK, "", "Pengaturan berhasil disimpan.").await
}

pub async fn reset_settings_handler(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let session = match require_session(&state, &headers).await {
        Ok(session) => session,
        Err(resp) => return resp,
    };
    let settings = match state.settings_store.reset().await {
        Ok(settings) => settings,
        Err(err) => return server_error(err.into()),
    };
    if let Err(err) = state.reload_source(&settings).await {
        return server_error(err);
    }
    admin_page(&state, Some(session), StatusCode::OK, "", "Pengaturan dikembalikan ke default.").await
}

pub async fn test_connection_handler(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    if let Err(resp) = require_session(&state, &headers).await {
        return resp;
    }
    let source = state.source().await;
    let (api, filters) = tokio::join!(source.test_connection(), source.test_filters_connection());
    render_html(ConnectionPartialTemplate {
        reports: vec![
            ReportView {
                label: "WordPress API",
                report: api,
            },
            ReportView {
                label: "Filters API",
                report: filters,
            },
        ],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_trims_and_drops_blank_endpoints() {
        let changes = SettingsOverrides {
            api_url: Some("   ".into()),
            home_title: Some("  Karir  ".into()),
            auth_token: Some("  ".into()),
            ..SettingsOverrides::default()
        };
        let normalized = normalize(changes).unwrap();
        assert_eq!(normalized.api_url, None);
        assert_eq!(normalized.home_title.as_deref(), Some("Karir"));
        assert_eq!(normalized.auth_token, None);

        let replaced = normalize(SettingsOverrides {
            auth_token: Some(" baru ".into()),
            ..SettingsOverrides::default()
        })
        .unwrap();
        assert_eq!(replaced.auth_token.as_deref(), Some("baru"));
    }

    #[test]
    fn normalize_rejects_non_http_endpoints() {
        let changes = SettingsOverrides {
            filters_api_url: Some("ftp://cms.example.com/filters".into()),
            ..SettingsOverrides::default()
        };
        assert!(normalize(changes).is_err());
    }

    #[test]
    fn token_field_is_masked_and_never_prefilled() {
        let mut settings = AdminSettings::defaults_for(&nexjob_core::SiteConfig::default());
        settings.auth_token = "rahasia-cms".into();
        let fields = setting_fields(&settings);
        assert_eq!(fields.len(), 11);
        let token = fields.iter().find(|f| f.name == "authToken").unwrap();
        assert!(token.secret);
        assert!(token.has_value);
        assert_eq!(token.value, "");
        assert!(fields.iter().find(|f| f.name == "jobsDescription").unwrap().multiline);
    }
}
