//! Admin settings overrides and the admin login session.

use chrono::{DateTime, Duration, Utc};
use nexjob_core::{AdminSettings, SiteConfig};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, warn};
use uuid::Uuid;

use crate::store::{LocalStore, StoreError};

pub const SETTINGS_KEY: &str = "nexjob_admin_settings";
pub const SESSION_KEY: &str = "nexjob_admin_auth";

/// Sessions expire this long after login.
pub const SESSION_TTL_HOURS: i64 = 24;

/// Persisted overrides; every absent field falls back to the environment default.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SettingsOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filters_api_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub home_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub home_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jobs_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jobs_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub articles_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub articles_description: Option<String>,
}

impl SettingsOverrides {
    pub fn merge_over(&self, defaults: &AdminSettings) -> AdminSettings {
        let pick = |value: &Option<String>, default: &String| {
            value.clone().unwrap_or_else(|| default.clone())
        };
        AdminSettings {
            api_url: pick(&self.api_url, &defaults.api_url),
            filters_api_url: pick(&self.filters_api_url, &defaults.filters_api_url),
            auth_token: pick(&self.auth_token, &defaults.auth_token),
            site_title: pick(&self.site_title, &defaults.site_title),
            site_description: pick(&self.site_description, &defaults.site_description),
            home_title: pick(&self.home_title, &defaults.home_title),
            home_description: pick(&self.home_description, &defaults.home_description),
            jobs_title: pick(&self.jobs_title, &defaults.jobs_title),
            jobs_description: pick(&self.jobs_description, &defaults.jobs_description),
            articles_title: pick(&self.articles_title, &defaults.articles_title),
            articles_description: pick(&self.articles_description, &defaults.articles_description),
        }
    }

    /// Layers `newer` on top of `self`, field by field.
    pub fn extend(&mut self, newer: SettingsOverrides) {
        macro_rules! take {
            ($($field:ident),*) => {
                $(if newer.$field.is_some() { self.$field = newer.$field; })*
            };
        }
        take!(
            api_url,
            filters_api_url,
            auth_token,
            site_title,
            site_description,
            home_title,
            home_description,
            jobs_title,
            jobs_description,
            articles_title,
            articles_description
        );
    }
}

#[derive(Debug, Clone)]
pub struct SettingsStore {
    store: LocalStore,
    defaults: AdminSettings,
}

impl SettingsStore {
    pub fn new(store: LocalStore, defaults: AdminSettings) -> Self {
        Self { store, defaults }
    }

    pub fn defaults(&self) -> &AdminSettings {
        &self.defaults
    }

    pub async fn overrides(&self) -> Result<SettingsOverrides, StoreError> {
        match self.store.read_json::<SettingsOverrides>(SETTINGS_KEY).await {
            Ok(saved) => Ok(saved.unwrap_or_default()),
            Err(StoreError::Corrupt { source, .. }) => {
                warn!(error = %source, "saved settings unreadable; using defaults");
                Ok(SettingsOverrides::default())
            }
            Err(err) => Err(err),
        }
    }

    pub async fn get(&self) -> Result<AdminSettings, StoreError> {
        Ok(self.overrides().await?.merge_over(&self.defaults))
    }

    /// Merges `changes` into the saved overrides and returns the effective settings.
    pub async fn save(&self, changes: SettingsOverrides) -> Result<AdminSettings, StoreError> {
        let _guard = self.store.lock().await;
        let mut saved = self.overrides().await?;
        saved.extend(changes);
        self.store.write_json_locked(SETTINGS_KEY, &saved).await?;
        info!("admin settings saved");
        Ok(saved.merge_over(&self.defaults))
    }

    pub async fn reset(&self) -> Result<AdminSettings, StoreError> {
        self.store.remove(SETTINGS_KEY).await?;
        Ok(self.defaults.clone())
    }
}

/// Configured admin login; absent when the environment does not define one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminCredentials {
    pub email: String,
    pub password_sha256: String,
}

impl AdminCredentials {
    pub fn from_site(config: &SiteConfig) -> Option<Self> {
        Some(Self {
            email: config.admin_email.clone()?,
            password_sha256: config.admin_password_sha256.clone()?,
        })
    }

    pub fn hash_password(password: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(password.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn verify(&self, email: &str, password: &str) -> bool {
        self.email.eq_ignore_ascii_case(email.trim())
            && Self::hash_password(password) == self.password_sha256
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminSession {
    /// Random session id; the record lives under `nexjob_admin_auth_<id>`.
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub email: String,
}

impl AdminSession {
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.timestamp && now - self.timestamp < Duration::hours(SESSION_TTL_HOURS)
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.timestamp + Duration::hours(SESSION_TTL_HOURS)
    }
}

fn session_key(id: &str) -> Option<String> {
    let valid = !id.is_empty() && id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase());
    valid.then(|| format!("{SESSION_KEY}_{id}"))
}

/// One record per signed-in client, keyed by session id.
#[derive(Debug, Clone)]
pub struct AdminSessionStore {
    store: LocalStore,
    credentials: Option<AdminCredentials>,
}

impl AdminSessionStore {
    pub fn new(store: LocalStore, credentials: Option<AdminCredentials>) -> Self {
        Self { store, credentials }
    }

    pub fn login_enabled(&self) -> bool {
        self.credentials.is_some()
    }

    /// Starts a fresh session when the credentials match; `None` otherwise.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<AdminSession>, StoreError> {
        let Some(credentials) = &self.credentials else {
            warn!("admin login attempted but no admin credentials are configured");
            return Ok(None);
        };
        if !credentials.verify(email, password) {
            warn!("admin login rejected");
            return Ok(None);
        }
        let session = AdminSession {
            id: Uuid::new_v4().simple().to_string(),
            timestamp: now,
            email: credentials.email.clone(),
        };
        let key = format!("{SESSION_KEY}_{}", session.id);
        self.store.write_json(&key, &session).await?;
        info!(email = %session.email, "admin logged in");
        Ok(Some(session))
    }

    /// The live session for `id`, dropping it once expired. Unknown or malformed ids read as `None`.
    pub async fn current(
        &self,
        id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<AdminSession>, StoreError> {
        let Some(key) = session_key(id) else {
            return Ok(None);
        };
        let session = match self.store.read_json::<AdminSession>(&key).await {
            Ok(session) => session,
            Err(StoreError::Corrupt { .. }) => {
                self.store.remove(&key).await?;
                return Ok(None);
            }
            Err(err) => return Err(err),
        };
        match session {
            Some(session) if session.id == id && session.is_valid_at(now) => Ok(Some(session)),
            Some(_) => {
                self.store.remove(&key).await?;
                Ok(None)
            }
            None => Ok(None),
        }
    }

    pub async fn logout(&self, id: &str) -> Result<(), StoreError> {
        if let Some(key) = session_key(id) {
            self.store.remove(&key).await?;
        }
        Ok(())
    }
}
