//! Signed cookies: the anonymous visitor id that scopes bookmarks, and the admin login.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use nexjob_core::SiteConfig;
use nexjob_storage::AdminSession;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::AppState;

pub const CLIENT_COOKIE: &str = "nexjob_client";
pub const ADMIN_COOKIE: &str = "nexjob_admin";
pub const CLIENT_TTL_DAYS: i64 = 365;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Client,
    Admin,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub kind: TokenKind,
    pub exp: i64,
    pub iat: i64,
    pub iss: String,
    pub jti: String,
}

/// Anonymous visitor id, lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientId(String);

impl ClientId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let valid = !raw.is_empty()
            && raw
                .chars()
                .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c));
        valid.then(|| Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Issues and verifies the HS256 tokens carried in cookies.
#[derive(Clone)]
pub struct SessionTokens {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
}

impl SessionTokens {
    pub fn new(secret: &str, issuer: impl Into<String>) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            issuer: issuer.into(),
        }
    }

    /// Keys from `NEXJOB_SESSION_SECRET`, or a per-process random secret.
    pub fn from_site(config: &SiteConfig) -> Self {
        let secret = match &config.session_secret {
            Some(secret) => secret.clone(),
            None => {
                warn!("NEXJOB_SESSION_SECRET unset; cookies will not survive a restart");
                format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
            }
        };
        Self::new(&secret, config.site_url_trimmed())
    }

    fn issue(
        &self,
        kind: TokenKind,
        sub: &str,
        now: DateTime<Utc>,
        expires: DateTime<Utc>,
    ) -> anyhow::Result<String> {
        let claims = Claims {
            sub: sub.to_string(),
            kind,
            exp: expires.timestamp(),
            iat: now.timestamp(),
            iss: self.issuer.clone(),
            jti: Uuid::new_v4().to_string(),
        };
        encode(&Header::default(), &claims, &self.encoding_key).map_err(Into::into)
    }

    fn verify(&self, token: &str, kind: TokenKind) -> Option<Claims> {
        let mut validation = Validation::default();
        validation.set_issuer(&[&self.issuer]);
        decode::<Claims>(token, &self.decoding_key, &validation)
            .ok()
            .map(|data| data.claims)
            .filter(|claims| claims.kind == kind)
    }

    pub fn issue_client(&self, client: &ClientId, now: DateTime<Utc>) -> anyhow::Result<String> {
        self.issue(
            TokenKind::Client,
            client.as_str(),
            now,
            now + Duration::days(CLIENT_TTL_DAYS),
        )
    }

    pub fn verify_client(&self, token: &str) -> Option<ClientId> {
        self.verify(token, TokenKind::Client)
            .and_then(|claims| ClientId::parse(&claims.sub))
    }

    /// Token naming the stored session; it expires with the session.
    pub fn issue_admin(&self, session: &AdminSession, now: DateTime<Utc>) -> anyhow::Result<String> {
        self.issue(TokenKind::Admin, &session.id, now, session.expires_at())
    }

    /// Session id from a valid admin token.
    pub fn verify_admin(&self, token: &str) -> Option<String> {
        self.verify(token, TokenKind::Admin).map(|claims| claims.sub)
    }
}

/// Value of cookie `name` from the request headers.
pub fn cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
}

/// `Set-Cookie` value; a zero `max_age` clears the cookie.
pub fn set_cookie(name: &str, value: &str, max_age: i64, secure: bool) -> Option<HeaderValue> {
    let mut cookie = format!("{name}={value}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age}");
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie).ok()
}

/// Attaches a [`ClientId`] to every request, issuing the cookie on first visit.
pub async fn client_cookie(State(state): State<Arc<AppState>>, mut req: Request, next: Next) -> Response {
    let known = cookie(req.headers(), CLIENT_COOKIE).and_then(|token| state.tokens.verify_client(token));
    let fresh = known.is_none();
    let client = known.unwrap_or_else(ClientId::generate);
    req.extensions_mut().insert(client.clone());

    let mut resp = next.run(req).await;
    if fresh {
        match state.tokens.issue_client(&client, Utc::now()) {
            Ok(token) => {
                let max_age = Duration::days(CLIENT_TTL_DAYS).num_seconds();
                if let Some(value) = set_cookie(CLIENT_COOKIE, &token, max_age, state.secure_cookies()) {
                    resp.headers_mut().append(header::SET_COOKIE, value);
                }
            }
            Err(err) => warn!(error = %err, "failed to issue visitor cookie"),
        }
    }
    resp
}
