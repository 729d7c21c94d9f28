// SPDX-License-Identifier: MIT
//! Wire-level client for the Hackaru activities API.
//!
//! [`ActivityApi`] is the seam between the task client and the network: four
//! JSON endpoints plus the project listing. [`HttpApi`] is the real
//! implementation over reqwest; tests substitute a recording mock.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::sync::RwLock;
use tracing::debug;

use crate::session::Session;

/// Every request carries these alongside the session cookie. The server
/// rejects requests without the XHR marker as cross-site.
const HEADER_REQUESTED_WITH: &str = "XMLHttpRequest";

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("login succeeded but no session cookie was set")]
    NoSessionCookie,
}

impl ApiError {
    /// Transient errors are worth retrying: connection problems and server
    /// errors. A 4xx (bad credentials, bad payload) is not.
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::Network(_) => true,
            ApiError::Status { status, .. } => *status >= 500,
            ApiError::NoSessionCookie => false,
        }
    }
}

// ─── Wire types ──────────────────────────────────────────────────────────────

/// An activity as the server reports it. Only the fields the daemon needs.
#[derive(Debug, Clone, Deserialize)]
pub struct Activity {
    pub id: i64,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub started_at: Option<String>,
}

/// A project, for `cubelinkd projects`.
#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct Project {
    pub id: i64,
    pub name: String,
}

// ─── The API seam ────────────────────────────────────────────────────────────

#[async_trait]
pub trait ActivityApi: Send + Sync {
    /// `POST /auth/auth_tokens` — exchange credentials for a session cookie.
    async fn log_in(&self, email: &str, password: &str) -> Result<Session, ApiError>;

    /// `GET /v1/activities/working` — the activity currently running on the
    /// server, if any.
    async fn working_activity(&self) -> Result<Option<Activity>, ApiError>;

    /// `POST /v1/activities` — start a new activity.
    async fn start_activity(
        &self,
        project_id: i64,
        description: &str,
        started_at: &str,
    ) -> Result<Activity, ApiError>;

    /// `PUT /v1/activities/{id}` — stop a running activity.
    async fn stop_activity(&self, id: i64, stopped_at: &str) -> Result<(), ApiError>;

    /// `GET /v1/projects` — all projects visible to the account.
    async fn projects(&self) -> Result<Vec<Project>, ApiError>;

    /// Install a previously persisted session so requests authenticate
    /// without a fresh login.
    fn set_session(&self, session: &Session);
}

// Delegation so callers can hold the client behind an Arc and still hand it
// to the task client.
#[async_trait]
impl<T: ActivityApi + ?Sized> ActivityApi for std::sync::Arc<T> {
    async fn log_in(&self, email: &str, password: &str) -> Result<Session, ApiError> {
        (**self).log_in(email, password).await
    }

    async fn working_activity(&self) -> Result<Option<Activity>, ApiError> {
        (**self).working_activity().await
    }

    async fn start_activity(
        &self,
        project_id: i64,
        description: &str,
        started_at: &str,
    ) -> Result<Activity, ApiError> {
        (**self).start_activity(project_id, description, started_at).await
    }

    async fn stop_activity(&self, id: i64, stopped_at: &str) -> Result<(), ApiError> {
        (**self).stop_activity(id, stopped_at).await
    }

    async fn projects(&self) -> Result<Vec<Project>, ApiError> {
        (**self).projects().await
    }

    fn set_session(&self, session: &Session) {
        (**self).set_session(session)
    }
}

// ─── reqwest implementation ──────────────────────────────────────────────────

pub struct HttpApi {
    client: reqwest::Client,
    endpoint: String,
    // Cookie header value for authenticated requests. RwLock because the
    // login path replaces it while the notification path reads it.
    cookie: RwLock<Option<String>>,
}

impl HttpApi {
    /// Build a client for the given base URL (no trailing slash).
    pub fn new(endpoint: &str) -> Result<Self, ApiError> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::CONTENT_TYPE,
            reqwest::header::HeaderValue::from_static("application/json"),
        );
        headers.insert(
            "x-requested-with",
            reqwest::header::HeaderValue::from_static(HEADER_REQUESTED_WITH),
        );
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            cookie: RwLock::new(None),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.endpoint, path)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut req = self.client.request(method, self.url(path));
        if let Some(cookie) = self.cookie.read().expect("cookie lock").as_deref() {
            req = req.header(reqwest::header::COOKIE, cookie);
        }
        req
    }

    /// Map non-2xx responses to [`ApiError::Status`], keeping the body for
    /// the log.
    async fn check(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ApiError::Status {
            status: status.as_u16(),
            body: body.chars().take(200).collect(),
        })
    }
}

#[async_trait]
impl ActivityApi for HttpApi {
    async fn log_in(&self, email: &str, password: &str) -> Result<Session, ApiError> {
        let body = serde_json::json!({
            "user": { "email": email, "password": password }
        });
        let response = self
            .request(reqwest::Method::POST, "/auth/auth_tokens")
            .json(&body)
            .send()
            .await?;
        let response = Self::check(response).await?;

        let session = session_from_set_cookie(response.headers())?;
        *self.cookie.write().expect("cookie lock") = Some(session.cookie.clone());
        debug!(expires_at = ?session.expires_at, "logged in");
        Ok(session)
    }

    async fn working_activity(&self) -> Result<Option<Activity>, ApiError> {
        let response = self
            .request(reqwest::Method::GET, "/v1/activities/working")
            .send()
            .await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = Self::check(response).await?;
        // The server answers `null` when nothing is running.
        let activity: Option<Activity> = response.json().await?;
        Ok(activity)
    }

    async fn start_activity(
        &self,
        project_id: i64,
        description: &str,
        started_at: &str,
    ) -> Result<Activity, ApiError> {
        let body = serde_json::json!({
            "activity": {
                "description": description,
                "project_id": project_id,
                "started_at": started_at,
            }
        });
        let response = self
            .request(reqwest::Method::POST, "/v1/activities")
            .json(&body)
            .send()
            .await?;
        let response = Self::check(response).await?;
        Ok(response.json().await?)
    }

    async fn stop_activity(&self, id: i64, stopped_at: &str) -> Result<(), ApiError> {
        let body = serde_json::json!({
            "activity": { "id": id, "stopped_at": stopped_at }
        });
        let response = self
            .request(reqwest::Method::PUT, &format!("/v1/activities/{id}"))
            .json(&body)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn projects(&self) -> Result<Vec<Project>, ApiError> {
        let response = self.request(reqwest::Method::GET, "/v1/projects").send().await?;
        let response = Self::check(response).await?;
        Ok(response.json().await?)
    }

    fn set_session(&self, session: &Session) {
        *self.cookie.write().expect("cookie lock") = Some(session.cookie.clone());
    }
}

// ─── Set-Cookie handling ─────────────────────────────────────────────────────

/// Collect the login response's cookies into one `cookie` header value and
/// the earliest expiry any of them advertises.
fn session_from_set_cookie(headers: &reqwest::header::HeaderMap) -> Result<Session, ApiError> {
    let mut pairs: Vec<String> = Vec::new();
    let mut expires_at: Option<DateTime<Utc>> = None;

    for value in headers.get_all(reqwest::header::SET_COOKIE) {
        let Ok(raw) = value.to_str() else { continue };
        let mut attrs = raw.split(';').map(str::trim);
        let Some(pair) = attrs.next() else { continue };
        if pair.is_empty() || !pair.contains('=') {
            continue;
        }
        pairs.push(pair.to_string());

        for attr in attrs {
            let expiry = parse_cookie_expiry(attr);
            if let Some(t) = expiry {
                expires_at = Some(match expires_at {
                    Some(prev) => prev.min(t),
                    None => t,
                });
            }
        }
    }

    if pairs.is_empty() {
        return Err(ApiError::NoSessionCookie);
    }
    Ok(Session {
        cookie: pairs.join("; "),
        expires_at,
    })
}

fn parse_cookie_expiry(attr: &str) -> Option<DateTime<Utc>> {
    let (key, value) = attr.split_once('=')?;
    match key.trim().to_ascii_lowercase().as_str() {
        "max-age" => {
            let secs: i64 = value.trim().parse().ok()?;
            Some(Utc::now() + Duration::seconds(secs))
        }
        "expires" => DateTime::parse_from_rfc2822(value.trim())
            .ok()
            .map(|t| t.with_timezone(&Utc)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderMap, HeaderValue, SET_COOKIE};

    #[test]
    fn collects_cookie_pairs_and_earliest_expiry() {
        let mut headers = HeaderMap::new();
        headers.append(
            SET_COOKIE,
            HeaderValue::from_static("auth_token_id=42; Path=/; Max-Age=86400; HttpOnly"),
        );
        headers.append(
            SET_COOKIE,
            HeaderValue::from_static("auth_token_raw=secret; Path=/; Max-Age=3600"),
        );

        let session = session_from_set_cookie(&headers).unwrap();
        assert_eq!(session.cookie, "auth_token_id=42; auth_token_raw=secret");
        let expires = session.expires_at.unwrap();
        let remaining = expires - Utc::now();
        // earliest of the two: one hour, not one day
        assert!(remaining <= Duration::seconds(3600));
        assert!(remaining > Duration::seconds(3500));
    }

    #[test]
    fn parses_expires_attribute() {
        use chrono::{Datelike, Timelike};
        let t = parse_cookie_expiry("Expires=Wed, 21 Oct 2065 07:28:00 GMT").unwrap();
        assert_eq!((t.year(), t.month(), t.day()), (2065, 10, 21));
        assert_eq!((t.hour(), t.minute()), (7, 28));
    }

    #[test]
    fn missing_cookies_is_an_error() {
        let headers = HeaderMap::new();
        let err = session_from_set_cookie(&headers).unwrap_err();
        assert!(!err.is_transient());
    }

    #[test]
    fn status_classification() {
        let server_error = ApiError::Status {
            status: 503,
            body: String::new(),
        };
        assert!(server_error.is_transient());

        let rejected = ApiError::Status {
            status: 401,
            body: "bad credentials".into(),
        };
        assert!(!rejected.is_transient());
    }
}
