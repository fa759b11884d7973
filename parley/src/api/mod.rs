//! Remote data access against the hosted platform.
//!
//! Every function issues one or more HTTP requests and hands back a plain
//! record or a [`ClientError`]. Nothing here retries, batches or paginates.

pub mod auth;
mod chats;
mod labels;
mod messages;
mod query;
mod storage;
mod users;

use std::sync::Arc;

use parking_lot::RwLock;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::Deserialize;
use tracing::debug;

pub use query::Query;

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};

/// Handle to the platform's REST, auth and storage endpoints
#[derive(Clone)]
pub struct Platform {
    config: Arc<ClientConfig>,
    http: reqwest::Client,
    access_token: Arc<RwLock<Option<String>>>,
}

impl Platform {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config: Arc::new(config),
            http: reqwest::Client::new(),
            access_token: Arc::new(RwLock::new(None)),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Token used for subsequent requests; `None` falls back to the anon key
    pub fn set_access_token(&self, token: Option<String>) {
        debug!(signed_in = token.is_some(), "Updating platform access token");
        *self.access_token.write() = token;
    }

    pub fn access_token(&self) -> Option<String> {
        self.access_token.read().clone()
    }

    /// Start a query against a table
    pub fn from(&self, table: &'static str) -> Query<'_> {
        Query::new(self, table)
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub(crate) fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let bearer = self
            .access_token()
            .unwrap_or_else(|| self.config.anon_key.clone());
        if let Ok(value) = HeaderValue::from_str(&self.config.anon_key) {
            headers.insert("apikey", value);
        }
        if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", bearer)) {
            headers.insert(AUTHORIZATION, value);
        }
        headers
    }

    /// Headers authorizing as a specific session rather than the stored one
    pub(crate) fn headers_with_token(&self, access_token: &str) -> HeaderMap {
        let mut headers = self.headers();
        if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", access_token)) {
            headers.insert(AUTHORIZATION, value);
        }
        headers
    }
}

/// Error body shapes returned by the platform's services
#[derive(Debug, Default, Deserialize)]
struct PlatformErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    msg: Option<String>,
}

impl PlatformErrorBody {
    fn text(&self) -> Option<String> {
        self.error_description
            .clone()
            .or_else(|| self.message.clone())
            .or_else(|| self.msg.clone())
            .or_else(|| self.error.clone())
    }

    fn code(&self) -> Option<String> {
        self.code.as_ref().map(|c| match c {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }
}

/// Turn a non-success response into a `Remote` error carrying the platform message
pub(crate) async fn error_for_status(response: reqwest::Response) -> ClientResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let (message, _) = read_error(response).await;
    Err(ClientError::remote(status.as_u16(), message))
}

/// Status text plus the platform's error code, if any
pub(crate) async fn read_error(response: reqwest::Response) -> (String, Option<String>) {
    let status = response.status();
    let raw = response.text().await.unwrap_or_default();
    let body: PlatformErrorBody = serde_json::from_str(&raw).unwrap_or_default();
    let message = body.text().unwrap_or_else(|| {
        if raw.trim().is_empty() {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        } else {
            raw.clone()
        }
    });
    (message, body.code())
}
