//! Client configuration, read from the environment.

use std::path::PathBuf;
use std::time::Duration;

use tracing::info;
use url::Url;

use crate::error::{ClientError, ClientResult};

pub const DEFAULT_STORAGE_BUCKET: &str = "chat-files";
pub const DEFAULT_HEARTBEAT_SECS: u64 = 30;
pub const DEFAULT_RECONNECT_SECS: u64 = 3;

/// Connection settings for the hosted platform
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: Url,
    pub anon_key: String,
    pub storage_bucket: String,
    pub session_file: PathBuf,
    pub heartbeat_interval: Duration,
    pub reconnect_delay: Duration,
    pub log_dir: Option<PathBuf>,
}

impl ClientConfig {
    pub fn new(base_url: &str, anon_key: impl Into<String>) -> ClientResult<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| ClientError::configuration(format!("Invalid platform URL: {}", e)))?;

        Ok(Self {
            base_url,
            anon_key: anon_key.into(),
            storage_bucket: DEFAULT_STORAGE_BUCKET.to_string(),
            session_file: default_session_file(),
            heartbeat_interval: Duration::from_secs(DEFAULT_HEARTBEAT_SECS),
            reconnect_delay: Duration::from_secs(DEFAULT_RECONNECT_SECS),
            log_dir: None,
        })
    }

    /// Load `.env` (if any) and read the process environment
    pub fn from_env() -> ClientResult<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> ClientResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Priority: build-time env -> runtime env
        let build_time_url = option_env!("PARLEY_URL");
        let runtime_url = lookup("PARLEY_URL");

        info!(
            build_time = ?build_time_url,
            runtime = ?runtime_url,
            "Platform URL sources"
        );

        let url = build_time_url
            .map(String::from)
            .or(runtime_url)
            .ok_or_else(|| ClientError::configuration("PARLEY_URL is not set"))?;
        let anon_key = lookup("PARLEY_ANON_KEY")
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ClientError::configuration("PARLEY_ANON_KEY is not set"))?;

        let mut config = Self::new(&url, anon_key)?;

        if let Some(bucket) = lookup("PARLEY_STORAGE_BUCKET") {
            config.storage_bucket = bucket;
        }
        if let Some(path) = lookup("PARLEY_SESSION_FILE") {
            config.session_file = PathBuf::from(path);
        }
        if let Some(secs) = lookup("PARLEY_HEARTBEAT_SECS") {
            config.heartbeat_interval = Duration::from_secs(parse_secs("PARLEY_HEARTBEAT_SECS", &secs)?);
        }
        if let Some(secs) = lookup("PARLEY_RECONNECT_SECS") {
            config.reconnect_delay = Duration::from_secs(parse_secs("PARLEY_RECONNECT_SECS", &secs)?);
        }
        config.log_dir = lookup("PARLEY_LOG_DIR").map(PathBuf::from);

        info!(url = %config.base_url, bucket = %config.storage_bucket, "Using platform");
        Ok(config)
    }

    /// `/rest/v1/{table}`
    pub fn rest_url(&self, table: &str) -> String {
        self.join(&format!("rest/v1/{}", table))
    }

    /// `/auth/v1/{path}`
    pub fn auth_url(&self, path: &str) -> String {
        self.join(&format!("auth/v1/{}", path))
    }

    /// Upload target for an object in the configured bucket
    pub fn storage_object_url(&self, path: &str) -> String {
        self.join(&format!(
            "storage/v1/object/{}/{}",
            self.storage_bucket, path
        ))
    }

    /// Publicly readable URL of an object in the configured bucket
    pub fn public_object_url(&self, path: &str) -> String {
        self.join(&format!(
            "storage/v1/object/public/{}/{}",
            self.storage_bucket, path
        ))
    }

    /// Websocket endpoint of the realtime service
    pub fn realtime_url(&self) -> String {
        let base = self.join("realtime/v1/websocket");
        let ws = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            base
        };
        format!("{}?apikey={}&vsn=1.0.0", ws, self.anon_key)
    }

    fn join(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.as_str().trim_end_matches('/'), path)
    }
}

/// A positive whole number of seconds
fn parse_secs(key: &str, value: &str) -> ClientResult<u64> {
    match value.trim().parse::<u64>() {
        Ok(0) => Err(ClientError::configuration(format!("{} must be greater than zero", key))),
        Ok(secs) => Ok(secs),
        Err(_) => Err(ClientError::configuration(format!("{} must be a number of seconds", key))),
    }
}

fn default_session_file() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("parley")
        .join("session.json")
}
