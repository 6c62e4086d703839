//! ChatRelay configuration loader.
//!
//! TOML file plus environment overrides; a missing config file falls back to
//! defaults so env-only deployments work.

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Dummy reply token the platform sends when verifying the webhook endpoint.
const VERIFY_REPLY_TOKEN: &str = "00000000000000000000000000000000";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RelayConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub line: LineConfig,
    #[serde(default)]
    pub gemini: GeminiConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_http_timeout_seconds")]
    pub http_timeout_seconds: u64,
    #[serde(default = "default_http_max_in_flight")]
    pub http_max_in_flight: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LineConfig {
    /// Bearer token for the messaging backend's bot API.
    #[serde(default)]
    pub channel_access_token: String,
    /// Reply token that marks platform connectivity checks.
    #[serde(default = "default_test_reply_token")]
    pub test_reply_token: String,
    /// Override for tests and API proxies.
    #[serde(default)]
    pub api_base_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeminiConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_gemini_model")]
    pub model: String,
    #[serde(default)]
    pub api_base_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    /// Bounded queue size; a full queue rejects new envelopes.
    #[serde(default = "default_queue_capacity")]
    pub capacity: usize,
    #[serde(default = "default_queue_workers")]
    pub workers: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: String,
}

fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_http_timeout_seconds() -> u64 {
    15
}

fn default_http_max_in_flight() -> usize {
    256
}

fn default_test_reply_token() -> String {
    VERIFY_REPLY_TOKEN.to_string()
}

fn default_gemini_model() -> String {
    "gemini-1.5-flash".to_string()
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_queue_workers() -> usize {
    2
}

fn default_store_path() -> String {
    "chatrelay.db".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            http_timeout_seconds: default_http_timeout_seconds(),
            http_max_in_flight: default_http_max_in_flight(),
        }
    }
}

impl Default for LineConfig {
    fn default() -> Self {
        Self {
            channel_access_token: String::new(),
            test_reply_token: default_test_reply_token(),
            api_base_url: None,
        }
    }
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: default_gemini_model(),
            api_base_url: None,
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: default_queue_capacity(),
            workers: default_queue_workers(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

impl RelayConfig {
    pub async fn load(path: Option<PathBuf>) -> anyhow::Result<Self> {
        let path = path.unwrap_or_else(default_config_path);
        let mut cfg = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => toml::from_str::<RelayConfig>(&contents)
                .map_err(|e| anyhow::anyhow!("parse config {}: {e}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "config file not found; using defaults");
                RelayConfig::default()
            }
            Err(e) => {
                return Err(anyhow::anyhow!("read config {}: {e}", path.display()));
            }
        };

        cfg.apply_env_overrides();
        cfg.validate()?;
        Ok(cfg)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("LINE_CHANNEL_ACCESS_TOKEN") {
            if !v.trim().is_empty() {
                self.line.channel_access_token = v;
            }
        }
        if let Ok(v) = std::env::var("LINE_TEST_REPLY_TOKEN") {
            if !v.trim().is_empty() {
                self.line.test_reply_token = v;
            }
        }
        if let Ok(v) = std::env::var("GEMINI_API_KEY") {
            if !v.trim().is_empty() {
                self.gemini.api_key = v;
            }
        }
        if let Ok(v) = std::env::var("CHATRELAY_BIND_ADDR") {
            if !v.trim().is_empty() {
                self.server.bind_addr = v;
            }
        }
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.line.channel_access_token.trim().is_empty() {
            return Err(anyhow::anyhow!(
                "line.channel_access_token is required (or LINE_CHANNEL_ACCESS_TOKEN)"
            ));
        }
        if self.gemini.api_key.trim().is_empty() {
            return Err(anyhow::anyhow!(
                "gemini.api_key is required (or GEMINI_API_KEY)"
            ));
        }
        if self.gemini.model.trim().is_empty() {
            return Err(anyhow::anyhow!("gemini.model must not be empty"));
        }
        if self.queue.capacity == 0 {
            return Err(anyhow::anyhow!("queue.capacity must be > 0"));
        }
        if self.queue.workers == 0 {
            return Err(anyhow::anyhow!("queue.workers must be > 0"));
        }
        self.bind_addr()?;
        Ok(())
    }

    pub fn bind_addr(&self) -> anyhow::Result<SocketAddr> {
        self.server
            .bind_addr
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid server.bind_addr {:?}: {e}", self.server.bind_addr))
    }
}

pub fn default_config_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    Path::new(&home).join(".chatrelay").join("config.toml")
}
