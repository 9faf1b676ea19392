use std::env;
use std::time::Duration;

use anyhow::{bail, Context, Result};

pub const DEFAULT_GENERATION_BASE: &str = "https://gen.pollinations.ai";
pub const DEFAULT_UPLOAD_ENDPOINT: &str = "https://tmpfiles.org/api/v1/upload";
pub const DEFAULT_MODELS: [&str; 3] = ["nanobanana-pro", "nanobanana", "gptimage"];
pub const DEFAULT_WIDTH: u32 = 1024;
pub const DEFAULT_HEIGHT: u32 = 768;

/// Per-request limit for upload and generation calls.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(180);

const MIN_TIMEOUT_S: f64 = 5.0;
const MAX_TIMEOUT_S: f64 = 600.0;

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub generation_base: String,
    pub upload_endpoint: String,
    /// Fallback chain, primary model first.
    pub models: Vec<String>,
    pub width: u32,
    pub height: u32,
    /// Applied to every HTTP call; replaces the client's built-in limit.
    pub request_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            generation_base: DEFAULT_GENERATION_BASE.to_string(),
            upload_endpoint: DEFAULT_UPLOAD_ENDPOINT.to_string(),
            models: DEFAULT_MODELS.iter().map(|m| m.to_string()).collect(),
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Some(base) = non_empty_env("REDEVELOP_GENERATION_BASE") {
            config.generation_base = normalize_base(&base);
        }
        if let Some(endpoint) = non_empty_env("REDEVELOP_UPLOAD_ENDPOINT") {
            config.upload_endpoint = endpoint;
        }
        if let Some(raw) = non_empty_env("REDEVELOP_MODELS") {
            config.models = parse_model_list(&raw)?;
        }
        if let Some(raw) = non_empty_env("REDEVELOP_REQUEST_TIMEOUT") {
            config.request_timeout = parse_timeout(&raw)?;
        }
        Ok(config)
    }

    pub fn with_generation_base(mut self, base: impl AsRef<str>) -> Self {
        self.generation_base = normalize_base(base.as_ref());
        self
    }

    pub fn with_upload_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.upload_endpoint = endpoint.into();
        self
    }

    pub fn with_models(mut self, models: Vec<String>) -> Self {
        self.models = models;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// `host[:port]` of the upload endpoint, the marker rewritten into download URLs.
    pub fn upload_host(&self) -> Result<String> {
        let url = reqwest::Url::parse(&self.upload_endpoint)
            .with_context(|| format!("invalid upload endpoint ({})", self.upload_endpoint))?;
        let Some(host) = url.host_str() else {
            bail!("upload endpoint has no host ({})", self.upload_endpoint);
        };
        Ok(match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        })
    }
}

pub(crate) fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn normalize_base(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_string()
}

fn parse_model_list(raw: &str) -> Result<Vec<String>> {
    let models: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .collect();
    if models.is_empty() {
        bail!("model list is empty ({raw:?})");
    }
    Ok(models)
}

fn parse_timeout(raw: &str) -> Result<Duration> {
    let seconds: f64 = raw
        .trim()
        .parse()
        .with_context(|| format!("invalid request timeout ({raw})"))?;
    if !seconds.is_finite() {
        bail!("invalid request timeout ({raw})");
    }
    Ok(Duration::from_secs_f64(
        seconds.clamp(MIN_TIMEOUT_S, MAX_TIMEOUT_S),
    ))
}
