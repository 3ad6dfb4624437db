//! Proxy settings resolved from the environment at startup.
//!
//! The upstream base URL resolves in order: provider file →
//! `CODEX_PLUS_UPSTREAM_URL` → compiled default, and must be HTTPS with a
//! host on the provider allow-list. Anything else is a hard configuration
//! error, the only error kind that terminates the process, and only at
//! startup.

use std::path::PathBuf;

use thiserror::Error;
use url::Url;

use crate::dialect::TransformConfig;

/// Compiled default upstream: the ChatGPT Codex backend.
pub const DEFAULT_UPSTREAM_URL: &str = "https://chatgpt.com/backend-api/codex";
/// Hosts the proxy will talk to unless overridden.
pub const DEFAULT_ALLOWED_HOSTS: &[&str] = &["chatgpt.com", "api.cerebras.ai", "api.openai.com"];

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 10000;
/// Inbound request body cap (8 MiB).
pub const DEFAULT_MAX_BODY_BYTES: usize = 8 * 1024 * 1024;

pub const ENV_UPSTREAM_URL: &str = "CODEX_PLUS_UPSTREAM_URL";
pub const ENV_PROVIDER_BASE_URL_FILE: &str = "CODEXPLUS_PROVIDER_BASE_URL_FILE";
pub const ENV_PROVIDER_MODE: &str = "CODEX_PLUS_PROVIDER_MODE";
pub const ENV_ALLOWED_HOSTS: &str = "CODEX_PLUS_ALLOWED_HOSTS";
pub const ENV_HOST: &str = "CODEX_PLUS_HOST";
pub const ENV_PORT: &str = "CODEX_PLUS_PORT";
pub const ENV_MAX_BODY_BYTES: &str = "CODEX_PLUS_MAX_BODY_BYTES";
pub const ENV_COLORIZE: &str = "CODEX_PLUS_COLORIZE";

/// Fatal startup configuration failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid upstream url {url}: {reason}")]
    InvalidUpstreamUrl { url: String, reason: String },
    #[error("upstream url must be https: {0}")]
    NotHttps(String),
    #[error("upstream host {0} is not on the provider allow-list")]
    DisallowedHost(String),
    #[error("read provider base url file {path}: {source}")]
    ProviderFile {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Provider dialect tag; selects the transformer and logger behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProviderMode {
    #[default]
    Openai,
    Cerebras,
}

impl ProviderMode {
    pub fn from_env() -> Self {
        match std::env::var(ENV_PROVIDER_MODE) {
            Ok(v) if v.eq_ignore_ascii_case("cerebras") => Self::Cerebras,
            _ => Self::Openai,
        }
    }
}

/// Resolved proxy configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub max_body_bytes: usize,
    pub provider_mode: ProviderMode,
    pub upstream_url: Url,
    pub colorize: bool,
    /// Present when the upstream dialect differs from the inbound one.
    pub transform: Option<TransformConfig>,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        let provider_mode = ProviderMode::from_env();
        let allowed = allowed_hosts_from_env();
        let upstream_url = resolve_upstream_url(&allowed)?;
        Ok(Self {
            host: std::env::var(ENV_HOST).unwrap_or_else(|_| DEFAULT_HOST.to_string()),
            port: env_parse(ENV_PORT).unwrap_or(DEFAULT_PORT),
            max_body_bytes: env_parse(ENV_MAX_BODY_BYTES).unwrap_or(DEFAULT_MAX_BODY_BYTES),
            provider_mode,
            upstream_url,
            colorize: env_flag(ENV_COLORIZE).unwrap_or(true),
            transform: (provider_mode == ProviderMode::Cerebras)
                .then(TransformConfig::default),
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok()?.trim().parse().ok()
}

fn env_flag(key: &str) -> Option<bool> {
    match std::env::var(key).ok()?.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Allow-list override: comma-separated hosts in `CODEX_PLUS_ALLOWED_HOSTS`.
pub fn allowed_hosts_from_env() -> Vec<String> {
    match std::env::var(ENV_ALLOWED_HOSTS) {
        Ok(v) if !v.trim().is_empty() => v
            .split(',')
            .map(|h| h.trim().to_string())
            .filter(|h| !h.is_empty())
            .collect(),
        _ => DEFAULT_ALLOWED_HOSTS.iter().map(|h| h.to_string()).collect(),
    }
}

/// Resolves the upstream base URL: provider file, then env override, then
/// the compiled default; validates scheme and host.
pub fn resolve_upstream_url(allowed_hosts: &[String]) -> Result<Url, ConfigError> {
    let raw = match std::env::var(ENV_PROVIDER_BASE_URL_FILE) {
        Ok(path) if !path.trim().is_empty() => {
            let path = PathBuf::from(path.trim());
            std::fs::read_to_string(&path)
                .map(|s| s.trim().to_string())
                .map_err(|source| ConfigError::ProviderFile { path, source })?
        }
        _ => std::env::var(ENV_UPSTREAM_URL)
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_UPSTREAM_URL.to_string()),
    };
    validate_upstream_url(&raw, allowed_hosts)
}

/// HTTPS-only, host must match the allow-list exactly.
pub fn validate_upstream_url(raw: &str, allowed_hosts: &[String]) -> Result<Url, ConfigError> {
    let url = Url::parse(raw).map_err(|e| ConfigError::InvalidUpstreamUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;
    if url.scheme() != "https" {
        return Err(ConfigError::NotHttps(raw.to_string()));
    }
    let host = url
        .host_str()
        .ok_or_else(|| ConfigError::InvalidUpstreamUrl {
            url: raw.to_string(),
            reason: "missing host".to_string(),
        })?;
    if !allowed_hosts.iter().any(|h| h == host) {
        return Err(ConfigError::DisallowedHost(host.to_string()));
    }
    Ok(url)
}
