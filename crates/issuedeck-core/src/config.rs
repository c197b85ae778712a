//! Centralized configuration for issuedeck.
//!
//! [`TrackerConfig`] carries what the request pipeline needs to reach the
//! remote service. Loading it from a file or editor settings is left to the
//! collaborator that embeds this crate.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Application-level constants.
pub struct AppConfig;

impl AppConfig {
    pub const APP_NAME: &'static str = "issuedeck";
    pub const CACHE_FILE_NAME: &'static str = "cache.json";
}

/// Network-related constants.
pub struct NetworkConfig;

impl NetworkConfig {
    pub const DEFAULT_PROGRAM: &'static str = "curl";
    pub const JSON_CONTENT_TYPE: &'static str = "application/json";
    /// Auth discriminant selecting bearer-token auth (matched case-insensitively).
    pub const BEARER_AUTH_TYPE: &'static str = "pat";
    pub const DEFAULT_AUTH_TYPE: &'static str = "basic";
    pub const SEARCH_PAGE_SIZE: u32 = 100;
}

/// Remote API version, selecting the endpoint/payload adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ApiVersion {
    #[serde(rename = "2")]
    V2,
    #[default]
    #[serde(rename = "3")]
    V3,
}

impl std::str::FromStr for ApiVersion {
    type Err = crate::IssuedeckError;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.trim() {
            "2" | "v2" => Ok(ApiVersion::V2),
            "3" | "v3" => Ok(ApiVersion::V3),
            other => Err(crate::IssuedeckError::config(format!(
                "Unsupported API version: {}",
                other
            ))),
        }
    }
}

/// Connection settings for the remote tracker.
#[derive(Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Base address, e.g. `https://example.atlassian.net`.
    pub base_url: String,
    /// Account email, required for basic auth.
    #[serde(default)]
    pub email: Option<String>,
    /// API token or personal access token.
    pub token: String,
    /// `"pat"` selects bearer auth; anything else uses basic auth.
    #[serde(default = "default_auth_type")]
    pub auth_type: String,
    #[serde(default)]
    pub api_version: ApiVersion,
    /// Kill the external process after this many milliseconds. `None` or zero
    /// waits forever.
    #[serde(default)]
    pub request_timeout_ms: Option<u64>,
    #[serde(default = "default_program")]
    pub curl_program: PathBuf,
    /// Extra arguments placed before the generated ones (proxy, CA bundle, ...).
    #[serde(default)]
    pub extra_args: Vec<String>,
}

fn default_auth_type() -> String {
    NetworkConfig::DEFAULT_AUTH_TYPE.to_string()
}

fn default_program() -> PathBuf {
    PathBuf::from(NetworkConfig::DEFAULT_PROGRAM)
}

impl TrackerConfig {
    /// Create a config with basic auth defaults.
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            email: None,
            token: token.into(),
            auth_type: default_auth_type(),
            api_version: ApiVersion::default(),
            request_timeout_ms: None,
            curl_program: default_program(),
            extra_args: Vec::new(),
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_auth_type(mut self, auth_type: impl Into<String>) -> Self {
        self.auth_type = auth_type.into();
        self
    }

    pub fn with_api_version(mut self, version: ApiVersion) -> Self {
        self.api_version = version;
        self
    }

    /// Set the per-request timeout. A zero duration disables it.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        let millis = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self.request_timeout_ms = (millis > 0).then_some(millis);
        self
    }

    pub fn with_curl_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.curl_program = program.into();
        self
    }

    pub fn with_extra_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Whether the configured discriminant selects bearer-token auth.
    pub fn uses_bearer_auth(&self) -> bool {
        self.auth_type.eq_ignore_ascii_case(NetworkConfig::BEARER_AUTH_TYPE)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms
            .filter(|millis| *millis > 0)
            .map(Duration::from_millis)
    }
}

impl std::fmt::Debug for TrackerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackerConfig")
            .field("base_url", &self.base_url)
            .field("email", &self.email)
            .field("token", &"<redacted>")
            .field("auth_type", &self.auth_type)
            .field("api_version", &self.api_version)
            .field("request_timeout_ms", &self.request_timeout_ms)
            .field("curl_program", &self.curl_program)
            .field("extra_args", &self.extra_args)
            .finish()
    }
}

/// Tuning for the prefix enumeration loop.
#[derive(Debug, Clone)]
pub struct EnumerationConfig {
    /// Page size requested per prefix; a page this full triggers expansion.
    pub page_size: usize,
    /// Longest prefix that may still spawn children is `max_depth - 1`.
    pub max_depth: usize,
    /// Minimum wait between consecutive requests.
    pub throttle: Duration,
    /// Characters appended to a prefix when it is refined.
    pub alphabet: Vec<char>,
}

impl EnumerationConfig {
    pub const DEFAULT_PAGE_SIZE: usize = 100;
    pub const DEFAULT_MAX_DEPTH: usize = 3;
    pub const DEFAULT_THROTTLE: Duration = Duration::from_millis(100);
    pub const DEFAULT_ALPHABET: &'static str = "abcdefghijklmnopqrstuvwxyz0123456789";

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_throttle(mut self, throttle: Duration) -> Self {
        self.throttle = throttle;
        self
    }
}

impl Default for EnumerationConfig {
    fn default() -> Self {
        Self {
            page_size: Self::DEFAULT_PAGE_SIZE,
            max_depth: Self::DEFAULT_MAX_DEPTH,
            throttle: Self::DEFAULT_THROTTLE,
            alphabet: Self::DEFAULT_ALPHABET.chars().collect(),
        }
    }
}
