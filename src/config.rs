//! Crawl configuration: defaults, JSON file and environment loading, and
//! validation. Every knob defaults to a conservative value so an
//! unconfigured run stays polite.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::url_utils;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Invalid JSON in config file: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Error reading config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration errors: {0}")]
    Validation(String),
}

/// Settings consumed by the crawl engine. Field names double as the JSON
/// config file schema and (uppercased, `SPIDER_` prefixed) the environment
/// variable names.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpiderConfig {
    // Target
    pub start_url: String,
    pub max_depth: u32,
    pub max_pages: usize,

    // HTTP
    pub user_agent: String,
    pub timeout_connect_secs: f64,
    pub timeout_read_secs: f64,
    pub max_retries: u32,

    // Rate limiting
    pub delay_min_secs: f64,
    pub delay_max_secs: f64,
    pub requests_per_second: f64,
    pub burst_capacity: u32,

    // Safety toggles
    pub respect_robots_txt: bool,
    pub avoid_auth_pages: bool,
    pub avoid_forms: bool,

    // URL filtering
    pub excluded_extensions: Vec<String>,
    pub excluded_paths: Vec<String>,

    // Output
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_file: Option<String>,
    pub log_level: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file: Option<String>,
}

impl Default for SpiderConfig {
    fn default() -> Self {
        Self {
            start_url: String::new(),
            max_depth: 2,
            max_pages: 100,
            user_agent: "WebWarden/1.0 (+https://github.com/webwarden/info)".to_string(),
            timeout_connect_secs: 5.0,
            timeout_read_secs: 30.0,
            max_retries: 3,
            delay_min_secs: 1.0,
            delay_max_secs: 2.0,
            requests_per_second: 1.0,
            burst_capacity: 5,
            respect_robots_txt: true,
            avoid_auth_pages: true,
            avoid_forms: true,
            excluded_extensions: default_excluded_extensions(),
            excluded_paths: default_excluded_paths(),
            output_file: None,
            log_level: "info".to_string(),
            log_file: None,
        }
    }
}

fn default_excluded_extensions() -> Vec<String> {
    [
        ".pdf", ".zip", ".rar", ".tar", ".gz", ".exe", ".dmg", ".iso", ".jpg", ".jpeg", ".png",
        ".gif", ".bmp", ".svg", ".ico", ".mp3", ".mp4", ".avi", ".mov", ".wmv", ".flv", ".doc",
        ".docx", ".xls", ".xlsx", ".ppt", ".pptx",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_excluded_paths() -> Vec<String> {
    [
        "/admin/",
        "/administrator/",
        "/webadmin/",
        "/siteadmin/",
        "/cpanel/",
        "/phpmyadmin/",
        "/wp-admin/",
        "/login/",
        "/auth/",
        "/authentication/",
        "/signin/",
        "/signup/",
        "/register/",
        "/account/",
        "/user/",
        "/member/",
        "/logout/",
        "/logoff/",
        "/delete/",
        "/remove/",
        "/api/",
        "/webhook/",
        "/callback/",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl SpiderConfig {
    /// Load from a JSON file. Unknown keys are ignored, missing keys take
    /// their defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }
        let raw = std::fs::read_to_string(path)?;
        let config: SpiderConfig = serde_json::from_str(&raw)?;
        Ok(config)
    }

    /// Build from `SPIDER_*` environment variables, falling back to defaults
    /// for anything unset. Malformed numeric values fall back silently; the
    /// later `validate` pass catches out-of-range results.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            start_url: env_str("SPIDER_START_URL").unwrap_or(defaults.start_url),
            max_depth: env_parse("SPIDER_MAX_DEPTH").unwrap_or(defaults.max_depth),
            max_pages: env_parse("SPIDER_MAX_PAGES").unwrap_or(defaults.max_pages),
            user_agent: env_str("SPIDER_USER_AGENT").unwrap_or(defaults.user_agent),
            timeout_connect_secs: env_parse("SPIDER_TIMEOUT_CONNECT")
                .unwrap_or(defaults.timeout_connect_secs),
            timeout_read_secs: env_parse("SPIDER_TIMEOUT_READ")
                .unwrap_or(defaults.timeout_read_secs),
            max_retries: env_parse("SPIDER_MAX_RETRIES").unwrap_or(defaults.max_retries),
            delay_min_secs: env_parse("SPIDER_DELAY_MIN").unwrap_or(defaults.delay_min_secs),
            delay_max_secs: env_parse("SPIDER_DELAY_MAX").unwrap_or(defaults.delay_max_secs),
            requests_per_second: env_parse("SPIDER_REQUESTS_PER_SECOND")
                .unwrap_or(defaults.requests_per_second),
            burst_capacity: env_parse("SPIDER_BURST_CAPACITY").unwrap_or(defaults.burst_capacity),
            respect_robots_txt: env_bool("SPIDER_RESPECT_ROBOTS")
                .unwrap_or(defaults.respect_robots_txt),
            avoid_auth_pages: env_bool("SPIDER_AVOID_AUTH").unwrap_or(defaults.avoid_auth_pages),
            avoid_forms: env_bool("SPIDER_AVOID_FORMS").unwrap_or(defaults.avoid_forms),
            excluded_extensions: defaults.excluded_extensions,
            excluded_paths: defaults.excluded_paths,
            output_file: env_str("SPIDER_OUTPUT_FILE"),
            log_level: env_str("SPIDER_LOG_LEVEL").unwrap_or(defaults.log_level),
            log_file: env_str("SPIDER_LOG_FILE"),
        }
    }

    /// Load with fallback priority: explicit config file, then environment,
    /// then defaults. Always validated before return.
    pub fn load(config_file: Option<&str>) -> Result<Self, ConfigError> {
        let config = match config_file {
            Some(path) if Path::new(path).exists() => Self::from_file(path)?,
            _ => Self::from_env(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate every setting, collecting all problems into one error so
    /// the operator sees the full list at once.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        if self.start_url.is_empty() {
            errors.push("start_url is required".to_string());
        } else if !url_utils::is_valid_url(&self.start_url) {
            errors.push(format!("start_url is not a valid URL: {}", self.start_url));
        }

        if self.max_depth > 10 {
            errors.push("max_depth > 10 is not recommended (too deep)".to_string());
        }
        if self.max_pages < 1 {
            errors.push("max_pages must be >= 1".to_string());
        }
        if self.max_pages > 10_000 {
            errors.push("max_pages > 10000 may cause performance issues".to_string());
        }

        if self.timeout_connect_secs <= 0.0 {
            errors.push("timeout_connect_secs must be > 0".to_string());
        }
        if self.timeout_read_secs <= 0.0 {
            errors.push("timeout_read_secs must be > 0".to_string());
        }
        if self.timeout_connect_secs > 60.0 {
            errors.push("timeout_connect_secs > 60 is not recommended".to_string());
        }

        if self.requests_per_second <= 0.0 {
            errors.push("requests_per_second must be > 0".to_string());
        }
        if self.requests_per_second > 10.0 {
            errors.push("requests_per_second > 10 may overwhelm servers".to_string());
        }
        if self.burst_capacity == 0 {
            errors.push("burst_capacity must be >= 1".to_string());
        }

        if self.delay_min_secs < 0.0 {
            errors.push("delay_min_secs must be >= 0".to_string());
        }
        if self.delay_max_secs < self.delay_min_secs {
            errors.push("delay_max_secs must be >= delay_min_secs".to_string());
        }

        if !errors.is_empty() {
            return Err(ConfigError::Validation(errors.join("; ")));
        }

        if !self.respect_robots_txt {
            tracing::warn!("respect_robots_txt=false may violate website policies");
        }
        if !self.avoid_auth_pages {
            tracing::warn!("avoid_auth_pages=false may attempt to access protected areas");
        }
        if self.requests_per_second > 5.0 {
            tracing::warn!(
                rps = self.requests_per_second,
                "requests_per_second is aggressive"
            );
        }

        Ok(())
    }

    /// Domain of the start URL, used as the crawl scope boundary.
    pub fn start_domain(&self) -> Option<String> {
        url_utils::extract_domain(&self.start_url)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

fn env_str(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    env_str(name).and_then(|v| v.parse().ok())
}

fn env_bool(name: &str) -> Option<bool> {
    env_str(name).map(|v| v.to_ascii_lowercase() == "true")
}
