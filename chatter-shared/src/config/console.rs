use serde::{Deserialize, Serialize};
use std::{env, fs, path::PathBuf, str::FromStr};
use thiserror::Error;
use url::Url;

/// Default page size for timeline fetches.
pub const DEFAULT_PAGE_SIZE: usize = 25;

/// Default distance from the bottom edge, in pixels, that still counts as "at the bottom".
pub const DEFAULT_NEAR_BOTTOM_THRESHOLD_PX: f64 = 100.0;

/// Default distance from the top edge, in pixels, that triggers loading older messages.
pub const DEFAULT_LOAD_OLDER_THRESHOLD_PX: f64 = 100.0;

/// Output format for log lines.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::InvalidEnv {
                var: "CHATTER_LOG_FORMAT",
                value: other.to_string(),
            }),
        }
    }
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid YAML configuration: {0}")]
    Yaml(#[from] serde_yml::Error),
    #[error("invalid JSON configuration: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Unsupported configuration format. Use 'yaml' or 'json'.")]
    UnsupportedFormat,
    #[error("Invalid {var} value: {value}")]
    InvalidEnv { var: &'static str, value: String },
    #[error("invalid configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

/// Command-line values that take precedence over file and environment.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub api_base_url: Option<String>,
    pub push_base_url: Option<String>,
    pub api_token: Option<String>,
    pub page_size: Option<usize>,
    pub log_level: Option<String>,
}

/// Runtime configuration for the chatter console.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Base URL of the pull API, e.g. `http://127.0.0.1:8000/api/`
    pub api_base_url: String,

    /// Base URL of the push relay serving `channels/conversation.{id}`
    pub push_base_url: String,

    /// Bearer token attached to API and push requests
    pub api_token: Option<String>,

    /// Messages requested per page
    pub page_size: usize,

    /// Viewport distance from the bottom that still counts as reading the tail
    pub near_bottom_threshold_px: f64,

    /// Viewport distance from the top that triggers loading an older page
    pub load_older_threshold_px: f64,

    /// Logging level
    pub log_level: String,

    /// Logging output format
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl Config {
    /// Generates a default configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self {
            api_base_url: "http://127.0.0.1:8000/api/".to_string(),
            push_base_url: "http://127.0.0.1:6001/".to_string(),
            api_token: None,
            page_size: DEFAULT_PAGE_SIZE,
            near_bottom_threshold_px: DEFAULT_NEAR_BOTTOM_THRESHOLD_PX,
            load_older_threshold_px: DEFAULT_LOAD_OLDER_THRESHOLD_PX,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
        }
    }

    /// Loads the configuration from a file, environment variables, or defaults.
    ///
    /// File values win over environment variables; environment variables only
    /// fill values the file left at their defaults. Command-line overrides win
    /// over both.
    ///
    /// # Errors
    /// Returns an error when the file cannot be read or parsed, an environment
    /// variable is malformed, or the resolved values fail [`Config::validate`].
    pub fn load_config(
        config_path: Option<PathBuf>,
        overrides: ConfigOverrides,
    ) -> Result<Self, ConfigError> {
        let defaults = Self::with_defaults();
        let mut config = match config_path {
            Some(path) => Self::from_file(path)?,
            None => defaults.clone(),
        };

        if config.api_base_url == defaults.api_base_url
            && let Some(value) = env_value("CHATTER_API_BASE_URL")
        {
            config.api_base_url = normalize_base(&value);
        }
        if config.push_base_url == defaults.push_base_url
            && let Some(value) = env_value("CHATTER_PUSH_BASE_URL")
        {
            config.push_base_url = normalize_base(&value);
        }
        if config.api_token.is_none() {
            config.api_token = env_value("CHATTER_API_TOKEN");
        }
        if config.page_size == defaults.page_size
            && let Some(value) = env_value("CHATTER_PAGE_SIZE")
        {
            config.page_size = value.parse().map_err(|_| ConfigError::InvalidEnv {
                var: "CHATTER_PAGE_SIZE",
                value,
            })?;
        }
        if config.log_level == defaults.log_level
            && let Some(value) = env_value("CHATTER_LOG_LEVEL")
        {
            config.log_level = value;
        }
        if config.log_format == defaults.log_format
            && let Some(value) = env_value("CHATTER_LOG_FORMAT")
        {
            config.log_format = value.parse()?;
        }

        if let Some(url) = overrides.api_base_url {
            config.api_base_url = normalize_base(&url);
        }
        if let Some(url) = overrides.push_base_url {
            config.push_base_url = normalize_base(&url);
        }
        if let Some(token) = overrides.api_token {
            config.api_token = Some(token);
        }
        if let Some(page_size) = overrides.page_size {
            config.page_size = page_size;
        }
        if let Some(level) = overrides.log_level {
            config.log_level = level;
        }

        config.validate().map_err(ConfigError::Invalid)?;
        Ok(config)
    }

    fn from_file(path: PathBuf) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml" | "yml") => Ok(serde_yml::from_str(&content)?),
            Some("json") => Ok(serde_json::from_str(&content)?),
            _ => Err(ConfigError::UnsupportedFormat),
        }
    }

    /// Validate resolved values.
    ///
    /// # Errors
    /// Returns every problem found, not just the first.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.page_size == 0 {
            errors.push("Invalid page size. Must be greater than 0.".to_string());
        }
        if !self.near_bottom_threshold_px.is_finite() || self.near_bottom_threshold_px < 0.0 {
            errors.push("near_bottom_threshold_px must be a non-negative number".to_string());
        }
        if !self.load_older_threshold_px.is_finite() || self.load_older_threshold_px < 0.0 {
            errors.push("load_older_threshold_px must be a non-negative number".to_string());
        }
        for (name, value) in [
            ("api_base_url", &self.api_base_url),
            ("push_base_url", &self.push_base_url),
        ] {
            match Url::parse(value) {
                Ok(url) if matches!(url.scheme(), "http" | "https") => {}
                Ok(_) => errors.push(format!("{name} must use http or https, got {value}")),
                Err(e) => errors.push(format!("{name} is not a valid URL ({value}): {e}")),
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

fn env_value(var: &str) -> Option<String> {
    env::var(var).ok().filter(|value| !value.trim().is_empty())
}

/// Base URLs end with `/` so relative joins keep the path.
fn normalize_base(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{trimmed}/")
    }
}
