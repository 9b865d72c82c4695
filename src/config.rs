//! Configuration management for mstfinder.
//!
//! All configuration is loaded from `./config/mstfinder.toml`. No hardcoded
//! defaults exist in source code - all defaults are in the config template.

use scraper::Selector;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

/// Configuration file path relative to working directory
pub const CONFIG_PATH: &str = "./config/mstfinder.toml";

/// Default configuration file content - this is the ONLY place defaults exist
pub const DEFAULT_CONFIG: &str = include_str!("../config/mstfinder.toml");

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found at {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] io::Error),

    #[error("Failed to parse configuration file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid URL in '{field}': {url}")]
    InvalidUrl { field: String, url: String },

    #[error("Invalid CSS selector in '{field}': {selector}")]
    InvalidSelector { field: String, selector: String },

    #[error("Configuration field '{field}' cannot be empty")]
    EmptyRequired { field: String },

    #[error("Invalid value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },

    #[error("At least one name-lookup API source must be configured")]
    NoNameApiSources,
}

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub http: HttpConfig,
    pub browser: BrowserConfig,
    pub backoff: BackoffConfig,
    pub pacing: PacingConfig,
    pub io: IoConfig,
    pub input: InputColumns,
    pub registry: RegistryConfig,
    pub name_api: NameApiConfig,
    /// Uppercase token -> expansion, applied to customer names before
    /// slug generation.
    #[serde(default)]
    pub abbreviations: HashMap<String, String>,
}

/// HTTP client configuration (name-lookup APIs only; the browser carries
/// its own session)
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    pub user_agent: String,
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub proxy_url: Option<String>,
    #[serde(default = "default_true")]
    pub verify_ssl: bool,
}

fn default_true() -> bool {
    true
}

/// Shared browser session configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BrowserConfig {
    pub headless: bool,
    pub page_load_timeout_secs: u64,
    pub table_wait_timeout_secs: u64,
    /// Chrome profile directory; persisting it keeps cookies (and solved
    /// challenges) across runs.
    pub profile_dir: String,
    pub warmup: bool,
    pub pause_on_challenge: bool,
}

/// Bounded-retry policy for programmatic API calls
#[derive(Debug, Clone, Deserialize)]
pub struct BackoffConfig {
    pub max_attempts: u32,
    pub base: f64,
    pub cap_secs: f64,
    pub jitter_max_secs: f64,
}

/// Inter-row pacing and checkpoint cadence
#[derive(Debug, Clone, Deserialize)]
pub struct PacingConfig {
    pub row_sleep_min_secs: f64,
    pub row_sleep_max_secs: f64,
    pub long_break_every: usize,
    pub long_break_min_secs: f64,
    pub long_break_max_secs: f64,
    pub checkpoint_every: usize,
}

/// Input/output directory layout
#[derive(Debug, Clone, Deserialize)]
pub struct IoConfig {
    pub pending_dir: String,
    pub done_dir: String,
    pub output_dir: String,
}

/// Required input column names
#[derive(Debug, Clone, Deserialize)]
pub struct InputColumns {
    pub col_seq: String,
    pub col_customer_id: String,
    pub col_customer_name: String,
    pub col_tax_code: String,
}

impl InputColumns {
    pub fn required(&self) -> [&str; 4] {
        [
            self.col_seq.as_str(),
            self.col_customer_id.as_str(),
            self.col_customer_name.as_str(),
            self.col_tax_code.as_str(),
        ]
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConfig {
    pub primary: PrimaryRegistryConfig,
    pub secondary: SecondaryRegistryConfig,
}

/// Primary registry: direct detail links plus a home-page search box
#[derive(Debug, Clone, Deserialize)]
pub struct PrimaryRegistryConfig {
    pub id: String,
    pub home_url: String,
    pub link_base: String,
    pub search_selector: String,
    pub detail_table_selector: String,
    pub max_detail_tables: usize,
    pub key_prefix: String,
    pub url_key: String,
}

/// Secondary registry: search URL template leading to a results list and a
/// keyed detail table
#[derive(Debug, Clone, Deserialize)]
pub struct SecondaryRegistryConfig {
    pub id: String,
    pub base_url: String,
    pub search_url_template: String,
    pub result_table_selector: String,
    /// Tried in order; the first selector that matches any rows wins.
    pub result_row_selectors: Vec<String>,
    pub identifier_cell_selector: String,
    /// Tried in order within the chosen result row.
    pub detail_link_selectors: Vec<String>,
    pub detail_table_selector: String,
    pub key_prefix: String,
    pub url_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NameApiConfig {
    pub sources: Vec<NameApiSource>,
}

/// One name-lookup API, described as data: where to call and how to read
/// the name out of the JSON response.
#[derive(Debug, Clone, Deserialize)]
pub struct NameApiSource {
    pub name: String,
    /// Full URL with a `{mst}` placeholder.
    pub url_template: String,
    /// Dot-notation path to the business name, e.g. `result.name`.
    pub name_path: String,
    /// Optional success-envelope check: the value at this path must equal
    /// `success_code_value` or the response counts as a miss.
    #[serde(default)]
    pub success_code_path: Option<String>,
    #[serde(default)]
    pub success_code_value: Option<String>,
}

impl AppConfig {
    /// Load configuration from the default path
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path(Path::new(CONFIG_PATH))
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate all configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.http.user_agent.is_empty() {
            return Err(ConfigError::EmptyRequired {
                field: "http.user_agent".to_string(),
            });
        }
        if self.http.request_timeout_secs == 0 {
            return Err(ConfigError::EmptyRequired {
                field: "http.request_timeout_secs".to_string(),
            });
        }
        if let Some(proxy) = &self.http.proxy_url {
            validate_url("http.proxy_url", proxy)?;
        }

        if self.backoff.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "backoff.max_attempts".to_string(),
                detail: "must be at least 1".to_string(),
            });
        }
        if self.backoff.base < 1.0 {
            return Err(ConfigError::InvalidValue {
                field: "backoff.base".to_string(),
                detail: "must be >= 1.0 for non-decreasing waits".to_string(),
            });
        }

        if self.pacing.row_sleep_min_secs > self.pacing.row_sleep_max_secs {
            return Err(ConfigError::InvalidValue {
                field: "pacing.row_sleep_min_secs".to_string(),
                detail: "must not exceed pacing.row_sleep_max_secs".to_string(),
            });
        }
        if self.pacing.long_break_min_secs > self.pacing.long_break_max_secs {
            return Err(ConfigError::InvalidValue {
                field: "pacing.long_break_min_secs".to_string(),
                detail: "must not exceed pacing.long_break_max_secs".to_string(),
            });
        }
        if self.pacing.checkpoint_every == 0 {
            return Err(ConfigError::InvalidValue {
                field: "pacing.checkpoint_every".to_string(),
                detail: "must be at least 1".to_string(),
            });
        }

        for (field, value) in [
            ("input.col_seq", &self.input.col_seq),
            ("input.col_customer_id", &self.input.col_customer_id),
            ("input.col_customer_name", &self.input.col_customer_name),
            ("input.col_tax_code", &self.input.col_tax_code),
        ] {
            if value.is_empty() {
                return Err(ConfigError::EmptyRequired {
                    field: field.to_string(),
                });
            }
        }

        let primary = &self.registry.primary;
        validate_url("registry.primary.home_url", &primary.home_url)?;
        validate_url("registry.primary.link_base", &primary.link_base)?;
        validate_selector("registry.primary.search_selector", &primary.search_selector)?;
        validate_selector(
            "registry.primary.detail_table_selector",
            &primary.detail_table_selector,
        )?;
        if primary.max_detail_tables == 0 {
            return Err(ConfigError::InvalidValue {
                field: "registry.primary.max_detail_tables".to_string(),
                detail: "must be at least 1".to_string(),
            });
        }

        let secondary = &self.registry.secondary;
        validate_url("registry.secondary.base_url", &secondary.base_url)?;
        if !secondary.search_url_template.contains("{mst}") {
            return Err(ConfigError::InvalidValue {
                field: "registry.secondary.search_url_template".to_string(),
                detail: "must contain an {mst} placeholder".to_string(),
            });
        }
        validate_selector(
            "registry.secondary.result_table_selector",
            &secondary.result_table_selector,
        )?;
        if secondary.result_row_selectors.is_empty() {
            return Err(ConfigError::EmptyRequired {
                field: "registry.secondary.result_row_selectors".to_string(),
            });
        }
        for (i, sel) in secondary.result_row_selectors.iter().enumerate() {
            validate_selector(&format!("registry.secondary.result_row_selectors[{i}]"), sel)?;
        }
        validate_selector(
            "registry.secondary.identifier_cell_selector",
            &secondary.identifier_cell_selector,
        )?;
        if secondary.detail_link_selectors.is_empty() {
            return Err(ConfigError::EmptyRequired {
                field: "registry.secondary.detail_link_selectors".to_string(),
            });
        }
        for (i, sel) in secondary.detail_link_selectors.iter().enumerate() {
            validate_selector(&format!("registry.secondary.detail_link_selectors[{i}]"), sel)?;
        }
        validate_selector(
            "registry.secondary.detail_table_selector",
            &secondary.detail_table_selector,
        )?;

        if self.name_api.sources.is_empty() {
            return Err(ConfigError::NoNameApiSources);
        }
        for (i, source) in self.name_api.sources.iter().enumerate() {
            if source.name.is_empty() {
                return Err(ConfigError::EmptyRequired {
                    field: format!("name_api.sources[{i}].name"),
                });
            }
            if !source.url_template.contains("{mst}") {
                return Err(ConfigError::InvalidValue {
                    field: format!("name_api.sources[{i}].url_template"),
                    detail: "must contain an {mst} placeholder".to_string(),
                });
            }
            if source.name_path.is_empty() {
                return Err(ConfigError::EmptyRequired {
                    field: format!("name_api.sources[{i}].name_path"),
                });
            }
            if source.success_code_path.is_some() != source.success_code_value.is_some() {
                return Err(ConfigError::InvalidValue {
                    field: format!("name_api.sources[{i}].success_code_path"),
                    detail: "success_code_path and success_code_value must be set together"
                        .to_string(),
                });
            }
        }

        Ok(())
    }

    /// Create default configuration file at the standard location
    pub fn create_default_config() -> Result<PathBuf, ConfigError> {
        let path = Path::new(CONFIG_PATH);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = fs::File::create(path)?;
        file.write_all(DEFAULT_CONFIG.as_bytes())?;

        Ok(path.to_path_buf())
    }

    /// Check if stdin is a TTY (interactive terminal)
    pub fn is_interactive() -> bool {
        atty::is(atty::Stream::Stdin)
    }

    /// Prompt user to create default config (only in interactive mode)
    pub fn prompt_create_config() -> Result<Option<PathBuf>, ConfigError> {
        if !Self::is_interactive() {
            return Ok(None);
        }

        print!("Configuration file not found. Create default config? [Y/n] ");
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        let input = input.trim().to_lowercase();

        if input.is_empty() || input == "y" || input == "yes" {
            let path = Self::create_default_config()?;
            Ok(Some(path))
        } else {
            Ok(None)
        }
    }
}

fn validate_url(field: &str, value: &str) -> Result<(), ConfigError> {
    Url::parse(value).map_err(|_| ConfigError::InvalidUrl {
        field: field.to_string(),
        url: value.to_string(),
    })?;
    Ok(())
}

fn validate_selector(field: &str, value: &str) -> Result<(), ConfigError> {
    Selector::parse(value).map_err(|_| ConfigError::InvalidSelector {
        field: field.to_string(),
        selector: value.to_string(),
    })?;
    Ok(())
}
