//! Configuration file support for donorbridge.
//!
//! Configuration is loaded with the following precedence (highest to lowest):
//! 1. CLI flags
//! 2. Environment variables (prefixed with `DONORBRIDGE_`, e.g., `DONORBRIDGE_DATABASE_URL`)
//! 3. Config file (~/.config/donorbridge/config.toml or ./donorbridge.toml)
//! 4. Built-in defaults
//!
//! The database URL defaults to `sqlite://~/.local/state/donorbridge/donorbridge.db`
//! on Linux (using the XDG state directory) if not explicitly configured.
//!
//! Example config file:
//! ```toml
//! [database]
//! url = "sqlite://~/.local/state/donorbridge/donorbridge.db"  # optional, this is the default
//!
//! [destination]
//! api_key = "..."  # or use DONORBRIDGE_API_KEY env var
//! requests_per_second = 2
//! timeout_secs = 30
//!
//! [source]
//! path = "givewp-export.json"
//!
//! [sync]
//! enabled = true
//! gl_code = "UN"
//! campaign = "SPRING"
//!
//! [sync.gateway_map]
//! stripe = "CC"
//! paypal = "PAYPAL"
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;

use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use directories::ProjectDirs;
use donorbridge::destination::rate_limits;
use donorbridge::donorperfect::DEFAULT_BASE_URL;
use donorbridge::settings::{DEFAULT_GL_CODE, SyncSettings};
use serde::Deserialize;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub destination: DestinationConfig,
    pub source: SourceConfig,
    pub sync: SyncConfig,
}

/// Database configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database connection URL.
    /// Supports sqlite:// and postgres:// schemes.
    pub url: Option<String>,
}

/// DonorPerfect API configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DestinationConfig {
    /// API key. Can also be set via DONORBRIDGE_API_KEY.
    pub api_key: Option<String>,
    pub base_url: String,
    /// Per-request timeout.
    pub timeout_secs: u64,
    pub requests_per_second: u32,
}

impl Default for DestinationConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: 30,
            requests_per_second: rate_limits::DEFAULT_RPS,
        }
    }
}

/// Where donations are read from.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// JSON export of the donation platform.
    pub path: Option<PathBuf>,
}

/// Gift coding and real-time sync switch.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub enabled: bool,
    pub gl_code: String,
    pub campaign: String,
    pub solicit_code: String,
    /// Gateway id to gift type code.
    pub gateway_map: BTreeMap<String, String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            gl_code: DEFAULT_GL_CODE.to_string(),
            campaign: String::new(),
            solicit_code: String::new(),
            gateway_map: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Load configuration using the config crate's layered approach.
    ///
    /// Sources are loaded in order (later sources override earlier):
    /// 1. Built-in defaults
    /// 2. XDG config file (~/.config/donorbridge/config.toml)
    /// 3. Local config file (./donorbridge.toml)
    /// 4. Environment variables with DONORBRIDGE_ prefix
    pub fn load() -> Self {
        let mut builder = ConfigBuilder::builder();

        if let Some(proj_dirs) = ProjectDirs::from("", "", "donorbridge") {
            let xdg_config = proj_dirs.config_dir().join("config.toml");
            if xdg_config.exists() {
                tracing::debug!("Loading config from {:?}", xdg_config);
                builder = builder.add_source(
                    File::from(xdg_config)
                        .format(FileFormat::Toml)
                        .required(false),
                );
            }
        }

        let local_config = PathBuf::from("donorbridge.toml");
        if local_config.exists() {
            tracing::debug!("Loading config from ./donorbridge.toml");
            builder = builder.add_source(
                File::from(local_config)
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }

        // DONORBRIDGE_DESTINATION__API_KEY -> destination.api_key
        builder = builder.add_source(
            Environment::with_prefix("DONORBRIDGE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        match builder.build() {
            Ok(settings) => match settings.try_deserialize::<Config>() {
                Ok(config) => config.with_flat_env(),
                Err(e) => {
                    tracing::warn!("Failed to deserialize config: {}", e);
                    Config::default().with_flat_env()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to build config: {}", e);
                Config::default().with_flat_env()
            }
        }
    }

    /// Apply the single-underscore variables documented in `--help`, which
    /// the nested separator cannot express for keys like `api_key`.
    fn with_flat_env(mut self) -> Self {
        self.apply_env(|name| std::env::var(name).ok());
        self
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(url) = var("DONORBRIDGE_DATABASE_URL") {
            self.database.url = Some(url);
        }
        if let Some(key) = var("DONORBRIDGE_API_KEY") {
            self.destination.api_key = Some(key);
        }
        if let Some(path) = var("DONORBRIDGE_SOURCE_PATH") {
            self.source.path = Some(PathBuf::from(path));
        }
    }

    /// Get the database URL, falling back to the default state directory path.
    ///
    /// The `mode=rwc` parameter enables read-write access and creates the
    /// file if it doesn't exist.
    pub fn database_url(&self) -> Option<String> {
        self.database.url.clone().or_else(|| {
            Self::default_state_dir().map(|state_dir| {
                let db_path = state_dir.join("donorbridge.db");
                format!("sqlite://{}?mode=rwc", db_path.display())
            })
        })
    }

    pub fn api_key(&self) -> Option<&str> {
        self.destination
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }

    /// The engine settings this configuration describes.
    pub fn sync_settings(&self) -> SyncSettings {
        SyncSettings {
            sync_enabled: self.sync.enabled,
            api_key: self.api_key().unwrap_or_default().to_string(),
            default_gl_code: self.sync.gl_code.clone(),
            default_campaign: self.sync.campaign.clone(),
            default_solicit_code: self.sync.solicit_code.clone(),
            gateway_map: self.sync.gateway_map.clone(),
        }
    }

    /// Get the default state directory path.
    ///
    /// On Linux, this is `$XDG_STATE_HOME/donorbridge` or `~/.local/state/donorbridge`.
    /// On macOS/Windows, falls back to the data directory.
    pub fn default_state_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "donorbridge").map(|dirs| {
            dirs.state_dir()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| dirs.data_dir().to_path_buf())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_content: &str) -> Config {
        ConfigBuilder::builder()
            .add_source(config::File::from_str(toml_content, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.database.url.is_none());
        assert!(config.destination.api_key.is_none());
        assert_eq!(config.destination.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.destination.requests_per_second, 2);
        assert!(config.source.path.is_none());
        assert!(!config.sync.enabled);
        assert_eq!(config.sync.gl_code, "UN");
    }

    #[test]
    fn test_full_config_parsing() {
        let config = parse(
            r#"
            [database]
            url = "sqlite:///tmp/test.db"

            [destination]
            api_key = "dp_key"
            timeout_secs = 10

            [source]
            path = "export.json"

            [sync]
            enabled = true
            campaign = "SPRING"

            [sync.gateway_map]
            stripe = "CC"
        "#,
        );

        assert_eq!(
            config.database.url,
            Some("sqlite:///tmp/test.db".to_string())
        );
        assert_eq!(config.api_key(), Some("dp_key"));
        assert_eq!(config.destination.timeout_secs, 10);
        assert_eq!(config.destination.requests_per_second, 2);
        assert_eq!(config.source.path, Some(PathBuf::from("export.json")));

        let settings = config.sync_settings();
        assert!(settings.sync_enabled);
        assert_eq!(settings.campaign(), Some("SPRING"));
        assert_eq!(settings.gift_type_for("stripe"), "CC");
        assert!(settings.has_api_key());
    }

    #[test]
    fn test_config_unknown_fields_ignored() {
        let config = parse(
            r#"
            [sync]
            gl_code = "GEN"
            unknown_field = "should be ignored"
        "#,
        );
        assert_eq!(config.sync.gl_code, "GEN");
    }

    #[test]
    fn test_blank_api_key_is_missing() {
        let config = parse(
            r#"
            [destination]
            api_key = "   "
        "#,
        );
        assert_eq!(config.api_key(), None);
        assert!(!config.sync_settings().has_api_key());
    }

    #[test]
    fn test_flat_environment_variables() {
        let mut config = Config::default();
        config.apply_env(|name| match name {
            "DONORBRIDGE_API_KEY" => Some("from-env".to_string()),
            "DONORBRIDGE_SOURCE_PATH" => Some("/data/export.json".to_string()),
            _ => None,
        });
        assert_eq!(config.api_key(), Some("from-env"));
        assert_eq!(config.source.path, Some(PathBuf::from("/data/export.json")));
        assert!(config.database.url.is_none());
    }

    #[test]
    fn test_database_url_defaults_to_state_dir() {
        let url = Config::default().database_url().unwrap();
        assert!(url.starts_with("sqlite://"));
        assert!(url.contains("donorbridge.db"));
        assert!(url.ends_with("?mode=rwc"));
    }

    #[test]
    fn test_database_url_respects_configured_value() {
        let config = parse(
            r#"
            [database]
            url = "postgres://localhost/donorbridge"
        "#,
        );
        assert_eq!(
            config.database_url(),
            Some("postgres://localhost/donorbridge".to_string())
        );
    }
}
