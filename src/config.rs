use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::filter::DEFAULT_LIMIT;
use crate::{API_URL_ENV, DEFAULT_API_BASE};

/// Default config file path.
pub const CONFIG_PATH: &str = "config.toml";

/// Top-level application config deserialized from `config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub settings: SettingsConfig,
}

/// Backend location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Per-request timeout. Unset means requests wait as long as the transport does.
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

fn default_base_url() -> String {
    DEFAULT_API_BASE.to_string()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_secs: None,
        }
    }
}

/// Runtime settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingsConfig {
    /// Page size a browser opens with.
    #[serde(default = "default_limit")]
    pub default_limit: u32,
    /// Balance auto-refresh interval in seconds.
    #[serde(default = "default_balance_refresh")]
    pub balance_refresh_secs: u64,
    /// How long a fetched balance is reused without a new request.
    #[serde(default = "default_balance_stale")]
    pub balance_stale_secs: u64,
    /// File holding the persisted theme.
    #[serde(default = "default_state_path")]
    pub state_path: PathBuf,
}

fn default_limit() -> u32 {
    DEFAULT_LIMIT
}

fn default_balance_refresh() -> u64 {
    60
}

fn default_balance_stale() -> u64 {
    30
}

fn default_state_path() -> PathBuf {
    PathBuf::from("state.toml")
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            balance_refresh_secs: default_balance_refresh(),
            balance_stale_secs: default_balance_stale(),
            state_path: default_state_path(),
        }
    }
}

impl AppConfig {
    /// Load config from the given TOML file path.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: Self = toml::from_str(&contents)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(config)
    }

    /// Like [`AppConfig::load`], but a missing file yields defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            debug!("{} not found, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Write config to the given TOML file path.
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self).context("failed to serialize config")?;
        std::fs::write(path, contents)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }

    /// Apply an explicit base URL override (the environment, usually).
    pub fn with_base_url(mut self, base_url: Option<String>) -> Self {
        if let Some(url) = base_url.filter(|u| !u.is_empty()) {
            self.api.base_url = url;
        }
        self
    }

    /// Apply the `DASHBOARD_API_URL` environment override.
    pub fn with_env_overrides(self) -> Self {
        let from_env = std::env::var(API_URL_ENV).ok();
        self.with_base_url(from_env)
    }

    /// Check that the base URL is usable and return it normalized.
    pub fn validated_base_url(&self) -> Result<String> {
        let url = Url::parse(&self.api.base_url)
            .with_context(|| format!("invalid API base URL '{}'", self.api.base_url))?;
        anyhow::ensure!(
            matches!(url.scheme(), "http" | "https"),
            "API base URL must be http or https, got '{}'",
            url.scheme()
        );
        Ok(url.as_str().trim_end_matches('/').to_string())
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.api.request_timeout_secs.map(Duration::from_secs)
    }

    pub fn balance_refresh(&self) -> Duration {
        Duration::from_secs(self.settings.balance_refresh_secs)
    }

    pub fn balance_stale(&self) -> Duration {
        Duration::from_secs(self.settings.balance_stale_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.api.base_url, "http://localhost:8080");
        assert_eq!(config.settings.default_limit, 10);
        assert_eq!(config.balance_refresh(), Duration::from_secs(60));
        assert_eq!(config.balance_stale(), Duration::from_secs(30));
        assert_eq!(config.request_timeout(), None);
    }

    #[test]
    fn partial_file() {
        let config: AppConfig = toml::from_str(
            r#"
            [api]
            base_url = "https://bff.example.com/"
            request_timeout_secs = 15

            [settings]
            default_limit = 25
            "#,
        )
        .unwrap();
        assert_eq!(config.settings.default_limit, 25);
        assert_eq!(config.settings.balance_refresh_secs, 60);
        assert_eq!(config.request_timeout(), Some(Duration::from_secs(15)));
        assert_eq!(config.validated_base_url().unwrap(), "https://bff.example.com");
    }

    #[test]
    fn override_wins_unless_empty() {
        let config = AppConfig::default().with_base_url(Some("http://10.0.0.2:9000".into()));
        assert_eq!(config.api.base_url, "http://10.0.0.2:9000");
        let config = config.with_base_url(Some(String::new()));
        assert_eq!(config.api.base_url, "http://10.0.0.2:9000");
    }

    #[test]
    fn rejects_bad_urls() {
        let config = AppConfig::default().with_base_url(Some("not a url".into()));
        assert!(config.validated_base_url().is_err());
        let config = AppConfig::default().with_base_url(Some("ftp://host".into()));
        assert!(config.validated_base_url().is_err());
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut config = AppConfig::default();
        config.settings.default_limit = 5;
        config.save(&path).unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded.settings.default_limit, 5);
        assert!(AppConfig::load_or_default(&dir.path().join("missing.toml")).is_ok());
    }
}
