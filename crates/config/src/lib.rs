//! Configuration for libra-link.
//!
//! Layered with [`figment`], later layers winning:
//!
//! 1. built-in defaults,
//! 2. a TOML file (`--config`, or `config.toml` in the user's config directory),
//! 3. `LIBRA_TUI_*` environment variables,
//! 4. command-line overrides.

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::BaseDirs;
use exn::{OptionExt, ResultExt};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const APP_DIR: &str = "libra-link-tui";
pub const ENV_PREFIX: &str = "LIBRA_TUI_";

const DEFAULT_BASE_URL: &str = "http://localhost:8080";
const DEFAULT_HTTP_TIMEOUT_SECONDS: i64 = 15;
const DEFAULT_SYNC_INTERVAL_SECONDS: i64 = 10;
const DEFAULT_SYNC_BATCH_SIZE: i64 = 25;
const DEFAULT_SPLASH_MILLIS: u64 = 3000;

/// Values given on the command line. They override every other source.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub config_file: Option<PathBuf>,
    pub data_dir: Option<PathBuf>,
    pub api_base_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    /// Empty means "derive from the home directory".
    pub data_dir: PathBuf,
    pub http_timeout_seconds: i64,
    pub sync_interval_seconds: i64,
    pub sync_batch_size: i64,
    /// An `EnvFilter` directive; `RUST_LOG` takes precedence.
    pub log_level: String,
    pub splash_min_millis: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_BASE_URL.to_string(),
            data_dir: PathBuf::new(),
            http_timeout_seconds: DEFAULT_HTTP_TIMEOUT_SECONDS,
            sync_interval_seconds: DEFAULT_SYNC_INTERVAL_SECONDS,
            sync_batch_size: DEFAULT_SYNC_BATCH_SIZE,
            log_level: "info".to_string(),
            splash_min_millis: DEFAULT_SPLASH_MILLIS,
        }
    }
}

impl Config {
    /// Load from every source and validate.
    pub fn load(overrides: &Overrides) -> Result<Self> {
        Self::from_figment(Self::figment(overrides))
    }

    /// The layered sources, before extraction.
    pub fn figment(overrides: &Overrides) -> Figment {
        let file = overrides.config_file.clone().or_else(default_config_file);
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(file) = file {
            tracing::debug!(path = %file.display(), "reading configuration file");
            figment = figment.merge(Toml::file(file));
        }
        figment = figment.merge(Env::prefixed(ENV_PREFIX));
        if let Some(dir) = &overrides.data_dir {
            figment = figment.merge(Serialized::default("data_dir", dir));
        }
        if let Some(url) = &overrides.api_base_url {
            figment = figment.merge(Serialized::default("api_base_url", url));
        }
        figment
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: Self = figment.extract().or_raise(|| ErrorKind::Load)?;
        config.normalize()
    }

    fn normalize(mut self) -> Result<Self> {
        self.api_base_url = normalize_base_url(&self.api_base_url)?;
        if self.data_dir.as_os_str().is_empty() {
            self.data_dir = default_data_dir().ok_or_raise(|| ErrorKind::NoDataDir)?;
        }
        if self.http_timeout_seconds < 1 {
            self.http_timeout_seconds = DEFAULT_HTTP_TIMEOUT_SECONDS;
        }
        if self.sync_interval_seconds < 1 {
            self.sync_interval_seconds = DEFAULT_SYNC_INTERVAL_SECONDS;
        }
        self.sync_batch_size = self.sync_batch_size.max(1);
        if self.log_level.trim().is_empty() {
            self.log_level = "info".to_string();
        }
        Ok(self)
    }

    // =========================================================================
    // Derived values
    // =========================================================================

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_seconds.unsigned_abs())
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_seconds.unsigned_abs())
    }

    pub fn sync_batch_size(&self) -> u32 {
        u32::try_from(self.sync_batch_size).unwrap_or(u32::MAX)
    }

    pub fn splash_min(&self) -> Duration {
        Duration::from_millis(self.splash_min_millis)
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("libra-link.db")
    }

    pub fn session_path(&self) -> PathBuf {
        self.data_dir.join("session.json")
    }

    pub fn books_dir(&self) -> PathBuf {
        self.data_dir.join("books")
    }

    pub fn log_path(&self) -> PathBuf {
        self.data_dir.join("libra-link.log")
    }
}

fn normalize_base_url(url: &str) -> Result<String> {
    let trimmed = url.trim().trim_end_matches('/');
    let host = trimmed
        .strip_prefix("http://")
        .or_else(|| trimmed.strip_prefix("https://"))
        .ok_or_raise(|| ErrorKind::InvalidBaseUrl(url.to_string()))?;
    if host.is_empty() || host.starts_with('/') {
        exn::bail!(ErrorKind::InvalidBaseUrl(url.to_string()));
    }
    Ok(trimmed.to_string())
}

fn default_data_dir() -> Option<PathBuf> {
    BaseDirs::new().map(|dirs| dirs.data_dir().join(APP_DIR))
}

/// `config.toml` in the user's config directory, if it exists.
fn default_config_file() -> Option<PathBuf> {
    let path = BaseDirs::new()?.config_dir().join(APP_DIR).join("config.toml");
    path.exists().then_some(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use rstest::rstest;

    fn load_in(jail: &Jail, overrides: Overrides) -> Config {
        let overrides = Overrides {
            config_file: overrides.config_file.or_else(|| Some(jail.directory().join("missing.toml"))),
            ..overrides
        };
        Config::load(&overrides).unwrap()
    }

    #[test]
    fn test_defaults() {
        Jail::expect_with(|jail| {
            jail.set_env("LIBRA_TUI_DATA_DIR", "/tmp/libra");
            let config = load_in(jail, Overrides::default());
            assert_eq!(config.api_base_url, "http://localhost:8080");
            assert_eq!(config.http_timeout(), Duration::from_secs(15));
            assert_eq!(config.sync_interval(), Duration::from_secs(10));
            assert_eq!(config.sync_batch_size(), 25);
            assert_eq!(config.splash_min(), Duration::from_secs(3));
            assert_eq!(config.database_path(), PathBuf::from("/tmp/libra/libra-link.db"));
            assert_eq!(config.session_path(), PathBuf::from("/tmp/libra/session.json"));
            assert_eq!(config.books_dir(), PathBuf::from("/tmp/libra/books"));
            Ok(())
        });
    }

    #[test]
    fn test_layers_in_order() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.toml",
                r#"
                    api_base_url = "https://file.example.test/"
                    sync_batch_size = 50
                    data_dir = "/from/file"
                "#,
            )?;
            jail.set_env("LIBRA_TUI_SYNC_BATCH_SIZE", "5");
            jail.set_env("LIBRA_TUI_HTTP_TIMEOUT_SECONDS", "30");
            let config = load_in(
                jail,
                Overrides {
                    config_file: Some(jail.directory().join("config.toml")),
                    data_dir: Some(PathBuf::from("/from/cli")),
                    api_base_url: None,
                },
            );
            assert_eq!(config.api_base_url, "https://file.example.test");
            assert_eq!(config.sync_batch_size(), 5);
            assert_eq!(config.http_timeout(), Duration::from_secs(30));
            assert_eq!(config.data_dir, PathBuf::from("/from/cli"));
            Ok(())
        });
    }

    #[test]
    fn test_out_of_range_values_fall_back() {
        Jail::expect_with(|jail| {
            jail.set_env("LIBRA_TUI_DATA_DIR", "/tmp/libra");
            jail.set_env("LIBRA_TUI_HTTP_TIMEOUT_SECONDS", "0");
            jail.set_env("LIBRA_TUI_SYNC_INTERVAL_SECONDS", "-4");
            jail.set_env("LIBRA_TUI_SYNC_BATCH_SIZE", "0");
            let config = load_in(jail, Overrides::default());
            assert_eq!(config.http_timeout(), Duration::from_secs(15));
            assert_eq!(config.sync_interval(), Duration::from_secs(10));
            assert_eq!(config.sync_batch_size(), 1);
            Ok(())
        });
    }

    #[rstest]
    #[case("http://localhost:8080/", Some("http://localhost:8080"))]
    #[case("  https://api.example.test/v  ", Some("https://api.example.test/v"))]
    #[case("localhost:8080", None)]
    #[case("http://", None)]
    #[case("ftp://example.test", None)]
    fn test_normalize_base_url(#[case] input: &str, #[case] expected: Option<&str>) {
        match expected {
            Some(expected) => assert_eq!(normalize_base_url(input).unwrap(), expected),
            None => assert!(matches!(&*normalize_base_url(input).unwrap_err(), ErrorKind::InvalidBaseUrl(_))),
        }
    }
}
