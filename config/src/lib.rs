//! Configuration for the taxform binary.
//!
//! Read from `~/.taxform/config.toml` unless `TAXFORM_CONFIG` or an explicit
//! path says otherwise. Every section is optional; string values support
//! `${VAR}` expansion.

use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs};

use serde::Deserialize;
use thiserror::Error;

use taxform_store::{RetryPolicy, StoreOptions};

/// Env var naming an alternate config file.
pub const CONFIG_ENV: &str = "TAXFORM_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl ConfigError {
    pub fn path(&self) -> &PathBuf {
        match self {
            ConfigError::Read { path, .. } | ConfigError::Parse { path, .. } => path,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct TaxformConfig {
    pub store: Option<StoreConfig>,
    pub retry: Option<RetryConfig>,
    pub log: Option<LogConfig>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StoreConfig {
    /// Database file. Defaults to `~/.taxform/forms.db`.
    pub path: Option<String>,
    pub busy_timeout_ms: Option<u64>,
}

/// Backoff for transient storage errors on reads and idempotent upserts.
#[derive(Debug, Default, Deserialize)]
pub struct RetryConfig {
    pub max_retries: Option<u32>,
    pub initial_delay_ms: Option<u64>,
    pub max_delay_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LogConfig {
    /// `EnvFilter` directive, used when `RUST_LOG` is unset.
    pub filter: Option<String>,
    /// Append logs here instead of stderr.
    pub file: Option<String>,
}

pub fn expand_env_vars(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            return out;
        };
        let var = &after[..end];
        if !var.is_empty() {
            out.push_str(&env::var(var).unwrap_or_default());
        }
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    out
}

impl TaxformConfig {
    /// Load from the default location. A missing file is not an error.
    pub fn load() -> Result<Option<Self>, ConfigError> {
        match config_path() {
            Some(path) if path.exists() => Self::load_from(&path).map(Some),
            _ => Ok(None),
        }
    }

    /// Load from an explicit path, which must exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!("Failed to read config at {:?}: {}", path, err);
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: err,
                });
            }
        };

        match toml::from_str(&content) {
            Ok(config) => Ok(config),
            Err(err) => {
                tracing::warn!("Failed to parse config at {:?}: {}", path, err);
                Err(ConfigError::Parse {
                    path: path.to_path_buf(),
                    source: err,
                })
            }
        }
    }

    #[must_use]
    pub fn path() -> Option<PathBuf> {
        config_path()
    }

    /// Database location: config value (expanded), else `~/.taxform/forms.db`.
    #[must_use]
    pub fn db_path(&self) -> Option<PathBuf> {
        self.store
            .as_ref()
            .and_then(|store| store.path.as_deref())
            .map(|raw| PathBuf::from(expand_env_vars(raw)))
            .or_else(|| taxform_dir().map(|dir| dir.join("forms.db")))
    }

    #[must_use]
    pub fn store_options(&self) -> StoreOptions {
        let mut options = StoreOptions::default();
        if let Some(ms) = self.store.as_ref().and_then(|store| store.busy_timeout_ms) {
            options.busy_timeout = Duration::from_millis(ms);
        }
        if let Some(retry) = &self.retry {
            options.retry = retry.to_policy();
        }
        options
    }

    #[must_use]
    pub fn log_filter(&self) -> Option<String> {
        self.log
            .as_ref()
            .and_then(|log| log.filter.as_deref())
            .map(expand_env_vars)
    }

    #[must_use]
    pub fn log_file(&self) -> Option<PathBuf> {
        self.log
            .as_ref()
            .and_then(|log| log.file.as_deref())
            .map(|raw| PathBuf::from(expand_env_vars(raw)))
    }
}

impl RetryConfig {
    /// Fill unset fields from [`RetryPolicy::default`].
    #[must_use]
    pub fn to_policy(&self) -> RetryPolicy {
        let defaults = RetryPolicy::default();
        RetryPolicy {
            max_retries: self.max_retries.unwrap_or(defaults.max_retries),
            initial_delay: self
                .initial_delay_ms
                .map_or(defaults.initial_delay, Duration::from_millis),
            max_delay: self
                .max_delay_ms
                .map_or(defaults.max_delay, Duration::from_millis),
            jitter_factor: defaults.jitter_factor,
        }
    }
}

fn taxform_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".taxform"))
}

/// `$TAXFORM_CONFIG` if set, else `~/.taxform/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    match env::var_os(CONFIG_ENV) {
        Some(path) if !path.is_empty() => Some(PathBuf::from(path)),
        _ => taxform_dir().map(|dir| dir.join("config.toml")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // expand_env_vars tests

    #[test]
    fn expand_env_vars_no_vars() {
        assert_eq!(expand_env_vars("hello world"), "hello world");
    }

    #[test]
    fn expand_env_vars_single_var() {
        unsafe {
            std::env::set_var("TAXFORM_TEST_CONFIG_VAR", "replaced");
        }
        let result = expand_env_vars("prefix ${TAXFORM_TEST_CONFIG_VAR} suffix");
        assert_eq!(result, "prefix replaced suffix");
        unsafe {
            std::env::remove_var("TAXFORM_TEST_CONFIG_VAR");
        }
    }

    #[test]
    fn expand_env_vars_missing_var_becomes_empty() {
        unsafe {
            std::env::remove_var("TAXFORM_MISSING_VAR_FOR_TEST");
        }
        let result = expand_env_vars("before ${TAXFORM_MISSING_VAR_FOR_TEST} after");
        assert_eq!(result, "before  after");
    }

    #[test]
    fn expand_env_vars_unterminated_is_literal() {
        assert_eq!(expand_env_vars("cost ${HOME"), "cost ${HOME");
        assert_eq!(expand_env_vars("${}x"), "x");
    }

    #[test]
    fn full_config_parses() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
[store]
path = "/srv/taxform/forms.db"
busy_timeout_ms = 250

[retry]
max_retries = 4
initial_delay_ms = 5

[log]
filter = "taxform_store=debug"
file = "/var/log/taxform.log"
"#,
        )
        .unwrap();

        let config = TaxformConfig::load_from(&path).unwrap();
        assert_eq!(config.db_path(), Some(PathBuf::from("/srv/taxform/forms.db")));

        let options = config.store_options();
        assert_eq!(options.busy_timeout, Duration::from_millis(250));
        assert_eq!(options.retry.max_retries, 4);
        assert_eq!(options.retry.initial_delay, Duration::from_millis(5));
        assert_eq!(options.retry.max_delay, RetryPolicy::default().max_delay);

        assert_eq!(config.log_filter().as_deref(), Some("taxform_store=debug"));
        assert_eq!(config.log_file(), Some(PathBuf::from("/var/log/taxform.log")));
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config: TaxformConfig = toml::from_str("").unwrap();
        let options = config.store_options();
        assert_eq!(options.retry, RetryPolicy::default());
        assert_eq!(options.busy_timeout, StoreOptions::default().busy_timeout);
        assert_eq!(config.log_filter(), None);
    }

    #[test]
    fn read_and_parse_errors_carry_path() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        let err = TaxformConfig::load_from(&missing).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
        assert_eq!(err.path(), &missing);

        let broken = dir.path().join("broken.toml");
        fs::write(&broken, "[store\npath = 1").unwrap();
        let err = TaxformConfig::load_from(&broken).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("broken.toml"));
    }
}
