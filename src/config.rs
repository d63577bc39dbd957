//! Runtime configuration.
//!
//! Precedence: an explicit file, else the file named by `LIBRA_CONFIG`, else `./libra.toml`,
//! else defaults. Environment overrides are applied last.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::errors::{CatalogError, Result};

pub const CONFIG_ENV: &str = "LIBRA_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "libra.toml";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Mongo,
    Memory,
}

impl FromStr for BackendKind {
    type Err = CatalogError;
    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "mongo" | "mongodb" => Ok(Self::Mongo),
            "memory" | "mem" => Ok(Self::Memory),
            other => Err(CatalogError::Config(format!("unknown backend '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: BackendKind,
    pub uri: String,
    pub database: String,
    pub max_pool_size: u32,
    pub server_selection_timeout_ms: u64,
    pub app_name: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Mongo,
            uri: "mongodb://localhost:27017".to_string(),
            database: "libra".to_string(),
            max_pool_size: 10,
            server_selection_timeout_ms: 5000,
            app_name: Some("libra-catalog".to_string()),
        }
    }
}

impl StoreConfig {
    #[must_use]
    pub fn memory() -> Self {
        Self { backend: BackendKind::Memory, ..Self::default() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Base directory for log files; the working directory when unset.
    pub dir: Option<PathBuf>,
    /// error|warn|info|debug|trace
    pub level: String,
    /// Rolled files kept per log.
    pub retention: u32,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { dir: None, level: "info".to_string(), retention: 7 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub store: StoreConfig,
    pub log: LogConfig,
}

impl AppConfig {
    /// # Errors
    /// `CatalogError::Config` when `s` is not valid TOML for this shape.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    /// # Errors
    /// `CatalogError::Io` when the file cannot be read, `Config` when it does not parse.
    pub fn from_file(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path)?;
        Self::from_toml_str(&s).map_err(|e| CatalogError::Config(format!("{}: {e}", path.display())))
    }

    /// Files consulted in precedence order; the first one that exists wins.
    pub fn candidate_paths(explicit: Option<&Path>, lookup: impl Fn(&str) -> Option<String>) -> Vec<PathBuf> {
        let mut paths = Vec::new();
        if let Some(p) = explicit {
            paths.push(p.to_path_buf());
        }
        if let Some(p) = lookup(CONFIG_ENV) {
            paths.push(PathBuf::from(p));
        }
        paths.push(PathBuf::from(DEFAULT_CONFIG_FILE));
        paths
    }

    /// Loads from the process environment.
    ///
    /// # Errors
    /// See [`AppConfig::load_with`].
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        Self::load_with(explicit, |k| std::env::var(k).ok())
    }

    /// Resolves the config file, then applies environment overrides read through `lookup`.
    ///
    /// # Errors
    /// `CatalogError::Config` when an explicitly named file is missing or any file or
    /// override fails to parse.
    pub fn load_with(explicit: Option<&Path>, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(p) = explicit
            && !p.exists()
        {
            return Err(CatalogError::Config(format!("config file not found: {}", p.display())));
        }
        let mut cfg = Self::default();
        if let Some(path) = Self::candidate_paths(explicit, &lookup).into_iter().find(|p| p.exists()) {
            log::debug!("loading config from {}", path.display());
            cfg = Self::from_file(&path)?;
        }
        cfg.apply_env(lookup)?;
        Ok(cfg)
    }

    /// # Errors
    /// `CatalogError::Config` when `LIBRA_BACKEND` or `LIBRA_LOG_RETENTION` do not parse.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(v) = lookup("MONGODB_URI") {
            self.store.uri = v;
        }
        if let Some(v) = lookup("DB_NAME") {
            self.store.database = v;
        }
        if let Some(v) = lookup("LIBRA_BACKEND") {
            self.store.backend = v.parse()?;
        }
        self.log.apply_env(lookup)
    }
}

impl LogConfig {
    /// Applies `LIBRA_LOG_DIR`, `LIBRA_LOG_LEVEL` and `LIBRA_LOG_RETENTION` from `lookup`.
    ///
    /// # Errors
    /// `CatalogError::Config` when the retention is not a number.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(v) = lookup("LIBRA_LOG_DIR") {
            self.dir = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("LIBRA_LOG_LEVEL") {
            self.level = v;
        }
        if let Some(v) = lookup("LIBRA_LOG_RETENTION") {
            self.retention =
                v.parse().map_err(|_| CatalogError::Config(format!("LIBRA_LOG_RETENTION: '{v}' is not a number")))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_driver_settings() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.store.max_pool_size, 10);
        assert_eq!(cfg.store.server_selection_timeout_ms, 5000);
        assert_eq!(cfg.store.backend, BackendKind::Mongo);
        assert_eq!(cfg.log.retention, 7);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg = AppConfig::from_toml_str("[store]\ndatabase = \"catalog\"\nbackend = \"memory\"\n").unwrap();
        assert_eq!(cfg.store.database, "catalog");
        assert_eq!(cfg.store.backend, BackendKind::Memory);
        assert_eq!(cfg.store.uri, "mongodb://localhost:27017");
    }

    #[test]
    fn bad_backend_is_a_config_error() {
        let mut cfg = AppConfig::default();
        let err = cfg.apply_env(|k| (k == "LIBRA_BACKEND").then(|| "redis".to_string())).unwrap_err();
        assert!(matches!(err, CatalogError::Config(_)));
    }

    #[test]
    fn log_overrides_ignore_store_variables() {
        let mut log = LogConfig::default();
        log.apply_env(|k| match k {
            "LIBRA_BACKEND" => Some("redis".to_string()),
            "LIBRA_LOG_LEVEL" => Some("debug".to_string()),
            "LIBRA_LOG_RETENTION" => Some("3".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(log, LogConfig { dir: None, level: "debug".into(), retention: 3 });
        assert!(LogConfig::default().apply_env(|_| Some("x".to_string())).is_err());
    }
}
