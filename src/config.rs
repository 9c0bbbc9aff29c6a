//! Engine settings and saved data sources, both stored as TOML.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::exec::DataSource;

const APP_DIR: &str = "polysql";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid configuration in {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("cannot serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolSettings {
    pub max_size: usize,
    /// How long `acquire` waits for a free connection.
    pub wait_timeout_ms: u64,
    pub create_timeout_ms: u64,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_size: 10,
            wait_timeout_ms: 30_000,
            create_timeout_ms: 15_000,
        }
    }
}

impl PoolSettings {
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }

    pub fn create_timeout(&self) -> Duration {
        Duration::from_millis(self.create_timeout_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionSettings {
    /// Applied when a request sets no timeout. Zero means none.
    pub default_timeout_ms: u64,
    pub default_max_rows: Option<usize>,
}

impl ExecutionSettings {
    pub fn default_timeout(&self) -> Option<Duration> {
        (self.default_timeout_ms > 0).then(|| Duration::from_millis(self.default_timeout_ms))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub pool: PoolSettings,
    pub execution: ExecutionSettings,
}

impl EngineConfig {
    pub fn config_path() -> PathBuf {
        config_dir().join("config.toml")
    }

    /// Load from the default location; defaults when the file is absent.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = read(path)?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        write(path, &toml::to_string_pretty(self)?)
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SavedDataSources {
    #[serde(default)]
    data_sources: Vec<DataSource>,
}

pub fn data_sources_path() -> PathBuf {
    config_dir().join("datasources.toml")
}

pub fn load_data_sources() -> Result<Vec<DataSource>, ConfigError> {
    load_data_sources_from(&data_sources_path())
}

pub fn load_data_sources_from(path: &Path) -> Result<Vec<DataSource>, ConfigError> {
    if !path.exists() {
        return Ok(vec![]);
    }
    let content = read(path)?;
    let saved: SavedDataSources = toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(saved.data_sources)
}

pub fn save_data_sources(data_sources: &[DataSource]) -> Result<(), ConfigError> {
    save_data_sources_to(&data_sources_path(), data_sources)
}

pub fn save_data_sources_to(path: &Path, data_sources: &[DataSource]) -> Result<(), ConfigError> {
    let saved = SavedDataSources {
        data_sources: data_sources.to_vec(),
    };
    write(path, &toml::to_string_pretty(&saved)?)
}

fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

fn read(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })
}

fn write(path: &Path, content: &str) -> Result<(), ConfigError> {
    let fail = |source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(fail)?;
    }
    std::fs::write(path, content).map_err(fail)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::Product;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("polysql-config-{}", std::process::id()))
            .join(name)
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config: EngineConfig = toml::from_str(
            r#"
            [pool]
            max_size = 4

            [execution]
            default_timeout_ms = 2500
            "#,
        )
        .unwrap();
        assert_eq!(config.pool.max_size, 4);
        assert_eq!(config.pool.wait_timeout(), Duration::from_secs(30));
        assert_eq!(config.execution.default_timeout(), Some(Duration::from_millis(2500)));
        assert_eq!(config.execution.default_max_rows, None);
        assert_eq!(EngineConfig::default().execution.default_timeout(), None);
    }

    #[test]
    fn test_missing_files_yield_defaults() {
        let path = temp_path("does-not-exist.toml");
        assert_eq!(EngineConfig::load_from(&path).unwrap(), EngineConfig::default());
        assert!(load_data_sources_from(&path).unwrap().is_empty());
    }

    #[test]
    fn test_data_sources_round_trip_without_passwords() {
        let path = temp_path("datasources.toml");
        let mut ds = DataSource::new("warehouse");
        ds.password = "hunter2".into();
        ds.product = Some(Product::Db2);
        save_data_sources_to(&path, &[ds]).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("[[data_sources]]"));
        assert!(!text.contains("hunter2"));

        let loaded = load_data_sources_from(&path).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].name, "warehouse");
        assert_eq!(loaded[0].product, Some(Product::Db2));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_parse_error_names_the_file() {
        let path = temp_path("broken.toml");
        write(&path, "[pool\nmax_size = ").unwrap();
        let err = EngineConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("broken.toml"));
        let _ = std::fs::remove_file(&path);
    }
}
