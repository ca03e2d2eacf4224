//! Runtime settings.
//!
//! The embedded `config/default.toml` is always loaded first. An override
//! file replaces individual top-level keys; `ACCIDENT_MAP_DB` replaces the
//! database path last.

use std::path::{Path, PathBuf};

use accident_map_accident_models::{Language, ResolutionKind};
use accident_map_rebuild::RebuildConfig;
use serde::Deserialize;

/// Embedded default settings.
const DEFAULT_CONFIG: &str = include_str!("../config/default.toml");

/// Environment variable overriding `database_path`.
pub const DATABASE_ENV: &str = "ACCIDENT_MAP_DB";

/// Longest accepted lookback window in years.
const MAX_LOOKBACK_YEARS: u32 = 100;

/// Errors raised while loading settings.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The override file could not be read.
    #[error("Failed to read {}: {source}", path.display())]
    Read {
        /// The override file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A settings document is not valid TOML or has wrongly typed keys.
    #[error("Invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// The settings parse but are out of range.
    #[error("Invalid configuration: {message}")]
    Invalid {
        /// What was rejected.
        message: String,
    },
}

/// Settings of the `accident_map` binary.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// `DuckDB` file holding the dataset and the report cache.
    pub database_path: PathBuf,
    /// Connections shared by statistics queries.
    pub pool_size: usize,
    /// Widgets computed at once for one report.
    pub widget_concurrency: usize,
    /// Entries assembled at once during a rebuild.
    pub rebuild_concurrency: usize,
    /// Rows per staging insert transaction.
    pub stage_chunk_size: usize,
    /// Lookback windows cached for every eligible location.
    pub lookback_windows: Vec<u32>,
    /// Resolution kinds whose locations are cached.
    pub cached_resolutions: Vec<ResolutionKind>,
    /// Language used when a request names none.
    pub default_language: Language,
}

impl Config {
    /// Loads the defaults, the optional override file and the environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the override cannot be read or parsed, or
    /// if the resulting settings fail validation.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let overrides = path
            .map(|path| {
                std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            })
            .transpose()?;
        if let Some(path) = path {
            log::debug!("Loading configuration overrides from {}", path.display());
        }

        let database = std::env::var_os(DATABASE_ENV).map(PathBuf::from);
        Self::from_sources(overrides.as_deref(), database)
    }

    /// Merges the defaults with `overrides` (a TOML document) and
    /// `database`, then validates.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a document does not parse or the result
    /// is out of range.
    pub fn from_sources(
        overrides: Option<&str>,
        database: Option<PathBuf>,
    ) -> Result<Self, ConfigError> {
        let mut table: toml::Table = toml::from_str(DEFAULT_CONFIG)?;
        if let Some(overrides) = overrides {
            let overrides: toml::Table = toml::from_str(overrides)?;
            table.extend(overrides);
        }

        let mut config: Self = toml::Value::Table(table).try_into()?;
        if let Some(database) = database {
            config.database_path = database;
        }
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |message: &str| {
            Err(ConfigError::Invalid {
                message: message.to_string(),
            })
        };

        if self.pool_size == 0 {
            return invalid("pool_size must be at least 1");
        }
        if self.widget_concurrency == 0 || self.rebuild_concurrency == 0 {
            return invalid("widget_concurrency and rebuild_concurrency must be at least 1");
        }
        if self.stage_chunk_size == 0 {
            return invalid("stage_chunk_size must be at least 1");
        }
        if self.lookback_windows.is_empty() {
            return invalid("lookback_windows must not be empty");
        }
        if let Some(years) = self
            .lookback_windows
            .iter()
            .find(|years| **years > MAX_LOOKBACK_YEARS)
        {
            return Err(ConfigError::Invalid {
                message: format!(
                    "lookback window of {years} years is outside [0, {MAX_LOOKBACK_YEARS}]"
                ),
            });
        }
        if self.cached_resolutions.is_empty() {
            return invalid("cached_resolutions must not be empty");
        }
        Ok(())
    }

    /// Settings for the cache rebuild pipeline.
    #[must_use]
    pub fn rebuild_config(&self) -> RebuildConfig {
        let mut windows = self.lookback_windows.clone();
        windows.sort_unstable();
        windows.dedup();

        RebuildConfig {
            lookback_windows: windows,
            cached_resolutions: self.cached_resolutions.clone(),
            rebuild_concurrency: self.rebuild_concurrency,
            stage_chunk_size: self.stage_chunk_size,
            language: self.default_language,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_defaults_are_valid() {
        let config = Config::from_sources(None, None).unwrap();
        assert_eq!(config.database_path, PathBuf::from("data/accident_map.duckdb"));
        assert_eq!(config.lookback_windows, vec![1, 3, 5, 8]);
        assert_eq!(
            config.cached_resolutions,
            vec![ResolutionKind::SuburbanRoad, ResolutionKind::Street]
        );
        assert_eq!(config.default_language, Language::He);
        assert_eq!(config.rebuild_config(), RebuildConfig::default());
    }

    #[test]
    fn overrides_replace_single_keys() {
        let config = Config::from_sources(
            Some("lookback_windows = [5, 1, 5]\ndefault_language = \"en\""),
            None,
        )
        .unwrap();
        assert_eq!(config.default_language, Language::En);
        assert_eq!(config.pool_size, 4);
        assert_eq!(config.rebuild_config().lookback_windows, vec![1, 5]);
    }

    #[test]
    fn database_override_wins() {
        let config = Config::from_sources(
            Some("database_path = \"/srv/from-file.duckdb\""),
            Some(PathBuf::from("/srv/from-env.duckdb")),
        )
        .unwrap();
        assert_eq!(config.database_path, PathBuf::from("/srv/from-env.duckdb"));
    }

    #[test]
    fn rejects_out_of_range_settings() {
        for overrides in [
            "lookback_windows = [1, 101]",
            "lookback_windows = []",
            "pool_size = 0",
            "rebuild_concurrency = 0",
            "stage_chunk_size = 0",
            "cached_resolutions = []",
        ] {
            assert!(
                matches!(
                    Config::from_sources(Some(overrides), None),
                    Err(ConfigError::Invalid { .. })
                ),
                "{overrides} should be rejected"
            );
        }
    }

    #[test]
    fn rejects_unknown_keys_and_values() {
        assert!(matches!(
            Config::from_sources(Some("pool = 2"), None),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            Config::from_sources(Some("cached_resolutions = [\"planet\"]"), None),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn missing_override_file_is_reported() {
        let result = Config::load(Some(Path::new("/nonexistent/accident_map.toml")));
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }
}
