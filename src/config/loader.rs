//! Configuration Loader
//!
//! Environment-aware loading: base YAML file, optional per-environment override
//! file, then environment variables, merged by the `config` crate.

use super::error::{ConfigResult, ConfigurationError};
use super::GeoflowConfig;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

const CONFIG_FILE_STEM: &str = "geoflow";
const ENV_PREFIX: &str = "GEOFLOW";
const ENV_SEPARATOR: &str = "__";

#[derive(Debug)]
pub struct ConfigManager {
    config: GeoflowConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection from `./config`
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with explicit environment.
    ///
    /// Useful for tests, which should not mutate process-wide environment variables.
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let config_directory = config_dir.unwrap_or_else(|| PathBuf::from("config"));
        let base_file = Self::find_config_file(&config_directory)?;

        debug!(
            environment,
            config_directory = %config_directory.display(),
            "Loading configuration"
        );

        let override_file = config_directory.join(format!("{CONFIG_FILE_STEM}.{environment}.yaml"));
        let settings = config::Config::builder()
            .add_source(config::File::from(base_file.clone()))
            .add_source(config::File::from(override_file.clone()).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator(ENV_SEPARATOR)
                    .separator(ENV_SEPARATOR)
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ConfigurationError::load_error(base_file.display().to_string(), e))?;

        let config: GeoflowConfig = settings
            .try_deserialize()
            .map_err(|e| ConfigurationError::load_error(base_file.display().to_string(), e))?;

        config.validate()?;

        info!(
            environment,
            store_backend = ?config.store.backend,
            queue_backend = ?config.queue.backend,
            override_applied = override_file.exists(),
            "Configuration loaded successfully"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        }))
    }

    /// Wrap an already-built configuration (tests, embedding)
    pub fn from_config(config: GeoflowConfig, environment: &str) -> ConfigResult<Arc<ConfigManager>> {
        config.validate()?;
        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory: PathBuf::from("config"),
        }))
    }

    pub fn config(&self) -> &GeoflowConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    /// `GEOFLOW_ENV || APP_ENV || "development"`, lowercased
    pub fn detect_environment() -> String {
        env::var("GEOFLOW_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase()
    }

    fn find_config_file(config_directory: &Path) -> ConfigResult<PathBuf> {
        let mut searched_paths = Vec::new();
        for extension in ["yaml", "yml"] {
            let path = config_directory.join(format!("{CONFIG_FILE_STEM}.{extension}"));
            if path.is_file() {
                debug!(path = %path.display(), "Found configuration file");
                return Ok(path);
            }
            searched_paths.push(path);
        }
        Err(ConfigurationError::config_file_not_found(searched_paths))
    }
}
