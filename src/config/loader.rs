//! Configuration Loader
//!
//! Environment-aware configuration loading. A preset chosen by `CONSULT_ENV`
//! is layered under an optional file and `CONSULT__`-prefixed environment
//! variables, using `__` as the nesting separator
//! (e.g. `CONSULT__CACHE__CAPACITY=500`).

use super::error::{ConfigResult, ConfigurationError};
use super::ConsultConfig;
use config::{Config, Environment, File};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

const ENVIRONMENT_VARIABLE: &str = "CONSULT_ENV";
const OVERRIDE_PREFIX: &str = "CONSULT";

/// Loaded, validated configuration plus the context it was loaded in
#[derive(Debug)]
pub struct ConfigManager {
    config: ConsultConfig,
    environment: String,
    source_file: Option<PathBuf>,
}

impl ConfigManager {
    /// Load the preset for the detected environment with environment overrides
    pub fn from_environment() -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load(None, &environment)
    }

    /// Load a configuration file on top of the detected environment's preset
    pub fn load_from_file(path: impl AsRef<Path>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load(Some(path.as_ref()), &environment)
    }

    /// Load with an explicit environment, without consulting `CONSULT_ENV`
    pub fn load_with_env(
        path: Option<&Path>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        Self::load(path, environment)
    }

    /// Wrap an already-built configuration, validating it
    pub fn from_config(config: ConsultConfig) -> ConfigResult<Arc<ConfigManager>> {
        config.validate()?;
        Ok(Arc::new(ConfigManager {
            config,
            environment: "custom".to_string(),
            source_file: None,
        }))
    }

    fn load(path: Option<&Path>, environment: &str) -> ConfigResult<Arc<ConfigManager>> {
        let preset = ConsultConfig::for_environment(environment)?;

        debug!(
            environment = environment,
            file = ?path.map(Path::display),
            "Loading consultation core configuration"
        );

        let mut builder = Config::builder().add_source(
            Config::try_from(&preset)
                .map_err(|e| ConfigurationError::load_error("environment preset", e))?,
        );

        if let Some(path) = path {
            if !path.exists() {
                return Err(ConfigurationError::ConfigFileNotFound {
                    path: path.to_path_buf(),
                });
            }
            builder = builder.add_source(File::from(path));
        }

        builder = builder.add_source(
            Environment::with_prefix(OVERRIDE_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let source_name = path
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "environment".to_string());

        let config: ConsultConfig = builder
            .build()
            .and_then(|settings| settings.try_deserialize())
            .map_err(|e| ConfigurationError::load_error(source_name, e))?;

        config.validate()?;

        info!(
            environment = environment,
            cache_capacity = config.cache.capacity,
            strategy = config.load_balancer.strategy.name(),
            "Configuration loaded successfully"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            source_file: path.map(Path::to_path_buf),
        }))
    }

    /// Detect the current environment, defaulting to production
    pub fn detect_environment() -> String {
        env::var(ENVIRONMENT_VARIABLE)
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "production".to_string())
    }

    pub fn config(&self) -> &ConsultConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn source_file(&self) -> Option<&Path> {
        self.source_file.as_deref()
    }
}
