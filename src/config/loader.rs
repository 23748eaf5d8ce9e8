//! Configuration Loader
//!
//! Reads the JSON service configuration and layers environment overrides on
//! top of it. Overrides use the `REACTIVE_` prefix and `__` between nested
//! keys, e.g. `REACTIVE_PIPELINE__PARALLELISM=8`.

use std::path::{Path, PathBuf};

use config::{Config, Environment, File, FileFormat};
use tracing::{debug, info};

use super::ServiceConfig;
use crate::error::{ToolkitError, ToolkitResult};

/// Default configuration file name, looked up relative to the working directory
pub const DEFAULT_CONFIG_FILE: &str = "config.json";

/// Default prefix for environment overrides
pub const DEFAULT_ENV_PREFIX: &str = "REACTIVE";

/// Loads and validates [`ServiceConfig`]
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    path: PathBuf,
    env_prefix: String,
    env_overrides: Option<config::Map<String, String>>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new(DEFAULT_CONFIG_FILE)
    }
}

impl ConfigLoader {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            env_prefix: DEFAULT_ENV_PREFIX.to_string(),
            env_overrides: None,
        }
    }

    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Use the given variables instead of the process environment
    pub fn with_env_overrides<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let map: config::Map<String, String> = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self.env_overrides = Some(map);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the file, apply environment overrides and validate
    pub fn load(&self) -> ToolkitResult<ServiceConfig> {
        if !self.path.is_file() {
            return Err(ToolkitError::configuration(
                "loader",
                format!("configuration file not found: {}", self.path.display()),
            ));
        }

        debug!(path = %self.path.display(), "Loading service configuration");

        let settings = Config::builder()
            .add_source(File::from(self.path.as_path()).format(FileFormat::Json))
            .add_source(self.environment())
            .build()?;

        let config = Self::finish(settings)?;

        info!(
            path = %self.path.display(),
            service_id = %config.pipeline.service_id,
            parallelism = config.pipeline.parallelism,
            "Configuration loaded successfully"
        );

        Ok(config)
    }

    /// Load from an in-memory JSON document, still applying overrides
    pub fn load_from_str(&self, json: &str) -> ToolkitResult<ServiceConfig> {
        let settings = Config::builder()
            .add_source(File::from_str(json, FileFormat::Json))
            .add_source(self.environment())
            .build()?;
        Self::finish(settings)
    }

    fn environment(&self) -> Environment {
        Environment::with_prefix(&self.env_prefix)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
            .source(self.env_overrides.clone())
    }

    fn finish(settings: Config) -> ToolkitResult<ServiceConfig> {
        let config: ServiceConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }
}
