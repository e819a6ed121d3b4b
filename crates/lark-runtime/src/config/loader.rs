//! Configuration loader using figment.
//!
//! # Configuration Priority (lowest to highest)
//!
//! 1. Built-in defaults
//! 2. Programmatic overrides ([`ConfigLoader::merge`])
//! 3. Main config file (`lark.toml`)
//! 4. Profile-specific config file (`lark.{profile}.toml`)
//! 5. Environment variables (`LARK_*`)
//!
//! # Environment Variable Mapping
//!
//! Environment variables are mapped using the `LARK_` prefix with `__` as separator:
//!
//! - `LARK_LOGGING__LEVEL=debug` → `logging.level = "debug"`
//! - `LARK_COMMANDS__PREFIX=!` → `commands.prefix = "!"`
//! - `LARK_PLUGINS__THINGIVERSE__APP_TOKEN=xxx` → `plugins.thingiverse.app_token = "xxx"`
//!
//! The profile is taken from `LARK_PROFILE` unless set explicitly.
//!
//! # Example
//!
//! ```rust,ignore
//! use lark_runtime::config::ConfigLoader;
//!
//! let config = ConfigLoader::new()
//!     .file("./config/lark.toml")
//!     .load()?;
//! ```

use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use tracing::{debug, info, trace, warn};

use super::error::{ConfigError, ConfigResult};
use super::schema::LarkConfig;
use super::validation::validate_config;

const FILE_STEM: &str = "lark";
const ENV_PREFIX: &str = "LARK_";

/// Layered configuration loader.
///
/// Cloning is cheap, and a clone loads from the same sources. The runtime
/// keeps one around to re-read configuration on reload.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Programmatic overrides.
    figment: Figment,
    profile: Option<String>,
    search_paths: Vec<PathBuf>,
    load_env: bool,
    /// Specific config file to load (overrides search).
    config_file: Option<PathBuf>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Creates a loader that searches the current directory and the user
    /// config directory, with environment overrides enabled.
    pub fn new() -> Self {
        Self {
            figment: Figment::new(),
            profile: std::env::var(format!("{ENV_PREFIX}PROFILE")).ok(),
            search_paths: Vec::new(),
            load_env: true,
            config_file: None,
        }
    }

    /// Sets the configuration profile.
    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into());
        self
    }

    /// Adds a search path for configuration files.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.search_paths.push(path.as_ref().to_path_buf());
        self
    }

    /// Adds the current directory to the search paths.
    pub fn with_current_dir(self) -> Self {
        match std::env::current_dir() {
            Ok(cwd) => self.search_path(cwd),
            Err(_) => self,
        }
    }

    /// Adds `<config dir>/lark` to the search paths.
    pub fn with_user_config_dir(self) -> Self {
        match dirs::config_dir() {
            Some(dir) => self.search_path(dir.join(FILE_STEM)),
            None => self,
        }
    }

    /// Loads exactly this file instead of searching.
    pub fn file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Enables `LARK_*` environment overrides (the default).
    pub fn with_env(mut self) -> Self {
        self.load_env = true;
        self
    }

    /// Disables environment overrides.
    pub fn without_env(mut self) -> Self {
        self.load_env = false;
        self
    }

    /// Merges configuration programmatically, below files and environment.
    pub fn merge(mut self, config: LarkConfig) -> Self {
        self.figment = self.figment.merge(Serialized::defaults(config));
        self
    }

    /// Loads, extracts and validates the configuration.
    pub fn load(&self) -> ConfigResult<LarkConfig> {
        let figment = self.build_figment()?;
        let config: LarkConfig = figment.extract()?;
        validate_config(&config)?;

        debug!(
            profile = self.profile.as_deref().unwrap_or("-"),
            logging_level = %config.logging.level,
            plugins = config.plugins.len(),
            "Configuration loaded"
        );
        Ok(config)
    }

    fn build_figment(&self) -> ConfigResult<Figment> {
        let mut figment = Figment::from(Serialized::defaults(LarkConfig::default()))
            .merge(self.figment.clone());

        match &self.config_file {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigError::FileNotFound(path.clone()));
                }
                if path.extension().and_then(|e| e.to_str()) != Some("toml") {
                    return Err(ConfigError::UnsupportedFormat(path.clone()));
                }
                info!(path = %path.display(), "Loading configuration file");
                figment = figment.merge(Toml::file(path));
            }
            None => figment = self.search_files(figment),
        }

        if self.load_env {
            trace!(prefix = ENV_PREFIX, "Loading environment overrides");
            figment = figment.merge(Env::prefixed(ENV_PREFIX).ignore(&["PROFILE"]).split("__"));
        }

        Ok(figment)
    }

    fn resolve_search_paths(&self) -> Vec<PathBuf> {
        if !self.search_paths.is_empty() {
            return self.search_paths.clone();
        }
        let mut paths = Vec::new();
        if let Ok(cwd) = std::env::current_dir() {
            paths.push(cwd);
        }
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join(FILE_STEM));
        }
        paths
    }

    /// Merges the first `lark.toml` found, then its profile variant next to it.
    fn search_files(&self, mut figment: Figment) -> Figment {
        for dir in self.resolve_search_paths() {
            let base = dir.join(format!("{FILE_STEM}.toml"));
            if !base.exists() {
                continue;
            }
            info!(path = %base.display(), "Loading configuration file");
            figment = figment.merge(Toml::file(&base));

            if let Some(profile) = &self.profile {
                let variant = dir.join(format!("{FILE_STEM}.{profile}.toml"));
                if variant.exists() {
                    debug!(path = %variant.display(), "Loading profile-specific config");
                    figment = figment.merge(Toml::file(variant));
                }
            }
            return figment;
        }

        warn!("No configuration file found, using defaults");
        figment
    }
}

/// Loads configuration from the default locations.
pub fn load_config() -> ConfigResult<LarkConfig> {
    ConfigLoader::new().load()
}

/// Loads configuration from a specific file, with environment overrides.
pub fn load_config_from_file<P: AsRef<Path>>(path: P) -> ConfigResult<LarkConfig> {
    ConfigLoader::new().file(path).load()
}
