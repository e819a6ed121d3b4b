//! [`PluginConfig`], the configuration section handed to a plugin at load time.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::{LoadError, LoadResult};

/// A plugin's configuration: the JSON object found under
/// `plugins.<name>` in the host configuration.
///
/// An absent section behaves like an empty object. Accessors that can fail
/// return [`LoadError`] tagged with the plugin's name so the registry can
/// report exactly which plugin failed and why.
///
/// # Example
///
/// ```rust,ignore
/// fn load(config: &PluginConfig) -> LoadResult<Self> {
///     let token = config.require_or_env("app_token", "THINGIVERSE_APP_TOKEN")?;
///     Ok(Self { token })
/// }
/// ```
///
/// TOML:
/// ```toml
/// [plugins.thingiverse]
/// app_token = "..."
/// ```
#[derive(Debug, Clone)]
pub struct PluginConfig {
    plugin: Arc<str>,
    values: Arc<Map<String, Value>>,
}

impl PluginConfig {
    /// Creates a config for `plugin` from a JSON value.
    ///
    /// `null` is treated as an empty section; any other non-object value is
    /// rejected.
    pub fn from_value(plugin: &str, value: Value) -> LoadResult<Self> {
        let values = match value {
            Value::Null => Map::new(),
            Value::Object(map) => map,
            other => {
                return Err(LoadError::invalid(
                    plugin,
                    format!("expected a table, found {other}"),
                ));
            }
        };
        Ok(Self {
            plugin: plugin.into(),
            values: Arc::new(values),
        })
    }

    /// Creates an empty config for `plugin`.
    pub fn empty(plugin: &str) -> Self {
        Self {
            plugin: plugin.into(),
            values: Arc::new(Map::new()),
        }
    }

    /// The plugin this section belongs to.
    pub fn plugin(&self) -> &str {
        &self.plugin
    }

    /// Returns the raw value under `key`. `null` counts as absent.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key).filter(|v| !v.is_null())
    }

    /// Returns the string under `key`, if it is one.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// Returns the value under `key` or fails with [`LoadError::MissingKey`].
    pub fn require(&self, key: &str) -> LoadResult<&Value> {
        self.get(key)
            .ok_or_else(|| LoadError::missing_key(&*self.plugin, key))
    }

    /// Returns the string under `key` or fails.
    pub fn require_str(&self, key: &str) -> LoadResult<String> {
        match self.require(key)? {
            Value::String(s) => Ok(s.clone()),
            other => Err(LoadError::invalid(
                &*self.plugin,
                format!("'{key}' must be a string, found {other}"),
            )),
        }
    }

    /// Returns the string under `key`, falling back to the environment
    /// variable `env`, or fails with [`LoadError::MissingKey`].
    pub fn require_or_env(&self, key: &str, env: &str) -> LoadResult<String> {
        if let Some(value) = self.get_str(key) {
            return Ok(value.to_string());
        }
        std::env::var(env)
            .ok()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| LoadError::missing_key(&*self.plugin, key))
    }

    /// Deserializes the whole section into `T`.
    pub fn deserialize<T: DeserializeOwned>(&self) -> LoadResult<T> {
        T::deserialize(Value::Object((*self.values).clone()))
            .map_err(|e| LoadError::invalid(&*self.plugin, e.to_string()))
    }
}
