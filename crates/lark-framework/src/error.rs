//! Error types for the Lark framework.

use thiserror::Error;

/// Errors that prevent a single plugin from loading.
///
/// A load error only ever affects the plugin that raised it; the rest of the
/// generation loads normally and the failing plugin is simply absent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    /// A required configuration key was absent.
    #[error("plugin '{plugin}' is missing required config key '{key}'")]
    MissingKey {
        /// Plugin name.
        plugin: String,
        /// The missing key.
        key: String,
    },

    /// The configuration was present but unusable.
    #[error("plugin '{plugin}' has invalid configuration: {reason}")]
    Invalid {
        /// Plugin name.
        plugin: String,
        /// What is wrong with it.
        reason: String,
    },

    /// The plugin bound the same command token or hostname twice.
    #[error("plugin '{plugin}' binds '{binding}' more than once")]
    DuplicateBinding {
        /// Plugin name.
        plugin: String,
        /// The command token or hostname.
        binding: String,
    },

    /// Another plugin already owns a command token or hostname.
    #[error("plugin '{plugin}' cannot bind '{binding}': already bound by '{owner}'")]
    Conflict {
        /// The rejected plugin.
        plugin: String,
        /// The contested command token or hostname.
        binding: String,
        /// The plugin that registered it first.
        owner: String,
    },
}

impl LoadError {
    /// Creates a [`LoadError::MissingKey`].
    pub fn missing_key(plugin: impl Into<String>, key: impl Into<String>) -> Self {
        Self::MissingKey {
            plugin: plugin.into(),
            key: key.into(),
        }
    }

    /// Creates a [`LoadError::Invalid`].
    pub fn invalid(plugin: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            plugin: plugin.into(),
            reason: reason.into(),
        }
    }
}

/// Errors raised by registry bookkeeping (as opposed to loading).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// A descriptor with the same name is already registered.
    #[error("a plugin named '{0}' is already registered")]
    AlreadyRegistered(String),
}

/// Result type for plugin loading.
pub type LoadResult<T> = Result<T, LoadError>;
