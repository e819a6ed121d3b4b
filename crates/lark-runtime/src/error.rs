//! Runtime error types.

use lark_core::TaskError;
use lark_framework::RegistryError;
use thiserror::Error;

use crate::config::ConfigError;

/// Errors that can occur while building or running the host.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A plugin descriptor was rejected.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// The shared HTTP client could not be built.
    #[error("Failed to create HTTP client: {0}")]
    HttpClient(TaskError),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
