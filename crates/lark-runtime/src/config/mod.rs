//! Configuration for the Lark runtime.
//!
//! Settings are read from `lark.toml` (optionally a profile variant next to
//! it) and `LARK_*` environment variables, then validated. Plugin sections
//! under `[plugins.<name>]` are handed to each plugin untouched.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, load_config, load_config_from_file};
pub use schema::{
    CommandsConfig, IrcConfig, LarkConfig, LogFormat, LogLevel, LogOutput, LogRotation,
    LoggingConfig, NetworkConfig, SpanEventConfig, TasksConfig,
};
pub use validation::validate_config;
