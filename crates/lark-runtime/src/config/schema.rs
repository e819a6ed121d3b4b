//! Configuration schema definitions.
//!
//! A complete `lark.toml` looks like this; every section is optional.
//!
//! ```toml
//! [irc]
//! nickname = "lark"
//!
//! [commands]
//! prefix = "."
//!
//! [network]
//! timeout_secs = 30
//!
//! [tasks]
//! shutdown_grace_secs = 5
//!
//! [logging]
//! level = "info"
//! format = "compact"
//! filters = { lark_framework = "debug" }
//!
//! [plugins.auth]
//! admins = ["mk!mk@maero.dk"]
//!
//! [plugins.thingiverse]
//! app_token = "..."
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use lark_framework::{DEFAULT_PREFIX, PluginConfigs};
use serde::{Deserialize, Serialize};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LarkConfig {
    /// Identity on the chat network.
    #[serde(default)]
    pub irc: IrcConfig,

    /// Command line parsing.
    #[serde(default)]
    pub commands: CommandsConfig,

    /// Outbound HTTP settings.
    #[serde(default)]
    pub network: NetworkConfig,

    /// Task scheduler settings.
    #[serde(default)]
    pub tasks: TasksConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Per-plugin sections, keyed by plugin name. Each must be a table.
    #[serde(default)]
    pub plugins: PluginConfigs,
}

// ─── Sections ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IrcConfig {
    /// The bot's own nickname.
    #[serde(default = "default_nickname")]
    pub nickname: String,
}

impl Default for IrcConfig {
    fn default() -> Self {
        Self {
            nickname: default_nickname(),
        }
    }
}

fn default_nickname() -> String {
    "lark".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandsConfig {
    /// Character that marks a line as a command.
    #[serde(default = "default_prefix")]
    pub prefix: char,
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
        }
    }
}

fn default_prefix() -> char {
    DEFAULT_PREFIX
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Default per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl NetworkConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TasksConfig {
    /// How long in-flight handlers may keep running after shutdown starts.
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

impl TasksConfig {
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

impl Default for TasksConfig {
    fn default() -> Self {
        Self {
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

fn default_shutdown_grace_secs() -> u64 {
    5
}

// ─── Logging ──────────────────────────────────────────────────────────────────

/// Log verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log line layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    /// Requires the `json-log` feature.
    #[cfg(feature = "json-log")]
    Json,
}

/// Where log lines go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    /// Written to `logging.file_path`.
    File,
}

/// How often the log file is rotated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    #[default]
    Never,
    Hourly,
    Daily,
}

/// Which span lifecycle events are logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SpanEventConfig {
    #[serde(default)]
    pub new: bool,
    #[serde(default)]
    pub enter: bool,
    #[serde(default)]
    pub exit: bool,
    #[serde(default)]
    pub close: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LoggingConfig {
    /// Base level; `RUST_LOG` takes precedence when set.
    #[serde(default)]
    pub level: LogLevel,

    #[serde(default)]
    pub format: LogFormat,

    #[serde(default)]
    pub output: LogOutput,

    /// Log file, required when `output = "file"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<PathBuf>,

    #[serde(default)]
    pub rotation: LogRotation,

    #[serde(default)]
    pub span_events: SpanEventConfig,

    /// Include thread ids.
    #[serde(default)]
    pub thread_ids: bool,

    /// Include source file and line.
    #[serde(default)]
    pub file_location: bool,

    /// Per-target level overrides, e.g. `lark_framework = "debug"`.
    #[serde(default)]
    pub filters: BTreeMap<String, LogLevel>,
}
