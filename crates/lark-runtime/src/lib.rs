//! # Lark Runtime
//!
//! Orchestration layer for the Lark script host.
//!
//! This crate provides:
//! - Layered configuration (`lark.toml`, `LARK_*` environment) with validation
//! - Logging setup ([`LoggingBuilder`])
//! - The [`Runtime`], which owns the scheduler, plugin registry and
//!   dispatcher, drives them from a stream of chat events, and reloads
//!   configuration on request
//!
//! ```rust,ignore
//! use lark_runtime::Runtime;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = Runtime::builder().build()?;
//!     runtime.register::<MyPlugin>()?;
//!
//!     // Events come from the IRC client; replies leave through each
//!     // event's reply target.
//!     runtime.run(events).await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;

pub use config::{ConfigError, ConfigLoader, ConfigResult, LarkConfig, LoggingConfig};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};
pub use runtime::{Runtime, RuntimeBuilder};

// Re-export tracing for use by plugin crates
pub use tracing;

/// Logging macros for plugin code.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
