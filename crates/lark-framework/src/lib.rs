//! # Lark Framework
//!
//! Plugin hosting and event routing for the Lark script host.
//!
//! This layer provides:
//! - The [`Plugin`] trait and its static [`PluginDescriptor`]
//! - [`Bindings`] for declaring commands, URL hosts and message handlers
//! - The [`Registry`], which loads plugins into immutable generations and
//!   swaps them atomically on reload
//! - The [`Router`], which maps a chat line to the bindings it triggers
//! - The [`Dispatcher`], which runs each triggered handler in its own task
//!   behind an error boundary
//!
//! ```text
//! ChatEvent ──► Dispatcher ──► Snapshot.router().route(line)
//!                   │
//!                   ├── spawn task ──► command handler ──► ctx.reply(..)
//!                   ├── spawn task ──► url handler     ──► ctx.request(..)
//!                   └── spawn task ──► message handler ──► ctx.lookup::<P>()
//! ```

pub mod context;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod plugin;
pub mod registry;
pub mod router;

#[cfg(test)]
mod testing;

pub use context::{HandlerContext, ReloadHook, Services};
pub use dispatcher::Dispatcher;
pub use error::{LoadError, LoadResult, RegistryError};
pub use handler::Bindings;
pub use plugin::{
    LoadedPlugin, Plugin, PluginConfig, PluginDescriptor, PluginHandle, PluginMetadata,
    default_error_message,
};
pub use registry::{PluginConfigs, Registry, ReloadSummary, Snapshot};
pub use router::{DEFAULT_PREFIX, ParsedCommand, RouteMatch, Router, extract_urls, parse_command};
