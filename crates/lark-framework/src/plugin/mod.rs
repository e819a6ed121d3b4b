//! Plugin system for the Lark framework.
//!
//! # Architecture
//!
//! A plugin is an ordinary Rust type implementing [`Plugin`]. The type owns
//! whatever state the plugin needs (API tokens, caches, compiled patterns)
//! and declares its chat bindings in [`Plugin::register`].
//!
//! A [`PluginDescriptor`] is the *static, `Copy` handle* to a plugin type. It
//! carries the plugin's name, its metadata, and a monomorphised factory. The
//! registry calls the factory once per load generation to produce a
//! [`LoadedPlugin`]: the live instance plus its type-erased bindings.
//!
//! # Quick start
//!
//! ```rust,ignore
//! use lark::prelude::*;
//!
//! pub struct Reverse;
//!
//! impl Plugin for Reverse {
//!     const NAME: &'static str = "reverse";
//!
//!     fn load(_config: &PluginConfig) -> LoadResult<Self> {
//!         Ok(Reverse)
//!     }
//!
//!     fn register(bindings: &mut Bindings<Self>) {
//!         bindings.command(".rev", |_this, ctx, args| async move {
//!             if let Some(text) = args {
//!                 ctx.reply(text.chars().rev().collect::<String>());
//!             }
//!             Ok(())
//!         });
//!     }
//! }
//!
//! pub static REVERSE: PluginDescriptor = PluginDescriptor::of::<Reverse>();
//! ```
//!
//! # Inter-plugin calls
//!
//! Plugins call each other through typed lookup rather than by name strings:
//! `ctx.lookup::<GoogleMaps>()` returns `Option<Arc<GoogleMaps>>`, whose
//! public methods return [`Task`](lark_core::Task)s. An absent plugin yields
//! `None`.

mod config;
mod descriptor;

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use lark_core::TaskError;

pub use config::PluginConfig;
pub use descriptor::PluginDescriptor;

use crate::error::LoadResult;
use crate::handler::{Bindings, PluginBindings};

// ─── Plugin ───────────────────────────────────────────────────────────────────

/// A chat plugin.
///
/// Implementations must be `Send + Sync`: handlers for the same plugin run
/// concurrently. Mutable state belongs behind a lock owned by the plugin and
/// must never be held across an `.await`.
pub trait Plugin: Send + Sync + Sized + 'static {
    /// Unique name; the registry key and the config section name.
    const NAME: &'static str;
    /// Version string shown by `.health` and in logs.
    const VERSION: &'static str = "0.1.0";
    /// Author, free-form.
    const AUTHOR: &'static str = "";
    /// One-line description.
    const DESCRIPTION: &'static str = "";

    /// Constructs the plugin from its configuration section.
    fn load(config: &PluginConfig) -> LoadResult<Self>;

    /// Declares the plugin's commands, URL hosts and message handlers.
    fn register(bindings: &mut Bindings<Self>);

    /// Turns a handler failure into the single line replied to the user.
    fn format_error(&self, err: &TaskError) -> String {
        default_error_message(err)
    }
}

/// The reply used when a plugin does not override [`Plugin::format_error`].
pub fn default_error_message(err: &TaskError) -> String {
    match err {
        TaskError::Unexpected(_) => "Error: something went wrong".to_string(),
        other => format!("Error: {other}"),
    }
}

// ─── PluginMetadata ───────────────────────────────────────────────────────────

/// Descriptive metadata attached to every plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PluginMetadata {
    /// Version string.
    pub version: &'static str,
    /// Author.
    pub author: &'static str,
    /// One-line description.
    pub description: &'static str,
}

// ─── LoadedPlugin ─────────────────────────────────────────────────────────────

pub(crate) type ErrorFormatter = Arc<dyn Fn(&TaskError) -> String + Send + Sync>;

/// A live plugin instance belonging to one registry generation.
pub struct LoadedPlugin {
    name: &'static str,
    metadata: PluginMetadata,
    instance: Arc<dyn Any + Send + Sync>,
    pub(crate) bindings: PluginBindings,
    formatter: ErrorFormatter,
    config: PluginConfig,
}

/// Shared handle to a [`LoadedPlugin`], as returned by lookups.
pub type PluginHandle = Arc<LoadedPlugin>;

impl LoadedPlugin {
    pub(crate) fn new<P: Plugin>(
        instance: Arc<P>,
        bindings: PluginBindings,
        config: PluginConfig,
    ) -> Self {
        let formatter: ErrorFormatter = {
            let instance = Arc::clone(&instance);
            Arc::new(move |err: &TaskError| instance.format_error(err))
        };
        Self {
            name: P::NAME,
            metadata: PluginMetadata {
                version: P::VERSION,
                author: P::AUTHOR,
                description: P::DESCRIPTION,
            },
            instance,
            bindings,
            formatter,
            config,
        }
    }

    /// The plugin's name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The plugin's metadata.
    pub fn metadata(&self) -> &PluginMetadata {
        &self.metadata
    }

    /// The configuration this instance was loaded with.
    pub fn config(&self) -> &PluginConfig {
        &self.config
    }

    /// Returns the typed instance if this plugin is a `P`.
    pub fn downcast<P: Plugin>(&self) -> Option<Arc<P>> {
        Arc::clone(&self.instance).downcast::<P>().ok()
    }

    /// Formats `err` with the plugin's own error formatter.
    pub fn format_error(&self, err: &TaskError) -> String {
        (self.formatter)(err)
    }

    /// Command tokens bound by this plugin, in registration order.
    pub fn commands(&self) -> impl Iterator<Item = &str> {
        self.bindings.commands.iter().map(|b| b.token.as_str())
    }

    /// Hostnames bound by this plugin, in registration order.
    pub fn hosts(&self) -> impl Iterator<Item = &str> {
        self.bindings
            .urls
            .iter()
            .flat_map(|b| b.hosts.iter().map(String::as_str))
    }
}

impl fmt::Debug for LoadedPlugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedPlugin")
            .field("name", &self.name)
            .field("metadata", &self.metadata)
            .field("commands", &self.commands().collect::<Vec<_>>())
            .field("hosts", &self.hosts().collect::<Vec<_>>())
            .field("message_handlers", &self.bindings.messages.len())
            .finish()
    }
}
