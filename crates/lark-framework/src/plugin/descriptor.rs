//! Plugin descriptor, the static `Copy` handle to a plugin type.

use std::sync::Arc;

use super::{LoadedPlugin, Plugin, PluginConfig, PluginMetadata};
use crate::error::LoadResult;
use crate::handler::Bindings;

/// A static, `Copy` descriptor that identifies and instantiates a plugin.
///
/// Descriptors are usually declared as `static` items next to the plugin
/// type and handed to the registry in the order the plugins should load:
///
/// ```rust,ignore
/// pub static GITHUB: PluginDescriptor = PluginDescriptor::of::<GitHub>();
/// ```
#[derive(Debug, Clone, Copy)]
pub struct PluginDescriptor {
    /// Plugin name (registry key and config section).
    pub name: &'static str,
    /// Static metadata.
    pub metadata: PluginMetadata,
    load: fn(PluginConfig) -> LoadResult<LoadedPlugin>,
}

impl PluginDescriptor {
    /// Creates the descriptor for plugin type `P`.
    pub const fn of<P: Plugin>() -> Self {
        Self {
            name: P::NAME,
            metadata: PluginMetadata {
                version: P::VERSION,
                author: P::AUTHOR,
                description: P::DESCRIPTION,
            },
            load: load_plugin::<P>,
        }
    }

    /// Creates a fresh instance from `config`, including its bindings.
    ///
    /// Prefer [`Registry::load_all`](crate::Registry::load_all), which also
    /// checks for cross-plugin binding conflicts.
    pub fn instantiate(&self, config: PluginConfig) -> LoadResult<LoadedPlugin> {
        (self.load)(config)
    }
}

fn load_plugin<P: Plugin>(config: PluginConfig) -> LoadResult<LoadedPlugin> {
    let instance = Arc::new(P::load(&config)?);
    let mut bindings = Bindings::new(Arc::clone(&instance));
    P::register(&mut bindings);
    let bindings = bindings.finish()?;
    Ok(LoadedPlugin::new(instance, bindings, config))
}
