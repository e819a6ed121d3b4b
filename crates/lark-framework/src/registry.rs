//! Plugin registry and lifecycle.
//!
//! [`Registry`] owns the list of registered [`PluginDescriptor`]s and the
//! *current generation*: an immutable [`Snapshot`] of loaded plugins plus the
//! routing table built from their bindings.
//!
//! ```text
//! register(desc) ──► descriptors (registration order)
//!
//! load_all / reload(configs)
//!     ├── instantiate every descriptor        (failures logged, plugin absent)
//!     ├── add bindings to a fresh Router      (conflicts: first registrant wins)
//!     └── swap Arc<Snapshot>                  (one write, readers never block)
//! ```
//!
//! Dispatch clones the current `Arc<Snapshot>` once per event, so a handler
//! keeps the generation it started with even if a reload happens while it is
//! suspended. There is never a window in which lookups see a half-built
//! generation.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tracing::{error, info, warn};

use crate::error::{LoadError, LoadResult, RegistryError};
use crate::plugin::{LoadedPlugin, Plugin, PluginConfig, PluginDescriptor, PluginHandle};
use crate::router::{DEFAULT_PREFIX, Router};

/// Per-plugin configuration sections, keyed by plugin name.
pub type PluginConfigs = HashMap<String, Value>;

// =============================================================================
// Snapshot
// =============================================================================

/// One immutable generation of loaded plugins.
pub struct Snapshot {
    generation: u64,
    plugins: Vec<PluginHandle>,
    by_name: HashMap<&'static str, usize>,
    router: Router,
}

impl Snapshot {
    fn empty(prefix: char) -> Self {
        Self {
            generation: 0,
            plugins: Vec::new(),
            by_name: HashMap::new(),
            router: Router::new(prefix),
        }
    }

    /// Monotonic generation number; `0` before the first load.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Loaded plugins in registration order.
    pub fn plugins(&self) -> &[PluginHandle] {
        &self.plugins
    }

    /// Number of loaded plugins.
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    /// Returns `true` if no plugin is loaded.
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// The routing table for this generation.
    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Looks up a loaded plugin by name. Unknown names yield `None`.
    pub fn lookup(&self, name: &str) -> Option<PluginHandle> {
        self.by_name
            .get(name)
            .map(|&i| PluginHandle::clone(&self.plugins[i]))
    }

    /// Looks up a loaded plugin by type.
    pub fn lookup_as<P: Plugin>(&self) -> Option<Arc<P>> {
        self.lookup(P::NAME)?.downcast::<P>()
    }
}

impl fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Snapshot")
            .field("generation", &self.generation)
            .field(
                "plugins",
                &self.plugins.iter().map(|p| p.name()).collect::<Vec<_>>(),
            )
            .field("router", &self.router)
            .finish()
    }
}

// =============================================================================
// ReloadSummary
// =============================================================================

/// Outcome of building a generation.
#[derive(Debug, Clone)]
pub struct ReloadSummary {
    /// The generation that is now current.
    pub generation: u64,
    /// Plugins that loaded, in registration order.
    pub loaded: Vec<&'static str>,
    /// Plugins that failed to load.
    pub failed: Vec<(&'static str, LoadError)>,
}

// =============================================================================
// Registry
// =============================================================================

/// Owns plugin descriptors and the current [`Snapshot`].
pub struct Registry {
    descriptors: RwLock<Vec<PluginDescriptor>>,
    current: RwLock<Arc<Snapshot>>,
    prefix: char,
    next_generation: AtomicU64,
    /// Serialises generation builds.
    build: Mutex<()>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX)
    }
}

impl Registry {
    /// Creates an empty registry using `prefix` for command lines.
    pub fn new(prefix: char) -> Self {
        Self {
            descriptors: RwLock::new(Vec::new()),
            current: RwLock::new(Arc::new(Snapshot::empty(prefix))),
            prefix,
            next_generation: AtomicU64::new(1),
            build: Mutex::new(()),
        }
    }

    // ─── Registration ────────────────────────────────────────────────────────

    /// Registers a descriptor. It is instantiated on the next
    /// [`load_all`](Self::load_all) or [`reload`](Self::reload).
    pub fn register(&self, desc: PluginDescriptor) -> Result<(), RegistryError> {
        let mut descriptors = self.descriptors.write();
        if descriptors.iter().any(|d| d.name == desc.name) {
            return Err(RegistryError::AlreadyRegistered(desc.name.to_string()));
        }
        descriptors.push(desc);
        info!(plugin = %desc.name, version = %desc.metadata.version, "Plugin registered");
        Ok(())
    }

    /// Registered descriptors in registration order.
    pub fn descriptors(&self) -> Vec<PluginDescriptor> {
        self.descriptors.read().clone()
    }

    // ─── Loading ─────────────────────────────────────────────────────────────

    /// Instantiates a single plugin with its section from `configs`.
    ///
    /// This does not touch the current generation.
    pub fn load(&self, desc: &PluginDescriptor, configs: &PluginConfigs) -> LoadResult<LoadedPlugin> {
        let raw = configs.get(desc.name).cloned().unwrap_or(Value::Null);
        let config = PluginConfig::from_value(desc.name, raw)?;
        desc.instantiate(config)
    }

    /// Builds the first generation. Equivalent to [`reload`](Self::reload).
    pub fn load_all(&self, configs: &PluginConfigs) -> ReloadSummary {
        self.reload(configs)
    }

    /// Builds a complete new generation from every registered descriptor,
    /// then makes it current in a single swap.
    ///
    /// Plugins that fail to load (configuration errors, binding conflicts)
    /// are logged and absent from the new generation. Handlers already
    /// running keep the generation they were dispatched with.
    pub fn reload(&self, configs: &PluginConfigs) -> ReloadSummary {
        let _build = self.build.lock();
        let descriptors = self.descriptors();
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);

        let mut plugins: Vec<PluginHandle> = Vec::with_capacity(descriptors.len());
        let mut by_name = HashMap::with_capacity(descriptors.len());
        let mut router = Router::new(self.prefix);
        let mut failed = Vec::new();

        for desc in &descriptors {
            let loaded = self.load(desc, configs).map(Arc::new).and_then(|plugin| {
                router.add(&plugin)?;
                Ok(plugin)
            });
            match loaded {
                Ok(plugin) => {
                    info!(
                        plugin = %desc.name,
                        version = %desc.metadata.version,
                        generation,
                        "Plugin loaded"
                    );
                    by_name.insert(desc.name, plugins.len());
                    plugins.push(plugin);
                }
                Err(err) => {
                    error!(plugin = %desc.name, error = %err, "Plugin failed to load");
                    failed.push((desc.name, err));
                }
            }
        }

        let loaded: Vec<&'static str> = plugins.iter().map(|p| p.name()).collect();
        let snapshot = Arc::new(Snapshot {
            generation,
            plugins,
            by_name,
            router,
        });
        *self.current.write() = snapshot;

        if failed.is_empty() {
            info!(generation, loaded = loaded.len(), "Plugin generation is now current");
        } else {
            warn!(
                generation,
                loaded = loaded.len(),
                failed = failed.len(),
                "Plugin generation is now current with failures"
            );
        }

        ReloadSummary {
            generation,
            loaded,
            failed,
        }
    }

    // ─── Queries ─────────────────────────────────────────────────────────────

    /// The current generation.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.current.read())
    }

    /// The current generation number.
    pub fn generation(&self) -> u64 {
        self.current.read().generation
    }

    /// The command prefix.
    pub fn prefix(&self) -> char {
        self.prefix
    }

    /// Looks up a plugin in the current generation by name.
    pub fn lookup(&self, name: &str) -> Option<PluginHandle> {
        self.snapshot().lookup(name)
    }

    /// Looks up a plugin in the current generation by type.
    pub fn lookup_as<P: Plugin>(&self) -> Option<Arc<P>> {
        self.snapshot().lookup_as::<P>()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("prefix", &self.prefix)
            .field("descriptors", &self.descriptors.read().len())
            .field("current", &self.snapshot())
            .finish()
    }
}
