//! Host orchestration.
//!
//! [`Runtime`] wires configuration, logging, the scheduler, the plugin
//! registry and the dispatcher together, then feeds chat events from an
//! external IRC client into dispatch until the input ends or a shutdown
//! signal arrives.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use lark_runtime::Runtime;
//!
//! let runtime = Runtime::builder()
//!     .config_file("lark.toml")
//!     .build()?;
//! runtime.register::<Reverse>()?;
//!
//! // `events` is any `Stream<Item = ChatEvent>`, e.g. fed by the IRC client.
//! runtime.run(events).await;
//! ```
//!
//! # Shutdown
//!
//! | Trigger | In-flight handlers |
//! |---------|--------------------|
//! | Input stream ends | given `tasks.shutdown_grace_secs` to finish, then cancelled |
//! | Ctrl+C / SIGTERM / custom future | cancelled immediately, awaited for the grace period |

use std::future::Future;
use std::path::Path;
use std::pin::pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use lark_core::{ChatEvent, Scheduler, Task, TaskError, TaskResult};
use lark_framework::{
    Dispatcher, Plugin, PluginConfigs, PluginDescriptor, Registry, ReloadHook, ReloadSummary,
    Services,
};
use lark_transport::HttpClient;
use tokio::signal;
use tracing::{debug, error, info, warn};

use crate::config::{ConfigLoader, ConfigResult, LarkConfig, validate_config};
use crate::error::{RuntimeError, RuntimeResult};
use crate::logging;

// =============================================================================
// Reload hook
// =============================================================================

/// Re-reads configuration and rebuilds the plugin generation.
///
/// A runtime built without a loader reuses the plugin sections it started
/// with.
struct ConfigReloader {
    loader: Option<ConfigLoader>,
    initial: PluginConfigs,
    registry: Arc<Registry>,
}

impl ConfigReloader {
    fn plugin_configs(&self) -> ConfigResult<PluginConfigs> {
        let Some(loader) = &self.loader else {
            return Ok(self.initial.clone());
        };
        let config = loader.load()?;
        if config.commands.prefix != self.registry.prefix() {
            warn!(
                current = %self.registry.prefix(),
                configured = %config.commands.prefix,
                "Command prefix changes take effect after a restart"
            );
        }
        Ok(config.plugins)
    }
}

#[async_trait]
impl ReloadHook for ConfigReloader {
    async fn reload(&self) -> TaskResult<ReloadSummary> {
        let configs = self.plugin_configs().map_err(|err| {
            warn!(error = %err, "Reload aborted, keeping the current generation");
            TaskError::domain(format!("configuration error: {err}"))
        })?;
        Ok(self.registry.reload(&configs))
    }
}

// =============================================================================
// Runtime
// =============================================================================

/// The script host.
pub struct Runtime {
    config: LarkConfig,
    scheduler: Scheduler,
    registry: Arc<Registry>,
    dispatcher: Dispatcher,
    reloader: Arc<ConfigReloader>,
}

impl Runtime {
    /// Creates a builder that loads configuration from files and environment.
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Creates a runtime from an already loaded configuration.
    ///
    /// Reloading re-instantiates plugins with the same plugin sections.
    pub fn from_config(config: LarkConfig) -> RuntimeResult<Self> {
        validate_config(&config)?;
        Self::assemble(config, None)
    }

    fn assemble(config: LarkConfig, loader: Option<ConfigLoader>) -> RuntimeResult<Self> {
        logging::init_from_config(&config.logging);

        let scheduler = Scheduler::new();
        let registry = Arc::new(Registry::new(config.commands.prefix));
        let http = HttpClient::new(config.network.timeout()).map_err(RuntimeError::HttpClient)?;
        let reloader = Arc::new(ConfigReloader {
            loader,
            initial: config.plugins.clone(),
            registry: Arc::clone(&registry),
        });
        let services = Services::new(http, config.irc.nickname.clone())
            .with_reload_hook(Arc::clone(&reloader) as Arc<dyn ReloadHook>);
        let dispatcher = Dispatcher::new(scheduler.clone(), Arc::clone(&registry), services);

        info!(
            nickname = %config.irc.nickname,
            prefix = %config.commands.prefix,
            log_level = %config.logging.level,
            "Runtime initialized"
        );

        Ok(Self {
            config,
            scheduler,
            registry,
            dispatcher,
            reloader,
        })
    }

    // ─── Plugins ─────────────────────────────────────────────────────────────

    /// Registers plugin type `P`.
    pub fn register<P: Plugin>(&self) -> RuntimeResult<()> {
        self.register_descriptor(PluginDescriptor::of::<P>())
    }

    /// Registers a plugin descriptor.
    pub fn register_descriptor(&self, desc: PluginDescriptor) -> RuntimeResult<()> {
        Ok(self.registry.register(desc)?)
    }

    /// Registers every descriptor in `descs`, stopping at the first duplicate.
    pub fn register_all(&self, descs: &[PluginDescriptor]) -> RuntimeResult<()> {
        descs
            .iter()
            .try_for_each(|desc| self.register_descriptor(*desc))
    }

    /// Builds the first plugin generation from the loaded configuration.
    pub fn load_plugins(&self) -> ReloadSummary {
        self.registry.load_all(&self.config.plugins)
    }

    /// Re-reads configuration and swaps in a new plugin generation.
    ///
    /// On a configuration error the current generation stays in place.
    pub async fn reload(&self) -> TaskResult<ReloadSummary> {
        self.reloader.reload().await
    }

    // ─── Accessors ───────────────────────────────────────────────────────────

    pub fn config(&self) -> &LarkConfig {
        &self.config
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    // ─── Event loop ──────────────────────────────────────────────────────────

    /// Dispatches a single event. See [`Dispatcher::dispatch`].
    pub fn dispatch(&self, event: ChatEvent) -> Vec<Task<()>> {
        self.dispatcher.dispatch(event)
    }

    /// Dispatches `events` until the stream ends or Ctrl+C / SIGTERM arrives.
    pub async fn run<S>(&self, events: S)
    where
        S: Stream<Item = ChatEvent>,
    {
        self.run_until(events, wait_for_shutdown()).await;
    }

    /// Dispatches `events` until the stream ends or `shutdown` completes.
    ///
    /// Plugins are loaded first if no generation exists yet.
    pub async fn run_until<S, F>(&self, events: S, shutdown: F)
    where
        S: Stream<Item = ChatEvent>,
        F: Future<Output = ()>,
    {
        if self.registry.generation() == 0 {
            self.load_plugins();
        }
        info!(
            plugins = self.registry.snapshot().len(),
            "Lark is running"
        );

        let mut events = pin!(events);
        let mut shutdown = pin!(shutdown);
        let interrupted = loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => break true,
                event = events.next() => match event {
                    Some(event) => {
                        // Handler tasks report their own failures.
                        drop(self.dispatch(event));
                    }
                    None => break false,
                },
            }
        };

        self.stop(interrupted).await;
    }

    async fn stop(&self, interrupted: bool) {
        let grace = self.config.tasks.shutdown_grace();
        if !interrupted {
            debug!(
                live_tasks = self.scheduler.live_tasks(),
                "Input closed, waiting for handlers"
            );
            if self.scheduler.wait_idle(grace).await {
                info!("Lark stopped");
                return;
            }
        }

        if !self.scheduler.shutdown(grace).await {
            warn!(
                live_tasks = self.scheduler.live_tasks(),
                "Some tasks did not stop within the grace period"
            );
        }
        info!("Lark stopped");
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("nickname", &self.config.irc.nickname)
            .field("scheduler", &self.scheduler)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

/// Waits for Ctrl+C or SIGTERM.
async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = signal::ctrl_c() => info!("Received Ctrl+C, shutting down"),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
                }
                return;
            }
            Err(err) => warn!(error = %err, "Failed to register SIGTERM handler"),
        }
    }

    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down"),
        Err(err) => {
            error!(error = %err, "Failed to listen for Ctrl+C, running until input ends");
            std::future::pending::<()>().await;
        }
    }
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for a [`Runtime`] whose configuration is loaded (and reloaded)
/// through a [`ConfigLoader`].
#[derive(Debug, Clone, Default)]
pub struct RuntimeBuilder {
    loader: ConfigLoader,
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self {
            loader: ConfigLoader::new(),
        }
    }

    /// Loads exactly this configuration file.
    pub fn config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.loader = self.loader.file(path);
        self
    }

    /// Sets the configuration profile.
    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.loader = self.loader.profile(profile);
        self
    }

    /// Adds a search path for `lark.toml`.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.loader = self.loader.search_path(path);
        self
    }

    /// Disables `LARK_*` environment overrides.
    pub fn without_env(mut self) -> Self {
        self.loader = self.loader.without_env();
        self
    }

    /// Merges configuration programmatically, below files and environment.
    pub fn merge(mut self, config: LarkConfig) -> Self {
        self.loader = self.loader.merge(config);
        self
    }

    /// Loads the configuration and builds the runtime.
    pub fn build(self) -> RuntimeResult<Runtime> {
        let config = self.loader.load()?;
        Runtime::assemble(config, Some(self.loader))
    }
}
