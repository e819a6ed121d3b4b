//! Handler context.
//!
//! [`HandlerContext`] is what every handler receives: the triggering event,
//! the handler's own [`TaskScope`], the registry generation it was dispatched
//! with, and the host services (HTTP client, reload hook).

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use lark_core::{ChatEvent, ReplyTarget, Tags, Task, TaskError, TaskResult, TaskScope, User};
use lark_transport::{HttpClient, Request, Response};

use crate::plugin::{Plugin, PluginHandle};
use crate::registry::{ReloadSummary, Snapshot};

// ─── ReloadHook ───────────────────────────────────────────────────────────────

/// Re-reads configuration and swaps in a new plugin generation.
///
/// Implemented by the runtime, which knows where configuration comes from.
#[async_trait]
pub trait ReloadHook: Send + Sync {
    /// Performs the reload.
    async fn reload(&self) -> TaskResult<ReloadSummary>;
}

// ─── Services ─────────────────────────────────────────────────────────────────

/// Host-wide services shared by every handler invocation.
#[derive(Clone)]
pub struct Services {
    http: HttpClient,
    nickname: Arc<str>,
    reload: Option<Arc<dyn ReloadHook>>,
}

impl Services {
    /// Creates the service bundle.
    pub fn new(http: HttpClient, nickname: impl Into<Arc<str>>) -> Self {
        Self {
            http,
            nickname: nickname.into(),
            reload: None,
        }
    }

    /// Installs the hook used by [`HandlerContext::reload`].
    pub fn with_reload_hook(mut self, hook: Arc<dyn ReloadHook>) -> Self {
        self.reload = Some(hook);
        self
    }

    /// The shared HTTP client.
    pub fn http(&self) -> &HttpClient {
        &self.http
    }

    /// The bot's own nickname.
    pub fn nickname(&self) -> &str {
        &self.nickname
    }
}

impl fmt::Debug for Services {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Services")
            .field("http", &self.http)
            .field("nickname", &self.nickname)
            .field("reload", &self.reload.is_some())
            .finish()
    }
}

// ─── HandlerContext ───────────────────────────────────────────────────────────

/// Per-invocation context handed to every handler.
///
/// Cloning is cheap. All nested work (HTTP requests, inter-plugin calls,
/// spawned helpers) is parented to this handler's task, so it is cancelled
/// along with the handler.
#[derive(Clone)]
pub struct HandlerContext {
    event: Arc<ChatEvent>,
    scope: TaskScope,
    snapshot: Arc<Snapshot>,
    plugin: &'static str,
    services: Services,
}

impl HandlerContext {
    pub(crate) fn new(
        event: Arc<ChatEvent>,
        scope: TaskScope,
        snapshot: Arc<Snapshot>,
        plugin: &'static str,
        services: Services,
    ) -> Self {
        Self {
            event,
            scope,
            snapshot,
            plugin,
            services,
        }
    }

    // ─── Event ───────────────────────────────────────────────────────────────

    /// The triggering event.
    pub fn event(&self) -> &ChatEvent {
        &self.event
    }

    /// The sender.
    pub fn user(&self) -> &User {
        &self.event.user
    }

    /// The raw line.
    pub fn line(&self) -> &str {
        &self.event.line
    }

    /// Message tags.
    pub fn tags(&self) -> &Tags {
        &self.event.tags
    }

    /// Where replies go.
    pub fn target(&self) -> &ReplyTarget {
        &self.event.target
    }

    /// Sends one line to the event's reply target.
    pub fn reply(&self, text: impl AsRef<str>) {
        self.event.target.say(text);
    }

    // ─── Tasks ───────────────────────────────────────────────────────────────

    /// This handler's task scope.
    pub fn scope(&self) -> &TaskScope {
        &self.scope
    }

    /// Spawns a child task of this handler.
    pub fn spawn<T, F, Fut>(&self, name: impl Into<Arc<str>>, body: F) -> Task<T>
    where
        T: Send + 'static,
        F: FnOnce(TaskScope) -> Fut,
        Fut: Future<Output = TaskResult<T>> + Send + 'static,
    {
        self.scope.spawn(name, body)
    }

    /// Number of unfinished tasks on the scheduler.
    pub fn live_tasks(&self) -> usize {
        self.scope.scheduler().live_tasks()
    }

    // ─── HTTP ────────────────────────────────────────────────────────────────

    /// The shared HTTP client.
    pub fn http(&self) -> &HttpClient {
        self.services.http()
    }

    /// Issues `request` as a child task of this handler.
    pub fn request(&self, request: Request) -> Task<Response> {
        self.services.http.request(&self.scope, request)
    }

    // ─── Registry ────────────────────────────────────────────────────────────

    /// The plugin this handler belongs to.
    pub fn plugin_name(&self) -> &'static str {
        self.plugin
    }

    /// The registry generation this invocation was dispatched with.
    pub fn snapshot(&self) -> &Arc<Snapshot> {
        &self.snapshot
    }

    /// Looks up another plugin by type.
    pub fn lookup<P: Plugin>(&self) -> Option<Arc<P>> {
        self.snapshot.lookup_as::<P>()
    }

    /// Looks up another plugin by name.
    pub fn lookup_name(&self, name: &str) -> Option<PluginHandle> {
        self.snapshot.lookup(name)
    }

    /// The bot's own nickname.
    pub fn nickname(&self) -> &str {
        self.services.nickname()
    }

    /// Asks the host to reload configuration and plugins.
    ///
    /// This handler keeps running against its original generation.
    pub async fn reload(&self) -> TaskResult<ReloadSummary> {
        match &self.services.reload {
            Some(hook) => hook.reload().await,
            None => Err(TaskError::domain("reloading is not supported here")),
        }
    }
}

impl fmt::Debug for HandlerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerContext")
            .field("plugin", &self.plugin)
            .field("user", &self.event.user.nick)
            .field("target", &self.event.target.name())
            .field("generation", &self.snapshot.generation())
            .finish()
    }
}
