//! Dispatch invocation and the error boundary.
//!
//! [`Dispatcher::dispatch`] routes one [`ChatEvent`] against the current
//! registry generation and spawns a fresh root task for every match. The
//! chat connection is never blocked: dispatch returns as soon as the tasks
//! are spawned.
//!
//! Every handler task runs inside an error boundary:
//!
//! | Outcome | Reply | Log |
//! |---------|-------|-----|
//! | `Ok(())` | whatever the handler said | - |
//! | `Domain` | plugin's formatter | debug |
//! | `Http` / `Timeout` / `Transport` | plugin's formatter | warn |
//! | `Unexpected` or panic | plugin's formatter | error, with context |
//! | `Cancelled`, handler task cancelled | none | debug |
//! | `Cancelled`, anything else | plugin's formatter | debug |
//!
//! A handler only stays silent when its own task was cancelled. A
//! `Cancelled` that surfaces from a child the handler waited on is an
//! ordinary failure of the handler. Exactly one error reply is produced per
//! failing handler, and no failure propagates beyond its own task.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use lark_core::{ChatEvent, Scheduler, Task, TaskError, TaskResult, panic_message};
use tracing::{Instrument, debug, debug_span, error, info_span, trace, warn};

use crate::context::{HandlerContext, Services};
use crate::plugin::PluginHandle;
use crate::registry::{Registry, Snapshot};
use crate::router::{Call, RouteMatch};

/// Routes chat events to plugin handlers.
#[derive(Clone)]
pub struct Dispatcher {
    scheduler: Scheduler,
    registry: Arc<Registry>,
    services: Services,
}

impl Dispatcher {
    /// Creates a dispatcher.
    pub fn new(scheduler: Scheduler, registry: Arc<Registry>, services: Services) -> Self {
        Self {
            scheduler,
            registry,
            services,
        }
    }

    /// The scheduler handler tasks are spawned on.
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// The registry events are routed against.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Dispatches `event` and returns one task per triggered binding.
    ///
    /// The returned tasks never fail with a handler error; those are turned
    /// into replies inside the task. They may be dropped freely.
    pub fn dispatch(&self, event: ChatEvent) -> Vec<Task<()>> {
        let span = info_span!(
            "dispatch",
            nick = %event.user.nick,
            target = %event.target.name()
        );
        let _enter = span.enter();

        let event = Arc::new(event);
        let snapshot = self.registry.snapshot();
        let matches = snapshot.router().route(&event.line);
        if matches.is_empty() {
            trace!("No bindings matched");
            return Vec::new();
        }

        debug!(
            matches = matches.len(),
            generation = snapshot.generation(),
            "Dispatching line"
        );
        matches
            .into_iter()
            .map(|m| self.invoke(&event, &snapshot, m))
            .collect()
    }

    fn invoke(&self, event: &Arc<ChatEvent>, snapshot: &Arc<Snapshot>, m: RouteMatch) -> Task<()> {
        let (plugin, label, call) = m.into_parts();
        let span = debug_span!("handler", plugin = %plugin.name(), binding = %label);
        let name = format!("{}:{label}", plugin.name());
        let event = Arc::clone(event);
        let snapshot = Arc::clone(snapshot);
        let services = self.services.clone();

        self.scheduler.spawn(None, name, move |scope| {
            let own = scope.clone();
            let ctx = HandlerContext::new(
                Arc::clone(&event),
                scope,
                snapshot,
                plugin.name(),
                services,
            );
            async move {
                match run_guarded(call, ctx).await {
                    Ok(()) => {}
                    Err(err) if err.is_cancelled() && own.is_cancelled() => {
                        debug!("Handler cancelled");
                    }
                    Err(err) => report(&plugin, &label, &event, err),
                }
                Ok(())
            }
            .instrument(span)
        })
    }
}

/// Runs the handler, converting a panic into [`TaskError::Unexpected`].
async fn run_guarded(call: Call, ctx: HandlerContext) -> TaskResult<()> {
    match AssertUnwindSafe(call.invoke(ctx)).catch_unwind().await {
        Ok(res) => res,
        Err(payload) => Err(TaskError::Unexpected(panic_message(payload.as_ref()))),
    }
}

/// Logs a handler failure and sends the plugin's formatted error reply.
fn report(plugin: &PluginHandle, label: &str, event: &ChatEvent, err: TaskError) {
    match &err {
        TaskError::Cancelled | TaskError::Domain(_) => {
            debug!(error = %err, "Handler reported an error")
        }
        TaskError::Http { .. } | TaskError::Timeout { .. } | TaskError::Transport(_) => {
            warn!(error = %err, "Handler failed")
        }
        TaskError::Unexpected(_) => error!(
            plugin = %plugin.name(),
            binding = %label,
            user = %event.user.mask(),
            target = %event.target.name(),
            line = %event.line,
            error = %err,
            "Handler failed unexpectedly"
        ),
    }
    event.target.say(plugin.format_error(&err));
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("scheduler", &self.scheduler)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::Instant;
    use tokio_test::assert_ok;

    use super::*;
    use crate::registry::PluginConfigs;
    use crate::testing::{Counter, dispatcher, event};

    async fn run(dispatcher: &Dispatcher, line: &str) -> Vec<String> {
        let (ev, sink) = event(line);
        for task in dispatcher.dispatch(ev) {
            assert_ok!(task.wait().await);
        }
        sink.lines()
    }

    #[tokio::test]
    async fn test_command_reply() {
        let dispatcher = dispatcher();
        assert_eq!(run(&dispatcher, ".len hello").await, vec!["5"]);
        assert_eq!(run(&dispatcher, ".hello").await, vec!["Hello, mk!"]);
    }

    #[tokio::test]
    async fn test_unknown_command_and_missing_prefix_do_nothing() {
        let dispatcher = dispatcher();
        assert!(run(&dispatcher, ".nope x").await.is_empty());
        assert!(run(&dispatcher, "len hello").await.is_empty());
        assert!(run(&dispatcher, " .len hello").await.is_empty());
    }

    #[tokio::test]
    async fn test_url_binding_receives_parsed_url() {
        let dispatcher = dispatcher();
        let lines = run(&dispatcher, "look at https://example.com/thing:42 please").await;
        assert_eq!(lines, vec!["thing 42 (path /thing:42)"]);

        let lines = run(&dispatcher, "<https://EXAMPLE.com/thing:7>.").await;
        assert_eq!(lines, vec!["thing 7 (path /thing:7)"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_matching_urls_run_concurrently() {
        let dispatcher = dispatcher();
        let (ev, sink) = event(
            "https://slow.test/3 https://unbound.test/9 https://slow.test/1 https://slow.test/2",
        );

        let start = Instant::now();
        let tasks = dispatcher.dispatch(ev);
        // Three routed URLs plus the message handler.
        assert_eq!(tasks.len(), 4);
        for task in tasks {
            assert_ok!(task.wait().await);
        }
        let elapsed = start.elapsed();

        assert!(elapsed >= Duration::from_secs(3));
        assert!(elapsed < Duration::from_secs(4));

        let mut lines = sink.lines();
        lines.sort();
        assert_eq!(lines, vec!["slept 1", "slept 2", "slept 3"]);
    }

    #[tokio::test]
    async fn test_error_boundary_replies_exactly_once() {
        let dispatcher = dispatcher();

        assert_eq!(
            run(&dispatcher, ".fail domain").await,
            vec!["failing: No results"]
        );
        assert_eq!(
            run(&dispatcher, ".fail http").await,
            vec!["failing: http error 503"]
        );
        assert_eq!(
            run(&dispatcher, ".fail panic").await,
            vec!["failing: internal error"]
        );
        assert_eq!(
            run(&dispatcher, ".fail unexpected").await,
            vec!["failing: internal error"]
        );
    }

    #[tokio::test]
    async fn test_default_formatter() {
        let dispatcher = dispatcher();
        assert_eq!(
            run(&dispatcher, ".len").await,
            vec!["Error: usage: .len <text>"]
        );
    }

    #[tokio::test]
    async fn test_cancelled_handler_is_silent() {
        let dispatcher = dispatcher();
        let (ev, sink) = event(".fail hang");
        let tasks = dispatcher.dispatch(ev);
        assert_eq!(tasks.len(), 2);
        for task in &tasks {
            task.cancel();
        }
        for task in tasks {
            assert!(task.wait().await.unwrap_err().is_cancelled());
        }
        tokio::task::yield_now().await;
        assert!(sink.lines().is_empty());
    }

    #[tokio::test]
    async fn test_returned_cancelled_is_reported() {
        let dispatcher = dispatcher();
        assert_eq!(
            run(&dispatcher, ".fail cancel").await,
            vec!["failing: task cancelled"]
        );
        assert_eq!(
            run(&dispatcher, ".fail child").await,
            vec!["failing: task cancelled"]
        );
    }

    #[tokio::test]
    async fn test_message_handlers_see_every_line() {
        let dispatcher = dispatcher();
        run(&dispatcher, "just chatting").await;
        run(&dispatcher, "https://example.com/thing:1").await;
        run(&dispatcher, ".hello").await;

        let counter = dispatcher.registry().lookup_as::<Counter>().unwrap();
        assert_eq!(counter.seen(), 2);
        assert_eq!(run(&dispatcher, ".seen").await, vec!["2 lines seen"]);
    }

    #[tokio::test]
    async fn test_handler_keeps_generation_across_reload() {
        let dispatcher = dispatcher();
        let (ev, sink) = event(".generation");
        let tasks = dispatcher.dispatch(ev);

        dispatcher.registry().reload(&PluginConfigs::new());
        assert_eq!(dispatcher.registry().generation(), 2);

        for task in tasks {
            assert_ok!(task.wait().await);
        }
        assert_eq!(sink.lines(), vec!["generation 1"]);
    }
}
