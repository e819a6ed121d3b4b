//! Fixture plugins and helpers shared by the framework's unit tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use lark_core::{ChatEvent, ReplySink, ReplyTarget, Scheduler, Task, TaskError, TaskResult, User};
use lark_transport::HttpClient;
use parking_lot::Mutex;
use url::Url;

use crate::context::{HandlerContext, Services};
use crate::dispatcher::Dispatcher;
use crate::error::LoadResult;
use crate::handler::Bindings;
use crate::plugin::{Plugin, PluginConfig, PluginDescriptor};
use crate::registry::{PluginConfigs, Registry};

// ─── Sink ─────────────────────────────────────────────────────────────────────

/// Records every line said through it.
#[derive(Default)]
pub(crate) struct RecordingSink {
    lines: Mutex<Vec<String>>,
}

impl RecordingSink {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }
}

impl ReplySink for RecordingSink {
    fn say(&self, _target: &str, text: &str) {
        self.lines.lock().push(text.to_string());
    }
}

pub(crate) fn event(line: &str) -> (ChatEvent, Arc<RecordingSink>) {
    let sink = RecordingSink::new();
    let target = ReplyTarget::new("#lark", sink.clone());
    let user = User::new("mk", "mk", "maero.dk");
    (ChatEvent::new(user, target, line), sink)
}

pub(crate) fn dispatcher() -> Dispatcher {
    let registry = Registry::default();
    for desc in FIXTURES {
        registry
            .register(*desc)
            .expect("fixture names are unique");
    }
    registry.load_all(&PluginConfigs::new());

    let http = HttpClient::new(HttpClient::DEFAULT_TIMEOUT).expect("http client");
    Dispatcher::new(
        Scheduler::new(),
        Arc::new(registry),
        Services::new(http, "lark"),
    )
}

pub(crate) static FIXTURES: &[PluginDescriptor] = &[
    PluginDescriptor::of::<Greeter>(),
    PluginDescriptor::of::<Rival>(),
    PluginDescriptor::of::<NeedsToken>(),
    PluginDescriptor::of::<Things>(),
    PluginDescriptor::of::<Counter>(),
    PluginDescriptor::of::<Slow>(),
    PluginDescriptor::of::<Failing>(),
];

// ─── Plugins ──────────────────────────────────────────────────────────────────

/// `.hello`, `.seen`, `.generation`.
pub(crate) struct Greeter;

impl Greeter {
    async fn seen(self: Arc<Self>, ctx: HandlerContext, _args: Option<String>) -> TaskResult<()> {
        let counter = ctx
            .lookup::<Counter>()
            .ok_or_else(|| TaskError::domain("counter is not loaded"))?;
        let seen = counter.total(&ctx).wait().await?;
        ctx.reply(format!("{seen} lines seen"));
        Ok(())
    }
}

impl Plugin for Greeter {
    const NAME: &'static str = "greeter";

    fn load(_config: &PluginConfig) -> LoadResult<Self> {
        Ok(Greeter)
    }

    fn register(bindings: &mut Bindings<Self>) {
        bindings
            .command(".hello", |_this, ctx, _args| async move {
                ctx.reply(format!("Hello, {}!", ctx.user()));
                Ok(())
            })
            .command(".seen", Self::seen)
            .command(".generation", |_this, ctx, _args| async move {
                ctx.reply(format!("generation {}", ctx.snapshot().generation()));
                Ok(())
            });
    }
}

/// Tries to take `.hello` from [`Greeter`].
pub(crate) struct Rival;

impl Plugin for Rival {
    const NAME: &'static str = "rival";

    fn load(_config: &PluginConfig) -> LoadResult<Self> {
        Ok(Rival)
    }

    fn register(bindings: &mut Bindings<Self>) {
        bindings
            .command(".rival", |_this, _ctx, _args| async { Ok(()) })
            .command(".hello", |_this, ctx, _args| async move {
                ctx.reply("stolen");
                Ok(())
            });
    }
}

/// Fails to load without a `token`.
pub(crate) struct NeedsToken {
    pub(crate) token: String,
}

impl Plugin for NeedsToken {
    const NAME: &'static str = "needs_token";

    fn load(config: &PluginConfig) -> LoadResult<Self> {
        Ok(Self {
            token: config.require_str("token")?,
        })
    }

    fn register(bindings: &mut Bindings<Self>) {
        bindings.command(".token", |this, ctx, _args| async move {
            ctx.reply(this.token.len().to_string());
            Ok(())
        });
    }
}

/// `.len` and `example.com/thing:<id>`.
pub(crate) struct Things;

impl Things {
    async fn len(self: Arc<Self>, ctx: HandlerContext, args: Option<String>) -> TaskResult<()> {
        let text = args.ok_or_else(|| TaskError::domain("usage: .len <text>"))?;
        ctx.reply(text.chars().count().to_string());
        Ok(())
    }

    async fn thing(self: Arc<Self>, ctx: HandlerContext, url: Url) -> TaskResult<()> {
        let Some(id) = url
            .path()
            .strip_prefix("/thing:")
            .and_then(|id| id.parse::<u64>().ok())
        else {
            return Ok(());
        };
        ctx.reply(format!("thing {id} (path {})", url.path()));
        Ok(())
    }
}

impl Plugin for Things {
    const NAME: &'static str = "things";

    fn load(_config: &PluginConfig) -> LoadResult<Self> {
        Ok(Things)
    }

    fn register(bindings: &mut Bindings<Self>) {
        bindings
            .command(".len", Self::len)
            .url(&["example.com", "www.example.com"], Self::thing);
    }
}

/// Counts chat lines that are not commands.
pub(crate) struct Counter {
    seen: AtomicUsize,
}

impl Counter {
    pub(crate) fn seen(&self) -> usize {
        self.seen.load(Ordering::SeqCst)
    }

    /// Inter-plugin entry point.
    pub(crate) fn total(self: &Arc<Self>, ctx: &HandlerContext) -> Task<usize> {
        let this = Arc::clone(self);
        ctx.spawn("counter.total", move |_| async move { Ok(this.seen()) })
    }
}

impl Plugin for Counter {
    const NAME: &'static str = "counter";

    fn load(_config: &PluginConfig) -> LoadResult<Self> {
        Ok(Counter {
            seen: AtomicUsize::new(0),
        })
    }

    fn register(bindings: &mut Bindings<Self>) {
        bindings.message(|this, _ctx, line| async move {
            if !line.starts_with('.') {
                this.seen.fetch_add(1, Ordering::SeqCst);
            }
            Ok(())
        });
    }
}

/// `slow.test/<secs>` sleeps for that many seconds.
pub(crate) struct Slow;

impl Slow {
    async fn nap(self: Arc<Self>, ctx: HandlerContext, url: Url) -> TaskResult<()> {
        let secs: u64 = url.path().trim_start_matches('/').parse().unwrap_or(0);
        ctx.scope().sleep(Duration::from_secs(secs)).await?;
        ctx.reply(format!("slept {secs}"));
        Ok(())
    }
}

impl Plugin for Slow {
    const NAME: &'static str = "slow";

    fn load(_config: &PluginConfig) -> LoadResult<Self> {
        Ok(Slow)
    }

    fn register(bindings: &mut Bindings<Self>) {
        bindings.url(&["slow.test"], Self::nap);
    }
}

/// `.fail <kind>` fails in the requested way.
pub(crate) struct Failing;

impl Plugin for Failing {
    const NAME: &'static str = "failing";

    fn load(_config: &PluginConfig) -> LoadResult<Self> {
        Ok(Failing)
    }

    fn register(bindings: &mut Bindings<Self>) {
        bindings.command(".fail", |_this, ctx, args| async move {
            match args.as_deref() {
                Some("domain") => Err(TaskError::domain("No results")),
                Some("http") => Err(TaskError::Http { status: 503 }),
                Some("cancel") => Err(TaskError::Cancelled),
                Some("panic") => panic!("handler exploded"),
                Some("child") => {
                    let child = ctx.spawn("failing.child", |_| {
                        std::future::pending::<TaskResult<()>>()
                    });
                    child.cancel();
                    child.wait().await
                }
                Some("hang") => {
                    std::future::pending::<()>().await;
                    Ok(())
                }
                _ => Err(TaskError::unexpected("unexpected state")),
            }
        });
    }

    fn format_error(&self, err: &TaskError) -> String {
        match err {
            TaskError::Unexpected(_) => "failing: internal error".to_string(),
            other => format!("failing: {other}"),
        }
    }
}
