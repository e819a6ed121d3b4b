//! # Lark
//!
//! An IRC script host. Plugins bind `.commands`, URL hostnames and
//! whole-line message handlers; every triggered handler runs in its own
//! cooperative task behind an error boundary, and the plugin set can be
//! reloaded atomically while handlers are in flight.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐  ChatEvent  ┌────────────┐  route  ┌──────────────────────────────┐
//! │ IRC client │────────────▶│  Runtime   │────────▶│ .rev      → reverse (task)   │
//! │ (external) │             │ Dispatcher │────────▶│ github.com → github  (task)  │──▶ HttpClient
//! │            │◀────────────│  Registry  │────────▶│ *         → counter  (task)  │──▶ other plugins
//! └────────────┘  ReplySink  └────────────┘         └──────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use lark::prelude::*;
//!
//! struct Reverse;
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
//!             let text = args.ok_or_else(|| TaskError::domain("usage: .rev <text>"))?;
//!             ctx.reply(text.chars().rev().collect::<String>());
//!             Ok(())
//!         });
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = Runtime::builder().build()?;
//!     runtime.register::<Reverse>()?;
//!     runtime.run(events).await;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `json-log`: JSON log output

pub use lark_core as core;
pub use lark_framework as framework;
pub use lark_runtime as runtime;
pub use lark_transport as transport;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use lark::prelude::*;
/// ```
pub mod prelude {
    // Runtime - main entry point
    pub use lark_runtime::{LarkConfig, Runtime, RuntimeBuilder};

    // Plugins
    pub use lark_framework::{
        Bindings, HandlerContext, LoadError, LoadResult, Plugin, PluginConfig, PluginDescriptor,
    };

    // Tasks and events
    pub use lark_core::{
        ChannelSink, ChatEvent, ReplyTarget, Task, TaskError, TaskResult, TaskScope, User,
    };

    // HTTP
    pub use lark_transport::{Request, Response};
    pub use url::Url;
}
