//! # Lark Core
//!
//! Foundation types for the Lark IRC script host.
//!
//! This crate has no knowledge of plugins or routing. It provides the pieces
//! everything else is built on:
//!
//! - **Tasks**: a cooperative [`Scheduler`] with parent/child cancellation
//!   ([`Task`], [`TaskScope`], [`TaskState`])
//! - **Errors**: the [`TaskError`] taxonomy every handler failure maps onto
//! - **Events**: the inbound [`ChatEvent`] and the outbound [`ReplySink`]
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ChatEvent   ┌────────────┐  spawn   ┌───────────┐
//! │ IRC client   │──────────────▶│ Dispatcher │─────────▶│ Scheduler │
//! │ (external)   │◀──────────────│ (framework)│          │  (core)   │
//! └──────────────┘   ReplySink   └────────────┘          └───────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use lark_core::{Scheduler, TaskError};
//! use std::time::Duration;
//!
//! let scheduler = Scheduler::new();
//! let task = scheduler.spawn(None, "lookup", |scope| async move {
//!     let child = scope.spawn("slow", |scope| async move {
//!         scope.sleep(Duration::from_secs(1)).await?;
//!         Ok("done")
//!     });
//!     child.wait().await
//! });
//!
//! assert_eq!(task.wait().await?, "done");
//! ```

pub mod error;
pub mod event;
pub mod task;

pub use error::{TaskError, TaskResult};
pub use event::{ChannelSink, ChatEvent, OutboundMessage, ReplySink, ReplyTarget, Tags, User};
pub use task::{Scheduler, Task, TaskScope, TaskState, panic_message};

/// Prelude for common imports.
pub mod prelude {
    pub use super::error::{TaskError, TaskResult};
    pub use super::event::{ChatEvent, ReplyTarget, User};
    pub use super::task::{Scheduler, Task, TaskScope};
}
