//! # Lark Transport
//!
//! Outbound network access for Lark plugins.
//!
//! Plugins talk to third-party web APIs exclusively through the
//! [`HttpClient`] facade. Every request is a child [`Task`](lark_core::Task)
//! of the handler that issued it, so it is bounded by a timeout and torn down
//! when the handler is cancelled.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────┐
//! │  Plugin handler     │  (TaskScope)
//! ├─────────────────────┤
//! │  lark-transport     │  <- This crate (Request → Task<Response>)
//! ├─────────────────────┤
//! │  reqwest / hyper    │
//! └─────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use lark_transport::{HttpClient, Request};
//!
//! let http = HttpClient::new(HttpClient::DEFAULT_TIMEOUT)?;
//! let resp = http
//!     .request(&scope, Request::get("https://api.github.com/zen"))
//!     .wait()
//!     .await?
//!     .raise_for_status()?;
//! let zen = resp.text();
//! ```

pub mod http;

pub use http::{HttpClient, Request, Response};
pub use reqwest::Method;
