//! HTTP client facade.
//!
//! Requests are described with [`Request`], executed by [`HttpClient`] as
//! child tasks of the caller, and resolve to a fully-read [`Response`].

mod client;
mod request;
mod response;

pub use client::HttpClient;
pub use request::Request;
pub use response::Response;
