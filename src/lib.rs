//! # turbonet
//!
//! An asynchronous correlation bridge to an external HTTP request engine.
//!
//! `turbonet` does not speak HTTP itself. It launches a high-concurrency
//! engine process, accepts the engine's connection on a loopback port and
//! exchanges length-prefixed JSON frames with it. Every request carries a
//! correlation token; responses come back in any order and are routed to
//! the caller that is waiting on that token.
//!
//! ## Features
//!
//! - **Framing**: 4-byte big-endian length prefix, JSON payload
//! - **Correlation**: concurrent pending-request registry, out-of-order replies
//! - **Raw Decoding**: status-line/header/body split of the engine's raw exchange
//! - **Cookies**: Set-Cookie name/value extraction
//! - **Engine Lifecycle**: process launch, connect-back, termination
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use turbonet::{Client, bridge::EngineCommand};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), turbonet::NetError> {
//!     let client = Client::builder("https://example.com")
//!         .launcher(EngineCommand::turbo_intruder("/opt/turbo")?)
//!         .build()
//!         .await?;
//!
//!     let pending = client.post("/login").form(&[("user", "admin")]).send().await?;
//!     let response = pending.timeout(Duration::from_secs(30)).await?;
//!     println!("Status: {}", response.status());
//!
//!     let stats = client.close().await?;
//!     println!("resolved {} of {} frames", stats.resolved, stats.frames);
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`base`] - Error codes and I/O error mapping
//! - [`bridge`] - Codec, messages, registry, transport, dispatch and engine
//! - [`client`] - Request API
//! - [`cookies`] - Set-Cookie extraction
//! - [`http`] - Ordered headers, request bodies and response decoding

pub mod base;
pub mod bridge;
pub mod client;
pub mod cookies;
pub mod http;

pub use base::neterror::NetError;
pub use bridge::registry::PendingResponse;
pub use client::{Client, ClientBuilder, RequestBuilder};
pub use http::response::HttpResponse;
