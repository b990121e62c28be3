//! apiproxy - URI template matching and routing decisions for an API gateway
//! sidecar.
//!
//! The heart of the crate is [`core::httppattern`]: it parses HTTP rule
//! templates such as `/v1/{name=shelves/*}/books/**:watch`, compiles them into
//! anchored matchers, extracts variable bindings from request paths and ranks
//! overlapping templates by specificity. Around it sit the gateway
//! collaborators that turn a configuration into per-request decisions: route
//! table, JWT requirements, backend routing, CORS and the service-control call
//! policy.
//!
//! # Quick Example
//! ```no_run
//! use std::sync::Arc;
//!
//! use apiproxy::{GatewayService, config::GatewayConfig};
//! use http::Method;
//!
//! # #[tokio::main] async fn main() -> eyre::Result<()> {
//! let cfg: GatewayConfig = apiproxy::config::loader::load_config("apiproxy.toml").await?;
//! let gateway = GatewayService::new(Arc::new(cfg))?;
//! if let Some(decision) = gateway.decide(&Method::GET, "/v1/shelves/1/books/2") {
//!     println!("{} {}", decision.selector, decision.bindings);
//! }
//! # Ok(()) }
//! ```
//!
//! # Architecture
//! The crate separates **ports** (traits) from **adapters** (implementations)
//! while keeping the matching engine and routing logic inside `core`, which
//! performs no I/O.
//!
//! # Error Handling
//! Library errors are `thiserror` enums ([`core::ParseError`],
//! [`config::ValidationError`], ...). Loading and the binary use
//! `eyre::Result<T>` with context attached via `WrapErr`.
//!
//! # Concurrency
//! Compiled matchers and snapshots are immutable and shared through `Arc`;
//! configuration reloads publish a new snapshot through `arc_swap::ArcSwap`.
pub mod config;
pub mod ports;
pub mod tracing_setup;
pub mod utils;

pub mod adapters;
pub mod core;

pub use crate::{
    adapters::{FileConfigProvider, HttpHandler},
    core::{
        GatewayService, GatewaySnapshot, RouteDecision,
        httppattern::{Bindings, PathMatcher, Template, wildcard_pattern_for},
    },
    utils::GracefulShutdown,
};
