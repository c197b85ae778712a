//! issuedeck core - request pipeline for an issue-tracker REST API.
//!
//! This crate is the headless part of an editor integration. It provides:
//! - a transport that performs each request through an external HTTP tool
//!   and normalizes transport, decode and protocol failures into one error type
//! - a two-tier cache (process-lifetime and persisted JSON document)
//! - an enumerator that lists every assignable user despite the search
//!   endpoint's page ceiling, by breadth-first refinement of query prefixes
//!
//! # Example
//!
//! ```rust,ignore
//! use issuedeck_core::{CacheStore, TrackerClient, TrackerConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> issuedeck_core::Result<()> {
//!     let config = TrackerConfig::new("https://example.atlassian.net", "api-token")
//!         .with_email("me@example.com");
//!     let cache = Arc::new(CacheStore::open_default()?);
//!     let client = TrackerClient::new(config, cache)?;
//!
//!     let users = client.assignable_users(Some("PROJ"), None).await?;
//!     println!("{} assignable users", users.len());
//!     Ok(())
//! }
//! ```

pub mod adapter;
pub mod cache;
pub mod cancel;
pub mod client;
pub mod config;
pub mod continuation;
pub mod enumerate;
pub mod error;
pub mod paths;
pub mod transport;

pub use adapter::{adapter_for, ApiAdapter, SearchPage, V2Adapter, V3Adapter};
pub use cache::{CacheKey, CacheStore, Tier};
pub use cancel::CancellationToken;
pub use client::TrackerClient;
pub use config::{ApiVersion, EnumerationConfig, TrackerConfig};
pub use continuation::{deliver, spawn_with_continuation, Continuation};
pub use enumerate::AssignableEnumerator;
pub use error::{IssuedeckError, Result};
pub use transport::{Auth, CurlExecutor, Method, Request, Transport};
