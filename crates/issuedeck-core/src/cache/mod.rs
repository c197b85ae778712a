//! Two-tier cache shared by the request pipeline and the enumeration engine.
//!
//! - **Ephemeral** entries live for the process lifetime only.
//! - **Persisted** entries are loaded once from a JSON document on first
//!   access and rewritten in the background after every mutation.
//!
//! The tiers are separate namespaces. A [`CacheStore`] is created by the
//! application root and shared by `Arc` with every component that needs it.

mod key;
mod persist;
mod store;

pub use key::CacheKey;
pub use store::{CacheStore, Tier};
