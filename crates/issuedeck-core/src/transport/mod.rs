//! Request transport: one external process per request.
//!
//! - [`Request`] / [`Method`] describe what to send
//! - [`Auth`] builds the authorization header from configuration
//! - [`CurlExecutor`] runs the request and normalizes the outcome
//! - [`Transport`] is the seam the enumeration engine and client are written against

mod auth;
mod executor;
mod request;
mod response;

pub use auth::Auth;
pub use executor::{CurlExecutor, Transport};
pub use request::{with_query, Method, Request};
pub use response::protocol_error;
