//! REST API client module for the HR backend.
//!
//! - `HttpAuthBackend`: login and refresh against `/api/auth`
//! - `ApiClient`: employee, attendance, leave, payroll and profile endpoints,
//!   all sent through the session's `AuthenticatedRequestGate`

pub mod auth;
pub mod client;
pub mod error;

#[cfg(test)]
pub(crate) mod test_server;

pub use auth::HttpAuthBackend;
pub use client::{http_client, ApiClient, REQUEST_TIMEOUT_SECS};
pub use error::ApiError;
