//! Core library for the MBF HR client.
//!
//! The heart of the crate is [`auth`]: a session token lifecycle manager that
//! owns the access/refresh pair, renews it before it expires, recovers from a
//! 401 on any in-flight request, and collapses to a clean signed-out state when
//! renewal is impossible. [`api`] layers the HR endpoints on top of it.

pub mod api;
pub mod auth;
pub mod config;
pub mod models;

pub use api::{ApiClient, ApiError, HttpAuthBackend};
pub use auth::{
    AuthenticatedRequestGate, RefreshOutcome, Session, SessionController, TokenPair, TokenStore,
};
pub use config::Config;
