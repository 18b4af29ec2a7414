//! Session token lifecycle.
//!
//! This module provides:
//! - `TokenStore`: durable holder of the current `TokenPair`
//! - `read_unverified_claims`: payload decoding for expiry hints (no verification)
//! - `RefreshScheduler`: proactive renewal shortly before expiry
//! - `AuthenticatedRequestGate`: one reactive refresh-and-retry on 401
//! - `SessionController`: the only place the session changes
//!
//! Every refresh trigger shares a single in-flight refresh call, so rotating
//! refresh tokens are never spent twice.

pub mod backend;
pub mod claims;
pub mod controller;
pub mod error;
pub mod gate;
pub mod scheduler;
pub mod store;
pub mod tokens;

#[cfg(test)]
pub(crate) mod testing;

pub use backend::AuthBackend;
pub use claims::{read_unverified_claims, UnverifiedClaims};
pub use controller::{RefreshOutcome, SessionConfig, SessionController};
pub use error::{LoginError, RefreshError};
pub use gate::{AuthenticatedRequestGate, HasStatus};
pub use scheduler::{refresh_delay, RefreshScheduler};
pub use store::{FileBackend, KeyringBackend, TokenPersistence, TokenStore};
pub use tokens::{Session, TokenPair};
