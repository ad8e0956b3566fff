//! # staffsec_core
//!
//! Core domain logic for StaffSec: credential storage, password hashing,
//! token issuance, the revocation cache and the access guard.

pub mod auth;
pub mod bootstrap;
pub mod models;
pub mod revocation;
pub mod store;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
