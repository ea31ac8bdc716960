//! REST API client module for the BookVault library service.
//!
//! This module provides the `ApiClient` for the catalog, issue-record and
//! account endpoints. Authenticated requests carry the session's bearer
//! credential; expired or rejected credentials end the session through the
//! `SessionController` before the caller sees the error.

pub mod client;
pub mod error;

pub use client::ApiClient;
pub use error::ApiError;
