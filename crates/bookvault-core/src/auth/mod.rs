//! Authentication module for managing the client-side session.
//!
//! This module provides:
//! - `token`: unverified decoding of bearer credentials and expiry checks
//! - `store`: the two persisted session entries (credential + user snapshot)
//! - `controller`: the session lifecycle (startup, login, logout, expiry)
//! - `guard`: route access decisions derived from the session state
//!
//! Only `SessionController` writes the session state; everything else reads
//! it or subscribes to its changes.

pub mod clock;
pub mod controller;
pub mod guard;
pub mod session;
pub mod store;
pub mod token;

pub use clock::{Clock, ManualClock, SystemClock};
pub use controller::{
    Authenticator, Authorization, ForcedLogout, SessionController, DEFAULT_CHECK_INTERVAL,
    SESSION_EXPIRED_REASON,
};
pub use guard::{Access, Requirement, Route};
pub use session::{Role, SessionPhase, SessionState, SessionUser, ROLE_ADMIN, ROLE_USER};
pub use store::SessionStore;
pub use token::{Claims, Credential, TokenInfo};
