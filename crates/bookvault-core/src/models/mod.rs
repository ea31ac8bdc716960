//! Data models for BookVault entities.
//!
//! This module contains the data structures exchanged with the library API:
//!
//! - `LoginRequest`, `LoginResponse`, `RegisterRequest`, `User`: accounts
//! - `Book`, `BookDto`: catalog entries and the create/update payload
//! - `IssueRecord`: a single borrow of a book by a user

pub mod account;
pub mod book;
pub mod issue;

pub use account::{LoginRequest, LoginResponse, RegisterRequest, User};
pub use book::{Book, BookDto};
pub use issue::IssueRecord;
