//! Core library for the BookVault library circulation client.
//!
//! This crate provides:
//! - `auth`: credential decoding, the persisted session store and the
//!   session lifecycle controller (startup, login, logout, forced logout)
//! - `api`: the HTTP resource layer that attaches the bearer credential and
//!   reports expired or rejected sessions back to the controller
//! - `models`: catalog, issue-record and account data structures
//! - `config`: application configuration

pub mod api;
pub mod auth;
pub mod config;
pub mod models;
