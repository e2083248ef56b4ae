//! # Vestibule
//!
//! A small self-hosted accounts service: local registration and sign-in,
//! cookie sessions stored in the database, and long-lived access tokens
//! that can be exchanged for a session through a single sign-on link.
//!
//! The pieces fit together like this:
//!
//! - [`entity`] holds the Sea-ORM models for users, access tokens, and
//!   sessions, with [`migration`] providing the matching schema.
//! - [`accounts`] and [`tokens`] are the storage-facing services; both talk
//!   to the database through Sea-ORM and know nothing about HTTP.
//! - [`session_store`] backs `tower-sessions` with the sessions table so a
//!   restart does not sign everyone out.
//! - [`web`] wires the services into an Axum router behind a session layer
//!   and an authentication gate.
//!
//! Binary startup (configuration, migrations, the listener) lives in
//! `main.rs`.

pub mod accounts;
pub mod config;
pub mod entity;
pub mod error;
pub mod migration;
pub mod session_store;
pub mod tokens;
pub mod web;

pub use accounts::UserStore;
pub use config::Config;
pub use error::{AppError, Result};
pub use migration::Migrator;
pub use session_store::DbSessionStore;
pub use tokens::TokenStore;
