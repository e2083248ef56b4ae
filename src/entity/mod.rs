//! Sea-ORM entity models backing the portal.
//!
//! Three tables make up the schema: `users` for local accounts,
//! `access_tokens` for the long-lived sign-on tokens owned by users, and
//! `sessions` for the cookie-session records managed by `DbSessionStore`.
//! The corresponding migrations live in [`crate::migration`].

/// Local user accounts.
pub mod user;

/// Long-lived access tokens redeemable for a session.
pub mod access_token;

/// Cookie-session records for the tower-sessions store.
pub mod session;
