use std::env;

use crate::error::{AppError, Result};

/// Runtime configuration, read once at startup.
///
/// Every knob has a default so a bare `cargo run` works against a local
/// SQLite file. Values come from the process environment (with `.env`
/// support in the binary via dotenvy).
#[derive(Debug, Clone)]
pub struct Config {
    /// sea-orm connection string.
    pub database_url: String,
    /// TCP port the server binds on `0.0.0.0`.
    pub port: u16,
    /// Whether the session cookie carries the `Secure` attribute.
    pub cookie_secure: bool,
    /// Sliding idle window for ordinary sessions, in minutes.
    pub session_idle_minutes: i64,
    /// Sliding window for "remember me" sessions, in days.
    pub remember_me_days: i64,
    /// Access-token lifetime, in days from issuance.
    pub token_validity_days: i64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite://vestibule.db?mode=rwc".to_string(),
            port: 3000,
            cookie_secure: false,
            session_idle_minutes: 60,
            remember_me_days: 30,
            token_validity_days: 365,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let defaults = Config::default();
        Ok(Config {
            database_url: env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            port: parse_var("PORT", defaults.port)?,
            cookie_secure: parse_var("COOKIE_SECURE", defaults.cookie_secure)?,
            session_idle_minutes: parse_var("SESSION_IDLE_MINUTES", defaults.session_idle_minutes)?,
            remember_me_days: parse_var("REMEMBER_ME_DAYS", defaults.remember_me_days)?,
            token_validity_days: parse_var("TOKEN_VALIDITY_DAYS", defaults.token_validity_days)?,
        })
    }

    /// The access-token lifetime as a duration.
    pub fn token_validity(&self) -> chrono::Duration {
        chrono::Duration::days(self.token_validity_days)
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| AppError::Config(format!("{name} is not a valid value: {raw}"))),
        Err(_) => Ok(default),
    }
}
