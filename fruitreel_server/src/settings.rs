//! Service settings, read once from the environment at startup.

use anyhow::{bail, Context};
use std::str::FromStr;
use tracing::warn;

use crate::auth::hash_password;

/// Password accepted when neither `ADMIN_PASSWORD` nor `ADMIN_PASSWORD_HASH` is set.
pub const DEFAULT_ADMIN_PASSWORD: &str = "admin123";
const DEFAULT_TOKEN_SECRET: &str = "change-me-in-production";

#[derive(Debug, Clone)]
pub struct Settings {
    pub bind: String,
    pub database_url: String,
    pub initial_credits: i64,
    pub min_bet: i64,
    pub max_bet: i64,
    pub num_reels: usize,
    pub max_simulation_spins: u64,
    pub session_timeout_hours: i64,
    pub admin_username: String,
    /// Salted SHA-256 hex, see [`hash_password`].
    pub admin_password_hash: String,
    pub token_secret: String,
    pub token_expiration_hours: i64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".into(),
            database_url: "sqlite://fruitreel.db".into(),
            initial_credits: 1000,
            min_bet: 1,
            max_bet: 100,
            num_reels: 3,
            max_simulation_spins: 1_000_000,
            session_timeout_hours: 24,
            admin_username: "admin".into(),
            admin_password_hash: hash_password(DEFAULT_ADMIN_PASSWORD),
            token_secret: DEFAULT_TOKEN_SECRET.into(),
            token_expiration_hours: 24,
        }
    }
}

impl Settings {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup; unset keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let d = Settings::default();
        let admin_password_hash = match (lookup("ADMIN_PASSWORD_HASH"), lookup("ADMIN_PASSWORD")) {
            (Some(hash), _) => hash.to_lowercase(),
            (None, Some(password)) => hash_password(&password),
            (None, None) => {
                warn!("no admin password configured, using the built-in default");
                d.admin_password_hash
            }
        };
        let token_secret = lookup("TOKEN_SECRET").unwrap_or_else(|| {
            warn!("TOKEN_SECRET not set, admin tokens use a well-known secret");
            d.token_secret
        });
        let settings = Settings {
            bind: lookup("BIND").unwrap_or(d.bind),
            database_url: lookup("DATABASE_URL").unwrap_or(d.database_url),
            initial_credits: parse(&lookup, "INITIAL_CREDITS", d.initial_credits)?,
            min_bet: parse(&lookup, "MIN_BET_AMOUNT", d.min_bet)?,
            max_bet: parse(&lookup, "MAX_BET_AMOUNT", d.max_bet)?,
            num_reels: parse(&lookup, "NUM_REELS", d.num_reels)?,
            max_simulation_spins: parse(&lookup, "MAX_SIMULATION_SPINS", d.max_simulation_spins)?,
            session_timeout_hours: parse(&lookup, "SESSION_TIMEOUT_HOURS", d.session_timeout_hours)?,
            admin_username: lookup("ADMIN_USERNAME").unwrap_or(d.admin_username),
            admin_password_hash,
            token_secret,
            token_expiration_hours: parse(&lookup, "TOKEN_EXPIRATION_HOURS", d.token_expiration_hours)?,
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.initial_credits < 0 {
            bail!("INITIAL_CREDITS must not be negative");
        }
        if self.min_bet < 1 || self.max_bet < self.min_bet {
            bail!(
                "bet range [{}, {}] is invalid, need 1 <= MIN_BET_AMOUNT <= MAX_BET_AMOUNT",
                self.min_bet,
                self.max_bet
            );
        }
        if !(1..=10).contains(&self.num_reels) {
            bail!("NUM_REELS must be between 1 and 10, got {}", self.num_reels);
        }
        if self.max_simulation_spins < 100 {
            bail!("MAX_SIMULATION_SPINS must be at least 100");
        }
        if self.session_timeout_hours <= 0 || self.token_expiration_hours <= 0 {
            bail!("SESSION_TIMEOUT_HOURS and TOKEN_EXPIRATION_HOURS must be positive");
        }
        if self.token_secret.is_empty() {
            bail!("TOKEN_SECRET must not be empty");
        }
        Ok(())
    }
}

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} has an invalid value: {raw:?}")),
        None => Ok(default),
    }
}
