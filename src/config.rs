// src/config.rs

use std::env;
use std::net::SocketAddr;

use dotenvy::dotenv;

/// Fixed extra time after an attempt's nominal duration before submissions close.
pub const GRACE_PERIOD_MINUTES: i64 = 5;

/// Coins granted to every newly created user.
pub const SIGNUP_COINS: i64 = 1500;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

#[derive(Debug, Clone)]
pub struct Config {
    /// When absent the service runs on the in-memory adapters.
    pub database_url: Option<String>,
    pub bind_address: SocketAddr,
    pub jwt_secret: String,
    pub jwt_expiration: u64,
    pub rust_log: String,
    pub base_url: String,
    pub magic_link_expiry: u64,
    pub portal_session_ttl: u64,
    pub login_throttle: u64,
    pub razorpay: RazorpayConfig,
}

#[derive(Debug, Clone)]
pub struct RazorpayConfig {
    pub key_id: String,
    pub key_secret: String,
    pub webhook_secret: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL").ok();

        let bind_address = optional("BIND_ADDRESS", "0.0.0.0:3000")
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let jwt_secret = required("JWT_SECRET")?;
        let jwt_expiration = seconds("JWT_EXPIRATION", 7 * 24 * 60 * 60)?;

        let rust_log = optional("RUST_LOG", "info");
        let base_url = optional("BASE_URL", "http://localhost:5173");

        let magic_link_expiry = seconds("MAGIC_LINK_EXPIRY", 15 * 60)?;
        let portal_session_ttl = seconds("PORTAL_SESSION_TTL", 15 * 60)?;
        let login_throttle = seconds("LOGIN_THROTTLE", 60)?;

        let razorpay = RazorpayConfig {
            key_id: required("RZP_KEY_ID")?,
            key_secret: required("RZP_KEY_SECRET")?,
            webhook_secret: required("RZP_WEBHOOK_SECRET")?,
        };

        Ok(Self {
            database_url,
            bind_address,
            jwt_secret,
            jwt_expiration,
            rust_log,
            base_url,
            magic_link_expiry,
            portal_session_ttl,
            login_throttle,
            razorpay,
        })
    }
}

fn required(key: &str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::MissingVar(key.to_string()))
}

fn optional(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn seconds(key: &str, default: u64) -> Result<u64, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .parse::<u64>()
            .map_err(|e| ConfigError::InvalidValue(key.to_string(), e.to_string())),
        Err(_) => Ok(default),
    }
}
