//! Runtime configuration from the environment (and `.env` when present).

use std::env;
use std::str::FromStr;

use crate::{EcommerceError, Result};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// Postgres URL. Without one the service runs on the in-memory store.
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub nats_url: Option<String>,
    pub token_ttl_secs: i64,
    pub admin: Option<AdminAccount>,
}

/// Staff account created at startup when absent.
#[derive(Debug, Clone)]
pub struct AdminAccount {
    pub username: String,
    pub email: String,
    pub password: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8083,
            database_url: None,
            database_max_connections: 10,
            nats_url: None,
            token_ttl_secs: 24 * 60 * 60,
            admin: None,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let admin = match (get("ADMIN_USERNAME"), get("ADMIN_PASSWORD")) {
            (Some(username), Some(password)) => Some(AdminAccount {
                email: get("ADMIN_EMAIL").unwrap_or_else(|| format!("{}@localhost", username)),
                username,
                password,
            }),
            (None, None) => None,
            _ => return Err(EcommerceError::Config("ADMIN_USERNAME and ADMIN_PASSWORD must be set together".into())),
        };

        let config = Self {
            host: get("HOST").unwrap_or(defaults.host),
            port: parse(&get, "PORT", defaults.port)?,
            database_url: get("DATABASE_URL"),
            database_max_connections: parse(&get, "DATABASE_MAX_CONNECTIONS", defaults.database_max_connections)?,
            nats_url: get("NATS_URL"),
            token_ttl_secs: parse(&get, "TOKEN_TTL_SECS", defaults.token_ttl_secs)?,
            admin,
        };
        if config.token_ttl_secs <= 0 {
            return Err(EcommerceError::Config("TOKEN_TTL_SECS must be positive".into()));
        }
        Ok(config)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse<T: FromStr>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|e| EcommerceError::Config(format!("invalid {} {:?}: {}", key, raw, e))),
    }
}
