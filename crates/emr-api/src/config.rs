//! Process configuration from the environment.

use std::net::SocketAddr;

use thiserror::Error;

pub const DEFAULT_DATABASE_PATH: &str = "emr.db";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";
pub const DEFAULT_EVENT_BUFFER: usize = 256;

/// Path value that selects an in-memory store.
pub const IN_MEMORY: &str = ":memory:";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// SQLite file, or `:memory:`
    pub database_path: String,
    pub bind_addr: SocketAddr,
    /// Events kept for slow SSE subscribers before they start missing some
    pub event_buffer: usize,
}

impl Config {
    /// Load `.env` if present, then read `EMR_*` variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let database_path = lookup("EMR_DATABASE_PATH")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_DATABASE_PATH.to_string());

        let raw_addr = lookup("EMR_BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = raw_addr.parse().map_err(|_| ConfigError::Invalid {
            name: "EMR_BIND_ADDR",
            value: raw_addr.clone(),
        })?;

        let event_buffer = match lookup("EMR_EVENT_BUFFER") {
            Some(raw) => match raw.parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(ConfigError::Invalid {
                        name: "EMR_EVENT_BUFFER",
                        value: raw,
                    })
                }
            },
            None => DEFAULT_EVENT_BUFFER,
        };

        Ok(Self {
            database_path,
            bind_addr,
            event_buffer,
        })
    }

    pub fn is_in_memory(&self) -> bool {
        self.database_path == IN_MEMORY
    }
}
