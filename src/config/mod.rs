//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::client::connection::ReconnectPolicy;
use crate::util::rate_limit::LINE_RATE_LIMIT;

/// Server configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Game (line protocol) listener address
    pub game_addr: SocketAddr,
    /// Health endpoint address
    pub http_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Time players have to submit a move once matched
    pub round_deadline: Duration,
    /// Time a fresh connection has to send its name
    pub handshake_timeout: Duration,
    /// Lines per second accepted from one connection
    pub max_line_rate: u32,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Hosting platforms provide PORT, fall back to GAME_ADDR or default
        let game_addr = match lookup("PORT") {
            Some(port) => format!("0.0.0.0:{}", port),
            None => lookup("GAME_ADDR").unwrap_or_else(|| "0.0.0.0:50000".to_string()),
        };
        let http_addr = lookup("HTTP_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string());

        let round_deadline_secs: u64 = parse_or(&lookup, "ROUND_DEADLINE_SECS", 59)?;
        if round_deadline_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "ROUND_DEADLINE_SECS",
                value: "0".to_string(),
            });
        }

        Ok(Self {
            game_addr: game_addr.parse().map_err(|_| ConfigError::InvalidAddress)?,
            http_addr: http_addr.parse().map_err(|_| ConfigError::InvalidAddress)?,

            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),

            round_deadline: Duration::from_secs(round_deadline_secs),
            handshake_timeout: Duration::from_secs(parse_or(&lookup, "HANDSHAKE_TIMEOUT_SECS", 30)?),
            max_line_rate: parse_or(&lookup, "MAX_LINE_RATE", LINE_RATE_LIMIT)?,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            game_addr: SocketAddr::from(([0, 0, 0, 0], 50000)),
            http_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            log_level: "info".to_string(),
            round_deadline: Duration::from_secs(59),
            handshake_timeout: Duration::from_secs(30),
            max_line_rate: LINE_RATE_LIMIT,
        }
    }
}

/// Terminal client configuration
#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub server_host: String,
    pub server_port: u16,
    /// Display name; prompted for when absent
    pub player_name: Option<String>,
    pub log_level: String,
    pub reconnect_attempts: u32,
    pub reconnect_delay: Duration,
    /// Round length shown to the player; should match the server's deadline
    pub round_secs: u64,
}

impl ClientConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let reconnect_attempts: u32 = parse_or(&lookup, "RECONNECT_ATTEMPTS", 3)?;
        if reconnect_attempts == 0 {
            return Err(ConfigError::Invalid {
                key: "RECONNECT_ATTEMPTS",
                value: "0".to_string(),
            });
        }

        Ok(Self {
            server_host: lookup("GAME_SERVER_HOST").unwrap_or_else(|| "localhost".to_string()),
            server_port: parse_or(&lookup, "GAME_SERVER_PORT", 50000)?,
            player_name: lookup("PLAYER_NAME"),
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "warn".to_string()),
            reconnect_attempts,
            reconnect_delay: Duration::from_millis(parse_or(&lookup, "RECONNECT_DELAY_MS", 2000)?),
            round_secs: parse_or(&lookup, "ROUND_DEADLINE_SECS", 59)?,
        })
    }

    /// `host:port` as passed to the TCP connector
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            max_attempts: self.reconnect_attempts,
            delay: self.reconnect_delay,
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
        None => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },

    #[error("Invalid server address format")]
    InvalidAddress,
}
