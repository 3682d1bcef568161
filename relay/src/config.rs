//! Relay configuration parsed from environment variables.
//!
//! Optional:
//! - `PORT`: listen port, default 3000
//! - `RELAY_BIND`: listen address, default `0.0.0.0`
//! - `RELAY_CLIENT_BUFFER`: per-client outbound queue depth, default 256

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use crate::error::ErrorCode;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_BIND: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);
pub const DEFAULT_CLIENT_BUFFER: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid {var}: {value:?}")]
    Invalid { var: &'static str, value: String },
}

impl ErrorCode for ConfigError {
    fn error_code(&self) -> &'static str {
        "E_CONFIG"
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    pub bind: IpAddr,
    pub port: u16,
    /// Messages queued per client before the relay disconnects it.
    pub client_buffer: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self { bind: DEFAULT_BIND, port: DEFAULT_PORT, client_buffer: DEFAULT_CLIENT_BUFFER }
    }
}

impl RelayConfig {
    /// # Errors
    ///
    /// Returns `Invalid` naming the first variable that does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup, so tests need not touch the process
    /// environment.
    ///
    /// # Errors
    ///
    /// Returns `Invalid` naming the first variable that does not parse.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let client_buffer = env_parse(&lookup, "RELAY_CLIENT_BUFFER", DEFAULT_CLIENT_BUFFER)?;
        if client_buffer == 0 {
            return Err(ConfigError::Invalid { var: "RELAY_CLIENT_BUFFER", value: "0".into() });
        }
        Ok(Self {
            bind: env_parse(&lookup, "RELAY_BIND", DEFAULT_BIND)?,
            port: env_parse(&lookup, "PORT", DEFAULT_PORT)?,
            client_buffer,
        })
    }

    #[must_use]
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }
}

fn env_parse<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(var) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid { var, value: raw }),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
