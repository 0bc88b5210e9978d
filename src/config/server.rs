//! # Server Configuration
//!
//! HTTP server settings loaded from environment variables.

use super::env_var_or_default;
use crate::constants::DEFAULT_HTTP_PORT;

/// HTTP server configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Port serving the broker API, metrics and health probes
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_HTTP_PORT,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self {
            port: env_var_or_default("HTTP_PORT", DEFAULT_HTTP_PORT),
        }
    }
}
