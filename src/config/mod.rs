//! # Configuration
//!
//! Process configuration loaded from environment variables.
//!
//! All configuration has sensible defaults and can be overridden via environment variables.
//! Environment variables are usually populated from a ConfigMap using `envFrom` in the deployment.

mod broker;
mod controller;
mod server;

pub use broker::BrokerConfig;
pub use controller::{ControllerConfig, QueueConfig};
pub use server::ServerConfig;

/// Complete process configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub controller: ControllerConfig,
    pub server: ServerConfig,
    pub broker: BrokerConfig,
}

/// Load configuration from environment variables with defaults
pub fn load_config() -> Config {
    Config {
        controller: ControllerConfig::from_env(),
        server: ServerConfig::from_env(),
        broker: BrokerConfig::from_env(),
    }
}

/// Read environment variable or return default value
pub(crate) fn env_var_or_default<T: std::str::FromStr>(key: &str, default: T) -> T
where
    <T as std::str::FromStr>::Err: std::fmt::Debug,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_var_or_default_falls_back_on_missing_or_invalid() {
        assert_eq!(
            env_var_or_default("BROKERNETES_TEST_UNSET_VARIABLE", 7u32),
            7
        );

        std::env::set_var("BROKERNETES_TEST_INVALID_NUMBER", "not-a-number");
        assert_eq!(env_var_or_default("BROKERNETES_TEST_INVALID_NUMBER", 3u64), 3);

        std::env::set_var("BROKERNETES_TEST_VALID_NUMBER", "42");
        assert_eq!(env_var_or_default("BROKERNETES_TEST_VALID_NUMBER", 3u64), 42);
    }
}
