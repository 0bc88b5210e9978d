//! # Broker Configuration
//!
//! Identity of the single service and plan offered in the catalog.

use super::env_var_or_default;
use crate::constants::*;
use serde_json::Value;
use tracing::warn;

#[derive(Debug, Clone, PartialEq)]
pub struct BrokerConfig {
    pub service_id: String,
    pub service_name: String,
    pub service_description: String,
    pub plan_id: String,
    pub plan_name: String,
    pub plan_description: String,
    /// JSON Schema for create and update parameters; unset means any object is accepted
    pub parameters_schema: Option<Value>,
    /// Artificial latency of the demo provisioning backend (milliseconds)
    pub demo_backend_delay_ms: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            service_id: DEFAULT_SERVICE_ID.to_string(),
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            service_description: DEFAULT_SERVICE_DESCRIPTION.to_string(),
            plan_id: DEFAULT_PLAN_ID.to_string(),
            plan_name: DEFAULT_PLAN_NAME.to_string(),
            plan_description: DEFAULT_PLAN_DESCRIPTION.to_string(),
            parameters_schema: None,
            demo_backend_delay_ms: DEFAULT_DEMO_BACKEND_DELAY_MS,
        }
    }
}

impl BrokerConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self {
            service_id: env_var_or_default("BROKER_SERVICE_ID", DEFAULT_SERVICE_ID.to_string()),
            service_name: env_var_or_default(
                "BROKER_SERVICE_NAME",
                DEFAULT_SERVICE_NAME.to_string(),
            ),
            service_description: env_var_or_default(
                "BROKER_SERVICE_DESCRIPTION",
                DEFAULT_SERVICE_DESCRIPTION.to_string(),
            ),
            plan_id: env_var_or_default("BROKER_PLAN_ID", DEFAULT_PLAN_ID.to_string()),
            plan_name: env_var_or_default("BROKER_PLAN_NAME", DEFAULT_PLAN_NAME.to_string()),
            plan_description: env_var_or_default(
                "BROKER_PLAN_DESCRIPTION",
                DEFAULT_PLAN_DESCRIPTION.to_string(),
            ),
            parameters_schema: parameters_schema_from_env(),
            demo_backend_delay_ms: env_var_or_default(
                "DEMO_BACKEND_DELAY_MS",
                DEFAULT_DEMO_BACKEND_DELAY_MS,
            ),
        }
    }
}

/// `BROKER_PARAMETERS_SCHEMA` holds the schema document as JSON text
fn parameters_schema_from_env() -> Option<Value> {
    let raw = std::env::var("BROKER_PARAMETERS_SCHEMA").ok()?;
    parse_schema(&raw)
}

fn parse_schema(raw: &str) -> Option<Value> {
    match serde_json::from_str(raw) {
        Ok(schema) => Some(schema),
        Err(e) => {
            warn!("Ignoring BROKER_PARAMETERS_SCHEMA, not valid JSON: {}", e);
            None
        }
    }
}
