//! JSON Schema validation of instance parameters.

use super::BrokerError;
use jsonschema::Validator;
use serde_json::Value;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("invalid parameters schema: {0}")]
pub struct SchemaError(String);

/// Compiled parameters schema, published on the plan and enforced on create and update
pub struct ParametersSchema {
    document: Value,
    validator: Validator,
}

impl fmt::Debug for ParametersSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParametersSchema")
            .field("document", &self.document)
            .finish_non_exhaustive()
    }
}

impl ParametersSchema {
    pub fn compile(document: Value) -> Result<Self, SchemaError> {
        let validator =
            jsonschema::validator_for(&document).map_err(|e| SchemaError(e.to_string()))?;
        Ok(Self {
            document,
            validator,
        })
    }

    pub fn document(&self) -> &Value {
        &self.document
    }

    /// Every violation is reported in one `BadRequest`
    pub fn validate(&self, parameters: &Value) -> Result<(), BrokerError> {
        let violations: Vec<String> = self
            .validator
            .iter_errors(parameters)
            .map(|error| error.to_string())
            .collect();
        if violations.is_empty() {
            return Ok(());
        }
        Err(BrokerError::BadRequest(format!(
            "could not validate parameters: {}",
            violations.join(", ")
        )))
    }
}
