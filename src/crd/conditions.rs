//! # Condition State Machine
//!
//! Lifecycle transitions for an instance and derivation of the human-facing status string.
//!
//! A valid instance has exactly one of `InProgress`, `Ready` or `Error` set to True.
//! `InProgress=True` is only ever written by the store when an operation is requested;
//! the controller only ever clears it through [`apply_outcome`].

use super::status::{Condition, ConditionStatus, ConditionType, OperationType, OsbInstanceStatus};
use std::fmt;
use thiserror::Error;

pub const REASON_OPERATION_REQUESTED: &str = "OperationRequested";
pub const REASON_OPERATION_FINISHED: &str = "OperationFinished";
pub const REASON_PROVISIONING_SUCCEEDED: &str = "ProvisioningSucceeded";
pub const REASON_PROVISIONING_FAILED: &str = "ProvisioningFailed";

/// Phase of the last requested operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationPhase {
    InProgress,
    Succeeded,
    Failed,
}

impl OperationPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            OperationPhase::InProgress => "InProgress",
            OperationPhase::Succeeded => "Succeeded",
            OperationPhase::Failed => "Failed",
        }
    }
}

/// Derived instance state, rendered as e.g. `CreateInProgress` or `DeleteFailed`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstanceState {
    pub operation: OperationType,
    pub phase: OperationPhase,
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&format!("{}{}", self.operation, self.phase.as_str()))
    }
}

/// The stored conditions do not describe a valid lifecycle state
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidStateError {
    #[error("{0} condition is not found")]
    MissingCondition(ConditionType),
    #[error("last operation type is not set")]
    MissingOperationType,
    #[error("invalid condition state: InProgress={in_progress}, Ready={ready}, Error={error}")]
    InvalidCombination {
        in_progress: bool,
        ready: bool,
        error: bool,
    },
}

/// Derive the status string from the last operation type and the three lifecycle conditions.
///
/// Exactly one of the conditions must be True; zero or several True conditions are rejected.
pub fn derive_state(status: &OsbInstanceStatus) -> Result<InstanceState, InvalidStateError> {
    let is_true = |r#type| {
        status
            .condition(r#type)
            .map(Condition::is_true)
            .ok_or(InvalidStateError::MissingCondition(r#type))
    };
    let error = is_true(ConditionType::Error)?;
    let in_progress = is_true(ConditionType::InProgress)?;
    let ready = is_true(ConditionType::Ready)?;

    let phase = match (error, ready, in_progress) {
        (true, false, false) => OperationPhase::Failed,
        (false, true, false) => OperationPhase::Succeeded,
        (false, false, true) => OperationPhase::InProgress,
        _ => {
            return Err(InvalidStateError::InvalidCombination {
                in_progress,
                ready,
                error,
            })
        }
    };

    let operation = status
        .last_operation_type
        .ok_or(InvalidStateError::MissingOperationType)?;

    Ok(InstanceState { operation, phase })
}

/// Record that `operation` was requested: InProgress=True, Ready=False, Error=False.
///
/// This is the sole entry point into "work is queued" and is written by the store.
pub fn mark_in_progress(status: &mut OsbInstanceStatus, operation: OperationType) -> bool {
    let mut changed = status.update_condition(
        Condition::new(ConditionType::InProgress, ConditionStatus::True)
            .with_reason(REASON_OPERATION_REQUESTED),
    );
    for r#type in [ConditionType::Ready, ConditionType::Error] {
        changed |= status.update_condition(Condition::new(r#type, ConditionStatus::False));
    }
    changed |= status.last_operation_type != Some(operation);
    status.last_operation_type = Some(operation);
    status.error = None;
    changed
}

/// Apply the outcome of a backend call for `operation`.
///
/// A backend error sets Error=True carrying the error text; success sets Ready=True.
/// InProgress is cleared either way. Returns whether any condition changed.
pub fn apply_outcome(
    status: &mut OsbInstanceStatus,
    operation: OperationType,
    backend_error: Option<&str>,
) -> bool {
    let failed = backend_error.is_some();
    let message = backend_error.map(str::to_string);

    let mut changed = status.update_condition(
        Condition::new(ConditionType::Error, ConditionStatus::from(failed))
            .with_reason(if failed {
                REASON_PROVISIONING_FAILED
            } else {
                REASON_OPERATION_FINISHED
            })
            .with_message(message.clone()),
    );
    changed |= status.update_condition(
        Condition::new(ConditionType::Ready, ConditionStatus::from(!failed)).with_reason(
            if failed {
                REASON_OPERATION_FINISHED
            } else {
                REASON_PROVISIONING_SUCCEEDED
            },
        ),
    );
    changed |= status.update_condition(
        Condition::new(ConditionType::InProgress, ConditionStatus::False)
            .with_reason(REASON_OPERATION_FINISHED),
    );

    status.last_operation_type = Some(operation);
    status.error = message;
    changed
}
