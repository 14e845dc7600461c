//! Engine error types.

use thiserror::Error;

use stack_core::FailureClass;
use stack_types::{LogicalId, ValidationError};

use crate::provider::ProviderError;

/// Errors raised while provisioning a stack or running an experiment.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A reference could not be resolved to a live resource.
    #[error("graph resolution failed: {0}")]
    GraphResolution(String),

    /// The execution role lacks a permission or cannot be assumed.
    #[error("not authorized: {0}")]
    Authorization(String),

    /// Live state differs from what was provisioned.
    #[error("provisioning drift on {id}: {detail}")]
    ProvisioningDrift {
        /// The drifted resource.
        id: LogicalId,
        /// What differs.
        detail: String,
    },

    /// One or more resources failed to apply.
    #[error("apply failed for {}", join(.failed))]
    ApplyFailed {
        /// Resources that failed.
        failed: Vec<LogicalId>,
    },

    /// The declaration is invalid.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Any other provider error.
    #[error("provider error: {0}")]
    Provider(ProviderError),

    /// The state file could not be read or written.
    #[error("state file error: {0}")]
    State(#[from] std::io::Error),

    /// The state file is corrupt.
    #[error("state file is not valid JSON: {0}")]
    StateFormat(#[from] serde_json::Error),
}

fn join(ids: &[LogicalId]) -> String {
    ids.iter()
        .map(|id| id.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

impl From<ProviderError> for EngineError {
    fn from(error: ProviderError) -> Self {
        match error {
            ProviderError::AccessDenied { .. } => EngineError::Authorization(error.to_string()),
            ProviderError::UnresolvedReference { .. } | ProviderError::NotFound { .. } => {
                EngineError::GraphResolution(error.to_string())
            }
            other => EngineError::Provider(other),
        }
    }
}

impl EngineError {
    /// Failure class reported by an experiment run.
    pub fn class(&self) -> FailureClass {
        match self {
            EngineError::GraphResolution(_) | EngineError::Validation(_) => {
                FailureClass::GraphResolution
            }
            EngineError::Authorization(_) => FailureClass::Authorization,
            _ => FailureClass::Execution,
        }
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
