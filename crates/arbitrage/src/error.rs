//! Execution-side error taxonomy.

use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use dutchbook_core::{OpportunityStatus, StoreError};

/// Errors surfaced by the execution coordinator.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// No such opportunity.
    #[error("opportunity not found: {0}")]
    NotFound(Uuid),

    /// The opportunity is not in an executable state.
    #[error("opportunity not executable in status {status}")]
    NotExecutable {
        /// Status found instead of `detected`.
        status: OpportunityStatus,
    },

    /// Another execution for this opportunity is already in flight.
    #[error("duplicate execution for opportunity {0}")]
    DuplicateExecution(Uuid),

    /// The recommended size breaches the position cap.
    #[error("size {size} exceeds position cap {max}")]
    SizeLimitExceeded {
        /// Requested size.
        size: Decimal,
        /// Configured cap.
        max: Decimal,
    },

    /// A leg price fell outside `[0, 1]`.
    #[error("leg price {0} outside [0, 1]")]
    InvalidPrice(Decimal),

    /// The canonical mapping lacks one venue's market id.
    #[error("no tradeable mapping for canonical market {0}")]
    MappingMissing(String),

    /// One or both legs failed; compensation was attempted and recorded.
    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    /// Persistence failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ExecutionError {
    /// Stable machine-readable code for boundary surfaces.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::NotExecutable { .. } => "NOT_EXECUTABLE",
            Self::DuplicateExecution(_) => "DUPLICATE_EXECUTION",
            Self::SizeLimitExceeded { .. } => "SIZE_LIMIT_EXCEEDED",
            Self::InvalidPrice(_) => "INVALID_PRICE",
            Self::MappingMissing(_) => "MAPPING_MISSING",
            Self::ExecutionFailed(_) => "EXECUTION_FAILED",
            Self::Store(_) => "DATA_STORE_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(
            ExecutionError::DuplicateExecution(Uuid::new_v4()).code(),
            "DUPLICATE_EXECUTION"
        );
        assert_eq!(
            ExecutionError::ExecutionFailed("leg rejected".into()).code(),
            "EXECUTION_FAILED"
        );
        assert_eq!(
            ExecutionError::NotExecutable {
                status: OpportunityStatus::Executed
            }
            .code(),
            "NOT_EXECUTABLE"
        );
    }

    #[test]
    fn test_display_includes_status() {
        let err = ExecutionError::NotExecutable {
            status: OpportunityStatus::Expired,
        };
        assert!(err.to_string().contains("expired"));
    }
}
