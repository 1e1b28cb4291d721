//! Settlement error taxonomy.

use crate::database::error::DatabaseError;
use crate::payments::error::ProviderError;
use uuid::Uuid;

/// Errors surfaced by the settlement orchestrator.
#[derive(Debug, thiserror::Error)]
pub enum SettlementError {
    /// Caller-correctable input problem, tagged with the offending field.
    #[error("validation failed on {field}: {message}")]
    Validation { field: &'static str, message: String },

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },

    /// Both reconciliation paths raced on the same payment and neither write
    /// reached a terminal state; the caller should retry.
    #[error("concurrent update conflict on payment {payment_id}")]
    StateConflict { payment_id: Uuid },
}

impl SettlementError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        SettlementError::Validation {
            field,
            message: message.into(),
        }
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        SettlementError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

pub type SettlementResult<T> = Result<T, SettlementError>;
