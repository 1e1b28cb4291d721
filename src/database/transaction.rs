use crate::database::error::DatabaseError;
use sqlx::Transaction as SqlxTransaction;
use sqlx::{PgPool, Postgres};
use tracing::{debug, error as log_error};

/// Database transaction wrapper for atomic settlement scopes.
///
/// The settlement path needs an explicit two-phase shape: mutate the payment
/// row, commit, and only then propagate any adapter error to the caller. An
/// owned wrapper with explicit `commit`/`rollback` keeps that sequence
/// visible at the call site.
pub struct DatabaseTransaction {
    transaction: Option<SqlxTransaction<'static, Postgres>>,
}

impl DatabaseTransaction {
    /// Begin a new transaction
    pub async fn begin(pool: &PgPool) -> Result<Self, DatabaseError> {
        debug!("Beginning database transaction");

        let transaction = pool.begin().await.map_err(|e| {
            log_error!("Failed to begin transaction: {}", e);
            DatabaseError::from_sqlx(e)
        })?;

        Ok(Self {
            transaction: Some(transaction),
        })
    }

    /// Commit the transaction
    pub async fn commit(mut self) -> Result<(), DatabaseError> {
        if let Some(tx) = self.transaction.take() {
            debug!("Committing transaction");

            tx.commit().await.map_err(|e| {
                log_error!("Failed to commit transaction: {}", e);
                DatabaseError::from_sqlx(e)
            })?;

            Ok(())
        } else {
            Err(DatabaseError::Transaction {
                message: "Transaction already completed".to_string(),
            })
        }
    }

    /// Rollback the transaction
    pub async fn rollback(mut self) -> Result<(), DatabaseError> {
        if let Some(tx) = self.transaction.take() {
            debug!("Rolling back transaction");

            tx.rollback().await.map_err(|e| {
                log_error!("Failed to rollback transaction: {}", e);
                DatabaseError::from_sqlx(e)
            })?;

            Ok(())
        } else {
            Err(DatabaseError::Transaction {
                message: "Transaction already completed".to_string(),
            })
        }
    }

    /// Get a mutable reference to the transaction for executing queries
    pub fn tx_mut(&mut self) -> &mut SqlxTransaction<'static, Postgres> {
        self.transaction
            .as_mut()
            .expect("Transaction was already completed")
    }
}
