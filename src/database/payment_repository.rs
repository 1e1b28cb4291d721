//! Payment entity and repository.
//!
//! A `Payment` is the durable record of one settlement attempt. Rows are
//! created inside the settlement transaction and mutated only by the
//! orchestrator; every status transition is guarded by an optimistic version
//! check so a verify poll and a webhook racing on the same payment cannot
//! produce a lost update. Payments are never deleted, only soft-deleted.

use crate::database::error::DatabaseError;
use crate::payments::types::{PaymentMethod, PaymentStatus};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

const PAYMENT_COLUMNS: &str = "id, user_id, payable_type, payable_id, amount, currency_code, \
     provider, provider_reference, provider_payment_method, status, payment_method, \
     phone_number, account_number, initiated_at, completed_at, failed_at, \
     provider_response, metadata, failure_reason, failure_message, is_deleted, \
     version, created_at, updated_at";

/// One attempted transfer of money for a payable entity.
#[derive(Debug, Clone, FromRow)]
pub struct Payment {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Polymorphic payable reference; currently always "payment_request".
    pub payable_type: String,
    pub payable_id: Uuid,
    pub amount: Decimal,
    pub currency_code: String,
    pub provider: String,
    /// Adapter-assigned external id. Set at most once, never overwritten.
    pub provider_reference: Option<String>,
    pub provider_payment_method: Option<String>,
    pub status: PaymentStatus,
    pub payment_method: PaymentMethod,
    pub phone_number: Option<String>,
    pub account_number: Option<String>,
    pub initiated_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub provider_response: serde_json::Value,
    pub metadata: serde_json::Value,
    pub failure_reason: Option<String>,
    pub failure_message: Option<String>,
    pub is_deleted: bool,
    /// Optimistic lock counter, bumped by every status transition.
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields the orchestrator supplies when creating a payment row.
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub user_id: Uuid,
    pub payable_type: String,
    pub payable_id: Uuid,
    pub amount: Decimal,
    pub currency_code: String,
    pub provider: String,
    pub payment_method: PaymentMethod,
    pub phone_number: Option<String>,
    pub account_number: Option<String>,
    pub metadata: serde_json::Value,
}

/// Repository for settlement attempt records
#[derive(Clone)]
pub struct PaymentRepository {
    pool: PgPool,
}

impl PaymentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a `pending` payment row inside the settlement transaction.
    pub async fn insert_in_tx(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        new_payment: &NewPayment,
    ) -> Result<Payment, DatabaseError> {
        let id = Uuid::new_v4();

        sqlx::query_as::<_, Payment>(&format!(
            "INSERT INTO payments \
                 (id, user_id, payable_type, payable_id, amount, currency_code, provider, \
                  status, payment_method, phone_number, account_number, provider_response, \
                  metadata, is_deleted, version, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, '{{}}', $12, false, 0, NOW(), NOW()) \
             RETURNING {PAYMENT_COLUMNS}"
        ))
        .bind(id)
        .bind(new_payment.user_id)
        .bind(&new_payment.payable_type)
        .bind(new_payment.payable_id)
        .bind(new_payment.amount)
        .bind(&new_payment.currency_code)
        .bind(&new_payment.provider)
        .bind(PaymentStatus::Pending)
        .bind(new_payment.payment_method)
        .bind(&new_payment.phone_number)
        .bind(&new_payment.account_number)
        .bind(&new_payment.metadata)
        .fetch_one(&mut **tx)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Payment>, DatabaseError> {
        sqlx::query_as::<_, Payment>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = $1 AND is_deleted = false"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    /// Look up the payment a webhook refers to.
    pub async fn find_by_provider_reference(
        &self,
        provider: &str,
        reference: &str,
    ) -> Result<Option<Payment>, DatabaseError> {
        sqlx::query_as::<_, Payment>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments \
             WHERE provider = $1 AND provider_reference = $2 AND is_deleted = false"
        ))
        .bind(provider)
        .bind(reference)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    /// Advance `pending -> processing` after a successful initialize call.
    ///
    /// Runs inside the settlement transaction. `COALESCE` on the reference
    /// column enforces that a provider reference is set at most once.
    pub async fn mark_processing_in_tx(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        id: Uuid,
        version: i32,
        provider_reference: Option<&str>,
        provider_payment_method: Option<&str>,
        provider_response: &serde_json::Value,
    ) -> Result<Option<Payment>, DatabaseError> {
        sqlx::query_as::<_, Payment>(&format!(
            "UPDATE payments \
             SET status = $3, provider_reference = COALESCE(provider_reference, $4), \
                 provider_payment_method = $5, provider_response = $6, \
                 initiated_at = NOW(), version = version + 1, updated_at = NOW() \
             WHERE id = $1 AND version = $2 \
             RETURNING {PAYMENT_COLUMNS}"
        ))
        .bind(id)
        .bind(version)
        .bind(PaymentStatus::Processing)
        .bind(provider_reference)
        .bind(provider_payment_method)
        .bind(provider_response)
        .fetch_optional(&mut **tx)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    /// Transition to `failed` inside the settlement transaction.
    pub async fn mark_failed_in_tx(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        id: Uuid,
        version: i32,
        failure_reason: &str,
        failure_message: &str,
        provider_response: &serde_json::Value,
    ) -> Result<Option<Payment>, DatabaseError> {
        sqlx::query_as::<_, Payment>(&format!(
            "UPDATE payments \
             SET status = $3, failure_reason = $4, failure_message = $5, \
                 provider_response = $6, failed_at = NOW(), \
                 version = version + 1, updated_at = NOW() \
             WHERE id = $1 AND version = $2 \
             RETURNING {PAYMENT_COLUMNS}"
        ))
        .bind(id)
        .bind(version)
        .bind(PaymentStatus::Failed)
        .bind(failure_reason)
        .bind(failure_message)
        .bind(provider_response)
        .fetch_optional(&mut **tx)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    /// Terminal `completed` transition. Returns `None` when the version
    /// check loses a concurrent race; the caller reloads and re-evaluates.
    pub async fn complete(
        &self,
        id: Uuid,
        version: i32,
        paid_at: Option<DateTime<Utc>>,
        provider_response: &serde_json::Value,
    ) -> Result<Option<Payment>, DatabaseError> {
        sqlx::query_as::<_, Payment>(&format!(
            "UPDATE payments \
             SET status = $3, completed_at = COALESCE($4, NOW()), provider_response = $5, \
                 version = version + 1, updated_at = NOW() \
             WHERE id = $1 AND version = $2 \
             RETURNING {PAYMENT_COLUMNS}"
        ))
        .bind(id)
        .bind(version)
        .bind(PaymentStatus::Completed)
        .bind(paid_at)
        .bind(provider_response)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    /// Terminal `failed` transition from a verify/webhook result.
    pub async fn fail(
        &self,
        id: Uuid,
        version: i32,
        failure_reason: &str,
        failure_message: &str,
        provider_response: &serde_json::Value,
    ) -> Result<Option<Payment>, DatabaseError> {
        sqlx::query_as::<_, Payment>(&format!(
            "UPDATE payments \
             SET status = $3, failure_reason = $4, failure_message = $5, \
                 provider_response = $6, failed_at = NOW(), \
                 version = version + 1, updated_at = NOW() \
             WHERE id = $1 AND version = $2 \
             RETURNING {PAYMENT_COLUMNS}"
        ))
        .bind(id)
        .bind(version)
        .bind(PaymentStatus::Failed)
        .bind(failure_reason)
        .bind(failure_message)
        .bind(provider_response)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    /// Terminal `refunded` transition.
    pub async fn refund(
        &self,
        id: Uuid,
        version: i32,
        provider_response: &serde_json::Value,
    ) -> Result<Option<Payment>, DatabaseError> {
        sqlx::query_as::<_, Payment>(&format!(
            "UPDATE payments \
             SET status = $3, provider_response = $4, version = version + 1, updated_at = NOW() \
             WHERE id = $1 AND version = $2 \
             RETURNING {PAYMENT_COLUMNS}"
        ))
        .bind(id)
        .bind(version)
        .bind(PaymentStatus::Refunded)
        .bind(provider_response)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    /// Explicit cancellation from any non-terminal state.
    pub async fn cancel(&self, id: Uuid, version: i32) -> Result<Option<Payment>, DatabaseError> {
        sqlx::query_as::<_, Payment>(&format!(
            "UPDATE payments \
             SET status = $3, version = version + 1, updated_at = NOW() \
             WHERE id = $1 AND version = $2 \
             RETURNING {PAYMENT_COLUMNS}"
        ))
        .bind(id)
        .bind(version)
        .bind(PaymentStatus::Cancelled)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    /// Soft delete for audit retention; the row never goes away.
    pub async fn soft_delete(&self, id: Uuid) -> Result<bool, DatabaseError> {
        let result =
            sqlx::query("UPDATE payments SET is_deleted = true, updated_at = NOW() WHERE id = $1")
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(DatabaseError::from_sqlx)?;
        Ok(result.rows_affected() > 0)
    }
}
