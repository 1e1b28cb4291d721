//! Payment request lookup and mutation.
//!
//! Payment requests are owned by another part of the backend; the settlement
//! core only reads them for validation and flips them to `paid` when a
//! payment completes.

use crate::database::error::DatabaseError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// Lifecycle of the payable entity itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(rename_all = "snake_case")]
pub enum PaymentRequestStatus {
    Pending,
    Paid,
    Cancelled,
    Expired,
}

/// The payable target of a settlement attempt.
#[derive(Debug, Clone, FromRow)]
pub struct PaymentRequest {
    pub id: Uuid,
    /// The user who created (and is owed by) this request.
    pub user_id: Uuid,
    pub amount: Decimal,
    pub currency_code: String,
    pub is_negotiable: bool,
    pub status: PaymentRequestStatus,
    pub expires_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentRequest {
    pub fn is_expired(&self) -> bool {
        matches!(self.status, PaymentRequestStatus::Expired)
            || self
                .expires_at
                .map(|at| at <= Utc::now())
                .unwrap_or(false)
    }
}

const REQUEST_COLUMNS: &str = "id, user_id, amount, currency_code, is_negotiable, status, \
     expires_at, paid_at, created_at, updated_at";

/// Repository for the payment requests being settled
#[derive(Clone)]
pub struct PaymentRequestRepository {
    pool: PgPool,
}

impl PaymentRequestRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<PaymentRequest>, DatabaseError> {
        sqlx::query_as::<_, PaymentRequest>(&format!(
            "SELECT {REQUEST_COLUMNS} FROM payment_requests WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    /// Mark a request paid, but only while it is still pending.
    ///
    /// The status guard in the WHERE clause is what protects against
    /// duplicate completion signals: a second webhook for an already-paid
    /// request updates zero rows and returns `false`.
    pub async fn mark_as_paid_if_pending(&self, id: Uuid) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            "UPDATE payment_requests \
             SET status = $2, paid_at = NOW(), updated_at = NOW() \
             WHERE id = $1 AND status = $3",
        )
        .bind(id)
        .bind(PaymentRequestStatus::Paid)
        .bind(PaymentRequestStatus::Pending)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(result.rows_affected() > 0)
    }
}
