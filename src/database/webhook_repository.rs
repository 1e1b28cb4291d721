//! Webhook delivery audit.
//!
//! Every inbound provider notification is recorded before reconciliation so
//! that duplicate and unmatched deliveries can be traced after the fact.

use crate::database::error::DatabaseError;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// Webhook event entity
#[derive(Debug, Clone, FromRow)]
pub struct WebhookEvent {
    pub id: String,
    /// Provider the delivery came from.
    pub source: String,
    pub payload: serde_json::Value,
    pub processed: bool,
    pub last_error: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub processed_at: Option<chrono::DateTime<chrono::Utc>>,
}

const EVENT_COLUMNS: &str = "id, source, payload, processed, last_error, created_at, processed_at";

/// Webhook Repository for webhook event storage and tracking
#[derive(Clone)]
pub struct WebhookRepository {
    pool: PgPool,
}

impl WebhookRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Log a new webhook event
    pub async fn log_event(
        &self,
        source: &str,
        payload: serde_json::Value,
    ) -> Result<WebhookEvent, DatabaseError> {
        let event_id = Uuid::new_v4().to_string();

        sqlx::query_as::<_, WebhookEvent>(&format!(
            "INSERT INTO webhook_events (id, source, payload, processed, created_at) \
             VALUES ($1, $2, $3, false, NOW()) \
             RETURNING {EVENT_COLUMNS}"
        ))
        .bind(&event_id)
        .bind(source)
        .bind(payload)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    /// Mark webhook event as processed
    pub async fn mark_processed(&self, event_id: &str) -> Result<WebhookEvent, DatabaseError> {
        sqlx::query_as::<_, WebhookEvent>(&format!(
            "UPDATE webhook_events SET processed = true, processed_at = NOW() WHERE id = $1 \
             RETURNING {EVENT_COLUMNS}"
        ))
        .bind(event_id)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    /// Record webhook processing failure
    pub async fn record_failure(
        &self,
        event_id: &str,
        error: &str,
    ) -> Result<WebhookEvent, DatabaseError> {
        sqlx::query_as::<_, WebhookEvent>(&format!(
            "UPDATE webhook_events SET last_error = $2 WHERE id = $1 \
             RETURNING {EVENT_COLUMNS}"
        ))
        .bind(event_id)
        .bind(error)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }
}
