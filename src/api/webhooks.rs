//! Inbound provider webhook endpoint.
//!
//! Providers retry on anything that looks like a failure, so the contract
//! here is deliberately forgiving: once the provider is known and the
//! payload non-empty, the answer is `200` with a status body even when the
//! signature fails or the reference matches nothing. Only empty payloads and
//! unknown provider names get a `4xx`.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;
use uuid::Uuid;

use crate::api::AppState;
use crate::payments::fees::FeeCalculator;
use crate::payments::providers::DummyProvider;

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub status: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_id: Option<Uuid>,
}

impl WebhookResponse {
    fn success(message: impl Into<String>, payment_id: Option<Uuid>) -> Self {
        Self {
            status: "success".to_string(),
            message: message.into(),
            payment_id,
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            message: message.into(),
            payment_id: None,
        }
    }
}

/// `POST /webhooks/payments/{provider}`
pub async fn receive_webhook(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<WebhookResponse>) {
    if body.is_empty() {
        warn!(provider = %provider, "empty webhook payload");
        return (
            StatusCode::BAD_REQUEST,
            Json(WebhookResponse::error("empty payload")),
        );
    }

    if !state.registry.is_provider_available(&provider) {
        return (
            StatusCode::NOT_FOUND,
            Json(WebhookResponse::error(format!(
                "unknown provider '{provider}'"
            ))),
        );
    }

    match state
        .orchestrator
        .process_webhook_callback(&provider, &body, &headers)
        .await
    {
        Ok(Some(payment)) => (
            StatusCode::OK,
            Json(WebhookResponse::success(
                "webhook processed",
                Some(payment.id),
            )),
        ),
        Ok(None) => (
            StatusCode::OK,
            Json(WebhookResponse::success("webhook ignored", None)),
        ),
        Err(e) => {
            // Still 200: a retry would fail the same way.
            warn!(provider = %provider, error = %e, "webhook processing failed");
            (StatusCode::OK, Json(WebhookResponse::error(e.to_string())))
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TestWebhookRequest {
    pub reference: String,
    #[serde(default = "default_test_status")]
    pub status: String,
    pub amount: Option<Decimal>,
    pub currency: Option<String>,
}

fn default_test_status() -> String {
    "success".to_string()
}

/// `POST /webhooks/payments/{provider}/test`
///
/// Synthesizes a signed dummy-rail payload and routes it through the normal
/// webhook path. Disabled in production.
pub async fn test_webhook(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Json(request): Json<TestWebhookRequest>,
) -> (StatusCode, Json<WebhookResponse>) {
    if state.config.server.is_production() {
        return (
            StatusCode::NOT_FOUND,
            Json(WebhookResponse::error("not found")),
        );
    }

    if provider != "dummy" || !state.registry.is_provider_available("dummy") {
        return (
            StatusCode::NOT_FOUND,
            Json(WebhookResponse::error(
                "test webhooks are only available for the dummy provider",
            )),
        );
    }

    let dummy_config = match &state.config.payments.dummy {
        Some(cfg) => cfg.clone(),
        None => {
            return (
                StatusCode::NOT_FOUND,
                Json(WebhookResponse::error("dummy provider is not configured")),
            )
        }
    };

    let payload = json!({
        "reference": request.reference,
        "status": request.status,
        "amount": request.amount,
        "currency": request.currency,
    });
    let body = payload.to_string().into_bytes();

    let signer = DummyProvider::new(
        dummy_config,
        FeeCalculator::new(
            state.config.payments.service_fee_percent,
            state.config.payments.service_fee_overrides.clone(),
        ),
    );
    let signature = signer.sign_payload(&body);

    let mut headers = HeaderMap::new();
    match signature.parse() {
        Ok(value) => {
            headers.insert("X-Dummy-Signature", value);
        }
        Err(_) => {
            return (
                StatusCode::OK,
                Json(WebhookResponse::error("failed to sign test payload")),
            )
        }
    }

    match state
        .orchestrator
        .process_webhook_callback("dummy", &body, &headers)
        .await
    {
        Ok(Some(payment)) => (
            StatusCode::OK,
            Json(WebhookResponse::success(
                "test webhook processed",
                Some(payment.id),
            )),
        ),
        Ok(None) => (
            StatusCode::OK,
            Json(WebhookResponse::success("test webhook ignored", None)),
        ),
        Err(e) => (StatusCode::OK, Json(WebhookResponse::error(e.to_string()))),
    }
}
