//! Settlement orchestrator.
//!
//! Owns every mutation of the `Payment` entity. `settle` runs as a two-phase
//! sequence: validate and select with nothing persisted, then open one
//! transaction that creates the payment row, calls the rail, records the
//! outcome and commits before any adapter error is propagated. A failed
//! initialize therefore still leaves a committed `failed` row behind for
//! audit.
//!
//! Reconciliation (`verify` and `process_webhook_callback`) may race on the
//! same payment. Both funnel through `reconcile`, which treats an
//! already-terminal payment as a no-op and retries version-guarded writes
//! through a single reload before reporting a conflict.

use crate::config::PaymentsConfig;
use crate::database::payment_repository::{NewPayment, Payment, PaymentRepository};
use crate::database::payment_request_repository::{
    PaymentRequest, PaymentRequestRepository, PaymentRequestStatus,
};
use crate::database::transaction::DatabaseTransaction;
use crate::database::webhook_repository::WebhookRepository;
use crate::error::{SettlementError, SettlementResult};
use crate::payments::registry::ProviderRegistry;
use crate::payments::traits::PaymentGateway;
use crate::payments::types::{InitializeOptions, PaymentMethod, PaymentProbe, PaymentStatus};
use chrono::{DateTime, Utc};
use http::HeaderMap;
use rust_decimal::Decimal;
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// The user attempting to pay a request.
#[derive(Debug, Clone)]
pub struct Payer {
    pub id: Uuid,
    pub email: Option<String>,
    /// Previously stored provider preference, honored first by selection.
    pub preferred_provider: Option<String>,
}

/// Caller-supplied settlement input.
#[derive(Debug, Clone)]
pub struct SettlementData {
    /// Overrides the request amount; mandatory direction for negotiable
    /// requests, must match exactly for non-negotiable ones.
    pub amount: Option<Decimal>,
    pub payment_method: PaymentMethod,
    pub phone_number: Option<String>,
    pub account_number: Option<String>,
    pub callback_url: Option<String>,
    /// Platform-origin context such as client IP and user agent.
    pub metadata: Option<serde_json::Value>,
}

pub struct SettlementOrchestrator {
    pool: PgPool,
    registry: Arc<ProviderRegistry>,
    config: PaymentsConfig,
    payments: PaymentRepository,
    requests: PaymentRequestRepository,
    webhooks: WebhookRepository,
}

impl SettlementOrchestrator {
    pub fn new(pool: PgPool, registry: Arc<ProviderRegistry>, config: PaymentsConfig) -> Self {
        Self {
            payments: PaymentRepository::new(pool.clone()),
            requests: PaymentRequestRepository::new(pool.clone()),
            webhooks: WebhookRepository::new(pool.clone()),
            pool,
            registry,
            config,
        }
    }

    /// Attempt to pay a payment request.
    ///
    /// On adapter failure the payment row commits in `failed` state and the
    /// provider error is re-raised: a returned error means "the attempt
    /// failed", never "no attempt was recorded".
    pub async fn settle(
        &self,
        request: &PaymentRequest,
        payer: &Payer,
        data: &SettlementData,
    ) -> SettlementResult<Payment> {
        let amount = validate(request, payer, data, &self.registry)?;

        let probe = PaymentProbe {
            amount,
            currency_code: request.currency_code.clone(),
            payment_method: Some(data.payment_method),
            phone_number: data.phone_number.clone(),
        };
        let provider = self
            .registry
            .provider_for_payment(&probe, payer.preferred_provider.as_deref())
            .ok_or_else(|| {
                SettlementError::validation(
                    "payment_method",
                    "no payment provider available for this payment",
                )
            })?;

        let mut metadata = data.metadata.clone().unwrap_or_else(|| json!({}));
        if let Some(map) = metadata.as_object_mut() {
            map.insert("origin".to_string(), json!("settlement"));
        }

        let new_payment = NewPayment {
            user_id: payer.id,
            payable_type: "payment_request".to_string(),
            payable_id: request.id,
            amount,
            currency_code: request.currency_code.clone(),
            provider: provider.name().to_string(),
            payment_method: data.payment_method,
            phone_number: data.phone_number.clone(),
            account_number: data.account_number.clone(),
            metadata,
        };

        let mut tx = DatabaseTransaction::begin(&self.pool).await?;
        let payment = self.payments.insert_in_tx(tx.tx_mut(), &new_payment).await?;

        let options = InitializeOptions {
            callback_url: data.callback_url.clone(),
            customer_email: payer.email.clone(),
            webhook_url: self.config.webhook_url_for(provider.name()),
            metadata: json!({
                "payment_id": payment.id,
                "payable_type": payment.payable_type,
                "payable_id": payment.payable_id,
            }),
        };

        match provider.initialize_payment(&payment, &options).await {
            Ok(result) => {
                let updated = self
                    .payments
                    .mark_processing_in_tx(
                        tx.tx_mut(),
                        payment.id,
                        payment.version,
                        result.reference.as_deref(),
                        result.provider_payment_method.as_deref(),
                        &result.raw,
                    )
                    .await?
                    .ok_or(SettlementError::StateConflict {
                        payment_id: payment.id,
                    })?;
                tx.commit().await?;

                info!(
                    payment_id = %updated.id,
                    provider = %updated.provider,
                    amount = %updated.amount,
                    currency = %updated.currency_code,
                    "payment initialized"
                );
                Ok(updated)
            }
            Err(e) => {
                warn!(
                    payment_id = %payment.id,
                    provider = %provider.name(),
                    payer_id = %payer.id,
                    amount = %payment.amount,
                    error = %e,
                    retryable = e.is_retryable(),
                    "provider initialization failed"
                );

                self.payments
                    .mark_failed_in_tx(
                        tx.tx_mut(),
                        payment.id,
                        payment.version,
                        "provider_initialization_failed",
                        &e.to_string(),
                        &json!({ "error": e.to_string() }),
                    )
                    .await?
                    .ok_or(SettlementError::StateConflict {
                        payment_id: payment.id,
                    })?;

                // Commit the failed attempt before surfacing the error; the
                // record must survive the failure.
                tx.commit().await?;
                Err(e.into())
            }
        }
    }

    /// Poll the rail for a payment's current status and apply the result.
    pub async fn verify(&self, payment_id: Uuid) -> SettlementResult<Payment> {
        let payment = self
            .payments
            .find_by_id(payment_id)
            .await?
            .ok_or_else(|| SettlementError::not_found("payment", payment_id))?;

        if payment.status.is_terminal() {
            return Ok(payment);
        }

        let reference = payment.provider_reference.as_deref().ok_or_else(|| {
            SettlementError::validation(
                "provider_reference",
                "payment has no provider reference to verify",
            )
        })?;

        let provider = self
            .registry
            .get(&payment.provider)
            .ok_or_else(|| SettlementError::not_found("provider", &payment.provider))?;

        let result = provider.verify_payment(reference).await?;
        self.reconcile(
            payment,
            result.status,
            result.paid_at,
            result.gateway_response.as_deref(),
            &result.raw,
        )
        .await
    }

    /// Reconcile an inbound provider webhook.
    ///
    /// Returns `Ok(None)` when the reference matches no payment; unknown
    /// references are common with test and duplicate traffic and must not
    /// trigger provider retries.
    pub async fn process_webhook_callback(
        &self,
        provider_name: &str,
        payload: &[u8],
        headers: &HeaderMap,
    ) -> SettlementResult<Option<Payment>> {
        let provider = self
            .registry
            .get(provider_name)
            .ok_or_else(|| SettlementError::not_found("provider", provider_name))?;

        let webhook = provider.handle_webhook(payload, headers)?;

        // Audit the delivery first; a failed audit write must not block
        // reconciliation.
        let event_id = match self
            .webhooks
            .log_event(provider_name, webhook.raw.clone())
            .await
        {
            Ok(event) => Some(event.id),
            Err(e) => {
                warn!(provider = %provider_name, error = %e, "failed to record webhook event");
                None
            }
        };

        let payment = match self
            .payments
            .find_by_provider_reference(provider_name, &webhook.reference)
            .await?
        {
            Some(payment) => payment,
            None => {
                warn!(
                    provider = %provider_name,
                    reference = %webhook.reference,
                    "webhook matched no payment, ignoring"
                );
                self.audit_failure(event_id.as_deref(), "no matching payment")
                    .await;
                return Ok(None);
            }
        };

        match self
            .reconcile(
                payment,
                webhook.status,
                webhook.paid_at,
                webhook.gateway_response.as_deref(),
                &webhook.raw,
            )
            .await
        {
            Ok(payment) => {
                if let Some(event_id) = event_id.as_deref() {
                    if let Err(e) = self.webhooks.mark_processed(event_id).await {
                        warn!(event_id = %event_id, error = %e, "failed to mark webhook processed");
                    }
                }
                Ok(Some(payment))
            }
            Err(e) => {
                self.audit_failure(event_id.as_deref(), &e.to_string()).await;
                Err(e)
            }
        }
    }

    async fn audit_failure(&self, event_id: Option<&str>, error: &str) {
        if let Some(event_id) = event_id {
            if let Err(e) = self.webhooks.record_failure(event_id, error).await {
                warn!(event_id = %event_id, error = %e, "failed to record webhook failure");
            }
        }
    }

    /// Explicit cancellation of a non-terminal payment.
    pub async fn cancel(&self, payment_id: Uuid) -> SettlementResult<Payment> {
        let payment = self
            .payments
            .find_by_id(payment_id)
            .await?
            .ok_or_else(|| SettlementError::not_found("payment", payment_id))?;

        if payment.status == PaymentStatus::Cancelled {
            return Ok(payment);
        }
        if payment.status.is_terminal() {
            return Err(SettlementError::validation(
                "status",
                format!("cannot cancel a {} payment", payment.status),
            ));
        }

        match self.payments.cancel(payment.id, payment.version).await? {
            Some(updated) => {
                info!(payment_id = %updated.id, "payment cancelled");
                Ok(updated)
            }
            None => self.resolve_lost_race(payment.id).await,
        }
    }

    /// Apply a normalized provider status to a payment.
    ///
    /// Terminal payments pass through unchanged; whichever concurrent
    /// terminal write won at the storage layer stands.
    async fn reconcile(
        &self,
        payment: Payment,
        status: PaymentStatus,
        paid_at: Option<DateTime<Utc>>,
        gateway_response: Option<&str>,
        raw: &serde_json::Value,
    ) -> SettlementResult<Payment> {
        if payment.status.is_terminal() {
            info!(
                payment_id = %payment.id,
                status = %payment.status,
                "payment already terminal, reconciliation is a no-op"
            );
            return Ok(payment);
        }

        let written = match status {
            PaymentStatus::Completed => {
                self.payments
                    .complete(payment.id, payment.version, paid_at, raw)
                    .await?
            }
            PaymentStatus::Failed => {
                self.payments
                    .fail(
                        payment.id,
                        payment.version,
                        "provider_declined",
                        gateway_response.unwrap_or("payment failed at provider"),
                        raw,
                    )
                    .await?
            }
            PaymentStatus::Refunded => {
                self.payments
                    .refund(payment.id, payment.version, raw)
                    .await?
            }
            PaymentStatus::Cancelled => self.payments.cancel(payment.id, payment.version).await?,
            // Still in flight on the rail, nothing to move.
            PaymentStatus::Pending | PaymentStatus::Processing => return Ok(payment),
        };

        let updated = match written {
            Some(updated) => updated,
            None => self.resolve_lost_race(payment.id).await?,
        };

        if updated.status == PaymentStatus::Completed {
            self.cascade_paid(&updated).await?;
        }

        info!(
            payment_id = %updated.id,
            status = %updated.status,
            "payment reconciled"
        );
        Ok(updated)
    }

    /// A version-guarded write matched zero rows. Reload: if the concurrent
    /// writer reached a terminal state that outcome stands, otherwise the
    /// caller gets a conflict and should retry.
    async fn resolve_lost_race(&self, payment_id: Uuid) -> SettlementResult<Payment> {
        let current = self
            .payments
            .find_by_id(payment_id)
            .await?
            .ok_or_else(|| SettlementError::not_found("payment", payment_id))?;

        if current.status.is_terminal() {
            info!(
                payment_id = %current.id,
                status = %current.status,
                "concurrent reconciliation already settled this payment"
            );
            Ok(current)
        } else {
            Err(SettlementError::StateConflict { payment_id })
        }
    }

    /// Flip the parent payment request to `paid`, but only while it is still
    /// pending. Duplicate completion signals update zero rows.
    async fn cascade_paid(&self, payment: &Payment) -> SettlementResult<()> {
        if payment.payable_type != "payment_request" {
            return Ok(());
        }

        let marked = self.requests.mark_as_paid_if_pending(payment.payable_id).await?;
        if marked {
            info!(
                payment_id = %payment.id,
                payment_request_id = %payment.payable_id,
                "payment request marked paid"
            );
        }
        Ok(())
    }
}

/// Eligibility checks, applied in order, failing on the first violation.
/// Returns the effective settlement amount.
fn validate(
    request: &PaymentRequest,
    payer: &Payer,
    data: &SettlementData,
    registry: &ProviderRegistry,
) -> SettlementResult<Decimal> {
    if request.status != PaymentRequestStatus::Pending {
        return Err(SettlementError::validation(
            "status",
            "payment request is no longer payable",
        ));
    }

    if request.is_expired() {
        return Err(SettlementError::validation(
            "expires_at",
            "payment request has expired",
        ));
    }

    if payer.id == request.user_id {
        return Err(SettlementError::validation(
            "payer",
            "cannot pay your own payment request",
        ));
    }

    let amount = data.amount.unwrap_or(request.amount);
    if request.is_negotiable {
        if amount <= Decimal::ZERO {
            return Err(SettlementError::validation(
                "amount",
                "amount must be greater than zero",
            ));
        }
    } else if let Some(supplied) = data.amount {
        if supplied != request.amount {
            return Err(SettlementError::validation(
                "amount",
                format!(
                    "amount must match the requested {} {}",
                    request.amount, request.currency_code
                ),
            ));
        }
    }

    if !registry
        .supported_payment_methods()
        .contains(&data.payment_method)
    {
        return Err(SettlementError::validation(
            "payment_method",
            format!("{} is not supported by any enabled provider", data.payment_method),
        ));
    }

    if !registry
        .supported_currencies()
        .iter()
        .any(|c| c.eq_ignore_ascii_case(&request.currency_code))
    {
        return Err(SettlementError::validation(
            "currency_code",
            format!("{} is not supported by any enabled provider", request.currency_code),
        ));
    }

    if data.payment_method.requires_phone_number()
        && data
            .phone_number
            .as_deref()
            .map(str::trim)
            .unwrap_or("")
            .is_empty()
    {
        return Err(SettlementError::validation(
            "phone_number",
            "phone number is required for mobile money payments",
        ));
    }

    Ok(amount)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::DummyConfig;
    use crate::payments::fees::FeeCalculator;
    use crate::payments::providers::DummyProvider;
    use chrono::Duration;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    /// A processing-state payment as the dummy rail would have created it.
    pub(crate) fn payment_fixture(amount: Decimal) -> Payment {
        Payment {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            payable_type: "payment_request".to_string(),
            payable_id: Uuid::new_v4(),
            amount,
            currency_code: "GHS".to_string(),
            provider: "dummy".to_string(),
            provider_reference: None,
            provider_payment_method: None,
            status: PaymentStatus::Pending,
            payment_method: PaymentMethod::MobileMoney,
            phone_number: Some("+233244123456".to_string()),
            account_number: None,
            initiated_at: None,
            completed_at: None,
            failed_at: None,
            provider_response: serde_json::json!({}),
            metadata: serde_json::json!({}),
            failure_reason: None,
            failure_message: None,
            is_deleted: false,
            version: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn registry_with_dummy() -> ProviderRegistry {
        let fees = FeeCalculator::new(dec!(0.005), HashMap::new());
        let dummy = DummyProvider::new(
            DummyConfig {
                webhook_secret: "secret".to_string(),
            },
            fees,
        );
        ProviderRegistry::new(vec![std::sync::Arc::new(dummy)], "dummy".to_string())
    }

    fn request_fixture() -> PaymentRequest {
        PaymentRequest {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            amount: dec!(100.00),
            currency_code: "GHS".to_string(),
            is_negotiable: false,
            status: PaymentRequestStatus::Pending,
            expires_at: Some(Utc::now() + Duration::hours(1)),
            paid_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn payer_fixture() -> Payer {
        Payer {
            id: Uuid::new_v4(),
            email: Some("payer@example.com".to_string()),
            preferred_provider: None,
        }
    }

    fn data_fixture() -> SettlementData {
        SettlementData {
            amount: None,
            payment_method: PaymentMethod::MobileMoney,
            phone_number: Some("+233244123456".to_string()),
            account_number: None,
            callback_url: None,
            metadata: None,
        }
    }

    fn field_of(err: SettlementError) -> &'static str {
        match err {
            SettlementError::Validation { field, .. } => field,
            other => panic!("expected validation error, got {other}"),
        }
    }

    #[test]
    fn test_valid_settlement_passes() {
        let registry = registry_with_dummy();
        let amount = validate(&request_fixture(), &payer_fixture(), &data_fixture(), &registry)
            .unwrap();
        assert_eq!(amount, dec!(100.00));
    }

    #[test]
    fn test_rejects_non_pending_request() {
        let registry = registry_with_dummy();
        let mut request = request_fixture();
        request.status = PaymentRequestStatus::Paid;
        let err = validate(&request, &payer_fixture(), &data_fixture(), &registry).unwrap_err();
        assert_eq!(field_of(err), "status");
    }

    #[test]
    fn test_rejects_expired_request() {
        let registry = registry_with_dummy();
        let mut request = request_fixture();
        request.expires_at = Some(Utc::now() - Duration::minutes(1));
        let err = validate(&request, &payer_fixture(), &data_fixture(), &registry).unwrap_err();
        assert_eq!(field_of(err), "expires_at");
    }

    #[test]
    fn test_rejects_self_payment() {
        let registry = registry_with_dummy();
        let request = request_fixture();
        let mut payer = payer_fixture();
        payer.id = request.user_id;
        let err = validate(&request, &payer, &data_fixture(), &registry).unwrap_err();
        assert_eq!(field_of(err), "payer");
    }

    #[test]
    fn test_negotiable_rejects_non_positive_amount() {
        let registry = registry_with_dummy();
        let mut request = request_fixture();
        request.is_negotiable = true;
        let mut data = data_fixture();
        data.amount = Some(dec!(0.00));
        let err = validate(&request, &payer_fixture(), &data, &registry).unwrap_err();
        assert_eq!(field_of(err), "amount");

        data.amount = Some(dec!(-5.00));
        let err = validate(&request, &payer_fixture(), &data, &registry).unwrap_err();
        assert_eq!(field_of(err), "amount");
    }

    #[test]
    fn test_negotiable_accepts_any_positive_amount() {
        let registry = registry_with_dummy();
        let mut request = request_fixture();
        request.is_negotiable = true;
        let mut data = data_fixture();
        data.amount = Some(dec!(42.50));
        let amount = validate(&request, &payer_fixture(), &data, &registry).unwrap();
        assert_eq!(amount, dec!(42.50));
    }

    #[test]
    fn test_non_negotiable_rejects_amount_mismatch() {
        let registry = registry_with_dummy();
        let mut data = data_fixture();
        data.amount = Some(dec!(99.99));
        let err = validate(&request_fixture(), &payer_fixture(), &data, &registry).unwrap_err();
        assert_eq!(field_of(err), "amount");
    }

    #[test]
    fn test_non_negotiable_accepts_exact_amount() {
        let registry = registry_with_dummy();
        let mut data = data_fixture();
        data.amount = Some(dec!(100.00));
        assert!(validate(&request_fixture(), &payer_fixture(), &data, &registry).is_ok());
    }

    #[test]
    fn test_rejects_unsupported_currency() {
        let registry = registry_with_dummy();
        let mut request = request_fixture();
        request.currency_code = "JPY".to_string();
        let err = validate(&request, &payer_fixture(), &data_fixture(), &registry).unwrap_err();
        assert_eq!(field_of(err), "currency_code");
    }

    #[test]
    fn test_mobile_money_requires_phone_number() {
        let registry = registry_with_dummy();
        for phone in [None, Some("".to_string()), Some("   ".to_string())] {
            let mut data = data_fixture();
            data.phone_number = phone;
            let err =
                validate(&request_fixture(), &payer_fixture(), &data, &registry).unwrap_err();
            assert_eq!(field_of(err), "phone_number");
        }
    }

    #[test]
    fn test_card_does_not_require_phone_number() {
        let registry = registry_with_dummy();
        let mut data = data_fixture();
        data.payment_method = PaymentMethod::Card;
        data.phone_number = None;
        assert!(validate(&request_fixture(), &payer_fixture(), &data, &registry).is_ok());
    }
}
