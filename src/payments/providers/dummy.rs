//! Dummy payment provider
//!
//! In-process rail for development and staging: no network calls, instant
//! references, and a deliberately low amount ceiling so failure paths can be
//! exercised end to end. Webhooks for this rail are synthesized by the test
//! endpoint and signed exactly like a real provider would sign them.

use crate::config::DummyConfig;
use crate::database::payment_repository::Payment;
use crate::payments::error::ProviderError;
use crate::payments::fees::{FeeCalculator, FeeSchedule};
use crate::payments::providers::{constant_time_eq, header_value};
use crate::payments::traits::PaymentGateway;
use crate::payments::types::{
    FeeBreakdown, InitializeOptions, NormalizedWebhook, PaymentMethod, PaymentStatus,
    ProviderResult,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use http::HeaderMap;
use rust_decimal::Decimal;
use serde::Deserialize;
use sha2::Sha256;
use std::collections::HashMap;
use tracing::info;
use uuid::Uuid;

const PROVIDER_NAME: &str = "dummy";

/// Amount ceiling applied as an adapter-side business rule.
const MAX_AMOUNT: Decimal = Decimal::from_parts(1000, 0, 0, false, 0);

const SUPPORTED_METHODS: &[PaymentMethod] = &[
    PaymentMethod::MobileMoney,
    PaymentMethod::Card,
    PaymentMethod::BankTransfer,
];
const SUPPORTED_CURRENCIES: &[&str] = &["GHS", "NGN", "KES", "USD"];

pub struct DummyProvider {
    webhook_secret: String,
    fees: FeeCalculator,
    schedule: FeeSchedule,
}

impl DummyProvider {
    pub fn new(config: DummyConfig, fees: FeeCalculator) -> Self {
        let schedule = FeeSchedule {
            default_percent: Decimal::new(1, 2), // 1%
            method_percents: HashMap::new(),
            currency_percents: HashMap::new(),
            currency_caps: HashMap::from([
                ("GHS".to_string(), Decimal::new(1000, 2)),
                ("USD".to_string(), Decimal::new(500, 2)),
            ]),
        };
        Self {
            webhook_secret: config.webhook_secret,
            fees,
            schedule,
        }
    }

    fn map_status(status: &str) -> PaymentStatus {
        match status {
            "success" | "successful" | "completed" => PaymentStatus::Completed,
            "pending" => PaymentStatus::Pending,
            "processing" => PaymentStatus::Processing,
            "cancelled" => PaymentStatus::Cancelled,
            "refunded" | "reversed" => PaymentStatus::Refunded,
            // Fail closed on anything unrecognized.
            _ => PaymentStatus::Failed,
        }
    }

    fn sign(&self, payload: &[u8]) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(self.webhook_secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(payload);
        hex::encode(mac.finalize().into_bytes())
    }

    /// Signature the test webhook endpoint attaches to synthesized payloads.
    pub fn sign_payload(&self, payload: &[u8]) -> String {
        self.sign(payload)
    }
}

#[derive(Debug, Deserialize)]
struct DummyWebhookPayload {
    reference: String,
    status: String,
    #[serde(default)]
    amount: Option<Decimal>,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    gateway_response: Option<String>,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    paid_at: Option<DateTime<Utc>>,
}

#[async_trait]
impl PaymentGateway for DummyProvider {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    fn supported_payment_methods(&self) -> &[PaymentMethod] {
        SUPPORTED_METHODS
    }

    fn supported_currencies(&self) -> &[&'static str] {
        SUPPORTED_CURRENCIES
    }

    async fn initialize_payment(
        &self,
        payment: &Payment,
        _options: &InitializeOptions,
    ) -> Result<ProviderResult, ProviderError> {
        if payment.amount > MAX_AMOUNT {
            return Err(ProviderError::Rejected {
                provider: PROVIDER_NAME,
                message: format!(
                    "amount {} exceeds the dummy provider limit of {}",
                    payment.amount, MAX_AMOUNT
                ),
            });
        }

        let reference = format!("DUMMY_{}", Uuid::new_v4().simple());
        info!(payment_id = %payment.id, reference = %reference, "dummy payment initialized");

        Ok(ProviderResult {
            reference: Some(reference.clone()),
            status: PaymentStatus::Processing,
            authorization_url: None,
            provider_payment_method: Some(payment.payment_method.as_str().to_string()),
            gateway_response: Some("Accepted".to_string()),
            paid_at: None,
            raw: serde_json::json!({
                "provider": PROVIDER_NAME,
                "reference": reference,
                "status": "processing",
            }),
        })
    }

    async fn verify_payment(&self, reference: &str) -> Result<ProviderResult, ProviderError> {
        // The dummy rail considers every initialized payment settled.
        Ok(ProviderResult {
            reference: Some(reference.to_string()),
            status: PaymentStatus::Completed,
            authorization_url: None,
            provider_payment_method: None,
            gateway_response: Some("Approved".to_string()),
            paid_at: Some(Utc::now()),
            raw: serde_json::json!({
                "provider": PROVIDER_NAME,
                "reference": reference,
                "status": "success",
            }),
        })
    }

    fn handle_webhook(
        &self,
        payload: &[u8],
        headers: &HeaderMap,
    ) -> Result<NormalizedWebhook, ProviderError> {
        let signature = header_value(headers, &["X-Dummy-Signature"])
            .ok_or(ProviderError::InvalidSignature {
                provider: PROVIDER_NAME,
            })?;

        let expected = self.sign(payload);
        if !constant_time_eq(expected.as_bytes(), signature.as_bytes()) {
            return Err(ProviderError::InvalidSignature {
                provider: PROVIDER_NAME,
            });
        }

        let parsed: DummyWebhookPayload =
            serde_json::from_slice(payload).map_err(|e| ProviderError::Api {
                provider: PROVIDER_NAME,
                message: format!("invalid webhook payload: {}", e),
            })?;

        Ok(NormalizedWebhook {
            status: Self::map_status(&parsed.status),
            reference: parsed.reference,
            amount: parsed.amount,
            currency: parsed.currency,
            gateway_response: parsed.gateway_response,
            channel: parsed.channel,
            paid_at: parsed.paid_at,
            raw: serde_json::from_slice(payload).unwrap_or_default(),
        })
    }

    async fn refund_payment(
        &self,
        payment: &Payment,
        amount: Option<Decimal>,
        reason: Option<&str>,
    ) -> Result<ProviderResult, ProviderError> {
        let reference = payment
            .provider_reference
            .clone()
            .ok_or(ProviderError::Rejected {
                provider: PROVIDER_NAME,
                message: "payment has no provider reference".to_string(),
            })?;

        Ok(ProviderResult {
            reference: Some(reference),
            status: PaymentStatus::Refunded,
            authorization_url: None,
            provider_payment_method: None,
            gateway_response: reason.map(str::to_string),
            paid_at: None,
            raw: serde_json::json!({
                "provider": PROVIDER_NAME,
                "refund_amount": amount.unwrap_or(payment.amount),
            }),
        })
    }

    fn calculate_fees(
        &self,
        amount: Decimal,
        currency: &str,
        method: PaymentMethod,
    ) -> FeeBreakdown {
        self.fees
            .breakdown(amount, currency, method, PROVIDER_NAME, &self.schedule)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    pub(crate) fn provider() -> DummyProvider {
        DummyProvider::new(
            DummyConfig {
                webhook_secret: "test-secret".to_string(),
            },
            FeeCalculator::new(dec!(0.005), HashMap::new()),
        )
    }

    fn signed_headers(provider: &DummyProvider, payload: &[u8]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            "X-Dummy-Signature",
            provider.sign_payload(payload).parse().unwrap(),
        );
        headers
    }

    #[test]
    fn test_webhook_with_valid_signature() {
        let p = provider();
        let payload = br#"{"reference":"DUMMY_abc","status":"success","amount":"100.00","currency":"GHS"}"#;
        let webhook = p.handle_webhook(payload, &signed_headers(&p, payload)).unwrap();
        assert_eq!(webhook.reference, "DUMMY_abc");
        assert_eq!(webhook.status, PaymentStatus::Completed);
        assert_eq!(webhook.amount, Some(dec!(100.00)));
    }

    #[test]
    fn test_webhook_missing_signature_rejected() {
        let p = provider();
        let payload = br#"{"reference":"DUMMY_abc","status":"success"}"#;
        let err = p.handle_webhook(payload, &HeaderMap::new()).unwrap_err();
        assert!(matches!(err, ProviderError::InvalidSignature { .. }));
    }

    #[test]
    fn test_webhook_tampered_payload_rejected() {
        let p = provider();
        let payload = br#"{"reference":"DUMMY_abc","status":"success"}"#;
        let tampered = br#"{"reference":"DUMMY_abc","status":"failed"}"#;
        let err = p
            .handle_webhook(tampered, &signed_headers(&p, payload))
            .unwrap_err();
        assert!(matches!(err, ProviderError::InvalidSignature { .. }));
    }

    #[test]
    fn test_unknown_status_fails_closed() {
        assert_eq!(
            DummyProvider::map_status("definitely_not_a_status"),
            PaymentStatus::Failed
        );
        assert_eq!(DummyProvider::map_status("success"), PaymentStatus::Completed);
        assert_eq!(DummyProvider::map_status("reversed"), PaymentStatus::Refunded);
    }

    #[tokio::test]
    async fn test_amount_ceiling_rejected() {
        let p = provider();
        let payment = crate::settlement::orchestrator::tests::payment_fixture(dec!(1500.00));
        let options = InitializeOptions {
            callback_url: None,
            customer_email: None,
            webhook_url: "https://api.paylink.test/webhooks/payments/dummy".to_string(),
            metadata: serde_json::json!({}),
        };
        let err = p.initialize_payment(&payment, &options).await.unwrap_err();
        assert!(matches!(err, ProviderError::Rejected { .. }));
    }

    #[tokio::test]
    async fn test_initialize_assigns_dummy_reference() {
        let p = provider();
        let payment = crate::settlement::orchestrator::tests::payment_fixture(dec!(100.00));
        let options = InitializeOptions {
            callback_url: None,
            customer_email: None,
            webhook_url: "https://api.paylink.test/webhooks/payments/dummy".to_string(),
            metadata: serde_json::json!({}),
        };
        let result = p.initialize_payment(&payment, &options).await.unwrap();
        assert!(result.reference.unwrap().starts_with("DUMMY_"));
        assert_eq!(result.status, PaymentStatus::Processing);
    }
}
