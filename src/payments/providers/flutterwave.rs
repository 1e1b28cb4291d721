//! Flutterwave payment provider implementation
//!
//! Integration with Flutterwave's v3 API. References are assigned on our
//! side (`FLW_` prefix) because the API keys payments by caller-supplied
//! `tx_ref`. Webhooks carry a shared secret in `verif-hash` (some accounts
//! send `X-Flutterwave-Signature`), compared in constant time rather than
//! verified as an HMAC.

use crate::config::FlutterwaveConfig;
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
use http::HeaderMap;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{error, info};
use uuid::Uuid;

const PROVIDER_NAME: &str = "flutterwave";

const SUPPORTED_METHODS: &[PaymentMethod] = &[
    PaymentMethod::Card,
    PaymentMethod::BankTransfer,
    PaymentMethod::MobileMoney,
];
const SUPPORTED_CURRENCIES: &[&str] = &["NGN", "GHS", "KES", "UGX", "TZS"];

/// Flutterwave payment provider
pub struct FlutterwaveProvider {
    config: FlutterwaveConfig,
    client: Client,
    fees: FeeCalculator,
    schedule: FeeSchedule,
}

impl FlutterwaveProvider {
    pub fn new(config: FlutterwaveConfig, fees: FeeCalculator) -> Result<Self, ProviderError> {
        if config.secret_key.trim().is_empty() {
            return Err(ProviderError::Configuration(
                "flutterwave secret key is empty".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ProviderError::Configuration(e.to_string()))?;

        let schedule = FeeSchedule {
            default_percent: Decimal::new(14, 3), // 1.4%
            method_percents: HashMap::from([
                (PaymentMethod::MobileMoney, Decimal::new(14, 3)),
                (PaymentMethod::BankTransfer, Decimal::new(1, 2)),
            ]),
            currency_percents: HashMap::new(),
            currency_caps: HashMap::from([("NGN".to_string(), Decimal::new(200000, 2))]),
        };

        Ok(Self {
            config,
            client,
            fees,
            schedule,
        })
    }

    async fn send<T>(
        &self,
        method: reqwest::Method,
        endpoint: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<T, ProviderError>
    where
        T: for<'de> Deserialize<'de>,
    {
        let url = format!("{}{}", self.config.base_url, endpoint);
        let mut request = self
            .client
            .request(method, &url)
            .bearer_auth(&self.config.secret_key);

        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ProviderError::from_transport(PROVIDER_NAME, e))?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();

        if !status.is_success() {
            error!("Flutterwave API error: HTTP {}: {}", status, text);
            return Err(ProviderError::Api {
                provider: PROVIDER_NAME,
                message: format!("HTTP {}: {}", status, text),
            });
        }

        let envelope: FlutterwaveResponse<T> = serde_json::from_str(&text).map_err(|e| {
            error!("Failed to parse Flutterwave response: {}", e);
            ProviderError::Api {
                provider: PROVIDER_NAME,
                message: format!("invalid response format: {}", e),
            }
        })?;

        if envelope.status != "success" {
            return Err(ProviderError::Rejected {
                provider: PROVIDER_NAME,
                message: envelope.message,
            });
        }

        Ok(envelope.data)
    }

    fn map_status(status: &str) -> PaymentStatus {
        match status {
            "successful" | "success" => PaymentStatus::Completed,
            "pending" => PaymentStatus::Pending,
            "processing" => PaymentStatus::Processing,
            "cancelled" => PaymentStatus::Cancelled,
            "reversed" | "refunded" => PaymentStatus::Refunded,
            _ => PaymentStatus::Failed,
        }
    }
}

#[async_trait]
impl PaymentGateway for FlutterwaveProvider {
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
        options: &InitializeOptions,
    ) -> Result<ProviderResult, ProviderError> {
        let tx_ref = format!("FLW_{}", Uuid::new_v4().simple());

        info!(
            payment_id = %payment.id,
            tx_ref = %tx_ref,
            amount = %payment.amount,
            currency = %payment.currency_code,
            "Initiating Flutterwave payment"
        );

        let email = options
            .customer_email
            .as_deref()
            .unwrap_or("payments@paylink.app");

        let mut payload = serde_json::json!({
            "tx_ref": tx_ref,
            "amount": payment.amount.to_string(),
            "currency": payment.currency_code,
            "customer": { "email": email },
            "meta": options.metadata,
        });

        if let Some(callback_url) = &options.callback_url {
            payload["redirect_url"] = serde_json::Value::String(callback_url.clone());
        }

        if let Some(phone) = &payment.phone_number {
            payload["customer"]["phonenumber"] = serde_json::Value::String(phone.clone());
        }

        let response: FlutterwavePaymentLink = self
            .send(reqwest::Method::POST, "/v3/payments", Some(&payload))
            .await?;

        Ok(ProviderResult {
            reference: Some(tx_ref.clone()),
            status: PaymentStatus::Processing,
            authorization_url: Some(response.link),
            provider_payment_method: Some(payment.payment_method.as_str().to_string()),
            gateway_response: None,
            paid_at: None,
            raw: serde_json::json!({ "tx_ref": tx_ref }),
        })
    }

    async fn verify_payment(&self, reference: &str) -> Result<ProviderResult, ProviderError> {
        info!(tx_ref = %reference, "Verifying Flutterwave payment");

        let response: FlutterwaveTransaction = self
            .send(
                reqwest::Method::GET,
                &format!(
                    "/v3/transactions/verify_by_reference?tx_ref={}",
                    reference
                ),
                None,
            )
            .await?;

        Ok(ProviderResult {
            reference: Some(reference.to_string()),
            status: Self::map_status(&response.status),
            authorization_url: None,
            provider_payment_method: response.payment_type.clone(),
            gateway_response: response.processor_response.clone(),
            paid_at: None,
            raw: serde_json::json!({
                "status": response.status,
                "amount": response.amount,
                "currency": response.currency,
                "payment_type": response.payment_type,
                "processor_response": response.processor_response,
            }),
        })
    }

    fn handle_webhook(
        &self,
        payload: &[u8],
        headers: &HeaderMap,
    ) -> Result<NormalizedWebhook, ProviderError> {
        let signature = header_value(headers, &["X-Flutterwave-Signature", "verif-hash"])
            .ok_or(ProviderError::InvalidSignature {
                provider: PROVIDER_NAME,
            })?;

        // Flutterwave echoes a configured shared secret, not a payload HMAC.
        if !constant_time_eq(self.config.webhook_secret.as_bytes(), signature.as_bytes()) {
            return Err(ProviderError::InvalidSignature {
                provider: PROVIDER_NAME,
            });
        }

        let event: FlutterwaveWebhookEvent =
            serde_json::from_slice(payload).map_err(|e| ProviderError::Api {
                provider: PROVIDER_NAME,
                message: format!("invalid webhook payload: {}", e),
            })?;

        Ok(NormalizedWebhook {
            reference: event.data.tx_ref,
            status: Self::map_status(&event.data.status),
            amount: event.data.amount,
            currency: event.data.currency,
            gateway_response: event.data.processor_response,
            channel: event.data.payment_type,
            paid_at: None,
            raw: serde_json::from_slice(payload).unwrap_or_default(),
        })
    }

    async fn refund_payment(
        &self,
        payment: &Payment,
        amount: Option<Decimal>,
        _reason: Option<&str>,
    ) -> Result<ProviderResult, ProviderError> {
        let reference = payment
            .provider_reference
            .as_deref()
            .ok_or(ProviderError::Rejected {
                provider: PROVIDER_NAME,
                message: "payment has no provider reference".to_string(),
            })?;

        let mut payload = serde_json::json!({});
        if let Some(amount) = amount {
            payload["amount"] = serde_json::Value::String(amount.to_string());
        }

        let response: serde_json::Value = self
            .send(
                reqwest::Method::POST,
                &format!("/v3/transactions/{}/refund", reference),
                Some(&payload),
            )
            .await?;

        Ok(ProviderResult {
            reference: Some(reference.to_string()),
            status: PaymentStatus::Refunded,
            authorization_url: None,
            provider_payment_method: None,
            gateway_response: None,
            paid_at: None,
            raw: response,
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

#[derive(Debug, Deserialize)]
struct FlutterwaveResponse<T> {
    status: String,
    message: String,
    data: T,
}

#[derive(Debug, Deserialize)]
struct FlutterwavePaymentLink {
    link: String,
}

#[derive(Debug, Deserialize)]
struct FlutterwaveTransaction {
    status: String,
    #[serde(default)]
    amount: Option<Decimal>,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    payment_type: Option<String>,
    #[serde(default)]
    processor_response: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FlutterwaveWebhookEvent {
    #[allow(dead_code)]
    #[serde(default)]
    event: Option<String>,
    data: FlutterwaveWebhookData,
}

#[derive(Debug, Deserialize)]
struct FlutterwaveWebhookData {
    tx_ref: String,
    status: String,
    #[serde(default)]
    amount: Option<Decimal>,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    payment_type: Option<String>,
    #[serde(default)]
    processor_response: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn create_test_provider() -> FlutterwaveProvider {
        let config = FlutterwaveConfig {
            secret_key: "FLWSECK_TEST-key".to_string(),
            webhook_secret: "hook-secret".to_string(),
            base_url: "https://api.flutterwave.com".to_string(),
            timeout_secs: 30,
        };
        FlutterwaveProvider::new(config, FeeCalculator::new(dec!(0.005), HashMap::new())).unwrap()
    }

    #[test]
    fn test_webhook_shared_secret_match() {
        let provider = create_test_provider();
        let payload =
            br#"{"event":"charge.completed","data":{"tx_ref":"FLW_1","status":"successful","amount":250.00,"currency":"KES"}}"#;

        let mut headers = HeaderMap::new();
        headers.insert("verif-hash", "hook-secret".parse().unwrap());
        let webhook = provider.handle_webhook(payload, &headers).unwrap();
        assert_eq!(webhook.reference, "FLW_1");
        assert_eq!(webhook.status, PaymentStatus::Completed);
        assert_eq!(webhook.amount, Some(dec!(250.00)));
    }

    #[test]
    fn test_webhook_wrong_secret_rejected() {
        let provider = create_test_provider();
        let payload = br#"{"data":{"tx_ref":"FLW_1","status":"successful"}}"#;
        let mut headers = HeaderMap::new();
        headers.insert("verif-hash", "wrong".parse().unwrap());
        assert!(matches!(
            provider.handle_webhook(payload, &headers),
            Err(ProviderError::InvalidSignature { .. })
        ));
    }

    #[test]
    fn test_status_map_fails_closed() {
        assert_eq!(
            FlutterwaveProvider::map_status("successful"),
            PaymentStatus::Completed
        );
        assert_eq!(
            FlutterwaveProvider::map_status("error"),
            PaymentStatus::Failed
        );
    }
}
