//! Paystack payment provider implementation
//!
//! Integration with Paystack's payment API for card, bank-transfer and
//! mobile-money collections in Nigeria (NGN), Ghana (GHS), South Africa
//! (ZAR) and Kenya (KES). Amounts go over the wire in the smallest currency
//! unit; webhooks are authenticated with an HMAC-SHA512 hex signature in
//! `X-Paystack-Signature`.

use crate::config::PaystackConfig;
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
use reqwest::Client;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use sha2::Sha512;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{error, info};

const PROVIDER_NAME: &str = "paystack";

const SUPPORTED_METHODS: &[PaymentMethod] = &[
    PaymentMethod::Card,
    PaymentMethod::BankTransfer,
    PaymentMethod::MobileMoney,
];
const SUPPORTED_CURRENCIES: &[&str] = &["NGN", "GHS", "ZAR", "KES"];

/// Paystack payment provider
pub struct PaystackProvider {
    config: PaystackConfig,
    client: Client,
    fees: FeeCalculator,
    schedule: FeeSchedule,
}

impl PaystackProvider {
    /// Create a new Paystack provider instance
    pub fn new(config: PaystackConfig, fees: FeeCalculator) -> Result<Self, ProviderError> {
        if config.secret_key.trim().is_empty() {
            return Err(ProviderError::Configuration(
                "paystack secret key is empty".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ProviderError::Configuration(e.to_string()))?;

        let schedule = FeeSchedule {
            default_percent: Decimal::new(15, 3), // 1.5%
            method_percents: HashMap::new(),
            currency_percents: HashMap::from([
                ("GHS".to_string(), Decimal::new(195, 4)), // 1.95%
                ("ZAR".to_string(), Decimal::new(29, 3)),  // 2.9%
                ("KES".to_string(), Decimal::new(29, 3)),
            ]),
            currency_caps: HashMap::from([("NGN".to_string(), Decimal::new(200000, 2))]),
        };

        Ok(Self {
            config,
            client,
            fees,
            schedule,
        })
    }

    /// Make an authenticated request to the Paystack API
    async fn make_request<T>(
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
            .header("Authorization", format!("Bearer {}", self.config.secret_key))
            .header("Content-Type", "application/json");

        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ProviderError::from_transport(PROVIDER_NAME, e))?;

        let status = response.status();
        let response_text = response.text().await.unwrap_or_default();

        if !status.is_success() {
            error!("Paystack API error: HTTP {}: {}", status, response_text);
            return Err(ProviderError::Api {
                provider: PROVIDER_NAME,
                message: format!("HTTP {}: {}", status, response_text),
            });
        }

        let envelope: PaystackResponse<T> =
            serde_json::from_str(&response_text).map_err(|e| {
                error!("Failed to parse Paystack response: {}", e);
                ProviderError::Api {
                    provider: PROVIDER_NAME,
                    message: format!("invalid response format: {}", e),
                }
            })?;

        if !envelope.status {
            error!("Paystack API error: {}", envelope.message);
            return Err(ProviderError::Rejected {
                provider: PROVIDER_NAME,
                message: envelope.message,
            });
        }

        Ok(envelope.data)
    }

    fn map_status(status: &str) -> PaymentStatus {
        match status {
            "success" => PaymentStatus::Completed,
            "pending" => PaymentStatus::Pending,
            "ongoing" | "processing" | "send_otp" | "pay_offline" => PaymentStatus::Processing,
            "abandoned" => PaymentStatus::Cancelled,
            "reversed" => PaymentStatus::Refunded,
            _ => PaymentStatus::Failed,
        }
    }

    fn channel_for(method: PaymentMethod) -> &'static str {
        match method {
            PaymentMethod::Card => "card",
            PaymentMethod::BankTransfer => "bank_transfer",
            PaymentMethod::MobileMoney => "mobile_money",
        }
    }

    /// Amount in the smallest currency unit, as Paystack expects.
    fn minor_units(amount: Decimal) -> Result<i64, ProviderError> {
        (amount * Decimal::from(100))
            .round()
            .to_i64()
            .ok_or_else(|| ProviderError::Rejected {
                provider: PROVIDER_NAME,
                message: format!("amount {} cannot be represented in minor units", amount),
            })
    }

    fn parse_paid_at(raw: Option<&str>) -> Option<DateTime<Utc>> {
        raw.and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }
}

#[async_trait]
impl PaymentGateway for PaystackProvider {
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
        info!(
            payment_id = %payment.id,
            amount = %payment.amount,
            currency = %payment.currency_code,
            "Initiating Paystack payment"
        );

        let email = options
            .customer_email
            .as_deref()
            .ok_or(ProviderError::Rejected {
                provider: PROVIDER_NAME,
                message: "paystack requires a customer email".to_string(),
            })?;

        let mut payload = serde_json::json!({
            "email": email,
            "amount": Self::minor_units(payment.amount)?,
            "currency": payment.currency_code,
            "channels": [Self::channel_for(payment.payment_method)],
            "metadata": options.metadata,
        });

        if let Some(callback_url) = &options.callback_url {
            payload["callback_url"] = serde_json::Value::String(callback_url.clone());
        }

        let response: PaystackInitializeResponse = self
            .make_request(reqwest::Method::POST, "/transaction/initialize", Some(&payload))
            .await?;

        info!(
            payment_id = %payment.id,
            reference = %response.reference,
            "Paystack payment initiated successfully"
        );

        Ok(ProviderResult {
            reference: Some(response.reference.clone()),
            status: PaymentStatus::Processing,
            authorization_url: Some(response.authorization_url),
            provider_payment_method: Some(Self::channel_for(payment.payment_method).to_string()),
            gateway_response: None,
            paid_at: None,
            raw: serde_json::json!({
                "access_code": response.access_code,
                "reference": response.reference,
            }),
        })
    }

    async fn verify_payment(&self, reference: &str) -> Result<ProviderResult, ProviderError> {
        info!(reference = %reference, "Verifying Paystack payment");

        let response: PaystackVerifyResponse = self
            .make_request(
                reqwest::Method::GET,
                &format!("/transaction/verify/{}", reference),
                None,
            )
            .await?;

        info!(
            reference = %reference,
            status = %response.status,
            "Paystack payment verified"
        );

        Ok(ProviderResult {
            reference: Some(reference.to_string()),
            status: Self::map_status(&response.status),
            authorization_url: None,
            provider_payment_method: Some(response.channel.clone()),
            gateway_response: response.gateway_response.clone(),
            paid_at: Self::parse_paid_at(response.paid_at.as_deref()),
            raw: serde_json::json!({
                "status": response.status,
                "amount": response.amount,
                "currency": response.currency,
                "channel": response.channel,
                "gateway_response": response.gateway_response,
            }),
        })
    }

    fn handle_webhook(
        &self,
        payload: &[u8],
        headers: &HeaderMap,
    ) -> Result<NormalizedWebhook, ProviderError> {
        let signature = header_value(headers, &["X-Paystack-Signature"]).ok_or(
            ProviderError::InvalidSignature {
                provider: PROVIDER_NAME,
            },
        )?;

        let mut mac = Hmac::<Sha512>::new_from_slice(self.config.secret_key.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(payload);
        let computed = hex::encode(mac.finalize().into_bytes());

        if !constant_time_eq(computed.as_bytes(), signature.as_bytes()) {
            return Err(ProviderError::InvalidSignature {
                provider: PROVIDER_NAME,
            });
        }

        let event: PaystackWebhookEvent =
            serde_json::from_slice(payload).map_err(|e| ProviderError::Api {
                provider: PROVIDER_NAME,
                message: format!("invalid webhook payload: {}", e),
            })?;

        let amount = event
            .data
            .amount
            .map(|minor| Decimal::from(minor) / Decimal::from(100));

        Ok(NormalizedWebhook {
            reference: event.data.reference,
            status: Self::map_status(&event.data.status),
            amount,
            currency: event.data.currency,
            gateway_response: event.data.gateway_response,
            channel: event.data.channel,
            paid_at: Self::parse_paid_at(event.data.paid_at.as_deref()),
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
            .as_deref()
            .ok_or(ProviderError::Rejected {
                provider: PROVIDER_NAME,
                message: "payment has no provider reference".to_string(),
            })?;

        let mut payload = serde_json::json!({ "transaction": reference });
        if let Some(amount) = amount {
            payload["amount"] = serde_json::Value::from(Self::minor_units(amount)?);
        }
        if let Some(reason) = reason {
            payload["merchant_note"] = serde_json::Value::String(reason.to_string());
        }

        let response: serde_json::Value = self
            .make_request(reqwest::Method::POST, "/refund", Some(&payload))
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

// Paystack API response wrapper
#[derive(Debug, Deserialize)]
struct PaystackResponse<T> {
    status: bool,
    message: String,
    data: T,
}

// Initialize transaction response
#[derive(Debug, Deserialize)]
struct PaystackInitializeResponse {
    authorization_url: String,
    access_code: String,
    reference: String,
}

// Verify transaction response
#[derive(Debug, Deserialize)]
struct PaystackVerifyResponse {
    amount: u64,
    currency: String,
    status: String,
    channel: String,
    #[serde(default)]
    paid_at: Option<String>,
    #[serde(default)]
    gateway_response: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PaystackWebhookEvent {
    #[allow(dead_code)]
    #[serde(default)]
    event: Option<String>,
    data: PaystackWebhookData,
}

#[derive(Debug, Deserialize)]
struct PaystackWebhookData {
    reference: String,
    status: String,
    #[serde(default)]
    amount: Option<i64>,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    gateway_response: Option<String>,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    paid_at: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn create_test_provider() -> PaystackProvider {
        let config = PaystackConfig {
            secret_key: "sk_test_test_key".to_string(),
            base_url: "https://api.paystack.co".to_string(),
            timeout_secs: 30,
        };
        PaystackProvider::new(config, FeeCalculator::new(dec!(0.005), HashMap::new())).unwrap()
    }

    fn signed_headers(secret: &str, payload: &[u8]) -> HeaderMap {
        let mut mac = Hmac::<Sha512>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(payload);
        let mut headers = HeaderMap::new();
        headers.insert(
            "X-Paystack-Signature",
            hex::encode(mac.finalize().into_bytes()).parse().unwrap(),
        );
        headers
    }

    #[test]
    fn test_webhook_signature_validation_invalid() {
        let provider = create_test_provider();
        let payload = br#"{"data":{"reference":"ref_1","status":"success"}}"#;
        let mut headers = HeaderMap::new();
        headers.insert("X-Paystack-Signature", "invalid_signature".parse().unwrap());
        let result = provider.handle_webhook(payload, &headers);
        assert!(matches!(
            result,
            Err(ProviderError::InvalidSignature { .. })
        ));
    }

    #[test]
    fn test_webhook_normalizes_minor_units() {
        let provider = create_test_provider();
        let payload =
            br#"{"event":"charge.success","data":{"reference":"ref_1","status":"success","amount":10000,"currency":"GHS","channel":"mobile_money"}}"#;
        let headers = signed_headers("sk_test_test_key", payload);
        let webhook = provider.handle_webhook(payload, &headers).unwrap();
        assert_eq!(webhook.status, PaymentStatus::Completed);
        assert_eq!(webhook.amount, Some(dec!(100)));
        assert_eq!(webhook.channel.as_deref(), Some("mobile_money"));
    }

    #[test]
    fn test_status_map_fails_closed() {
        assert_eq!(PaystackProvider::map_status("success"), PaymentStatus::Completed);
        assert_eq!(PaystackProvider::map_status("reversed"), PaymentStatus::Refunded);
        assert_eq!(PaystackProvider::map_status("abandoned"), PaymentStatus::Cancelled);
        assert_eq!(PaystackProvider::map_status("whatever"), PaymentStatus::Failed);
    }

    #[test]
    fn test_minor_units_rounding() {
        assert_eq!(PaystackProvider::minor_units(dec!(100.00)).unwrap(), 10000);
        assert_eq!(PaystackProvider::minor_units(dec!(0.01)).unwrap(), 1);
    }

    #[test]
    fn test_empty_secret_key_rejected() {
        let config = PaystackConfig {
            secret_key: "  ".to_string(),
            base_url: "https://api.paystack.co".to_string(),
            timeout_secs: 30,
        };
        let result = PaystackProvider::new(config, FeeCalculator::new(dec!(0.005), HashMap::new()));
        assert!(matches!(result, Err(ProviderError::Configuration(_))));
    }
}
