//! MTN Mobile Money provider implementation
//!
//! Collection flow against the MTN MoMo Open API: a basic-auth token
//! exchange guarded by an `Ocp-Apim-Subscription-Key`, then `requesttopay`
//! with a caller-generated `X-Reference-Id` that becomes our provider
//! reference. MTN's status vocabulary is upper-case
//! (SUCCESSFUL/PENDING/FAILED).

use crate::config::MtnMomoConfig;
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
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::{Hmac, Mac};
use http::HeaderMap;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use sha2::Sha256;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{error, info};
use uuid::Uuid;

const PROVIDER_NAME: &str = "mtn_momo";

const SUPPORTED_METHODS: &[PaymentMethod] = &[PaymentMethod::MobileMoney];
const SUPPORTED_CURRENCIES: &[&str] = &["GHS", "UGX", "XAF", "EUR"];

/// MTN MoMo collection provider
pub struct MtnMomoProvider {
    config: MtnMomoConfig,
    client: Client,
    fees: FeeCalculator,
    schedule: FeeSchedule,
}

impl MtnMomoProvider {
    pub fn new(config: MtnMomoConfig, fees: FeeCalculator) -> Result<Self, ProviderError> {
        if config.api_user.trim().is_empty() || config.api_key.trim().is_empty() {
            return Err(ProviderError::Configuration(
                "mtn momo api credentials are empty".to_string(),
            ));
        }

        // An empty HMAC key would let anyone forge webhook signatures.
        if config.webhook_secret.trim().is_empty() {
            return Err(ProviderError::Configuration(
                "mtn momo webhook secret is empty".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ProviderError::Configuration(e.to_string()))?;

        let schedule = FeeSchedule {
            default_percent: Decimal::new(1, 2), // 1%
            method_percents: HashMap::new(),
            currency_percents: HashMap::new(),
            currency_caps: HashMap::from([("GHS".to_string(), Decimal::new(1000, 2))]),
        };

        Ok(Self {
            config,
            client,
            fees,
            schedule,
        })
    }

    /// Exchange basic credentials for a short-lived bearer token. Fetched
    /// per call; the adapter keeps no per-request mutable state.
    async fn access_token(&self) -> Result<String, ProviderError> {
        let basic = BASE64.encode(format!(
            "{}:{}",
            self.config.api_user, self.config.api_key
        ));

        let response = self
            .client
            .post(format!("{}/collection/token/", self.config.base_url))
            .header("Authorization", format!("Basic {}", basic))
            .header("Ocp-Apim-Subscription-Key", &self.config.subscription_key)
            .send()
            .await
            .map_err(|e| ProviderError::from_transport(PROVIDER_NAME, e))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            error!("MTN MoMo token exchange failed: HTTP {}: {}", status, text);
            return Err(ProviderError::Api {
                provider: PROVIDER_NAME,
                message: format!("token exchange failed: HTTP {}", status),
            });
        }

        let token: MomoTokenResponse = response.json().await.map_err(|e| ProviderError::Api {
            provider: PROVIDER_NAME,
            message: format!("invalid token response: {}", e),
        })?;

        Ok(token.access_token)
    }

    fn map_status(status: &str) -> PaymentStatus {
        match status {
            "SUCCESSFUL" => PaymentStatus::Completed,
            "PENDING" => PaymentStatus::Processing,
            "CANCELLED" => PaymentStatus::Cancelled,
            _ => PaymentStatus::Failed,
        }
    }
}

#[derive(Debug, Deserialize)]
struct MomoTokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct MomoRequestToPayStatus {
    status: String,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    amount: Option<Decimal>,
    #[serde(default)]
    currency: Option<String>,
    #[serde(rename = "financialTransactionId", default)]
    financial_transaction_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MomoWebhookPayload {
    #[serde(rename = "referenceId")]
    reference_id: String,
    status: String,
    #[serde(default)]
    amount: Option<Decimal>,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    reason: Option<String>,
}

#[async_trait]
impl PaymentGateway for MtnMomoProvider {
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
        let phone = payment
            .phone_number
            .as_deref()
            .ok_or(ProviderError::Rejected {
                provider: PROVIDER_NAME,
                message: "mobile money requires a phone number".to_string(),
            })?;

        // We assign the reference; MTN echoes it back on status queries and
        // webhooks.
        let reference = Uuid::new_v4().to_string();

        info!(
            payment_id = %payment.id,
            reference = %reference,
            amount = %payment.amount,
            currency = %payment.currency_code,
            "Initiating MTN MoMo request-to-pay"
        );

        let token = self.access_token().await?;

        let payload = serde_json::json!({
            "amount": payment.amount.to_string(),
            "currency": payment.currency_code,
            "externalId": payment.id.to_string(),
            "payer": {
                "partyIdType": "MSISDN",
                "partyId": phone.trim_start_matches('+'),
            },
            "payerMessage": "PayLink payment request",
            "payeeNote": options
                .metadata
                .get("payment_id")
                .and_then(|v| v.as_str())
                .unwrap_or("PayLink settlement"),
        });

        let response = self
            .client
            .post(format!(
                "{}/collection/v1_0/requesttopay",
                self.config.base_url
            ))
            .bearer_auth(&token)
            .header("X-Reference-Id", &reference)
            .header("X-Target-Environment", &self.config.target_environment)
            .header("Ocp-Apim-Subscription-Key", &self.config.subscription_key)
            .header("X-Callback-Url", &options.webhook_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ProviderError::from_transport(PROVIDER_NAME, e))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            error!(
                payment_id = %payment.id,
                "MTN MoMo requesttopay failed: HTTP {}: {}",
                status, text
            );
            return Err(ProviderError::Api {
                provider: PROVIDER_NAME,
                message: format!("requesttopay failed: HTTP {}: {}", status, text),
            });
        }

        Ok(ProviderResult {
            reference: Some(reference.clone()),
            status: PaymentStatus::Processing,
            authorization_url: None,
            provider_payment_method: Some("mtn_momo".to_string()),
            gateway_response: Some("request-to-pay accepted".to_string()),
            paid_at: None,
            raw: serde_json::json!({ "reference": reference }),
        })
    }

    async fn verify_payment(&self, reference: &str) -> Result<ProviderResult, ProviderError> {
        info!(reference = %reference, "Verifying MTN MoMo payment");

        let token = self.access_token().await?;

        let response = self
            .client
            .get(format!(
                "{}/collection/v1_0/requesttopay/{}",
                self.config.base_url, reference
            ))
            .bearer_auth(&token)
            .header("X-Target-Environment", &self.config.target_environment)
            .header("Ocp-Apim-Subscription-Key", &self.config.subscription_key)
            .send()
            .await
            .map_err(|e| ProviderError::from_transport(PROVIDER_NAME, e))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(ProviderError::Api {
                provider: PROVIDER_NAME,
                message: format!("status query failed: HTTP {}", status),
            });
        }

        let status: MomoRequestToPayStatus =
            response.json().await.map_err(|e| ProviderError::Api {
                provider: PROVIDER_NAME,
                message: format!("invalid status response: {}", e),
            })?;

        Ok(ProviderResult {
            reference: Some(reference.to_string()),
            status: Self::map_status(&status.status),
            authorization_url: None,
            provider_payment_method: Some("mtn_momo".to_string()),
            gateway_response: status.reason.clone(),
            paid_at: None,
            raw: serde_json::json!({
                "status": status.status,
                "amount": status.amount,
                "currency": status.currency,
                "financialTransactionId": status.financial_transaction_id,
                "reason": status.reason,
            }),
        })
    }

    fn handle_webhook(
        &self,
        payload: &[u8],
        headers: &HeaderMap,
    ) -> Result<NormalizedWebhook, ProviderError> {
        let signature = header_value(headers, &["X-MTN-Signature"]).ok_or(
            ProviderError::InvalidSignature {
                provider: PROVIDER_NAME,
            },
        )?;

        let mut mac = Hmac::<Sha256>::new_from_slice(self.config.webhook_secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(payload);
        let computed = hex::encode(mac.finalize().into_bytes());

        if !constant_time_eq(computed.as_bytes(), signature.as_bytes()) {
            return Err(ProviderError::InvalidSignature {
                provider: PROVIDER_NAME,
            });
        }

        let parsed: MomoWebhookPayload =
            serde_json::from_slice(payload).map_err(|e| ProviderError::Api {
                provider: PROVIDER_NAME,
                message: format!("invalid webhook payload: {}", e),
            })?;

        Ok(NormalizedWebhook {
            reference: parsed.reference_id,
            status: Self::map_status(&parsed.status),
            amount: parsed.amount,
            currency: parsed.currency,
            gateway_response: parsed.reason,
            channel: Some("mtn_momo".to_string()),
            paid_at: None,
            raw: serde_json::from_slice(payload).unwrap_or_default(),
        })
    }

    // MTN collections have no refund API here; the default Unsupported
    // implementation applies.

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

    fn create_test_provider() -> MtnMomoProvider {
        let config = MtnMomoConfig {
            api_user: "user".to_string(),
            api_key: "key".to_string(),
            subscription_key: "sub".to_string(),
            base_url: "https://sandbox.momodeveloper.mtn.com".to_string(),
            target_environment: "sandbox".to_string(),
            webhook_secret: "momo-secret".to_string(),
            timeout_secs: 30,
        };
        MtnMomoProvider::new(config, FeeCalculator::new(dec!(0.005), HashMap::new())).unwrap()
    }

    #[test]
    fn test_status_map_upper_case_vocabulary() {
        assert_eq!(
            MtnMomoProvider::map_status("SUCCESSFUL"),
            PaymentStatus::Completed
        );
        assert_eq!(
            MtnMomoProvider::map_status("PENDING"),
            PaymentStatus::Processing
        );
        assert_eq!(MtnMomoProvider::map_status("FAILED"), PaymentStatus::Failed);
        // lower case is not MTN vocabulary, fail closed
        assert_eq!(
            MtnMomoProvider::map_status("successful"),
            PaymentStatus::Failed
        );
    }

    #[test]
    fn test_webhook_hmac_validation() {
        let provider = create_test_provider();
        let payload = br#"{"referenceId":"3f6c1c21","status":"SUCCESSFUL","amount":"50.00","currency":"GHS"}"#;

        let mut mac = Hmac::<Sha256>::new_from_slice(b"momo-secret").unwrap();
        mac.update(payload);
        let signature = hex::encode(mac.finalize().into_bytes());

        let mut headers = HeaderMap::new();
        headers.insert("X-MTN-Signature", signature.parse().unwrap());

        let webhook = provider.handle_webhook(payload, &headers).unwrap();
        assert_eq!(webhook.reference, "3f6c1c21");
        assert_eq!(webhook.status, PaymentStatus::Completed);
        assert_eq!(webhook.amount, Some(dec!(50.00)));
    }

    #[test]
    fn test_webhook_missing_signature_rejected() {
        let provider = create_test_provider();
        let payload = br#"{"referenceId":"3f6c1c21","status":"SUCCESSFUL"}"#;
        assert!(matches!(
            provider.handle_webhook(payload, &HeaderMap::new()),
            Err(ProviderError::InvalidSignature { .. })
        ));
    }

    #[test]
    fn test_empty_webhook_secret_rejected() {
        let config = MtnMomoConfig {
            api_user: "user".to_string(),
            api_key: "key".to_string(),
            subscription_key: "sub".to_string(),
            base_url: "https://sandbox.momodeveloper.mtn.com".to_string(),
            target_environment: "sandbox".to_string(),
            webhook_secret: "  ".to_string(),
            timeout_secs: 30,
        };
        let result = MtnMomoProvider::new(config, FeeCalculator::new(dec!(0.005), HashMap::new()));
        assert!(matches!(result, Err(ProviderError::Configuration(_))));
    }

    #[test]
    fn test_only_mobile_money_supported() {
        let provider = create_test_provider();
        assert!(provider.supports(PaymentMethod::MobileMoney, "GHS"));
        assert!(!provider.supports(PaymentMethod::Card, "GHS"));
        assert!(!provider.supports(PaymentMethod::MobileMoney, "NGN"));
    }
}
