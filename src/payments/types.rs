//! Payment types and data structures
//!
//! Common types used across all payment providers and the settlement
//! orchestrator: the payment method and status vocabularies, the request and
//! result shapes adapters exchange with the orchestrator, and the fee
//! breakdown returned by the fee calculator.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How the payer wants to move money.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum PaymentMethod {
    MobileMoney,
    Card,
    BankTransfer,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::MobileMoney => "mobile_money",
            PaymentMethod::Card => "card",
            PaymentMethod::BankTransfer => "bank_transfer",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "mobile_money" => Some(PaymentMethod::MobileMoney),
            "card" => Some(PaymentMethod::Card),
            "bank_transfer" => Some(PaymentMethod::BankTransfer),
            _ => None,
        }
    }

    /// Mobile-money rails deliver to a wallet addressed by phone number.
    pub fn requires_phone_number(&self) -> bool {
        matches!(self, PaymentMethod::MobileMoney)
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of one settlement attempt.
///
/// `Pending` and `Processing` are the only non-terminal states. Adapters map
/// their own status vocabularies onto this enum; anything they cannot map
/// becomes `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Processing => "processing",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Cancelled => "cancelled",
            PaymentStatus::Refunded => "refunded",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(PaymentStatus::Pending),
            "processing" => Some(PaymentStatus::Processing),
            "completed" => Some(PaymentStatus::Completed),
            "failed" => Some(PaymentStatus::Failed),
            "cancelled" => Some(PaymentStatus::Cancelled),
            "refunded" => Some(PaymentStatus::Refunded),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Completed
                | PaymentStatus::Failed
                | PaymentStatus::Cancelled
                | PaymentStatus::Refunded
        )
    }

    /// Validates if a state transition is allowed. There is no edge out of a
    /// terminal state; callers treat a transition attempt on a terminal
    /// payment as an idempotent no-op, not an error.
    pub fn can_transition_to(&self, next: &PaymentStatus) -> bool {
        match (self, next) {
            (PaymentStatus::Pending, PaymentStatus::Processing) => true,
            (PaymentStatus::Pending, PaymentStatus::Failed) => true,
            (PaymentStatus::Processing, PaymentStatus::Completed) => true,
            (PaymentStatus::Processing, PaymentStatus::Failed) => true,
            (PaymentStatus::Processing, PaymentStatus::Refunded) => true,
            // Explicit cancellation from any non-terminal state.
            (from, PaymentStatus::Cancelled) if !from.is_terminal() => true,
            _ => false,
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options passed to an adapter when initializing a payment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitializeOptions {
    /// URL to redirect the payer to after a hosted checkout, when the rail
    /// supports one.
    pub callback_url: Option<String>,
    /// Payer email, required by rails with hosted checkouts.
    pub customer_email: Option<String>,
    /// Provider-scoped webhook URL the rail should deliver notifications to.
    pub webhook_url: String,
    /// Platform metadata forwarded to the rail (links back to the payment).
    pub metadata: serde_json::Value,
}

/// Normalized result of an adapter call (initialize, verify or refund).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResult {
    /// The rail's transaction identifier, when one was assigned.
    pub reference: Option<String>,
    /// Provider status mapped onto the internal vocabulary.
    pub status: PaymentStatus,
    /// Authorization URL for redirect-based payments.
    pub authorization_url: Option<String>,
    /// Rail-side payment instrument, e.g. the mobile-money network.
    pub provider_payment_method: Option<String>,
    /// Human-readable gateway response, when the rail supplies one.
    pub gateway_response: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    /// Raw provider response for audit storage.
    pub raw: serde_json::Value,
}

/// A webhook payload after signature validation and status normalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedWebhook {
    /// Provider reference identifying the payment this notification is for.
    pub reference: String,
    pub status: PaymentStatus,
    pub amount: Option<Decimal>,
    pub currency: Option<String>,
    pub gateway_response: Option<String>,
    pub channel: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub raw: serde_json::Value,
}

/// Transient payment-shaped probe used for provider selection before any
/// record is persisted.
#[derive(Debug, Clone)]
pub struct PaymentProbe {
    pub amount: Decimal,
    pub currency_code: String,
    pub payment_method: Option<PaymentMethod>,
    pub phone_number: Option<String>,
}

/// Fee breakdown for one (amount, currency, method) combination.
///
/// Every field is rounded to 2 decimal places; `total_amount` is always the
/// exact sum of `base_amount`, `service_fee` and `provider_fee`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeBreakdown {
    pub base_amount: Decimal,
    pub service_fee: Decimal,
    pub provider_fee: Decimal,
    /// Label for the provider fee line, e.g. `"paystack_fee"`.
    pub provider_fee_label: String,
    pub total_fees: Decimal,
    pub total_amount: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip() {
        for s in [
            PaymentStatus::Pending,
            PaymentStatus::Processing,
            PaymentStatus::Completed,
            PaymentStatus::Failed,
            PaymentStatus::Cancelled,
            PaymentStatus::Refunded,
        ] {
            assert_eq!(PaymentStatus::from_str(s.as_str()), Some(s));
        }
        assert_eq!(PaymentStatus::from_str("success"), None);
    }

    #[test]
    fn test_normal_flow_transitions() {
        assert!(PaymentStatus::Pending.can_transition_to(&PaymentStatus::Processing));
        assert!(PaymentStatus::Processing.can_transition_to(&PaymentStatus::Completed));
        assert!(PaymentStatus::Pending.can_transition_to(&PaymentStatus::Failed));
        assert!(PaymentStatus::Processing.can_transition_to(&PaymentStatus::Failed));
    }

    #[test]
    fn test_no_transition_out_of_terminal_states() {
        let terminal = [
            PaymentStatus::Completed,
            PaymentStatus::Failed,
            PaymentStatus::Cancelled,
            PaymentStatus::Refunded,
        ];
        let all = [
            PaymentStatus::Pending,
            PaymentStatus::Processing,
            PaymentStatus::Completed,
            PaymentStatus::Failed,
            PaymentStatus::Cancelled,
            PaymentStatus::Refunded,
        ];
        for from in terminal {
            assert!(from.is_terminal());
            for to in all {
                assert!(
                    !from.can_transition_to(&to),
                    "{} -> {} must be rejected",
                    from,
                    to
                );
            }
        }
    }

    #[test]
    fn test_cancellation_from_non_terminal_states() {
        assert!(PaymentStatus::Pending.can_transition_to(&PaymentStatus::Cancelled));
        assert!(PaymentStatus::Processing.can_transition_to(&PaymentStatus::Cancelled));
        assert!(!PaymentStatus::Completed.can_transition_to(&PaymentStatus::Cancelled));
    }

    #[test]
    fn test_mobile_money_requires_phone() {
        assert!(PaymentMethod::MobileMoney.requires_phone_number());
        assert!(!PaymentMethod::Card.requires_phone_number());
        assert!(!PaymentMethod::BankTransfer.requires_phone_number());
    }
}
