//! Payment gateway trait definition
//!
//! Defines the capability contract every payment rail adapter must
//! implement. The settlement orchestrator only ever talks to rails through
//! this trait; wire formats, auth schemes and status vocabularies stay
//! inside the adapters.

use crate::database::payment_repository::Payment;
use crate::payments::error::ProviderError;
use crate::payments::types::{
    FeeBreakdown, InitializeOptions, NormalizedWebhook, PaymentMethod, ProviderResult,
};
use async_trait::async_trait;
use http::HeaderMap;
use rust_decimal::Decimal;

/// Capability contract for a payment rail adapter.
///
/// Adapters are process-wide and stateless apart from their configuration,
/// so they are safe to share across concurrent settlement operations.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Stable identifier. Used as the `provider` column value and to route
    /// inbound webhooks.
    fn name(&self) -> &'static str;

    /// Payment methods this rail can settle.
    fn supported_payment_methods(&self) -> &[PaymentMethod];

    /// ISO 4217 currency codes this rail can settle.
    fn supported_currencies(&self) -> &[&'static str];

    /// Begin the transfer with the external rail.
    ///
    /// The orchestrator guarantees this is called at most once per payment;
    /// adapters are not required to deduplicate internally. Fails with
    /// `ProviderError` when the remote call errors, times out, or the
    /// adapter applies its own business rule (e.g. an amount ceiling).
    async fn initialize_payment(
        &self,
        payment: &Payment,
        options: &InitializeOptions,
    ) -> Result<ProviderResult, ProviderError>;

    /// Poll the current status of a payment from the rail. Pure query, safe
    /// to call repeatedly.
    async fn verify_payment(&self, reference: &str) -> Result<ProviderResult, ProviderError>;

    /// Validate an inbound webhook's authenticity and normalize it.
    ///
    /// Fails with `ProviderError::InvalidSignature` when the signature
    /// header is absent or does not verify. Provider status strings are
    /// mapped through the adapter's lookup table; unknown statuses map to
    /// `failed`.
    fn handle_webhook(
        &self,
        payload: &[u8],
        headers: &HeaderMap,
    ) -> Result<NormalizedWebhook, ProviderError>;

    /// Refund a completed payment, fully or partially.
    async fn refund_payment(
        &self,
        payment: &Payment,
        amount: Option<Decimal>,
        reason: Option<&str>,
    ) -> Result<ProviderResult, ProviderError> {
        let _ = (payment, amount, reason);
        Err(ProviderError::Unsupported {
            provider: self.name(),
            capability: "refunds",
        })
    }

    /// Fee breakdown for one (amount, currency, method) combination on this
    /// rail, including the platform service fee.
    fn calculate_fees(
        &self,
        amount: Decimal,
        currency: &str,
        method: PaymentMethod,
    ) -> FeeBreakdown;

    /// Whether this rail can settle the given (method, currency) pair.
    fn supports(&self, method: PaymentMethod, currency: &str) -> bool {
        self.supported_payment_methods().contains(&method)
            && self.supports_currency(currency)
    }

    fn supports_currency(&self, currency: &str) -> bool {
        self.supported_currencies()
            .iter()
            .any(|c| c.eq_ignore_ascii_case(currency))
    }
}
