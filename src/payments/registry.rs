//! Provider registry and selection.
//!
//! Holds the enabled adapters keyed by name and resolves the best provider
//! for a payment with an ordered strategy: the payer's stored preference,
//! then capability matches on (method, currency), then currency alone, then
//! a phone-prefix heuristic, then the configured default. A provider that
//! fails to construct is skipped with a warning; configuration problems on
//! one rail must never take selection down while another rail remains
//! viable.

use crate::config::PaymentsConfig;
use crate::payments::error::ProviderError;
use crate::payments::fees::FeeCalculator;
use crate::payments::providers::{
    DummyProvider, FlutterwaveProvider, MtnMomoProvider, PaystackProvider,
};
use crate::payments::traits::PaymentGateway;
use crate::payments::types::{PaymentMethod, PaymentProbe};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{info, warn};

/// Country phone prefix to preferred provider. Only consulted when earlier
/// selection rules found nothing.
const COUNTRY_PREFERENCES: &[(&str, &str)] = &[
    ("+233", "mtn_momo"),    // Ghana
    ("+234", "paystack"),    // Nigeria
    ("+254", "flutterwave"), // Kenya
    ("+256", "flutterwave"), // Uganda
    ("+27", "paystack"),     // South Africa
];

pub struct ProviderRegistry {
    /// Adapters in configured order; capability scans walk this and take the
    /// first match.
    adapters: Vec<Arc<dyn PaymentGateway>>,
    /// Name index over `adapters`.
    by_name: HashMap<String, Arc<dyn PaymentGateway>>,
    default_provider: String,
}

impl ProviderRegistry {
    /// Build the registry from configuration, constructing every enabled
    /// adapter that has credentials. Construction failures are logged and
    /// skipped.
    pub fn from_config(config: &PaymentsConfig) -> Self {
        let fees = FeeCalculator::new(
            config.service_fee_percent,
            config.service_fee_overrides.clone(),
        );

        let mut adapters: Vec<Arc<dyn PaymentGateway>> = Vec::new();

        for name in &config.enabled_providers {
            let built: Result<Arc<dyn PaymentGateway>, ProviderError> = match name.as_str() {
                "paystack" => match &config.paystack {
                    Some(cfg) => PaystackProvider::new(cfg.clone(), fees.clone())
                        .map(|p| Arc::new(p) as Arc<dyn PaymentGateway>),
                    None => Err(ProviderError::Configuration(
                        "paystack enabled but not configured".to_string(),
                    )),
                },
                "flutterwave" => match &config.flutterwave {
                    Some(cfg) => FlutterwaveProvider::new(cfg.clone(), fees.clone())
                        .map(|p| Arc::new(p) as Arc<dyn PaymentGateway>),
                    None => Err(ProviderError::Configuration(
                        "flutterwave enabled but not configured".to_string(),
                    )),
                },
                "mtn_momo" => match &config.mtn_momo {
                    Some(cfg) => MtnMomoProvider::new(cfg.clone(), fees.clone())
                        .map(|p| Arc::new(p) as Arc<dyn PaymentGateway>),
                    None => Err(ProviderError::Configuration(
                        "mtn_momo enabled but not configured".to_string(),
                    )),
                },
                "dummy" => match &config.dummy {
                    Some(cfg) => {
                        Ok(Arc::new(DummyProvider::new(cfg.clone(), fees.clone()))
                            as Arc<dyn PaymentGateway>)
                    }
                    None => Err(ProviderError::Configuration(
                        "dummy enabled but not configured".to_string(),
                    )),
                },
                other => Err(ProviderError::Configuration(format!(
                    "unknown provider '{}'",
                    other
                ))),
            };

            match built {
                Ok(adapter) => {
                    info!(provider = %adapter.name(), "payment provider registered");
                    adapters.push(adapter);
                }
                Err(e) => {
                    // Skip and keep scanning; one broken rail must not take
                    // the others down.
                    warn!(provider = %name, error = %e, "skipping payment provider");
                }
            }
        }

        Self::new(adapters, config.default_provider.clone())
    }

    /// Registry over pre-built adapters, in selection scan order.
    pub fn new(adapters: Vec<Arc<dyn PaymentGateway>>, default_provider: String) -> Self {
        let by_name = adapters
            .iter()
            .map(|a| (a.name().to_string(), a.clone()))
            .collect();
        Self {
            adapters,
            by_name,
            default_provider,
        }
    }

    /// Enabled adapter by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn PaymentGateway>> {
        self.by_name.get(name).cloned()
    }

    /// Known AND explicitly enabled. Disabled adapters are invisible even if
    /// implemented.
    pub fn is_provider_available(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn provider_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.adapters.iter().map(|a| a.name()).collect();
        names.sort_unstable();
        names
    }

    /// First enabled adapter supporting both the method and the currency,
    /// in configured order. `None` when nothing matches; never an error.
    pub fn provider_for_payment_method(
        &self,
        method: PaymentMethod,
        currency: &str,
    ) -> Option<Arc<dyn PaymentGateway>> {
        self.adapters
            .iter()
            .find(|p| p.supports(method, currency))
            .cloned()
    }

    /// First enabled adapter supporting the currency alone, in configured
    /// order.
    pub fn provider_for_currency(&self, currency: &str) -> Option<Arc<dyn PaymentGateway>> {
        self.adapters
            .iter()
            .find(|p| p.supports_currency(currency))
            .cloned()
    }

    /// Preferred provider for a phone number's country prefix, when that
    /// provider is enabled.
    fn provider_for_phone(&self, phone: &str) -> Option<Arc<dyn PaymentGateway>> {
        COUNTRY_PREFERENCES
            .iter()
            .find(|(prefix, _)| phone.starts_with(prefix))
            .and_then(|(_, provider)| self.get(provider))
    }

    /// Resolve the best provider for a payment. First match wins, evaluated
    /// top-down; a payer preference naming a disabled provider falls through
    /// to the capability rules.
    pub fn provider_for_payment(
        &self,
        probe: &PaymentProbe,
        preferred: Option<&str>,
    ) -> Option<Arc<dyn PaymentGateway>> {
        if let Some(preferred) = preferred {
            if let Some(adapter) = self.get(preferred) {
                return Some(adapter);
            }
        }

        if let Some(method) = probe.payment_method {
            if let Some(adapter) = self.provider_for_payment_method(method, &probe.currency_code) {
                return Some(adapter);
            }
        }

        if let Some(adapter) = self.provider_for_currency(&probe.currency_code) {
            return Some(adapter);
        }

        if let Some(phone) = probe.phone_number.as_deref() {
            if let Some(adapter) = self.provider_for_phone(phone) {
                return Some(adapter);
            }
        }

        self.get(&self.default_provider)
    }

    /// Union of payment methods across all enabled adapters.
    pub fn supported_payment_methods(&self) -> HashSet<PaymentMethod> {
        self.adapters
            .iter()
            .flat_map(|p| p.supported_payment_methods().iter().copied())
            .collect()
    }

    /// Union of currencies across all enabled adapters.
    pub fn supported_currencies(&self) -> HashSet<String> {
        self.adapters
            .iter()
            .flat_map(|p| {
                p.supported_currencies()
                    .iter()
                    .map(|c| c.to_string())
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::payment_repository::Payment;
    use crate::payments::types::{
        FeeBreakdown, InitializeOptions, NormalizedWebhook, ProviderResult,
    };
    use async_trait::async_trait;
    use http::HeaderMap;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    /// Minimal gateway with a fixed capability set.
    struct StubGateway {
        name: &'static str,
        methods: Vec<PaymentMethod>,
        currencies: Vec<&'static str>,
    }

    #[async_trait]
    impl PaymentGateway for StubGateway {
        fn name(&self) -> &'static str {
            self.name
        }

        fn supported_payment_methods(&self) -> &[PaymentMethod] {
            &self.methods
        }

        fn supported_currencies(&self) -> &[&'static str] {
            &self.currencies
        }

        async fn initialize_payment(
            &self,
            _payment: &Payment,
            _options: &InitializeOptions,
        ) -> Result<ProviderResult, crate::payments::error::ProviderError> {
            unimplemented!("selection tests never initialize")
        }

        async fn verify_payment(
            &self,
            _reference: &str,
        ) -> Result<ProviderResult, crate::payments::error::ProviderError> {
            unimplemented!()
        }

        fn handle_webhook(
            &self,
            _payload: &[u8],
            _headers: &HeaderMap,
        ) -> Result<NormalizedWebhook, crate::payments::error::ProviderError> {
            unimplemented!()
        }

        fn calculate_fees(
            &self,
            amount: Decimal,
            _currency: &str,
            _method: PaymentMethod,
        ) -> FeeBreakdown {
            FeeBreakdown {
                base_amount: amount,
                service_fee: Decimal::ZERO,
                provider_fee: Decimal::ZERO,
                provider_fee_label: format!("{}_fee", self.name),
                total_fees: Decimal::ZERO,
                total_amount: amount,
            }
        }
    }

    fn registry() -> ProviderRegistry {
        ProviderRegistry::new(
            vec![
                Arc::new(StubGateway {
                    name: "mtn_momo",
                    methods: vec![PaymentMethod::MobileMoney],
                    currencies: vec!["GHS", "UGX"],
                }),
                Arc::new(StubGateway {
                    name: "paystack",
                    methods: vec![PaymentMethod::Card, PaymentMethod::BankTransfer],
                    currencies: vec!["NGN", "GHS"],
                }),
            ],
            "paystack".to_string(),
        )
    }

    fn probe(
        method: Option<PaymentMethod>,
        currency: &str,
        phone: Option<&str>,
    ) -> PaymentProbe {
        PaymentProbe {
            amount: dec!(100.00),
            currency_code: currency.to_string(),
            payment_method: method,
            phone_number: phone.map(str::to_string),
        }
    }

    #[test]
    fn test_single_capability_match_is_returned() {
        let r = registry();
        let p = r
            .provider_for_payment_method(PaymentMethod::MobileMoney, "GHS")
            .unwrap();
        assert_eq!(p.name(), "mtn_momo");
    }

    #[test]
    fn test_no_capability_match_returns_none() {
        let r = registry();
        assert!(r
            .provider_for_payment_method(PaymentMethod::MobileMoney, "NGN")
            .is_none());
    }

    #[test]
    fn test_payer_preference_wins_when_enabled() {
        let r = registry();
        let p = r
            .provider_for_payment(
                &probe(Some(PaymentMethod::MobileMoney), "GHS", None),
                Some("paystack"),
            )
            .unwrap();
        assert_eq!(p.name(), "paystack");
    }

    #[test]
    fn test_disabled_preference_falls_through_to_capabilities() {
        let r = registry();
        let p = r
            .provider_for_payment(
                &probe(Some(PaymentMethod::MobileMoney), "GHS", None),
                Some("flutterwave"),
            )
            .unwrap();
        assert_eq!(p.name(), "mtn_momo");
    }

    #[test]
    fn test_currency_alone_when_method_unsupported() {
        let r = registry();
        // No adapter supports mobile money in NGN, but paystack knows NGN.
        let p = r
            .provider_for_payment(&probe(Some(PaymentMethod::MobileMoney), "NGN", None), None)
            .unwrap();
        assert_eq!(p.name(), "paystack");
    }

    #[test]
    fn test_phone_prefix_heuristic() {
        let r = registry();
        // Unknown currency so method/currency rules find nothing.
        let p = r
            .provider_for_payment(&probe(None, "KES", Some("+233244123456")), None)
            .unwrap();
        assert_eq!(p.name(), "mtn_momo");
    }

    #[test]
    fn test_default_provider_is_last_resort() {
        let r = registry();
        let p = r
            .provider_for_payment(&probe(None, "KES", None), None)
            .unwrap();
        assert_eq!(p.name(), "paystack");
    }

    #[test]
    fn test_selection_honors_configured_order() {
        // Two adapters with identical capabilities; the one registered first
        // must win every time, not whichever a map iterator yields.
        let make = || {
            ProviderRegistry::new(
                vec![
                    Arc::new(StubGateway {
                        name: "first",
                        methods: vec![PaymentMethod::Card],
                        currencies: vec!["GHS"],
                    }),
                    Arc::new(StubGateway {
                        name: "second",
                        methods: vec![PaymentMethod::Card],
                        currencies: vec!["GHS"],
                    }),
                ],
                "second".to_string(),
            )
        };
        for _ in 0..64 {
            let r = make();
            let by_pair = r
                .provider_for_payment_method(PaymentMethod::Card, "GHS")
                .unwrap();
            assert_eq!(by_pair.name(), "first");
            let by_currency = r.provider_for_currency("GHS").unwrap();
            assert_eq!(by_currency.name(), "first");
        }
    }

    #[test]
    fn test_availability_requires_enabled() {
        let r = registry();
        assert!(r.is_provider_available("mtn_momo"));
        assert!(!r.is_provider_available("flutterwave"));
    }

    #[test]
    fn test_capability_unions() {
        let r = registry();
        let methods = r.supported_payment_methods();
        assert!(methods.contains(&PaymentMethod::MobileMoney));
        assert!(methods.contains(&PaymentMethod::Card));
        let currencies = r.supported_currencies();
        assert!(currencies.contains("GHS"));
        assert!(currencies.contains("UGX"));
        assert!(currencies.contains("NGN"));
        assert!(!currencies.contains("KES"));
    }
}
