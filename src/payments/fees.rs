//! Fee calculation
//!
//! Two layers make up the cost of a payment: a platform-wide service fee (a
//! flat percentage, optionally overridden per provider) and a provider fee
//! computed from the adapter's own schedule, keyed by payment method and/or
//! currency and clamped to a per-currency maximum. Each computed sub-amount
//! is rounded to 2 decimal places with round-half-up before anything is
//! summed, so the breakdown always adds up exactly.

use crate::payments::types::{FeeBreakdown, PaymentMethod};
use rust_decimal::{Decimal, RoundingStrategy};
use std::collections::HashMap;

/// Round a monetary sub-amount to 2 decimal places, half up.
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Per-provider fee schedule.
///
/// Percentages are expressed as fractions of the amount (`0.015` = 1.5%).
/// Method-specific rates take precedence over currency-specific rates, which
/// take precedence over the default rate.
#[derive(Debug, Clone, Default)]
pub struct FeeSchedule {
    pub default_percent: Decimal,
    pub method_percents: HashMap<PaymentMethod, Decimal>,
    pub currency_percents: HashMap<String, Decimal>,
    /// Maximum provider fee per currency; no cap when absent.
    pub currency_caps: HashMap<String, Decimal>,
}

impl FeeSchedule {
    fn percent_for(&self, currency: &str, method: PaymentMethod) -> Decimal {
        if let Some(p) = self.method_percents.get(&method) {
            return *p;
        }
        if let Some(p) = self.currency_percents.get(currency) {
            return *p;
        }
        self.default_percent
    }

    /// Provider fee for one amount, rounded then clamped to the currency cap.
    pub fn fee_for(&self, amount: Decimal, currency: &str, method: PaymentMethod) -> Decimal {
        let fee = round_money(amount * self.percent_for(currency, method));
        match self.currency_caps.get(currency) {
            Some(cap) if fee > *cap => *cap,
            _ => fee,
        }
    }
}

/// Platform-wide service fee configuration shared by all adapters.
#[derive(Debug, Clone)]
pub struct FeeCalculator {
    service_fee_percent: Decimal,
    service_fee_overrides: HashMap<String, Decimal>,
}

impl FeeCalculator {
    pub fn new(
        service_fee_percent: Decimal,
        service_fee_overrides: HashMap<String, Decimal>,
    ) -> Self {
        Self {
            service_fee_percent,
            service_fee_overrides,
        }
    }

    fn service_percent_for(&self, provider: &str) -> Decimal {
        self.service_fee_overrides
            .get(provider)
            .copied()
            .unwrap_or(self.service_fee_percent)
    }

    /// Full fee breakdown for one payment on one provider.
    pub fn breakdown(
        &self,
        amount: Decimal,
        currency: &str,
        method: PaymentMethod,
        provider: &'static str,
        schedule: &FeeSchedule,
    ) -> FeeBreakdown {
        let base_amount = round_money(amount);
        let service_fee = round_money(base_amount * self.service_percent_for(provider));
        let provider_fee = schedule.fee_for(base_amount, currency, method);
        let total_fees = service_fee + provider_fee;
        FeeBreakdown {
            base_amount,
            service_fee,
            provider_fee,
            provider_fee_label: format!("{}_fee", provider),
            total_fees,
            total_amount: base_amount + total_fees,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn calculator() -> FeeCalculator {
        FeeCalculator::new(dec!(0.005), HashMap::new())
    }

    fn schedule() -> FeeSchedule {
        FeeSchedule {
            default_percent: dec!(0.015),
            method_percents: HashMap::from([(PaymentMethod::MobileMoney, dec!(0.0195))]),
            currency_percents: HashMap::from([("NGN".to_string(), dec!(0.015))]),
            currency_caps: HashMap::from([("NGN".to_string(), dec!(2000.00))]),
        }
    }

    #[test]
    fn test_breakdown_sums_exactly() {
        let calc = calculator();
        let sched = schedule();
        for amount in [dec!(1.00), dec!(99.99), dec!(100.00), dec!(12345.67)] {
            for method in [
                PaymentMethod::MobileMoney,
                PaymentMethod::Card,
                PaymentMethod::BankTransfer,
            ] {
                let b = calc.breakdown(amount, "GHS", method, "paystack", &sched);
                assert_eq!(
                    b.total_amount,
                    b.base_amount + b.service_fee + b.provider_fee,
                    "breakdown must sum exactly for {} {}",
                    amount,
                    method
                );
                assert_eq!(b.total_fees, b.service_fee + b.provider_fee);
            }
        }
    }

    #[test]
    fn test_method_rate_takes_precedence() {
        let calc = calculator();
        let sched = schedule();
        // 100.00 * 1.95% = 1.95 for mobile money, 1.5% = 1.50 otherwise
        let momo = calc.breakdown(dec!(100.00), "GHS", PaymentMethod::MobileMoney, "p", &sched);
        let card = calc.breakdown(dec!(100.00), "GHS", PaymentMethod::Card, "p", &sched);
        assert_eq!(momo.provider_fee, dec!(1.95));
        assert_eq!(card.provider_fee, dec!(1.50));
    }

    #[test]
    fn test_provider_fee_never_exceeds_currency_cap() {
        let calc = calculator();
        let sched = schedule();
        let b = calc.breakdown(
            dec!(1000000.00),
            "NGN",
            PaymentMethod::Card,
            "paystack",
            &sched,
        );
        assert_eq!(b.provider_fee, dec!(2000.00));
        assert_eq!(b.total_amount, b.base_amount + b.total_fees);
    }

    #[test]
    fn test_rounding_is_half_up_per_sub_amount() {
        // 33.33 * 0.015 = 0.49995 -> 0.50, not 0.49
        let sched = FeeSchedule {
            default_percent: dec!(0.015),
            ..Default::default()
        };
        assert_eq!(
            sched.fee_for(dec!(33.33), "GHS", PaymentMethod::Card),
            dec!(0.50)
        );
        // service fee rounds independently of the provider fee
        let calc = FeeCalculator::new(dec!(0.005), HashMap::new());
        let b = calc.breakdown(dec!(33.33), "GHS", PaymentMethod::Card, "p", &sched);
        assert_eq!(b.service_fee, dec!(0.17)); // 0.16665 -> 0.17
        assert_eq!(b.total_fees, dec!(0.67));
    }

    #[test]
    fn test_service_fee_override_per_provider() {
        let calc = FeeCalculator::new(
            dec!(0.005),
            HashMap::from([("dummy".to_string(), dec!(0.01))]),
        );
        let sched = FeeSchedule::default();
        let b = calc.breakdown(dec!(200.00), "GHS", PaymentMethod::Card, "dummy", &sched);
        assert_eq!(b.service_fee, dec!(2.00));
        let b = calc.breakdown(dec!(200.00), "GHS", PaymentMethod::Card, "other", &sched);
        assert_eq!(b.service_fee, dec!(1.00));
    }

    #[test]
    fn test_fee_label_carries_provider_name() {
        let calc = calculator();
        let b = calc.breakdown(
            dec!(10.00),
            "GHS",
            PaymentMethod::Card,
            "flutterwave",
            &FeeSchedule::default(),
        );
        assert_eq!(b.provider_fee_label, "flutterwave_fee");
    }
}
