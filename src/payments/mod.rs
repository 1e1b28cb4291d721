//! Payment provider integration module
//!
//! Provides a unified interface over the payment rails PayLink settles
//! through (Paystack, Flutterwave, MTN MoMo, plus an in-process dummy rail
//! for non-production environments), the registry that picks the best
//! provider for a payment, and the fee calculator shared by all adapters.

pub mod error;
pub mod fees;
pub mod providers;
pub mod registry;
pub mod traits;
pub mod types;

pub use error::ProviderError;
pub use registry::ProviderRegistry;
pub use traits::PaymentGateway;
