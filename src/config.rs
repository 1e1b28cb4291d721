use anyhow::{anyhow, Context, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::str::FromStr;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub payments: PaymentsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
}

impl ServerConfig {
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

/// Settlement configuration: which providers are enabled, how webhooks are
/// addressed back to us, and the platform service fee.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentsConfig {
    /// Fallback provider when no selection rule matches.
    pub default_provider: String,
    /// Providers visible to selection. A configured but unlisted provider is
    /// invisible.
    pub enabled_providers: Vec<String>,
    /// Base URL webhook routes are built from, e.g. `https://api.paylink.app`.
    pub webhook_base_url: String,
    /// Platform service fee as a fraction (`0.005` = 0.5%).
    pub service_fee_percent: Decimal,
    /// Per-provider overrides of the service fee.
    pub service_fee_overrides: HashMap<String, Decimal>,
    pub paystack: Option<PaystackConfig>,
    pub flutterwave: Option<FlutterwaveConfig>,
    pub mtn_momo: Option<MtnMomoConfig>,
    pub dummy: Option<DummyConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaystackConfig {
    pub secret_key: String,
    pub base_url: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FlutterwaveConfig {
    pub secret_key: String,
    /// Shared secret Flutterwave echoes back in the webhook signature header.
    pub webhook_secret: String,
    pub base_url: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MtnMomoConfig {
    pub api_user: String,
    pub api_key: String,
    pub subscription_key: String,
    pub base_url: String,
    /// MTN target environment, e.g. `sandbox` or `mtnghana`.
    pub target_environment: String,
    pub webhook_secret: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DummyConfig {
    pub webhook_secret: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let server = ServerConfig {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .context("PORT not set")?
                .parse()
                .context("PORT must be a valid number")?,
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
        };

        let database = DatabaseConfig {
            url: env::var("DATABASE_URL").context("DATABASE_URL not set")?,
            max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .context("DATABASE_MAX_CONNECTIONS must be a valid number")?,
        };

        let payments = PaymentsConfig::from_env()?;

        let config = Config {
            server,
            database,
            payments,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.port < 1024 {
            return Err(anyhow!(
                "Port must be at least 1024, got {}",
                self.server.port
            ));
        }

        let valid_environments = ["development", "staging", "production"];
        if !valid_environments.contains(&self.server.environment.as_str()) {
            return Err(anyhow!(
                "Environment must be one of: {:?}, got {}",
                valid_environments,
                self.server.environment
            ));
        }

        if self.database.url.trim().is_empty() {
            return Err(anyhow!("DATABASE_URL cannot be empty"));
        }

        if self.database.max_connections == 0 {
            return Err(anyhow!("DATABASE_MAX_CONNECTIONS must be greater than 0"));
        }

        self.payments.validate()?;

        Ok(())
    }
}

impl PaymentsConfig {
    pub fn from_env() -> Result<Self> {
        let enabled_providers = split_csv(
            &env::var("PAYMENT_PROVIDERS_ENABLED")
                .context("PAYMENT_PROVIDERS_ENABLED not set")?,
        );

        let service_fee_percent = env::var("SERVICE_FEE_PERCENT")
            .unwrap_or_else(|_| "0.005".to_string())
            .parse::<Decimal>()
            .context("SERVICE_FEE_PERCENT must be a decimal fraction")?;

        // Optional per-provider overrides, e.g. "paystack=0.004,dummy=0.01"
        let mut service_fee_overrides = HashMap::new();
        if let Ok(raw) = env::var("SERVICE_FEE_OVERRIDES") {
            for entry in split_csv(&raw) {
                let (provider, rate) = entry
                    .split_once('=')
                    .ok_or_else(|| anyhow!("invalid SERVICE_FEE_OVERRIDES entry: {}", entry))?;
                let rate = Decimal::from_str(rate.trim())
                    .with_context(|| format!("invalid override rate for {}", provider))?;
                service_fee_overrides.insert(provider.trim().to_string(), rate);
            }
        }

        Ok(Self {
            default_provider: env::var("PAYMENT_DEFAULT_PROVIDER")
                .context("PAYMENT_DEFAULT_PROVIDER not set")?,
            enabled_providers,
            webhook_base_url: env::var("WEBHOOK_BASE_URL").context("WEBHOOK_BASE_URL not set")?,
            service_fee_percent,
            service_fee_overrides,
            paystack: PaystackConfig::from_env(),
            flutterwave: FlutterwaveConfig::from_env(),
            mtn_momo: MtnMomoConfig::from_env(),
            dummy: DummyConfig::from_env(),
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.enabled_providers.is_empty() {
            return Err(anyhow!(
                "PAYMENT_PROVIDERS_ENABLED must contain at least one provider"
            ));
        }

        if self.default_provider.trim().is_empty() {
            return Err(anyhow!("PAYMENT_DEFAULT_PROVIDER cannot be empty"));
        }

        if !self.is_enabled(&self.default_provider) {
            return Err(anyhow!(
                "default provider '{}' is not in PAYMENT_PROVIDERS_ENABLED",
                self.default_provider
            ));
        }

        if self.webhook_base_url.trim().is_empty() {
            return Err(anyhow!("WEBHOOK_BASE_URL cannot be empty"));
        }

        if self.service_fee_percent < Decimal::ZERO || self.service_fee_percent > Decimal::ONE {
            return Err(anyhow!(
                "SERVICE_FEE_PERCENT must be a fraction between 0 and 1, got {}",
                self.service_fee_percent
            ));
        }

        Ok(())
    }

    pub fn is_enabled(&self, provider: &str) -> bool {
        self.enabled_providers.iter().any(|p| p == provider)
    }

    /// Webhook URL scoped to one provider.
    pub fn webhook_url_for(&self, provider: &str) -> String {
        format!(
            "{}/webhooks/payments/{}",
            self.webhook_base_url.trim_end_matches('/'),
            provider
        )
    }
}

impl PaystackConfig {
    /// `None` when the secret key is absent; the registry then skips the
    /// adapter instead of failing startup.
    pub fn from_env() -> Option<Self> {
        Some(Self {
            secret_key: env::var("PAYSTACK_SECRET_KEY").ok()?,
            base_url: env::var("PAYSTACK_BASE_URL")
                .unwrap_or_else(|_| "https://api.paystack.co".to_string()),
            timeout_secs: env_timeout("PAYSTACK_TIMEOUT_SECS"),
        })
    }
}

impl FlutterwaveConfig {
    pub fn from_env() -> Option<Self> {
        let secret_key = env::var("FLUTTERWAVE_SECRET_KEY").ok()?;
        Some(Self {
            webhook_secret: env::var("FLUTTERWAVE_WEBHOOK_SECRET").unwrap_or_else(|_| secret_key.clone()),
            secret_key,
            base_url: env::var("FLUTTERWAVE_BASE_URL")
                .unwrap_or_else(|_| "https://api.flutterwave.com".to_string()),
            timeout_secs: env_timeout("FLUTTERWAVE_TIMEOUT_SECS"),
        })
    }
}

impl MtnMomoConfig {
    pub fn from_env() -> Option<Self> {
        Some(Self {
            api_user: env::var("MTN_MOMO_API_USER").ok()?,
            api_key: env::var("MTN_MOMO_API_KEY").ok()?,
            subscription_key: env::var("MTN_MOMO_SUBSCRIPTION_KEY").ok()?,
            base_url: env::var("MTN_MOMO_BASE_URL")
                .unwrap_or_else(|_| "https://proxy.momoapi.mtn.com".to_string()),
            target_environment: env::var("MTN_MOMO_TARGET_ENVIRONMENT")
                .unwrap_or_else(|_| "sandbox".to_string()),
            webhook_secret: env::var("MTN_MOMO_WEBHOOK_SECRET").ok()?,
            timeout_secs: env_timeout("MTN_MOMO_TIMEOUT_SECS"),
        })
    }
}

impl DummyConfig {
    pub fn from_env() -> Option<Self> {
        Some(Self {
            webhook_secret: env::var("DUMMY_WEBHOOK_SECRET").ok()?,
        })
    }
}

fn split_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn env_timeout(var: &str) -> u64 {
    env::var(var)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(30)
}
