//! Errors raised by payment provider adapters.

/// Adapter-origin failures: network problems talking to a rail, remote
/// rejections, webhook signature mismatches and unsupported capabilities.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("network error: {0}")]
    Network(String),

    #[error("request to {provider} timed out")]
    Timeout { provider: &'static str },

    #[error("{provider} API error: {message}")]
    Api {
        provider: &'static str,
        message: String,
    },

    #[error("{provider} rejected the request: {message}")]
    Rejected {
        provider: &'static str,
        message: String,
    },

    #[error("invalid webhook signature for {provider}")]
    InvalidSignature { provider: &'static str },

    #[error("{provider} does not support {capability}")]
    Unsupported {
        provider: &'static str,
        capability: &'static str,
    },

    #[error("provider configuration error: {0}")]
    Configuration(String),
}

impl ProviderError {
    /// Whether the failure is transient enough that an external scheduler
    /// could reasonably retry the operation.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::Network(_) | ProviderError::Timeout { .. }
        )
    }

    /// Map a transport-level failure from the HTTP client onto the adapter
    /// that made the call. Timeouts are distinguished so callers can treat
    /// them as retryable.
    pub fn from_transport(provider: &'static str, e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ProviderError::Timeout { provider }
        } else {
            ProviderError::Network(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transport_failures_are_retryable() {
        assert!(ProviderError::Network("connection reset".to_string()).is_retryable());
        assert!(ProviderError::Timeout { provider: "paystack" }.is_retryable());

        assert!(!ProviderError::Rejected {
            provider: "paystack",
            message: "insufficient funds".to_string(),
        }
        .is_retryable());
        assert!(!ProviderError::InvalidSignature { provider: "dummy" }.is_retryable());
        assert!(!ProviderError::Configuration("missing key".to_string()).is_retryable());
    }
}
