//! Payment rail adapter implementations
//!
//! Concrete implementations of the `PaymentGateway` trait, one per external
//! rail, plus the in-process dummy rail used in non-production environments.

pub mod dummy;
pub mod flutterwave;
pub mod mtn_momo;
pub mod paystack;

pub use dummy::DummyProvider;
pub use flutterwave::FlutterwaveProvider;
pub use mtn_momo::MtnMomoProvider;
pub use paystack::PaystackProvider;

use http::HeaderMap;

/// Constant-time comparison to prevent timing attacks on webhook signatures.
pub(crate) fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// First present header value, as a trimmed string.
pub(crate) fn header_value<'a>(headers: &'a HeaderMap, names: &[&str]) -> Option<&'a str> {
    names
        .iter()
        .find_map(|name| headers.get(*name))
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
    }

    #[test]
    fn test_header_value_falls_through_names() {
        let mut headers = HeaderMap::new();
        headers.insert("verif-hash", " top-secret ".parse().unwrap());
        assert_eq!(
            header_value(&headers, &["X-Flutterwave-Signature", "verif-hash"]),
            Some("top-secret")
        );
        assert_eq!(header_value(&headers, &["X-Paystack-Signature"]), None);
    }
}
