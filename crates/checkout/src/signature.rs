//! Webhook signature verification.
//!
//! The provider signs `"{timestamp}.{raw body}"` with HMAC-SHA256 and sends
//! `t=<unix seconds>,v1=<hex digest>` in the signature header. Several `v1`
//! entries may be present while a secret is being rolled.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Default accepted clock skew between the provider and us.
pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

/// Why a notification was not accepted as authentic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("missing signature header")]
    MissingHeader,

    #[error("signature header has no timestamp")]
    MissingTimestamp,

    #[error("signature header has no v1 signature")]
    MissingSignature,

    #[error("invalid timestamp in signature header")]
    InvalidTimestamp,

    #[error("signature timestamp outside tolerance")]
    Expired,

    #[error("signature mismatch")]
    Mismatch,

    #[error("webhook secret rejected as HMAC key")]
    InvalidKey,
}

/// Verifies (and, for tests and tooling, produces) webhook signatures.
#[derive(Clone)]
pub struct SignatureVerifier {
    secret: Vec<u8>,
    tolerance_secs: i64,
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier")
            .field("tolerance_secs", &self.tolerance_secs)
            .finish_non_exhaustive()
    }
}

impl SignatureVerifier {
    /// Creates a verifier with the default tolerance.
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
            tolerance_secs: DEFAULT_TOLERANCE_SECS,
        }
    }

    /// Sets the accepted timestamp skew in seconds.
    pub fn with_tolerance(mut self, tolerance_secs: i64) -> Self {
        self.tolerance_secs = tolerance_secs;
        self
    }

    /// Verifies `header` against the raw `payload` at the current time.
    pub fn verify(&self, payload: &[u8], header: Option<&str>) -> Result<(), SignatureError> {
        self.verify_at(payload, header, chrono::Utc::now().timestamp())
    }

    /// Verifies `header` against the raw `payload` as of `now` (unix seconds).
    pub fn verify_at(
        &self,
        payload: &[u8],
        header: Option<&str>,
        now: i64,
    ) -> Result<(), SignatureError> {
        let header = header.ok_or(SignatureError::MissingHeader)?;

        let mut timestamp = None;
        let mut signatures = Vec::new();
        for part in header.split(',') {
            let part = part.trim();
            if let Some(t) = part.strip_prefix("t=") {
                timestamp = Some(t);
            } else if let Some(v) = part.strip_prefix("v1=") {
                signatures.push(v);
            }
        }

        let timestamp = timestamp.ok_or(SignatureError::MissingTimestamp)?;
        if signatures.is_empty() {
            return Err(SignatureError::MissingSignature);
        }

        let mac = self.mac_for(timestamp, payload)?;
        let matched = signatures.iter().any(|sig| {
            hex::decode(sig)
                .map(|bytes| mac.clone().verify_slice(&bytes).is_ok())
                .unwrap_or(false)
        });
        if !matched {
            return Err(SignatureError::Mismatch);
        }

        // The timestamp is only trusted once the MAC matches.
        let ts: i64 = timestamp
            .parse()
            .map_err(|_| SignatureError::InvalidTimestamp)?;
        if (now - ts).abs() > self.tolerance_secs {
            return Err(SignatureError::Expired);
        }

        Ok(())
    }

    /// Produces a signature header for `payload` at `timestamp`.
    pub fn sign(&self, payload: &[u8], timestamp: i64) -> Result<String, SignatureError> {
        let digest = self
            .mac_for(&timestamp.to_string(), payload)?
            .finalize()
            .into_bytes();
        Ok(format!("t={timestamp},v1={}", hex::encode(digest)))
    }

    fn mac_for(&self, timestamp: &str, payload: &[u8]) -> Result<HmacSha256, SignatureError> {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).map_err(|_| SignatureError::InvalidKey)?;
        mac.update(timestamp.as_bytes());
        mac.update(b".");
        mac.update(payload);
        Ok(mac)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000;
    const BODY: &[u8] = br#"{"id":"evt_1","type":"checkout.session.completed"}"#;

    #[test]
    fn test_sign_then_verify() {
        let verifier = SignatureVerifier::new("whsec_test");
        let header = verifier.sign(BODY, NOW).unwrap();

        assert!(header.starts_with("t=1700000000,v1="));
        assert_eq!(verifier.verify_at(BODY, Some(&header), NOW + 10), Ok(()));
    }

    #[test]
    fn test_tampered_body_is_rejected() {
        let verifier = SignatureVerifier::new("whsec_test");
        let header = verifier.sign(BODY, NOW).unwrap();

        let tampered = br#"{"id":"evt_1","type":"checkout.session.completed","x":1}"#;
        assert_eq!(
            verifier.verify_at(tampered, Some(&header), NOW),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let header = SignatureVerifier::new("whsec_other").sign(BODY, NOW).unwrap();
        let verifier = SignatureVerifier::new("whsec_test");

        assert_eq!(
            verifier.verify_at(BODY, Some(&header), NOW),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn test_any_v1_entry_may_match() {
        let verifier = SignatureVerifier::new("whsec_test");
        let good = verifier.sign(BODY, NOW).unwrap();
        let digest = good.split("v1=").nth(1).unwrap();
        let header = format!("t={NOW},v1={},v1={digest}", "00".repeat(32));

        assert_eq!(verifier.verify_at(BODY, Some(&header), NOW), Ok(()));
    }

    #[test]
    fn test_stale_timestamp_is_rejected() {
        let verifier = SignatureVerifier::new("whsec_test").with_tolerance(60);
        let header = verifier.sign(BODY, NOW).unwrap();

        assert_eq!(
            verifier.verify_at(BODY, Some(&header), NOW + 61),
            Err(SignatureError::Expired)
        );
    }

    #[test]
    fn test_malformed_headers() {
        let verifier = SignatureVerifier::new("whsec_test");

        assert_eq!(
            verifier.verify_at(BODY, None, NOW),
            Err(SignatureError::MissingHeader)
        );
        assert_eq!(
            verifier.verify_at(BODY, Some("v1=abcd"), NOW),
            Err(SignatureError::MissingTimestamp)
        );
        assert_eq!(
            verifier.verify_at(BODY, Some("t=1700000000"), NOW),
            Err(SignatureError::MissingSignature)
        );
        assert_eq!(
            verifier.verify_at(BODY, Some("t=1700000000,v1=not-hex"), NOW),
            Err(SignatureError::Mismatch)
        );
    }
}
