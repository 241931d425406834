use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

const DEFAULT_LIFETIME: Duration = Duration::from_secs(5 * 60);

/// Decoded, verified payload of an internal service-to-service token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InternalClaims {
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
    pub sub: String,
    pub purpose: String,
    pub nonce: String,
}

/// Error returned when a token fails verification.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("malformed token: {0}")]
    Malformed(String),
    #[error("signature mismatch")]
    BadSignature,
    #[error("token expired at {0}")]
    Expired(DateTime<Utc>),
    #[error("nonce already used")]
    Replayed,
}

/// Issues and verifies the internal auth token described in §6: a
/// base64url JSON payload, dot-separated, with an HMAC-SHA256 signature
/// keyed by `INTERNAL_SIGNING_SECRET`. Verification is constant-time and
/// nonce-tracked for replay resistance.
pub struct InternalAuthSigner {
    secret: Vec<u8>,
    seen_nonces: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl InternalAuthSigner {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
            seen_nonces: Mutex::new(HashMap::new()),
        }
    }

    /// Issues a token for `sub`/`purpose` with the default 5-minute lifetime.
    pub fn issue(&self, iss: &str, sub: &str, purpose: &str) -> String {
        self.issue_with_ttl(iss, sub, purpose, DEFAULT_LIFETIME)
    }

    pub fn issue_with_ttl(&self, iss: &str, sub: &str, purpose: &str, ttl: Duration) -> String {
        let now = Utc::now();
        let claims = InternalClaims {
            iss: iss.to_string(),
            iat: now.timestamp(),
            exp: (now + ChronoDuration::from_std(ttl).unwrap_or(ChronoDuration::minutes(5))).timestamp(),
            sub: sub.to_string(),
            purpose: purpose.to_string(),
            nonce: Uuid::new_v4().to_string(),
        };
        self.encode(&claims)
    }

    fn encode(&self, claims: &InternalClaims) -> String {
        let payload = serde_json::to_vec(claims).unwrap_or_default();
        let payload_b64 = URL_SAFE_NO_PAD.encode(payload);
        let sig = self.sign(payload_b64.as_bytes());
        format!("{payload_b64}.{sig}")
    }

    fn sign(&self, data: &[u8]) -> String {
        #[allow(clippy::expect_used)]
        let mut mac = HmacSha256::new_from_slice(&self.secret).expect("HMAC accepts any key length");
        mac.update(data);
        URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())
    }

    /// Verifies signature, expiry, and nonce freshness. On success, marks
    /// the nonce as seen so the same token cannot be replayed before it
    /// expires.
    pub async fn verify(&self, token: &str) -> Result<InternalClaims, TokenError> {
        let (payload_b64, sig) = token
            .split_once('.')
            .ok_or_else(|| TokenError::Malformed("missing '.' separator".to_string()))?;

        let expected_sig = self.sign(payload_b64.as_bytes());
        if !constant_time_eq(expected_sig.as_bytes(), sig.as_bytes()) {
            return Err(TokenError::BadSignature);
        }

        let payload_bytes = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|e| TokenError::Malformed(e.to_string()))?;
        let claims: InternalClaims =
            serde_json::from_slice(&payload_bytes).map_err(|e| TokenError::Malformed(e.to_string()))?;

        let now = Utc::now();
        let exp = DateTime::from_timestamp(claims.exp, 0).unwrap_or(now);
        if now >= exp {
            return Err(TokenError::Expired(exp));
        }

        let mut seen = self.seen_nonces.lock().await;
        seen.retain(|_, expiry| *expiry > now);
        if seen.contains_key(&claims.nonce) {
            return Err(TokenError::Replayed);
        }
        seen.insert(claims.nonce.clone(), exp);

        Ok(claims)
    }
}

/// Compares two byte slices in constant time to avoid leaking signature
/// length/content through timing.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn issue_then_verify_round_trips() {
        let signer = InternalAuthSigner::new(b"test-secret".to_vec());
        let token = signer.issue("gateway", "session-123", "sandbox-exec");
        let claims = signer.verify(&token).await.unwrap();
        assert_eq!(claims.sub, "session-123");
        assert_eq!(claims.purpose, "sandbox-exec");
    }

    #[tokio::test]
    async fn tampered_payload_fails_signature_check() {
        let signer = InternalAuthSigner::new(b"test-secret".to_vec());
        let token = signer.issue("gateway", "session-123", "sandbox-exec");
        let mut tampered = token.clone();
        tampered.push('x');
        let err = signer.verify(&tampered).await.unwrap_err();
        assert!(matches!(err, TokenError::BadSignature));
    }

    #[tokio::test]
    async fn expired_token_is_rejected() {
        let signer = InternalAuthSigner::new(b"test-secret".to_vec());
        let token = signer.issue_with_ttl("gateway", "s", "p", Duration::from_millis(1));
        tokio::time::sleep(Duration::from_millis(20)).await;
        let err = signer.verify(&token).await.unwrap_err();
        assert!(matches!(err, TokenError::Expired(_)));
    }

    #[tokio::test]
    async fn replayed_token_is_rejected_on_second_use() {
        let signer = InternalAuthSigner::new(b"test-secret".to_vec());
        let token = signer.issue("gateway", "s", "p");
        signer.verify(&token).await.unwrap();
        let err = signer.verify(&token).await.unwrap_err();
        assert!(matches!(err, TokenError::Replayed));
    }

    #[tokio::test]
    async fn different_secrets_reject_each_others_tokens() {
        let signer_a = InternalAuthSigner::new(b"secret-a".to_vec());
        let signer_b = InternalAuthSigner::new(b"secret-b".to_vec());
        let token = signer_a.issue("gateway", "s", "p");
        let err = signer_b.verify(&token).await.unwrap_err();
        assert!(matches!(err, TokenError::BadSignature));
    }
}
