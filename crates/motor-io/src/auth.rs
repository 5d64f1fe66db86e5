//! Operator authentication for the bridge.
//!
//! Control messages may carry an HMAC-SHA256 token naming the operator;
//! when a secret is configured, the operator recorded on each command is
//! the one proven by the token, not the one the client claims.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Token has expired (age: {age_secs}s, max: {max_secs}s)")]
    TokenExpired { age_secs: u64, max_secs: u64 },

    #[error("Invalid token format")]
    InvalidFormat,

    #[error("Token signature verification failed")]
    InvalidSignature,

    #[error("Token decode error: {0}")]
    DecodeError(String),

    #[error("Operator name must be non-empty and must not contain ':'")]
    InvalidOperator,

    #[error("HMAC key rejected: {0}")]
    InvalidKey(String),
}

#[derive(Clone, Debug)]
pub struct AuthConfig {
    /// Shared secret for HMAC signing
    pub secret: Vec<u8>,
    /// Maximum token age in seconds
    pub max_age_secs: u64,
    /// Whether control messages must carry a token
    pub enabled: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret: Vec::new(),
            max_age_secs: 300,
            enabled: false,
        }
    }
}

/// Claims extracted from a validated token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorClaims {
    pub operator: String,
    /// Unix timestamp when the token was issued
    pub issued_at: u64,
    pub age_secs: u64,
}

pub struct TokenValidator {
    secret: Vec<u8>,
    max_age_secs: u64,
}

impl TokenValidator {
    pub fn new(secret: Vec<u8>, max_age_secs: u64) -> Self {
        Self {
            secret,
            max_age_secs,
        }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(config.secret.clone(), config.max_age_secs)
    }

    fn mac(&self) -> Result<HmacSha256, AuthError> {
        HmacSha256::new_from_slice(&self.secret).map_err(|e| AuthError::InvalidKey(e.to_string()))
    }

    /// Token format: base64("<unix_secs>:<operator>:" ++ hmac("<unix_secs>:<operator>"))
    pub fn validate(&self, token: &str) -> Result<OperatorClaims, AuthError> {
        self.validate_at(token, unix_secs())
    }

    fn validate_at(&self, token: &str, now: u64) -> Result<OperatorClaims, AuthError> {
        let decoded = BASE64
            .decode(token)
            .map_err(|e| AuthError::DecodeError(e.to_string()))?;

        let first = decoded
            .iter()
            .position(|&b| b == b':')
            .ok_or(AuthError::InvalidFormat)?;
        let second = decoded[first + 1..]
            .iter()
            .position(|&b| b == b':')
            .map(|p| first + 1 + p)
            .ok_or(AuthError::InvalidFormat)?;

        let signed = &decoded[..second];
        let signature = &decoded[second + 1..];

        let issued_at: u64 = std::str::from_utf8(&decoded[..first])
            .map_err(|_| AuthError::InvalidFormat)?
            .parse()
            .map_err(|_| AuthError::InvalidFormat)?;
        let operator = std::str::from_utf8(&decoded[first + 1..second])
            .map_err(|_| AuthError::InvalidFormat)?;
        if operator.is_empty() {
            return Err(AuthError::InvalidOperator);
        }

        let age = now.saturating_sub(issued_at);
        if age > self.max_age_secs {
            return Err(AuthError::TokenExpired {
                age_secs: age,
                max_secs: self.max_age_secs,
            });
        }

        let mut mac = self.mac()?;
        mac.update(signed);
        mac.verify_slice(signature)
            .map_err(|_| AuthError::InvalidSignature)?;

        Ok(OperatorClaims {
            operator: operator.to_string(),
            issued_at,
            age_secs: age,
        })
    }

    /// Issue a token for `operator`, stamped now.
    pub fn generate_token(&self, operator: &str) -> Result<String, AuthError> {
        self.generate_token_at(operator, unix_secs())
    }

    fn generate_token_at(&self, operator: &str, issued_at: u64) -> Result<String, AuthError> {
        if operator.is_empty() || operator.contains(':') {
            return Err(AuthError::InvalidOperator);
        }
        let signed = format!("{issued_at}:{operator}");

        let mut mac = self.mac()?;
        mac.update(signed.as_bytes());
        let signature = mac.finalize().into_bytes();

        let mut token_data = signed.into_bytes();
        token_data.push(b':');
        token_data.extend_from_slice(&signature);

        Ok(BASE64.encode(&token_data))
    }
}

fn unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_secret() -> Vec<u8> {
        b"test-secret-key-for-hmac".to_vec()
    }

    #[test]
    fn test_generate_and_validate_token() {
        let validator = TokenValidator::new(test_secret(), 300);

        let token = validator.generate_token("shift-lead").unwrap();
        let claims = validator.validate(&token).unwrap();

        assert_eq!(claims.operator, "shift-lead");
        assert!(claims.age_secs < 5);
    }

    #[test]
    fn test_invalid_signature_rejected() {
        let validator = TokenValidator::new(test_secret(), 300);
        let wrong_validator = TokenValidator::new(b"wrong-key".to_vec(), 300);

        let token = wrong_validator.generate_token("ops").unwrap();
        let result = validator.validate(&token);

        assert!(matches!(result, Err(AuthError::InvalidSignature)));
    }

    #[test]
    fn test_operator_is_covered_by_signature() {
        let validator = TokenValidator::new(test_secret(), 300);

        let token = validator.generate_token_at("alice", 1_000).unwrap();
        let mut raw = BASE64.decode(&token).unwrap();
        // "1000:alice:" -> "1000:mallo:"
        raw[5..10].copy_from_slice(b"mallo");
        let forged = BASE64.encode(&raw);

        assert!(matches!(
            validator.validate_at(&forged, 1_010),
            Err(AuthError::InvalidSignature)
        ));
    }

    #[test]
    fn test_expired_token_rejected() {
        let validator = TokenValidator::new(test_secret(), 60);
        let token = validator.generate_token_at("ops", 1_000).unwrap();

        assert!(validator.validate_at(&token, 1_060).is_ok());
        assert!(matches!(
            validator.validate_at(&token, 1_061),
            Err(AuthError::TokenExpired {
                age_secs: 61,
                max_secs: 60
            })
        ));
    }

    #[test]
    fn test_invalid_format_rejected() {
        let validator = TokenValidator::new(test_secret(), 300);

        assert!(matches!(
            validator.validate("not-valid-base64!!!"),
            Err(AuthError::DecodeError(_))
        ));

        let invalid = BASE64.encode(b"no-colon-here");
        assert!(matches!(
            validator.validate(&invalid),
            Err(AuthError::InvalidFormat)
        ));
    }

    #[test]
    fn test_operator_with_colon_refused() {
        let validator = TokenValidator::new(test_secret(), 300);
        assert!(matches!(
            validator.generate_token("a:b"),
            Err(AuthError::InvalidOperator)
        ));
    }
}
