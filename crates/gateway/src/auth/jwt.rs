//! Identity tokens (§4.1, §6, §15): opaque bearer values carrying
//! `user_id` and an expiry, HMAC-signed with the process-wide secret
//! named by `security.jwt_secret_env`.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use sa_domain::error::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
}

/// Distinguishes an expired token from one that's simply missing or
/// malformed — §6 requires clients see a different status for each, so
/// they know to refresh rather than re-authenticate from scratch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyError {
    Missing,
    Invalid,
    Expired,
}

pub struct JwtCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    expiry: Duration,
}

impl JwtCodec {
    /// Builds a codec from a raw signing secret. The caller is responsible
    /// for treating an absent secret as a fatal startup condition — this
    /// constructor never falls back to a default (§4.1's "treat absence
    /// as a startup-level fatal condition").
    pub fn new(secret: &str, expiry_secs: u64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::default(),
            expiry: Duration::seconds(expiry_secs as i64),
        }
    }

    /// Issues a token for `user_id`, returning it alongside its expiry.
    pub fn issue(&self, user_id: &str) -> Result<(String, DateTime<Utc>)> {
        let expires_at = Utc::now() + self.expiry;
        let claims = Claims {
            sub: user_id.to_string(),
            exp: expires_at.timestamp() as usize,
        };
        let token = encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| Error::Internal(format!("issuing token: {e}")))?;
        Ok((token, expires_at))
    }

    /// Validates a token and returns the `user_id` it carries.
    pub fn verify(&self, token: &str) -> std::result::Result<String, VerifyError> {
        if token.is_empty() {
            return Err(VerifyError::Missing);
        }
        match decode::<Claims>(token, &self.decoding_key, &self.validation) {
            Ok(data) => Ok(data.claims.sub),
            Err(e) => match e.kind() {
                ErrorKind::ExpiredSignature => Err(VerifyError::Expired),
                _ => Err(VerifyError::Invalid),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_token_verifies_back_to_same_user() {
        let codec = JwtCodec::new("test-secret", 3600);
        let (token, _expires_at) = codec.issue("alice").unwrap();
        assert_eq!(codec.verify(&token).unwrap(), "alice");
    }

    #[test]
    fn tampered_token_is_rejected() {
        let codec = JwtCodec::new("test-secret", 3600);
        let (mut token, _) = codec.issue("alice").unwrap();
        token.push('x');
        assert_eq!(codec.verify(&token), Err(VerifyError::Invalid));
    }

    #[test]
    fn token_signed_with_different_secret_is_rejected() {
        let a = JwtCodec::new("secret-a", 3600);
        let b = JwtCodec::new("secret-b", 3600);
        let (token, _) = a.issue("alice").unwrap();
        assert_eq!(b.verify(&token), Err(VerifyError::Invalid));
    }

    #[test]
    fn expired_token_is_reported_distinctly() {
        let codec = JwtCodec::new("test-secret", 0);
        let (token, _) = codec.issue("alice").unwrap();
        std::thread::sleep(std::time::Duration::from_secs(1));
        assert_eq!(codec.verify(&token), Err(VerifyError::Expired));
    }

    #[test]
    fn empty_token_is_reported_as_missing() {
        let codec = JwtCodec::new("test-secret", 3600);
        assert_eq!(codec.verify(""), Err(VerifyError::Missing));
    }
}
