//! # Token Issuer
//!
//! Signed, expiring bearer credentials (HS256). Tokens are immutable once
//! issued and not revocable server-side: logout is client-side discard, and
//! deployments needing revocation add a denylist outside this core.

use crate::clock::Clock;
use crate::error::{CoreError, CoreResult};
use chrono::Duration;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Role carried inside a credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

/// The authenticated party a credential asserts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub id: String,
    pub username: String,
    pub role: Role,
}

impl Subject {
    pub fn user(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            username: id.clone(),
            id,
            role: Role::User,
        }
    }

    pub fn admin(id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
            role: Role::Admin,
        }
    }
}

/// Why verification failed. Distinguished in diagnostics only; the HTTP
/// boundary collapses both into one unauthorized response so probing a
/// forged token reveals nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenRejection {
    InvalidSignature,
    Expired,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    username: String,
    role: Role,
    iat: i64,
    exp: i64,
}

/// Issues and verifies bearer credentials with a fixed secret and expiry.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl TokenIssuer {
    /// Default credential lifetime.
    pub const DEFAULT_TTL_DAYS: i64 = 7;

    /// Build an issuer. An empty secret is a configuration error and must
    /// abort startup, never surface per-call.
    pub fn new(secret: &str, clock: Arc<dyn Clock>) -> CoreResult<Self> {
        if secret.is_empty() {
            return Err(CoreError::Configuration(
                "token signing secret must not be empty".to_string(),
            ));
        }
        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            ttl: Duration::days(Self::DEFAULT_TTL_DAYS),
            clock,
        })
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Mint a credential for the subject. Deterministic given the secret,
    /// subject and clock.
    pub fn sign(&self, subject: &Subject) -> CoreResult<String> {
        let now = self.clock.now();
        let claims = Claims {
            sub: subject.id.clone(),
            username: subject.username.clone(),
            role: subject.role,
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| CoreError::Internal(format!("failed to sign token: {e}")))
    }

    /// Verify a credential and recover its subject.
    pub fn verify(&self, token: &str) -> Result<Subject, TokenRejection> {
        let mut validation = Validation::default();
        // chrono clock drives expiry in tests; jsonwebtoken's own leeway
        // check stays on for production tokens.
        validation.leeway = 0;

        let data = decode::<Claims>(token, &self.decoding_key, &validation).map_err(|e| {
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => TokenRejection::Expired,
                _ => TokenRejection::InvalidSignature,
            }
        })?;

        // Lazy expiry against the injected clock, so ManualClock tests see
        // deterministic expiry too.
        if data.claims.exp <= self.clock.now().timestamp() {
            debug!("token expired");
            return Err(TokenRejection::Expired);
        }

        Ok(Subject {
            id: data.claims.sub,
            username: data.claims.username,
            role: data.claims.role,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{ManualClock, SystemClock};
    use chrono::Utc;

    fn issuer() -> TokenIssuer {
        TokenIssuer::new("test_secret_key", Arc::new(SystemClock)).unwrap()
    }

    #[test]
    fn test_sign_and_verify_round_trip() {
        let issuer = issuer();
        let subject = Subject::user("user@example.com");

        let token = issuer.sign(&subject).unwrap();
        let recovered = issuer.verify(&token).unwrap();

        assert_eq!(recovered, subject);
        assert_eq!(recovered.role, Role::User);
    }

    #[test]
    fn test_empty_secret_is_fatal() {
        let result = TokenIssuer::new("", Arc::new(SystemClock));
        assert!(matches!(result, Err(CoreError::Configuration(_))));
    }

    #[test]
    fn test_tampered_token_rejected() {
        let issuer = issuer();
        let token = issuer.sign(&Subject::user("user@example.com")).unwrap();

        let mut tampered = token.clone();
        tampered.push('x');

        assert_eq!(issuer.verify(&tampered), Err(TokenRejection::InvalidSignature));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let issuer1 = issuer();
        let issuer2 = TokenIssuer::new("another_secret", Arc::new(SystemClock)).unwrap();

        let token = issuer1.sign(&Subject::user("user@example.com")).unwrap();
        assert_eq!(issuer2.verify(&token), Err(TokenRejection::InvalidSignature));
    }

    #[test]
    fn test_expiry_distinguished_from_forgery() {
        let clock = ManualClock::new(Utc::now());
        let issuer = TokenIssuer::new("test_secret_key", Arc::new(clock.clone())).unwrap();

        let token = issuer.sign(&Subject::admin("superadmin", "superadmin")).unwrap();
        assert!(issuer.verify(&token).is_ok());

        clock.advance(chrono::Duration::days(8));
        assert_eq!(issuer.verify(&token), Err(TokenRejection::Expired));
    }
}
