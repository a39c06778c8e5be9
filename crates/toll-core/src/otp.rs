//! # OTP Registry
//!
//! Challenge state machine for passwordless login: issue with rate limiting,
//! verify with lazy expiry, single use. At most one live challenge per
//! contact identifier; issuance and verification on the same identifier are
//! linearized through versioned compare-and-swap on the store, so a verify
//! racing a reissue always observes one consistent challenge.

use crate::clock::Clock;
use crate::error::{CoreError, CoreResult};
use crate::notifier::{Channel, Notifier};
use crate::store::KeyValueStore;
use crate::token::Subject;
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// A live challenge for one contact identifier.
#[derive(Debug, Clone)]
pub struct OtpChallenge {
    pub code: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub last_sent_at: DateTime<Utc>,
    /// Sends within the current rolling window.
    pub send_count: u32,
    pub window_started_at: DateTime<Utc>,
}

/// Tunable limits. Defaults match the reference deployment.
#[derive(Debug, Clone)]
pub struct OtpConfig {
    /// Code lifetime.
    pub ttl: Duration,
    /// Minimum gap between sends to the same identifier.
    pub resend_cooldown: Duration,
    /// Maximum sends per identifier within `window`.
    pub send_cap: u32,
    /// Rolling window the cap applies to.
    pub window: Duration,
    /// Number of digits in a code.
    pub code_len: u32,
}

impl Default for OtpConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::minutes(5),
            resend_cooldown: Duration::seconds(60),
            send_cap: 10,
            window: Duration::hours(24),
            code_len: 6,
        }
    }
}

/// Outcome of a successful issuance. The code is returned to the caller
/// solely for out-of-band delivery paths and tests; the HTTP layer never
/// echoes it to the requester.
#[derive(Debug, Clone)]
pub struct IssuedOtp {
    pub code: String,
    pub expires_at: DateTime<Utc>,
    pub channel: Channel,
}

/// Classify a contact identifier the way the login form accepts it:
/// anything with `@` is an email, otherwise digits/spaces/`+`/`-` is a
/// phone number.
pub fn classify_target(target: &str) -> CoreResult<Channel> {
    if target.is_empty() {
        return Err(CoreError::InvalidTarget("target required".to_string()));
    }
    if target.contains('@') {
        return Ok(Channel::Email);
    }
    if target
        .chars()
        .all(|c| c.is_ascii_digit() || c == ' ' || c == '+' || c == '-')
    {
        return Ok(Channel::Sms);
    }
    Err(CoreError::InvalidTarget(format!(
        "not an email or phone number: {target}"
    )))
}

/// Holds challenge state keyed by contact identifier.
pub struct OtpRegistry {
    store: Arc<dyn KeyValueStore<OtpChallenge>>,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn Notifier>,
    config: OtpConfig,
}

impl OtpRegistry {
    pub fn new(
        store: Arc<dyn KeyValueStore<OtpChallenge>>,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn Notifier>,
        config: OtpConfig,
    ) -> Self {
        Self {
            store,
            clock,
            notifier,
            config,
        }
    }

    fn generate_code(&self) -> String {
        let max = 10u64.pow(self.config.code_len);
        let min = max / 10;
        let n = rand::thread_rng().gen_range(min..max);
        format!("{n}")
    }

    /// Issue (or reissue) a challenge and deliver the code.
    ///
    /// The new challenge is reserved in the store before delivery, so a
    /// delivery failure still counts against the send cap (the attempt
    /// consumed a send) and surfaces as `DeliveryFailed`, never as success.
    #[instrument(skip(self), fields(target = %target))]
    pub async fn issue(&self, target: &str) -> CoreResult<IssuedOtp> {
        let channel = classify_target(target)?;

        // CAS loop: rate-limit decisions and the overwrite of any prior
        // challenge must happen against one consistent version.
        let (code, expires_at) = loop {
            let now = self.clock.now();
            let existing = self.store.get(target);

            let (send_count, window_started_at) = match &existing {
                Some(entry) => {
                    let challenge = &entry.value;
                    let window_age = now - challenge.window_started_at;
                    if window_age >= self.config.window {
                        // Rolling window elapsed, counter starts fresh.
                        (0, now)
                    } else {
                        if challenge.send_count >= self.config.send_cap {
                            let retry = self.config.window - window_age;
                            return Err(CoreError::RateLimited {
                                retry_after_secs: retry.num_seconds().max(1),
                            });
                        }
                        let since_last = now - challenge.last_sent_at;
                        if since_last < self.config.resend_cooldown {
                            let retry = self.config.resend_cooldown - since_last;
                            return Err(CoreError::RateLimited {
                                retry_after_secs: retry.num_seconds().max(1),
                            });
                        }
                        (challenge.send_count, challenge.window_started_at)
                    }
                }
                None => (0, now),
            };

            let code = self.generate_code();
            let expires_at = now + self.config.ttl;
            let challenge = OtpChallenge {
                code: code.clone(),
                issued_at: now,
                expires_at,
                last_sent_at: now,
                send_count: send_count + 1,
                window_started_at,
            };

            let expected = existing.as_ref().map(|e| e.version);
            match self.store.compare_and_swap(target, expected, challenge) {
                Ok(_) => break (code, expires_at),
                Err(_) => {
                    debug!("lost issuance race, re-checking rate limits");
                    continue;
                }
            }
        };

        if let Err(e) = self.notifier.send(channel, target, &code).await {
            warn!("OTP delivery failed: {e}");
            return Err(CoreError::DeliveryFailed(e.to_string()));
        }

        info!("issued OTP challenge");
        Ok(IssuedOtp {
            code,
            expires_at,
            channel,
        })
    }

    /// Verify a submitted code. Success consumes the challenge; expiry
    /// purges the stale entry as a side effect.
    #[instrument(skip(self, code), fields(target = %target))]
    pub fn verify(&self, target: &str, code: &str) -> CoreResult<Subject> {
        let entry = self.store.get(target).ok_or(CoreError::OtpNotFound)?;
        let challenge = &entry.value;

        if self.clock.now() > challenge.expires_at {
            // Lazy expiry: version-guarded so we never purge a fresher
            // challenge issued concurrently.
            self.store.delete(target, Some(entry.version));
            return Err(CoreError::OtpExpired);
        }

        if challenge.code != code {
            return Err(CoreError::OtpMismatch);
        }

        // Single use: only the caller that removes this exact version wins.
        if !self.store.delete(target, Some(entry.version)) {
            return Err(CoreError::OtpNotFound);
        }

        info!("OTP verified");
        Ok(Subject::user(target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::CoreResult;
    use crate::notifier::LogNotifier;
    use crate::store::InMemoryStore;
    use async_trait::async_trait;

    struct FailingNotifier;

    #[async_trait]
    impl Notifier for FailingNotifier {
        async fn send_email(&self, _to: &str, _code: &str) -> CoreResult<()> {
            Err(CoreError::DeliveryFailed("smtp unreachable".to_string()))
        }

        async fn send_sms(&self, _to: &str, _code: &str) -> CoreResult<()> {
            Err(CoreError::DeliveryFailed("sms provider down".to_string()))
        }
    }

    fn registry_with(
        clock: ManualClock,
        notifier: Arc<dyn Notifier>,
    ) -> OtpRegistry {
        OtpRegistry::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(clock),
            notifier,
            OtpConfig::default(),
        )
    }

    fn registry(clock: ManualClock) -> OtpRegistry {
        registry_with(clock, Arc::new(LogNotifier))
    }

    #[test]
    fn test_classify_target() {
        assert_eq!(classify_target("user@example.com").unwrap(), Channel::Email);
        assert_eq!(classify_target("+86 138-0000-0000").unwrap(), Channel::Sms);
        assert!(classify_target("not a target!").is_err());
        assert!(classify_target("").is_err());
    }

    #[tokio::test]
    async fn test_issue_and_verify_single_use() {
        let clock = ManualClock::new(Utc::now());
        let registry = registry(clock);

        let issued = registry.issue("user@example.com").await.unwrap();
        assert_eq!(issued.code.len(), 6);

        let subject = registry.verify("user@example.com", &issued.code).unwrap();
        assert_eq!(subject.id, "user@example.com");

        // Second verification with the same code finds no challenge.
        let err = registry.verify("user@example.com", &issued.code).unwrap_err();
        assert!(matches!(err, CoreError::OtpNotFound));
    }

    #[tokio::test]
    async fn test_resend_within_cooldown_rate_limited() {
        let clock = ManualClock::new(Utc::now());
        let registry = registry(clock.clone());

        registry.issue("user@example.com").await.unwrap();
        let err = registry.issue("user@example.com").await.unwrap_err();
        assert!(matches!(err, CoreError::RateLimited { .. }));

        // After the cool-down the resend succeeds and replaces the code.
        clock.advance(Duration::seconds(61));
        assert!(registry.issue("user@example.com").await.is_ok());
    }

    #[tokio::test]
    async fn test_resend_replaces_prior_code() {
        let clock = ManualClock::new(Utc::now());
        let registry = registry(clock.clone());

        let first = registry.issue("user@example.com").await.unwrap();
        clock.advance(Duration::seconds(61));
        let second = registry.issue("user@example.com").await.unwrap();

        if first.code != second.code {
            let err = registry.verify("user@example.com", &first.code).unwrap_err();
            assert!(matches!(err, CoreError::OtpMismatch));
        }
        assert!(registry.verify("user@example.com", &second.code).is_ok());
    }

    #[tokio::test]
    async fn test_window_cap_exhaustion() {
        let clock = ManualClock::new(Utc::now());
        let registry = registry(clock.clone());

        for _ in 0..10 {
            registry.issue("user@example.com").await.unwrap();
            clock.advance(Duration::seconds(61));
        }

        let err = registry.issue("user@example.com").await.unwrap_err();
        assert!(matches!(err, CoreError::RateLimited { .. }));

        // The counter resets once the rolling window has elapsed.
        clock.advance(Duration::hours(24));
        assert!(registry.issue("user@example.com").await.is_ok());
    }

    #[tokio::test]
    async fn test_expired_code_rejected_and_purged() {
        let clock = ManualClock::new(Utc::now());
        let registry = registry(clock.clone());

        let issued = registry.issue("user@example.com").await.unwrap();
        clock.advance(Duration::minutes(6));

        // Correct code, but past TTL.
        let err = registry.verify("user@example.com", &issued.code).unwrap_err();
        assert!(matches!(err, CoreError::OtpExpired));

        // The stale entry was purged, not left behind.
        let err = registry.verify("user@example.com", &issued.code).unwrap_err();
        assert!(matches!(err, CoreError::OtpNotFound));
    }

    #[tokio::test]
    async fn test_mismatch_leaves_challenge_live() {
        let clock = ManualClock::new(Utc::now());
        let registry = registry(clock);

        let issued = registry.issue("user@example.com").await.unwrap();
        let wrong = if issued.code == "000000" { "000001" } else { "000000" };

        let err = registry.verify("user@example.com", wrong).unwrap_err();
        assert!(matches!(err, CoreError::OtpMismatch));

        // Correct code still works after a mismatch.
        assert!(registry.verify("user@example.com", &issued.code).is_ok());
    }

    #[tokio::test]
    async fn test_delivery_failure_propagates() {
        let clock = ManualClock::new(Utc::now());
        let registry = registry_with(clock.clone(), Arc::new(FailingNotifier));

        let err = registry.issue("user@example.com").await.unwrap_err();
        assert!(matches!(err, CoreError::DeliveryFailed(_)));

        // The failed attempt still consumed a send.
        let err = registry.issue("user@example.com").await.unwrap_err();
        assert!(matches!(err, CoreError::RateLimited { .. }));
    }

    #[tokio::test]
    async fn test_invalid_target_rejected_before_any_send() {
        let clock = ManualClock::new(Utc::now());
        let registry = registry(clock);

        let err = registry.issue("not a target!").await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidTarget(_)));
    }
}
