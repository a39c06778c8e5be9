//! Out-of-band OTP delivery capability.
//!
//! The registry never knows how codes reach the user; it only demands that
//! a failed delivery surfaces as an error instead of being swallowed.

use crate::error::CoreResult;
use async_trait::async_trait;
use tracing::info;

/// Delivery channel resolved from the target's shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Email,
    Sms,
}

/// External collaborator that delivers OTP codes.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_email(&self, to: &str, code: &str) -> CoreResult<()>;

    async fn send_sms(&self, to: &str, code: &str) -> CoreResult<()>;

    async fn send(&self, channel: Channel, to: &str, code: &str) -> CoreResult<()> {
        match channel {
            Channel::Email => self.send_email(to, code).await,
            Channel::Sms => self.send_sms(to, code).await,
        }
    }
}

/// Message body sent with every code.
pub fn otp_message(code: &str) -> String {
    format!("Your verification code is: {code}. Valid for 5 minutes.")
}

/// Reference notifier: logs the would-be delivery. Used when no SMTP/SMS
/// credentials are configured so the deployment still runs end to end.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_email(&self, to: &str, code: &str) -> CoreResult<()> {
        info!(to, "would send email OTP: {}", otp_message(code));
        Ok(())
    }

    async fn send_sms(&self, to: &str, code: &str) -> CoreResult<()> {
        info!(to, "would send SMS OTP: {}", otp_message(code));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_otp_message_wording() {
        assert_eq!(
            otp_message("123456"),
            "Your verification code is: 123456. Valid for 5 minutes."
        );
    }

    #[tokio::test]
    async fn test_log_notifier_never_fails() {
        let notifier = LogNotifier;
        assert!(notifier.send(Channel::Email, "a@b.c", "000000").await.is_ok());
        assert!(notifier.send(Channel::Sms, "+15550000", "000000").await.is_ok());
    }
}
