use rand::Rng;
use serde::Deserialize;
use thiserror::Error;
use time::{Duration, OffsetDateTime};

use super::repo_types::OtpState;

/// Limits applied to one-time codes. Same policy for both purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct OtpPolicy {
    pub ttl_seconds: i64,
    pub resend_cooldown_seconds: i64,
    pub max_sends: u32,
    pub max_attempts: u32,
}

impl Default for OtpPolicy {
    fn default() -> Self {
        Self {
            ttl_seconds: 10 * 60,
            resend_cooldown_seconds: 60,
            max_sends: 5,
            max_attempts: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OtpError {
    #[error("Please wait {retry_after_secs} seconds before requesting another code")]
    Cooldown { retry_after_secs: i64 },
    #[error("Too many codes requested. Please contact support.")]
    RateLimited,
    #[error("No OTP to verify")]
    NotIssued,
    #[error("OTP expired. Please request a new code.")]
    Expired,
    #[error("Too many incorrect attempts. Please request a new code.")]
    TooManyAttempts,
    #[error("Incorrect OTP")]
    IncorrectCode,
}

/// Uniform six-digit code in `100000..=999999`.
pub fn generate_code() -> String {
    rand::thread_rng().gen_range(100_000..=999_999u32).to_string()
}

/// Issues a fresh code into `state`, returning it for delivery.
pub fn issue(state: &mut OtpState, policy: &OtpPolicy, now: OffsetDateTime) -> Result<String, OtpError> {
    if let Some(last) = state.last_sent_at {
        let cooldown = Duration::seconds(policy.resend_cooldown_seconds);
        let elapsed = now - last;
        if elapsed < cooldown {
            let remaining = (cooldown - elapsed).whole_seconds().max(1);
            return Err(OtpError::Cooldown {
                retry_after_secs: remaining,
            });
        }
    }
    if state.sent_count >= policy.max_sends {
        return Err(OtpError::RateLimited);
    }

    let code = generate_code();
    state.code = Some(code.clone());
    state.expires_at = Some(now.saturating_add(Duration::seconds(policy.ttl_seconds)));
    state.attempts = 0;
    state.sent_count += 1;
    state.last_sent_at = Some(now);
    Ok(code)
}

/// Checks `submitted` against the pending code. Only a wrong code counts as an attempt.
pub fn verify(
    state: &mut OtpState,
    policy: &OtpPolicy,
    submitted: &str,
    now: OffsetDateTime,
) -> Result<(), OtpError> {
    let (Some(code), Some(expires_at)) = (state.code.as_deref(), state.expires_at) else {
        return Err(OtpError::NotIssued);
    };

    if now > expires_at {
        return Err(OtpError::Expired);
    }
    if state.attempts >= policy.max_attempts {
        return Err(OtpError::TooManyAttempts);
    }
    if code != submitted.trim() {
        state.attempts += 1;
        return Err(OtpError::IncorrectCode);
    }

    state.code = None;
    state.expires_at = None;
    state.attempts = 0;
    Ok(())
}
