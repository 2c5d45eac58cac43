use std::ops::RangeInclusive;
use std::path::PathBuf;

use serde::Deserialize;
use tracing::warn;

use crate::auth::otp::OtpPolicy;

const TTL_SECONDS: RangeInclusive<i64> = 1..=30 * 24 * 60 * 60;
const COOLDOWN_SECONDS: RangeInclusive<i64> = 0..=24 * 60 * 60;
const RETENTION_HOURS: RangeInclusive<i64> = 0..=10 * 365 * 24;

#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    /// No host means codes go to the log.
    pub host: Option<String>,
    pub port: u16,
    pub user: Option<String>,
    pub pass: Option<String>,
    pub from: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub data_file: PathBuf,
    pub smtp: SmtpConfig,
    pub otp: OtpPolicy,
    pub trash_retention_hours: i64,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self::from_lookup(|key| std::env::var(key).ok()))
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let parse = |key: &str| var(key).and_then(|v| v.trim().parse::<i64>().ok());

        let smtp = SmtpConfig {
            host: var("SMTP_HOST").filter(|h| !h.is_empty()),
            port: var("SMTP_PORT").and_then(|v| v.parse().ok()).unwrap_or(587),
            user: var("SMTP_USER"),
            pass: var("SMTP_PASS"),
            from: var("SMTP_FROM").unwrap_or_else(|| "no-reply@example.com".into()),
        };

        let defaults = OtpPolicy::default();
        let otp = OtpPolicy {
            ttl_seconds: clamped(
                "OTP_TTL_SECONDS",
                parse("OTP_TTL_SECONDS"),
                defaults.ttl_seconds,
                TTL_SECONDS,
            ),
            resend_cooldown_seconds: clamped(
                "OTP_RESEND_COOLDOWN_SECONDS",
                parse("OTP_RESEND_COOLDOWN_SECONDS"),
                defaults.resend_cooldown_seconds,
                COOLDOWN_SECONDS,
            ),
            max_sends: var("OTP_MAX_SENDS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_sends),
            max_attempts: var("OTP_MAX_ATTEMPTS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_attempts),
        };

        Self {
            host: var("APP_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: var("APP_PORT").and_then(|v| v.parse().ok()).unwrap_or(5000),
            data_file: var("DATA_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("data.json")),
            smtp,
            otp,
            trash_retention_hours: clamped(
                "TRASH_RETENTION_HOURS",
                parse("TRASH_RETENTION_HOURS"),
                48,
                RETENTION_HOURS,
            ),
        }
    }

    pub fn trash_retention(&self) -> time::Duration {
        time::Duration::hours(self.trash_retention_hours)
    }
}

fn clamped(key: &str, value: Option<i64>, default: i64, range: RangeInclusive<i64>) -> i64 {
    let Some(value) = value else {
        return default;
    };
    let bounded = value.clamp(*range.start(), *range.end());
    if bounded != value {
        warn!(%key, value, used = bounded, "setting out of range; clamped");
    }
    bounded
}
