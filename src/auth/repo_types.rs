use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Which flow a one-time code belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtpPurpose {
    Verification,
    Reset,
}

impl OtpPurpose {
    pub fn mail_subject(self) -> &'static str {
        match self {
            OtpPurpose::Verification => "Your GlowTasks verification code",
            OtpPurpose::Reset => "Your GlowTasks password reset code",
        }
    }
}

/// Bookkeeping for one purpose's one-time code.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OtpState {
    pub code: Option<String>,
    pub expires_at: Option<OffsetDateTime>,
    pub attempts: u32,
    pub sent_count: u32,
    pub last_sent_at: Option<OffsetDateTime>,
}

/// User record. Persisted flat, see [`UserRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "UserRecord", into = "UserRecord")]
pub struct User {
    pub username: String,
    pub email: String,
    /// argon2 PHC string, or bcrypt for accounts from the older server.
    pub password_hash: String,
    pub created_at: OffsetDateTime,
    pub verified: bool,
    pub verification: OtpState,
    pub reset: OtpState,
}

/// On-disk shape of a user. Every OTP field may be absent or `null`;
/// a missing `verified` flag marks an account from before email verification.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserRecord {
    username: String,
    email: String,
    password: String,
    #[serde(with = "time::serde::rfc3339")]
    created_at: OffsetDateTime,
    #[serde(default)]
    verified: Option<bool>,

    #[serde(default)]
    verification_otp: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    verification_otp_expires: Option<OffsetDateTime>,
    #[serde(default)]
    verification_otp_attempts: Option<u32>,
    #[serde(default)]
    verification_otp_sent_count: Option<u32>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    last_verification_otp_sent_at: Option<OffsetDateTime>,

    #[serde(default)]
    reset_otp: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    reset_otp_expires: Option<OffsetDateTime>,
    #[serde(default)]
    reset_otp_attempts: Option<u32>,
    #[serde(default)]
    reset_otp_sent_count: Option<u32>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    last_reset_otp_sent_at: Option<OffsetDateTime>,
}

impl From<UserRecord> for User {
    fn from(r: UserRecord) -> Self {
        Self {
            username: r.username,
            email: r.email,
            password_hash: r.password,
            created_at: r.created_at,
            verified: r.verified.unwrap_or(true),
            verification: OtpState {
                code: r.verification_otp,
                expires_at: r.verification_otp_expires,
                attempts: r.verification_otp_attempts.unwrap_or_default(),
                sent_count: r.verification_otp_sent_count.unwrap_or_default(),
                last_sent_at: r.last_verification_otp_sent_at,
            },
            reset: OtpState {
                code: r.reset_otp,
                expires_at: r.reset_otp_expires,
                attempts: r.reset_otp_attempts.unwrap_or_default(),
                sent_count: r.reset_otp_sent_count.unwrap_or_default(),
                last_sent_at: r.last_reset_otp_sent_at,
            },
        }
    }
}

impl From<User> for UserRecord {
    fn from(u: User) -> Self {
        Self {
            username: u.username,
            email: u.email,
            password: u.password_hash,
            created_at: u.created_at,
            verified: Some(u.verified),
            verification_otp: u.verification.code,
            verification_otp_expires: u.verification.expires_at,
            verification_otp_attempts: Some(u.verification.attempts),
            verification_otp_sent_count: Some(u.verification.sent_count),
            last_verification_otp_sent_at: u.verification.last_sent_at,
            reset_otp: u.reset.code,
            reset_otp_expires: u.reset.expires_at,
            reset_otp_attempts: Some(u.reset.attempts),
            reset_otp_sent_count: Some(u.reset.sent_count),
            last_reset_otp_sent_at: u.reset.last_sent_at,
        }
    }
}

impl User {
    pub fn otp(&self, purpose: OtpPurpose) -> &OtpState {
        match purpose {
            OtpPurpose::Verification => &self.verification,
            OtpPurpose::Reset => &self.reset,
        }
    }

    pub fn otp_mut(&mut self, purpose: OtpPurpose) -> &mut OtpState {
        match purpose {
            OtpPurpose::Verification => &mut self.verification,
            OtpPurpose::Reset => &mut self.reset,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_record_without_otp_fields_loads_as_verified() {
        let raw = r#"{
            "username": "ada",
            "email": "ada@example.com",
            "password": "$argon2id$stub",
            "createdAt": "2024-01-02T03:04:05Z"
        }"#;
        let user: User = serde_json::from_str(raw).expect("legacy user parses");
        assert!(user.verified);
        assert_eq!(user.verification, OtpState::default());
        assert_eq!(user.reset, OtpState::default());
    }

    #[test]
    fn persists_flat_otp_fields() {
        let mut user = User {
            username: "ada".into(),
            email: "ada@example.com".into(),
            password_hash: "hash".into(),
            created_at: OffsetDateTime::UNIX_EPOCH,
            verified: false,
            verification: OtpState::default(),
            reset: OtpState::default(),
        };
        user.verification.code = Some("123456".into());
        user.verification.sent_count = 1;

        let json = serde_json::to_value(&user).unwrap();
        assert_eq!(json["password"], "hash");
        assert_eq!(json["verified"], false);
        assert_eq!(json["verificationOtp"], "123456");
        assert_eq!(json["verificationOtpSentCount"], 1);
        assert!(json["resetOtp"].is_null());
        assert!(json.get("verification").is_none());

        let back: User = serde_json::from_value(json).unwrap();
        assert_eq!(back, user);
    }

    #[test]
    fn null_otp_fields_from_older_server_parse() {
        let raw = r#"{
            "username": "ada",
            "email": "ada@example.com",
            "password": "$2a$10$abcdefghijklmnopqrstuu",
            "createdAt": "2024-01-02T03:04:05.678Z",
            "verified": false,
            "verificationOtp": "482913",
            "verificationOtpExpires": "2024-01-02T03:14:05.678Z",
            "resetOtp": null,
            "resetOtpExpires": null
        }"#;
        let user: User = serde_json::from_str(raw).expect("older record parses");
        assert!(!user.verified);
        assert_eq!(user.verification.code.as_deref(), Some("482913"));
        assert!(user.verification.expires_at.is_some());
        assert_eq!(user.verification.attempts, 0);
        assert_eq!(user.reset, OtpState::default());
    }
}
