use thiserror::Error;
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::auth::dto::{
    present, EmailRequest, LoginRequest, LoginResponse, Profile, RegisterRequest,
    RegisterResponse, ResetRequest, VerifyOtpRequest,
};
use crate::auth::otp::{self, OtpError};
use crate::auth::password::{hash_password_blocking, needs_rehash, verify_password_blocking};
use crate::auth::repo_types::{OtpPurpose, OtpState, User};
use crate::error::AppError;
use crate::mailer::deliver_code;
use crate::state::AppState;
use crate::store::StoreError;

pub const FORGOT_MESSAGE: &str = "If this email exists, an OTP has been sent.";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("{0}")]
    MissingFields(&'static str),
    #[error("Username already exists")]
    DuplicateUsername,
    #[error("Email already registered")]
    DuplicateEmail,
    #[error("Invalid email or OTP")]
    InvalidEmailOrOtp,
    #[error("No account registered with this email")]
    UnknownEmail,
    #[error("Email already verified")]
    AlreadyVerified,
    #[error("Invalid username/email or password")]
    InvalidCredentials,
    #[error("Please verify your email before logging in.")]
    Unverified,
    #[error(transparent)]
    Otp(#[from] OtpError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<OtpError> for AppError {
    fn from(e: OtpError) -> Self {
        match e {
            OtpError::Cooldown { .. } | OtpError::RateLimited | OtpError::TooManyAttempts => {
                AppError::RateLimited(e.to_string())
            }
            OtpError::NotIssued | OtpError::Expired | OtpError::IncorrectCode => {
                AppError::Validation(e.to_string())
            }
        }
    }
}

impl From<AuthError> for AppError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::MissingFields(_)
            | AuthError::DuplicateUsername
            | AuthError::DuplicateEmail
            | AuthError::InvalidEmailOrOtp
            | AuthError::UnknownEmail
            | AuthError::AlreadyVerified => AppError::Validation(e.to_string()),
            AuthError::InvalidCredentials => AppError::Unauthorized(e.to_string()),
            AuthError::Unverified => AppError::Forbidden(e.to_string()),
            AuthError::Otp(otp) => otp.into(),
            AuthError::Store(store) => store.into(),
            AuthError::Internal(err) => AppError::Internal(err),
        }
    }
}

pub async fn register(
    state: &AppState,
    req: RegisterRequest,
    now: OffsetDateTime,
) -> Result<RegisterResponse, AuthError> {
    let (Some(username), Some(email), Some(password)) =
        (present(&req.username), present(&req.email), present(&req.password))
    else {
        return Err(AuthError::MissingFields("Username, email and password are required"));
    };
    let (username, email) = (username.to_owned(), email.to_owned());

    let password_hash = hash_password_blocking(password.to_owned()).await?;
    let policy = state.config.otp;

    let code = state
        .store
        .write(|doc| {
            if doc.find_by_username(&username).is_some() {
                return Err(AuthError::DuplicateUsername);
            }
            if doc.find_by_email(&email).is_some() {
                return Err(AuthError::DuplicateEmail);
            }

            let mut user = User {
                username: username.clone(),
                email: email.clone(),
                password_hash,
                created_at: now,
                verified: false,
                verification: OtpState::default(),
                reset: OtpState::default(),
            };
            let code = otp::issue(&mut user.verification, &policy, now)?;
            doc.insert_user(user);
            Ok(code)
        })
        .await
        .inspect_err(|e| warn!(%username, %email, error = %e, "registration rejected"))?;

    info!(%username, %email, "user registered; awaiting verification");
    deliver_code(
        state.mailer.as_ref(),
        &email,
        OtpPurpose::Verification.mail_subject(),
        &code,
    )
    .await;

    Ok(RegisterResponse {
        message: "User created. Please verify using the OTP sent to your email.".into(),
        email,
    })
}

pub async fn resend_verification(
    state: &AppState,
    req: EmailRequest,
    now: OffsetDateTime,
) -> Result<&'static str, AuthError> {
    let Some(email) = present(&req.email).map(str::to_owned) else {
        return Err(AuthError::MissingFields("Email is required"));
    };
    let policy = state.config.otp;

    let code = state
        .store
        .write(|doc| {
            let user = doc.find_by_email_mut(&email).ok_or(AuthError::UnknownEmail)?;
            if user.verified {
                return Err(AuthError::AlreadyVerified);
            }
            Ok(otp::issue(&mut user.verification, &policy, now)?)
        })
        .await
        .inspect_err(|e| warn!(%email, error = %e, "verification resend rejected"))?;

    deliver_code(
        state.mailer.as_ref(),
        &email,
        OtpPurpose::Verification.mail_subject(),
        &code,
    )
    .await;
    Ok("A new verification code has been sent.")
}

/// A user who is already verified gets a no-op success, stale code or not.
pub async fn verify_signup(
    state: &AppState,
    req: VerifyOtpRequest,
    now: OffsetDateTime,
) -> Result<&'static str, AuthError> {
    let (Some(email), Some(submitted)) = (present(&req.email), present(&req.otp)) else {
        return Err(AuthError::MissingFields("Email and OTP are required"));
    };
    let policy = state.config.otp;

    let message = state
        .store
        .write(|doc| -> Result<&'static str, AuthError> {
            let user = doc.find_by_email_mut(email).ok_or(AuthError::InvalidEmailOrOtp)?;
            if user.verified {
                return Ok("Already verified");
            }
            otp::verify(&mut user.verification, &policy, submitted, now)?;
            user.verified = true;
            Ok("Email verified successfully")
        })
        .await
        .inspect_err(|e| warn!(%email, error = %e, "signup verification failed"))?;

    info!(%email, outcome = message, "signup verification");
    Ok(message)
}

pub async fn login(state: &AppState, req: LoginRequest) -> Result<LoginResponse, AuthError> {
    let (Some(identifier), Some(password)) = (present(&req.identifier), present(&req.password))
    else {
        return Err(AuthError::MissingFields("Identifier and password are required"));
    };

    let user = state
        .store
        .read(|doc| doc.find_by_identifier(identifier).cloned())
        .await;
    let Some(user) = user else {
        warn!(%identifier, "login unknown identifier");
        return Err(AuthError::InvalidCredentials);
    };

    let ok = verify_password_blocking(password.to_owned(), user.password_hash.clone()).await?;
    if !ok {
        warn!(username = %user.username, "login invalid password");
        return Err(AuthError::InvalidCredentials);
    }
    if !user.verified {
        warn!(username = %user.username, "login before verification");
        return Err(AuthError::Unverified);
    }
    if needs_rehash(&user.password_hash) {
        upgrade_hash(state, &user.username, password).await;
    }

    info!(username = %user.username, "user logged in");
    Ok(LoginResponse {
        message: "Login successful".into(),
        username: user.username,
        email: user.email,
        created_at: user.created_at,
    })
}

/// Swaps a legacy bcrypt hash for argon2 after a successful login. Failure keeps the old hash.
async fn upgrade_hash(state: &AppState, username: &str, password: &str) {
    let hash = match hash_password_blocking(password.to_owned()).await {
        Ok(hash) => hash,
        Err(e) => {
            warn!(%username, error = %format!("{e:#}"), "password rehash failed");
            return;
        }
    };
    let saved = state
        .store
        .write_if(|doc| match doc.find_by_username_mut(username) {
            Some(user) => {
                user.password_hash = hash;
                ((), true)
            }
            None => ((), false),
        })
        .await;
    match saved {
        Ok(()) => info!(%username, "legacy password hash upgraded"),
        Err(e) => warn!(%username, error = %e, "password rehash not saved"),
    }
}

/// Answers the same way whether or not the email is registered.
pub async fn forgot_password(
    state: &AppState,
    req: EmailRequest,
    now: OffsetDateTime,
) -> Result<&'static str, AuthError> {
    let Some(email) = present(&req.email).map(str::to_owned) else {
        return Err(AuthError::MissingFields("Email is required"));
    };
    let policy = state.config.otp;

    let code = state
        .store
        .write(|doc| match doc.find_by_email_mut(&email) {
            Some(user) => otp::issue(&mut user.reset, &policy, now)
                .map(Some)
                .map_err(AuthError::from),
            None => Ok(None),
        })
        .await
        .inspect_err(|e| warn!(%email, error = %e, "password reset request rejected"))?;

    match code {
        Some(code) => {
            deliver_code(
                state.mailer.as_ref(),
                &email,
                OtpPurpose::Reset.mail_subject(),
                &code,
            )
            .await
        }
        None => info!(%email, "password reset requested for unknown email"),
    }
    Ok(FORGOT_MESSAGE)
}

pub async fn reset_password(
    state: &AppState,
    req: ResetRequest,
    now: OffsetDateTime,
) -> Result<&'static str, AuthError> {
    let (Some(email), Some(submitted), Some(new_password)) =
        (present(&req.email), present(&req.otp), present(&req.new_password))
    else {
        return Err(AuthError::MissingFields("Email, OTP and new password are required"));
    };

    let password_hash = hash_password_blocking(new_password.to_owned()).await?;
    let policy = state.config.otp;

    state
        .store
        .write(|doc| {
            let user = doc.find_by_email_mut(email).ok_or(AuthError::InvalidEmailOrOtp)?;
            match otp::verify(&mut user.reset, &policy, submitted, now) {
                Ok(()) => {}
                Err(OtpError::NotIssued) => return Err(AuthError::InvalidEmailOrOtp),
                Err(e) => return Err(e.into()),
            }
            user.password_hash = password_hash;
            Ok(())
        })
        .await
        .inspect_err(|e| warn!(%email, error = %e, "password reset failed"))?;

    info!(%email, "password reset");
    Ok("Password reset successful")
}

pub async fn profile(state: &AppState, username: &str) -> Option<Profile> {
    state
        .store
        .read(|doc| {
            doc.find_by_username(username).map(|u| Profile {
                username: u.username.clone(),
                email: u.email.clone(),
                created_at: u.created_at,
                verified: u.verified,
            })
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_util::fake;
    use crate::store::Store;
    use time::macros::datetime;
    use time::Duration;

    const T0: OffsetDateTime = datetime!(2024-06-01 12:00 UTC);

    fn signup(username: &str, email: &str) -> RegisterRequest {
        RegisterRequest {
            username: Some(username.into()),
            email: Some(email.into()),
            password: Some("pa55word".into()),
        }
    }

    fn login_req(identifier: &str, password: &str) -> LoginRequest {
        LoginRequest {
            identifier: Some(identifier.into()),
            password: Some(password.into()),
        }
    }

    fn verify_req(email: &str, otp: &str) -> VerifyOtpRequest {
        VerifyOtpRequest {
            email: Some(email.into()),
            otp: Some(otp.into()),
        }
    }

    fn email_req(email: &str) -> EmailRequest {
        EmailRequest {
            email: Some(email.into()),
        }
    }

    #[tokio::test]
    async fn duplicate_username_and_email_are_rejected() {
        let (state, _, _dir) = fake().await;
        register(&state, signup("ada", "ada@example.com"), T0).await.unwrap();

        let err = register(&state, signup("ada", "other@example.com"), T0).await.unwrap_err();
        assert!(matches!(err, AuthError::DuplicateUsername));

        let err = register(&state, signup("other", "ada@example.com"), T0).await.unwrap_err();
        assert!(matches!(err, AuthError::DuplicateEmail));
    }

    #[tokio::test]
    async fn missing_fields_are_rejected() {
        let (state, mailer, _dir) = fake().await;
        let req = RegisterRequest {
            username: Some("ada".into()),
            email: Some(String::new()),
            password: Some("pw".into()),
        };
        let err = register(&state, req, T0).await.unwrap_err();
        assert!(matches!(err, AuthError::MissingFields(_)));
        assert_eq!(mailer.count(), 0);
    }

    #[tokio::test]
    async fn unverified_user_cannot_log_in_until_verified() {
        let (state, mailer, _dir) = fake().await;
        register(&state, signup("ada", "ada@example.com"), T0).await.unwrap();
        assert_eq!(profile(&state, "ada").await.map(|p| p.verified), Some(false));

        let err = login(&state, login_req("ada", "pa55word")).await.unwrap_err();
        assert!(matches!(err, AuthError::Unverified));

        let code = mailer.last_code_for("ada@example.com").expect("code mailed");
        let msg = verify_signup(&state, verify_req("ada@example.com", &code), T0 + Duration::minutes(1))
            .await
            .unwrap();
        assert_eq!(msg, "Email verified successfully");

        let res = login(&state, login_req("ada@example.com", "pa55word")).await.unwrap();
        assert_eq!(res.username, "ada");
        assert_eq!(res.created_at, T0);
    }

    #[tokio::test]
    async fn wrong_password_is_invalid_credentials() {
        let (state, _, _dir) = fake().await;
        register(&state, signup("ada", "ada@example.com"), T0).await.unwrap();
        let err = login(&state, login_req("ada", "nope")).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
        let err = login(&state, login_req("ghost", "nope")).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
    }

    #[tokio::test]
    async fn verified_user_short_circuits() {
        let (state, mailer, _dir) = fake().await;
        register(&state, signup("ada", "ada@example.com"), T0).await.unwrap();
        let code = mailer.last_code_for("ada@example.com").unwrap();
        verify_signup(&state, verify_req("ada@example.com", &code), T0).await.unwrap();

        let msg = verify_signup(&state, verify_req("ada@example.com", "000000"), T0).await.unwrap();
        assert_eq!(msg, "Already verified");
    }

    #[tokio::test]
    async fn expired_signup_code_is_rejected() {
        let (state, mailer, _dir) = fake().await;
        register(&state, signup("ada", "ada@example.com"), T0).await.unwrap();
        let code = mailer.last_code_for("ada@example.com").unwrap();

        let later = T0 + Duration::minutes(11);
        let err = verify_signup(&state, verify_req("ada@example.com", &code), later)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Otp(OtpError::Expired)));
    }

    #[tokio::test]
    async fn failed_attempts_are_persisted() {
        let (state, mailer, _dir) = fake().await;
        register(&state, signup("ada", "ada@example.com"), T0).await.unwrap();
        let code = mailer.last_code_for("ada@example.com").unwrap();
        let wrong = if code == "111111" { "222222" } else { "111111" };

        for _ in 0..5 {
            let err = verify_signup(&state, verify_req("ada@example.com", wrong), T0)
                .await
                .unwrap_err();
            assert!(matches!(err, AuthError::Otp(OtpError::IncorrectCode)));
        }
        let err = verify_signup(&state, verify_req("ada@example.com", &code), T0)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Otp(OtpError::TooManyAttempts)));

        let reopened = Store::open(state.store.path()).await;
        let attempts = reopened
            .read(|d| d.find_by_username("ada").unwrap().verification.attempts)
            .await;
        assert_eq!(attempts, 5);
    }

    #[tokio::test]
    async fn resend_honours_cooldown_and_quota() {
        let (state, mailer, _dir) = fake().await;
        register(&state, signup("ada", "ada@example.com"), T0).await.unwrap();

        let err = resend_verification(&state, email_req("ada@example.com"), T0 + Duration::seconds(10))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Otp(OtpError::Cooldown { .. })));

        let mut now = T0;
        for _ in 0..4 {
            now += Duration::seconds(61);
            resend_verification(&state, email_req("ada@example.com"), now).await.unwrap();
        }
        assert_eq!(mailer.count(), 5);

        now += Duration::seconds(61);
        let err = resend_verification(&state, email_req("ada@example.com"), now)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Otp(OtpError::RateLimited)));
    }

    #[tokio::test]
    async fn resend_for_unknown_or_verified_email_is_rejected() {
        let (state, mailer, _dir) = fake().await;
        let err = resend_verification(&state, email_req("ghost@example.com"), T0).await.unwrap_err();
        assert!(matches!(err, AuthError::UnknownEmail));

        register(&state, signup("ada", "ada@example.com"), T0).await.unwrap();
        let code = mailer.last_code_for("ada@example.com").unwrap();
        verify_signup(&state, verify_req("ada@example.com", &code), T0).await.unwrap();
        let err = resend_verification(&state, email_req("ada@example.com"), T0 + Duration::minutes(5))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::AlreadyVerified));
    }

    #[tokio::test]
    async fn forgot_for_unknown_email_answers_generically() {
        let (state, mailer, _dir) = fake().await;
        let msg = forgot_password(&state, email_req("ghost@example.com"), T0).await.unwrap();
        assert_eq!(msg, FORGOT_MESSAGE);
        assert_eq!(mailer.count(), 0);
    }

    #[tokio::test]
    async fn reset_flow_changes_password() {
        let (state, mailer, _dir) = fake().await;
        register(&state, signup("ada", "ada@example.com"), T0).await.unwrap();
        let code = mailer.last_code_for("ada@example.com").unwrap();
        verify_signup(&state, verify_req("ada@example.com", &code), T0).await.unwrap();

        forgot_password(&state, email_req("ada@example.com"), T0).await.unwrap();
        let err = forgot_password(&state, email_req("ada@example.com"), T0 + Duration::seconds(5))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Otp(OtpError::Cooldown { .. })));

        let reset_code = mailer.last_code_for("ada@example.com").unwrap();
        let req = ResetRequest {
            email: Some("ada@example.com".into()),
            otp: Some(reset_code),
            new_password: Some("n3w-secret".into()),
        };
        reset_password(&state, req, T0 + Duration::minutes(2)).await.unwrap();

        assert!(login(&state, login_req("ada", "pa55word")).await.is_err());
        assert!(login(&state, login_req("ada", "n3w-secret")).await.is_ok());
    }

    #[tokio::test]
    async fn reset_without_pending_code_is_invalid() {
        let (state, _, _dir) = fake().await;
        register(&state, signup("ada", "ada@example.com"), T0).await.unwrap();
        let req = ResetRequest {
            email: Some("ada@example.com".into()),
            otp: Some("123456".into()),
            new_password: Some("whatever".into()),
        };
        let err = reset_password(&state, req, T0).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidEmailOrOtp));
    }

    #[tokio::test]
    async fn mail_failure_does_not_fail_registration() {
        use crate::mailer::test_util::RecordingMailer;
        use crate::mailer::Mailer;
        use std::sync::Arc;

        let (state, _, _dir) = fake().await;
        let mailer = Arc::new(RecordingMailer::failing());
        let state = AppState::from_parts(
            state.store.clone(),
            state.config.clone(),
            mailer.clone() as Arc<dyn Mailer>,
        );

        register(&state, signup("ada", "ada@example.com"), T0).await.unwrap();
        let code = mailer.last_code_for("ada@example.com").unwrap();
        verify_signup(&state, verify_req("ada@example.com", &code), T0).await.unwrap();
    }

    #[tokio::test]
    async fn legacy_bcrypt_user_logs_in_and_is_upgraded() {
        let (state, _, _dir) = fake().await;
        let legacy = bcrypt::hash("old-secret", 4).unwrap().replacen("$2b$", "$2a$", 1);
        state
            .store
            .write(|doc| {
                doc.insert_user(User {
                    username: "grace".into(),
                    email: "grace@example.com".into(),
                    password_hash: legacy,
                    created_at: T0,
                    verified: true,
                    verification: OtpState::default(),
                    reset: OtpState::default(),
                });
                Ok::<_, StoreError>(())
            })
            .await
            .unwrap();

        let res = login(&state, login_req("grace", "old-secret")).await.unwrap();
        assert_eq!(res.username, "grace");

        let reopened = Store::open(state.store.path()).await;
        let hash = reopened
            .read(|d| d.find_by_username("grace").unwrap().password_hash.clone())
            .await;
        assert!(hash.starts_with("$argon2"));
        assert!(login(&state, login_req("grace@example.com", "old-secret")).await.is_ok());
    }

    #[test]
    fn errors_map_to_statuses() {
        use axum::http::StatusCode;
        let status = |e: AuthError| AppError::from(e).status();
        assert_eq!(status(AuthError::DuplicateEmail), StatusCode::BAD_REQUEST);
        assert_eq!(status(AuthError::InvalidCredentials), StatusCode::UNAUTHORIZED);
        assert_eq!(status(AuthError::Unverified), StatusCode::FORBIDDEN);
        assert_eq!(status(OtpError::TooManyAttempts.into()), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(status(OtpError::RateLimited.into()), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(status(OtpError::Expired.into()), StatusCode::BAD_REQUEST);
    }
}
