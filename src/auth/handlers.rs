use axum::{
    extract::State,
    routing::{get, post},
    Router,
};
use time::OffsetDateTime;
use tracing::{error, instrument};

use crate::{
    auth::{
        dto::{
            EmailRequest, LoginRequest, LoginResponse, Profile, RegisterRequest,
            RegisterResponse, ResetRequest, VerifyOtpRequest,
        },
        extractors::SessionUser,
        services,
    },
    error::{AppError, AppResult, Json, MessageBody},
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/api/auth/register", post(register))
        .route("/api/auth/resend-verify", post(resend_verify))
        .route("/api/auth/verify-otp", post(verify_otp))
        .route("/api/auth/login", post(login))
        .route("/api/auth/forgot", post(forgot))
        .route("/api/auth/reset", post(reset))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/api/auth/me", get(get_me))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> AppResult<Json<RegisterResponse>> {
    let res = services::register(&state, payload, OffsetDateTime::now_utc()).await?;
    Ok(Json(res))
}

#[instrument(skip(state, payload))]
pub async fn resend_verify(
    State(state): State<AppState>,
    Json(payload): Json<EmailRequest>,
) -> AppResult<Json<MessageBody>> {
    let msg = services::resend_verification(&state, payload, OffsetDateTime::now_utc()).await?;
    Ok(Json(MessageBody::new(msg)))
}

#[instrument(skip(state, payload))]
pub async fn verify_otp(
    State(state): State<AppState>,
    Json(payload): Json<VerifyOtpRequest>,
) -> AppResult<Json<MessageBody>> {
    let msg = services::verify_signup(&state, payload, OffsetDateTime::now_utc()).await?;
    Ok(Json(MessageBody::new(msg)))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    Ok(Json(services::login(&state, payload).await?))
}

#[instrument(skip(state, payload))]
pub async fn forgot(
    State(state): State<AppState>,
    Json(payload): Json<EmailRequest>,
) -> AppResult<Json<MessageBody>> {
    let msg = services::forgot_password(&state, payload, OffsetDateTime::now_utc()).await?;
    Ok(Json(MessageBody::new(msg)))
}

#[instrument(skip(state, payload))]
pub async fn reset(
    State(state): State<AppState>,
    Json(payload): Json<ResetRequest>,
) -> AppResult<Json<MessageBody>> {
    let msg = services::reset_password(&state, payload, OffsetDateTime::now_utc()).await?;
    Ok(Json(MessageBody::new(msg)))
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    SessionUser(username): SessionUser,
) -> AppResult<Json<Profile>> {
    match services::profile(&state, &username).await {
        Some(profile) => Ok(Json(profile)),
        None => {
            error!(%username, "session user vanished from directory");
            Err(AppError::NotFound("User not found".into()))
        }
    }
}
