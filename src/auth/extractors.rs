use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use tracing::warn;

use crate::error::AppError;
use crate::state::AppState;

pub const USER_HEADER: &str = "x-user";

/// Username claimed by the `x-user` header, checked against the user directory.
#[derive(Debug, Clone)]
pub struct SessionUser(pub String);

#[async_trait]
impl FromRequestParts<AppState> for SessionUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let username = parts
            .headers
            .get(USER_HEADER)
            .and_then(|h| h.to_str().ok())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| AppError::Unauthorized("Missing x-user header".into()))?;

        let exists = state
            .store
            .read(|doc| doc.find_by_username(username).is_some())
            .await;
        if !exists {
            warn!(%username, "request for unknown user");
            return Err(AppError::Unauthorized("Invalid user".into()));
        }

        Ok(SessionUser(username.to_owned()))
    }
}
