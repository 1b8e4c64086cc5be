use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

use super::services::resolve_identity;
use crate::{
    error::{AppError, AuthError},
    state::AppState,
    users::repo_types::User,
};

/// The authenticated, active user behind the request's bearer token.
pub struct CurrentUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .ok_or(AuthError::NotAuthenticated)?;

        // Expect "Bearer <token>"
        let token = auth
            .strip_prefix("Bearer ")
            .or_else(|| auth.strip_prefix("bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::NotAuthenticated)?;

        let mut conn = state.conn().await?;
        let user = resolve_identity(&mut conn, &state.keys, token).await?;
        Ok(CurrentUser(user))
    }
}
