use axum::{
    extract::State,
    http::StatusCode,
    routing::post,
    Form, Json, Router,
};
use tracing::instrument;

use super::{
    dto::{LoginForm, RegisterRequest, TokenResponse},
    jwt::JwtKeys,
    services,
};
use crate::{error::AppError, state::AppState, users::repo_types::UserPublic};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/token", post(login))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<UserPublic>), AppError> {
    let mut conn = state.conn().await?;
    let user = services::register(&mut conn, payload).await?;
    Ok((StatusCode::CREATED, Json(user.into())))
}

#[instrument(skip(state, keys, form))]
pub async fn login(
    State(state): State<AppState>,
    State(keys): State<JwtKeys>,
    Form(form): Form<LoginForm>,
) -> Result<Json<TokenResponse>, AppError> {
    let mut conn = state.conn().await?;
    let token = services::login(&mut conn, &keys, &form.username, &form.password).await?;
    Ok(Json(TokenResponse::bearer(token)))
}
