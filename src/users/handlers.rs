use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use tracing::{info, instrument};

use super::{
    dto::UpdateUserRequest,
    repo_types::{User, UserChanges, UserPublic},
};
use crate::{
    auth::{
        extractors::CurrentUser,
        services::{normalize_email, validate_profile},
    },
    error::AppError,
    state::AppState,
};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users/me", get(read_me))
        .route("/users", get(list_users))
        .route("/users/", get(list_users))
        .route(
            "/users/:id",
            get(get_user).put(update_user).delete(delete_user),
        )
}

#[instrument(skip_all, fields(user_id = me.id))]
pub async fn read_me(CurrentUser(me): CurrentUser) -> Json<UserPublic> {
    Json(me.into())
}

#[instrument(skip_all)]
pub async fn list_users(
    State(state): State<AppState>,
    CurrentUser(_): CurrentUser,
) -> Result<Json<Vec<UserPublic>>, AppError> {
    let mut conn = state.conn().await?;
    let users = User::list_all(&mut conn).await?;
    Ok(Json(users.into_iter().map(UserPublic::from).collect()))
}

#[instrument(skip(state, _me))]
pub async fn get_user(
    State(state): State<AppState>,
    CurrentUser(_me): CurrentUser,
    Path(id): Path<i64>,
) -> Result<Json<UserPublic>, AppError> {
    let mut conn = state.conn().await?;
    let user = User::get_by_id(&mut conn, id).await?;
    Ok(Json(user.into()))
}

#[instrument(skip(state, me, payload), fields(caller = me.id))]
pub async fn update_user(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateUserRequest>,
) -> Result<Json<UserPublic>, AppError> {
    let email = normalize_email(&payload.email);
    validate_profile(&payload.name, &email)?;

    let mut conn = state.conn().await?;
    let user = User::update(
        &mut conn,
        id,
        UserChanges {
            name: payload.name.trim(),
            email: &email,
            role: &payload.role,
        },
    )
    .await?;

    info!(user_id = user.id, "user updated");
    Ok(Json(user.into()))
}

#[instrument(skip(state, me), fields(caller = me.id))]
pub async fn delete_user(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    if id == me.id {
        return Err(AppError::SelfDelete);
    }

    let mut conn = state.conn().await?;
    User::delete(&mut conn, id).await?;

    info!(user_id = id, "user deleted");
    Ok(StatusCode::NO_CONTENT)
}
