use lazy_static::lazy_static;
use regex::Regex;
use sqlx::SqliteConnection;
use tracing::{debug, info, warn};

use super::{
    dto::RegisterRequest,
    jwt::JwtKeys,
    password::{hash_password, verify_password},
};
use crate::{
    error::{AppError, AuthError},
    users::repo_types::{NewUser, User},
};

lazy_static! {
    static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    // Verified against when the email is unknown so both login failures cost the same.
    static ref DUMMY_HASH: String = hash_password("userhub-dummy-password").unwrap_or_default();
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

/// Shared checks for the fields a client may set on a user.
pub(crate) fn validate_profile(name: &str, email: &str) -> Result<(), AppError> {
    if name.trim().is_empty() {
        return Err(AppError::Validation("name must not be empty".into()));
    }
    if !is_valid_email(email) {
        return Err(AppError::Validation("invalid email address".into()));
    }
    Ok(())
}

pub async fn register(conn: &mut SqliteConnection, req: RegisterRequest) -> Result<User, AppError> {
    let email = normalize_email(&req.email);
    validate_profile(&req.name, &email)?;
    if req.password.is_empty() {
        return Err(AppError::Validation("password must not be empty".into()));
    }

    match User::get_by_email(conn, &email).await {
        Ok(_) => {
            warn!(email = %email, "email already registered");
            return Err(AppError::DuplicateEmail);
        }
        Err(AppError::NotFound) => {}
        Err(e) => return Err(e),
    }

    let hash = hash_password(&req.password)?;
    let user = User::create(
        conn,
        NewUser {
            name: req.name.trim(),
            email: &email,
            role: &req.role,
            password_hash: &hash,
        },
    )
    .await?;

    info!(user_id = user.id, email = %user.email, "user registered");
    Ok(user)
}

/// Checks the credentials and issues an access token for the user's email.
pub async fn login(
    conn: &mut SqliteConnection,
    keys: &JwtKeys,
    username: &str,
    password: &str,
) -> Result<String, AppError> {
    let email = normalize_email(username);

    let user = match User::get_by_email(conn, &email).await {
        Ok(u) => u,
        Err(AppError::NotFound) => {
            let _ = verify_password(password, &DUMMY_HASH);
            warn!(email = %email, "login unknown email");
            return Err(AuthError::InvalidCredentials.into());
        }
        Err(e) => return Err(e),
    };

    if !verify_password(password, &user.password_hash) {
        warn!(user_id = user.id, "login invalid password");
        return Err(AuthError::InvalidCredentials.into());
    }

    if !user.is_active {
        warn!(user_id = user.id, "login for inactive user");
        return Err(AuthError::Inactive.into());
    }

    let token = keys.issue_access(&user.email)?;
    info!(user_id = user.id, "user logged in");
    Ok(token)
}

/// Resolves a bearer token to an active user. Token failures and unknown
/// subjects produce the same error.
pub async fn resolve_identity(
    conn: &mut SqliteConnection,
    keys: &JwtKeys,
    token: &str,
) -> Result<User, AppError> {
    let email = keys.verify(token).map_err(|e| {
        debug!(reason = %e, "token rejected");
        AuthError::InvalidToken
    })?;

    let user = match User::get_by_email(conn, &email).await {
        Ok(u) => u,
        Err(AppError::NotFound) => {
            debug!(email = %email, "token subject has no user");
            return Err(AuthError::InvalidToken.into());
        }
        Err(e) => return Err(e),
    };

    if !user.is_active {
        return Err(AuthError::Inactive.into());
    }
    Ok(user)
}
