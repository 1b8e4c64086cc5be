use sqlx::SqliteConnection;

use super::repo_types::{NewUser, User, UserChanges};
use crate::error::AppError;

const USER_COLUMNS: &str = "id, name, email, role, password_hash, is_active";

/// Maps a violated `UNIQUE(email)` constraint to a domain error.
fn unique_email(e: sqlx::Error) -> AppError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => AppError::DuplicateEmail,
        _ => AppError::Database(e),
    }
}

impl User {
    /// Insert a new active user. Email uniqueness is enforced by the table
    /// constraint, so concurrent inserts of one email cannot both succeed.
    pub async fn create(conn: &mut SqliteConnection, new: NewUser<'_>) -> Result<User, AppError> {
        let sql = format!(
            "INSERT INTO users (name, email, role, password_hash, is_active) \
             VALUES (?1, ?2, ?3, ?4, 1) \
             RETURNING {USER_COLUMNS}"
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(new.name)
            .bind(new.email)
            .bind(new.role)
            .bind(new.password_hash)
            .fetch_one(&mut *conn)
            .await
            .map_err(unique_email)
    }

    pub async fn get_by_id(conn: &mut SqliteConnection, id: i64) -> Result<User, AppError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1");
        sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or(AppError::NotFound)
    }

    pub async fn get_by_email(conn: &mut SqliteConnection, email: &str) -> Result<User, AppError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1");
        sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or(AppError::NotFound)
    }

    pub async fn list_all(conn: &mut SqliteConnection) -> Result<Vec<User>, AppError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users ORDER BY id");
        let rows = sqlx::query_as::<_, User>(&sql)
            .fetch_all(&mut *conn)
            .await?;
        Ok(rows)
    }

    /// Replace name, email and role.
    pub async fn update(
        conn: &mut SqliteConnection,
        id: i64,
        changes: UserChanges<'_>,
    ) -> Result<User, AppError> {
        let sql = format!(
            "UPDATE users SET name = ?1, email = ?2, role = ?3 \
             WHERE id = ?4 \
             RETURNING {USER_COLUMNS}"
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(changes.name)
            .bind(changes.email)
            .bind(changes.role)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await
            .map_err(unique_email)?
            .ok_or(AppError::NotFound)
    }

    pub async fn delete(conn: &mut SqliteConnection, id: i64) -> Result<(), AppError> {
        let done = sqlx::query("DELETE FROM users WHERE id = ?1")
            .bind(id)
            .execute(&mut *conn)
            .await?;
        if done.rows_affected() == 0 {
            return Err(AppError::NotFound);
        }
        Ok(())
    }
}
