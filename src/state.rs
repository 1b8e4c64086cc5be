use std::{str::FromStr, sync::Arc};

use anyhow::Context;
use axum::extract::FromRef;
use sqlx::{
    pool::PoolConnection,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Sqlite, SqlitePool,
};

use crate::{auth::jwt::JwtKeys, config::AppConfig, error::AppError};

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub config: Arc<AppConfig>,
    pub keys: JwtKeys,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let options = SqliteConnectOptions::from_str(&config.database_url)
            .context("parse DATABASE_URL")?
            .create_if_missing(true);
        let db = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await
            .context("connect to database")?;

        Ok(Self::from_parts(db, config))
    }

    pub fn from_parts(db: SqlitePool, config: Arc<AppConfig>) -> Self {
        let keys = JwtKeys::from_config(&config.jwt);
        Self { db, config, keys }
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.db)
            .await
            .context("run migrations")?;
        Ok(())
    }

    /// Checks a connection out of the pool for the duration of one request.
    /// The connection goes back to the pool when the guard is dropped.
    pub async fn conn(&self) -> Result<PoolConnection<Sqlite>, AppError> {
        Ok(self.db.acquire().await?)
    }

    /// In-memory database with migrations applied. One connection only, since
    /// every SQLite `:memory:` connection is its own database.
    #[cfg(test)]
    pub async fn fake() -> Self {
        use crate::config::JwtConfig;

        let db = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .expect("in-memory pool ok");

        let config = Arc::new(AppConfig {
            app_name: "userhub-test".into(),
            database_url: "sqlite::memory:".into(),
            jwt: JwtConfig {
                secret: "test-secret".into(),
                issuer: "test-issuer".into(),
                audience: "test-aud".into(),
                ttl_minutes: 5,
            },
        });

        let state = Self::from_parts(db, config);
        state.migrate().await.expect("migrations ok");
        state
    }
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        state.keys.clone()
    }
}
