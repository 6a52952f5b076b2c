use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use mirror_contract::User;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{FromRow, SqlitePool};
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

const SCHEMA_SQL: &str = include_str!("sql/schema.sql");

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub sqlite_path: String,
}

/// Durable copy of the operator session. Holds at most one row.
#[derive(Debug, Clone)]
pub struct SessionStorage {
    pool: SqlitePool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSession {
    pub token: String,
    pub user: User,
    pub stored_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct SessionRow {
    token: String,
    user_json: String,
    stored_at: String,
}

impl SessionStorage {
    /// Opens the session database, creating it if needed, and applies the
    /// schema.
    pub async fn connect(config: &StorageConfig) -> Result<Self> {
        let options = connect_options(&config.sqlite_path)?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .with_context(|| format!("open session database {}", config.sqlite_path))?;

        let storage = Self { pool };
        storage.migrate().await?;
        Ok(storage)
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA_SQL)
            .execute(&self.pool)
            .await
            .context("apply session schema")?;
        debug!("session schema ready");
        Ok(())
    }

    pub async fn load(&self) -> Result<Option<StoredSession>> {
        let row = sqlx::query_as::<_, SessionRow>(
            "SELECT token, user_json, stored_at FROM session WHERE slot = 1",
        )
        .fetch_optional(&self.pool)
        .await
        .context("query stored session")?;

        let Some(row) = row else {
            return Ok(None);
        };
        let user: User =
            serde_json::from_str(&row.user_json).context("parse stored session user")?;
        let stored_at = DateTime::parse_from_rfc3339(&row.stored_at)
            .context("parse stored session timestamp")?
            .with_timezone(&Utc);

        Ok(Some(StoredSession {
            token: row.token,
            user,
            stored_at,
        }))
    }

    pub async fn token(&self) -> Result<Option<String>> {
        sqlx::query_scalar::<_, String>("SELECT token FROM session WHERE slot = 1")
            .fetch_optional(&self.pool)
            .await
            .context("query stored token")
    }

    pub async fn save(&self, token: &str, user: &User, stored_at: DateTime<Utc>) -> Result<()> {
        let user_json = serde_json::to_string(user).context("serialize session user")?;
        sqlx::query(
            "INSERT INTO session(slot, token, user_json, stored_at) VALUES (1, ?, ?, ?) ON CONFLICT(slot) DO UPDATE SET token = excluded.token, user_json = excluded.user_json, stored_at = excluded.stored_at",
        )
        .bind(token)
        .bind(user_json)
        .bind(stored_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .context("upsert session")?;

        debug!(user = %user.email, "session persisted");
        Ok(())
    }

    /// Returns whether a session row existed.
    pub async fn clear(&self) -> Result<bool> {
        let result = sqlx::query("DELETE FROM session WHERE slot = 1")
            .execute(&self.pool)
            .await
            .context("delete session")?;
        Ok(result.rows_affected() > 0)
    }
}

/// Accepts either a `sqlite:` URI or a plain file path.
fn connect_options(location: &str) -> Result<SqliteConnectOptions> {
    let options = if location.starts_with("sqlite:") {
        SqliteConnectOptions::from_str(location)
            .with_context(|| format!("invalid sqlite URI {location}"))?
    } else {
        SqliteConnectOptions::new().filename(location)
    };
    Ok(options
        .create_if_missing(true)
        .busy_timeout(Duration::from_secs(5)))
}
