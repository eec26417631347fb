use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use shared::domain::PreferenceKey;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

/// Durable key/value store for the client's selected credential and season.
#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

#[derive(Debug, Clone)]
pub struct StoredPreference {
    pub key: PreferenceKey,
    pub value: String,
    pub updated_at: DateTime<Utc>,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await?;
        let storage = Self { pool };
        storage.ensure_preferences_table().await?;
        Ok(storage)
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    async fn ensure_preferences_table(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS client_preferences (
                key        TEXT PRIMARY KEY NOT NULL,
                value      TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("failed to ensure client_preferences table exists")?;
        Ok(())
    }

    /// Writes the whole value for `key`, replacing whatever was stored before.
    pub async fn save_preference(&self, key: PreferenceKey, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO client_preferences (key, value, updated_at)
             VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(key.as_str())
        .bind(value)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to save preference '{key}'"))?;
        Ok(())
    }

    pub async fn load_preference(&self, key: PreferenceKey) -> Result<Option<StoredPreference>> {
        let row = sqlx::query("SELECT value, updated_at FROM client_preferences WHERE key = ?")
            .bind(key.as_str())
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("failed to load preference '{key}'"))?;

        Ok(row.map(|r| StoredPreference {
            key,
            value: r.get::<String, _>(0),
            updated_at: r.get::<DateTime<Utc>, _>(1),
        }))
    }

    pub async fn clear_preference(&self, key: PreferenceKey) -> Result<bool> {
        let result = sqlx::query("DELETE FROM client_preferences WHERE key = ?")
            .bind(key.as_str())
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to clear preference '{key}'"))?;
        Ok(result.rows_affected() > 0)
    }
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url == "sqlite::memory:" || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
