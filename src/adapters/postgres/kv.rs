// src/adapters/postgres/kv.rs

use std::time::Duration;

use async_trait::async_trait;

use super::PgStore;
use crate::{error::AppResult, ports::KeyValueStore};

// Reads treat expired rows as absent. `put_if_absent` also deletes them.

#[async_trait]
impl KeyValueStore for PgStore {
    async fn put(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO kv_entries (key, value, expires_at) \
             VALUES ($1, $2, now() + make_interval(secs => $3)) \
             ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, expires_at = EXCLUDED.expires_at",
        )
        .bind(key)
        .bind(value)
        .bind(ttl.as_secs_f64())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn put_if_absent(&self, key: &str, value: &str, ttl: Duration) -> AppResult<bool> {
        sqlx::query("DELETE FROM kv_entries WHERE expires_at <= now()")
            .execute(&self.pool)
            .await?;

        let result = sqlx::query(
            "INSERT INTO kv_entries (key, value, expires_at) \
             VALUES ($1, $2, now() + make_interval(secs => $3)) \
             ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, expires_at = EXCLUDED.expires_at \
             WHERE kv_entries.expires_at <= now()",
        )
        .bind(key)
        .bind(value)
        .bind(ttl.as_secs_f64())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        Ok(sqlx::query_scalar::<_, String>(
            "SELECT value FROM kv_entries WHERE key = $1 AND expires_at > now()",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn touch_if_eq(&self, key: &str, value: &str, ttl: Duration) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE kv_entries SET expires_at = now() + make_interval(secs => $3) \
             WHERE key = $1 AND value = $2 AND expires_at > now()",
        )
        .bind(key)
        .bind(value)
        .bind(ttl.as_secs_f64())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn take_if_eq(&self, key: &str, value: &str) -> AppResult<bool> {
        let result = sqlx::query(
            "DELETE FROM kv_entries WHERE key = $1 AND value = $2 AND expires_at > now()",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}
