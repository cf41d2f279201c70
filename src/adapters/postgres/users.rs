// src/adapters/postgres/users.rs

use async_trait::async_trait;
use chrono::NaiveDate;

use super::{PgStore, USER_COLUMNS};
use crate::{
    config::SIGNUP_COINS,
    error::{AppError, AppResult},
    models::user::User,
    ports::UserStore,
};

#[async_trait]
impl UserStore for PgStore {
    async fn find_or_create_user(&self, email: &str) -> AppResult<User> {
        sqlx::query(
            "INSERT INTO users (email, name, coins) VALUES ($1, $1, $2) \
             ON CONFLICT (email) DO NOTHING",
        )
        .bind(email)
        .bind(SIGNUP_COINS)
        .execute(&self.pool)
        .await?;

        self.user_by_email(email)
            .await?
            .ok_or_else(|| AppError::Integrity(format!("user {email} vanished after insert")))
    }

    async fn user_by_id(&self, id: i64) -> AppResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn user_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn update_profile(
        &self,
        id: i64,
        name: Option<&str>,
        birth_date: Option<NaiveDate>,
    ) -> AppResult<User> {
        let sql = format!(
            "UPDATE users SET name = COALESCE($2, name), birth_date = COALESCE($3, birth_date) \
             WHERE id = $1 RETURNING {USER_COLUMNS}"
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(name)
            .bind(birth_date)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))
    }
}
