// src/adapters/postgres/ledger.rs

use async_trait::async_trait;
use sqlx::PgConnection;

use super::PgStore;
use crate::{
    error::{AppError, AppResult},
    models::account::{AccountRef, lock_order},
    ports::LedgerStore,
};

/// Reads a balance and holds its row lock until the transaction ends.
pub(super) async fn lock_balance(conn: &mut PgConnection, account: AccountRef) -> AppResult<i64> {
    let sql = match account {
        AccountRef::User(_) => "SELECT coins FROM users WHERE id = $1 FOR UPDATE",
        AccountRef::Test(_) => "SELECT coins FROM tests WHERE id = $1 FOR UPDATE",
    };
    sqlx::query_scalar::<_, i64>(sql)
        .bind(account.id())
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(AppError::AccountNotFound(account))
}

/// Adds `delta` (which may be negative) and returns the new balance.
pub(super) async fn adjust_balance(
    conn: &mut PgConnection,
    account: AccountRef,
    delta: i64,
) -> AppResult<i64> {
    let sql = match account {
        AccountRef::User(_) => "UPDATE users SET coins = coins + $2 WHERE id = $1 RETURNING coins",
        AccountRef::Test(_) => "UPDATE tests SET coins = coins + $2 WHERE id = $1 RETURNING coins",
    };
    sqlx::query_scalar::<_, i64>(sql)
        .bind(account.id())
        .bind(delta)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(AppError::AccountNotFound(account))
}

/// Locks the account row and adds `amount`, returning the new balance.
pub(super) async fn credit_account(
    conn: &mut PgConnection,
    account: AccountRef,
    amount: i64,
) -> AppResult<i64> {
    lock_balance(conn, account).await?;
    adjust_balance(conn, account, amount).await
}

#[async_trait]
impl LedgerStore for PgStore {
    async fn balance(&self, account: AccountRef) -> AppResult<i64> {
        let sql = match account {
            AccountRef::User(_) => "SELECT coins FROM users WHERE id = $1",
            AccountRef::Test(_) => "SELECT coins FROM tests WHERE id = $1",
        };
        sqlx::query_scalar::<_, i64>(sql)
            .bind(account.id())
            .fetch_optional(&self.pool)
            .await?
            .ok_or(AppError::AccountNotFound(account))
    }

    async fn credit(&self, account: AccountRef, amount: i64) -> AppResult<i64> {
        let mut tx = self.pool.begin().await?;
        let balance = credit_account(&mut tx, account, amount).await?;
        tx.commit().await?;
        Ok(balance)
    }

    async fn transfer(&self, from: AccountRef, to: AccountRef, amount: i64) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        let mut available = 0;
        for account in lock_order(from, to) {
            let balance = lock_balance(&mut tx, account).await?;
            if account == from {
                available = balance;
            }
        }

        if available < amount {
            return Err(AppError::InsufficientFunds {
                account: from,
                balance: available,
                requested: amount,
            });
        }

        adjust_balance(&mut tx, from, -amount).await?;
        adjust_balance(&mut tx, to, amount).await?;
        tx.commit().await?;
        Ok(())
    }
}
