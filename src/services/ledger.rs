// src/services/ledger.rs

use std::sync::Arc;

use crate::{
    error::{AppError, AppResult},
    models::account::AccountRef,
    ports::LedgerStore,
};

/// Sole owner of coin balances.
#[derive(Clone)]
pub struct Ledger {
    store: Arc<dyn LedgerStore>,
}

impl Ledger {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    pub async fn balance(&self, account: AccountRef) -> AppResult<i64> {
        self.store.balance(account).await
    }

    pub async fn credit(&self, account: AccountRef, amount: i64) -> AppResult<i64> {
        require_positive(amount)?;
        let balance = self.store.credit(account, amount).await?;
        tracing::info!(%account, amount, balance, "credited coins");
        Ok(balance)
    }

    pub async fn transfer(&self, from: AccountRef, to: AccountRef, amount: i64) -> AppResult<()> {
        require_positive(amount)?;
        if from == to {
            return Err(AppError::Validation(
                "cannot transfer coins to the same account".to_string(),
            ));
        }
        self.store.transfer(from, to, amount).await.inspect_err(|e| {
            tracing::warn!(%from, %to, amount, "transfer rejected: {}", e);
        })?;
        tracing::info!(%from, %to, amount, "transferred coins");
        Ok(())
    }
}

fn require_positive(amount: i64) -> AppResult<()> {
    if amount <= 0 {
        return Err(AppError::Validation("amount must be positive".to_string()));
    }
    Ok(())
}
