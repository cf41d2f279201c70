// src/adapters/postgres/payments.rs

use async_trait::async_trait;

use super::{INTENT_COLUMNS, IntentRecord, PgStore, ledger::credit_account};
use crate::{
    error::{AppError, AppResult},
    models::{
        account::AccountRef,
        payment::{PaymentIntent, PaymentStatus, SettlementEvent, SettlementOutcome},
    },
    ports::{NewPaymentIntent, PaymentStore},
};

#[async_trait]
impl PaymentStore for PgStore {
    async fn insert_intent(&self, intent: NewPaymentIntent) -> AppResult<PaymentIntent> {
        let sql = format!(
            "INSERT INTO payment_intents (owner_id, amount_minor, currency, coins, status) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {INTENT_COLUMNS}"
        );
        let record = sqlx::query_as::<_, IntentRecord>(&sql)
            .bind(intent.owner_id)
            .bind(intent.amount_minor)
            .bind(intent.currency.code())
            .bind(intent.coins)
            .bind(PaymentStatus::Pending.as_str())
            .fetch_one(&self.pool)
            .await?;
        record.try_into()
    }

    async fn attach_order_ref(&self, intent_id: i64, order_ref: &str) -> AppResult<()> {
        let result = sqlx::query("UPDATE payment_intents SET order_ref = $2 WHERE id = $1")
            .bind(intent_id)
            .bind(order_ref)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Payment intent not found".to_string()));
        }
        Ok(())
    }

    async fn abandon_intent(&self, intent_id: i64) -> AppResult<()> {
        sqlx::query("UPDATE payment_intents SET status = $2 WHERE id = $1 AND status = $3")
            .bind(intent_id)
            .bind(PaymentStatus::Failed.as_str())
            .bind(PaymentStatus::Pending.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn settle(
        &self,
        order_ref: &str,
        event: &SettlementEvent,
    ) -> AppResult<(PaymentIntent, SettlementOutcome)> {
        let mut tx = self.pool.begin().await?;

        let sql = format!("SELECT {INTENT_COLUMNS} FROM payment_intents WHERE order_ref = $1 FOR UPDATE");
        let record = sqlx::query_as::<_, IntentRecord>(&sql)
            .bind(order_ref)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound("Payment intent not found".to_string()))?;

        let mut intent = PaymentIntent::try_from(record)?;
        let outcome = intent.apply(event)?;

        if !outcome.changed() {
            return Ok((intent, outcome));
        }

        sqlx::query("UPDATE payment_intents SET status = $2, payment_ref = $3 WHERE id = $1")
            .bind(intent.id)
            .bind(intent.status.as_str())
            .bind(intent.payment_ref.as_deref())
            .execute(&mut *tx)
            .await?;

        if outcome == SettlementOutcome::Credited {
            credit_account(&mut tx, AccountRef::User(intent.owner_id), intent.coins).await?;
        }

        tx.commit().await?;
        Ok((intent, outcome))
    }

    async fn intents_for_owner(&self, owner_id: i64) -> AppResult<Vec<PaymentIntent>> {
        let sql = format!(
            "SELECT {INTENT_COLUMNS} FROM payment_intents WHERE owner_id = $1 \
             ORDER BY created_at DESC, id DESC"
        );
        sqlx::query_as::<_, IntentRecord>(&sql)
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(PaymentIntent::try_from)
            .collect()
    }
}
