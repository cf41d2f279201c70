// src/adapters/mailer.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    error::AppResult,
    ports::{Invoice, Notifier},
};

/// Writes outgoing mail to the log instead of delivering it.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_magic_link(&self, email: &str, link: &str) -> AppResult<()> {
        tracing::info!(to = email, %link, "mail: login link");
        Ok(())
    }

    async fn send_login_notice(&self, email: &str, at: DateTime<Utc>) -> AppResult<()> {
        tracing::info!(to = email, at = %at.to_rfc3339(), "mail: new sign-in");
        Ok(())
    }

    async fn send_invoice(&self, invoice: &Invoice) -> AppResult<()> {
        tracing::info!(
            to = %invoice.email,
            name = %invoice.name,
            intent_id = invoice.intent_id,
            coins = invoice.coins,
            amount_minor = invoice.amount_minor,
            currency = invoice.currency.code(),
            "mail: invoice"
        );
        Ok(())
    }
}
