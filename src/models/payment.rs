// src/models/payment.rs

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "completed" => Ok(PaymentStatus::Completed),
            "failed" => Ok(PaymentStatus::Failed),
            other => Err(AppError::Integrity(format!("unknown payment status '{other}'"))),
        }
    }
}

/// Currencies the gateway settles in, each with a fixed coin exchange rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Currency {
    #[serde(rename = "INR")]
    Inr,
    #[serde(rename = "USD")]
    Usd,
}

impl Currency {
    pub fn code(&self) -> &'static str {
        match self {
            Currency::Inr => "INR",
            Currency::Usd => "USD",
        }
    }

    /// Coins bought by one major unit (one rupee, one dollar).
    pub fn coins_per_unit(&self) -> i64 {
        match self {
            Currency::Inr => 1,
            Currency::Usd => 75,
        }
    }

    /// Price of `coins` in minor units (paise, cents), rounded up.
    pub fn price_minor(&self, coins: i64) -> AppResult<i64> {
        if coins <= 0 {
            return Err(AppError::Validation("coins must be positive".to_string()));
        }
        let scaled = coins
            .checked_mul(100)
            .ok_or_else(|| AppError::Validation("coin amount too large".to_string()))?;
        let per_unit = self.coins_per_unit();
        let rounded = scaled
            .checked_add(per_unit - 1)
            .ok_or_else(|| AppError::Validation("coin amount too large".to_string()))?;
        Ok(rounded / per_unit)
    }
}

impl FromStr for Currency {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INR" => Ok(Currency::Inr),
            "USD" => Ok(Currency::Usd),
            other => Err(AppError::Validation(format!("unsupported currency '{other}'"))),
        }
    }
}

/// One purchase attempt, correlating the internal row with gateway references.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentIntent {
    pub id: i64,
    pub order_ref: Option<String>,
    pub payment_ref: Option<String>,
    pub owner_id: i64,
    /// Price in minor units of `currency`.
    pub amount_minor: i64,
    pub currency: Currency,
    pub coins: i64,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
}

/// A gateway confirmation, from either the client path or the webhook path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlementEvent {
    Paid { payment_ref: String },
    Failed { payment_ref: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementOutcome {
    /// `pending → completed`; the owner must be credited in the same transaction.
    Credited,
    /// `pending → failed`.
    MarkedFailed,
    /// A paid confirmation for an intent that is already completed.
    AlreadyCompleted,
    /// A failure notice for an intent that is already terminal.
    Ignored,
}

impl SettlementOutcome {
    /// Whether the intent row must be written back.
    pub fn changed(&self) -> bool {
        matches!(self, SettlementOutcome::Credited | SettlementOutcome::MarkedFailed)
    }
}

impl PaymentIntent {
    /// The settlement state machine. Callers hold the row lock while applying
    /// an event and persist the intent only when the outcome changed it.
    pub fn apply(&mut self, event: &SettlementEvent) -> AppResult<SettlementOutcome> {
        match (event, self.status) {
            (SettlementEvent::Paid { payment_ref }, PaymentStatus::Pending) => {
                self.status = PaymentStatus::Completed;
                self.payment_ref = Some(payment_ref.clone());
                Ok(SettlementOutcome::Credited)
            }
            (SettlementEvent::Paid { .. }, PaymentStatus::Completed) => {
                Ok(SettlementOutcome::AlreadyCompleted)
            }
            (SettlementEvent::Paid { .. }, status) => Err(AppError::InvalidState(status)),
            (SettlementEvent::Failed { payment_ref }, PaymentStatus::Pending) => {
                self.status = PaymentStatus::Failed;
                self.payment_ref = Some(payment_ref.clone());
                Ok(SettlementOutcome::MarkedFailed)
            }
            (SettlementEvent::Failed { .. }, _) => Ok(SettlementOutcome::Ignored),
        }
    }
}

/// DTO for a coin purchase request.
#[derive(Debug, Deserialize, Validate)]
pub struct PurchaseCoinsRequest {
    #[validate(range(min = 1, max = 10_000_000))]
    pub coins: i64,
    pub currency: Currency,
}

/// DTO for the client-side payment confirmation.
#[derive(Debug, Deserialize, Validate)]
pub struct VerifyPaymentRequest {
    #[validate(length(min = 1, max = 100))]
    pub order_ref: String,
    #[validate(length(min = 1, max = 100))]
    pub payment_ref: String,
    #[validate(length(min = 1, max = 256))]
    pub signature: String,
}
