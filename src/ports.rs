//! src/ports.rs
//!
//! Service contracts for everything the core talks to: the relational store,
//! the TTL key-value store, the payment gateway, the mailer and the clock.
//! Services receive these as trait objects at construction.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::{
    error::AppResult,
    models::{
        account::AccountRef,
        attempt::{AnswerSheet, Assignment, Attempt},
        exam::{CandidateView, Test, TestDefinition},
        payment::{Currency, PaymentIntent, SettlementEvent, SettlementOutcome},
        user::User,
    },
};

//=========================================================================================
// Relational store
//=========================================================================================

/// Coin balances. Every method runs in its own locked transaction.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn balance(&self, account: AccountRef) -> AppResult<i64>;

    /// Adds `amount` and returns the new balance.
    async fn credit(&self, account: AccountRef, amount: i64) -> AppResult<i64>;

    /// Moves `amount` between two accounts, locking both in `lock_order`.
    async fn transfer(&self, from: AccountRef, to: AccountRef, amount: i64) -> AppResult<()>;
}

#[derive(Debug, Clone)]
pub struct NewPaymentIntent {
    pub owner_id: i64,
    pub amount_minor: i64,
    pub currency: Currency,
    pub coins: i64,
}

#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Persists a new `pending` intent.
    async fn insert_intent(&self, intent: NewPaymentIntent) -> AppResult<PaymentIntent>;

    async fn attach_order_ref(&self, intent_id: i64, order_ref: &str) -> AppResult<()>;

    /// Moves an intent that never reached the gateway from `pending` to `failed`.
    async fn abandon_intent(&self, intent_id: i64) -> AppResult<()>;

    /// Locks the intent matched by `order_ref` and applies `event` to it.
    /// A `Credited` outcome credits the owner inside the same transaction.
    async fn settle(
        &self,
        order_ref: &str,
        event: &SettlementEvent,
    ) -> AppResult<(PaymentIntent, SettlementOutcome)>;

    async fn intents_for_owner(&self, owner_id: i64) -> AppResult<Vec<PaymentIntent>>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Returns the user with this email, creating it on first sight.
    async fn find_or_create_user(&self, email: &str) -> AppResult<User>;

    async fn user_by_id(&self, id: i64) -> AppResult<Option<User>>;

    async fn user_by_email(&self, email: &str) -> AppResult<Option<User>>;

    async fn update_profile(
        &self,
        id: i64,
        name: Option<&str>,
        birth_date: Option<NaiveDate>,
    ) -> AppResult<User>;
}

#[derive(Debug, Clone)]
pub struct NewTest {
    pub examiner_id: i64,
    pub name: String,
    pub duration_minutes: i32,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAttempt {
    pub test_id: i64,
    pub candidate_id: i64,
    pub questions: CandidateView,
    pub duration_minutes: i32,
}

#[async_trait]
pub trait ExamStore: Send + Sync {
    async fn insert_test(&self, test: NewTest) -> AppResult<Test>;

    async fn test_by_id(&self, id: i64) -> AppResult<Option<Test>>;

    async fn tests_by_examiner(&self, examiner_id: i64) -> AppResult<Vec<Test>>;

    async fn set_definition(&self, test_id: i64, definition: &TestDefinition) -> AppResult<()>;

    /// Creates the assignment if absent; an existing one is returned unchanged.
    async fn upsert_assignment(
        &self,
        test_id: i64,
        candidate_id: i64,
        attempts: i32,
    ) -> AppResult<Assignment>;

    async fn assignment(&self, test_id: i64, candidate_id: i64) -> AppResult<Option<Assignment>>;

    async fn assignments_for_candidate(&self, candidate_id: i64) -> AppResult<Vec<Assignment>>;

    /// Locks the assignment, requires a remaining attempt, inserts the attempt
    /// and consumes the quota, all in one transaction.
    async fn create_attempt(&self, attempt: NewAttempt) -> AppResult<Attempt>;

    async fn attempt_by_id(&self, id: i64) -> AppResult<Option<Attempt>>;

    /// Locks the attempt and applies `Attempt::start`.
    async fn start_attempt(
        &self,
        attempt_id: i64,
        candidate_id: i64,
        now: DateTime<Utc>,
    ) -> AppResult<Attempt>;

    /// Locks the attempt and applies `Attempt::accept_answers`.
    async fn save_answers(
        &self,
        attempt_id: i64,
        candidate_id: i64,
        answers: AnswerSheet,
        now: DateTime<Utc>,
    ) -> AppResult<Attempt>;
}

//=========================================================================================
// TTL key-value store
//=========================================================================================

/// Expired keys behave exactly like keys that were never written.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Writes `value`, replacing any previous value and expiry.
    async fn put(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()>;

    /// Writes only when the key is absent. Returns whether it wrote.
    /// Also drops every expired key.
    async fn put_if_absent(&self, key: &str, value: &str, ttl: Duration) -> AppResult<bool>;

    async fn get(&self, key: &str) -> AppResult<Option<String>>;

    /// Resets the expiry to `ttl` from now if the key currently holds `value`.
    async fn touch_if_eq(&self, key: &str, value: &str, ttl: Duration) -> AppResult<bool>;

    /// Deletes the key if it currently holds `value`. Returns whether it did.
    async fn take_if_eq(&self, key: &str, value: &str) -> AppResult<bool>;
}

//=========================================================================================
// Payment gateway, notifications, time
//=========================================================================================

#[derive(Debug, Clone)]
pub struct OrderRequest {
    pub amount_minor: i64,
    pub currency: Currency,
    /// Caller-chosen idempotency key, unique per payment intent.
    pub receipt: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Creates a gateway order and returns its reference.
    async fn create_order(&self, order: &OrderRequest) -> AppResult<String>;
}

#[derive(Debug, Clone)]
pub struct Invoice {
    pub email: String,
    pub name: String,
    pub intent_id: i64,
    pub coins: i64,
    pub currency: Currency,
    pub amount_minor: i64,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_magic_link(&self, email: &str, link: &str) -> AppResult<()>;

    async fn send_login_notice(&self, email: &str, at: DateTime<Utc>) -> AppResult<()>;

    async fn send_invoice(&self, invoice: &Invoice) -> AppResult<()>;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
