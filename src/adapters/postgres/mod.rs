// src/adapters/postgres/mod.rs

//! sqlx-backed implementation of the store ports.
//!
//! Every mutating method opens its own transaction. Rows that a decision is
//! based on are read with `SELECT ... FOR UPDATE` so concurrent callers
//! serialize on them.

mod exams;
mod kv;
mod ledger;
mod payments;
mod users;

use chrono::{DateTime, Utc};
use sqlx::{PgPool, migrate::MigrateError, types::Json};

use crate::{
    error::{AppError, AppResult},
    models::{
        attempt::{AnswerSheet, Attempt},
        exam::{CandidateView, Test, TestDefinition},
        payment::PaymentIntent,
    },
};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Applies the schema under `migrations/`.
pub async fn run_migrations(pool: &PgPool) -> Result<(), MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

//=========================================================================================
// Row records
//=========================================================================================

const TEST_COLUMNS: &str =
    "id, examiner_id, name, coins, definition, duration_minutes, starts_at, ends_at, created_at";

#[derive(sqlx::FromRow)]
struct TestRecord {
    id: i64,
    examiner_id: i64,
    name: String,
    coins: i64,
    definition: Option<Json<TestDefinition>>,
    duration_minutes: i32,
    starts_at: DateTime<Utc>,
    ends_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl From<TestRecord> for Test {
    fn from(r: TestRecord) -> Self {
        Self {
            id: r.id,
            examiner_id: r.examiner_id,
            name: r.name,
            coins: r.coins,
            definition: r.definition.map(|Json(d)| d),
            duration_minutes: r.duration_minutes,
            starts_at: r.starts_at,
            ends_at: r.ends_at,
            created_at: r.created_at,
        }
    }
}

const ATTEMPT_COLUMNS: &str = "id, test_id, candidate_id, questions, started_at, duration_minutes, \
     answers, achieved_marks, created_at";

#[derive(sqlx::FromRow)]
struct AttemptRecord {
    id: i64,
    test_id: i64,
    candidate_id: i64,
    questions: Json<CandidateView>,
    started_at: Option<DateTime<Utc>>,
    duration_minutes: i32,
    answers: Option<Json<AnswerSheet>>,
    achieved_marks: Option<i32>,
    created_at: DateTime<Utc>,
}

impl From<AttemptRecord> for Attempt {
    fn from(r: AttemptRecord) -> Self {
        Self {
            id: r.id,
            test_id: r.test_id,
            candidate_id: r.candidate_id,
            questions: r.questions.0,
            started_at: r.started_at,
            duration_minutes: r.duration_minutes,
            answers: r.answers.map(|Json(a)| a),
            achieved_marks: r.achieved_marks,
            created_at: r.created_at,
        }
    }
}

const INTENT_COLUMNS: &str =
    "id, order_ref, payment_ref, owner_id, amount_minor, currency, coins, status, created_at";

#[derive(sqlx::FromRow)]
struct IntentRecord {
    id: i64,
    order_ref: Option<String>,
    payment_ref: Option<String>,
    owner_id: i64,
    amount_minor: i64,
    currency: String,
    coins: i64,
    status: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<IntentRecord> for PaymentIntent {
    type Error = AppError;

    fn try_from(r: IntentRecord) -> AppResult<Self> {
        let currency = r
            .currency
            .parse()
            .map_err(|_| AppError::Integrity(format!("intent {} has currency '{}'", r.id, r.currency)))?;
        Ok(Self {
            id: r.id,
            order_ref: r.order_ref,
            payment_ref: r.payment_ref,
            owner_id: r.owner_id,
            amount_minor: r.amount_minor,
            currency,
            coins: r.coins,
            status: r.status.parse()?,
            created_at: r.created_at,
        })
    }
}

const USER_COLUMNS: &str = "id, email, name, birth_date, coins, is_active, created_at";
