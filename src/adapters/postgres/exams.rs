// src/adapters/postgres/exams.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, types::Json};

use super::{ATTEMPT_COLUMNS, AttemptRecord, PgStore, TEST_COLUMNS, TestRecord};
use crate::{
    error::{AppError, AppResult},
    models::{
        attempt::{AnswerSheet, Assignment, Attempt},
        exam::{Test, TestDefinition},
    },
    ports::{ExamStore, NewAttempt, NewTest},
};

const ASSIGNMENT_COLUMNS: &str =
    "id, test_id, candidate_id, attempts_allotted, attempts_remaining";

/// Locks an attempt owned by `candidate_id`. Someone else's attempt reads
/// as missing.
async fn lock_attempt(
    conn: &mut PgConnection,
    attempt_id: i64,
    candidate_id: i64,
) -> AppResult<Attempt> {
    let sql = format!(
        "SELECT {ATTEMPT_COLUMNS} FROM attempts WHERE id = $1 AND candidate_id = $2 FOR UPDATE"
    );
    sqlx::query_as::<_, AttemptRecord>(&sql)
        .bind(attempt_id)
        .bind(candidate_id)
        .fetch_optional(&mut *conn)
        .await?
        .map(Attempt::from)
        .ok_or_else(|| AppError::NotFound("Attempt not found".to_string()))
}

#[async_trait]
impl ExamStore for PgStore {
    async fn insert_test(&self, test: NewTest) -> AppResult<Test> {
        let sql = format!(
            "INSERT INTO tests (examiner_id, name, duration_minutes, starts_at, ends_at) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {TEST_COLUMNS}"
        );
        let record = sqlx::query_as::<_, TestRecord>(&sql)
            .bind(test.examiner_id)
            .bind(&test.name)
            .bind(test.duration_minutes)
            .bind(test.starts_at)
            .bind(test.ends_at)
            .fetch_one(&self.pool)
            .await?;
        Ok(record.into())
    }

    async fn test_by_id(&self, id: i64) -> AppResult<Option<Test>> {
        let sql = format!("SELECT {TEST_COLUMNS} FROM tests WHERE id = $1");
        let record = sqlx::query_as::<_, TestRecord>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(record.map(Test::from))
    }

    async fn tests_by_examiner(&self, examiner_id: i64) -> AppResult<Vec<Test>> {
        let sql = format!(
            "SELECT {TEST_COLUMNS} FROM tests WHERE examiner_id = $1 ORDER BY created_at DESC, id DESC"
        );
        let records = sqlx::query_as::<_, TestRecord>(&sql)
            .bind(examiner_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(records.into_iter().map(Test::from).collect())
    }

    async fn set_definition(&self, test_id: i64, definition: &TestDefinition) -> AppResult<()> {
        let result = sqlx::query("UPDATE tests SET definition = $2 WHERE id = $1")
            .bind(test_id)
            .bind(Json(definition))
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Test not found".to_string()));
        }
        Ok(())
    }

    async fn upsert_assignment(
        &self,
        test_id: i64,
        candidate_id: i64,
        attempts: i32,
    ) -> AppResult<Assignment> {
        sqlx::query(
            "INSERT INTO assignments (test_id, candidate_id, attempts_allotted, attempts_remaining) \
             VALUES ($1, $2, $3, $3) ON CONFLICT (test_id, candidate_id) DO NOTHING",
        )
        .bind(test_id)
        .bind(candidate_id)
        .bind(attempts)
        .execute(&self.pool)
        .await?;

        self.assignment(test_id, candidate_id).await?.ok_or_else(|| {
            AppError::Integrity(format!(
                "assignment for test {test_id} and candidate {candidate_id} vanished after insert"
            ))
        })
    }

    async fn assignment(&self, test_id: i64, candidate_id: i64) -> AppResult<Option<Assignment>> {
        let sql = format!(
            "SELECT {ASSIGNMENT_COLUMNS} FROM assignments WHERE test_id = $1 AND candidate_id = $2"
        );
        Ok(sqlx::query_as::<_, Assignment>(&sql)
            .bind(test_id)
            .bind(candidate_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn assignments_for_candidate(&self, candidate_id: i64) -> AppResult<Vec<Assignment>> {
        let sql = format!(
            "SELECT {ASSIGNMENT_COLUMNS} FROM assignments WHERE candidate_id = $1 ORDER BY id"
        );
        Ok(sqlx::query_as::<_, Assignment>(&sql)
            .bind(candidate_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn create_attempt(&self, attempt: NewAttempt) -> AppResult<Attempt> {
        let mut tx = self.pool.begin().await?;

        let remaining = sqlx::query_scalar::<_, i32>(
            "SELECT attempts_remaining FROM assignments \
             WHERE test_id = $1 AND candidate_id = $2 FOR UPDATE",
        )
        .bind(attempt.test_id)
        .bind(attempt.candidate_id)
        .fetch_optional(&mut *tx)
        .await?;

        if !remaining.is_some_and(|r| r > 0) {
            return Err(AppError::NotAssigned);
        }

        let sql = format!(
            "INSERT INTO attempts (test_id, candidate_id, questions, duration_minutes) \
             VALUES ($1, $2, $3, $4) RETURNING {ATTEMPT_COLUMNS}"
        );
        let record = sqlx::query_as::<_, AttemptRecord>(&sql)
            .bind(attempt.test_id)
            .bind(attempt.candidate_id)
            .bind(Json(&attempt.questions))
            .bind(attempt.duration_minutes)
            .fetch_one(&mut *tx)
            .await?;

        sqlx::query(
            "UPDATE assignments SET attempts_remaining = attempts_remaining - 1 \
             WHERE test_id = $1 AND candidate_id = $2",
        )
        .bind(attempt.test_id)
        .bind(attempt.candidate_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(record.into())
    }

    async fn attempt_by_id(&self, id: i64) -> AppResult<Option<Attempt>> {
        let sql = format!("SELECT {ATTEMPT_COLUMNS} FROM attempts WHERE id = $1");
        let record = sqlx::query_as::<_, AttemptRecord>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(record.map(Attempt::from))
    }

    async fn start_attempt(
        &self,
        attempt_id: i64,
        candidate_id: i64,
        now: DateTime<Utc>,
    ) -> AppResult<Attempt> {
        let mut tx = self.pool.begin().await?;
        let mut attempt = lock_attempt(&mut tx, attempt_id, candidate_id).await?;
        attempt.start(now)?;

        sqlx::query("UPDATE attempts SET started_at = $2 WHERE id = $1")
            .bind(attempt.id)
            .bind(attempt.started_at)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(attempt)
    }

    async fn save_answers(
        &self,
        attempt_id: i64,
        candidate_id: i64,
        answers: AnswerSheet,
        now: DateTime<Utc>,
    ) -> AppResult<Attempt> {
        let mut tx = self.pool.begin().await?;
        let mut attempt = lock_attempt(&mut tx, attempt_id, candidate_id).await?;
        attempt.accept_answers(answers, now)?;

        sqlx::query("UPDATE attempts SET answers = $2, achieved_marks = NULL WHERE id = $1")
            .bind(attempt.id)
            .bind(attempt.answers.as_ref().map(Json))
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(attempt)
    }
}
