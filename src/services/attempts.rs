// src/services/attempts.rs

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    error::{AppError, AppResult},
    models::{
        attempt::{AnswerSheet, Attempt},
        exam::CandidateView,
    },
    ports::{Clock, ExamStore, NewAttempt},
    services::randomizer,
};

/// What a candidate receives once the clock starts.
#[derive(Debug, Clone, Serialize)]
pub struct StartedAttempt {
    pub attempt_id: i64,
    pub questions: CandidateView,
    pub duration_minutes: i32,
    /// Includes the grace period.
    pub deadline: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InitializedAttempt {
    pub attempt_id: i64,
    pub test_id: i64,
    pub duration_minutes: i32,
}

/// Attempt lifecycle: initialize, start, submit.
#[derive(Clone)]
pub struct AttemptService {
    exams: Arc<dyn ExamStore>,
    clock: Arc<dyn Clock>,
}

impl AttemptService {
    pub fn new(exams: Arc<dyn ExamStore>, clock: Arc<dyn Clock>) -> Self {
        Self { exams, clock }
    }

    /// Consumes one attempt from the candidate's quota and freezes a fresh
    /// question draw into the new attempt.
    pub async fn initialize(&self, candidate_id: i64, test_id: i64) -> AppResult<InitializedAttempt> {
        // Cheap rejection before drawing; the store re-checks under lock.
        let assignment = self
            .exams
            .assignment(test_id, candidate_id)
            .await?
            .ok_or(AppError::NotAssigned)?;
        if assignment.attempts_remaining <= 0 {
            return Err(AppError::NotAssigned);
        }

        let test = self
            .exams
            .test_by_id(test_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Test not found".to_string()))?;
        let definition = test
            .definition
            .as_ref()
            .ok_or_else(|| AppError::NotFound("test has no question bank".to_string()))?;

        let questions = randomizer::draw(definition, candidate_id)?;

        let attempt = self
            .exams
            .create_attempt(NewAttempt {
                test_id,
                candidate_id,
                questions,
                duration_minutes: test.duration_minutes,
            })
            .await?;

        tracing::info!(attempt_id = attempt.id, test_id, candidate_id, "attempt initialized");
        Ok(InitializedAttempt {
            attempt_id: attempt.id,
            test_id,
            duration_minutes: attempt.duration_minutes,
        })
    }

    /// Pins `started_at` and reveals the frozen questions.
    pub async fn start(&self, attempt_id: i64, candidate_id: i64) -> AppResult<StartedAttempt> {
        let now = self.clock.now();
        let attempt = self.exams.start_attempt(attempt_id, candidate_id, now).await?;
        let deadline = attempt
            .deadline()
            .ok_or_else(|| AppError::Internal("started attempt has no deadline".to_string()))?;

        tracing::info!(attempt_id, candidate_id, %deadline, "attempt started");
        Ok(StartedAttempt {
            attempt_id: attempt.id,
            questions: attempt.questions,
            duration_minutes: attempt.duration_minutes,
            deadline,
        })
    }

    /// Replaces the stored answers while the window is open.
    pub async fn submit_answers(
        &self,
        attempt_id: i64,
        candidate_id: i64,
        answers: AnswerSheet,
    ) -> AppResult<Attempt> {
        answers.validate()?;
        let now = self.clock.now();
        let attempt = self
            .exams
            .save_answers(attempt_id, candidate_id, answers, now)
            .await
            .inspect_err(|e| {
                if matches!(e, AppError::WindowExpired) {
                    tracing::info!(attempt_id, candidate_id, "late submission rejected");
                }
            })?;

        tracing::info!(attempt_id, candidate_id, "answers saved");
        Ok(attempt)
    }
}
