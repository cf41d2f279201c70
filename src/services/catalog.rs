// src/services/catalog.rs

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    error::{AppError, AppResult},
    models::{
        account::AccountRef,
        attempt::Assignment,
        exam::{CreateTestRequest, Test, TestDefinition},
        user::normalize_email,
    },
    ports::{ExamStore, NewTest, UserStore},
    services::ledger::Ledger,
};

/// A candidate's view of one assignment, without the question bank.
#[derive(Debug, Clone, Serialize)]
pub struct AssignedTest {
    pub test_id: i64,
    pub test_name: String,
    pub duration_minutes: i32,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub attempts_remaining: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct CandidateAssignment {
    pub email: String,
    pub candidate_id: i64,
    pub attempts_remaining: i32,
}

/// Examiner-side management of tests and their candidates.
#[derive(Clone)]
pub struct Catalog {
    exams: Arc<dyn ExamStore>,
    users: Arc<dyn UserStore>,
    ledger: Ledger,
}

impl Catalog {
    pub fn new(exams: Arc<dyn ExamStore>, users: Arc<dyn UserStore>, ledger: Ledger) -> Self {
        Self {
            exams,
            users,
            ledger,
        }
    }

    pub async fn create_test(&self, examiner_id: i64, req: CreateTestRequest) -> AppResult<Test> {
        if req.ends_at <= req.starts_at {
            return Err(AppError::Validation(
                "ends_at must be after starts_at".to_string(),
            ));
        }

        let test = self
            .exams
            .insert_test(NewTest {
                examiner_id,
                name: req.name.trim().to_string(),
                duration_minutes: req.duration_minutes,
                starts_at: req.starts_at,
                ends_at: req.ends_at,
            })
            .await?;

        tracing::info!(test_id = test.id, examiner_id, "test created");
        Ok(test)
    }

    pub async fn list_tests(&self, examiner_id: i64) -> AppResult<Vec<Test>> {
        self.exams.tests_by_examiner(examiner_id).await
    }

    /// Fetches a test owned by `examiner_id`.
    pub async fn get_test(&self, examiner_id: i64, test_id: i64) -> AppResult<Test> {
        let test = self
            .exams
            .test_by_id(test_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Test not found".to_string()))?;
        if test.examiner_id != examiner_id {
            return Err(AppError::Forbidden(
                "You do not own this test".to_string(),
            ));
        }
        Ok(test)
    }

    /// Replaces the question bank after validating and sanitizing it.
    pub async fn set_definition(
        &self,
        examiner_id: i64,
        test_id: i64,
        definition: TestDefinition,
    ) -> AppResult<Test> {
        let mut test = self.get_test(examiner_id, test_id).await?;
        definition.validate()?;
        let definition = definition.sanitized();

        self.exams.set_definition(test_id, &definition).await?;
        tracing::info!(test_id, sections = definition.sections.len(), "question bank stored");

        test.definition = Some(definition);
        Ok(test)
    }

    /// Moves coins from the examiner into the test. Returns the test balance.
    pub async fn fund_test(&self, examiner_id: i64, test_id: i64, coins: i64) -> AppResult<i64> {
        self.get_test(examiner_id, test_id).await?;
        self.ledger
            .transfer(AccountRef::User(examiner_id), AccountRef::Test(test_id), coins)
            .await?;
        self.ledger.balance(AccountRef::Test(test_id)).await
    }

    /// Creates candidates on first sight and gives each an attempt quota.
    /// Candidates already assigned keep their current quota.
    pub async fn assign_candidates(
        &self,
        examiner_id: i64,
        test_id: i64,
        emails: &[String],
        attempts: i32,
    ) -> AppResult<Vec<CandidateAssignment>> {
        if attempts <= 0 {
            return Err(AppError::Validation("attempts must be positive".to_string()));
        }
        self.get_test(examiner_id, test_id).await?;

        let mut assigned = Vec::with_capacity(emails.len());
        for email in emails {
            let candidate = self.users.find_or_create_user(&normalize_email(email)).await?;
            let assignment = self
                .exams
                .upsert_assignment(test_id, candidate.id, attempts)
                .await?;
            assigned.push(CandidateAssignment {
                email: candidate.email,
                candidate_id: candidate.id,
                attempts_remaining: assignment.attempts_remaining,
            });
        }

        tracing::info!(test_id, count = assigned.len(), "candidates assigned");
        Ok(assigned)
    }

    /// Everything a candidate is assigned to, for the portal landing page.
    pub async fn candidate_overview(&self, candidate_id: i64) -> AppResult<Vec<AssignedTest>> {
        let assignments = self.exams.assignments_for_candidate(candidate_id).await?;

        let mut overview = Vec::with_capacity(assignments.len());
        for Assignment {
            test_id,
            attempts_remaining,
            ..
        } in assignments
        {
            let Some(test) = self.exams.test_by_id(test_id).await? else {
                continue;
            };
            overview.push(AssignedTest {
                test_id,
                test_name: test.name,
                duration_minutes: test.duration_minutes,
                starts_at: test.starts_at,
                ends_at: test.ends_at,
                attempts_remaining,
            });
        }
        Ok(overview)
    }
}
