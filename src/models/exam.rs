// src/models/exam.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    utils::html::clean_html,
};

/// Represents the 'tests' table: one examination owned by an examiner.
#[derive(Debug, Clone, Serialize)]
pub struct Test {
    pub id: i64,
    pub examiner_id: i64,
    pub name: String,
    /// Coins funded into this test. Only the ledger writes this field.
    pub coins: i64,
    /// Authored question bank. `None` until the examiner uploads one.
    pub definition: Option<TestDefinition>,
    pub duration_minutes: i32,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuestionType {
    /// Single choice.
    #[serde(rename = "mcq")]
    SingleChoice,
    /// Multiple choice.
    #[serde(rename = "msq")]
    MultiChoice,
    #[serde(rename = "open-ended")]
    OpenEnded,
}

impl QuestionType {
    pub fn has_options(&self) -> bool {
        matches!(self, QuestionType::SingleChoice | QuestionType::MultiChoice)
    }
}

/// Examiner view of a question, answer key included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthoredQuestion {
    pub question_number: i32,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    pub success_marks: i32,
    pub failure_marks: i32,
    pub question_text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    /// 1-based index into `options` for single-choice questions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correct_option: Option<i32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub correct_options: Vec<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_answer: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthoredSection {
    pub section_id: i32,
    pub title: String,
    /// How many questions each candidate sees from this section.
    pub questions_to_display: i32,
    pub questions: Vec<AuthoredQuestion>,
}

/// The examiner-authored question bank of a test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestDefinition {
    pub title: String,
    pub sections: Vec<AuthoredSection>,
}

impl TestDefinition {
    /// Structural checks on an uploaded bank.
    pub fn validate(&self) -> AppResult<()> {
        let invalid = |msg: String| Err(AppError::Validation(msg));

        if self.title.trim().is_empty() {
            return invalid("test title is required".to_string());
        }
        if self.sections.is_empty() {
            return invalid("at least one section is required".to_string());
        }

        for (i, section) in self.sections.iter().enumerate() {
            let s = i + 1;
            if section.section_id <= 0 {
                return invalid(format!("section {s}: sectionId is required"));
            }
            if section.title.trim().is_empty() {
                return invalid(format!("section {s}: title is required"));
            }
            if section.questions_to_display <= 0 {
                return invalid(format!("section {s}: questionsToDisplay is required"));
            }
            if section.questions.is_empty() {
                return invalid(format!("section {s}: at least one question is required"));
            }

            for (j, q) in section.questions.iter().enumerate() {
                let n = j + 1;
                if q.question_number <= 0 {
                    return invalid(format!("section {s}, question {n}: questionNumber is required"));
                }
                if q.question_text.trim().is_empty() {
                    return invalid(format!("section {s}, question {n}: questionText is required"));
                }
                if q.success_marks <= 0 {
                    return invalid(format!("section {s}, question {n}: successMarks must be positive"));
                }
                if q.failure_marks > 0 {
                    return invalid(format!(
                        "section {s}, question {n}: failureMarks should be zero or negative"
                    ));
                }

                let option_count = q.options.len() as i32;
                let in_range = |o: &i32| (1..=option_count).contains(o);
                match q.question_type {
                    QuestionType::SingleChoice => {
                        if option_count < 2 || !q.correct_option.as_ref().is_some_and(in_range) {
                            return invalid(format!(
                                "section {s}, question {n}: mcq type requires at least 2 options and a correct option"
                            ));
                        }
                    }
                    QuestionType::MultiChoice => {
                        if option_count < 2
                            || q.correct_options.is_empty()
                            || !q.correct_options.iter().all(in_range)
                        {
                            return invalid(format!(
                                "section {s}, question {n}: msq type requires at least 2 options and at least one correct option"
                            ));
                        }
                    }
                    QuestionType::OpenEnded => {
                        if q.model_answer.as_deref().is_none_or(|a| a.trim().is_empty()) {
                            return invalid(format!(
                                "section {s}, question {n}: open-ended type requires a model answer"
                            ));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Strips unsafe markup from every piece of authored text.
    pub fn sanitized(mut self) -> Self {
        self.title = clean_html(&self.title);
        for section in &mut self.sections {
            section.title = clean_html(&section.title);
            for q in &mut section.questions {
                q.question_text = clean_html(&q.question_text);
                for option in &mut q.options {
                    *option = clean_html(option);
                }
                if let Some(answer) = q.model_answer.take() {
                    q.model_answer = Some(clean_html(&answer));
                }
            }
        }
        self
    }
}

/// Candidate-safe projection of a question. Carries no answer key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateQuestion {
    pub question_number: i32,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    pub success_marks: i32,
    pub failure_marks: i32,
    pub question_text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

impl From<&AuthoredQuestion> for CandidateQuestion {
    fn from(q: &AuthoredQuestion) -> Self {
        Self {
            question_number: q.question_number,
            question_type: q.question_type,
            success_marks: q.success_marks,
            failure_marks: q.failure_marks,
            question_text: q.question_text.clone(),
            options: if q.question_type.has_options() {
                q.options.clone()
            } else {
                Vec::new()
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateSection {
    pub section_id: i32,
    pub title: String,
    pub questions: Vec<CandidateQuestion>,
}

/// The frozen question set handed to one candidate for one attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateView {
    pub title: String,
    pub sections: Vec<CandidateSection>,
}

/// DTO for creating a new test.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateTestRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(range(min = 1, max = 600))]
    pub duration_minutes: i32,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
}

/// DTO for assigning candidates to a test.
#[derive(Debug, Deserialize, Validate)]
pub struct AssignCandidatesRequest {
    #[validate(range(min = 1, max = 100))]
    pub attempts: i32,
    #[validate(length(min = 1, max = 500), custom(function = validate_emails))]
    pub candidate_emails: Vec<String>,
}

/// DTO for moving coins from the examiner into a test.
#[derive(Debug, Deserialize, Validate)]
pub struct FundTestRequest {
    #[validate(range(min = 1))]
    pub coins: i64,
}

fn validate_emails(emails: &[String]) -> Result<(), validator::ValidationError> {
    if emails.iter().all(|e| validator::ValidateEmail::validate_email(e)) {
        Ok(())
    } else {
        Err(validator::ValidationError::new("invalid_candidate_email"))
    }
}
