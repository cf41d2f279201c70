// src/models/attempt.rs

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    config::GRACE_PERIOD_MINUTES,
    error::{AppError, AppResult},
    models::exam::CandidateView,
};

/// Links a candidate to a test with an attempt quota.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct Assignment {
    pub id: i64,
    pub test_id: i64,
    pub candidate_id: i64,
    pub attempts_allotted: i32,
    /// Never increases; decremented only by a successful initialization.
    pub attempts_remaining: i32,
}

/// One candidate's sitting of a test.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attempt {
    pub id: i64,
    pub test_id: i64,
    pub candidate_id: i64,
    /// Frozen at creation, never regenerated.
    pub questions: CandidateView,
    /// `None` until the candidate starts the attempt.
    pub started_at: Option<DateTime<Utc>>,
    /// Copied from the test at creation time.
    pub duration_minutes: i32,
    pub answers: Option<AnswerSheet>,
    /// `None` means unscored.
    pub achieved_marks: Option<i32>,
    pub created_at: DateTime<Utc>,
}

impl Attempt {
    /// Last instant at which answers are accepted, once started.
    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        self.started_at.map(|start| {
            start
                + Duration::minutes(i64::from(self.duration_minutes))
                + Duration::minutes(GRACE_PERIOD_MINUTES)
        })
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.deadline().is_some_and(|deadline| now > deadline)
    }

    /// Pins the start time. Irrevocable.
    pub fn start(&mut self, now: DateTime<Utc>) -> AppResult<()> {
        if self.started_at.is_some() {
            return Err(AppError::AlreadyStarted);
        }
        self.started_at = Some(now);
        Ok(())
    }

    /// Replaces the stored answers in full and clears any previous score.
    /// On error the attempt is left untouched.
    pub fn accept_answers(&mut self, answers: AnswerSheet, now: DateTime<Utc>) -> AppResult<()> {
        if self.started_at.is_none() {
            return Err(AppError::NotStarted);
        }
        if self.is_expired(now) {
            return Err(AppError::WindowExpired);
        }
        if answers.sections.len() != self.questions.sections.len() {
            return Err(AppError::Validation(format!(
                "expected answers for {} sections, got {}",
                self.questions.sections.len(),
                answers.sections.len()
            )));
        }
        self.answers = Some(answers);
        self.achieved_marks = None;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Answer {
    pub question_number: i32,
    /// 1-based option chosen on a single-choice question.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_option: Option<i32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub selected_options: Vec<i32>,
    /// Free text for open-ended questions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
}

impl Answer {
    fn is_empty(&self) -> bool {
        self.selected_option.is_none()
            && self.selected_options.is_empty()
            && self.answer.as_deref().is_none_or(str::is_empty)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionAnswers {
    pub section_id: i32,
    pub answers: Vec<Answer>,
}

/// A full answer submission for one attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerSheet {
    pub sections: Vec<SectionAnswers>,
}

impl AnswerSheet {
    /// Shape checks that need no stored state.
    pub fn validate(&self) -> AppResult<()> {
        if self.sections.is_empty() {
            return Err(AppError::Validation(
                "Answer must contain at least one section".to_string(),
            ));
        }
        for (i, section) in self.sections.iter().enumerate() {
            if section.section_id != i as i32 + 1 {
                return Err(AppError::Validation(
                    "sectionId must be sequential starting from 1".to_string(),
                ));
            }
            for answer in &section.answers {
                if answer.question_number <= 0 {
                    return Err(AppError::Validation(
                        "Each answer must have a valid questionNumber (>0)".to_string(),
                    ));
                }
                if answer.is_empty() {
                    return Err(AppError::Validation(
                        "Each answer must have one of: selectedOption, selectedOptions, or answer"
                            .to_string(),
                    ));
                }
            }
        }
        Ok(())
    }
}

//=========================================================================================
// Portal DTOs
//=========================================================================================

/// DTO for the candidate portal login.
#[derive(Debug, Deserialize)]
pub struct PortalLoginRequest {
    pub email: String,
    pub birth_date: NaiveDate,
}

/// The email and session token every portal call carries.
#[derive(Debug, Deserialize)]
pub struct PortalCredentials {
    pub email: String,
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct InitAttemptRequest {
    #[serde(flatten)]
    pub session: PortalCredentials,
    pub test_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct StartAttemptRequest {
    #[serde(flatten)]
    pub session: PortalCredentials,
    pub attempt_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct SubmitAnswersRequest {
    #[serde(flatten)]
    pub session: PortalCredentials,
    pub attempt_id: i64,
    pub answers: AnswerSheet,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::exam::CandidateSection;

    fn attempt(sections: usize) -> Attempt {
        Attempt {
            id: 1,
            test_id: 1,
            candidate_id: 1,
            questions: CandidateView {
                title: "T".to_string(),
                sections: (1..=sections as i32)
                    .map(|id| CandidateSection {
                        section_id: id,
                        title: format!("S{id}"),
                        questions: Vec::new(),
                    })
                    .collect(),
            },
            started_at: None,
            duration_minutes: 30,
            answers: None,
            achieved_marks: Some(12),
            created_at: Utc::now(),
        }
    }

    fn sheet(sections: i32) -> AnswerSheet {
        AnswerSheet {
            sections: (1..=sections)
                .map(|id| SectionAnswers {
                    section_id: id,
                    answers: vec![Answer {
                        question_number: 1,
                        selected_option: Some(2),
                        selected_options: Vec::new(),
                        answer: None,
                    }],
                })
                .collect(),
        }
    }

    #[test]
    fn start_is_one_shot() {
        let mut a = attempt(1);
        let now = Utc::now();
        a.start(now).unwrap();
        assert!(matches!(a.start(now), Err(AppError::AlreadyStarted)));
        assert_eq!(a.started_at, Some(now));
    }

    #[test]
    fn deadline_includes_grace() {
        let mut a = attempt(1);
        let now = Utc::now();
        a.start(now).unwrap();
        assert_eq!(a.deadline(), Some(now + Duration::minutes(35)));
        assert!(!a.is_expired(now + Duration::minutes(35)));
        assert!(a.is_expired(now + Duration::minutes(35) + Duration::seconds(1)));
    }

    #[test]
    fn answers_require_a_started_attempt() {
        let mut a = attempt(1);
        assert!(matches!(
            a.accept_answers(sheet(1), Utc::now()),
            Err(AppError::NotStarted)
        ));
    }

    #[test]
    fn late_answers_leave_the_attempt_unchanged() {
        let mut a = attempt(1);
        let start = Utc::now();
        a.start(start).unwrap();
        a.accept_answers(sheet(1), start).unwrap();
        let before = a.clone();

        let late = start + Duration::minutes(40);
        assert!(matches!(
            a.accept_answers(sheet(1), late),
            Err(AppError::WindowExpired)
        ));
        assert_eq!(a, before);
    }

    #[test]
    fn resubmission_clears_the_score() {
        let mut a = attempt(2);
        let start = Utc::now();
        a.start(start).unwrap();
        a.accept_answers(sheet(2), start).unwrap();
        assert_eq!(a.achieved_marks, None);
        assert!(a.accept_answers(sheet(1), start).is_err());
    }

    #[test]
    fn sheet_sections_must_be_sequential() {
        let mut s = sheet(2);
        s.sections[1].section_id = 3;
        assert!(s.validate().is_err());
        assert!(sheet(2).validate().is_ok());
    }

    #[test]
    fn empty_answers_are_rejected() {
        let mut s = sheet(1);
        s.sections[0].answers[0].selected_option = None;
        s.sections[0].answers[0].answer = Some(String::new());
        assert!(s.validate().is_err());
    }
}
