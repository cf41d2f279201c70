// src/services/randomizer.rs

use rand::{Rng, rngs::OsRng, seq::index};

use crate::{
    error::{AppError, AppResult},
    models::exam::{CandidateQuestion, CandidateSection, CandidateView, TestDefinition},
};

/// Draws a candidate's question set from the bank using the OS generator.
pub fn draw(definition: &TestDefinition, candidate_id: i64) -> AppResult<CandidateView> {
    let view = draw_with(definition, &mut OsRng)?;
    tracing::debug!(
        candidate_id,
        sections = view.sections.len(),
        "drew questions for candidate"
    );
    Ok(view)
}

/// Picks `questions_to_display` distinct questions per section, uniformly.
///
/// A display count outside `1..=n` shows the whole section. An empty section
/// aborts the draw with `NoQuestionsAvailable`.
pub fn draw_with<R: Rng + ?Sized>(
    definition: &TestDefinition,
    rng: &mut R,
) -> AppResult<CandidateView> {
    let mut sections = Vec::with_capacity(definition.sections.len());

    for section in &definition.sections {
        let available = section.questions.len();
        if available == 0 {
            return Err(AppError::NoQuestionsAvailable(section.section_id));
        }

        let wanted = usize::try_from(section.questions_to_display)
            .ok()
            .filter(|k| (1..=available).contains(k))
            .unwrap_or(available);

        let questions = index::sample(&mut *rng, available, wanted)
            .into_iter()
            .map(|i| CandidateQuestion::from(&section.questions[i]))
            .collect();

        sections.push(CandidateSection {
            section_id: section.section_id,
            title: section.title.clone(),
            questions,
        });
    }

    Ok(CandidateView {
        title: definition.title.clone(),
        sections,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use rand::{SeedableRng, rngs::StdRng};

    use super::*;
    use crate::models::exam::{AuthoredQuestion, AuthoredSection, QuestionType};

    fn bank(sizes: &[(usize, i32)]) -> TestDefinition {
        TestDefinition {
            title: "Chemistry".to_string(),
            sections: sizes
                .iter()
                .enumerate()
                .map(|(i, &(n, display))| AuthoredSection {
                    section_id: i as i32 + 1,
                    title: format!("Part {}", i + 1),
                    questions_to_display: display,
                    questions: (1..=n as i32)
                        .map(|q| AuthoredQuestion {
                            question_number: q,
                            question_type: QuestionType::SingleChoice,
                            success_marks: 4,
                            failure_marks: 0,
                            question_text: format!("Q{q}"),
                            options: vec!["x".to_string(), "y".to_string()],
                            correct_option: Some(2),
                            correct_options: Vec::new(),
                            model_answer: None,
                        })
                        .collect(),
                })
                .collect(),
        }
    }

    #[test]
    fn draws_distinct_questions() {
        let mut rng = StdRng::seed_from_u64(7);
        let view = draw_with(&bank(&[(10, 3)]), &mut rng).unwrap();

        let numbers: HashSet<i32> = view.sections[0]
            .questions
            .iter()
            .map(|q| q.question_number)
            .collect();
        assert_eq!(numbers.len(), 3);
        assert!(numbers.iter().all(|n| (1..=10).contains(n)));
    }

    #[test]
    fn oversized_or_zero_display_counts_show_everything() {
        let mut rng = StdRng::seed_from_u64(1);
        let view = draw_with(&bank(&[(4, 9), (3, 0)]), &mut rng).unwrap();
        assert_eq!(view.sections[0].questions.len(), 4);
        assert_eq!(view.sections[1].questions.len(), 3);
    }

    #[test]
    fn empty_section_aborts_the_draw() {
        let mut rng = StdRng::seed_from_u64(1);
        let err = draw_with(&bank(&[(5, 2), (0, 1)]), &mut rng).unwrap_err();
        assert!(matches!(err, AppError::NoQuestionsAvailable(2)));
    }

    #[test]
    fn every_question_is_eventually_drawn() {
        let definition = bank(&[(6, 2)]);
        let mut rng = StdRng::seed_from_u64(42);
        let mut seen = HashSet::new();
        for _ in 0..200 {
            let view = draw_with(&definition, &mut rng).unwrap();
            seen.extend(view.sections[0].questions.iter().map(|q| q.question_number));
        }
        assert_eq!(seen.len(), 6);
    }

    #[test]
    fn drawn_questions_carry_no_answer_key() {
        let view = draw(&bank(&[(3, 2)]), 1).unwrap();
        let json = serde_json::to_string(&view).unwrap();
        assert!(!json.contains("correctOption"));
        assert!(!json.contains("modelAnswer"));
    }
}
