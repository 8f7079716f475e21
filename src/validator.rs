//! Per-kind completeness and correctness checks.
//!
//! Everything here is a pure function of a question and an answer.

use serde::{Deserialize, Serialize};

use crate::error::AnswerProblem;
use crate::model::{Answer, Question, QuestionKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Grade {
    Correct,
    Incorrect,
    /// Free text with no reference answer; a person has to decide.
    NeedsManualGrading,
}

fn answer_shape(answer: &Answer) -> &'static str {
    match answer {
        Answer::Choice { .. } => "choice",
        Answer::Choices { .. } => "choices",
        Answer::Text { .. } => "text",
    }
}

fn wrong_shape(question: &Question, answer: &Answer) -> AnswerProblem {
    AnswerProblem::WrongShape {
        expected: question.kind.label(),
        got: answer_shape(answer),
    }
}

pub fn check_complete(question: &Question, answer: &Answer) -> Result<(), AnswerProblem> {
    match (&question.kind, answer) {
        (QuestionKind::SingleChoice { .. }, Answer::Choice { selected })
        | (QuestionKind::TrueFalse { .. }, Answer::Choice { selected }) => {
            if question.option(selected).is_none() {
                return Err(AnswerProblem::UnknownOption(selected.clone()));
            }
            Ok(())
        }
        (QuestionKind::MultiChoice { .. }, Answer::Choices { selected }) => {
            if selected.is_empty() {
                return Err(AnswerProblem::Empty);
            }
            if let Some(unknown) = selected.iter().find(|id| question.option(id).is_none()) {
                return Err(AnswerProblem::UnknownOption(unknown.clone()));
            }
            Ok(())
        }
        (QuestionKind::FreeText { .. }, Answer::Text { text }) => {
            if text.trim().is_empty() {
                return Err(AnswerProblem::Empty);
            }
            Ok(())
        }
        _ => Err(wrong_shape(question, answer)),
    }
}

pub fn grade(question: &Question, answer: &Answer) -> Result<Grade, AnswerProblem> {
    check_complete(question, answer)?;

    let grade = match (&question.kind, answer) {
        (QuestionKind::SingleChoice { .. }, Answer::Choice { selected })
        | (QuestionKind::TrueFalse { .. }, Answer::Choice { selected }) => {
            let correct = question.option(selected).map(|o| o.correct).unwrap_or(false);
            bool_grade(correct)
        }
        (QuestionKind::MultiChoice { .. }, Answer::Choices { selected }) => {
            // Exact set match, no partial credit.
            let chosen: std::collections::BTreeSet<&str> =
                selected.iter().map(String::as_str).collect();
            bool_grade(chosen == question.correct_option_ids())
        }
        (QuestionKind::FreeText { reference }, Answer::Text { text }) => match reference {
            Some(reference) => bool_grade(normalize(text) == normalize(reference)),
            None => Grade::NeedsManualGrading,
        },
        _ => return Err(wrong_shape(question, answer)),
    };
    Ok(grade)
}

/// Grades a possibly missing answer. Never fails: absent or malformed
/// answers count as incorrect.
pub fn grade_optional(question: &Question, answer: Option<&Answer>) -> Grade {
    match answer {
        Some(answer) => grade(question, answer).unwrap_or(Grade::Incorrect),
        None => Grade::Incorrect,
    }
}

fn bool_grade(correct: bool) -> Grade {
    if correct {
        Grade::Correct
    } else {
        Grade::Incorrect
    }
}

fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures::*;

    #[test]
    fn single_choice_complete_and_correct() {
        let q = single("q1", "1", 1);
        assert_eq!(check_complete(&q, &Answer::choice("1")), Ok(()));
        assert_eq!(grade(&q, &Answer::choice("1")), Ok(Grade::Correct));
        assert_eq!(grade(&q, &Answer::choice("0")), Ok(Grade::Incorrect));
    }

    #[test]
    fn unknown_option_is_rejected() {
        let q = single("q1", "1", 1);
        assert_eq!(
            check_complete(&q, &Answer::choice("9")),
            Err(AnswerProblem::UnknownOption("9".to_string()))
        );

        let m = multi("q2", &["a"], 1);
        assert_eq!(
            check_complete(&m, &Answer::choices(["a", "z"])),
            Err(AnswerProblem::UnknownOption("z".to_string()))
        );
    }

    #[test]
    fn wrong_shape_is_rejected() {
        let q = single("q1", "1", 1);
        let err = check_complete(&q, &Answer::text("1")).unwrap_err();
        assert!(matches!(err, AnswerProblem::WrongShape { expected: "single_choice", .. }));

        let m = multi("q2", &["a"], 1);
        assert!(check_complete(&m, &Answer::choice("a")).is_err());
    }

    #[test]
    fn multi_choice_requires_exact_set() {
        let q = multi("q1", &["a", "c"], 10);
        assert_eq!(grade(&q, &Answer::choices(["c", "a"])), Ok(Grade::Correct));
        assert_eq!(grade(&q, &Answer::choices(["a", "b", "c"])), Ok(Grade::Incorrect));
        assert_eq!(grade(&q, &Answer::choices(["a"])), Ok(Grade::Incorrect));
    }

    #[test]
    fn empty_multi_selection_is_incomplete() {
        let q = multi("q1", &["a"], 1);
        let empty: [&str; 0] = [];
        assert_eq!(check_complete(&q, &Answer::choices(empty)), Err(AnswerProblem::Empty));
    }

    #[test]
    fn free_text_normalizes_before_comparing() {
        let q = free_text("q1", Some("Ownership"));
        assert_eq!(grade(&q, &Answer::text("  ownership \n")), Ok(Grade::Correct));
        assert_eq!(grade(&q, &Answer::text("borrowing")), Ok(Grade::Incorrect));
        assert_eq!(check_complete(&q, &Answer::text("   ")), Err(AnswerProblem::Empty));
    }

    #[test]
    fn free_text_without_reference_needs_manual_grading() {
        let q = free_text("q1", None);
        assert_eq!(grade(&q, &Answer::text("anything")), Ok(Grade::NeedsManualGrading));
        assert_eq!(grade_optional(&q, None), Grade::Incorrect);
    }

    #[test]
    fn absent_or_malformed_answers_grade_incorrect() {
        let q = single("q1", "0", 1);
        assert_eq!(grade_optional(&q, None), Grade::Incorrect);
        assert_eq!(grade_optional(&q, Some(&Answer::choice("nope"))), Grade::Incorrect);
    }
}
