//! Score computation.
//!
//! Scoring is a fold over the quiz questions in order, looking up each
//! answer in the frozen answer map. It has no access to the attempt state
//! beyond that map, so identical inputs always give identical results.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::model::{Answer, QuestionId, QuizDefinition};
use crate::validator::{self, Grade};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionOutcome {
    pub question: QuestionId,
    pub grade: Grade,
    pub earned_points: u64,
    pub points: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreResult {
    pub correct_count: usize,
    pub total_questions: usize,
    pub earned_points: u64,
    pub total_points: u64,
    pub percent: u32,
    pub passed: bool,
    /// Free-text questions without a reference answer that were answered
    /// and still wait for a person to grade them.
    #[serde(default)]
    pub pending_manual: Vec<QuestionId>,
    #[serde(default)]
    pub outcomes: Vec<QuestionOutcome>,
}

pub fn score(quiz: &QuizDefinition, answers: &BTreeMap<QuestionId, Answer>) -> ScoreResult {
    rescore_with_manual_grades(quiz, answers, &HashMap::new())
}

/// Scores an attempt, letting `grades` settle free-text questions that
/// cannot be machine checked. Grades for any other question are ignored.
pub fn rescore_with_manual_grades(
    quiz: &QuizDefinition,
    answers: &BTreeMap<QuestionId, Answer>,
    grades: &HashMap<QuestionId, bool>,
) -> ScoreResult {
    let mut outcomes = Vec::with_capacity(quiz.questions.len());
    let mut pending_manual = Vec::new();
    let mut correct_count = 0;
    let mut earned_points = 0u64;
    let mut total_points = 0u64;

    for question in &quiz.questions {
        let points = u64::from(question.points);
        let mut grade = validator::grade_optional(question, answers.get(&question.id));

        if grade == Grade::NeedsManualGrading {
            match grades.get(&question.id) {
                Some(true) => grade = Grade::Correct,
                Some(false) => grade = Grade::Incorrect,
                None => pending_manual.push(question.id.clone()),
            }
        }

        let earned = if grade == Grade::Correct {
            correct_count += 1;
            points
        } else {
            0
        };
        earned_points += earned;
        total_points += points;

        outcomes.push(QuestionOutcome {
            question: question.id.clone(),
            grade,
            earned_points: earned,
            points,
        });
    }

    let percent = percent_rounded(earned_points, total_points);
    if total_points == 0 {
        tracing::warn!(quiz = %quiz.id, "quiz has no points to score, reporting 0%");
    }

    ScoreResult {
        correct_count,
        total_questions: quiz.questions.len(),
        earned_points,
        total_points,
        percent,
        passed: total_points > 0 && percent >= quiz.passing_score_percent,
        pending_manual,
        outcomes,
    }
}

/// `round(earned / total * 100)` with halves rounded up, in integers.
/// A zero total yields 0.
pub fn percent_rounded(earned: u64, total: u64) -> u32 {
    if total == 0 {
        return 0;
    }
    let scaled = (earned * 200 + total) / (total * 2);
    scaled.min(100) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures::*;

    fn answers(pairs: &[(&str, Answer)]) -> BTreeMap<QuestionId, Answer> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn all_correct_scores_hundred() {
        let quiz = quiz(vec![single("q1", "0", 1), single("q2", "1", 1)]);
        let result = score(
            &quiz,
            &answers(&[("q1", Answer::choice("0")), ("q2", Answer::choice("1"))]),
        );
        assert_eq!(result.earned_points, 2);
        assert_eq!(result.total_points, 2);
        assert_eq!(result.percent, 100);
        assert!(result.passed);
        assert_eq!(result.correct_count, 2);
    }

    #[test]
    fn no_answers_earn_nothing() {
        let quiz = quiz(vec![single("q1", "0", 3), multi("q2", &["a"], 2)]);
        let result = score(&quiz, &BTreeMap::new());
        assert_eq!(result.earned_points, 0);
        assert_eq!(result.total_points, 5);
        assert_eq!(result.percent, 0);
        assert!(!result.passed);
    }

    #[test]
    fn superset_earns_nothing_on_multi_choice() {
        let quiz = quiz(vec![multi("q1", &["a", "c"], 10)]);
        let result = score(&quiz, &answers(&[("q1", Answer::choices(["a", "b", "c"]))]));
        assert_eq!(result.earned_points, 0);
        assert_eq!(result.total_points, 10);
        assert_eq!(result.outcomes[0].grade, Grade::Incorrect);
    }

    #[test]
    fn rounding_is_half_up() {
        assert_eq!(percent_rounded(1, 3), 33);
        assert_eq!(percent_rounded(2, 3), 67);
        assert_eq!(percent_rounded(1, 8), 13);
        assert_eq!(percent_rounded(1, 200), 1);
        assert_eq!(percent_rounded(0, 7), 0);
        assert_eq!(percent_rounded(7, 7), 100);
    }

    #[test]
    fn zero_total_points_is_zero_percent_and_failed() {
        let mut quiz = quiz(vec![single("q1", "0", 0)]);
        quiz.passing_score_percent = 0;
        let result = score(&quiz, &answers(&[("q1", Answer::choice("0"))]));
        assert_eq!(result.total_points, 0);
        assert_eq!(result.percent, 0);
        assert!(!result.passed);
    }

    #[test]
    fn ungraded_free_text_counts_against_denominator() {
        let quiz = quiz(vec![single("q1", "0", 1), free_text("q2", None)]);
        let answers = answers(&[("q1", Answer::choice("0")), ("q2", Answer::text("essay"))]);
        let result = score(&quiz, &answers);
        assert_eq!(result.earned_points, 1);
        assert_eq!(result.total_points, 2);
        assert_eq!(result.percent, 50);
        assert_eq!(result.pending_manual, vec!["q2".to_string()]);

        let mut grades = HashMap::new();
        grades.insert("q2".to_string(), true);
        let graded = rescore_with_manual_grades(&quiz, &answers, &grades);
        assert_eq!(graded.earned_points, 2);
        assert_eq!(graded.percent, 100);
        assert!(graded.pending_manual.is_empty());
    }

    #[test]
    fn manual_grades_do_not_override_machine_grades() {
        let quiz = quiz(vec![single("q1", "0", 1)]);
        let mut grades = HashMap::new();
        grades.insert("q1".to_string(), true);
        let result =
            rescore_with_manual_grades(&quiz, &answers(&[("q1", Answer::choice("1"))]), &grades);
        assert_eq!(result.earned_points, 0);
    }

    #[test]
    fn passing_threshold_is_inclusive() {
        let mut quiz = quiz(vec![single("q1", "0", 1), single("q2", "0", 1)]);
        quiz.passing_score_percent = 50;
        let result = score(&quiz, &answers(&[("q1", Answer::choice("0"))]));
        assert_eq!(result.percent, 50);
        assert!(result.passed);
    }
}
