use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{Answer, QuestionId, QuizDefinition};
use crate::scoring::ScoreResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    NotStarted,
    InProgress,
    Completed,
    Submitted,
}

impl fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AttemptStatus::NotStarted => "not started",
            AttemptStatus::InProgress => "in progress",
            AttemptStatus::Completed => "completed",
            AttemptStatus::Submitted => "submitted",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionReason {
    Manual,
    Timeout,
}

impl fmt::Display for SubmissionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmissionReason::Manual => f.write_str("manual"),
            SubmissionReason::Timeout => f.write_str("timeout"),
        }
    }
}

/// The mutable aggregate of one attempt. Only `AttemptEngine` writes to it;
/// everyone else gets a shared reference or a snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptState {
    pub attempt_id: Uuid,
    pub status: AttemptStatus,
    pub answers: BTreeMap<QuestionId, Answer>,
    pub remaining_seconds: Option<u64>,
    pub started_at: Option<DateTime<Utc>>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub submission_reason: Option<SubmissionReason>,
    pub score: Option<ScoreResult>,
}

impl AttemptState {
    pub fn new() -> Self {
        Self {
            attempt_id: Uuid::new_v4(),
            status: AttemptStatus::NotStarted,
            answers: BTreeMap::new(),
            remaining_seconds: None,
            started_at: None,
            submitted_at: None,
            submission_reason: None,
            score: None,
        }
    }

    pub fn is_answered(&self, question: &str) -> bool {
        self.answers.contains_key(question)
    }

    pub fn progress(&self, quiz: &QuizDefinition) -> Progress {
        let answered = quiz
            .questions
            .iter()
            .filter(|q| self.answers.contains_key(&q.id))
            .count();
        Progress {
            answered,
            total: quiz.questions.len(),
        }
    }
}

impl Default for AttemptState {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub answered: usize,
    pub total: usize,
}

impl Progress {
    pub fn unanswered(&self) -> usize {
        self.total - self.answered
    }
}

/// The persistable subset of an attempt, exchanged with the persistence
/// collaborator on save and on resume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptSnapshot {
    pub attempt_id: Uuid,
    pub quiz_id: String,
    pub status: AttemptStatus,
    #[serde(default)]
    pub answers: BTreeMap<QuestionId, Answer>,
    #[serde(default)]
    pub remaining_seconds: Option<u64>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub submission_reason: Option<SubmissionReason>,
}

impl AttemptSnapshot {
    pub fn capture(quiz: &QuizDefinition, state: &AttemptState) -> Self {
        Self {
            attempt_id: state.attempt_id,
            quiz_id: quiz.id.clone(),
            status: state.status,
            answers: state.answers.clone(),
            remaining_seconds: state.remaining_seconds,
            started_at: state.started_at,
            submission_reason: state.submission_reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures::*;

    #[test]
    fn new_state_is_not_started() {
        let state = AttemptState::new();
        assert_eq!(state.status, AttemptStatus::NotStarted);
        assert!(state.answers.is_empty());
        assert!(state.started_at.is_none());
    }

    #[test]
    fn progress_counts_only_quiz_questions() {
        let quiz = quiz(vec![single("q1", "0", 1), single("q2", "0", 1)]);
        let mut state = AttemptState::new();
        state.answers.insert("q1".to_string(), Answer::choice("0"));
        let p = state.progress(&quiz);
        assert_eq!(p.answered, 1);
        assert_eq!(p.total, 2);
        assert_eq!(p.unanswered(), 1);
    }

    #[test]
    fn snapshot_survives_yaml() {
        let quiz = quiz(vec![single("q1", "0", 1)]);
        let mut state = AttemptState::new();
        state.status = AttemptStatus::InProgress;
        state.remaining_seconds = Some(42);
        state.answers.insert("q1".to_string(), Answer::choice("2"));

        let snap = AttemptSnapshot::capture(&quiz, &state);
        let yaml = serde_yaml::to_string(&snap).unwrap();
        assert!(yaml.contains("status: in_progress"));
        let back: AttemptSnapshot = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back, snap);
    }
}
