//! Error types for the attempt engine and its collaborators.

use std::fmt;

use thiserror::Error;

use crate::model::{OptionId, QuestionId};
use crate::state::AttemptStatus;

/// Why an answer failed the completeness check for its question.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnswerProblem {
    #[error("a {expected} question cannot take a {got} answer")]
    WrongShape {
        expected: &'static str,
        got: &'static str,
    },

    #[error("option '{0}' does not exist on this question")]
    UnknownOption(OptionId),

    #[error("answer is empty")]
    Empty,
}

/// Events the engine accepts, used to report illegal transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptEvent {
    Start,
    SetAnswer,
    ClearAnswer,
    Tick,
    RequestSubmit,
    ConfirmSubmit,
    CancelSubmit,
    Suspend,
}

impl fmt::Display for AttemptEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AttemptEvent::Start => "start",
            AttemptEvent::SetAnswer => "set_answer",
            AttemptEvent::ClearAnswer => "clear_answer",
            AttemptEvent::Tick => "tick",
            AttemptEvent::RequestSubmit => "request_submit",
            AttemptEvent::ConfirmSubmit => "confirm_submit",
            AttemptEvent::CancelSubmit => "cancel_submit",
            AttemptEvent::Suspend => "suspend",
        };
        f.write_str(name)
    }
}

/// Errors raised by the attempt engine. All of them leave the attempt
/// state exactly as it was before the call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AttemptError {
    /// The answer does not fit the question it was written to.
    #[error("invalid answer for question '{question}': {problem}")]
    InvalidAnswer {
        question: QuestionId,
        problem: AnswerProblem,
    },

    #[error("question '{0}' is not part of this quiz")]
    UnknownQuestion(QuestionId),

    /// The event is not defined for the current state.
    #[error("cannot {event} while attempt is {state}")]
    IllegalTransition {
        state: AttemptStatus,
        event: AttemptEvent,
    },

    #[error("attempt was already submitted")]
    AlreadySubmitted,

    #[error("snapshot belongs to quiz '{snapshot}', not '{quiz}'")]
    QuizMismatch { quiz: String, snapshot: String },
}

impl AttemptError {
    /// Illegal transitions are signals the caller may log or ignore; every
    /// other variant is a rejected request that should reach the user.
    pub fn is_illegal_transition(&self) -> bool {
        matches!(self, AttemptError::IllegalTransition { .. })
    }
}

/// Errors from loading quizzes, persisting attempts and configuration.
#[derive(Debug, Error)]
pub enum QuizError {
    #[error("invalid quiz: {0}")]
    Invalid(String),

    #[error("cannot parse quiz: {0}")]
    Parse(String),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{context}: {source}")]
    Yaml {
        context: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("quiz file has changed since last session. Use --clear to reset")]
    QuizChanged,

    #[error("no attempts left: {used} of {max} already used")]
    AttemptsExhausted { used: usize, max: u32 },

    #[error(transparent)]
    Attempt(#[from] AttemptError),
}

impl QuizError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        QuizError::Io {
            context: context.into(),
            source,
        }
    }

    pub fn yaml(context: impl Into<String>, source: serde_yaml::Error) -> Self {
        QuizError::Yaml {
            context: context.into(),
            source,
        }
    }
}
