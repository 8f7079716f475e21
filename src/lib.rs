//! Timed, resumable quiz attempts with deterministic scoring.
//!
//! `engine` drives a single attempt through its lifecycle, `validator` and
//! `scoring` are the pure checks it relies on, and the remaining modules are
//! the collaborators the `quizattempt` binary wires around it.

pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod parser;
pub mod persist;
pub mod runner;
pub mod scoring;
pub mod source;
pub mod state;
pub mod submit;
pub mod timer;
pub mod validator;

pub use engine::{
    AttemptEngine, AttemptObserver, Clock, NoopObserver, Submission, SystemClock, TickOutcome,
};
pub use error::{AnswerProblem, AttemptError, QuizError};
pub use model::{Answer, Question, QuestionKind, QuizDefinition, QuizOption};
pub use scoring::ScoreResult;
pub use state::{AttemptSnapshot, AttemptState, AttemptStatus, SubmissionReason};
