//! The attempt engine: owns one `AttemptState` and moves it through
//! NotStarted -> InProgress -> Completed -> Submitted.
//!
//! The engine never looks at a wall clock to measure time. The countdown is
//! driven purely by `tick()` calls (or an explicit `apply_elapsed`
//! correction); the injected `Clock` is only used to stamp `started_at` and
//! `submitted_at`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AttemptError, AttemptEvent};
use crate::model::{Answer, QuestionId, QuizDefinition};
use crate::scoring::{self, ScoreResult};
use crate::state::{AttemptSnapshot, AttemptState, AttemptStatus, Progress, SubmissionReason};
use crate::validator;

pub const DEFAULT_LOW_TIME_WARNING_SECONDS: u64 = 120;

pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Receives the engine's outputs. Implementations decide what to do with
/// them (save to disk, render, ignore); a failure inside an observer never
/// rolls back the engine.
pub trait AttemptObserver {
    fn on_started(&mut self, _snapshot: &AttemptSnapshot) {}

    fn on_answer_saved(&mut self, _question: &str, _answer: &Answer, _snapshot: &AttemptSnapshot) {
    }

    fn on_answer_cleared(&mut self, _question: &str, _snapshot: &AttemptSnapshot) {}

    /// Called after ticks and cancelled submits so collaborators can keep
    /// `remaining_seconds` current.
    fn on_snapshot(&mut self, _snapshot: &AttemptSnapshot) {}

    /// The attempt is waiting for the submit to be confirmed or cancelled.
    fn on_submit_requested(&mut self, _snapshot: &AttemptSnapshot) {}

    /// The driver is going away while the attempt is still open.
    fn on_suspended(&mut self, _snapshot: &AttemptSnapshot) {}

    fn on_submitted(&mut self, _submission: &Submission) {}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl AttemptObserver for NoopObserver {}

impl<T: AttemptObserver + ?Sized> AttemptObserver for &mut T {
    fn on_started(&mut self, snapshot: &AttemptSnapshot) {
        (**self).on_started(snapshot)
    }

    fn on_answer_saved(&mut self, question: &str, answer: &Answer, snapshot: &AttemptSnapshot) {
        (**self).on_answer_saved(question, answer, snapshot)
    }

    fn on_answer_cleared(&mut self, question: &str, snapshot: &AttemptSnapshot) {
        (**self).on_answer_cleared(question, snapshot)
    }

    fn on_snapshot(&mut self, snapshot: &AttemptSnapshot) {
        (**self).on_snapshot(snapshot)
    }

    fn on_submit_requested(&mut self, snapshot: &AttemptSnapshot) {
        (**self).on_submit_requested(snapshot)
    }

    fn on_suspended(&mut self, snapshot: &AttemptSnapshot) {
        (**self).on_suspended(snapshot)
    }

    fn on_submitted(&mut self, submission: &Submission) {
        (**self).on_submitted(submission)
    }
}

/// Everything a collaborator needs once an attempt is final.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub attempt_id: Uuid,
    pub quiz_id: String,
    pub reason: SubmissionReason,
    pub started_at: Option<DateTime<Utc>>,
    pub submitted_at: DateTime<Utc>,
    pub answers: BTreeMap<QuestionId, Answer>,
    pub score: ScoreResult,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Running { remaining: Option<u64> },
    /// Remaining time just dropped to the warning threshold.
    LowTime { remaining: u64 },
    TimedOut(ScoreResult),
}

pub struct AttemptEngine<O: AttemptObserver = NoopObserver, C: Clock = SystemClock> {
    quiz: QuizDefinition,
    state: AttemptState,
    observer: O,
    clock: C,
    low_time_warning_seconds: u64,
    warned_low_time: bool,
}

impl AttemptEngine {
    pub fn with_defaults(quiz: QuizDefinition) -> Self {
        Self::new(quiz, NoopObserver, SystemClock)
    }
}

impl<O: AttemptObserver, C: Clock> AttemptEngine<O, C> {
    pub fn new(quiz: QuizDefinition, observer: O, clock: C) -> Self {
        Self {
            quiz,
            state: AttemptState::new(),
            observer,
            clock,
            low_time_warning_seconds: DEFAULT_LOW_TIME_WARNING_SECONDS,
            warned_low_time: false,
        }
    }

    /// Rebuilds an engine from a persisted snapshot. Stored answers are
    /// re-validated and `remaining_seconds` is taken as is: no time passes
    /// unless the caller applies `apply_elapsed` afterwards.
    pub fn resume(
        quiz: QuizDefinition,
        snapshot: AttemptSnapshot,
        observer: O,
        clock: C,
    ) -> Result<Self, AttemptError> {
        if snapshot.quiz_id != quiz.id {
            return Err(AttemptError::QuizMismatch {
                quiz: quiz.id.clone(),
                snapshot: snapshot.quiz_id,
            });
        }
        if snapshot.status == AttemptStatus::Submitted {
            return Err(AttemptError::AlreadySubmitted);
        }

        for (id, answer) in &snapshot.answers {
            let question = quiz
                .question(id)
                .ok_or_else(|| AttemptError::UnknownQuestion(id.clone()))?;
            validator::check_complete(question, answer).map_err(|problem| {
                AttemptError::InvalidAnswer {
                    question: id.clone(),
                    problem,
                }
            })?;
        }

        let remaining_seconds = match quiz.time_limit_seconds {
            Some(limit) => Some(snapshot.remaining_seconds.unwrap_or(limit).min(limit)),
            None => None,
        };

        let submission_reason = match snapshot.status {
            AttemptStatus::Completed => {
                Some(snapshot.submission_reason.unwrap_or(SubmissionReason::Manual))
            }
            _ => None,
        };

        let state = AttemptState {
            attempt_id: snapshot.attempt_id,
            status: snapshot.status,
            answers: snapshot.answers,
            remaining_seconds,
            started_at: snapshot.started_at,
            submitted_at: None,
            submission_reason,
            score: None,
        };

        let mut engine = Self::new(quiz, observer, clock);
        engine.state = state;
        engine.warned_low_time = remaining_seconds
            .map(|r| r <= engine.low_time_warning_seconds)
            .unwrap_or(false);

        tracing::debug!(
            attempt = %engine.state.attempt_id,
            status = %engine.state.status,
            remaining = ?engine.state.remaining_seconds,
            "resumed attempt"
        );

        match (engine.state.status, engine.state.submission_reason) {
            (AttemptStatus::Completed, Some(SubmissionReason::Timeout)) => {
                engine.finalize()?;
            }
            (AttemptStatus::InProgress, _) if engine.state.remaining_seconds == Some(0) => {
                engine.time_out()?;
            }
            _ => {}
        }

        Ok(engine)
    }

    pub fn with_low_time_warning(mut self, seconds: u64) -> Self {
        self.low_time_warning_seconds = seconds;
        self.warned_low_time = self
            .state
            .remaining_seconds
            .map(|r| r <= seconds)
            .unwrap_or(false);
        self
    }

    pub fn quiz(&self) -> &QuizDefinition {
        &self.quiz
    }

    pub fn state(&self) -> &AttemptState {
        &self.state
    }

    pub fn status(&self) -> AttemptStatus {
        self.state.status
    }

    pub fn score(&self) -> Option<&ScoreResult> {
        self.state.score.as_ref()
    }

    pub fn progress(&self) -> Progress {
        self.state.progress(&self.quiz)
    }

    pub fn observer(&self) -> &O {
        &self.observer
    }

    pub fn observer_mut(&mut self) -> &mut O {
        &mut self.observer
    }

    pub fn snapshot(&self) -> AttemptSnapshot {
        AttemptSnapshot::capture(&self.quiz, &self.state)
    }

    fn require(&self, expected: AttemptStatus, event: AttemptEvent) -> Result<(), AttemptError> {
        if self.state.status == expected {
            Ok(())
        } else {
            tracing::debug!(state = %self.state.status, %event, "ignoring illegal transition");
            Err(AttemptError::IllegalTransition {
                state: self.state.status,
                event,
            })
        }
    }

    pub fn start(&mut self) -> Result<AttemptSnapshot, AttemptError> {
        self.require(AttemptStatus::NotStarted, AttemptEvent::Start)?;

        self.state.status = AttemptStatus::InProgress;
        self.state.started_at = Some(self.clock.now());
        self.state.remaining_seconds = self.quiz.time_limit_seconds;
        self.warned_low_time = false;

        tracing::info!(
            attempt = %self.state.attempt_id,
            quiz = %self.quiz.id,
            time_limit = ?self.quiz.time_limit_seconds,
            "attempt started"
        );

        let snapshot = self.snapshot();
        self.observer.on_started(&snapshot);
        Ok(snapshot)
    }

    /// Stores `answer` for `question`, replacing any earlier answer. A
    /// rejected answer leaves the stored answers untouched.
    pub fn set_answer(&mut self, question: &str, answer: Answer) -> Result<(), AttemptError> {
        self.require(AttemptStatus::InProgress, AttemptEvent::SetAnswer)?;

        let q = self
            .quiz
            .question(question)
            .ok_or_else(|| AttemptError::UnknownQuestion(question.to_string()))?;

        if let Err(problem) = validator::check_complete(q, &answer) {
            tracing::warn!(question, %problem, "rejected answer");
            return Err(AttemptError::InvalidAnswer {
                question: question.to_string(),
                problem,
            });
        }

        self.state.answers.insert(question.to_string(), answer.clone());
        tracing::debug!(question, "answer saved");

        let snapshot = self.snapshot();
        self.observer.on_answer_saved(question, &answer, &snapshot);
        Ok(())
    }

    pub fn clear_answer(&mut self, question: &str) -> Result<(), AttemptError> {
        self.require(AttemptStatus::InProgress, AttemptEvent::ClearAnswer)?;
        if self.quiz.question(question).is_none() {
            return Err(AttemptError::UnknownQuestion(question.to_string()));
        }
        if self.state.answers.remove(question).is_some() {
            let snapshot = self.snapshot();
            self.observer.on_answer_cleared(question, &snapshot);
        }
        Ok(())
    }

    /// One logical second. Without a time limit this does nothing beyond
    /// checking the state.
    pub fn tick(&mut self) -> Result<TickOutcome, AttemptError> {
        self.require(AttemptStatus::InProgress, AttemptEvent::Tick)?;
        self.count_down(1)
    }

    /// Applies an elapsed-time correction supplied by a collaborator, e.g.
    /// time spent away from a resumed attempt.
    pub fn apply_elapsed(&mut self, seconds: u64) -> Result<TickOutcome, AttemptError> {
        self.require(AttemptStatus::InProgress, AttemptEvent::Tick)?;
        self.count_down(seconds)
    }

    fn count_down(&mut self, seconds: u64) -> Result<TickOutcome, AttemptError> {
        let Some(remaining) = self.state.remaining_seconds else {
            return Ok(TickOutcome::Running { remaining: None });
        };

        let remaining = remaining.saturating_sub(seconds);
        self.state.remaining_seconds = Some(remaining);

        if remaining == 0 {
            let score = self.time_out()?;
            return Ok(TickOutcome::TimedOut(score));
        }

        let snapshot = self.snapshot();
        self.observer.on_snapshot(&snapshot);

        if !self.warned_low_time && remaining <= self.low_time_warning_seconds {
            self.warned_low_time = true;
            return Ok(TickOutcome::LowTime { remaining });
        }
        Ok(TickOutcome::Running {
            remaining: Some(remaining),
        })
    }

    fn time_out(&mut self) -> Result<ScoreResult, AttemptError> {
        self.state.remaining_seconds = Some(0);
        self.state.status = AttemptStatus::Completed;
        self.state.submission_reason = Some(SubmissionReason::Timeout);
        tracing::info!(attempt = %self.state.attempt_id, "time limit reached, submitting");
        self.finalize()
    }

    /// Moves to Completed with a manual reason. Unanswered questions do not
    /// block the request.
    pub fn request_submit(&mut self) -> Result<Progress, AttemptError> {
        self.require(AttemptStatus::InProgress, AttemptEvent::RequestSubmit)?;
        self.state.status = AttemptStatus::Completed;
        self.state.submission_reason = Some(SubmissionReason::Manual);
        tracing::debug!(attempt = %self.state.attempt_id, "submit requested");

        let snapshot = self.snapshot();
        self.observer.on_submit_requested(&snapshot);
        Ok(self.progress())
    }

    /// Hands the current snapshot to the observer before the driver stops.
    /// Only open attempts (in progress or awaiting confirmation) can be
    /// suspended.
    pub fn suspend(&mut self) -> Result<AttemptSnapshot, AttemptError> {
        match self.state.status {
            AttemptStatus::InProgress | AttemptStatus::Completed => {}
            status => {
                return Err(AttemptError::IllegalTransition {
                    state: status,
                    event: AttemptEvent::Suspend,
                })
            }
        }
        tracing::debug!(
            attempt = %self.state.attempt_id,
            remaining = ?self.state.remaining_seconds,
            "attempt suspended"
        );
        let snapshot = self.snapshot();
        self.observer.on_suspended(&snapshot);
        Ok(snapshot)
    }

    pub fn cancel_submit(&mut self) -> Result<(), AttemptError> {
        self.require(AttemptStatus::Completed, AttemptEvent::CancelSubmit)?;
        // A timed-out attempt is always finalized before this point; the
        // reason check keeps cancel strictly on the manual path.
        if self.state.submission_reason != Some(SubmissionReason::Manual) {
            return Err(AttemptError::IllegalTransition {
                state: self.state.status,
                event: AttemptEvent::CancelSubmit,
            });
        }
        self.state.status = AttemptStatus::InProgress;
        self.state.submission_reason = None;
        tracing::debug!(attempt = %self.state.attempt_id, "submit cancelled");

        let snapshot = self.snapshot();
        self.observer.on_snapshot(&snapshot);
        Ok(())
    }

    pub fn confirm_submit(&mut self) -> Result<ScoreResult, AttemptError> {
        self.require(AttemptStatus::Completed, AttemptEvent::ConfirmSubmit)?;
        self.finalize()
    }

    fn finalize(&mut self) -> Result<ScoreResult, AttemptError> {
        let reason = self
            .state
            .submission_reason
            .unwrap_or(SubmissionReason::Manual);
        let submitted_at = self.clock.now();
        let score = scoring::score(&self.quiz, &self.state.answers);

        self.state.status = AttemptStatus::Submitted;
        self.state.submission_reason = Some(reason);
        self.state.submitted_at = Some(submitted_at);
        self.state.score = Some(score.clone());

        tracing::info!(
            attempt = %self.state.attempt_id,
            %reason,
            earned = score.earned_points,
            total = score.total_points,
            percent = score.percent,
            passed = score.passed,
            "attempt submitted"
        );

        let submission = Submission {
            attempt_id: self.state.attempt_id,
            quiz_id: self.quiz.id.clone(),
            reason,
            started_at: self.state.started_at,
            submitted_at,
            answers: self.state.answers.clone(),
            score: score.clone(),
        };
        self.observer.on_submitted(&submission);
        Ok(score)
    }
}
