use std::path::Path;

use serde::Serialize;

use crate::engine::Submission;
use crate::error::QuizError;
use crate::model::{Answer, QuestionKind, QuizDefinition};
use crate::persist::AttemptRecord;
use crate::state::AttemptSnapshot;
use crate::timer::format_duration;
use crate::validator::Grade;

#[derive(Debug, Serialize)]
struct ResultDocument<'a> {
    quiz: QuizMeta<'a>,
    attempt: AttemptMeta,
    score: ScoreMeta<'a>,
    questions: Vec<QuestionEntry<'a>>,
}

#[derive(Debug, Serialize)]
struct QuizMeta<'a> {
    id: &'a str,
    title: &'a str,
    passing_score_percent: u32,
}

#[derive(Debug, Serialize)]
struct AttemptMeta {
    id: String,
    reason: String,
    started_at: String,
    submitted_at: String,
    duration: String,
}

#[derive(Debug, Serialize)]
struct ScoreMeta<'a> {
    correct: usize,
    questions: usize,
    earned_points: u64,
    total_points: u64,
    percent: u32,
    passed: bool,
    #[serde(skip_serializing_if = "is_empty")]
    pending_manual: &'a [String],
}

fn is_empty(ids: &&[String]) -> bool {
    ids.is_empty()
}

#[derive(Debug, Serialize)]
struct QuestionEntry<'a> {
    id: &'a str,
    title: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    grade: Grade,
    points: String,
    answer: Option<&'a Answer>,
}

/// The YAML document handed to whoever records or displays the result.
pub fn build_result_yaml(quiz: &QuizDefinition, submission: &Submission) -> Result<String, QuizError> {
    let score = &submission.score;
    let questions = quiz
        .questions
        .iter()
        .zip(&score.outcomes)
        .map(|(q, outcome)| QuestionEntry {
            id: &q.id,
            title: &q.title,
            kind: q.kind.label(),
            grade: outcome.grade,
            points: format!("{}/{}", outcome.earned_points, outcome.points),
            answer: submission.answers.get(&q.id),
        })
        .collect();

    let doc = ResultDocument {
        quiz: QuizMeta {
            id: &quiz.id,
            title: &quiz.title,
            passing_score_percent: quiz.passing_score_percent,
        },
        attempt: AttemptMeta {
            id: submission.attempt_id.to_string(),
            reason: submission.reason.to_string(),
            started_at: submission
                .started_at
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "unknown".to_string()),
            submitted_at: submission.submitted_at.to_rfc3339(),
            duration: compute_duration(submission),
        },
        score: ScoreMeta {
            correct: score.correct_count,
            questions: score.total_questions,
            earned_points: score.earned_points,
            total_points: score.total_points,
            percent: score.percent,
            passed: score.passed,
            pending_manual: &score.pending_manual,
        },
        questions,
    };

    serde_yaml::to_string(&doc).map_err(|e| QuizError::yaml("cannot encode result", e))
}

pub fn write_result(
    quiz: &QuizDefinition,
    submission: &Submission,
    path: &Path,
) -> Result<(), QuizError> {
    let yaml = build_result_yaml(quiz, submission)?;
    std::fs::write(path, yaml)
        .map_err(|e| QuizError::io(format!("cannot write {}", path.display()), e))
}

fn compute_duration(submission: &Submission) -> String {
    match submission.started_at {
        Some(start) => {
            let secs = (submission.submitted_at - start).num_seconds().max(0);
            let h = secs / 3600;
            let m = (secs % 3600) / 60;
            let s = secs % 60;
            format!("{:02}:{:02}:{:02}", h, m, s)
        }
        None => "unknown".to_string(),
    }
}

pub fn result_summary(quiz: &QuizDefinition, submission: &Submission) -> String {
    let score = &submission.score;
    let mut out = format!(
        "{}: {}/{} points ({}%), {} of {} correct, {}",
        quiz.title,
        score.earned_points,
        score.total_points,
        score.percent,
        score.correct_count,
        score.total_questions,
        if score.passed { "PASSED" } else { "NOT PASSED" },
    );
    if submission.reason == crate::state::SubmissionReason::Timeout {
        out.push_str("\nSubmitted automatically when time ran out.");
    }
    if !score.pending_manual.is_empty() {
        out.push_str(&format!(
            "\nAwaiting manual grading: {}",
            score.pending_manual.join(", ")
        ));
    }
    out
}

/// Text for `--status`: progress of the in-progress attempt plus history.
pub fn status_report(
    quiz: &QuizDefinition,
    snapshot: Option<&AttemptSnapshot>,
    history: &[AttemptRecord],
) -> String {
    let mut out = format!("Quiz: {}\nQuestions: {}\n", quiz.title, quiz.questions.len());
    if let Some(limit) = quiz.time_limit_seconds {
        out.push_str(&format!("Time limit: {}\n", format_duration(limit)));
    }

    match snapshot {
        Some(snap) => {
            let answered = quiz
                .questions
                .iter()
                .filter(|q| snap.answers.contains_key(&q.id))
                .count();
            out.push_str(&format!(
                "Current attempt: {} ({} answered, {} not answered)\n",
                snap.status,
                answered,
                quiz.questions.len() - answered
            ));
            if let Some(remaining) = snap.remaining_seconds {
                out.push_str(&format!("Time remaining: {}\n", format_duration(remaining)));
            }
            if let Some(started) = snap.started_at {
                out.push_str(&format!("Started: {}\n", started.to_rfc3339()));
            }
        }
        None => out.push_str("Current attempt: none\n"),
    }

    let mine: Vec<&AttemptRecord> = history.iter().filter(|r| r.quiz_id == quiz.id).collect();
    let attempts = match quiz.max_attempts {
        Some(max) => format!("{} of {}", mine.len(), max),
        None => mine.len().to_string(),
    };
    out.push_str(&format!("Attempts used: {}\n", attempts));
    if let Some(best) = mine.iter().map(|r| r.score.percent).max() {
        out.push_str(&format!("Best score: {}%\n", best));
    }
    out
}

/// One line per question for the interactive listing.
pub fn describe_answer(kind: &QuestionKind, answer: Option<&Answer>) -> String {
    match (kind, answer) {
        (_, None) => "-".to_string(),
        (_, Some(Answer::Choice { selected })) => selected.clone(),
        (_, Some(Answer::Choices { selected })) => {
            selected.iter().cloned().collect::<Vec<_>>().join(",")
        }
        (QuestionKind::FreeText { .. }, Some(Answer::Text { text })) => format!("{:?}", text),
        (_, Some(Answer::Text { text })) => text.clone(),
    }
}
