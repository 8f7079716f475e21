//! File-backed persistence for attempts: the in-progress snapshot, the
//! history of completed attempts, and the attempt-limit check built on it.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::engine::{AttemptObserver, Submission};
use crate::error::QuizError;
use crate::model::{Answer, QuizDefinition};
use crate::scoring::ScoreResult;
use crate::state::{AttemptSnapshot, SubmissionReason};

const ATTEMPT_FILE: &str = "attempt.yaml";
const HISTORY_FILE: &str = "history.yaml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedAttempt {
    pub quiz_file_hash: String,
    pub saved_at: DateTime<Utc>,
    pub snapshot: AttemptSnapshot,
}

/// One finished attempt as recorded in `history.yaml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub attempt_id: Uuid,
    pub quiz_id: String,
    pub reason: SubmissionReason,
    pub started_at: Option<DateTime<Utc>>,
    pub submitted_at: DateTime<Utc>,
    pub score: ScoreResult,
}

impl From<&Submission> for AttemptRecord {
    fn from(s: &Submission) -> Self {
        Self {
            attempt_id: s.attempt_id,
            quiz_id: s.quiz_id.clone(),
            reason: s.reason,
            started_at: s.started_at,
            submitted_at: s.submitted_at,
            score: s.score.clone(),
        }
    }
}

/// Where state for the quiz at `quiz_path` lives: a per-quiz directory under
/// the platform data dir, or under `base` when one is configured.
pub fn state_dir_for(quiz_path: &Path, base: Option<&Path>) -> PathBuf {
    let root = match base {
        Some(base) => base.to_path_buf(),
        None => ProjectDirs::from("", "", "quizattempt")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from(".quizattempt")),
    };
    let key = compute_str_hash(&quiz_path.to_string_lossy());
    let short = key.trim_start_matches("sha256:");
    root.join(&short[..16])
}

pub fn save_snapshot(
    dir: &Path,
    quiz_hash: &str,
    snapshot: &AttemptSnapshot,
) -> Result<(), QuizError> {
    fs::create_dir_all(dir).map_err(|e| QuizError::io("cannot create state dir", e))?;
    let saved = SavedAttempt {
        quiz_file_hash: quiz_hash.to_string(),
        saved_at: Utc::now(),
        snapshot: snapshot.clone(),
    };
    let yaml =
        serde_yaml::to_string(&saved).map_err(|e| QuizError::yaml("cannot encode attempt", e))?;
    atomic_write(&dir.join(ATTEMPT_FILE), &yaml)
}

/// Loads the in-progress attempt, if any. A snapshot written against a
/// different version of the quiz file is refused.
pub fn load_snapshot(dir: &Path, quiz_hash: &str) -> Result<Option<AttemptSnapshot>, QuizError> {
    let path = dir.join(ATTEMPT_FILE);
    if !path.exists() {
        return Ok(None);
    }

    let content =
        fs::read_to_string(&path).map_err(|e| QuizError::io("cannot read attempt.yaml", e))?;
    let saved: SavedAttempt = serde_yaml::from_str(&content)
        .map_err(|e| QuizError::yaml("corrupt attempt.yaml (use --clear to reset)", e))?;

    if saved.quiz_file_hash != quiz_hash {
        return Err(QuizError::QuizChanged);
    }
    Ok(Some(saved.snapshot))
}

pub fn clear_state(dir: &Path) -> Result<(), QuizError> {
    let path = dir.join(ATTEMPT_FILE);
    if path.exists() {
        fs::remove_file(&path).map_err(|e| QuizError::io("cannot clear state", e))?;
    }
    Ok(())
}

pub fn load_history(dir: &Path) -> Result<Vec<AttemptRecord>, QuizError> {
    let path = dir.join(HISTORY_FILE);
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content =
        fs::read_to_string(&path).map_err(|e| QuizError::io("cannot read history.yaml", e))?;
    serde_yaml::from_str(&content).map_err(|e| QuizError::yaml("corrupt history.yaml", e))
}

pub fn append_history(dir: &Path, record: AttemptRecord) -> Result<(), QuizError> {
    let mut history = load_history(dir)?;
    if history.iter().any(|r| r.attempt_id == record.attempt_id) {
        return Ok(());
    }
    history.push(record);

    fs::create_dir_all(dir).map_err(|e| QuizError::io("cannot create state dir", e))?;
    let yaml = serde_yaml::to_string(&history)
        .map_err(|e| QuizError::yaml("cannot encode history", e))?;
    atomic_write(&dir.join(HISTORY_FILE), &yaml)
}

/// Refuses a new attempt once the quiz's attempt limit is used up.
pub fn ensure_attempt_allowed(
    quiz: &QuizDefinition,
    history: &[AttemptRecord],
) -> Result<(), QuizError> {
    let Some(max) = quiz.max_attempts else {
        return Ok(());
    };
    let used = history.iter().filter(|r| r.quiz_id == quiz.id).count();
    if used >= max as usize {
        return Err(QuizError::AttemptsExhausted { used, max });
    }
    Ok(())
}

pub fn export_answers(snapshot: &AttemptSnapshot, path: &Path) -> Result<(), QuizError> {
    let yaml = serde_yaml::to_string(snapshot)
        .map_err(|e| QuizError::yaml("cannot encode answers", e))?;
    fs::write(path, yaml).map_err(|e| QuizError::io(format!("cannot export to {}", path.display()), e))
}

fn atomic_write(path: &Path, content: &str) -> Result<(), QuizError> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, content)
        .map_err(|e| QuizError::io(format!("cannot write {}", tmp.display()), e))?;
    fs::rename(&tmp, path).map_err(|e| QuizError::io("cannot rename", e))?;
    Ok(())
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

pub fn compute_file_hash(path: &Path) -> Result<String, QuizError> {
    let content = fs::read(path)
        .map_err(|e| QuizError::io(format!("cannot read file {}", path.display()), e))?;
    let mut hasher = Sha256::new();
    hasher.update(&content);
    Ok(format!("sha256:{}", hex_encode(&hasher.finalize())))
}

pub fn compute_str_hash(s: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(s.as_bytes());
    format!("sha256:{}", hex_encode(&hasher.finalize()))
}

/// Saves the attempt as the engine reports changes. Save failures are
/// logged and remembered but never pushed back into the engine.
pub struct PersistObserver {
    dir: PathBuf,
    quiz_hash: String,
    autosave_every_ticks: u32,
    ticks_since_save: u32,
    last_error: Option<String>,
    submitted: Option<Submission>,
}

impl PersistObserver {
    pub fn new(dir: PathBuf, quiz_hash: String, autosave_every_ticks: u32) -> Self {
        Self {
            dir,
            quiz_hash,
            autosave_every_ticks: autosave_every_ticks.max(1),
            ticks_since_save: 0,
            last_error: None,
            submitted: None,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn submitted(&self) -> Option<&Submission> {
        self.submitted.as_ref()
    }

    fn save(&mut self, snapshot: &AttemptSnapshot) {
        self.ticks_since_save = 0;
        match save_snapshot(&self.dir, &self.quiz_hash, snapshot) {
            Ok(()) => self.last_error = None,
            Err(e) => {
                tracing::warn!(dir = %self.dir.display(), "failed to save attempt: {}", e);
                self.last_error = Some(e.to_string());
            }
        }
    }
}

impl AttemptObserver for PersistObserver {
    fn on_started(&mut self, snapshot: &AttemptSnapshot) {
        self.save(snapshot);
    }

    fn on_answer_saved(&mut self, _question: &str, _answer: &Answer, snapshot: &AttemptSnapshot) {
        self.save(snapshot);
    }

    fn on_answer_cleared(&mut self, _question: &str, snapshot: &AttemptSnapshot) {
        self.save(snapshot);
    }

    fn on_snapshot(&mut self, snapshot: &AttemptSnapshot) {
        self.ticks_since_save += 1;
        if self.ticks_since_save >= self.autosave_every_ticks {
            self.save(snapshot);
        }
    }

    fn on_submit_requested(&mut self, snapshot: &AttemptSnapshot) {
        self.save(snapshot);
    }

    fn on_suspended(&mut self, snapshot: &AttemptSnapshot) {
        self.save(snapshot);
    }

    fn on_submitted(&mut self, submission: &Submission) {
        if let Err(e) = append_history(&self.dir, AttemptRecord::from(submission)) {
            tracing::warn!(dir = %self.dir.display(), "failed to record attempt: {}", e);
            self.last_error = Some(e.to_string());
        } else if let Err(e) = clear_state(&self.dir) {
            tracing::warn!(dir = %self.dir.display(), "failed to clear attempt: {}", e);
        }
        self.submitted = Some(submission.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures::*;
    use crate::state::AttemptStatus;
    use std::collections::BTreeMap;

    fn snapshot(quiz_id: &str) -> AttemptSnapshot {
        AttemptSnapshot {
            attempt_id: Uuid::new_v4(),
            quiz_id: quiz_id.to_string(),
            status: AttemptStatus::InProgress,
            answers: BTreeMap::new(),
            remaining_seconds: Some(90),
            started_at: Some(Utc::now()),
            submission_reason: None,
        }
    }

    fn record(quiz_id: &str) -> AttemptRecord {
        AttemptRecord {
            attempt_id: Uuid::new_v4(),
            quiz_id: quiz_id.to_string(),
            reason: SubmissionReason::Manual,
            started_at: None,
            submitted_at: Utc::now(),
            score: crate::scoring::score(&quiz(vec![single("q1", "0", 1)]), &BTreeMap::new()),
        }
    }

    #[test]
    fn snapshot_roundtrip_and_hash_check() {
        let tmp = tempfile::tempdir().unwrap();
        let snap = snapshot("quiz");
        save_snapshot(tmp.path(), "sha256:a", &snap).unwrap();

        let loaded = load_snapshot(tmp.path(), "sha256:a").unwrap();
        assert_eq!(loaded, Some(snap));

        let err = load_snapshot(tmp.path(), "sha256:b").unwrap_err();
        assert!(matches!(err, QuizError::QuizChanged));

        clear_state(tmp.path()).unwrap();
        assert_eq!(load_snapshot(tmp.path(), "sha256:a").unwrap(), None);
    }

    #[test]
    fn history_appends_once_per_attempt() {
        let tmp = tempfile::tempdir().unwrap();
        let r = record("quiz");
        append_history(tmp.path(), r.clone()).unwrap();
        append_history(tmp.path(), r.clone()).unwrap();
        append_history(tmp.path(), record("quiz")).unwrap();
        assert_eq!(load_history(tmp.path()).unwrap().len(), 2);
    }

    #[test]
    fn attempt_limit_is_enforced() {
        let mut q = quiz(vec![single("q1", "0", 1)]);
        let history = vec![record("quiz"), record("other")];
        assert!(ensure_attempt_allowed(&q, &history).is_ok());

        q.max_attempts = Some(2);
        assert!(ensure_attempt_allowed(&q, &history).is_ok());

        q.max_attempts = Some(1);
        let err = ensure_attempt_allowed(&q, &history).unwrap_err();
        assert!(matches!(err, QuizError::AttemptsExhausted { used: 1, max: 1 }));
    }

    #[test]
    fn state_dir_is_stable_per_path() {
        let base = Path::new("/tmp/base");
        let a = state_dir_for(Path::new("/quizzes/a.md"), Some(base));
        let b = state_dir_for(Path::new("/quizzes/b.md"), Some(base));
        assert_eq!(a, state_dir_for(Path::new("/quizzes/a.md"), Some(base)));
        assert_ne!(a, b);
        assert!(a.starts_with(base));
    }

    #[test]
    fn observer_saves_on_autosave_interval() {
        let tmp = tempfile::tempdir().unwrap();
        let mut obs = PersistObserver::new(tmp.path().to_path_buf(), "sha256:a".into(), 3);
        let mut snap = snapshot("quiz");

        obs.on_snapshot(&snap);
        obs.on_snapshot(&snap);
        assert!(!tmp.path().join(ATTEMPT_FILE).exists());

        snap.remaining_seconds = Some(10);
        obs.on_snapshot(&snap);
        let loaded = load_snapshot(tmp.path(), "sha256:a").unwrap().unwrap();
        assert_eq!(loaded.remaining_seconds, Some(10));
        assert!(obs.last_error().is_none());
    }
}
