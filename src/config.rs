//! Runner configuration, read from `config.yaml` in the platform config
//! directory or from an explicit `--config` path.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::engine::DEFAULT_LOW_TIME_WARNING_SECONDS;
use crate::error::QuizError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Overrides the per-quiz state directory root.
    pub state_dir: Option<PathBuf>,
    /// Save the running attempt every N ticks. Answers are always saved
    /// immediately.
    pub autosave_every_ticks: u32,
    pub low_time_warning_seconds: u64,
    pub tick_interval_ms: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            state_dir: None,
            autosave_every_ticks: 5,
            low_time_warning_seconds: DEFAULT_LOW_TIME_WARNING_SECONDS,
            tick_interval_ms: 1000,
        }
    }
}

impl RunnerConfig {
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "quizattempt").map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    /// Loads `path` if given (it must exist), otherwise the default location
    /// if present, otherwise the built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, QuizError> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match Self::default_path() {
                Some(p) if p.exists() => p,
                _ => return Ok(Self::default()),
            },
        };

        let content = std::fs::read_to_string(&path)
            .map_err(|e| QuizError::io(format!("cannot read config {}", path.display()), e))?;
        let config = Self::from_yaml(&content)?;
        tracing::debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self, QuizError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self =
            serde_yaml::from_str(content).map_err(|e| QuizError::yaml("invalid config", e))?;
        if config.tick_interval_ms == 0 {
            return Err(QuizError::Invalid("tick_interval_ms must be at least 1".to_string()));
        }
        Ok(config)
    }
}
