use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::QuizError;

pub type QuestionId = String;
pub type OptionId = String;

pub const DEFAULT_PASSING_SCORE_PERCENT: u32 = 70;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frontmatter {
    pub id: Option<String>,
    pub title: Option<String>,
    #[serde(default)]
    pub time_limit_seconds: Option<u64>,
    #[serde(default)]
    pub max_attempts: Option<u32>,
    #[serde(default = "default_passing_score")]
    pub passing_score_percent: u32,
}

fn default_passing_score() -> u32 {
    DEFAULT_PASSING_SCORE_PERCENT
}

fn default_points() -> u32 {
    1
}

/// A quiz as handed to the attempt engine. Never mutated once an attempt
/// has started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizDefinition {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub preamble: Vec<String>,
    pub questions: Vec<Question>,
    #[serde(default)]
    pub time_limit_seconds: Option<u64>,
    #[serde(default)]
    pub max_attempts: Option<u32>,
    #[serde(default = "default_passing_score")]
    pub passing_score_percent: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: QuestionId,
    pub title: String,
    #[serde(default)]
    pub prompt: Vec<String>,
    #[serde(default = "default_points")]
    pub points: u32,
    pub kind: QuestionKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QuestionKind {
    SingleChoice { options: Vec<QuizOption> },
    MultiChoice { options: Vec<QuizOption> },
    TrueFalse { options: Vec<QuizOption> },
    FreeText {
        #[serde(default)]
        reference: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizOption {
    pub id: OptionId,
    pub text: String,
    #[serde(default)]
    pub correct: bool,
}

/// A submitted answer. The variant must line up with the question kind:
/// `Choice` for single choice and true/false, `Choices` for multi choice,
/// `Text` for free text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Answer {
    Choice { selected: OptionId },
    Choices { selected: BTreeSet<OptionId> },
    Text { text: String },
}

impl Answer {
    pub fn choice(id: impl Into<OptionId>) -> Self {
        Answer::Choice { selected: id.into() }
    }

    pub fn choices<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OptionId>,
    {
        Answer::Choices {
            selected: ids.into_iter().map(Into::into).collect(),
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Answer::Text { text: text.into() }
    }
}

impl QuestionKind {
    pub fn options(&self) -> &[QuizOption] {
        match self {
            QuestionKind::SingleChoice { options }
            | QuestionKind::MultiChoice { options }
            | QuestionKind::TrueFalse { options } => options,
            QuestionKind::FreeText { .. } => &[],
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            QuestionKind::SingleChoice { .. } => "single_choice",
            QuestionKind::MultiChoice { .. } => "multi_choice",
            QuestionKind::TrueFalse { .. } => "true_false",
            QuestionKind::FreeText { .. } => "free_text",
        }
    }
}

impl Question {
    pub fn option(&self, id: &str) -> Option<&QuizOption> {
        self.kind.options().iter().find(|o| o.id == id)
    }

    pub fn correct_option_ids(&self) -> BTreeSet<&str> {
        self.kind
            .options()
            .iter()
            .filter(|o| o.correct)
            .map(|o| o.id.as_str())
            .collect()
    }
}

impl QuizDefinition {
    pub fn question(&self, id: &str) -> Option<&Question> {
        self.questions.iter().find(|q| q.id == id)
    }

    pub fn question_index(&self, id: &str) -> Option<usize> {
        self.questions.iter().position(|q| q.id == id)
    }

    pub fn total_points(&self) -> u64 {
        self.questions.iter().map(|q| u64::from(q.points)).sum()
    }

    /// Checks the structural invariants every quiz must satisfy before an
    /// attempt can run against it.
    pub fn validate(&self) -> Result<(), QuizError> {
        if self.questions.is_empty() {
            return Err(QuizError::Invalid("quiz has no questions".to_string()));
        }
        if self.passing_score_percent > 100 {
            return Err(QuizError::Invalid(format!(
                "passing_score_percent must be at most 100, got {}",
                self.passing_score_percent
            )));
        }
        if self.time_limit_seconds == Some(0) {
            return Err(QuizError::Invalid(
                "time_limit_seconds must be at least 1".to_string(),
            ));
        }
        if self.max_attempts == Some(0) {
            return Err(QuizError::Invalid("max_attempts must be at least 1".to_string()));
        }

        let mut seen = HashSet::new();
        for q in &self.questions {
            if !seen.insert(q.id.as_str()) {
                return Err(QuizError::Invalid(format!("duplicate question id '{}'", q.id)));
            }
            validate_question(q)?;
        }
        Ok(())
    }
}

fn validate_question(q: &Question) -> Result<(), QuizError> {
    if q.points == 0 {
        return Err(QuizError::Invalid(format!(
            "question '{}' must be worth at least 1 point",
            q.id
        )));
    }

    let mut option_ids = HashSet::new();
    for o in q.kind.options() {
        if !option_ids.insert(o.id.as_str()) {
            return Err(QuizError::Invalid(format!(
                "question '{}' has duplicate option id '{}'",
                q.id, o.id
            )));
        }
    }

    let correct = q.kind.options().iter().filter(|o| o.correct).count();
    match &q.kind {
        QuestionKind::SingleChoice { .. } if correct != 1 => Err(QuizError::Invalid(format!(
            "single choice question '{}' needs exactly one correct option, found {}",
            q.id, correct
        ))),
        QuestionKind::TrueFalse { options } if options.len() != 2 => {
            Err(QuizError::Invalid(format!(
                "true/false question '{}' needs exactly two options, found {}",
                q.id,
                options.len()
            )))
        }
        QuestionKind::TrueFalse { .. } if correct != 1 => Err(QuizError::Invalid(format!(
            "true/false question '{}' needs exactly one correct option, found {}",
            q.id, correct
        ))),
        QuestionKind::MultiChoice { .. } if correct == 0 => Err(QuizError::Invalid(format!(
            "multi choice question '{}' needs at least one correct option",
            q.id
        ))),
        _ => Ok(()),
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn opt(id: &str, correct: bool) -> QuizOption {
        QuizOption {
            id: id.to_string(),
            text: format!("option {}", id),
            correct,
        }
    }

    pub fn single(id: &str, correct: &str, points: u32) -> Question {
        Question {
            id: id.to_string(),
            title: format!("Question {}", id),
            prompt: Vec::new(),
            points,
            kind: QuestionKind::SingleChoice {
                options: ["0", "1", "2"]
                    .iter()
                    .map(|o| opt(o, *o == correct))
                    .collect(),
            },
        }
    }

    pub fn multi(id: &str, correct: &[&str], points: u32) -> Question {
        Question {
            id: id.to_string(),
            title: format!("Question {}", id),
            prompt: Vec::new(),
            points,
            kind: QuestionKind::MultiChoice {
                options: ["a", "b", "c", "d"]
                    .iter()
                    .map(|o| opt(o, correct.contains(o)))
                    .collect(),
            },
        }
    }

    pub fn free_text(id: &str, reference: Option<&str>) -> Question {
        Question {
            id: id.to_string(),
            title: format!("Question {}", id),
            prompt: Vec::new(),
            points: 1,
            kind: QuestionKind::FreeText {
                reference: reference.map(str::to_string),
            },
        }
    }

    pub fn quiz(questions: Vec<Question>) -> QuizDefinition {
        QuizDefinition {
            id: "quiz".to_string(),
            title: "Quiz".to_string(),
            preamble: Vec::new(),
            questions,
            time_limit_seconds: None,
            max_attempts: None,
            passing_score_percent: DEFAULT_PASSING_SCORE_PERCENT,
        }
    }
}
