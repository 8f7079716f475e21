use pulldown_cmark::{Event, HeadingLevel, Options, Parser, Tag, TagEnd};

use crate::error::QuizError;
use crate::model::*;

pub fn parse_quiz(content: &str, quiz_file: &str) -> Result<QuizDefinition, QuizError> {
    let (frontmatter, body) = split_frontmatter(content)?;
    let fm: Frontmatter = serde_yaml::from_str(&frontmatter)
        .map_err(|e| QuizError::Parse(format!("invalid frontmatter: {}", e)))?;

    let (title, preamble, questions) = parse_body(&body)?;

    let quiz = QuizDefinition {
        id: fm.id.clone().unwrap_or_else(|| quiz_id_from_file(quiz_file)),
        title: fm.title.clone().unwrap_or(title),
        preamble,
        questions,
        time_limit_seconds: fm.time_limit_seconds,
        max_attempts: fm.max_attempts,
        passing_score_percent: fm.passing_score_percent,
    };
    quiz.validate()?;

    tracing::debug!(
        quiz = %quiz.id,
        questions = quiz.questions.len(),
        "parsed quiz {}",
        quiz_file
    );
    Ok(quiz)
}

fn quiz_id_from_file(quiz_file: &str) -> String {
    let stem = quiz_file
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(quiz_file)
        .trim_end_matches(".md");
    stem.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect()
}

fn split_frontmatter(content: &str) -> Result<(String, String), QuizError> {
    let trimmed = content.trim_start();
    if !trimmed.starts_with("---") {
        return Err(QuizError::Parse(
            "quiz file must start with YAML frontmatter (---)".to_string(),
        ));
    }

    let after_first = &trimmed[3..];
    let end_pos = after_first
        .find("\n---")
        .ok_or_else(|| QuizError::Parse("no closing --- for frontmatter".to_string()))?;

    let fm = after_first[..end_pos].trim().to_string();
    let body = after_first[end_pos + 4..].to_string();

    Ok((fm, body))
}

#[derive(Default)]
struct PendingQuestion {
    heading: String,
    prompt: Vec<String>,
    options: Vec<QuizOption>,
    free_text: Option<Option<String>>,
}

impl PendingQuestion {
    fn finish(self) -> Result<Question, QuizError> {
        let (number, title) = parse_h2_title(&self.heading)?;
        let (title, points) = split_points(&title)?;

        let is_multi = title.contains("(Multi)");
        let is_true_false = title.contains("(True/False)");
        let title = title
            .replace("(Multi)", "")
            .replace("(True/False)", "")
            .trim()
            .to_string();

        let kind = if !self.options.is_empty() {
            if is_multi {
                QuestionKind::MultiChoice {
                    options: self.options,
                }
            } else if is_true_false {
                QuestionKind::TrueFalse {
                    options: self.options,
                }
            } else {
                QuestionKind::SingleChoice {
                    options: self.options,
                }
            }
        } else if is_multi || is_true_false {
            return Err(QuizError::Parse(format!(
                "question {} is marked as a choice question but lists no options",
                number
            )));
        } else {
            QuestionKind::FreeText {
                reference: self.free_text.flatten(),
            }
        };

        Ok(Question {
            id: format!("q{}", number),
            title,
            prompt: self.prompt,
            points: points.unwrap_or(1),
            kind,
        })
    }
}

fn parse_body(body: &str) -> Result<(String, Vec<String>, Vec<Question>), QuizError> {
    let mut opts = Options::empty();
    opts.insert(Options::ENABLE_TASKLISTS);
    opts.insert(Options::ENABLE_STRIKETHROUGH);

    let parser = Parser::new_ext(body, opts);

    let mut title = String::new();
    let mut preamble: Vec<String> = Vec::new();
    let mut questions: Vec<Question> = Vec::new();
    let mut current: Option<PendingQuestion> = None;

    let mut in_h1 = false;
    let mut in_h2 = false;
    let mut in_blockquote = false;
    let mut blockquote_text = String::new();
    let mut in_list_item = false;
    let mut list_item_text = String::new();
    let mut task_list_checked: Option<bool> = None;
    let mut in_paragraph = false;
    let mut paragraph_text = String::new();
    let mut in_code_block = false;
    let mut code_block_text = String::new();

    for event in parser {
        match event {
            Event::Start(Tag::Heading { level, .. }) => match level {
                HeadingLevel::H1 => in_h1 = true,
                HeadingLevel::H2 => {
                    if let Some(q) = current.take() {
                        questions.push(q.finish()?);
                    }
                    current = Some(PendingQuestion::default());
                    in_h2 = true;
                }
                _ => {}
            },
            Event::End(TagEnd::Heading(level)) => match level {
                HeadingLevel::H1 => in_h1 = false,
                HeadingLevel::H2 => in_h2 = false,
                _ => {}
            },
            Event::Start(Tag::BlockQuote(_)) => {
                in_blockquote = true;
                blockquote_text.clear();
            }
            Event::End(TagEnd::BlockQuote(_)) => {
                in_blockquote = false;
                if let Some(q) = current.as_mut() {
                    let directive = blockquote_text.trim();
                    if directive == "text" {
                        q.free_text = Some(None);
                    } else if let Some(reference) = directive.strip_prefix("text:") {
                        q.free_text = Some(Some(reference.trim().to_string()));
                    } else if !directive.is_empty() {
                        q.prompt.push(format!("> {}", directive));
                    }
                }
            }
            Event::Start(Tag::Item) => {
                in_list_item = true;
                list_item_text.clear();
                task_list_checked = None;
            }
            Event::End(TagEnd::Item) => {
                in_list_item = false;
                if let Some(q) = current.as_mut() {
                    let text = list_item_text.trim().to_string();
                    if let Some(checked) = task_list_checked {
                        let label = option_label(q.options.len()).ok_or_else(|| {
                            QuizError::Parse(format!(
                                "question '{}' has more than {} options",
                                q.heading.trim(),
                                MAX_OPTIONS
                            ))
                        })?;
                        q.options.push(QuizOption {
                            id: label.to_string(),
                            text,
                            correct: checked,
                        });
                    } else if !text.is_empty() {
                        q.prompt.push(format!("- {}", text));
                    }
                }
                task_list_checked = None;
            }
            Event::TaskListMarker(checked) => {
                task_list_checked = Some(checked);
            }
            Event::Start(Tag::Paragraph) => {
                in_paragraph = true;
                paragraph_text.clear();
            }
            Event::End(TagEnd::Paragraph) => {
                in_paragraph = false;
                let text = paragraph_text.trim().to_string();
                if !text.is_empty() && !in_blockquote && !in_list_item {
                    match current.as_mut() {
                        Some(q) => q.prompt.push(text),
                        None => preamble.push(text),
                    }
                }
            }
            Event::Start(Tag::CodeBlock(_)) => {
                in_code_block = true;
                code_block_text.clear();
            }
            Event::End(TagEnd::CodeBlock) => {
                in_code_block = false;
                if let Some(q) = current.as_mut() {
                    q.prompt.push(code_block_text.trim_end().to_string());
                }
            }
            Event::Text(text) => {
                if in_h1 {
                    title.push_str(&text);
                } else if in_h2 {
                    if let Some(q) = current.as_mut() {
                        q.heading.push_str(&text);
                    }
                } else if in_code_block {
                    code_block_text.push_str(&text);
                } else if in_blockquote {
                    blockquote_text.push_str(&text);
                } else if in_list_item {
                    list_item_text.push_str(&text);
                } else if in_paragraph {
                    paragraph_text.push_str(&text);
                }
            }
            Event::Code(code) => {
                let c = format!("`{}`", code);
                if in_h2 {
                    if let Some(q) = current.as_mut() {
                        q.heading.push_str(&c);
                    }
                } else if in_list_item {
                    list_item_text.push_str(&c);
                } else if in_paragraph {
                    paragraph_text.push_str(&c);
                }
            }
            Event::SoftBreak | Event::HardBreak => {
                if in_list_item {
                    list_item_text.push(' ');
                } else if in_paragraph {
                    paragraph_text.push(' ');
                }
            }
            _ => {}
        }
    }

    if let Some(q) = current.take() {
        questions.push(q.finish()?);
    }

    Ok((title.trim().to_string(), preamble, questions))
}

const MAX_OPTIONS: usize = 26;

/// Option ids run `a` to `z`.
fn option_label(index: usize) -> Option<char> {
    if index >= MAX_OPTIONS {
        return None;
    }
    let offset = u8::try_from(index).ok()?;
    Some(char::from(b'a' + offset))
}

fn parse_h2_title(text: &str) -> Result<(u32, String), QuizError> {
    let trimmed = text.trim();
    // Expected format: "1. Title text"
    let (num_str, title) = trimmed.split_once('.').ok_or_else(|| {
        QuizError::Parse(format!(
            "question heading must be in format '## N. Title', got: {}",
            trimmed
        ))
    })?;
    let number: u32 = num_str
        .trim()
        .parse()
        .map_err(|_| QuizError::Parse(format!("invalid question number in heading: {}", trimmed)))?;
    Ok((number, title.trim().to_string()))
}

/// Splits a trailing `[N pts]` / `[1 pt]` marker off a question title.
fn split_points(title: &str) -> Result<(String, Option<u32>), QuizError> {
    let trimmed = title.trim_end();
    if !trimmed.ends_with(']') {
        return Ok((trimmed.to_string(), None));
    }
    let Some(open) = trimmed.rfind('[') else {
        return Ok((trimmed.to_string(), None));
    };

    let inner = trimmed[open + 1..trimmed.len() - 1].trim();
    let Some(number) = inner
        .strip_suffix("pts")
        .or_else(|| inner.strip_suffix("pt"))
    else {
        return Ok((trimmed.to_string(), None));
    };

    let points: u32 = number
        .trim()
        .parse()
        .map_err(|_| QuizError::Parse(format!("invalid points marker in heading: {}", title)))?;
    Ok((trimmed[..open].trim_end().to_string(), Some(points)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUIZ: &str = r#"---
title: Ownership check
time_limit_seconds: 600
passing_score_percent: 60
---

# Ownership

Answer every question.

## 1. Which call moves the value? [2 pts]

- [ ] `clone()`
- [x] `into_iter()`

## 2. Pick the smart pointers (Multi)

- [x] Box
- [ ] u8
- [x] Rc

## 3. Rust has a garbage collector (True/False)

- [ ] True
- [x] False

## 4. Name the checker

> text: borrow checker

## 5. Explain lifetimes

> text
"#;

    #[test]
    fn parses_all_question_kinds() {
        let quiz = parse_quiz(QUIZ, "quizzes/Ownership Check.md").unwrap();
        assert_eq!(quiz.id, "ownership-check");
        assert_eq!(quiz.title, "Ownership check");
        assert_eq!(quiz.time_limit_seconds, Some(600));
        assert_eq!(quiz.passing_score_percent, 60);
        assert_eq!(quiz.preamble, vec!["Answer every question.".to_string()]);
        assert_eq!(quiz.questions.len(), 5);

        let q1 = &quiz.questions[0];
        assert_eq!(q1.id, "q1");
        assert_eq!(q1.points, 2);
        assert_eq!(q1.title, "Which call moves the value?");
        assert_eq!(q1.correct_option_ids().into_iter().collect::<Vec<_>>(), vec!["b"]);
        assert_eq!(q1.kind.options()[0].text, "`clone()`");

        assert!(matches!(quiz.questions[1].kind, QuestionKind::MultiChoice { .. }));
        assert_eq!(quiz.questions[1].title, "Pick the smart pointers");
        assert!(matches!(quiz.questions[2].kind, QuestionKind::TrueFalse { .. }));
        assert_eq!(
            quiz.questions[3].kind,
            QuestionKind::FreeText {
                reference: Some("borrow checker".to_string())
            }
        );
        assert_eq!(quiz.questions[4].kind, QuestionKind::FreeText { reference: None });
    }

    #[test]
    fn missing_frontmatter_is_an_error() {
        let err = parse_quiz("# Title\n\n## 1. Q\n\n> text\n", "q.md").unwrap_err();
        assert!(err.to_string().contains("frontmatter"));
    }

    #[test]
    fn bad_heading_is_an_error() {
        let err = parse_quiz("---\ntitle: x\n---\n## Question\n\n> text\n", "q.md").unwrap_err();
        assert!(err.to_string().contains("## N. Title"));
    }

    #[test]
    fn single_choice_with_two_correct_fails_validation() {
        let content = "---\ntitle: x\n---\n## 1. Q\n\n- [x] a\n- [x] b\n";
        assert!(matches!(parse_quiz(content, "q.md"), Err(QuizError::Invalid(_))));
    }

    #[test]
    fn duplicate_question_numbers_fail_validation() {
        let content = "---\ntitle: x\n---\n## 1. A\n\n> text\n\n## 1. B\n\n> text\n";
        assert!(matches!(parse_quiz(content, "q.md"), Err(QuizError::Invalid(_))));
    }

    #[test]
    fn option_ids_stop_at_z() {
        assert_eq!(option_label(0), Some('a'));
        assert_eq!(option_label(25), Some('z'));
        assert_eq!(option_label(26), None);
        assert_eq!(option_label(300), None);
    }

    #[test]
    fn too_many_options_is_a_parse_error() {
        let mut content = "---\ntitle: x\n---\n## 1. Pick one\n\n- [x] opt 0\n".to_string();
        for i in 1..27 {
            content.push_str(&format!("- [ ] opt {}\n", i));
        }
        let err = parse_quiz(&content, "q.md").unwrap_err();
        assert!(matches!(err, QuizError::Parse(_)));
        assert!(err.to_string().contains("more than 26 options"));

        let ok: String = content.lines().take(31).collect::<Vec<_>>().join("\n");
        let quiz = parse_quiz(&ok, "q.md").unwrap();
        let ids: Vec<&str> = quiz.questions[0].kind.options().iter().map(|o| o.id.as_str()).collect();
        assert_eq!(ids.len(), 26);
        assert_eq!(ids[25], "z");
    }

    #[test]
    fn points_marker_parsing() {
        assert_eq!(split_points("Title [3 pts]").unwrap(), ("Title".to_string(), Some(3)));
        assert_eq!(split_points("Title [1 pt]").unwrap(), ("Title".to_string(), Some(1)));
        assert_eq!(split_points("Title [see]").unwrap(), ("Title [see]".to_string(), None));
        assert!(split_points("Title [x pts]").is_err());
    }
}
