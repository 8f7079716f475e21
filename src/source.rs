use std::path::{Path, PathBuf};

use crate::error::QuizError;

/// Resolves a CLI path to a quiz file: either the `.md` file itself or a
/// directory holding exactly one.
pub fn resolve_source(path: &str) -> Result<PathBuf, QuizError> {
    let path = Path::new(path).to_path_buf();
    let path = if path.is_relative() {
        std::env::current_dir()
            .map_err(|e| QuizError::io("cannot get cwd", e))?
            .join(path)
    } else {
        path
    };

    if path.is_file() && is_markdown(&path) {
        Ok(path)
    } else if path.is_dir() {
        find_quiz_file(&path)
    } else {
        Err(QuizError::Invalid(format!("path not found: {}", path.display())))
    }
}

fn is_markdown(path: &Path) -> bool {
    path.extension().is_some_and(|e| e == "md")
}

fn find_quiz_file(dir: &Path) -> Result<PathBuf, QuizError> {
    let entries = std::fs::read_dir(dir)
        .map_err(|e| QuizError::io(format!("cannot read directory {}", dir.display()), e))?;

    let mut md_files: Vec<PathBuf> = Vec::new();
    for entry in entries {
        let path = entry
            .map_err(|e| QuizError::io("error reading entry", e))?
            .path();
        if path.is_file() && is_markdown(&path) {
            md_files.push(path);
        }
    }
    md_files.sort();

    match md_files.len() {
        0 => Err(QuizError::Invalid(format!(
            "no .md quiz files found in {}",
            dir.display()
        ))),
        1 => Ok(md_files.remove(0)),
        _ => {
            let names: Vec<String> = md_files
                .iter()
                .map(|p| format!("  - {}", p.file_name().unwrap_or_default().to_string_lossy()))
                .collect();
            Err(QuizError::Invalid(format!(
                "multiple .md files found. Specify which one:\n{}",
                names.join("\n")
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_single_file_in_directory() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("quiz.md"), "---\n---\n").unwrap();
        std::fs::write(tmp.path().join("notes.txt"), "").unwrap();
        let found = resolve_source(tmp.path().to_str().unwrap()).unwrap();
        assert_eq!(found.file_name().unwrap(), "quiz.md");
    }

    #[test]
    fn ambiguous_directory_lists_candidates() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("a.md"), "").unwrap();
        std::fs::write(tmp.path().join("b.md"), "").unwrap();
        let err = resolve_source(tmp.path().to_str().unwrap()).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("a.md") && msg.contains("b.md"));
    }

    #[test]
    fn missing_path_is_an_error() {
        assert!(resolve_source("/definitely/not/here.md").is_err());
    }
}
