mod cli;

use std::io;
use std::path::Path;
use std::sync::mpsc;
use std::time::Duration;

use clap::Parser;

use quizattempt::config::RunnerConfig;
use quizattempt::engine::{AttemptEngine, SystemClock};
use quizattempt::error::QuizError;
use quizattempt::persist::{self, PersistObserver};
use quizattempt::runner::{self, RunOutcome, Runner};
use quizattempt::state::AttemptStatus;
use quizattempt::{parser, source, submit};

use crate::cli::Cli;

fn main() {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("quizattempt=warn")),
        )
        .init();

    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), QuizError> {
    let cli = Cli::parse();
    let config = RunnerConfig::load(cli.config.as_deref())?;

    let quiz_path = source::resolve_source(&cli.path)?;
    let quiz_hash = persist::compute_file_hash(&quiz_path)?;

    let content = std::fs::read_to_string(&quiz_path)
        .map_err(|e| QuizError::io("cannot read quiz file", e))?;
    let quiz_filename = quiz_path
        .file_name()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string();
    let quiz = parser::parse_quiz(&content, &quiz_filename)?;

    if cli.validate {
        println!(
            "{}: {} questions, {} points, valid",
            quiz.title,
            quiz.questions.len(),
            quiz.total_points()
        );
        return Ok(());
    }

    let canonical = quiz_path
        .canonicalize()
        .unwrap_or_else(|_| quiz_path.clone());
    let state_root = cli.state_dir.as_deref().or(config.state_dir.as_deref());
    let state_dir = persist::state_dir_for(&canonical, state_root);
    tracing::debug!(dir = %state_dir.display(), "using state directory");

    if cli.clear {
        persist::clear_state(&state_dir)?;
        eprintln!("State cleared.");
    }

    let snapshot = persist::load_snapshot(&state_dir, &quiz_hash)?;
    let history = persist::load_history(&state_dir)?;

    if cli.status {
        print!("{}", submit::status_report(&quiz, snapshot.as_ref(), &history));
        return Ok(());
    }

    if let Some(ref export_path) = cli.export {
        let snap = snapshot
            .as_ref()
            .ok_or_else(|| QuizError::Invalid("no attempt in progress to export".to_string()))?;
        persist::export_answers(snap, export_path)?;
        eprintln!("Answers exported to {}", export_path.display());
        return Ok(());
    }

    let observer = PersistObserver::new(state_dir.clone(), quiz_hash, config.autosave_every_ticks);
    let mut engine = match snapshot {
        Some(snap) => {
            let mut engine = AttemptEngine::resume(quiz, snap, observer, SystemClock)?
                .with_low_time_warning(config.low_time_warning_seconds);
            if let Some(secs) = cli.elapsed {
                if engine.status() == AttemptStatus::InProgress {
                    engine.apply_elapsed(secs)?;
                }
            }
            eprintln!("Resuming saved attempt.");
            engine
        }
        None => {
            persist::ensure_attempt_allowed(&quiz, &history)?;
            let mut engine = AttemptEngine::new(quiz, observer, SystemClock)
                .with_low_time_warning(config.low_time_warning_seconds);
            engine.start()?;
            engine
        }
    };

    if engine.status() != AttemptStatus::Submitted {
        let (tx, rx) = mpsc::channel();
        runner::spawn_stdin_reader(tx.clone());
        let interval = Duration::from_millis(config.tick_interval_ms);
        let stdout = io::stdout();
        let outcome = Runner::new(&mut engine, stdout.lock(), tx, Some(interval)).run(&rx)?;

        if outcome == RunOutcome::Quit {
            eprintln!("Progress saved. Run again to continue.");
            return Ok(());
        }
    }

    let Some(submission) = engine.observer().submitted() else {
        return Ok(());
    };
    println!("{}", submit::result_summary(engine.quiz(), submission));

    let result_path = match cli.result {
        Some(path) => path,
        None => state_dir.join(format!("result-{}.yaml", submission.attempt_id)),
    };
    write_result_file(&engine, &result_path)?;
    if let Some(err) = engine.observer().last_error() {
        eprintln!("Warning: attempt could not be fully saved: {}", err);
    }
    Ok(())
}

fn write_result_file(
    engine: &AttemptEngine<PersistObserver, SystemClock>,
    path: &Path,
) -> Result<(), QuizError> {
    if let Some(submission) = engine.observer().submitted() {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| QuizError::io("cannot create result directory", e))?;
        }
        submit::write_result(engine.quiz(), submission, path)?;
        eprintln!("Result written to {}", path.display());
    }
    Ok(())
}
