//! Line-oriented terminal driver. User input and timer ticks arrive on one
//! channel and are handled strictly one at a time, so the engine only ever
//! sees serialized calls.

use std::io::{self, BufRead, Write};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use crate::engine::{AttemptEngine, AttemptObserver, Clock, TickOutcome};
use crate::error::{AttemptError, QuizError};
use crate::model::{Answer, Question, QuestionKind};
use crate::scoring::ScoreResult;
use crate::state::AttemptStatus;
use crate::submit::describe_answer;
use crate::timer::{format_duration, Ticker, TimerEvent};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    Input(String),
    InputClosed,
    Timer(TimerEvent),
}

impl From<TimerEvent> for AppEvent {
    fn from(ev: TimerEvent) -> Self {
        AppEvent::Timer(ev)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Submitted(ScoreResult),
    /// The user left; the attempt stays resumable.
    Quit,
}

const HELP: &str = "\
Commands:
  a <answer>   answer the current question (option id, ids separated by commas, or text)
  c            clear the current answer
  n / p        next / previous question
  g <N>        go to question N
  l            list questions
  t            time remaining
  s            submit
  q            quit and keep progress
  h            this help";

pub fn spawn_stdin_reader(tx: mpsc::Sender<AppEvent>) {
    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(AppEvent::Input(line)).is_err() {
                return;
            }
        }
        let _ = tx.send(AppEvent::InputClosed);
    });
}

pub struct Runner<'e, O: AttemptObserver, C: Clock, W: Write> {
    engine: &'e mut AttemptEngine<O, C>,
    out: W,
    current: usize,
    tx: mpsc::Sender<AppEvent>,
    tick_interval: Option<Duration>,
    ticker: Option<Ticker>,
}

impl<'e, O: AttemptObserver, C: Clock, W: Write> Runner<'e, O, C, W> {
    /// `tick_interval` of `None` disables the timer thread; ticks can still
    /// be fed through the channel.
    pub fn new(
        engine: &'e mut AttemptEngine<O, C>,
        out: W,
        tx: mpsc::Sender<AppEvent>,
        tick_interval: Option<Duration>,
    ) -> Self {
        Self {
            engine,
            out,
            current: 0,
            tx,
            tick_interval,
            ticker: None,
        }
    }

    pub fn run(mut self, rx: &mpsc::Receiver<AppEvent>) -> Result<RunOutcome, QuizError> {
        self.sync_ticker();
        self.show_intro()?;

        loop {
            let Ok(event) = rx.recv() else {
                return self.finish(RunOutcome::Quit);
            };

            let outcome = match event {
                AppEvent::Input(line) => self.handle_line(line.trim())?,
                AppEvent::InputClosed => Some(RunOutcome::Quit),
                AppEvent::Timer(TimerEvent::Tick) => self.handle_tick()?,
            };
            self.sync_ticker();

            if let Some(outcome) = outcome {
                return self.finish(outcome);
            }
        }
    }

    /// Stops the ticker and, on quit, hands the open attempt to the observer.
    fn finish(&mut self, outcome: RunOutcome) -> Result<RunOutcome, QuizError> {
        self.stop_ticker();
        if outcome == RunOutcome::Quit {
            match self.engine.suspend() {
                Ok(_) => {}
                Err(e) if e.is_illegal_transition() => {
                    tracing::debug!("nothing to suspend: {}", e);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(outcome)
    }

    /// Keeps a ticker alive exactly while a timed attempt is in progress.
    fn sync_ticker(&mut self) {
        let wants_ticks = self.engine.status() == AttemptStatus::InProgress
            && self.engine.quiz().time_limit_seconds.is_some();

        if wants_ticks && self.ticker.is_none() {
            if let Some(interval) = self.tick_interval {
                self.ticker = Some(Ticker::spawn(interval, self.tx.clone()));
            }
        } else if !wants_ticks {
            self.stop_ticker();
        }
    }

    fn stop_ticker(&mut self) {
        if let Some(mut ticker) = self.ticker.take() {
            ticker.stop();
        }
    }

    fn say(&mut self, text: impl AsRef<str>) -> Result<(), QuizError> {
        writeln!(self.out, "{}", text.as_ref()).map_err(|e| QuizError::io("cannot write output", e))
    }

    fn show_intro(&mut self) -> Result<(), QuizError> {
        let quiz = self.engine.quiz();
        let mut intro = format!("{}\n", quiz.title);
        for line in &quiz.preamble {
            intro.push_str(line);
            intro.push('\n');
        }
        self.say(intro)?;
        self.say("Type h for help.")?;

        if self.engine.status() == AttemptStatus::Completed {
            return self.say("Your submission is waiting for confirmation. Submit now? (y/n)");
        }
        self.show_current()
    }

    fn handle_tick(&mut self) -> Result<Option<RunOutcome>, QuizError> {
        match self.engine.tick() {
            Ok(TickOutcome::Running { .. }) => Ok(None),
            Ok(TickOutcome::LowTime { remaining }) => {
                self.say(format!("Warning: {} left.", format_duration(remaining)))?;
                Ok(None)
            }
            Ok(TickOutcome::TimedOut(score)) => {
                self.say("Time is up. Your answers were submitted.")?;
                Ok(Some(RunOutcome::Submitted(score)))
            }
            Err(e) if e.is_illegal_transition() => {
                tracing::debug!("dropping tick: {}", e);
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn handle_line(&mut self, line: &str) -> Result<Option<RunOutcome>, QuizError> {
        if self.engine.status() == AttemptStatus::Completed {
            return self.handle_confirmation(line);
        }

        let (command, rest) = match line.split_once(' ') {
            Some((c, r)) => (c, r.trim()),
            None => (line, ""),
        };

        match command {
            "" => {}
            "h" | "help" => self.say(HELP)?,
            "l" => self.list()?,
            "n" => self.navigate(self.current + 1)?,
            "p" => self.navigate(self.current.saturating_sub(1))?,
            "g" => match rest.parse::<usize>() {
                Ok(n) if n >= 1 => self.navigate(n - 1)?,
                _ => self.say("Usage: g <question number>")?,
            },
            "t" => self.show_time()?,
            "a" => self.answer(rest)?,
            "c" => self.clear()?,
            "s" => {
                let progress = self.engine.request_submit()?;
                if progress.unanswered() > 0 {
                    self.say(format!("{} question(s) not answered.", progress.unanswered()))?;
                }
                self.say("Submit now? (y/n)")?;
            }
            "q" => return Ok(Some(RunOutcome::Quit)),
            _ => self.say("Unknown command. Type h for help.")?,
        }
        Ok(None)
    }

    fn handle_confirmation(&mut self, line: &str) -> Result<Option<RunOutcome>, QuizError> {
        match line {
            "y" | "yes" => {
                let score = self.engine.confirm_submit()?;
                Ok(Some(RunOutcome::Submitted(score)))
            }
            "n" | "no" => {
                self.engine.cancel_submit()?;
                self.say("Back to the quiz.")?;
                self.show_current()?;
                Ok(None)
            }
            "q" => Ok(Some(RunOutcome::Quit)),
            _ => {
                self.say("Submit now? (y/n)")?;
                Ok(None)
            }
        }
    }

    fn current_question(&self) -> &Question {
        &self.engine.quiz().questions[self.current]
    }

    fn navigate(&mut self, idx: usize) -> Result<(), QuizError> {
        if idx < self.engine.quiz().questions.len() {
            self.current = idx;
        }
        self.show_current()
    }

    fn show_current(&mut self) -> Result<(), QuizError> {
        let total = self.engine.quiz().questions.len();
        let q = self.current_question();
        let answer = self.engine.state().answers.get(&q.id);

        let mut text = format!(
            "\nQuestion {}/{} ({} pt{}): {}\n",
            self.current + 1,
            total,
            q.points,
            if q.points == 1 { "" } else { "s" },
            q.title
        );
        for line in &q.prompt {
            text.push_str(line);
            text.push('\n');
        }

        let selected = |id: &str| match answer {
            Some(Answer::Choice { selected }) => selected == id,
            Some(Answer::Choices { selected }) => selected.contains(id),
            _ => false,
        };
        for option in q.kind.options() {
            let mark = if selected(option.id.as_str()) { "x" } else { " " };
            text.push_str(&format!("  [{}] {}) {}\n", mark, option.id, option.text));
        }

        let hint = match &q.kind {
            QuestionKind::SingleChoice { .. } | QuestionKind::TrueFalse { .. } => {
                "Answer with: a <option>"
            }
            QuestionKind::MultiChoice { .. } => "Select all that apply: a <option>,<option>",
            QuestionKind::FreeText { .. } => "Answer with: a <text>",
        };
        text.push_str(&format!(
            "Your answer: {}\n{}",
            describe_answer(&q.kind, answer),
            hint
        ));
        self.say(text)
    }

    fn list(&mut self) -> Result<(), QuizError> {
        let mut text = String::new();
        for (i, q) in self.engine.quiz().questions.iter().enumerate() {
            let marker = if i == self.current { ">" } else { " " };
            let answer = self.engine.state().answers.get(&q.id);
            text.push_str(&format!(
                "{} {}. {} [{}]\n",
                marker,
                i + 1,
                q.title,
                describe_answer(&q.kind, answer)
            ));
        }
        let progress = self.engine.progress();
        text.push_str(&format!("{}/{} answered", progress.answered, progress.total));
        self.say(text)
    }

    fn show_time(&mut self) -> Result<(), QuizError> {
        match self.engine.state().remaining_seconds {
            Some(secs) => self.say(format!("Time remaining: {}", format_duration(secs))),
            None => self.say("This quiz has no time limit."),
        }
    }

    fn answer(&mut self, input: &str) -> Result<(), QuizError> {
        let q = self.current_question();
        let id = q.id.clone();
        let answer = parse_answer(&q.kind, input);

        match self.engine.set_answer(&id, answer) {
            Ok(()) => self.say("Saved."),
            Err(e @ AttemptError::InvalidAnswer { .. }) => self.say(format!("Rejected: {}", e)),
            Err(e) => Err(e.into()),
        }
    }

    fn clear(&mut self) -> Result<(), QuizError> {
        let id = self.current_question().id.clone();
        self.engine.clear_answer(&id)?;
        self.say("Cleared.")
    }
}

/// Turns typed input into the answer shape the question expects.
pub fn parse_answer(kind: &QuestionKind, input: &str) -> Answer {
    match kind {
        QuestionKind::SingleChoice { .. } | QuestionKind::TrueFalse { .. } => {
            Answer::choice(input.trim())
        }
        QuestionKind::MultiChoice { .. } => Answer::choices(
            input
                .split(|c: char| c == ',' || c.is_whitespace())
                .filter(|s| !s.is_empty()),
        ),
        QuestionKind::FreeText { .. } => Answer::text(input),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{NoopObserver, SystemClock};
    use crate::model::fixtures::*;
    use crate::model::QuizDefinition;

    fn run_script(
        quiz: QuizDefinition,
        events: Vec<AppEvent>,
    ) -> (RunOutcome, AttemptEngine<NoopObserver, SystemClock>, String) {
        let mut engine = AttemptEngine::with_defaults(quiz);
        engine.start().unwrap();

        let (tx, rx) = mpsc::channel();
        for ev in events {
            tx.send(ev).unwrap();
        }
        let mut out = Vec::new();
        let outcome = Runner::new(&mut engine, &mut out, tx, None).run(&rx).unwrap();
        (outcome, engine, String::from_utf8(out).unwrap())
    }

    fn input(s: &str) -> AppEvent {
        AppEvent::Input(s.to_string())
    }

    #[test]
    fn answer_and_submit() {
        let quiz = quiz(vec![single("q1", "0", 1), single("q2", "1", 1)]);
        let (outcome, engine, out) = run_script(
            quiz,
            vec![input("a 0"), input("n"), input("a 1"), input("s"), input("y")],
        );
        match outcome {
            RunOutcome::Submitted(score) => assert_eq!(score.percent, 100),
            other => panic!("expected submission, got {:?}", other),
        }
        assert_eq!(engine.status(), AttemptStatus::Submitted);
        assert!(out.contains("Question 2/2"));
        assert!(out.contains("Submit now? (y/n)"));
    }

    #[test]
    fn rejected_answer_is_reported() {
        let quiz = quiz(vec![single("q1", "0", 1)]);
        let (outcome, engine, out) = run_script(quiz, vec![input("a 9"), input("q")]);
        assert_eq!(outcome, RunOutcome::Quit);
        assert!(out.contains("Rejected: invalid answer for question 'q1'"));
        assert!(engine.state().answers.is_empty());
        assert_eq!(engine.status(), AttemptStatus::InProgress);
    }

    #[test]
    fn cancel_returns_to_questions() {
        let quiz = quiz(vec![multi("q1", &["a", "c"], 10)]);
        let (outcome, engine, out) = run_script(
            quiz,
            vec![input("s"), input("n"), input("a c, a"), input("q")],
        );
        assert_eq!(outcome, RunOutcome::Quit);
        assert!(out.contains("1 question(s) not answered."));
        assert!(out.contains("Back to the quiz."));
        assert_eq!(
            engine.state().answers.get("q1"),
            Some(&Answer::choices(["a", "c"]))
        );
    }

    #[test]
    fn ticks_time_out_the_attempt() {
        let mut quiz = quiz(vec![single("q1", "0", 1)]);
        quiz.time_limit_seconds = Some(2);
        let (outcome, engine, out) = run_script(
            quiz,
            vec![
                AppEvent::Timer(TimerEvent::Tick),
                AppEvent::Timer(TimerEvent::Tick),
                input("a 0"),
            ],
        );
        assert!(matches!(outcome, RunOutcome::Submitted(_)));
        assert!(out.contains("Warning: 1s left."));
        assert!(out.contains("Time is up."));
        assert!(engine.state().answers.is_empty());
    }

    #[test]
    fn closed_input_quits() {
        let quiz = quiz(vec![single("q1", "0", 1)]);
        let (outcome, _, _) = run_script(quiz, vec![AppEvent::InputClosed]);
        assert_eq!(outcome, RunOutcome::Quit);
    }

    #[test]
    fn parse_answer_by_kind() {
        let multi = multi("q", &["a"], 1);
        assert_eq!(parse_answer(&multi.kind, "b, a d"), Answer::choices(["a", "b", "d"]));
        let text = free_text("q", None);
        assert_eq!(parse_answer(&text.kind, "two words"), Answer::text("two words"));
        let single = single("q", "0", 1);
        assert_eq!(parse_answer(&single.kind, " 1 "), Answer::choice("1"));
    }
}
