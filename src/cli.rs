use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "quizattempt", version, about = "Take a timed quiz in the terminal")]
pub struct Cli {
    /// Path to a quiz .md file or a directory containing one [default: .]
    #[arg(default_value = ".")]
    pub path: String,

    /// Discard the saved in-progress attempt and start fresh
    #[arg(long)]
    pub clear: bool,

    /// Show progress and attempt history without starting
    #[arg(long)]
    pub status: bool,

    /// Export the in-progress answers to a file
    #[arg(long, value_name = "path")]
    pub export: Option<PathBuf>,

    /// Check the quiz file and exit
    #[arg(long)]
    pub validate: bool,

    /// Seconds that passed while away, deducted when resuming a timed attempt
    #[arg(long, value_name = "secs")]
    pub elapsed: Option<u64>,

    /// Write the final result document here
    #[arg(long, value_name = "path")]
    pub result: Option<PathBuf>,

    /// Root directory for saved attempts
    #[arg(long, value_name = "dir")]
    pub state_dir: Option<PathBuf>,

    /// Config file [default: platform config dir]/config.yaml
    #[arg(long, value_name = "file")]
    pub config: Option<PathBuf>,
}
