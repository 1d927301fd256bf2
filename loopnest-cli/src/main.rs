// CLI application
use clap::{Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use loopnest_core::OptimizationLevel;
use std::path::PathBuf;

mod commands;

use commands::{analyze_module, licm_module};

#[derive(Parser)]
#[command(name = "loopnest")]
#[command(about = "Loop nest discovery and loop-invariant code motion")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Print the loop structure of every function in a module
    Analyze {
        /// Path to the module (JSON)
        #[arg(short, long)]
        input: PathBuf,

        /// Emit per-block rows as JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Hoist loop-invariant code out of every function in a module
    Licm {
        /// Path to the module (JSON)
        #[arg(short, long)]
        input: PathBuf,

        /// Where to write the transformed module (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Optimization level
        #[arg(long, value_enum, default_value_t = Level::Aggressive)]
        level: Level,

        /// Skip structural validation before and after the transform
        #[arg(long)]
        no_verify: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Level {
    None,
    Analyze,
    Aggressive,
}

impl From<Level> for OptimizationLevel {
    fn from(level: Level) -> Self {
        match level {
            Level::None => OptimizationLevel::None,
            Level::Analyze => OptimizationLevel::Analyze,
            Level::Aggressive => OptimizationLevel::Aggressive,
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Analyze { input, json } => {
            analyze_module(&input, json)?;
        }
        Commands::Licm {
            input,
            output,
            level,
            no_verify,
        } => {
            let pb = create_progress_bar("Hoisting loop-invariant code...");
            let result = licm_module(&input, output.as_deref(), level.into(), !no_verify, &pb);
            match result {
                Ok(_) => pb.finish_with_message("Code motion complete"),
                Err(_) => pb.abandon_with_message("Code motion failed"),
            }
            result?;
        }
    }

    Ok(())
}

fn create_progress_bar(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]));
    }
    pb.set_message(message.to_string());
    pb
}
