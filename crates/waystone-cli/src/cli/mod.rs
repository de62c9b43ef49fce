//! CLI command definitions for the `waystone` binary.
//!
//! Uses clap derive macros for argument parsing. Commands follow a
//! noun-verb pattern (e.g., `waystone bench run --discs 10`).

pub mod bench;
pub mod checkpoints;

use clap::{Parser, Subcommand};
use console::style;
use waystone_core::benchmark::harness::MAX_DISC_COUNT;

use crate::state::AppState;

/// Durable workflow engine and Tower-of-Hanoi benchmark.
#[derive(Parser)]
#[command(name = "waystone", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Keep checkpoints in memory instead of the SQLite database.
    #[arg(long, global = true)]
    pub memory: bool,

    /// Export tracing spans to stdout through OpenTelemetry.
    #[arg(long, global = true, env = "WAYSTONE_OTEL")]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the Tower-of-Hanoi benchmark.
    Bench {
        #[command(subcommand)]
        action: BenchAction,
    },

    /// Show the checkpoint trail of a workflow.
    #[command(alias = "cp")]
    Checkpoints {
        /// Workflow id (benchmark runs use `maker-hanoi-<discs>`).
        workflow_id: String,

        /// Only show the most recent N checkpoints.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Print the resolved engine configuration.
    Config,
}

#[derive(Subcommand)]
pub enum BenchAction {
    /// Run a single disc count from the first move.
    Run {
        /// Number of discs (2^n - 1 steps).
        #[arg(long, short, value_parser = clap::value_parser!(u32).range(1..=i64::from(MAX_DISC_COUNT)))]
        discs: u32,
    },

    /// Run 1..=N discs, stopping at the first failure.
    Progressive {
        /// Largest disc count to attempt.
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..=i64::from(MAX_DISC_COUNT)))]
        max_discs: u32,
    },

    /// Resume an interrupted run from its latest checkpoint.
    Resume {
        /// Disc count of the run to resume.
        #[arg(long, short, value_parser = clap::value_parser!(u32).range(1..=i64::from(MAX_DISC_COUNT)))]
        discs: u32,
    },
}

/// Output flags shared by every handler.
#[derive(Debug, Clone, Copy)]
pub struct Output {
    pub json: bool,
    pub quiet: bool,
}

impl Output {
    /// Whether a live progress bar should be drawn.
    pub fn shows_progress(&self) -> bool {
        !self.json && !self.quiet
    }
}

/// Handle `waystone config`.
pub fn print_config(state: &AppState, json: bool) -> anyhow::Result<()> {
    let config = &state.config;

    if json {
        let out = serde_json::json!({
            "data_dir": state.data_dir.display().to_string(),
            "database_url": state.database_url,
            "engine": config,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    let backoff_cap = config
        .max_backoff_ms
        .map(|ms| format!("{ms} ms"))
        .unwrap_or_else(|| "uncapped".to_string());

    println!();
    println!("  {}  {}", style("Data dir:").bold(), state.data_dir.display());
    println!("  {}  {}", style("Database:").bold(), style(&state.database_url).dim());
    println!("  {}  {}", style("Max retries:").bold(), config.default_max_retries);
    println!("  {}  {}s", style("Step timeout:").bold(), config.default_step_timeout_secs);
    println!("  {}  {} ms", style("Backoff base:").bold(), config.backoff_base_ms);
    println!("  {}  {}", style("Backoff cap:").bold(), backoff_cap);
    println!();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bench_run_with_global_flags() {
        let cli = Cli::try_parse_from(["waystone", "bench", "run", "--discs", "10", "--json", "--memory"]).unwrap();
        assert!(cli.json);
        assert!(cli.memory);
        assert!(matches!(
            cli.command,
            Commands::Bench {
                action: BenchAction::Run { discs: 10 }
            }
        ));
    }

    #[test]
    fn parses_progressive_and_resume() {
        let cli = Cli::try_parse_from(["waystone", "bench", "progressive", "--max-discs", "12"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Bench {
                action: BenchAction::Progressive { max_discs: 12 }
            }
        ));

        let cli = Cli::try_parse_from(["waystone", "-vv", "bench", "resume", "-d", "4"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(matches!(
            cli.command,
            Commands::Bench {
                action: BenchAction::Resume { discs: 4 }
            }
        ));
    }

    #[test]
    fn parses_checkpoints_alias() {
        let cli = Cli::try_parse_from(["waystone", "cp", "maker-hanoi-3", "--limit", "5"]).unwrap();
        match cli.command {
            Commands::Checkpoints { workflow_id, limit } => {
                assert_eq!(workflow_id, "maker-hanoi-3");
                assert_eq!(limit, Some(5));
            }
            _ => panic!("expected checkpoints command"),
        }
    }

    #[test]
    fn discs_is_required() {
        assert!(Cli::try_parse_from(["waystone", "bench", "run"]).is_err());
    }

    #[test]
    fn disc_counts_out_of_range_are_rejected_at_parse() {
        for args in [
            ["waystone", "bench", "progressive", "--max-discs", "4000000000"],
            ["waystone", "bench", "progressive", "--max-discs", "31"],
            ["waystone", "bench", "run", "--discs", "0"],
            ["waystone", "bench", "resume", "--discs", "31"],
        ] {
            assert!(Cli::try_parse_from(args).is_err(), "accepted {args:?}");
        }
        assert!(Cli::try_parse_from(["waystone", "bench", "progressive", "--max-discs", "30"]).is_ok());
    }

    #[test]
    fn progress_hidden_for_json_and_quiet() {
        assert!(Output { json: false, quiet: false }.shows_progress());
        assert!(!Output { json: true, quiet: false }.shows_progress());
        assert!(!Output { json: false, quiet: true }.shows_progress());
    }
}
