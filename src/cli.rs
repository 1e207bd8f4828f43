//! CLI argument parsing for troupe.
//!
//! Uses clap derive macros for declarative argument definitions.
//! This module defines the command structure; actual implementations
//! are in the `commands` module.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Troupe: round-driven orchestrator for budgeted multi-agent coding teams.
///
/// An idea is seeded onto a message bus; roles (team leader, product
/// manager, architect, engineer) react in bounded rounds under a budget
/// ceiling, and the produced artifacts are written into a project
/// directory.
#[derive(Parser, Debug)]
#[command(name = "troupe")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the configuration file.
    #[arg(long, global = true, default_value = "troupe.yaml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands for troupe.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Generate a project repository from an idea.
    ///
    /// Runs the standard four-role team against the configured generator
    /// and writes the produced artifacts under the workspace root.
    Run(RunArgs),

    /// Resume a previously saved run from its state file.
    ///
    /// Restores budget totals and round counters; roles are rebuilt from
    /// the standard team.
    Resume(ResumeArgs),

    /// Show a saved run's state summary.
    ///
    /// Prints the idea, rounds, budget totals, and recorded artifacts.
    Status(StatusArgs),
}

/// Arguments for the `run` command.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// The project idea to hand to the team.
    pub idea: String,

    /// Budget ceiling in dollars.
    #[arg(long)]
    pub investment: Option<f64>,

    /// Maximum number of rounds.
    #[arg(long)]
    pub rounds: Option<u32>,

    /// Project directory name (defaults to a slug of the idea).
    #[arg(long)]
    pub name: Option<String>,
}

/// Arguments for the `resume` command.
#[derive(Parser, Debug)]
pub struct ResumeArgs {
    /// Path to the saved team state (team.json inside the project).
    pub state_file: PathBuf,
}

/// Arguments for the `status` command.
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// Path to the saved team state (team.json inside the project).
    pub state_file: PathBuf,
}

impl Cli {
    /// Parse arguments from the process environment.
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_parses_idea_and_options() {
        let cli = Cli::try_parse_from([
            "troupe",
            "run",
            "a todo app",
            "--investment",
            "5.5",
            "--rounds",
            "6",
            "--name",
            "todo",
        ])
        .unwrap();

        match cli.command {
            Command::Run(args) => {
                assert_eq!(args.idea, "a todo app");
                assert_eq!(args.investment, Some(5.5));
                assert_eq!(args.rounds, Some(6));
                assert_eq!(args.name.as_deref(), Some("todo"));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn config_flag_is_global() {
        let cli = Cli::try_parse_from([
            "troupe",
            "run",
            "idea",
            "--config",
            "custom.yaml",
        ])
        .unwrap();
        assert_eq!(cli.config, PathBuf::from("custom.yaml"));

        let cli = Cli::try_parse_from(["troupe", "status", "team.json"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("troupe.yaml"));
    }

    #[test]
    fn resume_and_status_take_a_state_file() {
        let cli = Cli::try_parse_from(["troupe", "resume", "ws/p/team.json"]).unwrap();
        match cli.command {
            Command::Resume(args) => {
                assert_eq!(args.state_file, PathBuf::from("ws/p/team.json"));
            }
            other => panic!("unexpected command: {:?}", other),
        }

        assert!(Cli::try_parse_from(["troupe", "status"]).is_err());
    }

    #[test]
    fn missing_idea_is_a_parse_error() {
        assert!(Cli::try_parse_from(["troupe", "run"]).is_err());
    }
}
