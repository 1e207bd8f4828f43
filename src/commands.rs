//! Command implementations for the troupe CLI.

use crate::cli::{Command, ResumeArgs, RunArgs, StatusArgs};
use crate::company;
use crate::config::Config;
use crate::error::Result;
use crate::team::Team;
use std::path::Path;

/// Dispatch a parsed command.
pub fn dispatch(config_path: &Path, command: Command) -> Result<()> {
    let config = Config::load(config_path)?;
    match command {
        Command::Run(args) => run(&config, args),
        Command::Resume(args) => resume(&config, args),
        Command::Status(args) => status(args),
    }
}

fn run(config: &Config, args: RunArgs) -> Result<()> {
    let investment = args.investment.unwrap_or(config.default_investment);
    let rounds = args.rounds.unwrap_or(config.default_max_rounds);

    let repo = company::generate_repo_with_config(
        config,
        &args.idea,
        investment,
        rounds,
        args.name.as_deref(),
    )?;

    print_report(&repo);
    Ok(())
}

fn resume(config: &Config, args: ResumeArgs) -> Result<()> {
    let repo = company::resume_repo(config, &args.state_file)?;
    print_report(&repo);
    Ok(())
}

fn status(args: StatusArgs) -> Result<()> {
    let state = Team::load_state(&args.state_file)?;

    println!("idea:       {}", state.idea);
    println!("rounds:     {}/{}", state.current_round, state.max_rounds);
    println!(
        "budget:     ${:.2} spent of ${:.2}",
        state.context_snapshot.total_cost, state.investment
    );
    println!("roles:      {}", state.role_names.join(", "));
    if state.context_snapshot.artifacts.is_empty() {
        println!("artifacts:  (none)");
    } else {
        println!("artifacts:");
        for (key, content) in &state.context_snapshot.artifacts {
            let preview: String = content.chars().take(60).collect();
            println!("  {}: {} ({} chars)", key, preview, content.chars().count());
        }
    }
    Ok(())
}

fn print_report(repo: &company::GeneratedRepo) {
    println!(
        "{} after {} round(s), ${:.2} spent",
        repo.report.outcome, repo.report.rounds, repo.report.total_cost
    );
    for key in repo.report.artifacts.keys() {
        println!("  artifact: {}", key);
    }
    println!("project: {}", repo.project_path.display());
}
