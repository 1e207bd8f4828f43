//! Standard software team and the repo-generation entry point.
//!
//! Wires the canonical four-role pipeline:
//!
//! ```text
//! idea -> TeamLeader (write-plan) -> ProductManager (write-prd)
//!      -> Architect (write-design) -> Engineer (write-code, terminal)
//! ```
//!
//! and exposes [`generate_repo`]: one call that builds the default
//! generator and workspace from configuration, invests, runs the team, and
//! materializes the produced artifacts into a project directory.

use crate::action::PromptAction;
use crate::config::Config;
use crate::context::TeamContext;
use crate::environment::{Environment, RoutingTable};
use crate::error::{Result, TroupeError};
use crate::extract::extract_code_blocks;
use crate::generator::{CommandGenerator, Generator};
use crate::role::{Role, SelectionRule};
use crate::schema::USER_REQUIREMENT;
use crate::team::{RunReport, Team};
use crate::transcript::{TRANSCRIPT_FILE, TranscriptWriter};
use crate::workspace::{LocalWorkspace, Workspace};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Default config filename looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "troupe.yaml";

/// Filename of the persisted team state inside a project directory.
pub const STATE_FILE: &str = "team.json";

/// Role that receives the seed message.
pub const ENTRY_ROLE: &str = "TeamLeader";

/// Result of [`generate_repo`]: where the project landed and how the run
/// ended.
#[derive(Debug, Clone)]
pub struct GeneratedRepo {
    /// Absolute path of the project directory.
    pub project_path: PathBuf,
    /// Terminal state, rounds, and cost of the run.
    pub report: RunReport,
}

/// The canonical `caused_by` → target routing for the four-role team.
///
/// `write-code` is deliberately unmapped: its absence makes the engineer's
/// output the terminal artifact, recorded under the `code` key.
pub fn standard_routes() -> RoutingTable {
    RoutingTable::new()
        .route("write-plan", "ProductManager")
        .route("write-prd", "Architect")
        .route("write-design", "Engineer")
}

/// Build the standard four roles with capacities from `config`.
pub fn standard_team(config: &Config) -> Vec<Role> {
    let sized = |role: Role| {
        role.with_inbox_capacity(config.inbox_capacity)
            .with_memory_capacity(config.memory_capacity)
    };

    let team_leader = sized(
        Role::new(
            "TeamLeader",
            "Team Leader",
            "Turn a raw idea into a concrete kickoff plan for the team",
        )
        .watch(USER_REQUIREMENT)
        .with_action(Box::new(PromptAction::new(
            "write-plan",
            "You are a team leader coordinating a small software team.",
            "A new project idea has arrived:\n\n{context}\n\n\
             Write a short kickoff plan: restate the idea, list the major \
             deliverables, and call out risks the team should watch.",
        )))
        .with_rule(SelectionRule::for_action("write-plan").on_cause(USER_REQUIREMENT)),
    );

    let product_manager = sized(
        Role::new(
            "ProductManager",
            "Product Manager",
            "Create a comprehensive PRD from the kickoff plan",
        )
        .watch(USER_REQUIREMENT)
        .watch("write-plan")
        .with_action(Box::new(PromptAction::new(
            "write-prd",
            "You are a product manager. Write precise, testable requirements.",
            "Based on the following input, write a detailed PRD:\n\n{context}\n\n\
             Include: product overview, user stories, functional requirements, \
             non-functional requirements, and success metrics.",
        )))
        .with_rule(SelectionRule::for_action("write-prd").on_cause("write-plan"))
        .with_rule(
            SelectionRule::for_action("write-prd")
                .on_cause(USER_REQUIREMENT)
                .on_keyword("requirement")
                .on_keyword("idea"),
        ),
    );

    let architect = sized(
        Role::new(
            "Architect",
            "Software Architect",
            "Design the system that satisfies the PRD",
        )
        .watch("write-prd")
        .with_action(Box::new(PromptAction::new(
            "write-design",
            "You are a software architect. Favor simple, buildable designs.",
            "Based on the following PRD, write a system design:\n\n{context}\n\n\
             Include: architecture overview, component breakdown, data model, \
             and the interfaces between components.",
        )))
        .with_rule(
            SelectionRule::for_action("write-design")
                .on_cause("write-prd")
                .on_keyword("prd")
                .on_keyword("product requirement"),
        ),
    );

    let engineer = sized(
        Role::new(
            "Engineer",
            "Software Engineer",
            "Implement the design as working code",
        )
        .watch("write-design")
        .with_action(Box::new(PromptAction::new(
            "write-code",
            "You are a software engineer. Output complete files in fenced code \
             blocks; start each block with a `# filename: ...` comment line.",
            "Implement the following design as code:\n\n{context}",
        )))
        .with_rule(
            SelectionRule::for_action("write-code")
                .on_cause("write-design")
                .on_keyword("design")
                .on_keyword("architecture"),
        ),
    );

    vec![team_leader, product_manager, architect, engineer]
}

/// Assemble a team over the given collaborators.
pub fn build_team(
    config: &Config,
    generator: Arc<dyn Generator>,
    workspace: Arc<dyn Workspace>,
) -> Result<Team> {
    let transcript_path = config
        .transcript
        .then(|| workspace.root().join(TRANSCRIPT_FILE));

    let context = Arc::new(
        TeamContext::new(config.clone())
            .with_generator(generator)
            .with_workspace(workspace),
    );
    let mut environment = Environment::new(context).with_routes(standard_routes());
    if let Some(path) = transcript_path {
        environment.attach_transcript(TranscriptWriter::new(path));
    }

    let mut team = Team::new(environment, ENTRY_ROLE);
    team.hire(standard_team(config))?;
    Ok(team)
}

/// Generate a project repository from an idea, end to end.
///
/// Loads `troupe.yaml` from the working directory (defaults apply when the
/// file is absent), wires the configured command generator and a local
/// workspace, runs the standard team, materializes artifacts, persists the
/// team state, and returns the project path with the run report. Budget
/// exhaustion propagates as [`TroupeError::BudgetExceeded`].
pub fn generate_repo(
    idea: &str,
    investment: f64,
    max_rounds: u32,
    project_name: Option<&str>,
) -> Result<GeneratedRepo> {
    let config = Config::load(DEFAULT_CONFIG_FILE)?;
    generate_repo_with_config(&config, idea, investment, max_rounds, project_name)
}

/// [`generate_repo`] with an explicit configuration.
pub fn generate_repo_with_config(
    config: &Config,
    idea: &str,
    investment: f64,
    max_rounds: u32,
    project_name: Option<&str>,
) -> Result<GeneratedRepo> {
    if config.generator_command.is_empty() {
        return Err(TroupeError::Config(
            "no generator_command configured; set it in troupe.yaml".to_string(),
        ));
    }
    let generator: Arc<dyn Generator> = Arc::new(CommandGenerator::new(&config.generator_command)?);

    let slug = project_slug(project_name.unwrap_or(idea));
    let project_path = Path::new(&config.workspace_root).join(&slug);
    let workspace = Arc::new(LocalWorkspace::create(&project_path)?);

    let mut team = build_team(config, generator, Arc::clone(&workspace) as Arc<dyn Workspace>)?;
    team.invest(investment);
    let report = team.run(idea, max_rounds)?;

    materialize_project(workspace.as_ref(), &slug, idea, &report)?;
    team.save(project_path.join(STATE_FILE))?;

    Ok(GeneratedRepo {
        project_path,
        report,
    })
}

/// Resume a previously saved run from its state file.
///
/// The project directory is the state file's parent; roles are re-supplied
/// from the standard team and the run continues under the restored round
/// and cost counters.
pub fn resume_repo(config: &Config, state_path: &Path) -> Result<GeneratedRepo> {
    if config.generator_command.is_empty() {
        return Err(TroupeError::Config(
            "no generator_command configured; set it in troupe.yaml".to_string(),
        ));
    }
    let generator: Arc<dyn Generator> = Arc::new(CommandGenerator::new(&config.generator_command)?);

    let project_path = state_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let workspace = Arc::new(LocalWorkspace::create(&project_path)?);

    let transcript_path = config
        .transcript
        .then(|| workspace.root().join(TRANSCRIPT_FILE));
    let context = Arc::new(
        TeamContext::new(config.clone())
            .with_generator(generator)
            .with_workspace(Arc::clone(&workspace) as Arc<dyn Workspace>),
    );
    let mut environment = Environment::new(context).with_routes(standard_routes());
    if let Some(path) = transcript_path {
        environment.attach_transcript(TranscriptWriter::new(path));
    }
    for role in standard_team(config) {
        environment.add_role(role)?;
    }

    let mut team = Team::recover(state_path, environment, ENTRY_ROLE)?;
    let idea = team.idea().to_string();
    let max_rounds = team.max_rounds();
    let report = team.run(&idea, max_rounds)?;

    let slug = project_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "project".to_string());
    materialize_project(workspace.as_ref(), &slug, &idea, &report)?;
    team.save(state_path)?;

    Ok(GeneratedRepo {
        project_path,
        report,
    })
}

/// Write the run's artifacts into the project directory.
///
/// Always writes a README carrying the idea and outcome; when the run
/// completed, also writes the PRD and design under `docs/` and splits the
/// code artifact into files (filename hints win; unnamed blocks fall back
/// to `main.<ext>`, numbered when there are several).
pub fn materialize_project(
    workspace: &dyn Workspace,
    project: &str,
    idea: &str,
    report: &RunReport,
) -> Result<Vec<String>> {
    let mut written = Vec::new();

    let mut readme = format!("# {}\n\n{}\n", project, idea);
    readme.push_str(&format!(
        "\nGenerated by a {} run in {} round(s) at a cost of ${:.2}.\n",
        report.outcome, report.rounds, report.total_cost
    ));
    workspace.write_file("README.md", &readme)?;
    written.push("README.md".to_string());

    if let Some(prd) = report.artifacts.get("prd") {
        workspace.write_file("docs/prd.md", prd)?;
        written.push("docs/prd.md".to_string());
    }
    if let Some(design) = report.artifacts.get("design") {
        workspace.write_file("docs/design.md", design)?;
        written.push("docs/design.md".to_string());
    }

    if let Some(code) = report.artifacts.get("code") {
        let blocks = extract_code_blocks(code);
        if blocks.is_empty() {
            workspace.write_file("main.txt", code.trim())?;
            written.push("main.txt".to_string());
        } else {
            let unnamed = blocks.iter().filter(|b| b.filename.is_none()).count();
            let mut unnamed_index = 0usize;
            for block in &blocks {
                let rel_path = match &block.filename {
                    Some(name) => name.clone(),
                    None => {
                        unnamed_index += 1;
                        if unnamed > 1 {
                            format!("main_{}.{}", unnamed_index, block.extension())
                        } else {
                            format!("main.{}", block.extension())
                        }
                    }
                };
                workspace.write_file(&rel_path, &block.code)?;
                written.push(rel_path);
            }
        }
    }

    Ok(written)
}

/// Slugify a project name for use as a directory name.
///
/// Lowercase alphanumerics with single hyphens, capped at 50 characters,
/// `project` as the fallback for empty input.
pub fn project_slug(name: &str) -> String {
    let mut slug = String::new();
    let mut last_was_hyphen = false;

    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_was_hyphen = false;
        } else if !last_was_hyphen && !slug.is_empty() {
            slug.push('-');
            last_was_hyphen = true;
        }
        if slug.len() >= 50 {
            break;
        }
    }

    while slug.ends_with('-') {
        slug.pop();
    }

    if slug.is_empty() {
        slug = "project".to_string();
    }
    slug
}
