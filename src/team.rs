//! Round-driven team orchestration.
//!
//! A [`Team`] owns one environment and drives it through bounded rounds:
//! seed the idea to the entry role, then for each round check cancellation,
//! check the budget (a round that would exceed the ceiling never starts),
//! run the round, and stop as soon as a terminal artifact appears. The
//! outcome is always reported with the round count and total cost, on
//! success and failure paths alike.

use crate::context::{ContextSnapshot, TeamContext};
use crate::environment::Environment;
use crate::error::{Result, TroupeError};
use crate::role::Role;
use crate::schema::{Message, USER_REQUIREMENT};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Role name attributed to the seed message.
const SEED_ROLE: &str = "User";

/// Terminal state of a run. Budget exhaustion is the error path
/// ([`TroupeError::BudgetExceeded`]) and deliberately absent here: it must
/// surface to the caller, never be returned as a quiet outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeamOutcome {
    /// A terminal artifact was produced.
    Completed,
    /// The round limit was reached with work still pending.
    Exhausted,
    /// The bus went idle with no terminal artifact produced.
    Idle,
    /// The caller cancelled between rounds.
    Cancelled,
}

impl fmt::Display for TeamOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TeamOutcome::Completed => write!(f, "completed"),
            TeamOutcome::Exhausted => write!(f, "exhausted"),
            TeamOutcome::Idle => write!(f, "idle"),
            TeamOutcome::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// What a finished run looked like.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Which terminal state was reached.
    pub outcome: TeamOutcome,
    /// Rounds completed.
    pub rounds: u32,
    /// Ledger total at the end of the run.
    pub total_cost: f64,
    /// The accumulated shared-context artifacts.
    pub artifacts: BTreeMap<String, String>,
}

/// Handle for cancelling a run from outside the round loop.
///
/// Cancellation is checked at the top of each round: a round either
/// completes in full or never starts, so partial round state cannot leak.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    /// Request cancellation at the next round boundary.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Persisted team state for recovery.
///
/// Roles hold live collaborator bindings and are not serialized; only
/// their names are, and the caller re-supplies the role objects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamState {
    /// The original idea text.
    pub idea: String,
    /// Budget ceiling at save time.
    pub investment: f64,
    /// Rounds completed at save time.
    pub current_round: u32,
    /// Configured round limit.
    pub max_rounds: u32,
    /// Names of the registered roles, in registration order.
    pub role_names: Vec<String>,
    /// Ledger totals and accumulated artifacts.
    pub context_snapshot: ContextSnapshot,
}

/// The round-driven orchestrator.
pub struct Team {
    environment: Environment,
    entry_role: String,
    idea: String,
    max_rounds: u32,
    current_round: u32,
    cancel: CancelHandle,
}

impl std::fmt::Debug for Team {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Team")
            .field("entry_role", &self.entry_role)
            .field("idea", &self.idea)
            .field("max_rounds", &self.max_rounds)
            .field("current_round", &self.current_round)
            .field("cancel", &self.cancel)
            .finish_non_exhaustive()
    }
}

impl Team {
    /// Create a team over an environment, naming the role that receives
    /// the seed message.
    pub fn new(environment: Environment, entry_role: impl Into<String>) -> Self {
        let max_rounds = environment.context().config().default_max_rounds;
        Self {
            environment,
            entry_role: entry_role.into(),
            idea: String::new(),
            max_rounds,
            current_round: 0,
            cancel: CancelHandle::default(),
        }
    }

    /// Register a set of roles.
    pub fn hire(&mut self, roles: Vec<Role>) -> Result<()> {
        for role in roles {
            self.environment.add_role(role)?;
        }
        Ok(())
    }

    /// Set the budget ceiling.
    pub fn invest(&self, amount: f64) {
        self.environment.context().invest(amount);
    }

    /// The owned environment.
    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    /// Mutable access to the owned environment (setup only).
    pub fn environment_mut(&mut self) -> &mut Environment {
        &mut self.environment
    }

    /// The shared context handle.
    pub fn context(&self) -> &Arc<TeamContext> {
        self.environment.context()
    }

    /// The idea this team is working on.
    pub fn idea(&self) -> &str {
        &self.idea
    }

    /// Rounds completed so far.
    pub fn current_round(&self) -> u32 {
        self.current_round
    }

    /// Configured round limit.
    pub fn max_rounds(&self) -> u32 {
        self.max_rounds
    }

    /// A handle that cancels this run at the next round boundary.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Drive the team until a terminal state.
    ///
    /// Publishes the idea to the entry role, then loops:
    /// cancellation check, budget check (before the round, so a run over
    /// budget never starts another round), round, terminal-artifact check.
    /// A recovered team continues from its restored round counter rather
    /// than starting over.
    pub fn run(&mut self, idea: &str, max_rounds: u32) -> Result<RunReport> {
        self.idea = idea.to_string();
        self.max_rounds = max_rounds;
        self.environment.validate_routes()?;

        let seed = Message::new(idea, SEED_ROLE, USER_REQUIREMENT);
        let entry_role = self.entry_role.clone();
        self.environment.publish(seed, Some(&entry_role));

        let mut outcome = TeamOutcome::Exhausted;
        while self.current_round < self.max_rounds {
            if self.cancel.is_cancelled() {
                outcome = TeamOutcome::Cancelled;
                break;
            }
            if self.context().budget_exhausted() {
                return Err(TroupeError::BudgetExceeded {
                    total: self.context().total_cost(),
                    ceiling: self.context().ceiling(),
                    rounds: self.current_round,
                });
            }
            if self.environment.is_idle() {
                outcome = TeamOutcome::Idle;
                break;
            }

            self.environment.run_round()?;
            self.current_round += 1;

            if !self.environment.terminal_keys().is_empty() {
                outcome = TeamOutcome::Completed;
                break;
            }
        }

        Ok(self.report(outcome))
    }

    fn report(&self, outcome: TeamOutcome) -> RunReport {
        RunReport {
            outcome,
            rounds: self.current_round,
            total_cost: self.context().total_cost(),
            artifacts: self.context().artifacts(),
        }
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Save team state as a single JSON record.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let state = TeamState {
            idea: self.idea.clone(),
            investment: self.context().ceiling(),
            current_round: self.current_round,
            max_rounds: self.max_rounds,
            role_names: self.environment.role_names().to_vec(),
            context_snapshot: self.context().snapshot(),
        };

        let json = serde_json::to_string_pretty(&state).map_err(|e| {
            TroupeError::Persistence(format!("failed to serialize team state: {}", e))
        })?;

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                TroupeError::Persistence(format!(
                    "failed to create state directory '{}': {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        std::fs::write(path, json).map_err(|e| {
            TroupeError::Persistence(format!(
                "failed to write team state '{}': {}",
                path.display(),
                e
            ))
        })
    }

    /// Load a persisted state record.
    pub fn load_state(path: impl AsRef<Path>) -> Result<TeamState> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(TroupeError::RecoveryFileMissing(path.to_path_buf()));
        }

        let raw = std::fs::read_to_string(path).map_err(|e| {
            TroupeError::Persistence(format!(
                "failed to read team state '{}': {}",
                path.display(),
                e
            ))
        })?;

        serde_json::from_str(&raw).map_err(|e| {
            TroupeError::Persistence(format!(
                "malformed team state '{}': {}",
                path.display(),
                e
            ))
        })
    }

    /// Reconstruct a team from a saved state record.
    ///
    /// `environment` must already carry the re-supplied roles (live role
    /// objects are never serialized); every persisted role name must be
    /// present. Ledger totals, the ceiling, artifacts, and the round
    /// counters are restored from the record.
    pub fn recover(
        path: impl AsRef<Path>,
        environment: Environment,
        entry_role: impl Into<String>,
    ) -> Result<Self> {
        let state = Self::load_state(path)?;

        for name in &state.role_names {
            if environment.role(name).is_none() {
                return Err(TroupeError::Persistence(format!(
                    "recovered state names role '{}' but it was not re-supplied",
                    name
                )));
            }
        }

        environment.context().restore(&state.context_snapshot);

        Ok(Self {
            environment,
            entry_role: entry_role.into(),
            idea: state.idea,
            max_rounds: state.max_rounds,
            current_round: state.current_round,
            cancel: CancelHandle::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{Action, ActionContext, ActionError};
    use crate::config::Config;
    use crate::environment::RoutingTable;
    use crate::schema::ActionOutput;
    use tempfile::TempDir;

    struct Emit(&'static str, &'static str);

    impl Action for Emit {
        fn tag(&self) -> &str {
            self.0
        }

        fn execute(
            &self,
            _ctx: &ActionContext<'_>,
            messages: &[Message],
        ) -> std::result::Result<ActionOutput, ActionError> {
            let latest = messages.last().map(|m| m.content.as_str()).unwrap_or("");
            Ok(ActionOutput::new(format!("{}({})", self.1, latest)))
        }
    }

    /// Emits and also charges the ledger, for budget tests.
    struct Charging(&'static str);

    impl Action for Charging {
        fn tag(&self) -> &str {
            self.0
        }

        fn execute(
            &self,
            ctx: &ActionContext<'_>,
            _messages: &[Message],
        ) -> std::result::Result<ActionOutput, ActionError> {
            let _ = ctx.team().record_call_cost(ctx.role(), self.0, "p", "r");
            Ok(ActionOutput::new("charged"))
        }
    }

    fn pipeline_team() -> Team {
        let context = Arc::new(TeamContext::new(Config::default()));
        let environment = Environment::new(context).with_routes(
            RoutingTable::new().route("req", "B").route("spec", "C"),
        );
        let mut team = Team::new(environment, "A");
        team.hire(vec![
            Role::new("A", "analyst", "requirements").with_action(Box::new(Emit("req", "REQ"))),
            Role::new("B", "designer", "specs").with_action(Box::new(Emit("spec", "SPEC"))),
            Role::new("C", "builder", "final output")
                .with_action(Box::new(Emit("write-final", "FINAL"))),
        ])
        .unwrap();
        team
    }

    #[test]
    fn three_stage_pipeline_completes_within_round_budget() {
        let mut team = pipeline_team();
        let report = team.run("one idea", 5).unwrap();

        assert_eq!(report.outcome, TeamOutcome::Completed);
        assert!(report.rounds <= 3, "took {} rounds", report.rounds);
        assert_eq!(
            report.artifacts.get("final").unwrap(),
            "FINAL(SPEC(REQ(one idea)))"
        );
    }

    #[test]
    fn unknown_entry_role_goes_idle() {
        let context = Arc::new(TeamContext::new(Config::default()));
        let environment = Environment::new(context);
        let mut team = Team::new(environment, "Ghost");
        team.hire(vec![
            Role::new("A", "p", "g").with_action(Box::new(Emit("req", "R"))),
        ])
        .unwrap();

        let report = team.run("idea", 5).unwrap();
        assert_eq!(report.outcome, TeamOutcome::Idle);
        assert_eq!(report.rounds, 0);
        // The seed still entered history exactly once.
        assert_eq!(team.environment().history().len(), 1);
    }

    #[test]
    fn round_limit_reports_exhausted() {
        // A's output broadcasts back to itself forever via the watch set.
        let context = Arc::new(TeamContext::new(Config::default()));
        let environment =
            Environment::new(context).with_routes(RoutingTable::new().route("ping", "A"));
        let mut team = Team::new(environment, "A");
        team.hire(vec![
            Role::new("A", "p", "g").with_action(Box::new(Emit("ping", "P"))),
        ])
        .unwrap();

        let report = team.run("idea", 3).unwrap();
        assert_eq!(report.outcome, TeamOutcome::Exhausted);
        assert_eq!(report.rounds, 3);
    }

    #[test]
    fn budget_check_stops_before_the_round_starts() {
        let mut config = Config::default();
        config.flat_rate_cost = 1.0;
        let context = Arc::new(TeamContext::new(config));
        let environment =
            Environment::new(context).with_routes(RoutingTable::new().route("loop", "A"));
        let mut team = Team::new(environment, "A");
        team.hire(vec![
            Role::new("A", "p", "g").with_action(Box::new(Charging("loop"))),
        ])
        .unwrap();
        team.invest(1.0);

        // Round 1 spends the whole budget; round 2 must never start.
        let err = team.run("idea", 10).unwrap_err();
        match err {
            TroupeError::BudgetExceeded {
                total,
                ceiling,
                rounds,
            } => {
                assert!((total - 1.0).abs() < f64::EPSILON);
                assert!((ceiling - 1.0).abs() < f64::EPSILON);
                assert_eq!(rounds, 1);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn cancellation_is_honored_at_the_round_boundary() {
        let mut team = pipeline_team();
        team.cancel_handle().cancel();

        let report = team.run("idea", 5).unwrap();
        assert_eq!(report.outcome, TeamOutcome::Cancelled);
        assert_eq!(report.rounds, 0);
    }

    #[test]
    fn dangling_route_is_rejected_at_run_start() {
        let context = Arc::new(TeamContext::new(Config::default()));
        let environment =
            Environment::new(context).with_routes(RoutingTable::new().route("req", "Missing"));
        let mut team = Team::new(environment, "A");
        team.hire(vec![
            Role::new("A", "p", "g").with_action(Box::new(Emit("req", "R"))),
        ])
        .unwrap();

        let err = team.run("idea", 5).unwrap_err();
        assert!(matches!(err, TroupeError::UnknownRoutingTarget { .. }));
    }

    #[test]
    fn save_and_recover_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let state_path = temp_dir.path().join("state").join("team.json");

        let mut team = pipeline_team();
        team.invest(7.5);
        let report = team.run("persisted idea", 5).unwrap();
        assert_eq!(report.outcome, TeamOutcome::Completed);
        team.save(&state_path).unwrap();

        // Re-supply equivalent roles in a fresh environment.
        let context = Arc::new(TeamContext::new(Config::default()));
        let mut environment = Environment::new(context).with_routes(
            RoutingTable::new().route("req", "B").route("spec", "C"),
        );
        for (name, profile) in [("A", "analyst"), ("B", "designer"), ("C", "builder")] {
            environment
                .add_role(Role::new(name, profile, "goal").with_action(Box::new(Emit("x", "X"))))
                .unwrap();
        }

        let recovered = Team::recover(&state_path, environment, "A").unwrap();
        assert_eq!(recovered.idea(), "persisted idea");
        assert_eq!(recovered.current_round(), team.current_round());
        assert!((recovered.context().ceiling() - 7.5).abs() < f64::EPSILON);
        assert!(
            (recovered.context().total_cost() - team.context().total_cost()).abs() < f64::EPSILON
        );
        assert_eq!(
            recovered.context().artifact("final"),
            team.context().artifact("final")
        );
    }

    #[test]
    fn recovery_requires_all_roles_resupplied() {
        let temp_dir = TempDir::new().unwrap();
        let state_path = temp_dir.path().join("team.json");

        let mut team = pipeline_team();
        team.run("idea", 5).unwrap();
        team.save(&state_path).unwrap();

        let context = Arc::new(TeamContext::new(Config::default()));
        let mut environment = Environment::new(context);
        environment
            .add_role(Role::new("A", "p", "g").with_action(Box::new(Emit("x", "X"))))
            .unwrap();

        let err = Team::recover(&state_path, environment, "A").unwrap_err();
        assert!(err.to_string().contains("not re-supplied"));
    }

    #[test]
    fn recovery_from_missing_file_is_explicit() {
        let temp_dir = TempDir::new().unwrap();
        let context = Arc::new(TeamContext::new(Config::default()));
        let environment = Environment::new(context);

        let err =
            Team::recover(temp_dir.path().join("absent.json"), environment, "A").unwrap_err();
        assert!(matches!(err, TroupeError::RecoveryFileMissing(_)));
    }

    #[test]
    fn duplicate_hire_is_rejected() {
        let context = Arc::new(TeamContext::new(Config::default()));
        let environment = Environment::new(context);
        let mut team = Team::new(environment, "A");

        let err = team
            .hire(vec![
                Role::new("A", "p", "g"),
                Role::new("A", "p2", "g2"),
            ])
            .unwrap_err();
        assert!(matches!(err, TroupeError::DuplicateRole(_)));
    }
}
