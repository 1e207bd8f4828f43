//! Error types for troupe.
//!
//! Uses thiserror for derive macros. Errors fall into two classes: invariant
//! violations (budget, identity, acyclicity, recovery) that always propagate
//! to the top-level caller, and per-reaction failures that the role layer
//! reifies as error messages so the round loop keeps making progress. Only
//! the first class appears here; see [`crate::role::Role::act`] for the
//! second.

use crate::exit_codes;
use crate::generator::GeneratorError;
use crate::workspace::WorkspaceError;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for troupe operations.
///
/// Each variant maps to an exit code in [`crate::exit_codes`].
#[derive(Error, Debug)]
pub enum TroupeError {
    /// The cost ledger reached its ceiling. Fatal to the round loop; the
    /// round that would have exceeded the budget never starts.
    #[error("budget exceeded: ${total:.2} >= ${ceiling:.2} after {rounds} round(s)")]
    BudgetExceeded {
        /// Ledger total at the time the ceiling was hit.
        total: f64,
        /// Configured ceiling.
        ceiling: f64,
        /// Rounds completed before the check failed.
        rounds: u32,
    },

    /// A generator call failed at a setup seam (outside a role reaction).
    #[error("generator error: {0}")]
    Generator(#[from] GeneratorError),

    /// A workspace operation failed.
    #[error("workspace error: {0}")]
    Workspace(#[from] WorkspaceError),

    /// Topological propagation stalled with Pending nodes remaining:
    /// a dependency cycle or a dependency on an unknown node id.
    #[error("dependency graph is unsatisfiable; pending nodes: {}", .pending.join(", "))]
    GraphUnsatisfiable {
        /// Node ids that could never be scheduled.
        pending: Vec<String>,
    },

    /// Two roles with the same name were registered into one environment.
    #[error("duplicate role name '{0}': role names are the routing identity")]
    DuplicateRole(String),

    /// A routing table maps a cause onto a role that is not registered.
    #[error("routing table maps '{cause}' to unknown role '{target}'")]
    UnknownRoutingTarget {
        /// The `caused_by` key being routed.
        cause: String,
        /// The missing role name.
        target: String,
    },

    /// `run_round` was invoked while a round was already in progress.
    #[error("a round is already in progress; concurrent rounds are not allowed")]
    RoundInProgress,

    /// The team state file to recover from does not exist.
    #[error("recovery file '{}' does not exist", .0.display())]
    RecoveryFileMissing(PathBuf),

    /// Invalid configuration value or unreadable config file.
    #[error("configuration error: {0}")]
    Config(String),

    /// Team state could not be serialized or deserialized.
    #[error("persistence error: {0}")]
    Persistence(String),
}

impl TroupeError {
    /// Returns the appropriate exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            TroupeError::BudgetExceeded { .. } => exit_codes::BUDGET_FAILURE,
            TroupeError::Generator(_) => exit_codes::GENERATOR_FAILURE,
            TroupeError::Workspace(_) => exit_codes::WORKSPACE_FAILURE,
            TroupeError::GraphUnsatisfiable { .. } => exit_codes::SCHEDULING_FAILURE,
            TroupeError::DuplicateRole(_) => exit_codes::USER_ERROR,
            TroupeError::UnknownRoutingTarget { .. } => exit_codes::SCHEDULING_FAILURE,
            TroupeError::RoundInProgress => exit_codes::SCHEDULING_FAILURE,
            TroupeError::RecoveryFileMissing(_) => exit_codes::USER_ERROR,
            TroupeError::Config(_) => exit_codes::USER_ERROR,
            TroupeError::Persistence(_) => exit_codes::USER_ERROR,
        }
    }
}

/// Result type alias for troupe operations.
pub type Result<T> = std::result::Result<T, TroupeError>;
