//! Exit code constants for the troupe CLI.
//!
//! - 0: Success
//! - 1: User error (bad args, invalid configuration, duplicate roles)
//! - 2: Budget exceeded (the run was aborted by the cost ceiling)
//! - 3: Generator failure (external completion backend unavailable or broken)
//! - 4: Workspace failure (project file or command execution error)
//! - 5: Scheduling failure (unsatisfiable dependency graph, reentrant round)

/// Successful execution.
pub const SUCCESS: i32 = 0;

/// User error: bad arguments, invalid configuration, or duplicate role names.
pub const USER_ERROR: i32 = 1;

/// Budget failure: the cost ledger hit its ceiling before the run finished.
pub const BUDGET_FAILURE: i32 = 2;

/// Generator failure: the external completion backend failed at a setup seam.
pub const GENERATOR_FAILURE: i32 = 3;

/// Workspace failure: project file operations or command execution failed.
pub const WORKSPACE_FAILURE: i32 = 4;

/// Scheduling failure: dependency cycle, unknown routing target, or a
/// reentrant round invocation.
pub const SCHEDULING_FAILURE: i32 = 5;
