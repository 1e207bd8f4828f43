//! Shared run context.
//!
//! [`TeamContext`] is the one context shape in the system: configuration,
//! the cost ledger, the accumulated artifacts, and the collaborator
//! bindings (generator, workspace, cost policy). The environment hands an
//! `Arc<TeamContext>` to every role at registration; roles and actions only
//! ever see this read-handle, never the environment itself, so there are no
//! ownership cycles. Mutation goes through accessors backed by interior
//! mutexes; under the single-threaded round model these are uncontended and
//! simply enforce the single-writer rule.

use crate::budget::{BudgetExceeded, CostLedger, CostPolicy, FlatRate};
use crate::config::Config;
use crate::generator::Generator;
use crate::workspace::Workspace;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Serializable snapshot of the mutable context state, used by team
/// persistence. Holds the ledger totals and the artifact map; collaborator
/// bindings are live objects and are never serialized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextSnapshot {
    /// Ledger running total at snapshot time.
    pub total_cost: f64,
    /// Ledger ceiling at snapshot time.
    pub ceiling: f64,
    /// Accumulated artifacts (`prd`, `design`, `code`, ...).
    pub artifacts: BTreeMap<String, String>,
}

/// Configuration, budget, artifacts, and collaborator bindings for one run.
pub struct TeamContext {
    config: Config,
    ledger: Mutex<CostLedger>,
    artifacts: Mutex<BTreeMap<String, String>>,
    generator: Option<Arc<dyn Generator>>,
    workspace: Option<Arc<dyn Workspace>>,
    cost_policy: Arc<dyn CostPolicy>,
}

impl TeamContext {
    /// Create a context from configuration, with the ledger ceiling taken
    /// from `default_investment` and the flat-rate policy from
    /// `flat_rate_cost`. No collaborators are bound yet.
    pub fn new(config: Config) -> Self {
        let ledger = CostLedger::new(config.default_investment);
        let policy = FlatRate(config.flat_rate_cost);
        Self {
            config,
            ledger: Mutex::new(ledger),
            artifacts: Mutex::new(BTreeMap::new()),
            generator: None,
            workspace: None,
            cost_policy: Arc::new(policy),
        }
    }

    /// Bind the generator used by prompt-backed actions.
    pub fn with_generator(mut self, generator: Arc<dyn Generator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Bind the workspace used to materialize artifacts.
    pub fn with_workspace(mut self, workspace: Arc<dyn Workspace>) -> Self {
        self.workspace = Some(workspace);
        self
    }

    /// Replace the cost-estimation policy.
    pub fn with_cost_policy(mut self, policy: Arc<dyn CostPolicy>) -> Self {
        self.cost_policy = policy;
        self
    }

    /// The run configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The bound generator, if any.
    pub fn generator(&self) -> Option<&dyn Generator> {
        self.generator.as_deref()
    }

    /// The bound workspace, if any.
    pub fn workspace(&self) -> Option<&dyn Workspace> {
        self.workspace.as_deref()
    }

    // =========================================================================
    // Budget accessors
    // =========================================================================

    /// Set the budget ceiling.
    pub fn invest(&self, amount: f64) {
        self.ledger().set_ceiling(amount);
    }

    /// Estimate and record the cost of one generator call.
    ///
    /// Advisory for the caller: the crossing error is informational and the
    /// round driver enforces the ceiling at round boundaries.
    pub fn record_call_cost(
        &self,
        role: &str,
        action: &str,
        prompt: &str,
        response: &str,
    ) -> Result<(), BudgetExceeded> {
        let amount = self.cost_policy.estimate(prompt, response);
        self.ledger()
            .add_cost(amount, role, action, format!("generator call for {}", action))
    }

    /// Ledger running total.
    pub fn total_cost(&self) -> f64 {
        self.ledger().total()
    }

    /// Ledger ceiling.
    pub fn ceiling(&self) -> f64 {
        self.ledger().ceiling()
    }

    /// Whether the ledger has hit its ceiling.
    pub fn budget_exhausted(&self) -> bool {
        self.ledger().is_exhausted()
    }

    fn ledger(&self) -> MutexGuard<'_, CostLedger> {
        self.ledger.lock().unwrap_or_else(|poison| poison.into_inner())
    }

    // =========================================================================
    // Artifact accessors
    // =========================================================================

    /// Record a terminal or intermediate artifact under a key.
    pub fn set_artifact(&self, key: impl Into<String>, content: impl Into<String>) {
        self.artifacts_guard().insert(key.into(), content.into());
    }

    /// Fetch an artifact by key.
    pub fn artifact(&self, key: &str) -> Option<String> {
        self.artifacts_guard().get(key).cloned()
    }

    /// Whether an artifact exists.
    pub fn has_artifact(&self, key: &str) -> bool {
        self.artifacts_guard().contains_key(key)
    }

    /// All artifacts, in key order.
    pub fn artifacts(&self) -> BTreeMap<String, String> {
        self.artifacts_guard().clone()
    }

    fn artifacts_guard(&self) -> MutexGuard<'_, BTreeMap<String, String>> {
        self.artifacts
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Snapshot the mutable state for persistence.
    pub fn snapshot(&self) -> ContextSnapshot {
        let ledger = self.ledger();
        ContextSnapshot {
            total_cost: ledger.total(),
            ceiling: ledger.ceiling(),
            artifacts: self.artifacts_guard().clone(),
        }
    }

    /// Restore mutable state from a recovered snapshot.
    pub fn restore(&self, snapshot: &ContextSnapshot) {
        {
            let mut ledger = self.ledger();
            ledger.set_ceiling(snapshot.ceiling);
            ledger.restore_total(snapshot.total_cost);
        }
        let mut artifacts = self.artifacts_guard();
        artifacts.clear();
        artifacts.extend(snapshot.artifacts.clone());
    }
}
