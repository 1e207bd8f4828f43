//! Dependency-graph execution of actions.
//!
//! An [`ActionGraph`] is a DAG of named nodes, each wrapping one action.
//! Scheduling uses Kahn's algorithm to peel zero-in-degree nodes into
//! ordered levels: nodes within a level have no mutual ordering constraint
//! and are declared parallel-safe, levels are strictly sequential. This
//! implementation executes a level's nodes sequentially in insertion order,
//! which keeps runs reproducible and is a valid serialization of the
//! parallel contract.
//!
//! Construction does not reject cycles; a cycle (or a dependency on an id
//! that was never added) shows up as a non-empty Pending remainder when
//! propagation stalls, and `execute` reports it as a structured error
//! instead of looping.

use super::{Action, ActionContext};
use crate::error::{Result, TroupeError};
use crate::schema::{ActionOutput, Message};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Origin role recorded on messages produced during graph execution.
const GRAPH_ROLE: &str = "graph";

/// Lifecycle state of one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// Not yet executed (or skipped because a dependency did not complete).
    Pending,
    /// Executed successfully.
    Completed,
    /// Execution returned an error.
    Failed,
}

/// One named unit of work and its scheduling state.
pub struct GraphNode {
    action: Box<dyn Action>,
    dependencies: Vec<String>,
    state: NodeState,
    result: Option<ActionOutput>,
    error: Option<String>,
}

impl GraphNode {
    /// Current lifecycle state.
    pub fn state(&self) -> NodeState {
        self.state
    }

    /// Declared dependency ids.
    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    /// Output of a completed execution.
    pub fn result(&self) -> Option<&ActionOutput> {
        self.result.as_ref()
    }

    /// Error text of a failed execution.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

/// Outcome classification of one `execute` run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphStatus {
    /// Every node completed.
    Success,
    /// At least one node completed, at least one did not.
    Partial,
    /// No node completed.
    Failed,
}

/// Result of one `execute` run.
#[derive(Debug)]
pub struct GraphReport {
    /// Outcome classification.
    pub status: GraphStatus,
    /// Ids of completed nodes, in execution order.
    pub completed: Vec<String>,
    /// Ids of failed nodes, in execution order.
    pub failed: Vec<String>,
    /// Ids never attempted because a dependency did not complete.
    pub skipped: Vec<String>,
    /// Output content per completed node.
    pub outputs: BTreeMap<String, String>,
}

/// Topological levels plus the unschedulable remainder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Levels {
    /// Execution levels in order; ids within a level in insertion order.
    pub levels: Vec<Vec<String>>,
    /// Ids that can never be scheduled (cycle or unknown dependency).
    pub pending: Vec<String>,
}

/// DAG of named action nodes executed in topological levels.
#[derive(Default)]
pub struct ActionGraph {
    nodes: HashMap<String, GraphNode>,
    order: Vec<String>,
}

impl ActionGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node under `id` with its dependency ids.
    ///
    /// Re-using an id is last-write-wins: the node is replaced but keeps
    /// its original slot in insertion order, so level tie-breaks stay
    /// stable. Callers that want both nodes must pick unique ids.
    pub fn add_node<I, S>(&mut self, id: impl Into<String>, action: Box<dyn Action>, dependencies: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let id = id.into();
        let mut seen = HashSet::new();
        let dependencies: Vec<String> = dependencies
            .into_iter()
            .map(Into::into)
            .filter(|d| seen.insert(d.clone()))
            .collect();

        if !self.nodes.contains_key(&id) {
            self.order.push(id.clone());
        }
        self.nodes.insert(
            id,
            GraphNode {
                action,
                dependencies,
                state: NodeState::Pending,
                result: None,
                error: None,
            },
        );
    }

    /// Number of registered nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Look up a node by id.
    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.get(id)
    }

    /// Compute execution levels with Kahn's algorithm.
    ///
    /// In-degree counts every declared dependency, including ids that were
    /// never added; those can never be satisfied, so the depending node
    /// (and everything downstream of it) ends up in the Pending remainder
    /// rather than in a level. The remainder is also how cycles surface.
    pub fn topological_levels(&self) -> Levels {
        let mut in_degree: HashMap<&str, usize> = self
            .order
            .iter()
            .filter_map(|id| {
                self.nodes
                    .get(id)
                    .map(|n| (id.as_str(), n.dependencies.len()))
            })
            .collect();

        // dependents[d] = nodes that declared a dependency on d.
        let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
        for id in &self.order {
            if let Some(node) = self.nodes.get(id) {
                for dep in &node.dependencies {
                    if self.nodes.contains_key(dep) {
                        dependents.entry(dep.as_str()).or_default().push(id.as_str());
                    }
                }
            }
        }

        let mut levels = Vec::new();
        let mut scheduled: HashSet<&str> = HashSet::new();
        let mut frontier: Vec<&str> = self
            .order
            .iter()
            .map(String::as_str)
            .filter(|id| in_degree.get(id).copied() == Some(0))
            .collect();

        while !frontier.is_empty() {
            let mut next = Vec::new();
            for &id in &frontier {
                scheduled.insert(id);
                for &dependent in dependents.get(id).map(Vec::as_slice).unwrap_or_default() {
                    if let Some(degree) = in_degree.get_mut(dependent) {
                        *degree -= 1;
                        if *degree == 0 {
                            next.push(dependent);
                        }
                    }
                }
            }
            levels.push(frontier.iter().map(|s| s.to_string()).collect());
            // Keep insertion order within the new frontier.
            next.sort_by_key(|id| self.order.iter().position(|o| o == id));
            frontier = next;
        }

        let pending = self
            .order
            .iter()
            .filter(|id| !scheduled.contains(id.as_str()))
            .cloned()
            .collect();

        Levels { levels, pending }
    }

    /// Execute the graph level by level.
    ///
    /// Each node sees the accumulated context: the initial messages plus
    /// one message per previously completed node, appended in execution
    /// order. A failed node is marked Failed and its dependents are never
    /// attempted (they remain Pending and are reported as skipped).
    pub fn execute(
        &mut self,
        ctx: &ActionContext<'_>,
        initial: &[Message],
    ) -> Result<GraphReport> {
        let Levels { levels, pending } = self.topological_levels();
        if !pending.is_empty() {
            return Err(TroupeError::GraphUnsatisfiable { pending });
        }

        let mut messages: Vec<Message> = initial.to_vec();
        let mut completed = Vec::new();
        let mut failed = Vec::new();
        let mut outputs = BTreeMap::new();

        for level in levels {
            for id in level {
                let Some(node) = self.nodes.get(&id) else {
                    continue;
                };
                let deps_completed = node.dependencies.iter().all(|dep| {
                    self.nodes
                        .get(dep)
                        .is_some_and(|d| d.state == NodeState::Completed)
                });
                if !deps_completed {
                    continue;
                }

                let execution = node.action.execute(ctx, &messages);
                let caused_by = node.action.tag().to_string();
                let Some(node) = self.nodes.get_mut(&id) else {
                    continue;
                };
                match execution {
                    Ok(output) => {
                        node.state = NodeState::Completed;
                        node.result = Some(output.clone());
                        outputs.insert(id.clone(), output.content.clone());
                        completed.push(id);
                        messages.push(output.into_message(GRAPH_ROLE, caused_by));
                    }
                    Err(err) => {
                        node.state = NodeState::Failed;
                        node.error = Some(err.to_string());
                        failed.push(id);
                    }
                }
            }
        }

        let skipped = self
            .order
            .iter()
            .filter(|id| {
                self.nodes
                    .get(*id)
                    .is_some_and(|n| n.state == NodeState::Pending)
            })
            .cloned()
            .collect();

        let status = if failed.is_empty() && completed.len() == self.nodes.len() {
            GraphStatus::Success
        } else if completed.is_empty() {
            GraphStatus::Failed
        } else {
            GraphStatus::Partial
        };

        Ok(GraphReport {
            status,
            completed,
            failed,
            skipped,
            outputs,
        })
    }

    /// Clear all Completed/Failed markers back to Pending, keeping nodes
    /// and edges, so the graph can be executed again.
    pub fn reset(&mut self) {
        for node in self.nodes.values_mut() {
            node.state = NodeState::Pending;
            node.result = None;
            node.error = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionError;
    use crate::config::Config;
    use crate::context::TeamContext;

    /// Emits a fixed payload, recording how many context messages it saw.
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
            Ok(ActionOutput::new(format!("{}|saw:{}", self.1, messages.len())))
        }
    }

    /// Joins every context message's content.
    struct JoinContext(&'static str);

    impl Action for JoinContext {
        fn tag(&self) -> &str {
            self.0
        }

        fn execute(
            &self,
            _ctx: &ActionContext<'_>,
            messages: &[Message],
        ) -> std::result::Result<ActionOutput, ActionError> {
            let joined = messages
                .iter()
                .map(|m| m.content.as_str())
                .collect::<Vec<_>>()
                .join("+");
            Ok(ActionOutput::new(joined))
        }
    }

    struct AlwaysFails(&'static str);

    impl Action for AlwaysFails {
        fn tag(&self) -> &str {
            self.0
        }

        fn execute(
            &self,
            _ctx: &ActionContext<'_>,
            _messages: &[Message],
        ) -> std::result::Result<ActionOutput, ActionError> {
            Err(ActionError::Failed("node exploded".to_string()))
        }
    }

    fn team() -> TeamContext {
        TeamContext::new(Config::default())
    }

    #[test]
    fn diamond_produces_two_levels_and_shared_context() {
        let mut graph = ActionGraph::new();
        graph.add_node("a", Box::new(Emit("emit-a", "A")), Vec::<String>::new());
        graph.add_node("b", Box::new(Emit("emit-b", "B")), Vec::<String>::new());
        graph.add_node("join", Box::new(JoinContext("join")), ["a", "b"]);

        let levels = graph.topological_levels();
        assert_eq!(levels.levels, vec![vec!["a", "b"], vec!["join"]]);
        assert!(levels.pending.is_empty());

        let team = team();
        let ctx = ActionContext::new(&team, "scheduler");
        let report = graph.execute(&ctx, &[]).unwrap();

        assert_eq!(report.status, GraphStatus::Success);
        assert_eq!(report.completed, vec!["a", "b", "join"]);
        // The dependent node saw both predecessor outputs.
        assert_eq!(report.outputs.get("join").unwrap(), "A|saw:0+B|saw:1");
    }

    #[test]
    fn initial_context_reaches_the_first_level() {
        let mut graph = ActionGraph::new();
        graph.add_node("only", Box::new(JoinContext("join")), Vec::<String>::new());

        let team = team();
        let ctx = ActionContext::new(&team, "scheduler");
        let seed = vec![Message::new("seed", "User", "user-requirement")];
        let report = graph.execute(&ctx, &seed).unwrap();

        assert_eq!(report.outputs.get("only").unwrap(), "seed");
    }

    #[test]
    fn cycle_surfaces_as_pending_remainder_not_a_loop() {
        let mut graph = ActionGraph::new();
        graph.add_node("a", Box::new(Emit("emit-a", "A")), ["b"]);
        graph.add_node("b", Box::new(Emit("emit-b", "B")), ["a"]);

        let levels = graph.topological_levels();
        assert!(levels.levels.is_empty());
        assert_eq!(levels.pending, vec!["a", "b"]);

        let team = team();
        let ctx = ActionContext::new(&team, "scheduler");
        let err = graph.execute(&ctx, &[]).unwrap_err();
        match err {
            TroupeError::GraphUnsatisfiable { pending } => {
                assert_eq!(pending, vec!["a", "b"]);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn unknown_dependency_is_unsatisfiable() {
        let mut graph = ActionGraph::new();
        graph.add_node("a", Box::new(Emit("emit-a", "A")), ["ghost"]);
        graph.add_node("b", Box::new(Emit("emit-b", "B")), Vec::<String>::new());

        let levels = graph.topological_levels();
        assert_eq!(levels.levels, vec![vec!["b"]]);
        assert_eq!(levels.pending, vec!["a"]);
    }

    #[test]
    fn failure_poisons_dependents_and_reports_partial() {
        let mut graph = ActionGraph::new();
        graph.add_node("ok", Box::new(Emit("emit-ok", "OK")), Vec::<String>::new());
        graph.add_node("bad", Box::new(AlwaysFails("bad")), Vec::<String>::new());
        graph.add_node("downstream", Box::new(Emit("emit-d", "D")), ["bad"]);

        let team = team();
        let ctx = ActionContext::new(&team, "scheduler");
        let report = graph.execute(&ctx, &[]).unwrap();

        assert_eq!(report.status, GraphStatus::Partial);
        assert_eq!(report.completed, vec!["ok"]);
        assert_eq!(report.failed, vec!["bad"]);
        assert_eq!(report.skipped, vec!["downstream"]);
        assert_eq!(graph.node("downstream").unwrap().state(), NodeState::Pending);
        assert!(graph.node("bad").unwrap().error().unwrap().contains("exploded"));
    }

    #[test]
    fn all_failures_report_failed_status() {
        let mut graph = ActionGraph::new();
        graph.add_node("bad", Box::new(AlwaysFails("bad")), Vec::<String>::new());

        let team = team();
        let ctx = ActionContext::new(&team, "scheduler");
        let report = graph.execute(&ctx, &[]).unwrap();
        assert_eq!(report.status, GraphStatus::Failed);
    }

    #[test]
    fn reset_makes_the_graph_resumable() {
        let mut graph = ActionGraph::new();
        graph.add_node("a", Box::new(Emit("emit-a", "A")), Vec::<String>::new());

        let team = team();
        let ctx = ActionContext::new(&team, "scheduler");
        graph.execute(&ctx, &[]).unwrap();
        assert_eq!(graph.node("a").unwrap().state(), NodeState::Completed);

        graph.reset();
        assert_eq!(graph.node("a").unwrap().state(), NodeState::Pending);
        assert!(graph.node("a").unwrap().result().is_none());

        let report = graph.execute(&ctx, &[]).unwrap();
        assert_eq!(report.status, GraphStatus::Success);
    }

    #[test]
    fn duplicate_id_is_last_write_wins_keeping_order() {
        let mut graph = ActionGraph::new();
        graph.add_node("a", Box::new(Emit("emit-a", "first")), Vec::<String>::new());
        graph.add_node("b", Box::new(Emit("emit-b", "B")), Vec::<String>::new());
        graph.add_node("a", Box::new(Emit("emit-a", "second")), Vec::<String>::new());

        assert_eq!(graph.len(), 2);
        let levels = graph.topological_levels();
        assert_eq!(levels.levels, vec![vec!["a", "b"]]);

        let team = team();
        let ctx = ActionContext::new(&team, "scheduler");
        let report = graph.execute(&ctx, &[]).unwrap();
        assert!(report.outputs.get("a").unwrap().starts_with("second"));
    }

    #[test]
    fn level_order_is_insertion_order() {
        let mut graph = ActionGraph::new();
        graph.add_node("z", Box::new(Emit("emit-z", "Z")), Vec::<String>::new());
        graph.add_node("m", Box::new(Emit("emit-m", "M")), Vec::<String>::new());
        graph.add_node("a", Box::new(Emit("emit-a", "A")), Vec::<String>::new());

        let levels = graph.topological_levels();
        assert_eq!(levels.levels, vec![vec!["z", "m", "a"]]);
    }
}
