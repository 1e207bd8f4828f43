//! Role state machine.
//!
//! A [`Role`] is an agent: a unique name, a profile and goal, an ordered
//! set of actions, and two memories. The bus calls [`Role::observe`] for
//! every delivered message; long-term memory always records it, working
//! memory (the inbox) admits it only if the relevance predicate holds.
//! [`Role::react`] is the single entry point during a round: it selects an
//! action from the most recent relevant message, executes it, and emits the
//! result as a new message.
//!
//! Two invariants worth calling out:
//!
//! - `act` never propagates an execution error; failures are reified as
//!   error messages so the rest of the team keeps making progress.
//! - `act` clears the entire inbox afterward, success or failure. One
//!   reaction handles at most one task; stale history never re-triggers.

use crate::action::{Action, ActionContext};
use crate::context::TeamContext;
use crate::memory::RingMemory;
use crate::schema::Message;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Default working-memory bound when none is configured.
const DEFAULT_INBOX_CAPACITY: usize = 32;

/// Default long-term ring capacity when none is configured.
const DEFAULT_MEMORY_CAPACITY: usize = 100;

/// Observable lifecycle state of a role.
///
/// Transitions run Idle → Thinking → Acting → Idle entirely inside one
/// `react` call; between rounds a role is always Idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleState {
    /// No reaction in progress.
    Idle,
    /// Selecting an action for the latest relevant message.
    Thinking,
    /// Executing the selected action.
    Acting,
}

/// Maps an incoming message onto the tag of the action to run.
///
/// A rule can match on the message's `caused_by` (preferred) or on content
/// keywords (fallback). Rules are consulted in configuration order; all
/// cause matches are tried before any keyword match.
#[derive(Debug, Clone)]
pub struct SelectionRule {
    action_tag: String,
    trigger: Option<String>,
    keywords: Vec<String>,
}

impl SelectionRule {
    /// Start a rule that selects the action with the given tag.
    pub fn for_action(action_tag: impl Into<String>) -> Self {
        Self {
            action_tag: action_tag.into(),
            trigger: None,
            keywords: Vec::new(),
        }
    }

    /// Match messages whose `caused_by` equals `cause`.
    pub fn on_cause(mut self, cause: impl Into<String>) -> Self {
        self.trigger = Some(cause.into());
        self
    }

    /// Also match messages whose content contains `keyword`
    /// (case-insensitive).
    pub fn on_keyword(mut self, keyword: impl Into<String>) -> Self {
        self.keywords.push(keyword.into().to_lowercase());
        self
    }

    fn matches_cause(&self, message: &Message) -> bool {
        self.trigger.as_deref() == Some(message.caused_by.as_str())
    }

    fn matches_keyword(&self, lowercase_content: &str) -> bool {
        self.keywords.iter().any(|k| lowercase_content.contains(k))
    }
}

/// An agent participating in the message exchange.
pub struct Role {
    name: String,
    profile: String,
    goal: String,
    actions: Vec<Box<dyn Action>>,
    rules: Vec<SelectionRule>,
    watches: BTreeSet<String>,
    inbox: Vec<Message>,
    inbox_capacity: usize,
    memory: RingMemory,
    state: RoleState,
    context: Option<Arc<TeamContext>>,
}

impl Role {
    /// Create a role with default memory bounds and no actions.
    pub fn new(
        name: impl Into<String>,
        profile: impl Into<String>,
        goal: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            profile: profile.into(),
            goal: goal.into(),
            actions: Vec::new(),
            rules: Vec::new(),
            watches: BTreeSet::new(),
            inbox: Vec::new(),
            inbox_capacity: DEFAULT_INBOX_CAPACITY,
            memory: RingMemory::new(DEFAULT_MEMORY_CAPACITY),
            state: RoleState::Idle,
            context: None,
        }
    }

    /// Append an action. Order matters: the first action is the selection
    /// fallback when no rule matches.
    pub fn with_action(mut self, action: Box<dyn Action>) -> Self {
        self.actions.push(action);
        self
    }

    /// Append a selection rule.
    pub fn with_rule(mut self, rule: SelectionRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Admit broadcast messages with this cause tag into working memory.
    pub fn watch(mut self, cause: impl Into<String>) -> Self {
        self.watches.insert(cause.into());
        self
    }

    /// Override the working-memory bound.
    pub fn with_inbox_capacity(mut self, capacity: usize) -> Self {
        self.inbox_capacity = capacity.max(1);
        self
    }

    /// Override the long-term ring capacity.
    pub fn with_memory_capacity(mut self, capacity: usize) -> Self {
        self.memory = RingMemory::new(capacity);
        self
    }

    /// Unique role name; the only identity used for routing.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Short description of who this role is.
    pub fn profile(&self) -> &str {
        &self.profile
    }

    /// What this role is trying to achieve.
    pub fn goal(&self) -> &str {
        &self.goal
    }

    /// Current lifecycle state.
    pub fn state(&self) -> RoleState {
        self.state
    }

    /// Long-term memory, oldest to newest.
    pub fn memory(&self) -> &RingMemory {
        &self.memory
    }

    /// Number of messages pending in working memory.
    pub fn pending(&self) -> usize {
        self.inbox.len()
    }

    /// Whether this role has nothing to react to.
    pub fn is_idle(&self) -> bool {
        self.inbox.is_empty()
    }

    /// Bind the shared team context. Called once at registration; the
    /// handle is read-only from the role's perspective.
    pub(crate) fn bind_context(&mut self, context: Arc<TeamContext>) {
        self.context = Some(context);
    }

    /// Relevance predicate: the sole admission gate into working memory.
    ///
    /// Deterministic and side-effect-free. A message is relevant iff it is
    /// addressed to this role, or it is a broadcast whose cause tag is in
    /// this role's watch set.
    pub fn is_relevant(&self, message: &Message) -> bool {
        message.is_addressed_to(&self.name)
            || (message.send_to.is_none() && self.watches.contains(&message.caused_by))
    }

    /// Observe a delivered message.
    ///
    /// Always recorded into long-term memory; admitted into working memory
    /// only when relevant. The inbox is bounded: admitting past capacity
    /// evicts the oldest pending message.
    pub fn observe(&mut self, message: &Message) {
        self.memory.push(message.clone());
        if self.is_relevant(message) {
            if self.inbox.len() == self.inbox_capacity {
                self.inbox.remove(0);
            }
            self.inbox.push(message.clone());
        }
    }

    /// Select the action for the most recently observed relevant message.
    ///
    /// Cause matches are preferred over keyword matches; if nothing
    /// matches, the first configured action is the fallback. Returns None
    /// when the inbox is empty or the role has no actions.
    pub fn think(&self) -> Option<usize> {
        let message = self.inbox.last()?;
        if self.actions.is_empty() {
            return None;
        }

        for rule in &self.rules {
            if rule.matches_cause(message)
                && let Some(index) = self.action_index(&rule.action_tag)
            {
                return Some(index);
            }
        }

        let content = message.content.to_lowercase();
        for rule in &self.rules {
            if rule.matches_keyword(&content)
                && let Some(index) = self.action_index(&rule.action_tag)
            {
                return Some(index);
            }
        }

        Some(0)
    }

    fn action_index(&self, tag: &str) -> Option<usize> {
        self.actions.iter().position(|a| a.tag() == tag)
    }

    /// Execute an action and emit the result as a message.
    ///
    /// With `action_tag = None` the action is chosen by [`Self::think`].
    /// Returns None (a no-op, not an error) when there is nothing to do.
    /// Execution context is the most recent relevant message only, which
    /// bounds prompt size and makes repeated reactions independent of
    /// stale history. Never panics or returns an error: failures come back
    /// as an error message. The inbox is cleared on every path that
    /// executed an action.
    pub fn act(&mut self, action_tag: Option<&str>) -> Option<Message> {
        self.state = RoleState::Thinking;
        let index = match action_tag {
            Some(tag) => self.action_index(tag),
            None => self.think(),
        };
        let Some(index) = index else {
            self.state = RoleState::Idle;
            return None;
        };
        let Some(latest) = self.inbox.last().cloned() else {
            self.state = RoleState::Idle;
            return None;
        };

        self.state = RoleState::Acting;
        let context_messages = [latest];
        let tag = self.actions[index].tag().to_string();

        let message = match &self.context {
            None => Message::new(
                format!(
                    "error in action '{}': role '{}' is not registered in an environment",
                    tag, self.name
                ),
                self.name.clone(),
                tag,
            ),
            Some(team) => {
                let ctx = ActionContext::new(team, &self.name);
                match self.actions[index].execute(&ctx, &context_messages) {
                    Ok(output) => output.into_message(self.name.clone(), tag),
                    Err(err) => Message::new(
                        format!("error in action '{}': {}", tag, err),
                        self.name.clone(),
                        tag,
                    ),
                }
            }
        };

        self.memory.push(message.clone());
        self.inbox.clear();
        self.state = RoleState::Idle;
        Some(message)
    }

    /// React to pending work: act if the inbox is non-empty.
    ///
    /// This is the only entry point the bus invokes during a round.
    pub fn react(&mut self) -> Option<Message> {
        if self.inbox.is_empty() {
            return None;
        }
        self.act(None)
    }
}
