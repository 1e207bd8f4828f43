//! Message bus shared by all registered roles.
//!
//! The [`Environment`] owns the roles, the append-only message history, and
//! the routing table. Delivery rules:
//!
//! - every published message lands in history exactly once, in publish
//!   order, regardless of who (if anyone) receives it;
//! - a message addressed to a known role is delivered to that role only;
//! - a message addressed to an unknown role is delivered to nobody;
//! - a broadcast is delivered to every registered role.
//!
//! [`Environment::run_round`] gives each role (in registration order) one
//! chance to react, and routes each produced message *immediately*, so a
//! role later in the order can react to output produced earlier in the same
//! round. This same-round propagation is what lets a three-stage pipeline
//! finish in well under three rounds.

use crate::context::TeamContext;
use crate::error::{Result, TroupeError};
use crate::role::Role;
use crate::schema::{Message, artifact_key};
use crate::transcript::TranscriptWriter;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Fixed `caused_by` → target-role map consulted after every reaction.
///
/// A cause with no entry is a *terminal artifact*: the message content is
/// recorded into shared context under [`artifact_key`] instead of being
/// delivered onward.
#[derive(Debug, Clone, Default)]
pub struct RoutingTable {
    routes: BTreeMap<String, String>,
}

impl RoutingTable {
    /// Create an empty table (every cause is terminal).
    pub fn new() -> Self {
        Self::default()
    }

    /// Map a cause tag onto a target role.
    pub fn route(mut self, cause: impl Into<String>, target: impl Into<String>) -> Self {
        self.routes.insert(cause.into(), target.into());
        self
    }

    /// Target role for a cause, if mapped.
    pub fn target(&self, cause: &str) -> Option<&str> {
        self.routes.get(cause).map(String::as_str)
    }

    /// Iterate (cause, target) pairs in cause order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.routes.iter().map(|(c, t)| (c.as_str(), t.as_str()))
    }
}

/// Message router and history keeper shared by all registered roles.
pub struct Environment {
    roles: HashMap<String, Role>,
    order: Vec<String>,
    history: Vec<Message>,
    routes: RoutingTable,
    context: Arc<TeamContext>,
    transcript: Option<TranscriptWriter>,
    terminal_keys: Vec<String>,
    in_round: bool,
}

impl Environment {
    /// Create an empty environment over a shared context.
    pub fn new(context: Arc<TeamContext>) -> Self {
        Self {
            roles: HashMap::new(),
            order: Vec::new(),
            history: Vec::new(),
            routes: RoutingTable::new(),
            context,
            transcript: None,
            terminal_keys: Vec::new(),
            in_round: false,
        }
    }

    /// Install the routing table.
    pub fn with_routes(mut self, routes: RoutingTable) -> Self {
        self.routes = routes;
        self
    }

    /// Mirror every published message into a transcript file.
    pub fn attach_transcript(&mut self, writer: TranscriptWriter) {
        self.transcript = Some(writer);
    }

    /// The shared context handle.
    pub fn context(&self) -> &Arc<TeamContext> {
        &self.context
    }

    /// Register a role by name, propagating the shared context to it.
    ///
    /// Role names are the routing identity: a duplicate name is rejected.
    pub fn add_role(&mut self, mut role: Role) -> Result<()> {
        let name = role.name().to_string();
        if self.roles.contains_key(&name) {
            return Err(TroupeError::DuplicateRole(name));
        }
        role.bind_context(Arc::clone(&self.context));
        self.order.push(name.clone());
        self.roles.insert(name, role);
        Ok(())
    }

    /// Look up a role by name.
    pub fn role(&self, name: &str) -> Option<&Role> {
        self.roles.get(name)
    }

    /// Registered role names in registration order.
    pub fn role_names(&self) -> &[String] {
        &self.order
    }

    /// The append-only message history, in delivery order.
    pub fn history(&self) -> &[Message] {
        &self.history
    }

    /// Check that every routing target names a registered role.
    ///
    /// Called at run start; a dangling target is a fatal setup error, not
    /// something to discover mid-round.
    pub fn validate_routes(&self) -> Result<()> {
        for (cause, target) in self.routes.iter() {
            if !self.roles.contains_key(target) {
                return Err(TroupeError::UnknownRoutingTarget {
                    cause: cause.to_string(),
                    target: target.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Publish a message, optionally addressed to one role.
    ///
    /// The message is stamped with `send_to` and appended to history
    /// unconditionally. Addressed-to-known delivers to that role only;
    /// addressed-to-unknown delivers to nobody; broadcast delivers to every
    /// registered role in registration order.
    pub fn publish(&mut self, mut message: Message, send_to: Option<&str>) {
        message.send_to = send_to.map(str::to_string);
        self.history.push(message.clone());

        if let Some(writer) = &self.transcript {
            // The transcript is advisory; a write failure must not poison
            // delivery or history.
            let _ = writer.append(&message);
        }

        match send_to {
            Some(target) => {
                if let Some(role) = self.roles.get_mut(target) {
                    role.observe(&message);
                }
            }
            None => {
                for name in &self.order {
                    if let Some(role) = self.roles.get_mut(name) {
                        role.observe(&message);
                    }
                }
            }
        }
    }

    /// Give every role one chance to react, in registration order.
    ///
    /// Each produced message is routed before the next role is visited
    /// (same-round propagation). Returns the number of messages produced.
    /// Refuses reentrant invocation: a round either completes in full or
    /// its error is surfaced, but two rounds never interleave.
    pub fn run_round(&mut self) -> Result<usize> {
        if self.in_round {
            return Err(TroupeError::RoundInProgress);
        }
        self.in_round = true;
        let result = self.round_pass();
        self.in_round = false;
        result
    }

    fn round_pass(&mut self) -> Result<usize> {
        let order = self.order.clone();
        let mut produced = 0;

        for name in order {
            let Some(role) = self.roles.get_mut(&name) else {
                continue;
            };
            if role.is_idle() {
                continue;
            }
            if let Some(message) = role.react() {
                produced += 1;
                self.dispatch(message)?;
            }
        }

        Ok(produced)
    }

    /// Route one produced message through the table.
    fn dispatch(&mut self, message: Message) -> Result<()> {
        let target = self.routes.target(&message.caused_by).map(str::to_string);
        match target {
            Some(target) => {
                if !self.roles.contains_key(&target) {
                    return Err(TroupeError::UnknownRoutingTarget {
                        cause: message.caused_by.clone(),
                        target,
                    });
                }
                self.publish(message, Some(&target));
            }
            None => {
                let key = artifact_key(&message.caused_by);
                self.context.set_artifact(key.clone(), message.content);
                self.terminal_keys.push(key);
            }
        }
        Ok(())
    }

    /// Artifact keys recorded as terminal during this environment's rounds,
    /// in production order. Restored artifacts from a recovered snapshot do
    /// not appear here; only live production does.
    pub fn terminal_keys(&self) -> &[String] {
        &self.terminal_keys
    }

    /// True iff every registered role's working memory is empty.
    pub fn is_idle(&self) -> bool {
        self.roles.values().all(Role::is_idle)
    }
}
