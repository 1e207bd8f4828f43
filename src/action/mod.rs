//! Units of work executed by roles.
//!
//! An [`Action`] is one invocable capability: it consumes context messages
//! and produces an [`ActionOutput`], typically by calling the bound
//! generator. Actions are identified by a stable symbolic *tag* (e.g.
//! `write-prd`); routing tables and selection rules match on tags, never on
//! concrete types. The tag of the action that produced a message becomes
//! that message's `caused_by`.

pub mod compose;
pub mod graph;
mod template;

pub use template::{TemplateError, render_template, template_vars};

use crate::context::TeamContext;
use crate::generator::GeneratorError;
use crate::schema::{ActionOutput, Message};
use std::time::Duration;
use thiserror::Error;

/// Error raised by an action execution.
///
/// These never escape a role reaction: [`crate::role::Role::act`] converts
/// them into error messages. They do surface directly when actions run
/// inside an [`graph::ActionGraph`], where a failed node is marked rather
/// than reified.
#[derive(Debug, Error)]
pub enum ActionError {
    /// The generator was missing or its call failed.
    #[error(transparent)]
    Generator(#[from] GeneratorError),

    /// A prompt template could not be rendered.
    #[error("template error in action '{action}': {source}")]
    Template {
        /// Tag of the action whose template failed.
        action: String,
        /// The rendering failure.
        source: TemplateError,
    },

    /// Any other execution failure.
    #[error("{0}")]
    Failed(String),
}

/// Execution context handed to an action by its role.
///
/// Wraps the shared [`TeamContext`] together with the executing role's
/// name, and funnels generator calls through cost recording.
pub struct ActionContext<'a> {
    team: &'a TeamContext,
    role: &'a str,
}

impl<'a> ActionContext<'a> {
    /// Build a context for one execution.
    pub fn new(team: &'a TeamContext, role: &'a str) -> Self {
        Self { team, role }
    }

    /// Name of the executing role.
    pub fn role(&self) -> &str {
        self.role
    }

    /// The shared team context.
    pub fn team(&self) -> &TeamContext {
        self.team
    }

    /// Call the bound generator on behalf of `action_tag` and record the
    /// call cost.
    ///
    /// Fails with [`GeneratorError::Unavailable`] when no generator is
    /// bound. Cost recording is advisory here; the ceiling is enforced by
    /// the round driver before each round.
    pub fn ask(
        &self,
        action_tag: &str,
        prompt: &str,
        system_msgs: &[String],
    ) -> Result<String, ActionError> {
        let generator = self.team.generator().ok_or(GeneratorError::Unavailable)?;
        let timeout = Duration::from_secs(self.team.config().generator_timeout_seconds);
        let response = generator.ask(prompt, system_msgs, timeout)?;
        let _ = self
            .team
            .record_call_cost(self.role, action_tag, prompt, &response);
        Ok(response)
    }
}

/// One invocable capability.
pub trait Action: Send + Sync {
    /// Stable symbolic capability tag used for routing and selection.
    fn tag(&self) -> &str;

    /// Human-readable name; defaults to the tag.
    fn name(&self) -> &str {
        self.tag()
    }

    /// Execute against the given context messages.
    fn execute(
        &self,
        ctx: &ActionContext<'_>,
        messages: &[Message],
    ) -> Result<ActionOutput, ActionError>;
}

/// Generator-backed action rendered from a prompt template.
///
/// The template may reference `{context}` (the context messages joined with
/// blank lines) and `{role}` (the executing role's name).
pub struct PromptAction {
    tag: String,
    name: String,
    system_prompt: String,
    template: String,
}

impl PromptAction {
    /// Create a prompt action. The display name defaults to the tag.
    pub fn new(
        tag: impl Into<String>,
        system_prompt: impl Into<String>,
        template: impl Into<String>,
    ) -> Self {
        let tag = tag.into();
        Self {
            name: tag.clone(),
            tag,
            system_prompt: system_prompt.into(),
            template: template.into(),
        }
    }

    /// Override the display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl Action for PromptAction {
    fn tag(&self) -> &str {
        &self.tag
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn execute(
        &self,
        ctx: &ActionContext<'_>,
        messages: &[Message],
    ) -> Result<ActionOutput, ActionError> {
        let context_text = messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        let vars = template_vars([("context", context_text), ("role", ctx.role().to_string())]);
        let prompt =
            render_template(&self.template, &vars).map_err(|source| ActionError::Template {
                action: self.tag.clone(),
                source,
            })?;

        let system_msgs = if self.system_prompt.is_empty() {
            Vec::new()
        } else {
            vec![self.system_prompt.clone()]
        };

        let response = ctx.ask(&self.tag, &prompt, &system_msgs)?;
        Ok(ActionOutput::new(response))
    }
}
