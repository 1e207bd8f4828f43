//! Composed actions: conditionals and retries.
//!
//! Both wrappers keep the wrapped action's tag, so routing and selection
//! behave exactly as if the inner action ran bare.

use super::{Action, ActionContext, ActionError};
use crate::schema::{ActionOutput, Message};
use std::collections::BTreeMap;
use std::time::Duration;

/// Predicate over the context messages used by [`ConditionalAction`].
pub type Predicate = Box<dyn Fn(&[Message]) -> bool + Send + Sync>;

/// Default backoff base for [`RetryAction`].
const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(500);

/// Picks one of two actions based on a predicate over the context messages.
pub struct ConditionalAction {
    tag: String,
    predicate: Predicate,
    if_true: Box<dyn Action>,
    if_false: Box<dyn Action>,
}

impl ConditionalAction {
    /// Create a conditional with its own tag and two branches.
    pub fn new(
        tag: impl Into<String>,
        predicate: Predicate,
        if_true: Box<dyn Action>,
        if_false: Box<dyn Action>,
    ) -> Self {
        Self {
            tag: tag.into(),
            predicate,
            if_true,
            if_false,
        }
    }
}

impl Action for ConditionalAction {
    fn tag(&self) -> &str {
        &self.tag
    }

    fn execute(
        &self,
        ctx: &ActionContext<'_>,
        messages: &[Message],
    ) -> Result<ActionOutput, ActionError> {
        if (self.predicate)(messages) {
            self.if_true.execute(ctx, messages)
        } else {
            self.if_false.execute(ctx, messages)
        }
    }
}

/// Re-executes a wrapped action with exponential backoff on failure.
///
/// Exhausted retries degrade to a reported result: the wrapper returns a
/// synthetic failure output instead of raising, so a flaky action can never
/// crash its caller.
pub struct RetryAction {
    inner: Box<dyn Action>,
    max_attempts: u32,
    backoff_base: Duration,
}

impl RetryAction {
    /// Wrap an action with up to `max_attempts` executions (minimum 1).
    pub fn new(inner: Box<dyn Action>, max_attempts: u32) -> Self {
        Self {
            inner,
            max_attempts: max_attempts.max(1),
            backoff_base: DEFAULT_BACKOFF_BASE,
        }
    }

    /// Override the backoff base (attempt n sleeps `base * 2^(n-1)`).
    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }
}

impl Action for RetryAction {
    fn tag(&self) -> &str {
        self.inner.tag()
    }

    fn name(&self) -> &str {
        self.inner.name()
    }

    fn execute(
        &self,
        ctx: &ActionContext<'_>,
        messages: &[Message],
    ) -> Result<ActionOutput, ActionError> {
        let mut last_error = None;

        for attempt in 1..=self.max_attempts {
            match self.inner.execute(ctx, messages) {
                Ok(output) => return Ok(output),
                Err(err) => {
                    last_error = Some(err);
                    if attempt < self.max_attempts {
                        std::thread::sleep(self.backoff_base * 2u32.pow(attempt - 1));
                    }
                }
            }
        }

        let reason = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "unknown failure".to_string());
        let structured = BTreeMap::from([
            ("error".to_string(), reason.clone()),
            ("attempts".to_string(), self.max_attempts.to_string()),
        ]);
        Ok(ActionOutput::new(format!(
            "action '{}' failed after {} attempt(s): {}",
            self.inner.tag(),
            self.max_attempts,
            reason
        ))
        .with_structured(structured))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::context::TeamContext;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    /// Test action that fails a fixed number of times before succeeding.
    struct Flaky {
        failures_before_success: u32,
        calls: Arc<AtomicU32>,
    }

    impl Action for Flaky {
        fn tag(&self) -> &str {
            "flaky"
        }

        fn execute(
            &self,
            _ctx: &ActionContext<'_>,
            _messages: &[Message],
        ) -> Result<ActionOutput, ActionError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures_before_success {
                Err(ActionError::Failed(format!("boom on call {}", call + 1)))
            } else {
                Ok(ActionOutput::new("recovered"))
            }
        }
    }

    struct Fixed(&'static str, &'static str);

    impl Action for Fixed {
        fn tag(&self) -> &str {
            self.0
        }

        fn execute(
            &self,
            _ctx: &ActionContext<'_>,
            _messages: &[Message],
        ) -> Result<ActionOutput, ActionError> {
            Ok(ActionOutput::new(self.1))
        }
    }

    fn team() -> TeamContext {
        TeamContext::new(Config::default())
    }

    #[test]
    fn conditional_picks_branch_by_predicate() {
        let conditional = ConditionalAction::new(
            "triage",
            Box::new(|messages: &[Message]| !messages.is_empty()),
            Box::new(Fixed("has-input", "with messages")),
            Box::new(Fixed("no-input", "without messages")),
        );

        let team = team();
        let ctx = ActionContext::new(&team, "tester");

        let with = conditional
            .execute(&ctx, &[Message::new("hi", "User", "user-requirement")])
            .unwrap();
        assert_eq!(with.content, "with messages");

        let without = conditional.execute(&ctx, &[]).unwrap();
        assert_eq!(without.content, "without messages");
        assert_eq!(conditional.tag(), "triage");
    }

    #[test]
    fn retry_succeeds_once_inner_recovers() {
        let calls = Arc::new(AtomicU32::new(0));
        let retry = RetryAction::new(
            Box::new(Flaky {
                failures_before_success: 2,
                calls: Arc::clone(&calls),
            }),
            5,
        )
        .with_backoff_base(Duration::ZERO);

        let team = team();
        let ctx = ActionContext::new(&team, "tester");
        let output = retry.execute(&ctx, &[]).unwrap();

        assert_eq!(output.content, "recovered");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn exhausted_retries_return_synthetic_failure_not_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let retry = RetryAction::new(
            Box::new(Flaky {
                failures_before_success: u32::MAX,
                calls: Arc::clone(&calls),
            }),
            3,
        )
        .with_backoff_base(Duration::ZERO);

        let team = team();
        let ctx = ActionContext::new(&team, "tester");
        let output = retry.execute(&ctx, &[]).unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(output.content.contains("failed after 3 attempt(s)"));
        let structured = output.structured.unwrap();
        assert_eq!(structured.get("attempts").unwrap(), "3");
        assert!(structured.get("error").unwrap().contains("boom"));
    }

    #[test]
    fn retry_keeps_the_wrapped_tag() {
        let retry = RetryAction::new(Box::new(Fixed("write-code", "ok")), 2);
        assert_eq!(retry.tag(), "write-code");
    }

    #[test]
    fn zero_attempts_is_clamped_to_one() {
        let calls = Arc::new(AtomicU32::new(0));
        let retry = RetryAction::new(
            Box::new(Flaky {
                failures_before_success: u32::MAX,
                calls: Arc::clone(&calls),
            }),
            0,
        )
        .with_backoff_base(Duration::ZERO);

        let team = team();
        let ctx = ActionContext::new(&team, "tester");
        retry.execute(&ctx, &[]).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
