//! Core value records exchanged between roles.
//!
//! A [`Message`] is the only thing that flows over the bus. It is immutable
//! once delivered: the environment appends it to history and never touches
//! it again. An [`ActionOutput`] is what an action execution returns; it is
//! converted into a `Message` with [`ActionOutput::into_message`], which is
//! a pure function with no side effects.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Cause tag for the seed message a user injects into the bus.
///
/// Machine-produced messages carry the tag of the action that produced them;
/// the initial idea carries this tag instead.
pub const USER_REQUIREMENT: &str = "user-requirement";

/// Prefix stripped when deriving an artifact key from a cause tag.
const ARTIFACT_PREFIX: &str = "write-";

/// Message exchanged between roles.
///
/// Invariant: `caused_by` is never empty for machine-produced messages. It
/// is the sole reliable routing key; content matching is only a fallback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Message body (document text, code, or an error description).
    pub content: String,

    /// Name of the role that produced this message.
    pub origin_role: String,

    /// Tag of the action (or event) that produced this message.
    pub caused_by: String,

    /// Optional sender identity, when distinct from `origin_role`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sent_from: Option<String>,

    /// Addressed recipient. `None` means broadcast.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub send_to: Option<String>,

    /// Creation time.
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Create a broadcast message with the current timestamp.
    pub fn new(
        content: impl Into<String>,
        origin_role: impl Into<String>,
        caused_by: impl Into<String>,
    ) -> Self {
        Self {
            content: content.into(),
            origin_role: origin_role.into(),
            caused_by: caused_by.into(),
            sent_from: None,
            send_to: None,
            timestamp: Utc::now(),
        }
    }

    /// Set the sender identity.
    pub fn with_sent_from(mut self, sent_from: impl Into<String>) -> Self {
        self.sent_from = Some(sent_from.into());
        self
    }

    /// Address the message to a specific role.
    pub fn with_send_to(mut self, send_to: impl Into<String>) -> Self {
        self.send_to = Some(send_to.into());
        self
    }

    /// Whether this message is addressed to the given role.
    pub fn is_addressed_to(&self, role: &str) -> bool {
        self.send_to.as_deref() == Some(role)
    }

    /// Short content preview for logs and status displays.
    pub fn preview(&self, max_chars: usize) -> String {
        let mut preview: String = self.content.chars().take(max_chars).collect();
        if self.content.chars().count() > max_chars {
            preview.push_str("...");
        }
        preview
    }
}

impl std::fmt::Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.origin_role, self.preview(50))
    }
}

/// Output from one action execution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionOutput {
    /// Generated text.
    pub content: String,

    /// Optional structured key-value payload alongside the text.
    pub structured: Option<BTreeMap<String, String>>,
}

impl ActionOutput {
    /// Create an output with text content only.
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            structured: None,
        }
    }

    /// Attach a structured payload.
    pub fn with_structured(mut self, structured: BTreeMap<String, String>) -> Self {
        self.structured = Some(structured);
        self
    }

    /// Convert this output into a broadcast message attributed to a role
    /// and a cause. Pure: consumes the output, touches nothing else.
    pub fn into_message(
        self,
        origin_role: impl Into<String>,
        caused_by: impl Into<String>,
    ) -> Message {
        Message::new(self.content, origin_role, caused_by)
    }
}

/// Derive the shared-context key under which a terminal artifact is stored.
///
/// Cause tags follow the `write-<artifact>` convention ("write-code" stores
/// under "code"); tags without the prefix are lowercased as-is.
pub fn artifact_key(caused_by: &str) -> String {
    caused_by
        .strip_prefix(ARTIFACT_PREFIX)
        .unwrap_or(caused_by)
        .to_lowercase()
}
