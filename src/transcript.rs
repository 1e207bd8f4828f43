//! Append-only transcript of published messages.
//!
//! Every message the bus publishes can be mirrored into an NDJSON file
//! (one JSON object per line) next to the project, for audit and for
//! inspecting a run after the fact. The transcript is advisory output: it
//! never influences routing or history, which live in memory.
//!
//! Each line carries:
//! - `ts`: RFC3339 timestamp of the append
//! - `actor`: `user@host` of the process that ran the round
//! - `origin_role`, `caused_by`, `send_to`: routing metadata of the message
//! - `content`: the full message body

use crate::error::{Result, TroupeError};
use crate::schema::Message;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Default transcript filename inside a project directory.
pub const TRANSCRIPT_FILE: &str = "transcript.ndjson";

/// One transcript line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptEntry {
    /// When the message was published.
    pub ts: DateTime<Utc>,

    /// Who ran the process (`user@host`).
    pub actor: String,

    /// Role that produced the message.
    pub origin_role: String,

    /// Cause tag of the message.
    pub caused_by: String,

    /// Addressed recipient, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub send_to: Option<String>,

    /// Full message body.
    pub content: String,
}

/// Appends published messages to an NDJSON file.
#[derive(Debug, Clone)]
pub struct TranscriptWriter {
    path: PathBuf,
    actor: String,
}

impl TranscriptWriter {
    /// Create a writer targeting `path`. The file and its parent directory
    /// are created lazily on first append.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            actor: actor_string(),
        }
    }

    /// Target path of the transcript file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one message as a single NDJSON line and sync to disk.
    pub fn append(&self, message: &Message) -> Result<()> {
        let entry = TranscriptEntry {
            ts: Utc::now(),
            actor: self.actor.clone(),
            origin_role: message.origin_role.clone(),
            caused_by: message.caused_by.clone(),
            send_to: message.send_to.clone(),
            content: message.content.clone(),
        };

        let line = serde_json::to_string(&entry).map_err(|e| {
            TroupeError::Persistence(format!("failed to serialize transcript entry: {}", e))
        })?;

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| {
                TroupeError::Persistence(format!(
                    "failed to create transcript directory '{}': {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| {
                TroupeError::Persistence(format!(
                    "failed to open transcript '{}': {}",
                    self.path.display(),
                    e
                ))
            })?;

        writeln!(file, "{}", line).map_err(|e| {
            TroupeError::Persistence(format!(
                "failed to write transcript '{}': {}",
                self.path.display(),
                e
            ))
        })?;

        file.sync_all().map_err(|e| {
            TroupeError::Persistence(format!(
                "failed to sync transcript '{}': {}",
                self.path.display(),
                e
            ))
        })?;

        Ok(())
    }
}

/// Read a transcript back, in append order.
pub fn read_transcript(path: impl AsRef<Path>) -> Result<Vec<TranscriptEntry>> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path).map_err(|e| {
        TroupeError::Persistence(format!(
            "failed to read transcript '{}': {}",
            path.display(),
            e
        ))
    })?;

    raw.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            serde_json::from_str(line).map_err(|e| {
                TroupeError::Persistence(format!(
                    "malformed transcript line in '{}': {}",
                    path.display(),
                    e
                ))
            })
        })
        .collect()
}

/// Actor string for transcript metadata (`user@host`).
fn actor_string() -> String {
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string());

    let host = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    format!("{}@{}", user, host)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn append_creates_file_and_parents() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("project").join(TRANSCRIPT_FILE);
        let writer = TranscriptWriter::new(&path);

        assert!(!path.exists());
        writer
            .append(&Message::new("idea", "User", "user-requirement"))
            .unwrap();
        assert!(path.exists());
    }

    #[test]
    fn entries_read_back_in_append_order() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(TRANSCRIPT_FILE);
        let writer = TranscriptWriter::new(&path);

        writer
            .append(&Message::new("idea", "User", "user-requirement").with_send_to("TeamLeader"))
            .unwrap();
        writer
            .append(&Message::new("the PRD", "ProductManager", "write-prd"))
            .unwrap();

        let entries = read_transcript(&path).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].caused_by, "user-requirement");
        assert_eq!(entries[0].send_to.as_deref(), Some("TeamLeader"));
        assert_eq!(entries[1].origin_role, "ProductManager");
        assert!(entries[0].actor.contains('@'));
    }

    #[test]
    fn lines_are_single_json_objects() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(TRANSCRIPT_FILE);
        let writer = TranscriptWriter::new(&path);

        writer
            .append(&Message::new("line one\nline two", "PM", "write-prd"))
            .unwrap();

        let raw = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = raw.lines().collect();
        assert_eq!(lines.len(), 1);
        let parsed: TranscriptEntry = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed.content, "line one\nline two");
    }

    #[test]
    fn reading_a_missing_transcript_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let err = read_transcript(temp_dir.path().join("absent.ndjson")).unwrap_err();
        assert!(err.to_string().contains("failed to read"));
    }
}
