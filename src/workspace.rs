//! Project workspace collaborator.
//!
//! A [`Workspace`] is the narrow file-and-shell interface actions and the
//! repo writer use to touch a project directory. [`LocalWorkspace`] is the
//! stock implementation: every path is validated as a safe relative path
//! before it touches the filesystem, listing uses glob patterns, and shell
//! commands run inside the root with a hard timeout.

use crate::generator::{reader_thread, wait_with_timeout};
use globset::Glob;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;
use thiserror::Error;

/// Error type for workspace operations.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    /// Path escapes the workspace root or is otherwise unsafe.
    #[error("unsafe path '{0}': must be relative with no traversal components")]
    UnsafePath(String),

    /// `create_file` target already exists.
    #[error("file '{0}' already exists")]
    AlreadyExists(String),

    /// `read_file` target does not exist.
    #[error("file '{0}' not found")]
    NotFound(String),

    /// Underlying filesystem operation failed.
    #[error("io error on '{path}': {message}")]
    Io {
        /// Path the operation targeted.
        path: String,
        /// Description of the failure.
        message: String,
    },

    /// Glob pattern could not be compiled.
    #[error("invalid glob pattern '{pattern}': {message}")]
    Pattern {
        /// The offending pattern.
        pattern: String,
        /// Description of the failure.
        message: String,
    },

    /// Shell command could not be parsed or spawned.
    #[error("command error: {0}")]
    Command(String),

    /// Shell command exceeded its timeout and was killed.
    #[error("command timed out after {}s", .timeout.as_secs())]
    Timeout {
        /// The enforced timeout.
        timeout: Duration,
    },
}

/// Captured output of one shell command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Captured stdout.
    pub stdout: String,
    /// Captured stderr.
    pub stderr: String,
    /// Exit code (None if the process was killed).
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    /// Whether the command exited successfully.
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// File and shell operations on a project directory.
pub trait Workspace: Send + Sync {
    /// Absolute root of the project directory.
    fn root(&self) -> &Path;

    /// Create a new file. Fails if the file already exists.
    fn create_file(&self, rel_path: &str, content: &str) -> Result<(), WorkspaceError>;

    /// Read an existing file.
    fn read_file(&self, rel_path: &str) -> Result<String, WorkspaceError>;

    /// Write a file, creating parent directories and overwriting as needed.
    fn write_file(&self, rel_path: &str, content: &str) -> Result<(), WorkspaceError>;

    /// List files matching a glob pattern, as sorted root-relative paths.
    fn list_files(&self, pattern: &str) -> Result<Vec<String>, WorkspaceError>;

    /// Run a shell command inside the root with a hard timeout.
    fn run_command(&self, command: &str, timeout: Duration)
    -> Result<CommandOutput, WorkspaceError>;
}

/// Workspace backed by a local directory.
#[derive(Debug, Clone)]
pub struct LocalWorkspace {
    root: PathBuf,
}

impl LocalWorkspace {
    /// Open (creating if needed) a workspace rooted at `root`.
    pub fn create(root: impl Into<PathBuf>) -> Result<Self, WorkspaceError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| WorkspaceError::Io {
            path: root.display().to_string(),
            message: e.to_string(),
        })?;
        Ok(Self { root })
    }

    /// Resolve a validated relative path against the root.
    fn resolve(&self, rel_path: &str) -> Result<PathBuf, WorkspaceError> {
        validate_rel_path(rel_path)?;
        Ok(self.root.join(rel_path))
    }
}

/// Validate that a path is relative and free of traversal components.
///
/// Rejects empty paths, absolute paths, backslashes, and any `..` segment.
fn validate_rel_path(rel_path: &str) -> Result<(), WorkspaceError> {
    if rel_path.is_empty()
        || rel_path.starts_with('/')
        || rel_path.contains('\\')
        || rel_path
            .split('/')
            .any(|segment| segment == ".." || segment.is_empty())
    {
        return Err(WorkspaceError::UnsafePath(rel_path.to_string()));
    }
    Ok(())
}

impl Workspace for LocalWorkspace {
    fn root(&self) -> &Path {
        &self.root
    }

    fn create_file(&self, rel_path: &str, content: &str) -> Result<(), WorkspaceError> {
        let path = self.resolve(rel_path)?;
        if path.exists() {
            return Err(WorkspaceError::AlreadyExists(rel_path.to_string()));
        }
        self.write_file(rel_path, content)
    }

    fn read_file(&self, rel_path: &str) -> Result<String, WorkspaceError> {
        let path = self.resolve(rel_path)?;
        if !path.exists() {
            return Err(WorkspaceError::NotFound(rel_path.to_string()));
        }
        fs::read_to_string(&path).map_err(|e| WorkspaceError::Io {
            path: rel_path.to_string(),
            message: e.to_string(),
        })
    }

    fn write_file(&self, rel_path: &str, content: &str) -> Result<(), WorkspaceError> {
        let path = self.resolve(rel_path)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| WorkspaceError::Io {
                path: parent.display().to_string(),
                message: e.to_string(),
            })?;
        }
        fs::write(&path, content).map_err(|e| WorkspaceError::Io {
            path: rel_path.to_string(),
            message: e.to_string(),
        })
    }

    fn list_files(&self, pattern: &str) -> Result<Vec<String>, WorkspaceError> {
        let matcher = Glob::new(pattern)
            .map_err(|e| WorkspaceError::Pattern {
                pattern: pattern.to_string(),
                message: e.to_string(),
            })?
            .compile_matcher();

        let mut matches = Vec::new();
        let mut stack = vec![self.root.clone()];
        while let Some(dir) = stack.pop() {
            let entries = fs::read_dir(&dir).map_err(|e| WorkspaceError::Io {
                path: dir.display().to_string(),
                message: e.to_string(),
            })?;
            for entry in entries {
                let entry = entry.map_err(|e| WorkspaceError::Io {
                    path: dir.display().to_string(),
                    message: e.to_string(),
                })?;
                let path = entry.path();
                if path.is_dir() {
                    stack.push(path);
                } else if let Ok(rel) = path.strip_prefix(&self.root) {
                    let rel = rel.to_string_lossy().replace('\\', "/");
                    if matcher.is_match(&rel) {
                        matches.push(rel);
                    }
                }
            }
        }

        // Deterministic regardless of directory traversal order.
        matches.sort();
        Ok(matches)
    }

    fn run_command(
        &self,
        command: &str,
        timeout: Duration,
    ) -> Result<CommandOutput, WorkspaceError> {
        let args = shell_words::split(command).map_err(|e| {
            WorkspaceError::Command(format!("failed to parse command '{}': {}", command, e))
        })?;

        let Some((program, rest)) = args.split_first() else {
            return Err(WorkspaceError::Command(
                "command is empty after parsing".to_string(),
            ));
        };

        let mut child = Command::new(program)
            .args(rest)
            .current_dir(&self.root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                WorkspaceError::Command(format!("failed to execute '{}': {}", program, e))
            })?;

        let stdout_handle = reader_thread(child.stdout.take());
        let stderr_handle = reader_thread(child.stderr.take());

        let (exit_code, timed_out) = wait_with_timeout(&mut child, timeout);
        let stdout = stdout_handle.join().unwrap_or_default();
        let stderr = stderr_handle.join().unwrap_or_default();

        if timed_out {
            return Err(WorkspaceError::Timeout { timeout });
        }

        Ok(CommandOutput {
            stdout,
            stderr,
            exit_code,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const TIMEOUT: Duration = Duration::from_secs(10);

    fn make_workspace() -> (TempDir, LocalWorkspace) {
        let temp_dir = TempDir::new().unwrap();
        let workspace = LocalWorkspace::create(temp_dir.path().join("project")).unwrap();
        (temp_dir, workspace)
    }

    #[test]
    fn create_write_read_roundtrip() {
        let (_temp, ws) = make_workspace();

        ws.create_file("src/main.rs", "fn main() {}").unwrap();
        assert_eq!(ws.read_file("src/main.rs").unwrap(), "fn main() {}");

        ws.write_file("src/main.rs", "fn main() { run() }").unwrap();
        assert_eq!(ws.read_file("src/main.rs").unwrap(), "fn main() { run() }");
    }

    #[test]
    fn create_refuses_existing_file() {
        let (_temp, ws) = make_workspace();
        ws.create_file("README.md", "# a").unwrap();

        let err = ws.create_file("README.md", "# b").unwrap_err();
        assert!(matches!(err, WorkspaceError::AlreadyExists(_)));
        // Original content untouched.
        assert_eq!(ws.read_file("README.md").unwrap(), "# a");
    }

    #[test]
    fn read_missing_file_is_not_found() {
        let (_temp, ws) = make_workspace();
        let err = ws.read_file("nope.txt").unwrap_err();
        assert!(matches!(err, WorkspaceError::NotFound(_)));
    }

    #[test]
    fn traversal_paths_are_rejected() {
        let (_temp, ws) = make_workspace();
        for bad in ["../escape.txt", "/abs.txt", "a/../b.txt", "a\\b.txt", ""] {
            let err = ws.write_file(bad, "x").unwrap_err();
            assert!(matches!(err, WorkspaceError::UnsafePath(_)), "path: {bad:?}");
        }
    }

    #[test]
    fn list_files_matches_glob_sorted() {
        let (_temp, ws) = make_workspace();
        ws.write_file("src/lib.rs", "").unwrap();
        ws.write_file("src/app/main.rs", "").unwrap();
        ws.write_file("README.md", "").unwrap();

        let rs = ws.list_files("**/*.rs").unwrap();
        assert_eq!(rs, vec!["src/app/main.rs", "src/lib.rs"]);

        let md = ws.list_files("*.md").unwrap();
        assert_eq!(md, vec!["README.md"]);
    }

    #[test]
    fn list_files_rejects_bad_pattern() {
        let (_temp, ws) = make_workspace();
        let err = ws.list_files("a[").unwrap_err();
        assert!(matches!(err, WorkspaceError::Pattern { .. }));
    }

    #[test]
    fn run_command_captures_output_and_exit_code() {
        let (_temp, ws) = make_workspace();
        ws.write_file("note.txt", "hello").unwrap();

        let output = ws.run_command("cat note.txt", TIMEOUT).unwrap();
        assert!(output.success());
        assert_eq!(output.stdout, "hello");

        let output = ws.run_command("sh -c \"echo oops >&2; exit 2\"", TIMEOUT).unwrap();
        assert!(!output.success());
        assert_eq!(output.exit_code, Some(2));
        assert!(output.stderr.contains("oops"));
    }

    #[test]
    fn run_command_times_out() {
        let (_temp, ws) = make_workspace();
        let err = ws
            .run_command("sleep 10", Duration::from_millis(200))
            .unwrap_err();
        assert!(matches!(err, WorkspaceError::Timeout { .. }));
    }

    #[test]
    fn run_command_rejects_garbage() {
        let (_temp, ws) = make_workspace();
        assert!(ws.run_command("", TIMEOUT).is_err());
        assert!(ws.run_command("echo \"unmatched", TIMEOUT).is_err());
        assert!(ws.run_command("no_such_program_xyz_123", TIMEOUT).is_err());
    }
}
