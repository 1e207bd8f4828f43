//! External text-completion collaborators.
//!
//! A [`Generator`] turns a prompt (plus optional system messages) into text.
//! Implementations are interchangeable: [`CommandGenerator`] shells out to a
//! configured CLI (the prompt is piped on stdin, stdout is the completion),
//! [`ScriptedGenerator`] replays canned responses for tests and dry runs.
//! Every call is timeout-bound; exceeding the timeout is a failure, not a
//! hang.

use std::collections::VecDeque;
use std::io::{Read, Write};
use std::process::{Child, Command, Stdio};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Error type for generator calls.
#[derive(Debug, Clone, Error)]
pub enum GeneratorError {
    /// No generator is bound where one is required.
    #[error("no generator is bound for this action")]
    Unavailable,

    /// The call exceeded its timeout and was killed.
    #[error("generator call timed out after {}s", .timeout.as_secs())]
    Timeout {
        /// The enforced timeout.
        timeout: Duration,
    },

    /// The backend reported a failure (bad exit, unreadable output, auth).
    #[error("generator call failed: {0}")]
    Failed(String),
}

/// External text-completion collaborator.
///
/// `ask` blocks for at most `timeout`; implementations must enforce the
/// bound themselves.
pub trait Generator: Send + Sync {
    /// Complete `prompt` into text. `system_msgs` are instructions that
    /// precede the prompt; how they are combined is up to the backend.
    fn ask(
        &self,
        prompt: &str,
        system_msgs: &[String],
        timeout: Duration,
    ) -> Result<String, GeneratorError>;
}

/// Generator that invokes an external command per call.
///
/// The command line is parsed once at construction with shell-words. For
/// each call, system messages and the prompt are concatenated onto stdin
/// and stdout is returned (trailing newline trimmed).
#[derive(Debug, Clone)]
pub struct CommandGenerator {
    program: String,
    args: Vec<String>,
}

impl CommandGenerator {
    /// Parse a command line into a generator.
    pub fn new(command: &str) -> Result<Self, GeneratorError> {
        let parts = shell_words::split(command).map_err(|e| {
            GeneratorError::Failed(format!(
                "failed to parse generator command '{}': {}",
                command, e
            ))
        })?;

        let Some((program, args)) = parts.split_first() else {
            return Err(GeneratorError::Failed(
                "generator command is empty".to_string(),
            ));
        };

        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }
}

impl Generator for CommandGenerator {
    fn ask(
        &self,
        prompt: &str,
        system_msgs: &[String],
        timeout: Duration,
    ) -> Result<String, GeneratorError> {
        let mut input = String::new();
        for msg in system_msgs {
            input.push_str(msg);
            input.push_str("\n\n");
        }
        input.push_str(prompt);

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                GeneratorError::Failed(format!(
                    "failed to spawn generator command '{}': {}",
                    self.program, e
                ))
            })?;

        // The child may exit without draining stdin; a broken pipe here is
        // its problem to report via exit code, not ours.
        if let Some(mut stdin) = child.stdin.take() {
            let _ = stdin.write_all(input.as_bytes());
        }

        let stdout_handle = reader_thread(child.stdout.take());
        let stderr_handle = reader_thread(child.stderr.take());

        let (exit_code, timed_out) = wait_with_timeout(&mut child, timeout);
        let stdout = stdout_handle.join().unwrap_or_default();
        let stderr = stderr_handle.join().unwrap_or_default();

        if timed_out {
            return Err(GeneratorError::Timeout { timeout });
        }

        match exit_code {
            Some(0) => Ok(stdout.trim_end().to_string()),
            code => Err(GeneratorError::Failed(format!(
                "generator command '{}' exited with {:?}: {}",
                self.program,
                code,
                stderr.trim_end()
            ))),
        }
    }
}

/// Drain a child pipe on a helper thread so large outputs cannot deadlock
/// the timeout poll loop.
pub(crate) fn reader_thread<R: Read + Send + 'static>(
    source: Option<R>,
) -> std::thread::JoinHandle<String> {
    std::thread::spawn(move || {
        let mut buf = String::new();
        if let Some(mut source) = source {
            let _ = source.read_to_string(&mut buf);
        }
        buf
    })
}

/// Wait for a child process with timeout.
///
/// Returns (exit_code, timed_out). On timeout the process is killed.
pub(crate) fn wait_with_timeout(child: &mut Child, timeout: Duration) -> (Option<i32>, bool) {
    let start = Instant::now();
    let poll_interval = Duration::from_millis(50);

    loop {
        match child.try_wait() {
            Ok(Some(status)) => return (status.code(), false),
            Ok(None) => {
                if start.elapsed() >= timeout {
                    // On Unix this is SIGKILL; on Windows TerminateProcess.
                    let _ = child.kill();
                    let _ = child.wait();
                    return (None, true);
                }
                std::thread::sleep(poll_interval);
            }
            Err(_) => {
                let _ = child.kill();
                let _ = child.wait();
                return (None, false);
            }
        }
    }
}

/// Generator that replays a fixed script of responses.
///
/// Responses are returned in order; once the script is exhausted the
/// generator fails, which keeps tests honest about how many calls a
/// scenario makes. Prompts are recorded for assertions.
#[derive(Debug, Default)]
pub struct ScriptedGenerator {
    responses: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    /// Script a sequence of responses.
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: Mutex::new(responses.into_iter().map(Into::into).collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Prompts received so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .clone()
    }

    /// Number of calls received so far.
    pub fn call_count(&self) -> usize {
        self.prompts
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .len()
    }
}

impl Generator for ScriptedGenerator {
    fn ask(
        &self,
        prompt: &str,
        _system_msgs: &[String],
        _timeout: Duration,
    ) -> Result<String, GeneratorError> {
        self.prompts
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .push(prompt.to_string());

        self.responses
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .pop_front()
            .ok_or_else(|| GeneratorError::Failed("response script exhausted".to_string()))
    }
}
