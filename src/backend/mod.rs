//! Shell execution backends.
//!
//! [`ExecutionBackend`] is the one capability surface the dispatch loop, the
//! completion lookup and the UI talk to. Two variants implement it:
//!
//! - [`local::LocalBackend`] spawns `sh -c` children, each in its own process
//!   group so interrupts never reach the host process.
//! - [`remote::RemoteBackend`] runs every command on a fresh SSH exec channel.
//!
//! Neither transport keeps a shell alive between commands, so both route
//! `execute` through [`tracking::execute_with_tracking`], which carries the
//! working directory forward across `cd` segments.

pub mod directory;
pub mod local;
pub mod remote;
mod slot;
pub mod tracking;

use async_trait::async_trait;
use std::error::Error as StdError;
use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::Duration;

pub use slot::{CommandSlot, SlotGuard};

/// Receives output chunks, in production order, while a command runs.
pub type OutputSink = Arc<dyn Fn(&str) + Send + Sync>;

/// Timeout applied to `execute` calls that have no sink and no explicit limit.
pub const DEFAULT_EXEC_TIMEOUT: Duration = Duration::from_secs(30);

/// Upper bound for a completion lookup.
pub const COMPLETION_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    Local,
    Remote,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BackendKind::Local => "local",
            BackendKind::Remote => "remote",
        }
    }
}

/// Lifecycle of one command. Everything but `Running` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    Running,
    Completed,
    Interrupted,
    Killed,
    Failed,
}

impl CommandStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, CommandStatus::Running)
    }
}

/// Result of a finished `execute` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutput {
    /// Combined stdout and stderr, in the order it was produced.
    pub output: String,
    pub status: CommandStatus,
}

impl ExecOutput {
    pub fn completed(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            status: CommandStatus::Completed,
        }
    }
}

/// Errors surfaced by a backend operation.
#[derive(Debug)]
pub enum BackendError {
    /// The backend has not been connected, or was disconnected.
    NotConnected,
    /// Another command already owns this backend.
    Busy,
    /// The local child process could not be started.
    Spawn(io::Error),
    /// Reading command output failed.
    Io(io::Error),
    /// A blocking execution ran past its limit. The command may still be running.
    Timeout(Duration),
    /// Establishing or authenticating the remote connection failed.
    Connection(String),
    /// The remote transport failed after the connection was established.
    Remote(String),
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::NotConnected => write!(f, "Not connected"),
            BackendError::Busy => write!(f, "A command is already running"),
            BackendError::Spawn(err) => write!(f, "Failed to start command: {err}"),
            BackendError::Io(err) => write!(f, "Failed to read command output: {err}"),
            BackendError::Timeout(limit) => {
                write!(f, "Command timed out ({} seconds)", limit.as_secs())
            }
            BackendError::Connection(message) => write!(f, "Connection failed: {message}"),
            BackendError::Remote(message) => write!(f, "Remote error: {message}"),
        }
    }
}

impl StdError for BackendError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            BackendError::Spawn(err) | BackendError::Io(err) => Some(err),
            _ => None,
        }
    }
}

/// Uniform command execution over a local or remote shell.
///
/// A backend owns at most one running command. `interrupt` and `kill` talk
/// to that command's OS handle directly, so they work while another task is
/// blocked inside `execute`.
#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Human-readable name for status lines ("Local", a server profile name).
    fn label(&self) -> String;

    fn is_connected(&self) -> bool;

    /// Working directory commands will run in, if known.
    fn current_directory(&self) -> Option<String>;

    /// Make the backend ready for commands. Returns a diagnostic for the user.
    async fn connect(&self) -> Result<String, BackendError>;

    /// Run one command string to completion.
    ///
    /// With a `sink`, output is streamed as it arrives and `timeout` is only
    /// applied when given. Without one, output is buffered and the timeout
    /// defaults to [`DEFAULT_EXEC_TIMEOUT`].
    async fn execute(
        &self,
        command: &str,
        sink: Option<OutputSink>,
        timeout: Option<Duration>,
    ) -> Result<ExecOutput, BackendError>;

    /// Deliver an interrupt to the running command. False when nothing runs
    /// or delivery failed.
    fn interrupt(&self) -> bool;

    /// Forcibly terminate the running command. False when nothing runs.
    fn kill(&self) -> bool;

    /// Shell completions for a partial token. Never fails; errors yield an
    /// empty list.
    async fn completions(&self, partial: &str) -> Vec<String>;

    /// Kill any running command and release the connection.
    async fn disconnect(&self);
}

/// Compare two backend handles by identity.
pub fn same_backend(a: &Arc<dyn ExecutionBackend>, b: &Arc<dyn ExecutionBackend>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}
