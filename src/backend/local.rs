//! Commands spawned on this machine through `sh -c`.

use super::directory::{normalize_posix, DirectoryProbe};
use super::tracking::{execute_with_tracking, DirectoryState, ShellTransport};
use super::{
    BackendError, BackendKind, CommandSlot, CommandStatus, ExecOutput, ExecutionBackend,
    OutputSink, SlotGuard, COMPLETION_TIMEOUT, DEFAULT_EXEC_TIMEOUT,
};
use crate::utils::shell;
use async_trait::async_trait;
use directories::BaseDirs;
use std::io;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, warn};

const READ_CHUNK: usize = 4096;

/// Process group owned by one spawned command. The child is its leader.
#[derive(Debug, Clone, Copy)]
pub struct ProcessGroup {
    pgid: i32,
}

#[cfg(unix)]
impl ProcessGroup {
    fn signal(self, signal: libc::c_int) -> bool {
        if self.pgid <= 0 {
            return false;
        }
        // SAFETY: getpgrp has no preconditions.
        let own_group = unsafe { libc::getpgrp() };
        if self.pgid == own_group {
            warn!(pgid = self.pgid, "Refusing to signal our own process group");
            return false;
        }
        // SAFETY: killpg only sends a signal; the group id was checked above.
        let delivered = unsafe { libc::killpg(self.pgid, signal) } == 0;
        if !delivered {
            debug!(pgid = self.pgid, signal, error = %io::Error::last_os_error(), "killpg failed");
        }
        delivered
    }

    fn interrupt(self) -> bool {
        self.signal(libc::SIGINT)
    }

    fn kill(self) -> bool {
        self.signal(libc::SIGKILL)
    }
}

#[cfg(not(unix))]
impl ProcessGroup {
    fn interrupt(self) -> bool {
        false
    }

    fn kill(self) -> bool {
        false
    }
}

pub struct LocalBackend {
    directory: Mutex<DirectoryState>,
    connected: AtomicBool,
    slot: CommandSlot<ProcessGroup>,
}

impl Default for LocalBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalBackend {
    pub fn new() -> Self {
        Self {
            directory: Mutex::new(DirectoryState::default()),
            connected: AtomicBool::new(false),
            slot: CommandSlot::new(),
        }
    }

    /// True while a spawned process is attached to the backend.
    pub fn has_running_command(&self) -> bool {
        self.slot.is_running()
    }

    fn directory_guard(&self) -> std::sync::MutexGuard<'_, DirectoryState> {
        self.directory
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn process_directory() -> Option<String> {
    std::env::current_dir()
        .ok()
        .map(|path| path.to_string_lossy().into_owned())
}

/// Splits raw output into lines, holding back a trailing partial line.
#[derive(Default)]
struct LineBuffer {
    buffer: Vec<u8>,
}

impl LineBuffer {
    fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(offset) = memchr::memchr(b'\n', &self.buffer[start..]) {
            let end = start + offset + 1;
            lines.push(String::from_utf8_lossy(&self.buffer[start..end]).into_owned());
            start = end;
        }
        self.buffer.drain(..start);
        lines
    }

    fn finish(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let rest = String::from_utf8_lossy(&self.buffer).into_owned();
        self.buffer.clear();
        Some(rest)
    }
}

async fn read_lines<R: AsyncRead + Unpin>(
    mut reader: R,
    sink: Option<&OutputSink>,
) -> Result<String, BackendError> {
    let mut output = String::new();
    let mut lines = LineBuffer::default();
    let mut chunk = [0u8; READ_CHUNK];

    let deliver = |line: String, output: &mut String| {
        if let Some(sink) = sink {
            sink(&line);
        }
        output.push_str(&line);
    };

    loop {
        let read = reader.read(&mut chunk).await.map_err(BackendError::Io)?;
        if read == 0 {
            break;
        }
        for line in lines.push(&chunk[..read]) {
            deliver(line, &mut output);
        }
    }
    if let Some(rest) = lines.finish() {
        deliver(rest, &mut output);
    }
    Ok(output)
}

#[async_trait]
impl DirectoryProbe for LocalBackend {
    async fn probe_directory(
        &self,
        base: Option<&str>,
        target: Option<&str>,
    ) -> Result<String, String> {
        let shown = target.unwrap_or("~");
        let home = self.home_directory();

        let candidate = match target {
            None => home.ok_or_else(|| "cd: HOME not set".to_string())?,
            Some(path) if path.starts_with('/') => path.to_string(),
            Some(path) if path.starts_with("~/") => {
                let home = home.ok_or_else(|| "cd: HOME not set".to_string())?;
                format!("{home}/{}", &path[2..])
            }
            Some(path) => {
                let base = base
                    .map(str::to_string)
                    .or_else(process_directory)
                    .ok_or_else(|| format!("cd: {shown}: current directory unknown"))?;
                format!("{base}/{path}")
            }
        };

        let resolved = normalize_posix(&candidate);
        match tokio::fs::metadata(&resolved).await {
            Ok(metadata) if metadata.is_dir() => Ok(resolved),
            Ok(_) => Err(format!("cd: {shown}: Not a directory")),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                Err(format!("cd: {shown}: No such file or directory"))
            }
            Err(err) if err.kind() == io::ErrorKind::PermissionDenied => {
                Err(format!("cd: {shown}: Permission denied"))
            }
            Err(err) => Err(format!("cd: {shown}: {err}")),
        }
    }

    fn home_directory(&self) -> Option<String> {
        BaseDirs::new().map(|dirs| dirs.home_dir().to_string_lossy().into_owned())
    }
}

#[async_trait]
impl ShellTransport for LocalBackend {
    type Control = ProcessGroup;

    fn directories(&self) -> DirectoryState {
        self.directory_guard().clone()
    }

    fn set_directories(&self, state: DirectoryState) {
        *self.directory_guard() = state;
    }

    async fn run(
        &self,
        guard: &SlotGuard<ProcessGroup>,
        cwd: Option<&str>,
        script: &str,
        sink: Option<OutputSink>,
        timeout: Option<Duration>,
    ) -> Result<ExecOutput, BackendError> {
        let mut command = Command::new("sh");
        command
            .arg("-c")
            .arg(format!("exec 2>&1\n{script}"))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);
        if let Some(cwd) = cwd {
            command.current_dir(cwd);
        }

        let mut child = command.spawn().map_err(BackendError::Spawn)?;
        let group = ProcessGroup {
            pgid: child.id().map(|pid| pid as i32).unwrap_or(0),
        };
        debug!(pgid = group.pgid, cwd = cwd.unwrap_or("<inherited>"), script, "Spawned local command");
        guard.attach(group);

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| BackendError::Io(io::Error::other("stdout was not captured")))?;

        let limit = match (timeout, sink.is_some()) {
            (Some(limit), _) => Some(limit),
            (None, false) => Some(DEFAULT_EXEC_TIMEOUT),
            (None, true) => None,
        };

        let run = async {
            let output = read_lines(stdout, sink.as_ref()).await?;
            let status = child.wait().await.map_err(BackendError::Io)?;
            debug!(pgid = group.pgid, ?status, "Local command exited");
            Ok::<_, BackendError>(output)
        };

        let result = match limit {
            Some(limit) => match tokio::time::timeout(limit, run).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(pgid = group.pgid, seconds = limit.as_secs(), "Local command timed out");
                    group.kill();
                    guard.finish(CommandStatus::Failed);
                    return Err(BackendError::Timeout(limit));
                }
            },
            None => run.await,
        };

        match result {
            Ok(output) => Ok(ExecOutput {
                output,
                status: guard.finish(CommandStatus::Completed),
            }),
            Err(err) => {
                group.kill();
                guard.finish(CommandStatus::Failed);
                Err(err)
            }
        }
    }
}

#[async_trait]
impl ExecutionBackend for LocalBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    fn label(&self) -> String {
        "Local".to_string()
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn current_directory(&self) -> Option<String> {
        self.directories().reported
    }

    async fn connect(&self) -> Result<String, BackendError> {
        let directory = process_directory();
        debug!(directory = directory.as_deref().unwrap_or("<unknown>"), "Local backend ready");
        self.set_directory(directory);
        self.connected.store(true, Ordering::SeqCst);
        Ok("Connected to local terminal".to_string())
    }

    async fn execute(
        &self,
        command: &str,
        sink: Option<OutputSink>,
        timeout: Option<Duration>,
    ) -> Result<ExecOutput, BackendError> {
        if !self.is_connected() {
            return Err(BackendError::NotConnected);
        }
        let guard = self.slot.reserve()?;
        execute_with_tracking(self, &guard, command, sink, timeout).await
    }

    fn interrupt(&self) -> bool {
        self.slot
            .signal(CommandStatus::Interrupted, |group| group.interrupt())
    }

    fn kill(&self) -> bool {
        self.slot.signal(CommandStatus::Killed, |group| group.kill())
    }

    async fn completions(&self, partial: &str) -> Vec<String> {
        if partial.is_empty() {
            return Vec::new();
        }

        let mut command = Command::new("bash");
        command
            .arg("-c")
            .arg(shell::compgen_script(partial))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        if let Some(directory) = self.directory() {
            command.current_dir(directory);
        }

        match tokio::time::timeout(COMPLETION_TIMEOUT, command.output()).await {
            Ok(Ok(output)) => shell::parse_completions(&String::from_utf8_lossy(&output.stdout)),
            Ok(Err(err)) => {
                debug!(error = %err, "Completion lookup failed");
                Vec::new()
            }
            Err(_) => {
                debug!(partial, "Completion lookup timed out");
                Vec::new()
            }
        }
    }

    async fn disconnect(&self) {
        self.kill();
        self.connected.store(false, Ordering::SeqCst);
    }
}
