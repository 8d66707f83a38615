//! Commands run on a remote host over SSH.
//!
//! The session is switched to non-blocking mode once authenticated. Every
//! libssh2 call then returns `WouldBlock` instead of parking the thread,
//! which lets `interrupt` and `kill` take the channel lock between two reads
//! of a streaming command. All of it runs on tokio's blocking pool.

use super::directory::DirectoryProbe;
use super::tracking::{execute_with_tracking, DirectoryState, ShellTransport};
use super::{
    BackendError, BackendKind, CommandSlot, CommandStatus, ExecOutput, ExecutionBackend,
    OutputSink, SlotGuard, COMPLETION_TIMEOUT, DEFAULT_EXEC_TIMEOUT,
};
use crate::utils::shell;
use async_trait::async_trait;
use ssh2::{Channel, Session};
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);
const CHANNEL_OPEN_TIMEOUT: Duration = Duration::from_secs(10);
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);
const POLL_INTERVAL: Duration = Duration::from_millis(50);
const RETRY_INTERVAL: Duration = Duration::from_millis(5);
const READ_CHUNK: usize = 4096;
const CTRL_C: u8 = 0x03;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    Password(String),
    KeyFile(PathBuf),
}

/// Everything needed to open an SSH session to one server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTarget {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub credential: Credential,
}

impl RemoteTarget {
    pub fn display_address(&self) -> String {
        format!("{}@{}:{}", self.username, self.host, self.port)
    }
}

/// Wall-clock limit for a blocking loop. `None` never expires.
#[derive(Debug, Clone, Copy)]
struct Deadline {
    limit: Option<Duration>,
    started: Instant,
}

impl Deadline {
    fn after(limit: Option<Duration>) -> Self {
        Self {
            limit,
            started: Instant::now(),
        }
    }

    fn expired(&self) -> bool {
        self.limit
            .is_some_and(|limit| self.started.elapsed() >= limit)
    }

    /// Time left, or `None` once expired. Unlimited deadlines report
    /// `Duration::MAX`.
    fn left(&self) -> Option<Duration> {
        match self.limit {
            None => Some(Duration::MAX),
            Some(limit) => limit
                .checked_sub(self.started.elapsed())
                .filter(|left| !left.is_zero()),
        }
    }

    fn timeout_error(&self) -> BackendError {
        BackendError::Timeout(self.limit.unwrap_or_default())
    }
}

fn is_would_block(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::WouldBlock
}

/// Repeat a non-blocking libssh2 call until it stops returning `EAGAIN`.
fn retry<T, E: Into<io::Error>>(
    deadline: &Deadline,
    what: &str,
    mut op: impl FnMut() -> Result<T, E>,
) -> Result<T, BackendError> {
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(err) => {
                let err: io::Error = err.into();
                if !is_would_block(&err) {
                    return Err(BackendError::Remote(format!("{what}: {err}")));
                }
                if deadline.expired() {
                    return Err(deadline.timeout_error());
                }
                std::thread::sleep(RETRY_INTERVAL);
            }
        }
    }
}

async fn blocking<T, F>(work: F) -> Result<T, BackendError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, BackendError> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|err| BackendError::Remote(format!("SSH worker failed: {err}")))?
}

/// Resolve `host` on a helper thread so a hanging resolver cannot outlive
/// the connect deadline. The thread is abandoned when `wait` runs out.
fn resolve(host: &str, port: u16, wait: Duration) -> Result<SocketAddr, String> {
    let (tx, rx) = mpsc::channel();
    let host = host.to_string();
    std::thread::Builder::new()
        .name("ssh-resolve".to_string())
        .spawn(move || {
            let resolved = (host.as_str(), port)
                .to_socket_addrs()
                .map(|mut addresses| addresses.next());
            let _ = tx.send(resolved);
        })
        .map_err(|err| err.to_string())?;

    match rx.recv_timeout(wait) {
        Ok(Ok(Some(address))) => Ok(address),
        Ok(Ok(None)) => Err("host name did not resolve".to_string()),
        Ok(Err(err)) => Err(err.to_string()),
        Err(_) => Err("name resolution timed out".to_string()),
    }
}

/// Blocking timeout for the next libssh2 call, in the milliseconds it wants.
fn timeout_millis(left: Duration) -> u32 {
    left.as_millis().clamp(1, u128::from(u32::MAX)) as u32
}

/// Resolve, connect, handshake and authenticate, all within `limit`.
fn open_session(target: &RemoteTarget, limit: Duration) -> Result<Session, BackendError> {
    let connection = |err: &dyn std::fmt::Display| {
        BackendError::Connection(format!("{}: {err}", target.display_address()))
    };
    let deadline = Deadline::after(Some(limit));
    let left = || {
        deadline
            .left()
            .ok_or_else(|| connection(&format!("timed out after {}s", limit.as_secs_f32())))
    };

    let address = resolve(&target.host, target.port, left()?).map_err(|err| connection(&err))?;
    let tcp = TcpStream::connect_timeout(&address, left()?).map_err(|err| connection(&err))?;

    let mut session = Session::new().map_err(|err| connection(&err))?;
    session.set_timeout(timeout_millis(left()?));
    session.set_tcp_stream(tcp);
    session.handshake().map_err(|err| connection(&err))?;

    session.set_timeout(timeout_millis(left()?));
    let auth = match &target.credential {
        Credential::Password(password) => session.userauth_password(&target.username, password),
        Credential::KeyFile(path) => {
            session.userauth_pubkey_file(&target.username, None, path, None)
        }
    };
    auth.map_err(|err| BackendError::Connection(format!("Authentication failed: {err}")))?;
    if !session.authenticated() {
        return Err(BackendError::Connection("Authentication failed".to_string()));
    }

    session.set_blocking(false);
    Ok(session)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamKind {
    Stdout,
    Stderr,
}

/// The calls made on an exec channel once the command is running.
trait ExecChannel: Send {
    /// Read from one stream. `WouldBlock` means no data yet.
    fn read_stream(&mut self, kind: StreamKind, buf: &mut [u8]) -> io::Result<usize>;

    fn at_eof(&self) -> bool;

    fn send(&mut self, bytes: &[u8]) -> io::Result<usize>;

    fn request_close(&mut self) -> io::Result<()>;
}

impl ExecChannel for Channel {
    fn read_stream(&mut self, kind: StreamKind, buf: &mut [u8]) -> io::Result<usize> {
        match kind {
            StreamKind::Stdout => self.read(buf),
            StreamKind::Stderr => self.stderr().read(buf),
        }
    }

    fn at_eof(&self) -> bool {
        self.eof()
    }

    fn send(&mut self, bytes: &[u8]) -> io::Result<usize> {
        let written = self.write(bytes)?;
        let _ = self.flush();
        Ok(written)
    }

    fn request_close(&mut self) -> io::Result<()> {
        self.close().map_err(io::Error::from)
    }
}

/// Shared handle on a running exec channel.
pub struct ChannelControl<C = Channel> {
    channel: Mutex<C>,
    closed: AtomicBool,
}

impl<C: ExecChannel> ChannelControl<C> {
    fn new(channel: C) -> Self {
        Self {
            channel: Mutex::new(channel),
            closed: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> MutexGuard<'_, C> {
        self.channel
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Write Ctrl+C into the channel. The PTY turns it into SIGINT.
    fn interrupt(&self) -> bool {
        if self.is_closed() {
            return false;
        }
        let deadline = Deadline::after(Some(Duration::from_millis(200)));
        let mut channel = self.lock();
        loop {
            match channel.send(&[CTRL_C]) {
                Ok(written) if written > 0 => return true,
                Ok(_) => {}
                Err(err) if is_would_block(&err) => {}
                Err(err) => {
                    debug!(error = %err, "Failed to send interrupt");
                    return false;
                }
            }
            if deadline.expired() {
                return false;
            }
            std::thread::sleep(RETRY_INTERVAL);
        }
    }

    /// Mark the channel closed and ask the server to close it. The reader
    /// notices the flag on its next poll.
    fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::SeqCst) {
            return false;
        }
        if let Err(err) = self.lock().request_close() {
            if !is_would_block(&err) {
                debug!(error = %err, "Channel close failed");
            }
        }
        true
    }

    fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let deadline = Deadline::after(Some(CLOSE_TIMEOUT));
        let mut channel = self.lock();
        if let Err(err) = retry(&deadline, "close channel", || channel.request_close()) {
            debug!(error = %err, "Channel did not close cleanly");
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PumpEnd {
    /// The remote side sent EOF and everything was drained.
    Eof,
    /// `kill` closed the channel.
    Closed,
    TimedOut,
}

fn read_some<C: ExecChannel>(
    channel: &mut C,
    kind: StreamKind,
    buf: &mut [u8],
) -> io::Result<usize> {
    match channel.read_stream(kind, buf) {
        Ok(read) => Ok(read),
        Err(err) if is_would_block(&err) => Ok(0),
        Err(err) => Err(err),
    }
}

/// Poll both streams of the channel until EOF, forwarding every chunk in
/// arrival order. Data still buffered when EOF arrives is drained first.
/// The lock is dropped while sleeping.
fn pump<C: ExecChannel>(
    control: &ChannelControl<C>,
    deadline: &Deadline,
    mut on_chunk: impl FnMut(StreamKind, &[u8]),
) -> Result<PumpEnd, BackendError> {
    let mut buf = [0u8; READ_CHUNK];
    loop {
        if control.is_closed() {
            return Ok(PumpEnd::Closed);
        }

        let (progressed, eof) = {
            let mut channel = control.lock();
            let mut progressed = false;
            for kind in [StreamKind::Stdout, StreamKind::Stderr] {
                match read_some(&mut *channel, kind, &mut buf) {
                    Ok(0) => {}
                    Ok(read) => {
                        on_chunk(kind, &buf[..read]);
                        progressed = true;
                    }
                    Err(_) if control.is_closed() => return Ok(PumpEnd::Closed),
                    Err(err) => return Err(BackendError::Io(err)),
                }
            }
            (progressed, channel.at_eof())
        };

        if progressed {
            continue;
        }
        if eof {
            return Ok(PumpEnd::Eof);
        }
        if deadline.expired() {
            return Ok(PumpEnd::TimedOut);
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

fn open_exec(session: &Session, command: &str, pty: bool) -> Result<ChannelControl, BackendError> {
    let deadline = Deadline::after(Some(CHANNEL_OPEN_TIMEOUT));
    let mut channel = retry(&deadline, "open channel", || session.channel_session())?;
    if pty {
        retry(&deadline, "request pty", || channel.request_pty("xterm", None, None))?;
    }
    retry(&deadline, "exec", || channel.exec(command))?;
    Ok(ChannelControl::new(channel))
}

#[derive(Debug, Default)]
struct Captured {
    stdout: String,
    stderr: String,
}

/// Run a short helper command and collect its two streams separately.
fn capture(session: &Session, command: &str, limit: Duration) -> Result<Captured, BackendError> {
    let control = open_exec(session, command, false)?;
    let deadline = Deadline::after(Some(limit));
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let end = pump(&control, &deadline, |kind, bytes| match kind {
        StreamKind::Stdout => stdout.extend_from_slice(bytes),
        StreamKind::Stderr => stderr.extend_from_slice(bytes),
    });
    control.shutdown();
    if end? == PumpEnd::TimedOut {
        return Err(deadline.timeout_error());
    }
    Ok(Captured {
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
    })
}

/// Incremental UTF-8 decoding that never splits a character or a `\r\n`
/// pair across two chunks. PTY line endings are folded to `\n`.
#[derive(Default)]
struct ChunkDecoder {
    pending: Vec<u8>,
}

impl ChunkDecoder {
    fn push(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let split = self.pending.len() - incomplete_tail(&self.pending);
        let text = String::from_utf8_lossy(&self.pending[..split]).replace("\r\n", "\n");
        self.pending.drain(..split);
        text
    }

    fn finish(&mut self) -> String {
        let text = String::from_utf8_lossy(&self.pending).replace("\r\n", "\n");
        self.pending.clear();
        text
    }
}

fn incomplete_tail(bytes: &[u8]) -> usize {
    if bytes.last() == Some(&b'\r') {
        return 1;
    }
    let floor = bytes.len().saturating_sub(3);
    for index in (floor..bytes.len()).rev() {
        let byte = bytes[index];
        if byte & 0b1100_0000 == 0b1000_0000 {
            continue;
        }
        let needed = match byte {
            0xF0..=0xF7 => 4,
            0xE0..=0xEF => 3,
            0xC0..=0xDF => 2,
            _ => 1,
        };
        let have = bytes.len() - index;
        return if have < needed { have } else { 0 };
    }
    0
}

/// Prefix `script` with a change into the tracked directory.
fn remote_command(cwd: Option<&str>, script: &str) -> String {
    match cwd {
        Some(dir) => format!("cd {} && {script}", shell::quote(dir)),
        None => script.to_string(),
    }
}

fn probe_script(base: Option<&str>, target: Option<&str>) -> String {
    let hop = match target {
        Some(target) => format!("cd {}", shell::quote_cd_target(target)),
        None => "cd".to_string(),
    };
    match base {
        Some(base) => format!("cd {} && {hop} && pwd", shell::quote(base)),
        None => format!("{hop} && pwd"),
    }
}

/// A probe counts only when it printed a path and nothing on stderr.
fn probe_result(captured: &Captured, shown: &str) -> Result<String, String> {
    let stderr = captured.stderr.trim();
    if !stderr.is_empty() {
        return Err(stderr.lines().last().unwrap_or(stderr).to_string());
    }
    captured
        .stdout
        .trim()
        .lines()
        .last()
        .map(|line| line.trim().to_string())
        .filter(|line| !line.is_empty())
        .ok_or_else(|| format!("cd: {shown}: directory probe returned nothing"))
}

pub struct RemoteBackend {
    target: RemoteTarget,
    session: Mutex<Option<Session>>,
    directory: Mutex<DirectoryState>,
    slot: CommandSlot<Arc<ChannelControl>>,
}

impl RemoteBackend {
    pub fn new(target: RemoteTarget) -> Self {
        Self {
            target,
            session: Mutex::new(None),
            directory: Mutex::new(DirectoryState::default()),
            slot: CommandSlot::new(),
        }
    }

    pub fn target(&self) -> &RemoteTarget {
        &self.target
    }

    fn session_guard(&self) -> MutexGuard<'_, Option<Session>> {
        self.session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn directory_guard(&self) -> MutexGuard<'_, DirectoryState> {
        self.directory
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn session(&self) -> Result<Session, BackendError> {
        self.session_guard()
            .clone()
            .ok_or(BackendError::NotConnected)
    }

    async fn run_channel(
        &self,
        guard: &SlotGuard<Arc<ChannelControl>>,
        command: String,
        sink: Option<OutputSink>,
        limit: Option<Duration>,
    ) -> Result<ExecOutput, BackendError> {
        let session = self.session()?;
        let pty = sink.is_some();
        let control = Arc::new(blocking(move || open_exec(&session, &command, pty)).await?);
        guard.attach(Arc::clone(&control));

        let worker = Arc::clone(&control);
        let deadline = Deadline::after(limit);
        let pumped = blocking(move || stream_channel(&worker, &deadline, sink.as_ref())).await;
        settle(&self.target.name, guard, &control, &deadline, pumped)
    }
}

/// Pump `control` to its end, decoding the PTY output for `sink` and the
/// returned text, then close the channel.
fn stream_channel<C: ExecChannel>(
    control: &ChannelControl<C>,
    deadline: &Deadline,
    sink: Option<&OutputSink>,
) -> Result<(String, PumpEnd), BackendError> {
    let mut decoder = ChunkDecoder::default();
    let mut output = String::new();
    let mut deliver = |text: String, output: &mut String| {
        if text.is_empty() {
            return;
        }
        if let Some(sink) = sink {
            sink(&text);
        }
        output.push_str(&text);
    };

    let end = pump(control, deadline, |_, bytes| deliver(decoder.push(bytes), &mut output));
    deliver(decoder.finish(), &mut output);
    control.shutdown();
    end.map(|end| (output, end))
}

/// Turn the end of a streamed run into the command's result and release
/// the slot's control handle.
fn settle<C: ExecChannel>(
    server: &str,
    guard: &SlotGuard<Arc<ChannelControl<C>>>,
    control: &ChannelControl<C>,
    deadline: &Deadline,
    pumped: Result<(String, PumpEnd), BackendError>,
) -> Result<ExecOutput, BackendError> {
    match pumped {
        Ok((_, PumpEnd::TimedOut)) => {
            warn!(server, "Remote command timed out");
            guard.finish(CommandStatus::Failed);
            Err(deadline.timeout_error())
        }
        Ok((output, end)) => {
            debug!(server, ?end, "Remote command finished");
            Ok(ExecOutput {
                output,
                status: guard.finish(CommandStatus::Completed),
            })
        }
        Err(err) => {
            control.close();
            guard.finish(CommandStatus::Failed);
            Err(err)
        }
    }
}

#[async_trait]
impl DirectoryProbe for RemoteBackend {
    async fn probe_directory(
        &self,
        base: Option<&str>,
        target: Option<&str>,
    ) -> Result<String, String> {
        let shown = target.unwrap_or("~").to_string();
        let session = self.session().map_err(|err| err.to_string())?;
        let script = probe_script(base, target);
        let captured = blocking(move || capture(&session, &script, PROBE_TIMEOUT))
            .await
            .map_err(|err| format!("cd: {shown}: {err}"))?;
        probe_result(&captured, &shown)
    }
}

#[async_trait]
impl ShellTransport for RemoteBackend {
    type Control = Arc<ChannelControl>;

    fn directories(&self) -> DirectoryState {
        self.directory_guard().clone()
    }

    fn set_directories(&self, state: DirectoryState) {
        *self.directory_guard() = state;
    }

    async fn run(
        &self,
        guard: &SlotGuard<Arc<ChannelControl>>,
        cwd: Option<&str>,
        script: &str,
        sink: Option<OutputSink>,
        timeout: Option<Duration>,
    ) -> Result<ExecOutput, BackendError> {
        let command = remote_command(cwd, script);
        debug!(server = %self.target.name, command = %command, streaming = sink.is_some(), "Running remote command");
        let limit = match (&sink, timeout) {
            (_, Some(limit)) => Some(limit),
            (None, None) => Some(DEFAULT_EXEC_TIMEOUT),
            (Some(_), None) => None,
        };
        self.run_channel(guard, command, sink, limit).await
    }
}

#[async_trait]
impl ExecutionBackend for RemoteBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Remote
    }

    fn label(&self) -> String {
        self.target.name.clone()
    }

    fn is_connected(&self) -> bool {
        self.session_guard().is_some()
    }

    fn current_directory(&self) -> Option<String> {
        self.directories().reported
    }

    async fn connect(&self) -> Result<String, BackendError> {
        let target = self.target.clone();
        let session = blocking(move || open_session(&target, CONNECT_TIMEOUT)).await?;
        *self.session_guard() = Some(session.clone());

        let probed = blocking(move || capture(&session, "pwd", PROBE_TIMEOUT)).await;
        let directory = match probed {
            Ok(captured) => probe_result(&captured, "~").ok(),
            Err(err) => {
                warn!(server = %self.target.name, error = %err, "Initial directory probe failed");
                None
            }
        };
        debug!(server = %self.target.name, directory = directory.as_deref().unwrap_or("<unknown>"), "SSH session ready");
        self.set_directory(directory);

        Ok(format!("Connected to {}", self.target.display_address()))
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
            .signal(CommandStatus::Interrupted, |control| control.interrupt())
    }

    fn kill(&self) -> bool {
        self.slot
            .signal(CommandStatus::Killed, |control| control.close())
    }

    async fn completions(&self, partial: &str) -> Vec<String> {
        if partial.is_empty() {
            return Vec::new();
        }
        let Ok(session) = self.session() else {
            return Vec::new();
        };
        let script = remote_command(
            self.directory().as_deref(),
            &format!("bash -c {}", shell::quote(&shell::compgen_script(partial))),
        );
        match blocking(move || capture(&session, &script, COMPLETION_TIMEOUT)).await {
            Ok(captured) => shell::parse_completions(&captured.stdout),
            Err(err) => {
                debug!(server = %self.target.name, error = %err, "Remote completion lookup failed");
                Vec::new()
            }
        }
    }

    async fn disconnect(&self) {
        self.kill();
        let Some(session) = self.session_guard().take() else {
            return;
        };
        let result = blocking(move || {
            let deadline = Deadline::after(Some(CLOSE_TIMEOUT));
            retry(&deadline, "disconnect", || {
                session.disconnect(None, "Disconnecting", None)
            })
        })
        .await;
        if let Err(err) = result {
            debug!(server = %self.target.name, error = %err, "SSH disconnect was not clean");
        }
        self.set_directory(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Channel that replays queued chunks. Both streams block until
    /// `idle_polls` stdout reads have been made, and EOF is reported once
    /// those are used up.
    #[derive(Default)]
    struct ScriptedChannel {
        stdout: VecDeque<Vec<u8>>,
        stderr: VecDeque<Vec<u8>>,
        idle_polls: usize,
        eof: bool,
        polls: Vec<Instant>,
        sent: Vec<u8>,
        close_requests: usize,
    }

    impl ScriptedChannel {
        fn finished(stdout: &[&str], stderr: &[&str]) -> Self {
            Self {
                stdout: stdout.iter().map(|c| c.as_bytes().to_vec()).collect(),
                stderr: stderr.iter().map(|c| c.as_bytes().to_vec()).collect(),
                eof: true,
                ..Self::default()
            }
        }
    }

    impl ExecChannel for ScriptedChannel {
        fn read_stream(&mut self, kind: StreamKind, buf: &mut [u8]) -> io::Result<usize> {
            let queue = match kind {
                StreamKind::Stdout => {
                    self.polls.push(Instant::now());
                    if self.idle_polls > 0 {
                        self.idle_polls -= 1;
                        return Err(io::ErrorKind::WouldBlock.into());
                    }
                    &mut self.stdout
                }
                StreamKind::Stderr if self.idle_polls > 0 => {
                    return Err(io::ErrorKind::WouldBlock.into());
                }
                StreamKind::Stderr => &mut self.stderr,
            };
            match queue.pop_front() {
                Some(chunk) => {
                    buf[..chunk.len()].copy_from_slice(&chunk);
                    Ok(chunk.len())
                }
                None => Err(io::ErrorKind::WouldBlock.into()),
            }
        }

        fn at_eof(&self) -> bool {
            self.eof && self.idle_polls == 0
        }

        fn send(&mut self, bytes: &[u8]) -> io::Result<usize> {
            self.sent.extend_from_slice(bytes);
            Ok(bytes.len())
        }

        fn request_close(&mut self) -> io::Result<()> {
            self.close_requests += 1;
            Ok(())
        }
    }

    fn text(bytes: &[u8]) -> String {
        String::from_utf8_lossy(bytes).into_owned()
    }

    #[test]
    fn pump_drains_buffered_output_after_eof() {
        let control = ChannelControl::new(ScriptedChannel::finished(&["a", "b"], &["err"]));
        let mut seen = Vec::new();

        let end = pump(&control, &Deadline::after(Some(Duration::from_secs(5))), |kind, bytes| {
            seen.push((kind, text(bytes)))
        })
        .expect("pump");

        assert_eq!(end, PumpEnd::Eof);
        assert_eq!(
            seen,
            vec![
                (StreamKind::Stdout, "a".to_string()),
                (StreamKind::Stderr, "err".to_string()),
                (StreamKind::Stdout, "b".to_string()),
            ]
        );
    }

    #[test]
    fn kill_ends_stream_as_closed_and_reports_killed() {
        let slot: CommandSlot<Arc<ChannelControl<ScriptedChannel>>> = CommandSlot::new();
        let guard = slot.reserve().expect("reserve");
        let control = Arc::new(ChannelControl::new(ScriptedChannel::default()));
        guard.attach(Arc::clone(&control));
        let deadline = Deadline::after(None);

        let pumped = std::thread::scope(|scope| {
            scope.spawn(|| {
                std::thread::sleep(Duration::from_millis(100));
                assert!(slot.signal(CommandStatus::Killed, |control| control.close()));
            });
            stream_channel(&control, &deadline, None)
        });

        assert!(matches!(pumped, Ok((_, PumpEnd::Closed))));
        let result = settle("web", &guard, &control, &deadline, pumped).expect("result");
        assert_eq!(result.status, CommandStatus::Killed);
        assert!(control.lock().close_requests >= 1);
        assert!(!control.interrupt());
    }

    #[test]
    fn blocking_run_times_out() {
        let slot: CommandSlot<Arc<ChannelControl<ScriptedChannel>>> = CommandSlot::new();
        let guard = slot.reserve().expect("reserve");
        let control = Arc::new(ChannelControl::new(ScriptedChannel::default()));
        guard.attach(Arc::clone(&control));
        let limit = Duration::from_millis(100);
        let deadline = Deadline::after(Some(limit));

        let pumped = stream_channel(&control, &deadline, None);
        assert!(matches!(pumped, Ok((_, PumpEnd::TimedOut))));

        let result = settle("web", &guard, &control, &deadline, pumped);
        assert!(matches!(result, Err(BackendError::Timeout(d)) if d == limit));
        assert_eq!(control.lock().close_requests, 1);
        assert!(!slot.is_running());
    }

    #[test]
    fn idle_channel_is_polled_at_the_poll_interval() {
        let control = ChannelControl::new(ScriptedChannel {
            idle_polls: 4,
            ..ScriptedChannel::finished(&[], &["done\r\n"])
        });
        let seen = Arc::new(Mutex::new(Vec::<String>::new()));
        let collector = Arc::clone(&seen);
        let sink: OutputSink = Arc::new(move |chunk: &str| {
            collector.lock().unwrap().push(chunk.to_string());
        });

        let (output, end) =
            stream_channel(&control, &Deadline::after(Some(Duration::from_secs(5))), Some(&sink))
                .expect("stream");

        assert_eq!(end, PumpEnd::Eof);
        assert_eq!(output, "done\n");
        assert_eq!(seen.lock().unwrap().as_slice(), ["done\n".to_string()]);

        let polls = control.lock().polls.clone();
        assert!(polls.len() >= 4);
        for pair in polls[..4].windows(2) {
            let gap = pair[1] - pair[0];
            assert!(gap >= POLL_INTERVAL, "polled again after {gap:?}");
            assert!(gap < POLL_INTERVAL * 4, "waited {gap:?} between polls");
        }
    }

    #[test]
    fn interrupt_writes_ctrl_c() {
        let control = ChannelControl::new(ScriptedChannel::default());
        assert!(control.interrupt());
        assert_eq!(control.lock().sent, vec![CTRL_C]);
    }

    #[test]
    fn deadline_reports_time_left() {
        assert_eq!(Deadline::after(None).left(), Some(Duration::MAX));
        assert_eq!(Deadline::after(Some(Duration::ZERO)).left(), None);
        let left = Deadline::after(Some(Duration::from_secs(10))).left().expect("time left");
        assert!(left <= Duration::from_secs(10) && left > Duration::from_secs(9));
    }

    #[test]
    fn literal_addresses_resolve_without_waiting() {
        assert_eq!(
            resolve("127.0.0.1", 2222, Duration::from_secs(2)),
            Ok(SocketAddr::from(([127, 0, 0, 1], 2222)))
        );
    }

    #[test]
    fn connect_gives_up_within_one_deadline() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().expect("local addr").port();
        let target = RemoteTarget {
            host: "127.0.0.1".into(),
            port,
            ..target()
        };

        let started = Instant::now();
        let result = open_session(&target, Duration::from_millis(300));

        assert!(matches!(result, Err(BackendError::Connection(_))));
        assert!(started.elapsed() < Duration::from_secs(3));
        drop(listener);
    }

    fn target() -> RemoteTarget {
        RemoteTarget {
            name: "web".into(),
            host: "web.example.com".into(),
            port: 2222,
            username: "deploy".into(),
            credential: Credential::Password("secret".into()),
        }
    }

    #[test]
    fn decoder_keeps_split_characters_together() {
        let mut decoder = ChunkDecoder::default();
        let snowman = "☃".as_bytes();
        assert_eq!(decoder.push(&[b'a', snowman[0]]), "a");
        assert_eq!(decoder.push(&snowman[1..2]), "");
        assert_eq!(decoder.push(&snowman[2..]), "☃");
        assert_eq!(decoder.finish(), "");
    }

    #[test]
    fn decoder_folds_pty_line_endings() {
        let mut decoder = ChunkDecoder::default();
        assert_eq!(decoder.push(b"one\r"), "one");
        assert_eq!(decoder.push(b"\ntwo\r\n"), "\ntwo\n");
        assert_eq!(decoder.push(b"x\r"), "x");
        assert_eq!(decoder.finish(), "\r");
    }

    #[test]
    fn commands_are_prefixed_with_tracked_directory() {
        assert_eq!(remote_command(Some("/srv/my app"), "ls"), "cd '/srv/my app' && ls");
        assert_eq!(remote_command(None, "ls"), "ls");
    }

    #[test]
    fn probe_scripts_chain_from_base() {
        assert_eq!(
            probe_script(Some("/home/deploy"), Some("../x y")),
            "cd /home/deploy && cd '../x y' && pwd"
        );
        assert_eq!(probe_script(Some("/srv"), None), "cd /srv && cd && pwd");
        assert_eq!(probe_script(None, Some("~/logs")), "cd ~/logs && pwd");
    }

    #[test]
    fn probe_requires_clean_stderr() {
        let ok = Captured {
            stdout: "/srv/app\n".into(),
            stderr: String::new(),
        };
        assert_eq!(probe_result(&ok, "app"), Ok("/srv/app".into()));

        let failed = Captured {
            stdout: String::new(),
            stderr: "bash: line 1: cd: nope: No such file or directory\n".into(),
        };
        assert_eq!(
            probe_result(&failed, "nope"),
            Err("bash: line 1: cd: nope: No such file or directory".into())
        );

        let silent = Captured::default();
        assert!(probe_result(&silent, "x").is_err());
    }

    #[test]
    fn deadline_without_limit_never_expires() {
        assert!(!Deadline::after(None).expired());
        assert!(Deadline::after(Some(Duration::ZERO)).expired());
    }

    #[tokio::test]
    async fn unconnected_backend_refuses_work() {
        let backend = RemoteBackend::new(target());
        assert!(!backend.is_connected());
        assert_eq!(backend.label(), "web");
        assert!(matches!(
            backend.execute("ls", None, None).await,
            Err(BackendError::NotConnected)
        ));
        assert!(backend.completions("ls").await.is_empty());
        assert!(!backend.interrupt());
        assert!(!backend.kill());
        backend.disconnect().await;
    }

    #[test]
    fn address_is_user_at_host_port() {
        assert_eq!(target().display_address(), "deploy@web.example.com:2222");
    }
}
