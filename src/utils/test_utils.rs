//! In-memory stand-ins for the model, the backends and the shell transport.

use crate::api::{ModelClient, ModelError};
use crate::backend::directory::{normalize_posix, DirectoryProbe};
use crate::backend::tracking::{DirectoryState, ShellTransport};
use crate::backend::{
    BackendError, BackendKind, CommandStatus, ExecOutput, ExecutionBackend, OutputSink, SlotGuard,
};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Scripted result for one [`FakeBackend::execute`] call.
#[derive(Debug, Clone)]
pub enum FakeExec {
    Output {
        text: String,
        status: CommandStatus,
        /// Directory the backend reports afterwards, if it changes.
        directory: Option<String>,
    },
    Fail(String),
}

pub struct FakeBackend {
    directory: Mutex<Option<String>>,
    connected: AtomicBool,
    results: Mutex<VecDeque<FakeExec>>,
    executed: Mutex<Vec<String>>,
    completions: Mutex<Vec<String>>,
    connect_error: Mutex<Option<String>>,
    kills: AtomicUsize,
    interrupts: AtomicUsize,
}

impl FakeBackend {
    pub fn new(directory: Option<&str>) -> Self {
        Self {
            directory: Mutex::new(directory.map(str::to_string)),
            connected: AtomicBool::new(false),
            results: Mutex::new(VecDeque::new()),
            executed: Mutex::new(Vec::new()),
            completions: Mutex::new(Vec::new()),
            connect_error: Mutex::new(None),
            kills: AtomicUsize::new(0),
            interrupts: AtomicUsize::new(0),
        }
    }

    pub fn push_output(&self, text: &str) {
        self.push_result(FakeExec::Output {
            text: text.to_string(),
            status: CommandStatus::Completed,
            directory: None,
        });
    }

    pub fn push_result(&self, result: FakeExec) {
        self.results.lock().unwrap().push_back(result);
    }

    pub fn set_completions(&self, candidates: &[&str]) {
        *self.completions.lock().unwrap() = candidates.iter().map(|c| c.to_string()).collect();
    }

    pub fn fail_connect(&self, message: &str) {
        *self.connect_error.lock().unwrap() = Some(message.to_string());
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }

    pub fn was_killed(&self) -> bool {
        self.kills.load(Ordering::SeqCst) > 0
    }

    pub fn was_interrupted(&self) -> bool {
        self.interrupts.load(Ordering::SeqCst) > 0
    }
}

#[async_trait]
impl ExecutionBackend for FakeBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    fn label(&self) -> String {
        "Fake".to_string()
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn current_directory(&self) -> Option<String> {
        self.directory.lock().unwrap().clone()
    }

    async fn connect(&self) -> Result<String, BackendError> {
        if let Some(message) = self.connect_error.lock().unwrap().clone() {
            return Err(BackendError::Connection(message));
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok("Connected to fake terminal".to_string())
    }

    async fn execute(
        &self,
        command: &str,
        sink: Option<OutputSink>,
        _timeout: Option<Duration>,
    ) -> Result<ExecOutput, BackendError> {
        self.executed.lock().unwrap().push(command.to_string());
        let next = self.results.lock().unwrap().pop_front();
        match next {
            None => Ok(ExecOutput::completed("")),
            Some(FakeExec::Fail(message)) => Err(BackendError::Remote(message)),
            Some(FakeExec::Output {
                text,
                status,
                directory,
            }) => {
                if let Some(sink) = sink {
                    if !text.is_empty() {
                        sink(&text);
                    }
                }
                if let Some(directory) = directory {
                    *self.directory.lock().unwrap() = Some(directory);
                }
                Ok(ExecOutput {
                    output: text,
                    status,
                })
            }
        }
    }

    fn interrupt(&self) -> bool {
        self.interrupts.fetch_add(1, Ordering::SeqCst);
        false
    }

    fn kill(&self) -> bool {
        self.kills.fetch_add(1, Ordering::SeqCst);
        false
    }

    async fn completions(&self, _partial: &str) -> Vec<String> {
        self.completions.lock().unwrap().clone()
    }

    async fn disconnect(&self) {
        self.kill();
        self.connected.store(false, Ordering::SeqCst);
    }
}

pub struct FakeModel {
    model: String,
    replies: Mutex<VecDeque<String>>,
    failure: Option<String>,
    delay: Mutex<Option<Duration>>,
    prompts: Mutex<Vec<String>>,
}

impl FakeModel {
    pub fn with_replies(replies: &[&str]) -> Self {
        Self {
            model: "fake-model".to_string(),
            replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
            failure: None,
            delay: Mutex::new(None),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Self::with_replies(&[])
        }
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    fn error(&self) -> Option<ModelError> {
        self.failure.as_ref().map(|message| ModelError::Status {
            status: 503,
            message: message.clone(),
        })
    }
}

#[async_trait]
impl ModelClient for FakeModel {
    fn model(&self) -> &str {
        &self.model
    }

    fn for_model(&self, model: &str) -> Arc<dyn ModelClient> {
        Arc::new(FakeModel {
            model: model.to_string(),
            ..FakeModel::with_replies(&[])
        })
    }

    async fn generate(&self, prompt: &str) -> Result<String, ModelError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = self.error() {
            return Err(err);
        }
        Ok(self.replies.lock().unwrap().pop_front().unwrap_or_default())
    }

    async fn list_models(&self) -> Result<Vec<String>, ModelError> {
        match self.error() {
            Some(err) => Err(err),
            None => Ok(vec!["llama2".to_string(), "mistral".to_string()]),
        }
    }

    async fn test_connection(&self) -> Result<String, ModelError> {
        match self.error() {
            Some(err) => Err(err),
            None => Ok("Connected to fake endpoint (2 models available)".to_string()),
        }
    }
}

/// Shell transport over a fixed set of existing directories. Records every
/// script it is asked to run instead of running it.
pub struct FakeTransport {
    home: String,
    directories: Vec<String>,
    state: Mutex<DirectoryState>,
    runs: Mutex<Vec<(Option<String>, String)>>,
}

impl FakeTransport {
    pub fn new(home: &str, directories: &[&str]) -> Self {
        Self {
            home: home.to_string(),
            directories: directories.iter().map(|d| d.to_string()).collect(),
            state: Mutex::new(DirectoryState::default()),
            runs: Mutex::new(Vec::new()),
        }
    }

    pub fn runs(&self) -> Vec<(Option<String>, String)> {
        self.runs.lock().unwrap().clone()
    }
}

#[async_trait]
impl DirectoryProbe for FakeTransport {
    async fn probe_directory(
        &self,
        base: Option<&str>,
        target: Option<&str>,
    ) -> Result<String, String> {
        let resolved = match target {
            None | Some("~") => self.home.clone(),
            Some(path) if path.starts_with("~/") => {
                normalize_posix(&format!("{}/{}", self.home, &path[2..]))
            }
            Some(path) if path.starts_with('/') => normalize_posix(path),
            Some(path) => {
                let base = base.unwrap_or(&self.home);
                normalize_posix(&format!("{base}/{path}"))
            }
        };
        if self.directories.contains(&resolved) {
            Ok(resolved)
        } else {
            Err(format!(
                "cd: {}: No such file or directory",
                target.unwrap_or("~")
            ))
        }
    }

    fn home_directory(&self) -> Option<String> {
        Some(self.home.clone())
    }
}

#[async_trait]
impl ShellTransport for FakeTransport {
    type Control = ();

    fn directories(&self) -> DirectoryState {
        self.state.lock().unwrap().clone()
    }

    fn set_directories(&self, state: DirectoryState) {
        *self.state.lock().unwrap() = state;
    }

    async fn run(
        &self,
        _guard: &SlotGuard<Self::Control>,
        cwd: Option<&str>,
        script: &str,
        _sink: Option<OutputSink>,
        _timeout: Option<Duration>,
    ) -> Result<ExecOutput, BackendError> {
        self.runs
            .lock()
            .unwrap()
            .push((cwd.map(str::to_string), script.to_string()));
        Ok(ExecOutput::completed(""))
    }
}
