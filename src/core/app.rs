//! State owned by the foreground loop.
//!
//! Background tasks never touch [`App`]. They send [`AppEvent`]s which the
//! loop feeds into [`App::apply_event`]. Work that has to leave the
//! foreground is described as an [`AppCommand`] and run with [`execute`].

use crate::api::ModelClient;
use crate::backend::local::LocalBackend;
use crate::backend::remote::RemoteBackend;
use crate::backend::{BackendKind, ExecutionBackend};
use crate::core::completion::{CompletionCycler, CompletionRequest, TabAction};
use crate::core::config::orchestrator::ConfigOrchestrator;
use crate::core::config::servers::resolve_target;
use crate::core::config::ServerProfile;
use crate::core::constants::PROMPT_HISTORY_TURNS;
use crate::core::dispatch::{DispatchSettings, Dispatcher};
use crate::core::events::{
    AppEvent, ConnectionState, EventSender, ModelStatus, TurnOutcome, TurnPhase,
};
use crate::core::message::{
    ConversationHistory, ConversationTurn, MessageCategory, TranscriptMessage,
};
use crate::core::session::{switch_backend, SessionManager};
use crate::utils::line_editor::LineEditorState;
use crate::utils::logging::LoggingState;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Background work requested by the foreground loop.
pub enum AppCommand {
    RunTurn {
        dispatcher: Dispatcher,
        history: Vec<ConversationTurn>,
        request: String,
        cancel: CancellationToken,
    },
    RunDirect {
        dispatcher: Dispatcher,
        command: String,
    },
    Connect {
        outgoing: Option<Arc<dyn ExecutionBackend>>,
        incoming: Arc<dyn ExecutionBackend>,
    },
    Disconnect(Arc<dyn ExecutionBackend>),
    FetchCompletions {
        backend: Arc<dyn ExecutionBackend>,
        request: CompletionRequest,
    },
    CheckModel(Arc<dyn ModelClient>),
    ListModels(Arc<dyn ModelClient>),
}

/// Run `command` to completion, reporting through `events`.
pub async fn execute(command: AppCommand, events: EventSender) {
    match command {
        AppCommand::RunTurn {
            dispatcher,
            history,
            request,
            cancel,
        } => {
            let outcome = dispatcher.run_turn(&history, &request, cancel).await;
            let _ = events.send(AppEvent::TurnFinished(outcome));
        }
        AppCommand::RunDirect {
            dispatcher,
            command,
        } => {
            let outcome = dispatcher.execute_direct(&command).await;
            let _ = events.send(AppEvent::TurnFinished(outcome));
        }
        AppCommand::Connect { outgoing, incoming } => {
            let result = switch_backend(outgoing, Arc::clone(&incoming)).await;
            let _ = events.send(AppEvent::BackendConnected {
                backend: incoming,
                result,
            });
        }
        AppCommand::Disconnect(backend) => {
            backend.kill();
            backend.disconnect().await;
        }
        AppCommand::FetchCompletions { backend, request } => {
            let candidates = backend.completions(&request.token).await;
            let _ = events.send(AppEvent::Completions {
                text: request.text,
                cursor: request.cursor,
                candidates,
            });
        }
        AppCommand::CheckModel(model) => {
            let (status, detail) = match model.test_connection().await {
                Ok(detail) => (ModelStatus::Ready, detail),
                Err(err) => (ModelStatus::Unavailable, err.to_string()),
            };
            let _ = events.send(AppEvent::ModelStatus { status, detail });
        }
        AppCommand::ListModels(model) => {
            let result = model.list_models().await.map_err(|err| err.to_string());
            let _ = events.send(AppEvent::ModelsListed(result));
        }
    }
}

pub struct App {
    pub transcript: Vec<TranscriptMessage>,
    /// Output streamed by the running command, shown until its final
    /// output message replaces it.
    pub live_output: String,
    pub history: ConversationHistory,
    pub phase: TurnPhase,
    pub session: SessionManager,
    pub cycler: CompletionCycler,
    pub input: LineEditorState,
    pub model: Arc<dyn ModelClient>,
    pub model_status: ModelStatus,
    pub settings: DispatchSettings,
    pub logging: LoggingState,
    pub servers: Vec<ServerProfile>,
    /// One-line notice under the transcript, e.g. completion hints.
    pub status: Option<String>,
    /// Lines scrolled up from the bottom of the transcript.
    pub scroll_offset: u16,
    pub exit_requested: bool,
    config: Option<Arc<ConfigOrchestrator>>,
    events: EventSender,
    cancel: Option<CancellationToken>,
}

impl App {
    pub fn new(
        model: Arc<dyn ModelClient>,
        settings: DispatchSettings,
        logging: LoggingState,
        events: EventSender,
    ) -> Self {
        Self {
            transcript: Vec::new(),
            live_output: String::new(),
            history: ConversationHistory::new(),
            phase: TurnPhase::Idle,
            session: SessionManager::new(),
            cycler: CompletionCycler::new(),
            input: LineEditorState::default(),
            model,
            model_status: ModelStatus::Unknown,
            settings,
            logging,
            servers: Vec::new(),
            status: None,
            scroll_offset: 0,
            exit_requested: false,
            config: None,
            events,
            cancel: None,
        }
    }

    /// Persist the last-used server through `config` and offer its servers
    /// to `/connect`.
    pub fn with_config(
        mut self,
        config: Arc<ConfigOrchestrator>,
        servers: Vec<ServerProfile>,
    ) -> Self {
        self.config = Some(config);
        self.servers = servers;
        self
    }

    pub fn is_busy(&self) -> bool {
        self.phase != TurnPhase::Idle
    }

    pub fn push_message(&mut self, message: TranscriptMessage) {
        if let Err(err) = self.logging.log_message(&message) {
            warn!(error = %err, "Failed to write transcript log");
        }
        if message.category == MessageCategory::Output {
            self.live_output.clear();
        }
        self.transcript.push(message);
        self.scroll_offset = 0;
    }

    pub fn add_system_message(&mut self, text: impl Into<String>) {
        self.push_message(TranscriptMessage::system(text));
    }

    pub fn add_error_message(&mut self, text: impl Into<String>) {
        self.push_message(TranscriptMessage::error(text));
    }

    pub fn set_status(&mut self, text: impl Into<String>) {
        self.status = Some(text.into());
    }

    pub fn mode_description(&self) -> String {
        match self.session.backend() {
            Some(backend) if backend.kind() == BackendKind::Remote => {
                format!("SSH to {}", backend.label())
            }
            Some(_) => "Local terminal".to_string(),
            None => "No backend".to_string(),
        }
    }

    pub fn welcome_message(&mut self) {
        let mode = self.mode_description();
        self.add_system_message(format!(
            "Welcome to aiterm. Mode: {mode}. Ask for anything in plain language, prefix a \
             line with ! to run it directly, or type /help."
        ));
    }

    pub fn model_status_label(&self) -> &'static str {
        match self.model_status {
            ModelStatus::Unknown => "checking",
            ModelStatus::Ready => "ready",
            ModelStatus::Unavailable => "failed",
        }
    }

    pub fn status_line(&self) -> String {
        let mut line = format!(
            "{} ({})",
            self.session.label(),
            self.session.state().as_str()
        );
        if let Some(directory) = self.session.directory() {
            line.push_str(&format!(" • {directory}"));
        }
        line.push_str(&format!(
            " • AI: {} ({})",
            self.model.model(),
            self.model_status_label()
        ));
        line
    }

    fn dispatcher(&self, backend: Arc<dyn ExecutionBackend>) -> Dispatcher {
        Dispatcher::new(
            Arc::clone(&self.model),
            backend,
            self.settings.clone(),
            self.events.clone(),
        )
    }

    fn ready_backend(&mut self) -> Option<Arc<dyn ExecutionBackend>> {
        if self.is_busy() {
            self.set_status(
                "Still working on the previous request. Ctrl+C interrupts, Esc kills.",
            );
            return None;
        }
        match self.session.connected_backend() {
            Some(backend) => Some(backend),
            None => {
                let message = match self.session.state() {
                    ConnectionState::Connecting => "Still connecting. Try again in a moment.",
                    _ => "Not connected. Use /local or /connect <server>.",
                };
                self.add_error_message(message);
                None
            }
        }
    }

    /// Start a model turn for `request`.
    pub fn submit_request(&mut self, request: &str) -> Option<AppCommand> {
        let request = request.trim();
        if request.is_empty() {
            return None;
        }
        let backend = self.ready_backend()?;
        self.push_message(TranscriptMessage::user(request));
        self.phase = TurnPhase::Prompting;
        let cancel = CancellationToken::new();
        self.cancel = Some(cancel.clone());
        Some(AppCommand::RunTurn {
            dispatcher: self.dispatcher(backend),
            history: self.history.recent(PROMPT_HISTORY_TURNS).to_vec(),
            request: request.to_string(),
            cancel,
        })
    }

    /// Run `command` without the model. Nothing is added to history.
    pub fn submit_direct(&mut self, command: &str) -> Option<AppCommand> {
        let command = command.trim();
        if command.is_empty() {
            self.set_status("Usage: !<command>");
            return None;
        }
        let backend = self.ready_backend()?;
        self.phase = TurnPhase::Executing;
        Some(AppCommand::RunDirect {
            dispatcher: self.dispatcher(backend),
            command: command.to_string(),
        })
    }

    /// Ctrl+C: interrupt the running command or cancel the model request.
    /// Returns false when idle, which the caller treats as quit.
    pub fn interrupt(&mut self) -> bool {
        match self.phase {
            TurnPhase::Idle => false,
            TurnPhase::Prompting | TurnPhase::Parsing => {
                if let Some(cancel) = &self.cancel {
                    cancel.cancel();
                }
                true
            }
            TurnPhase::Executing | TurnPhase::Reporting => {
                let sent = self
                    .session
                    .backend()
                    .map(|backend| backend.interrupt())
                    .unwrap_or(false);
                if sent {
                    self.set_status("Interrupt sent.");
                } else {
                    self.set_status("Nothing to interrupt.");
                }
                true
            }
        }
    }

    /// Esc: kill the running command.
    pub fn kill(&mut self) {
        if !self.is_busy() {
            return;
        }
        let killed = self
            .session
            .backend()
            .map(|backend| backend.kill())
            .unwrap_or(false);
        if killed {
            self.set_status("Kill signal sent.");
        } else if let Some(cancel) = &self.cancel {
            cancel.cancel();
        }
    }

    /// Make `incoming` the active backend.
    pub fn connect(&mut self, incoming: Arc<dyn ExecutionBackend>) -> AppCommand {
        self.add_system_message(format!("Connecting to {}...", incoming.label()));
        let outgoing = self.session.begin_switch(Arc::clone(&incoming));
        AppCommand::Connect { outgoing, incoming }
    }

    pub fn connect_local(&mut self) -> AppCommand {
        self.remember_server(None);
        self.connect(Arc::new(LocalBackend::new()))
    }

    /// Connect to a saved server by name.
    pub fn connect_server(&mut self, name: &str) -> Result<AppCommand, String> {
        let profile = self
            .servers
            .iter()
            .find(|server| server.name == name)
            .cloned()
            .ok_or_else(|| format!("No saved server named '{name}'"))?;
        let target = resolve_target(&profile)?;
        Ok(self.connect(Arc::new(RemoteBackend::new(target))))
    }

    pub fn disconnect(&mut self) -> Option<AppCommand> {
        let backend = self.session.clear()?;
        self.add_system_message(format!("Disconnected from {}.", backend.label()));
        Some(AppCommand::Disconnect(backend))
    }

    /// Tab on the input line.
    pub fn complete(&mut self) -> Option<AppCommand> {
        let cursor = self.input.cursor;
        match self.cycler.on_tab(&self.input.text, cursor) {
            TabAction::Fetch(request) => {
                let backend = self.session.connected_backend()?;
                Some(AppCommand::FetchCompletions { backend, request })
            }
            TabAction::Apply(edit) => {
                self.input.set(edit.text, edit.cursor);
                None
            }
            TabAction::Ignore => None,
        }
    }

    pub fn clear(&mut self) {
        self.transcript.clear();
        self.live_output.clear();
        self.history.clear();
        self.scroll_offset = 0;
        self.add_system_message("Conversation cleared.");
    }

    pub fn set_model(&mut self, model: &str) {
        self.model = self.model.for_model(model);
        self.model_status = ModelStatus::Unknown;
    }

    fn remember_server(&mut self, name: Option<String>) {
        let Some(config) = &self.config else {
            return;
        };
        let result = config.mutate(|cfg| {
            cfg.last_server = name.clone();
            Ok(())
        });
        if let Err(err) = result {
            warn!(error = %err, "Failed to remember last server");
        }
    }

    /// Apply one background event.
    pub fn apply_event(&mut self, event: AppEvent) {
        match event {
            AppEvent::Message(message) => self.push_message(message),
            AppEvent::OutputChunk(chunk) => {
                self.live_output.push_str(&chunk);
                self.scroll_offset = 0;
            }
            AppEvent::Phase(phase) => self.phase = phase,
            AppEvent::TurnFinished(outcome) => {
                self.phase = TurnPhase::Idle;
                self.cancel = None;
                self.live_output.clear();
                if let TurnOutcome::Completed { user, assistant } = outcome {
                    self.history.push(user);
                    if let Some(assistant) = assistant {
                        self.history.push(assistant);
                    }
                }
            }
            AppEvent::DirectoryChanged(directory) => self.session.set_directory(directory),
            AppEvent::Completions {
                text,
                cursor,
                candidates,
            } => {
                if candidates.is_empty() {
                    self.set_status("No completions.");
                }
                let current = self.input.text.clone();
                if let Some(applied) = self.cycler.accept(&text, cursor, candidates, &current) {
                    self.input.set(applied.edit.text, applied.edit.cursor);
                    if let Some(hint) = applied.hint {
                        self.set_status(hint);
                    }
                }
            }
            AppEvent::BackendConnected { backend, result } => {
                if !self.session.mark(&backend, &result) {
                    return;
                }
                match result {
                    Ok(message) => {
                        debug!(label = %backend.label(), "Backend connected");
                        if backend.kind() == BackendKind::Remote {
                            self.remember_server(Some(backend.label()));
                        }
                        self.add_system_message(message);
                    }
                    Err(err) => self.add_error_message(err),
                }
            }
            AppEvent::ModelStatus { status, detail } => {
                self.model_status = status;
                match status {
                    ModelStatus::Ready => self.add_system_message(format!("AI: ready. {detail}")),
                    _ => self.add_error_message(format!("AI: failed. {detail}")),
                }
            }
            AppEvent::ModelsListed(result) => match result {
                Ok(models) if models.is_empty() => {
                    self.add_system_message("No models installed on the endpoint.")
                }
                Ok(models) => {
                    let current = self.model.model().to_string();
                    let listing = models
                        .iter()
                        .map(|name| {
                            if *name == current {
                                format!("* {name} (current)")
                            } else {
                                format!("  {name}")
                            }
                        })
                        .collect::<Vec<_>>()
                        .join("\n");
                    self.add_system_message(format!("Available models:\n{listing}"));
                }
                Err(err) => self.add_error_message(format!("Could not list models: {err}")),
            },
        }
    }
}
