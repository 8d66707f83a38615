//! One request/response turn: prompt the model, parse its reply, run the
//! chosen command, and report everything back as [`AppEvent`]s.

use crate::api::ModelClient;
use crate::backend::{CommandStatus, ExecutionBackend, OutputSink};
use crate::core::constants::DEFAULT_MAX_OUTPUT_CHARS;
use crate::core::decision::parse_response;
use crate::core::events::{AppEvent, EventSender, TurnOutcome, TurnPhase};
use crate::core::message::{ConversationTurn, TranscriptMessage};
use crate::core::prompt::{build_prompt, Persona, PromptContext};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub persona: Persona,
    /// Characters of command output kept; zero or negative means the default.
    pub max_output_chars: i64,
    /// Stream command output while it runs instead of waiting for the end.
    pub stream_output: bool,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            persona: Persona::default(),
            max_output_chars: DEFAULT_MAX_OUTPUT_CHARS,
            stream_output: true,
        }
    }
}

/// Cut `output` to `max_chars` characters, appending a marker with the
/// omitted and total counts when anything was dropped.
pub fn truncate_output(output: &str, max_chars: i64) -> String {
    let limit = if max_chars <= 0 {
        DEFAULT_MAX_OUTPUT_CHARS
    } else {
        max_chars
    };
    let limit = usize::try_from(limit).unwrap_or(usize::MAX);

    let Some((cut, _)) = output.char_indices().nth(limit) else {
        return output.to_string();
    };
    let total = output.chars().count();
    format!(
        "{}\n... (output truncated: {} of {} characters omitted)",
        &output[..cut],
        total - limit,
        total
    )
}

/// Transcript line announcing a command, prefixed with its directory.
pub fn annotate_command(directory: Option<&str>, command: &str) -> String {
    match directory {
        Some(directory) => format!("[{directory}]$ {command}"),
        None => format!("$ {command}"),
    }
}

pub struct Dispatcher {
    model: Arc<dyn ModelClient>,
    backend: Arc<dyn ExecutionBackend>,
    settings: DispatchSettings,
    events: EventSender,
}

impl Dispatcher {
    pub fn new(
        model: Arc<dyn ModelClient>,
        backend: Arc<dyn ExecutionBackend>,
        settings: DispatchSettings,
        events: EventSender,
    ) -> Self {
        Self {
            model,
            backend,
            settings,
            events,
        }
    }

    fn emit(&self, event: AppEvent) {
        let _ = self.events.send(event);
    }

    fn message(&self, message: TranscriptMessage) {
        self.emit(AppEvent::Message(message));
    }

    /// Run one turn for `request`. `history` holds the prior turns to embed
    /// in the prompt. The caller applies the returned outcome to its
    /// history; nothing here mutates shared state.
    pub async fn run_turn(
        &self,
        history: &[ConversationTurn],
        request: &str,
        cancel: CancellationToken,
    ) -> TurnOutcome {
        self.emit(AppEvent::Phase(TurnPhase::Prompting));
        let context = PromptContext {
            kind: self.backend.kind(),
            label: self.backend.label(),
            directory: self.backend.current_directory(),
        };
        let prompt = build_prompt(&self.settings.persona, &context, history, request);

        let reply = tokio::select! {
            reply = self.model.generate(&prompt) => reply,
            _ = cancel.cancelled() => {
                self.message(TranscriptMessage::system("Request cancelled."));
                return TurnOutcome::Aborted;
            }
        };
        let reply = match reply {
            Ok(reply) => reply,
            Err(err) => {
                debug!(error = %err, model = self.model.model(), "Model request failed");
                self.message(TranscriptMessage::error(format!("AI error: {err}")));
                return TurnOutcome::Aborted;
            }
        };

        self.emit(AppEvent::Phase(TurnPhase::Parsing));
        let decision = parse_response(&reply);
        debug!(kind = ?decision.kind, command = %decision.command, "Parsed model reply");

        if !decision.message.is_empty() {
            self.message(TranscriptMessage::assistant(decision.message.clone()));
        }

        let assistant = match decision.command() {
            Some(command) => self
                .run_command(command)
                .await
                .map(|output| ConversationTurn::assistant(format!("Executed: {command}\nOutput: {output}"))),
            None => Some(ConversationTurn::assistant(decision.message.clone())),
        };

        TurnOutcome::Completed {
            user: ConversationTurn::user(request),
            assistant,
        }
    }

    /// Run `command` without consulting the model.
    pub async fn execute_direct(&self, command: &str) -> TurnOutcome {
        self.run_command(command).await;
        TurnOutcome::Direct
    }

    /// Execute, report, and return the (truncated) output on success.
    async fn run_command(&self, command: &str) -> Option<String> {
        self.emit(AppEvent::Phase(TurnPhase::Executing));
        let before = self.backend.current_directory();
        self.message(TranscriptMessage::command(annotate_command(
            before.as_deref(),
            command,
        )));

        let sink: Option<OutputSink> = if self.settings.stream_output {
            let events = self.events.clone();
            Some(Arc::new(move |chunk: &str| {
                let _ = events.send(AppEvent::OutputChunk(chunk.to_string()));
            }))
        } else {
            None
        };

        let result = self.backend.execute(command, sink, None).await;
        self.emit(AppEvent::Phase(TurnPhase::Reporting));

        let result = match result {
            Ok(result) => result,
            Err(err) => {
                self.message(TranscriptMessage::error(err.to_string()));
                return None;
            }
        };

        let output = truncate_output(result.output.trim_end(), self.settings.max_output_chars);
        if output.is_empty() {
            self.message(TranscriptMessage::output("(no output)"));
        } else {
            self.message(TranscriptMessage::output(output.clone()));
        }

        match result.status {
            CommandStatus::Interrupted => self.message(TranscriptMessage::system("Command interrupted.")),
            CommandStatus::Killed => self.message(TranscriptMessage::system("Command killed.")),
            _ => {}
        }

        let after = self.backend.current_directory();
        if after != before {
            if let Some(directory) = after {
                self.message(TranscriptMessage::system(format!(
                    "Directory changed to: {directory}"
                )));
                self.emit(AppEvent::DirectoryChanged(directory));
            }
        }

        Some(output)
    }
}
