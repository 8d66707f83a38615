//! Messages flowing from background tasks to the foreground loop.
//!
//! Background work never touches session or transcript state directly. It
//! reports through an [`EventSender`] and the loop applies the change.

use crate::backend::ExecutionBackend;
use crate::core::message::{ConversationTurn, TranscriptMessage};
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Failed,
}

impl ConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Failed => "failed",
        }
    }
}

/// Where a dispatch turn is. Only `Idle` accepts new requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    Idle,
    Prompting,
    Parsing,
    Executing,
    Reporting,
}

impl TurnPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            TurnPhase::Idle => "idle",
            TurnPhase::Prompting => "thinking",
            TurnPhase::Parsing => "parsing",
            TurnPhase::Executing => "running",
            TurnPhase::Reporting => "reporting",
        }
    }
}

/// How a dispatch turn ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Turns to append to the conversation history. `assistant` is absent
    /// when execution failed before producing output.
    Completed {
        user: ConversationTurn,
        assistant: Option<ConversationTurn>,
    },
    /// The model could not be reached; history stays as it was.
    Aborted,
    /// A direct `!command`, which never touches history.
    Direct,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelStatus {
    Unknown,
    Ready,
    Unavailable,
}

pub enum AppEvent {
    Message(TranscriptMessage),
    /// A chunk of streamed command output, already shown live.
    OutputChunk(String),
    Phase(TurnPhase),
    TurnFinished(TurnOutcome),
    DirectoryChanged(String),
    Completions {
        /// Line text the lookup was started for.
        text: String,
        cursor: usize,
        candidates: Vec<String>,
    },
    BackendConnected {
        backend: Arc<dyn ExecutionBackend>,
        result: Result<String, String>,
    },
    ModelStatus {
        status: ModelStatus,
        detail: String,
    },
    ModelsListed(Result<Vec<String>, String>),
}

pub type EventSender = mpsc::UnboundedSender<AppEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<AppEvent>;

pub fn channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}
