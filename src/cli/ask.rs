//! TUI-less "ask" command: one request, printed as it happens.

use std::error::Error;
use std::io::{self, Write};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::api::ModelClient;
use crate::backend::local::LocalBackend;
use crate::backend::remote::RemoteBackend;
use crate::backend::ExecutionBackend;
use crate::core::config::servers::resolve_target;
use crate::core::config::Config;
use crate::core::dispatch::{DispatchSettings, Dispatcher};
use crate::core::events::{self, AppEvent, TurnOutcome};
use crate::core::message::MessageCategory;

/// Writes dispatch events as plain text. Streamed output is printed as it
/// arrives, so the final output message is only printed when nothing
/// streamed.
pub struct AskPrinter<O: Write, E: Write> {
    out: O,
    err: E,
    streamed: bool,
    at_line_start: bool,
}

impl<O: Write, E: Write> AskPrinter<O, E> {
    pub fn new(out: O, err: E) -> Self {
        Self {
            out,
            err,
            streamed: false,
            at_line_start: true,
        }
    }

    pub fn handle(&mut self, event: AppEvent) -> io::Result<()> {
        match event {
            AppEvent::OutputChunk(chunk) => {
                self.out.write_all(chunk.as_bytes())?;
                self.out.flush()?;
                self.streamed = true;
                self.at_line_start = chunk.ends_with('\n');
            }
            AppEvent::Message(message) => match message.category {
                MessageCategory::Output if self.streamed => {
                    if !self.at_line_start {
                        writeln!(self.out)?;
                    }
                    self.streamed = false;
                    self.at_line_start = true;
                }
                MessageCategory::Error => writeln!(self.err, "❌ {}", message.text)?,
                _ => writeln!(self.out, "{}", message.text)?,
            },
            _ => {}
        }
        Ok(())
    }
}

/// Run one dispatch turn, printing its events until it finishes.
pub async fn ask_once<O: Write, E: Write>(
    model: Arc<dyn ModelClient>,
    backend: Arc<dyn ExecutionBackend>,
    settings: DispatchSettings,
    request: &str,
    printer: &mut AskPrinter<O, E>,
) -> io::Result<TurnOutcome> {
    let (events, mut rx) = events::channel();
    let dispatcher = Dispatcher::new(model, backend, settings, events);
    let request = request.to_string();
    let turn = tokio::spawn(async move {
        dispatcher
            .run_turn(&[], &request, CancellationToken::new())
            .await
    });

    while let Some(event) = rx.recv().await {
        printer.handle(event)?;
    }
    turn.await.map_err(io::Error::other)
}

pub async fn run_ask(
    config: &Config,
    model: Arc<dyn ModelClient>,
    server: Option<String>,
    request: String,
) -> Result<(), Box<dyn Error>> {
    let request = request.trim();
    if request.is_empty() {
        return Err("Usage: aiterm ask <request>".into());
    }

    let backend: Arc<dyn ExecutionBackend> = match server {
        Some(name) => {
            let profile = config
                .find_server(&name)
                .ok_or_else(|| format!("No saved server named '{name}'"))?;
            Arc::new(RemoteBackend::new(resolve_target(profile)?))
        }
        None => Arc::new(LocalBackend::new()),
    };
    backend.connect().await?;

    let mut printer = AskPrinter::new(io::stdout(), io::stderr());
    let outcome = ask_once(
        model,
        Arc::clone(&backend),
        config.dispatch_settings(),
        request,
        &mut printer,
    )
    .await;
    backend.disconnect().await;

    match outcome? {
        TurnOutcome::Aborted => Err("The request could not be completed.".into()),
        _ => Ok(()),
    }
}
