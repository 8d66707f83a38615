//! Event polling, key routing and redraw loop for the chat interface.
//!
//! The loop owns the [`App`]. Key presses mutate it directly; anything slow
//! becomes an [`AppCommand`] spawned on the runtime, whose [`AppEvent`]s are
//! drained back into the app between frames.

use std::{
    error::Error,
    sync::Arc,
    time::{Duration, Instant},
};

use ratatui::crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use tokio::sync::mpsc;
use tracing::debug;

use crate::api::ollama::OllamaClient;
use crate::backend::local::LocalBackend;
use crate::commands::{process_input, CommandResult};
use crate::core::app::{self, App, AppCommand};
use crate::core::config::orchestrator::ConfigOrchestrator;
use crate::core::events::{self, EventReceiver, EventSender};
use crate::ui::renderer::ui;
use crate::utils::line_editor::{key_action, LineEditAction};
use crate::utils::logging::LoggingState;

use super::lifecycle::{restore_terminal, setup_terminal, ChatTerminal};

const SCROLL_STEP: u16 = 5;

#[derive(Debug)]
pub enum UiEvent {
    Crossterm(Event),
}

/// Flags from `aiterm chat`.
#[derive(Debug, Clone, Default)]
pub struct ChatOptions {
    pub server: Option<String>,
    pub model: Option<String>,
    pub log: Option<String>,
}

fn spawn_command(command: AppCommand, events: &EventSender) {
    tokio::spawn(app::execute(command, events.clone()));
}

struct KeyOutcome {
    request_redraw: bool,
    spawn: Option<AppCommand>,
}

fn submit_line(app: &mut App) -> Option<AppCommand> {
    let line = app.input.take();
    app.status = None;
    match process_input(app, &line) {
        CommandResult::Continue => None,
        CommandResult::ProcessAsMessage(request) => app.submit_request(&request),
        CommandResult::Spawn(command) => Some(command),
        CommandResult::Quit => {
            app.exit_requested = true;
            None
        }
    }
}

fn handle_key(app: &mut App, key: KeyEvent) -> KeyOutcome {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    let mut outcome = KeyOutcome {
        request_redraw: true,
        spawn: None,
    };

    if key.code != KeyCode::Tab {
        app.cycler.reset();
    }

    match key.code {
        KeyCode::Char('c') if ctrl => {
            if !app.interrupt() {
                app.exit_requested = true;
            }
        }
        KeyCode::Char('d') if ctrl => app.exit_requested = true,
        KeyCode::Esc => app.kill(),
        KeyCode::Tab => outcome.spawn = app.complete(),
        KeyCode::PageUp => app.scroll_offset = app.scroll_offset.saturating_add(SCROLL_STEP),
        KeyCode::PageDown => app.scroll_offset = app.scroll_offset.saturating_sub(SCROLL_STEP),
        KeyCode::Enter => outcome.spawn = submit_line(app),
        _ => match key_action(&key) {
            Some(action) => {
                app.input.apply(action);
            }
            None => outcome.request_redraw = false,
        },
    }
    outcome
}

fn handle_paste(app: &mut App, text: String) {
    app.cycler.reset();
    app.input.apply(LineEditAction::Paste(text));
}

fn spawn_event_reader(event_tx: mpsc::UnboundedSender<UiEvent>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            if let Ok(true) = event::poll(Duration::from_millis(10)) {
                match event::read() {
                    Ok(ev) => {
                        if event_tx.send(UiEvent::Crossterm(ev)).is_err() {
                            break;
                        }
                    }
                    Err(_) => {
                        continue;
                    }
                }
            } else {
                tokio::task::yield_now().await;
            }
        }
    })
}

/// Build the app from the saved configuration and the `chat` flags, and
/// start connecting. Returns the commands to spawn.
fn bootstrap_app(
    options: ChatOptions,
    events: EventSender,
) -> Result<(App, Vec<AppCommand>), Box<dyn Error>> {
    let config_store = Arc::new(ConfigOrchestrator::open_default()?);
    let config = config_store.load_with_cache()?;

    let model_name = options.model.unwrap_or_else(|| config.effective_model());
    let model = OllamaClient::new(
        &config.effective_model_url(),
        &model_name,
        config.request_timeout(),
    )?;
    let logging = LoggingState::new(options.log)?;

    let mut app = App::new(Arc::new(model), config.dispatch_settings(), logging, events)
        .with_config(config_store, config.servers.clone());

    let mut commands = Vec::new();
    let connect = match options.server.or(config.last_server.clone()) {
        Some(name) => match app.connect_server(&name) {
            Ok(command) => command,
            Err(err) => {
                app.add_error_message(err);
                app.connect(Arc::new(LocalBackend::new()))
            }
        },
        None => app.connect(Arc::new(LocalBackend::new())),
    };
    commands.push(connect);
    app.welcome_message();
    commands.push(AppCommand::CheckModel(Arc::clone(&app.model)));

    Ok((app, commands))
}

fn drain_app_events(app: &mut App, rx: &mut EventReceiver) -> bool {
    let mut applied = false;
    while let Ok(event) = rx.try_recv() {
        app.apply_event(event);
        applied = true;
    }
    applied
}

fn try_draw_frame(
    app: &App,
    terminal: &mut ChatTerminal,
    request_redraw: &mut bool,
    last_draw: &mut Instant,
    frame_duration: Duration,
) -> Result<(), Box<dyn Error>> {
    if !*request_redraw {
        return Ok(());
    }

    let now = Instant::now();
    if now.duration_since(*last_draw) < frame_duration {
        return Ok(());
    }

    terminal.draw(|f| ui(f, app))?;
    *last_draw = now;
    *request_redraw = false;
    Ok(())
}

async fn main_loop(
    app: &mut App,
    terminal: &mut ChatTerminal,
    events: &EventSender,
    app_rx: &mut EventReceiver,
) -> Result<(), Box<dyn Error>> {
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<UiEvent>();
    let event_reader_handle = spawn_event_reader(event_tx);

    const MAX_FPS: u64 = 60;
    let frame_duration = Duration::from_millis(1000 / MAX_FPS);
    let mut last_draw = Instant::now() - frame_duration;
    let mut request_redraw = true;

    let result = loop {
        if app.exit_requested {
            break Ok(());
        }

        if let Err(err) = try_draw_frame(
            app,
            terminal,
            &mut request_redraw,
            &mut last_draw,
            frame_duration,
        ) {
            break Err(err);
        }

        let mut events_processed = false;
        while let Ok(UiEvent::Crossterm(ev)) = event_rx.try_recv() {
            events_processed = true;
            match ev {
                Event::Key(key) if key.kind == KeyEventKind::Press => {
                    let outcome = handle_key(app, key);
                    if let Some(command) = outcome.spawn {
                        spawn_command(command, events);
                    }
                    request_redraw |= outcome.request_redraw;
                    if app.exit_requested {
                        break;
                    }
                }
                Event::Paste(text) => {
                    handle_paste(app, text);
                    request_redraw = true;
                }
                Event::Resize(_, _) => request_redraw = true,
                _ => {}
            }
        }

        let applied = drain_app_events(app, app_rx);
        if applied {
            request_redraw = true;
        }

        if !events_processed && !applied && !request_redraw {
            tokio::time::sleep(Duration::from_millis(16)).await;
        }
    };

    event_reader_handle.abort();
    result
}

pub async fn run_chat(options: ChatOptions) -> Result<(), Box<dyn Error>> {
    let (events, mut app_rx) = events::channel();
    let (mut app, startup) = bootstrap_app(options, events.clone())?;
    for command in startup {
        spawn_command(command, &events);
    }

    let mut terminal = setup_terminal()?;
    let result = main_loop(&mut app, &mut terminal, &events, &mut app_rx).await;
    restore_terminal(&mut terminal)?;

    if let Some(command) = app.disconnect() {
        debug!("Disconnecting backend on exit");
        app::execute(command, events).await;
    }

    result
}
