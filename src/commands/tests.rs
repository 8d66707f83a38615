use super::*;
use crate::core::config::ServerProfile;
use crate::core::dispatch::DispatchSettings;
use crate::core::events::{self, AppEvent, ConnectionState, EventReceiver};
use crate::core::message::MessageCategory;
use crate::backend::ExecutionBackend;
use crate::utils::logging::LoggingState;
use crate::utils::test_utils::{FakeBackend, FakeModel};
use tempfile::TempDir;

fn create_test_app() -> (App, EventReceiver) {
    let (tx, rx) = events::channel();
    let logging = LoggingState::new(None).expect("logging");
    let app = App::new(
        Arc::new(FakeModel::with_replies(&[])),
        DispatchSettings::default(),
        logging,
        tx,
    );
    (app, rx)
}

fn connect_fake(app: &mut App) {
    let backend: Arc<dyn ExecutionBackend> = Arc::new(FakeBackend::new(Some("/home/me")));
    app.session.begin_switch(Arc::clone(&backend));
    app.apply_event(AppEvent::BackendConnected {
        backend,
        result: Ok("Connected".to_string()),
    });
}

fn last_text(app: &App) -> &str {
    app.transcript.last().map(|m| m.text.as_str()).unwrap_or("")
}

fn server(name: &str) -> ServerProfile {
    ServerProfile {
        name: name.to_string(),
        host: "10.0.0.5".to_string(),
        port: 2222,
        username: "deploy".to_string(),
        password: Some("hunter2".to_string()),
        key_file: None,
    }
}

#[test]
fn plain_text_is_a_request() {
    let (mut app, _rx) = create_test_app();
    match process_input(&mut app, "  show disk usage  ") {
        CommandResult::ProcessAsMessage(text) => assert_eq!(text, "show disk usage"),
        _ => panic!("expected a request"),
    }
}

#[test]
fn blank_input_does_nothing() {
    let (mut app, _rx) = create_test_app();
    assert!(matches!(process_input(&mut app, "   "), CommandResult::Continue));
    assert!(app.transcript.is_empty());
}

#[test]
fn unknown_slash_word_is_a_request() {
    let (mut app, _rx) = create_test_app();
    match process_input(&mut app, "/var/log is full, clean it") {
        CommandResult::ProcessAsMessage(text) => assert!(text.starts_with("/var/log")),
        _ => panic!("expected a request"),
    }
}

#[test]
fn help_lists_commands_and_keys() {
    let (mut app, _rx) = create_test_app();
    assert!(matches!(
        process_input(&mut app, "/HELP"),
        CommandResult::Continue
    ));
    let help = last_text(&app);
    for command in all_commands() {
        assert!(help.contains(command.usage), "missing {}", command.usage);
    }
    assert!(help.contains("!<command>"));
    assert!(help.contains("Ctrl+C"));
}

#[test]
fn bang_without_backend_reports_error() {
    let (mut app, _rx) = create_test_app();
    assert!(matches!(
        process_input(&mut app, "!ls -la"),
        CommandResult::Continue
    ));
    assert_eq!(
        app.transcript.last().map(|m| m.category),
        Some(MessageCategory::Error)
    );
}

#[test]
fn bang_runs_directly_when_connected() {
    let (mut app, _rx) = create_test_app();
    connect_fake(&mut app);
    match process_input(&mut app, "!ls -la") {
        CommandResult::Spawn(AppCommand::RunDirect { command, .. }) => {
            assert_eq!(command, "ls -la")
        }
        _ => panic!("expected a direct command"),
    }
    assert!(app.is_busy());
}

#[test]
fn connect_without_argument_lists_servers() {
    let (mut app, _rx) = create_test_app();
    process_input(&mut app, "/connect");
    assert!(last_text(&app).starts_with("No saved servers"));

    app.servers = vec![server("prod")];
    process_input(&mut app, "/connect");
    assert!(last_text(&app).contains("prod: deploy@10.0.0.5:2222"));
}

#[test]
fn connect_to_saved_server_starts_switch() {
    let (mut app, _rx) = create_test_app();
    app.servers = vec![server("prod")];
    match process_input(&mut app, "/connect prod") {
        CommandResult::Spawn(AppCommand::Connect { outgoing, incoming }) => {
            assert!(outgoing.is_none());
            assert_eq!(incoming.label(), "prod");
        }
        _ => panic!("expected a connect"),
    }
    assert_eq!(app.session.state(), ConnectionState::Connecting);
    assert_eq!(app.mode_description(), "SSH to prod");
}

#[test]
fn connect_to_unknown_server_is_an_error() {
    let (mut app, _rx) = create_test_app();
    assert!(matches!(
        process_input(&mut app, "/connect staging"),
        CommandResult::Continue
    ));
    assert!(last_text(&app).contains("'staging'"));
}

#[test]
fn local_switches_to_local_backend() {
    let (mut app, _rx) = create_test_app();
    connect_fake(&mut app);
    match process_input(&mut app, "/local") {
        CommandResult::Spawn(AppCommand::Connect { outgoing, incoming }) => {
            assert_eq!(outgoing.map(|b| b.label()), Some("Fake".to_string()));
            assert_eq!(incoming.label(), "Local");
        }
        _ => panic!("expected a connect"),
    }
    assert_eq!(app.mode_description(), "Local terminal");
}

#[test]
fn disconnect_requires_backend() {
    let (mut app, _rx) = create_test_app();
    assert!(matches!(
        process_input(&mut app, "/disconnect"),
        CommandResult::Continue
    ));
    assert_eq!(app.status.as_deref(), Some("Not connected."));

    connect_fake(&mut app);
    assert!(matches!(
        process_input(&mut app, "/disconnect"),
        CommandResult::Spawn(AppCommand::Disconnect(_))
    ));
    assert_eq!(app.session.state(), ConnectionState::Disconnected);
}

#[test]
fn model_switch_rechecks_endpoint() {
    let (mut app, _rx) = create_test_app();
    process_input(&mut app, "/model");
    assert!(last_text(&app).contains("fake-model"));

    assert!(matches!(
        process_input(&mut app, "/model mistral"),
        CommandResult::Spawn(AppCommand::CheckModel(_))
    ));
    assert_eq!(app.model.model(), "mistral");
    assert_eq!(last_text(&app), "Model set: mistral");
}

#[test]
fn models_lists_through_background_task() {
    let (mut app, _rx) = create_test_app();
    assert!(matches!(
        process_input(&mut app, "/models"),
        CommandResult::Spawn(AppCommand::ListModels(_))
    ));
}

#[test]
fn status_reports_mode_and_logging() {
    let (mut app, _rx) = create_test_app();
    connect_fake(&mut app);
    process_input(&mut app, "/status");
    let status = last_text(&app);
    assert!(status.contains("Fake (connected)"));
    assert!(status.contains("Mode: Local terminal"));
    assert!(status.contains("Logging: disabled"));
}

#[test]
fn log_command_sets_file_and_toggles() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("aiterm.log");
    let (mut app, _rx) = create_test_app();

    process_input(&mut app, &format!("/log {}", path.display()));
    assert!(app.logging.is_active());
    assert!(app
        .status
        .as_deref()
        .is_some_and(|s| s.starts_with("Logging enabled")));

    process_input(&mut app, "/log");
    assert!(!app.logging.is_active());

    process_input(&mut app, "/log a b");
    assert_eq!(app.status.as_deref(), Some("Usage: /log [filename]"));
}

#[test]
fn clear_and_quit() {
    let (mut app, _rx) = create_test_app();
    app.add_system_message("earlier");
    process_input(&mut app, "/clear");
    assert_eq!(last_text(&app), "Conversation cleared.");
    assert!(matches!(process_input(&mut app, "/quit"), CommandResult::Quit));
}
