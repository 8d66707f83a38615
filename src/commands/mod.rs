//! Input line interpretation: slash commands, `!` direct commands and
//! plain requests for the model.

mod registry;

pub use registry::{all_commands, find_command, CommandInvocation};

use crate::core::app::{App, AppCommand};
use std::sync::Arc;

pub enum CommandResult {
    Continue,
    ProcessAsMessage(String),
    /// Background work to start.
    Spawn(AppCommand),
    Quit,
}

const KEY_BINDINGS: &[(&str, &str)] = &[
    ("Enter", "send the request"),
    ("Tab", "complete the word under the cursor, again to cycle"),
    ("Ctrl+C", "interrupt the running command, or quit when idle"),
    ("Esc", "kill the running command"),
    ("Ctrl+D", "quit"),
    ("PgUp/PgDn", "scroll the transcript"),
    ("Ctrl+A/E", "start/end of line"),
    ("Ctrl+K/U/W", "delete to end, whole line, previous word"),
];

pub fn process_input(app: &mut App, input: &str) -> CommandResult {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return CommandResult::Continue;
    }

    if let Some(command) = trimmed.strip_prefix('!') {
        return match app.submit_direct(command) {
            Some(command) => CommandResult::Spawn(command),
            None => CommandResult::Continue,
        };
    }

    let Some(rest) = trimmed.strip_prefix('/') else {
        return CommandResult::ProcessAsMessage(trimmed.to_string());
    };

    let mut parts = rest.splitn(2, char::is_whitespace);
    let command_name = match parts.next() {
        Some(name) if !name.is_empty() => name,
        _ => return CommandResult::ProcessAsMessage(trimmed.to_string()),
    };
    let args = parts.next().unwrap_or("").trim();

    match find_command(command_name) {
        Some(command) => {
            let invocation = CommandInvocation {
                input: trimmed,
                args,
            };
            (command.handler)(app, invocation)
        }
        // Paths such as `/var/log` are requests, not commands.
        None => CommandResult::ProcessAsMessage(trimmed.to_string()),
    }
}

pub(super) fn handle_help(app: &mut App, _invocation: CommandInvocation<'_>) -> CommandResult {
    let mut help = String::from("Commands:\n");
    for command in all_commands() {
        help.push_str(&format!("  {:<20} {}\n", command.usage, command.help));
    }
    help.push_str(&format!(
        "  {:<20} {}\n",
        "!<command>", "Run a command directly, without the AI."
    ));
    help.push_str("Keys:\n");
    for (key, action) in KEY_BINDINGS {
        help.push_str(&format!("  {key:<20} {action}\n"));
    }
    app.add_system_message(help.trim_end());
    CommandResult::Continue
}

pub(super) fn handle_clear(app: &mut App, _invocation: CommandInvocation<'_>) -> CommandResult {
    app.clear();
    CommandResult::Continue
}

pub(super) fn handle_status(app: &mut App, _invocation: CommandInvocation<'_>) -> CommandResult {
    let message = format!(
        "{}\nMode: {}\nLogging: {}",
        app.status_line(),
        app.mode_description(),
        app.logging.get_status_string()
    );
    app.add_system_message(message);
    CommandResult::Continue
}

pub(super) fn handle_log(app: &mut App, invocation: CommandInvocation<'_>) -> CommandResult {
    let parts: Vec<&str> = invocation.args.split_whitespace().collect();
    let result = match parts.as_slice() {
        [] => app.logging.toggle_logging(),
        [filename] => app.logging.set_log_file(filename.to_string()),
        _ => {
            app.set_status("Usage: /log [filename]");
            return CommandResult::Continue;
        }
    };
    match result {
        Ok(message) => app.set_status(message),
        Err(err) => app.set_status(format!("Log error: {err}")),
    }
    CommandResult::Continue
}

pub(super) fn handle_connect(app: &mut App, invocation: CommandInvocation<'_>) -> CommandResult {
    if invocation.args.is_empty() {
        let message = if app.servers.is_empty() {
            "No saved servers. Add one with `aiterm servers add`.".to_string()
        } else {
            let listing = app
                .servers
                .iter()
                .map(|server| {
                    format!(
                        "  {}: {}@{}:{}",
                        server.name, server.username, server.host, server.port
                    )
                })
                .collect::<Vec<_>>()
                .join("\n");
            format!("Saved servers:\n{listing}\nUse /connect <server> to connect.")
        };
        app.add_system_message(message);
        return CommandResult::Continue;
    }

    match app.connect_server(invocation.args) {
        Ok(command) => CommandResult::Spawn(command),
        Err(err) => {
            app.add_error_message(err);
            CommandResult::Continue
        }
    }
}

pub(super) fn handle_local(app: &mut App, _invocation: CommandInvocation<'_>) -> CommandResult {
    CommandResult::Spawn(app.connect_local())
}

pub(super) fn handle_disconnect(
    app: &mut App,
    _invocation: CommandInvocation<'_>,
) -> CommandResult {
    match app.disconnect() {
        Some(command) => CommandResult::Spawn(command),
        None => {
            app.set_status("Not connected.");
            CommandResult::Continue
        }
    }
}

pub(super) fn handle_models(app: &mut App, _invocation: CommandInvocation<'_>) -> CommandResult {
    CommandResult::Spawn(AppCommand::ListModels(Arc::clone(&app.model)))
}

pub(super) fn handle_model(app: &mut App, invocation: CommandInvocation<'_>) -> CommandResult {
    let parts: Vec<&str> = invocation.args.split_whitespace().collect();
    match parts.as_slice() {
        [] => {
            let message = format!(
                "Current model: {} ({})",
                app.model.model(),
                app.model_status_label()
            );
            app.add_system_message(message);
            CommandResult::Continue
        }
        [name] => {
            app.set_model(name);
            app.add_system_message(format!("Model set: {name}"));
            CommandResult::Spawn(AppCommand::CheckModel(Arc::clone(&app.model)))
        }
        _ => {
            app.set_status("Usage: /model [name]");
            CommandResult::Continue
        }
    }
}

pub(super) fn handle_quit(_app: &mut App, _invocation: CommandInvocation<'_>) -> CommandResult {
    CommandResult::Quit
}

#[cfg(test)]
mod tests;
