use super::CommandResult;
use crate::core::app::App;

pub type CommandHandler = fn(&mut App, CommandInvocation<'_>) -> CommandResult;

pub struct Command {
    pub name: &'static str,
    pub usage: &'static str,
    pub help: &'static str,
    pub handler: CommandHandler,
}

#[derive(Clone, Copy)]
pub struct CommandInvocation<'a> {
    pub input: &'a str,
    pub args: &'a str,
}

pub fn all_commands() -> &'static [Command] {
    COMMANDS
}

pub fn find_command(name: &str) -> Option<&'static Command> {
    all_commands()
        .iter()
        .find(|command| command.name.eq_ignore_ascii_case(name))
}

const COMMANDS: &[Command] = &[
    Command {
        name: "help",
        usage: "/help",
        help: "Show commands and key bindings.",
        handler: super::handle_help,
    },
    Command {
        name: "clear",
        usage: "/clear",
        help: "Clear the transcript and the conversation history.",
        handler: super::handle_clear,
    },
    Command {
        name: "status",
        usage: "/status",
        help: "Show the backend, directory and model state.",
        handler: super::handle_status,
    },
    Command {
        name: "log",
        usage: "/log [file]",
        help: "Start logging to a file, or pause and resume logging.",
        handler: super::handle_log,
    },
    Command {
        name: "connect",
        usage: "/connect [server]",
        help: "Connect to a saved server, or list saved servers.",
        handler: super::handle_connect,
    },
    Command {
        name: "local",
        usage: "/local",
        help: "Switch to the local terminal.",
        handler: super::handle_local,
    },
    Command {
        name: "disconnect",
        usage: "/disconnect",
        help: "Disconnect the active backend.",
        handler: super::handle_disconnect,
    },
    Command {
        name: "models",
        usage: "/models",
        help: "List the models installed on the AI endpoint.",
        handler: super::handle_models,
    },
    Command {
        name: "model",
        usage: "/model [name]",
        help: "Show or switch the model for this session.",
        handler: super::handle_model,
    },
    Command {
        name: "quit",
        usage: "/quit",
        help: "Exit aiterm.",
        handler: super::handle_quit,
    },
];
