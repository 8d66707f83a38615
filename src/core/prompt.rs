//! Prompt construction for one dispatch turn.

use crate::backend::BackendKind;
use crate::core::constants::{DEFAULT_PERSONA_NAME, DEFAULT_PERSONA_ROLE};
use crate::core::message::ConversationTurn;
use std::fmt::Write;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Persona {
    pub name: String,
    pub role: String,
}

impl Default for Persona {
    fn default() -> Self {
        Self {
            name: DEFAULT_PERSONA_NAME.to_string(),
            role: DEFAULT_PERSONA_ROLE.to_string(),
        }
    }
}

/// Where the command will run, as far as the prompt is concerned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptContext {
    pub kind: BackendKind,
    pub label: String,
    pub directory: Option<String>,
}

fn access_line(context: &PromptContext) -> String {
    match context.kind {
        BackendKind::Local => {
            "You have full access to the user's local terminal and can run any command."
                .to_string()
        }
        BackendKind::Remote => format!(
            "You have full SSH access to the server '{}' and can run any command.",
            context.label
        ),
    }
}

/// Build the prompt for `request`.
///
/// `history` holds the turns before this request; only the last
/// [`PROMPT_HISTORY_TURNS`](crate::core::constants::PROMPT_HISTORY_TURNS)
/// of it are expected here.
pub fn build_prompt(
    persona: &Persona,
    context: &PromptContext,
    history: &[ConversationTurn],
    request: &str,
) -> String {
    let mut prompt = String::new();
    let _ = writeln!(prompt, "You are {}, a {}. {}", persona.name, persona.role, access_line(context));
    if let Some(directory) = &context.directory {
        let _ = writeln!(prompt, "The current working directory is {directory}.");
    }

    if !history.is_empty() {
        prompt.push_str("\nPrevious conversation:\n");
        for turn in history {
            let _ = writeln!(prompt, "{}: {}", turn.role.prompt_label(), turn.content);
        }
    }

    let _ = write!(
        prompt,
        r#"
The user now asks: "{request}"

Reply in exactly this format, one field per line, each line starting with its keyword.
Do not use JSON and do not wrap the reply in a code block.

DECISION: COMMAND if the user wants something run, CONVERSATION if they are just talking
COMMAND: the single shell command to run, or NONE when DECISION is CONVERSATION
RESPONSE: your explanation or conversational reply

Example, running a command:
User: "show me the current directory"
DECISION: COMMAND
COMMAND: pwd
RESPONSE: I'll show you the current directory with pwd.

Example, conversation:
User: "hello"
DECISION: CONVERSATION
COMMAND: NONE
RESPONSE: Hello! I'm {name}, your {role}. How can I help you today?
"#,
        name = persona.name,
        role = persona.role,
    );
    prompt
}
