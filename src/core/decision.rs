//! Parsing of the three-field model reply.
//!
//! The reply is read line by line. `DECISION:`, `COMMAND:` and `RESPONSE:`
//! labels may appear in any order; the last occurrence of each wins.
//! `RESPONSE:` starts a capture that swallows following lines until another
//! label shows up. Anything before the first label is ignored, and absent
//! fields fall back to CONVERSATION, NONE and an empty message.

const DECISION_LABEL: &str = "DECISION:";
const COMMAND_LABEL: &str = "COMMAND:";
const RESPONSE_LABEL: &str = "RESPONSE:";
const NO_COMMAND: &str = "NONE";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionKind {
    Command,
    Conversation,
}

impl DecisionKind {
    /// Interpret a `DECISION:` value. Brackets and case are ignored;
    /// anything unrecognised is a conversation.
    fn from_value(value: &str) -> Self {
        let cleaned = value
            .trim()
            .trim_start_matches('[')
            .trim_end_matches(']')
            .trim();
        if cleaned.eq_ignore_ascii_case("COMMAND") {
            DecisionKind::Command
        } else {
            DecisionKind::Conversation
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AiDecision {
    pub kind: DecisionKind,
    /// Raw `COMMAND:` value, `NONE` when absent.
    pub command: String,
    pub message: String,
}

impl Default for AiDecision {
    fn default() -> Self {
        Self {
            kind: DecisionKind::Conversation,
            command: NO_COMMAND.to_string(),
            message: String::new(),
        }
    }
}

impl AiDecision {
    /// The command to execute, if this decision asks for one.
    ///
    /// A single pair of surrounding backticks is removed; `NONE` (in any
    /// case) and empty values mean no command.
    pub fn command(&self) -> Option<&str> {
        if self.kind != DecisionKind::Command {
            return None;
        }
        let mut command = self.command.trim();
        if command.len() >= 2 && command.starts_with('`') && command.ends_with('`') {
            command = command[1..command.len() - 1].trim();
        }
        if command.is_empty() || command.eq_ignore_ascii_case(NO_COMMAND) {
            None
        } else {
            Some(command)
        }
    }
}

enum Field {
    Decision,
    Command,
    Response,
}

fn split_label(line: &str) -> Option<(Field, &str)> {
    let line = line.trim_start();
    if let Some(rest) = line.strip_prefix(DECISION_LABEL) {
        Some((Field::Decision, rest.trim()))
    } else if let Some(rest) = line.strip_prefix(COMMAND_LABEL) {
        Some((Field::Command, rest.trim()))
    } else {
        line.strip_prefix(RESPONSE_LABEL)
            .map(|rest| (Field::Response, rest.trim()))
    }
}

pub fn parse_response(reply: &str) -> AiDecision {
    let mut decision = AiDecision::default();
    let mut capturing = false;

    for line in reply.trim().lines() {
        match split_label(line) {
            Some((Field::Decision, value)) => {
                decision.kind = DecisionKind::from_value(value);
                capturing = false;
            }
            Some((Field::Command, value)) => {
                decision.command = value.to_string();
                capturing = false;
            }
            Some((Field::Response, value)) => {
                decision.message = value.to_string();
                capturing = true;
            }
            None if capturing => {
                decision.message.push('\n');
                decision.message.push_str(line);
            }
            None => {}
        }
    }

    decision.message = decision.message.trim_end().to_string();
    decision
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_command_reply() {
        let decision = parse_response(
            "DECISION: COMMAND\nCOMMAND: ls -la\nRESPONSE: Listing the directory.",
        );
        assert_eq!(decision.kind, DecisionKind::Command);
        assert_eq!(decision.command(), Some("ls -la"));
        assert_eq!(decision.message, "Listing the directory.");
    }

    #[test]
    fn label_order_does_not_matter() {
        let decision = parse_response(
            "\n\n  RESPONSE: Checking disk usage.\nCOMMAND: df -h\nDECISION: command\n",
        );
        assert_eq!(decision.kind, DecisionKind::Command);
        assert_eq!(decision.command(), Some("df -h"));
        assert_eq!(decision.message, "Checking disk usage.");
    }

    #[test]
    fn no_labels_defaults_to_conversation() {
        let decision = parse_response("Sure, I can help with that.");
        assert_eq!(decision, AiDecision::default());
        assert_eq!(decision.kind, DecisionKind::Conversation);
        assert_eq!(decision.command, "NONE");
        assert_eq!(decision.message, "");
        assert_eq!(decision.command(), None);
    }

    #[test]
    fn response_captures_following_lines() {
        let decision = parse_response(
            "preamble\nDECISION: CONVERSATION\nCOMMAND: NONE\nRESPONSE: Line one\nline two\n\nline four",
        );
        assert_eq!(decision.message, "Line one\nline two\n\nline four");
        assert_eq!(decision.command(), None);
    }

    #[test]
    fn later_label_wins_and_stops_capture() {
        let decision = parse_response(
            "RESPONSE: first\ncontinued\nDECISION: COMMAND\nCOMMAND: pwd\nCOMMAND: whoami\nRESPONSE: second",
        );
        assert_eq!(decision.command(), Some("whoami"));
        assert_eq!(decision.message, "second");
    }

    #[test]
    fn bracketed_decision_and_backticked_command() {
        let decision = parse_response("DECISION: [COMMAND]\nCOMMAND: `uname -a`\nRESPONSE: ok");
        assert_eq!(decision.command(), Some("uname -a"));
    }

    #[test]
    fn command_decision_with_none_runs_nothing() {
        let decision = parse_response("DECISION: COMMAND\nCOMMAND: none\nRESPONSE: nothing to do");
        assert_eq!(decision.kind, DecisionKind::Command);
        assert_eq!(decision.command(), None);
    }

    #[test]
    fn conversation_ignores_command_field() {
        let decision = parse_response("DECISION: CONVERSATION\nCOMMAND: rm -rf /tmp/x\nRESPONSE: hi");
        assert_eq!(decision.command(), None);
    }
}
