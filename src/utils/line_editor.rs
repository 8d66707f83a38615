//! Single-line editing shared by the chat input and the password prompt of
//! `aiterm servers add`.
//!
//! Only editing keys are mapped here. Enter, Esc and Ctrl+C mean different
//! things to each caller and are handled by them.

use ratatui::crossterm::{
    event::{self, DisableBracketedPaste, EnableBracketedPaste, Event, KeyCode, KeyEvent},
    event::{KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode},
};
use std::io::{self, Write};
use unicode_width::UnicodeWidthStr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineEditAction {
    Insert(char),
    /// Pasted text, flattened onto the line.
    Paste(String),
    DeleteBack,
    DeleteForward,
    Left,
    Right,
    Home,
    End,
    /// Ctrl+K
    KillToEnd,
    /// Ctrl+W
    KillWord,
    /// Ctrl+U
    KillLine,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineEditorState {
    pub text: String,
    /// Cursor position in characters.
    pub cursor: usize,
}

impl LineEditorState {
    /// Replace the whole line, e.g. with an applied completion.
    pub fn set(&mut self, text: String, cursor: usize) {
        self.cursor = cursor.min(text.chars().count());
        self.text = text;
    }

    /// Take the line, leaving the editor empty.
    pub fn take(&mut self) -> String {
        self.cursor = 0;
        std::mem::take(&mut self.text)
    }

    /// Apply `action`. Returns true when the text or the cursor changed.
    pub fn apply(&mut self, action: LineEditAction) -> bool {
        let len = self.text.chars().count();
        match action {
            LineEditAction::Insert(c) => {
                let at = self.byte_at(self.cursor);
                self.text.insert(at, c);
                self.cursor += 1;
                true
            }
            LineEditAction::Paste(text) => {
                let flat = flatten_paste(&text);
                if flat.is_empty() {
                    return false;
                }
                let at = self.byte_at(self.cursor);
                self.text.insert_str(at, &flat);
                self.cursor += flat.chars().count();
                true
            }
            LineEditAction::DeleteBack => {
                if self.cursor == 0 {
                    return false;
                }
                self.cursor -= 1;
                self.remove(self.cursor, self.cursor + 1);
                true
            }
            LineEditAction::DeleteForward => {
                if self.cursor >= len {
                    return false;
                }
                self.remove(self.cursor, self.cursor + 1);
                true
            }
            LineEditAction::Left => self.move_to(self.cursor.saturating_sub(1)),
            LineEditAction::Right => self.move_to((self.cursor + 1).min(len)),
            LineEditAction::Home => self.move_to(0),
            LineEditAction::End => self.move_to(len),
            LineEditAction::KillToEnd => {
                if self.cursor >= len {
                    return false;
                }
                let at = self.byte_at(self.cursor);
                self.text.truncate(at);
                true
            }
            LineEditAction::KillWord => {
                let start = self.word_start();
                if start == self.cursor {
                    return false;
                }
                self.remove(start, self.cursor);
                self.cursor = start;
                true
            }
            LineEditAction::KillLine => {
                if self.text.is_empty() {
                    return false;
                }
                self.take();
                true
            }
        }
    }

    fn move_to(&mut self, cursor: usize) -> bool {
        let moved = cursor != self.cursor;
        self.cursor = cursor;
        moved
    }

    fn byte_at(&self, index: usize) -> usize {
        self.text
            .char_indices()
            .nth(index)
            .map_or(self.text.len(), |(at, _)| at)
    }

    fn remove(&mut self, from: usize, to: usize) {
        let range = self.byte_at(from)..self.byte_at(to);
        self.text.replace_range(range, "");
    }

    /// Start of the word before the cursor, skipping whitespace first.
    fn word_start(&self) -> usize {
        let before: Vec<char> = self.text.chars().take(self.cursor).collect();
        let mut index = before.len();
        while index > 0 && before[index - 1].is_whitespace() {
            index -= 1;
        }
        while index > 0 && !before[index - 1].is_whitespace() {
            index -= 1;
        }
        index
    }
}

/// Map an editing key. Anything else is left to the caller.
pub fn key_action(key: &KeyEvent) -> Option<LineEditAction> {
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        return match key.code {
            KeyCode::Char('a') => Some(LineEditAction::Home),
            KeyCode::Char('e') => Some(LineEditAction::End),
            KeyCode::Char('k') => Some(LineEditAction::KillToEnd),
            KeyCode::Char('w') => Some(LineEditAction::KillWord),
            KeyCode::Char('u') => Some(LineEditAction::KillLine),
            _ => None,
        };
    }
    match key.code {
        KeyCode::Char(c) => Some(LineEditAction::Insert(c)),
        KeyCode::Backspace => Some(LineEditAction::DeleteBack),
        KeyCode::Delete => Some(LineEditAction::DeleteForward),
        KeyCode::Left => Some(LineEditAction::Left),
        KeyCode::Right => Some(LineEditAction::Right),
        KeyCode::Home => Some(LineEditAction::Home),
        KeyCode::End => Some(LineEditAction::End),
        _ => None,
    }
}

/// Pasted text goes onto the single input line: line breaks and tabs become
/// spaces, other control characters are dropped.
pub fn flatten_paste(text: &str) -> String {
    let mut flattened = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\r' if chars.peek() == Some(&'\n') => {}
            '\r' | '\n' | '\t' => flattened.push(' '),
            _ if !c.is_control() => flattened.push(c),
            _ => {}
        }
    }
    flattened.trim_end().to_string()
}

/// Raw mode and bracketed paste for the lifetime of a prompt.
struct RawPrompt;

impl RawPrompt {
    fn enter() -> io::Result<Self> {
        enable_raw_mode()?;
        let guard = RawPrompt;
        execute!(io::stdout(), EnableBracketedPaste)?;
        Ok(guard)
    }
}

impl Drop for RawPrompt {
    fn drop(&mut self) {
        let _ = execute!(io::stdout(), DisableBracketedPaste);
        let _ = disable_raw_mode();
        println!();
    }
}

fn draw_masked(out: &mut impl Write, prompt: &str, state: &LineEditorState) -> io::Result<()> {
    let stars = "*".repeat(state.text.chars().count());
    write!(out, "\r\x1b[K{prompt}{stars}\r")?;
    let column = UnicodeWidthStr::width(prompt) + state.cursor;
    if column > 0 {
        write!(out, "\x1b[{column}C")?;
    }
    out.flush()
}

/// Read one line without echoing it; every character shows as `*`. Esc and
/// Ctrl+C cancel with [`io::ErrorKind::Interrupted`].
pub fn prompt_hidden(prompt: &str) -> io::Result<String> {
    let _raw = RawPrompt::enter()?;
    let mut stdout = io::stdout();
    let mut state = LineEditorState::default();
    draw_masked(&mut stdout, prompt, &state)?;

    loop {
        let changed = match event::read()? {
            Event::Key(key) if key.kind == KeyEventKind::Press => match key.code {
                KeyCode::Enter => return Ok(state.text),
                KeyCode::Esc => return Err(cancelled()),
                KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                    return Err(cancelled());
                }
                _ => key_action(&key).is_some_and(|action| state.apply(action)),
            },
            Event::Paste(text) => state.apply(LineEditAction::Paste(text)),
            _ => false,
        };
        if changed {
            draw_masked(&mut stdout, prompt, &state)?;
        }
    }
}

fn cancelled() -> io::Error {
    io::Error::new(io::ErrorKind::Interrupted, "Cancelled by user")
}
