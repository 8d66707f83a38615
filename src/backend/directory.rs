//! Working-directory tracking across compound commands.
//!
//! Backends run each command in a fresh shell, so a `cd` inside one command
//! would be forgotten by the next. [`track`] walks the top-level `;` / `&&`
//! segments of a command, resolves every `cd` through a [`DirectoryProbe`],
//! and produces the directory the shell will end up in plus a rewritten
//! script that reproduces those moves from the tracked starting point.
//!
//! The segmenter is a heuristic: it does not understand quoting, subshells
//! or `||`, and a `;` inside a quoted string splits the command anyway.

use crate::utils::shell;
use async_trait::async_trait;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Separator {
    Semicolon,
    And,
}

impl Separator {
    fn as_str(self) -> &'static str {
        match self {
            Separator::Semicolon => ";",
            Separator::And => "&&",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Separator(Separator),
    Command(String),
}

/// Split on top-level `;` and `&&`, keeping the separators as tokens.
/// Segments are trimmed and empty ones dropped.
pub fn split_segments(command: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut buffer = String::new();
    let mut chars = command.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            ';' => {
                flush(&mut buffer, &mut segments);
                segments.push(Segment::Separator(Separator::Semicolon));
            }
            '&' if chars.peek() == Some(&'&') => {
                chars.next();
                flush(&mut buffer, &mut segments);
                segments.push(Segment::Separator(Separator::And));
            }
            _ => buffer.push(ch),
        }
    }
    flush(&mut buffer, &mut segments);
    segments
}

fn flush(buffer: &mut String, segments: &mut Vec<Segment>) {
    let trimmed = buffer.trim();
    if !trimmed.is_empty() {
        segments.push(Segment::Command(trimmed.to_string()));
    }
    buffer.clear();
}

/// Recognise a `cd` segment.
///
/// Returns `None` for anything that is not a `cd`, `Some(None)` for a `cd`
/// that goes home (no argument, or `~`), and `Some(Some(target))` otherwise.
pub fn cd_target(segment: &str) -> Option<Option<String>> {
    let segment = segment.trim();
    let rest = if segment == "cd" {
        ""
    } else if let Some(rest) = segment.strip_prefix("cd ") {
        rest
    } else if let Some(rest) = segment.strip_prefix("cd\t") {
        rest
    } else {
        return None;
    };

    match first_word(rest.trim_start()) {
        None => Some(None),
        Some(word) if word == "~" => Some(None),
        Some(word) => Some(Some(word)),
    }
}

/// First shell word of `input`, honouring quotes and backslash escapes.
fn first_word(input: &str) -> Option<String> {
    let mut word = String::new();
    let mut seen = false;
    let mut chars = input.chars();
    let mut quote: Option<char> = None;

    while let Some(ch) = chars.next() {
        match quote {
            Some('\'') => {
                if ch == '\'' {
                    quote = None;
                } else {
                    word.push(ch);
                }
            }
            Some(_) => match ch {
                '"' => quote = None,
                '\\' => {
                    if let Some(next) = chars.next() {
                        word.push(next);
                    }
                }
                _ => word.push(ch),
            },
            None => match ch {
                c if c.is_whitespace() => break,
                '\'' | '"' => {
                    quote = Some(ch);
                    seen = true;
                }
                '\\' => {
                    if let Some(next) = chars.next() {
                        word.push(next);
                        seen = true;
                    }
                }
                _ => {
                    word.push(ch);
                    seen = true;
                }
            },
        }
    }

    if seen {
        Some(word)
    } else {
        None
    }
}

/// Lexically normalise a POSIX path: collapse `.`, `..` and repeated slashes.
pub fn normalize_posix(path: &str) -> String {
    let absolute = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                if matches!(parts.last(), Some(last) if *last != "..") {
                    parts.pop();
                } else if !absolute {
                    parts.push("..");
                }
            }
            other => parts.push(other),
        }
    }

    let joined = parts.join("/");
    if absolute {
        format!("/{joined}")
    } else if joined.is_empty() {
        ".".to_string()
    } else {
        joined
    }
}

/// Best-effort directory after `cd target` from `base`, without touching
/// any filesystem. `None` when there is nothing to anchor the result to.
pub fn estimate_directory(
    base: Option<&str>,
    target: Option<&str>,
    home: Option<&str>,
) -> Option<String> {
    let Some(target) = target else {
        return home.map(normalize_posix).or_else(|| base.map(str::to_string));
    };

    if target.starts_with('/') {
        return Some(normalize_posix(target));
    }
    if let Some(rest) = target.strip_prefix("~/") {
        return home.map(|home| normalize_posix(&format!("{home}/{rest}")));
    }
    base.map(|base| normalize_posix(&format!("{base}/{target}")))
}

/// Resolves `cd` targets for a backend.
#[async_trait]
pub trait DirectoryProbe: Send + Sync {
    /// Absolute directory reached by `cd target` starting from `base`.
    /// `target` of `None` means the home directory. The error is a short
    /// diagnostic suitable for showing to the user.
    async fn probe_directory(
        &self,
        base: Option<&str>,
        target: Option<&str>,
    ) -> Result<String, String>;

    /// Home directory used when a probe fails, if known without a round-trip.
    fn home_directory(&self) -> Option<String> {
        None
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackedSegment {
    Separator(Separator),
    /// A `cd` segment. `resolved` is set only when the probe confirmed it.
    Cd {
        text: String,
        resolved: Option<String>,
    },
    Command(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedCommand {
    pub segments: Vec<TrackedSegment>,
    /// Directory the shell is expected to be in after the command. After a
    /// failed probe this is an estimate.
    pub directory: Option<String>,
    /// Last directory a probe confirmed, or the start when none did.
    pub confirmed: Option<String>,
    /// Probe failure that stopped tracking, if any.
    pub diagnostic: Option<String>,
}

/// Where and what to run once `cd` segments have been resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionPlan {
    pub cwd: Option<String>,
    pub script: String,
}

impl TrackedCommand {
    /// True when the command is a single `cd` and nothing else.
    pub fn is_navigation_only(&self) -> bool {
        let mut cds = 0;
        for segment in &self.segments {
            match segment {
                TrackedSegment::Command(_) => return false,
                TrackedSegment::Cd { .. } => cds += 1,
                TrackedSegment::Separator(_) => {}
            }
        }
        cds == 1
    }

    /// Text reported for a navigation-only command: the diagnostic (if a
    /// probe failed) followed by the resulting directory.
    pub fn navigation_output(&self) -> String {
        let mut lines: Vec<&str> = Vec::new();
        if let Some(diagnostic) = &self.diagnostic {
            lines.push(diagnostic);
        }
        if let Some(directory) = &self.directory {
            lines.push(directory);
        }
        lines.join("\n")
    }

    /// Build the invocation for everything that is not navigation-only.
    ///
    /// Confirmed `cd` segments in front of the first other command are
    /// folded into the working directory of the spawned shell. Later
    /// confirmed ones are rewritten to absolute targets; unconfirmed ones run
    /// as written. A command of `cd` segments only is never folded away.
    pub fn plan(&self, start: Option<&str>) -> ExecutionPlan {
        let mut cwd = start.map(str::to_string);
        let mut index = 0;
        let has_command = self
            .segments
            .iter()
            .any(|segment| matches!(segment, TrackedSegment::Command(_)));

        while let Some(segment) = self.segments.get(index).filter(|_| has_command) {
            match segment {
                TrackedSegment::Cd {
                    resolved: Some(resolved),
                    ..
                } => cwd = Some(resolved.clone()),
                TrackedSegment::Separator(_) => {}
                _ => break,
            }
            index += 1;
        }

        let mut script = String::new();
        for segment in &self.segments[index..] {
            match segment {
                TrackedSegment::Separator(separator) => {
                    if matches!(separator, Separator::And) {
                        script.push(' ');
                    }
                    script.push_str(separator.as_str());
                    script.push(' ');
                }
                TrackedSegment::Cd {
                    resolved: Some(resolved),
                    ..
                } => {
                    script.push_str("cd ");
                    script.push_str(&shell::quote(resolved));
                }
                TrackedSegment::Cd { text, .. } | TrackedSegment::Command(text) => {
                    script.push_str(text);
                }
            }
        }

        ExecutionPlan {
            cwd,
            script: script.trim().to_string(),
        }
    }
}

/// Resolve every `cd` segment of `command`, starting from `start`.
pub async fn track<P: DirectoryProbe + ?Sized>(
    command: &str,
    start: Option<&str>,
    probe: &P,
) -> TrackedCommand {
    let mut current = start.map(str::to_string);
    let mut confirmed = current.clone();
    let mut diagnostic = None;
    let mut tracking = true;
    let mut segments = Vec::new();

    for segment in split_segments(command) {
        let text = match segment {
            Segment::Separator(separator) => {
                segments.push(TrackedSegment::Separator(separator));
                continue;
            }
            Segment::Command(text) => text,
        };

        let Some(target) = cd_target(&text) else {
            segments.push(TrackedSegment::Command(text));
            continue;
        };

        if !tracking {
            segments.push(TrackedSegment::Cd {
                text,
                resolved: None,
            });
            continue;
        }

        match probe
            .probe_directory(current.as_deref(), target.as_deref())
            .await
        {
            Ok(resolved) => {
                debug!(segment = %text, directory = %resolved, "Resolved cd segment");
                current = Some(resolved.clone());
                confirmed = Some(resolved.clone());
                segments.push(TrackedSegment::Cd {
                    text,
                    resolved: Some(resolved),
                });
            }
            Err(err) => {
                warn!(segment = %text, error = %err, "Directory probe failed; tracking stopped");
                tracking = false;
                let home = probe.home_directory();
                if let Some(estimate) =
                    estimate_directory(current.as_deref(), target.as_deref(), home.as_deref())
                {
                    current = Some(estimate);
                }
                diagnostic = Some(err);
                segments.push(TrackedSegment::Cd {
                    text,
                    resolved: None,
                });
            }
        }
    }

    TrackedCommand {
        segments,
        directory: current,
        confirmed,
        diagnostic,
    }
}
