//! Tab completion with cycle-on-repeat.
//!
//! The first Tab on a token asks the backend for candidates and applies the
//! first one. Pressing Tab again without editing swaps in the next
//! candidate, wrapping around. Any edit in between starts over.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionEdit {
    pub text: String,
    /// Cursor position in characters.
    pub cursor: usize,
}

/// A lookup to run against the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    pub text: String,
    pub cursor: usize,
    /// Token between the last whitespace before the cursor and the cursor.
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TabAction {
    /// Look up candidates for this request, then call [`CompletionCycler::accept`].
    Fetch(CompletionRequest),
    Apply(CompletionEdit),
    Ignore,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedCompletion {
    pub edit: CompletionEdit,
    /// Shown when more than one candidate is available.
    pub hint: Option<String>,
}

/// Byte offset of the `char_index`-th character, clamped to the end.
fn byte_offset(text: &str, char_index: usize) -> usize {
    text.char_indices()
        .nth(char_index)
        .map(|(offset, _)| offset)
        .unwrap_or(text.len())
}

fn token_start(text: &str, cursor: usize) -> usize {
    let before: Vec<char> = text.chars().take(cursor).collect();
    before
        .iter()
        .rposition(|c| c.is_whitespace())
        .map(|index| index + 1)
        .unwrap_or(0)
}

impl CompletionRequest {
    pub fn at(text: &str, cursor: usize) -> Self {
        let cursor = cursor.min(text.chars().count());
        let start = token_start(text, cursor);
        let token = text
            .chars()
            .skip(start)
            .take(cursor - start)
            .collect::<String>();
        Self {
            text: text.to_string(),
            cursor,
            token,
        }
    }

    fn token_start(&self) -> usize {
        self.cursor - self.token.chars().count()
    }

    /// Replace the token with `candidate`, cursor after the replacement.
    fn apply(&self, candidate: &str) -> CompletionEdit {
        let start = byte_offset(&self.text, self.token_start());
        let end = byte_offset(&self.text, self.cursor);
        let mut text = String::with_capacity(self.text.len() + candidate.len());
        text.push_str(&self.text[..start]);
        text.push_str(candidate);
        text.push_str(&self.text[end..]);
        CompletionEdit {
            text,
            cursor: self.token_start() + candidate.chars().count(),
        }
    }
}

#[derive(Debug)]
struct Cycle {
    request: CompletionRequest,
    candidates: Vec<String>,
    index: usize,
    /// Line text after the last applied candidate.
    applied_text: String,
}

#[derive(Debug, Default)]
pub struct CompletionCycler {
    cycle: Option<Cycle>,
    pending: Option<CompletionRequest>,
}

impl CompletionCycler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle a Tab press on `text` with the cursor at `cursor`.
    pub fn on_tab(&mut self, text: &str, cursor: usize) -> TabAction {
        if let Some(cycle) = &mut self.cycle {
            if cycle.applied_text == text && !cycle.candidates.is_empty() {
                cycle.index = (cycle.index + 1) % cycle.candidates.len();
                let edit = cycle.request.apply(&cycle.candidates[cycle.index]);
                cycle.applied_text = edit.text.clone();
                return TabAction::Apply(edit);
            }
        }
        self.cycle = None;

        let request = CompletionRequest::at(text, cursor);
        if request.token.is_empty() {
            return TabAction::Ignore;
        }
        self.pending = Some(request.clone());
        TabAction::Fetch(request)
    }

    /// Take the candidates for a fetched request. Returns `None` when the
    /// result is stale (the line changed or a newer lookup started) or there
    /// is nothing to apply.
    pub fn accept(
        &mut self,
        text: &str,
        cursor: usize,
        candidates: Vec<String>,
        current_text: &str,
    ) -> Option<AppliedCompletion> {
        let pending = self.pending.take()?;
        if pending.text != text || pending.cursor != cursor || current_text != text {
            self.pending = Some(pending);
            return None;
        }
        let first = candidates.first()?;
        let edit = pending.apply(first);
        let hint = (candidates.len() > 1).then(|| {
            format!(
                "{} completions available. Press Tab again to cycle.",
                candidates.len()
            )
        });
        self.cycle = Some(Cycle {
            request: pending,
            applied_text: edit.text.clone(),
            candidates,
            index: 0,
        });
        Some(AppliedCompletion { edit, hint })
    }

    /// Forget the cycle. Called on any key other than Tab.
    pub fn reset(&mut self) {
        self.cycle = None;
        self.pending = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidates(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn fetch(cycler: &mut CompletionCycler, text: &str, cursor: usize) -> CompletionRequest {
        match cycler.on_tab(text, cursor) {
            TabAction::Fetch(request) => request,
            other => panic!("expected fetch, got {other:?}"),
        }
    }

    #[test]
    fn token_spans_last_whitespace_to_cursor() {
        let request = CompletionRequest::at("cat /var/lo", 11);
        assert_eq!(request.token, "/var/lo");
        let middle = CompletionRequest::at("ls fo bar", 5);
        assert_eq!(middle.token, "fo");
    }

    #[test]
    fn cycles_through_candidates_and_wraps() {
        let mut cycler = CompletionCycler::new();
        let request = fetch(&mut cycler, "x", 1);
        let first = cycler
            .accept(&request.text, request.cursor, candidates(&["a", "b", "c"]), "x")
            .expect("applied");
        let mut seen = vec![first.edit.text.clone()];
        assert!(first.hint.is_some_and(|hint| hint.starts_with("3 completions")));

        let mut text = first.edit.text;
        let mut cursor = first.edit.cursor;
        for _ in 0..3 {
            match cycler.on_tab(&text, cursor) {
                TabAction::Apply(edit) => {
                    text = edit.text;
                    cursor = edit.cursor;
                    seen.push(text.clone());
                }
                other => panic!("expected apply, got {other:?}"),
            }
        }
        assert_eq!(seen, vec!["a", "b", "c", "a"]);
    }

    #[test]
    fn replacement_keeps_surrounding_text() {
        let mut cycler = CompletionCycler::new();
        let request = fetch(&mut cycler, "cd Doc && ls", 6);
        let applied = cycler
            .accept(&request.text, request.cursor, candidates(&["Documents"]), "cd Doc && ls")
            .expect("applied");
        assert_eq!(applied.edit.text, "cd Documents && ls");
        assert_eq!(applied.edit.cursor, 12);
        assert_eq!(applied.hint, None);
    }

    #[test]
    fn edits_invalidate_the_cycle() {
        let mut cycler = CompletionCycler::new();
        let request = fetch(&mut cycler, "gi", 2);
        cycler
            .accept(&request.text, request.cursor, candidates(&["git", "gist"]), "gi")
            .expect("applied");

        assert!(matches!(cycler.on_tab("git ", 4), TabAction::Ignore));
        assert!(matches!(cycler.on_tab("git s", 5), TabAction::Fetch(_)));

        cycler.reset();
        assert!(matches!(cycler.on_tab("git", 3), TabAction::Fetch(_)));
    }

    #[test]
    fn stale_results_are_dropped() {
        let mut cycler = CompletionCycler::new();
        let request = fetch(&mut cycler, "ec", 2);
        assert!(cycler
            .accept(&request.text, request.cursor, candidates(&["echo"]), "ech")
            .is_none());
        assert!(cycler
            .accept("other", 5, candidates(&["echo"]), "other")
            .is_none());
        assert!(cycler
            .accept(&request.text, request.cursor, Vec::new(), "ec")
            .is_none());
    }

    #[test]
    fn empty_token_is_ignored() {
        let mut cycler = CompletionCycler::new();
        assert_eq!(cycler.on_tab("ls ", 3), TabAction::Ignore);
        assert_eq!(cycler.on_tab("", 0), TabAction::Ignore);
    }
}
