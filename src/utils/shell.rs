//! POSIX shell quoting and the `compgen` probe shared by both backends.

/// Quote `value` so a POSIX shell reads it back as a single literal word.
///
/// Words made only of characters that never need escaping are returned
/// unchanged, which keeps probe commands readable in logs.
///
/// ```
/// use aiterm::utils::shell::quote;
///
/// assert_eq!(quote("/var/log"), "/var/log");
/// assert_eq!(quote("my dir"), "'my dir'");
/// assert_eq!(quote("it's"), "'it'\\''s'");
/// ```
pub fn quote(value: &str) -> String {
    if !value.is_empty() && value.chars().all(is_safe_char) {
        return value.to_string();
    }
    format!("'{}'", value.replace('\'', "'\\''"))
}

fn is_safe_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '@' | '%' | '+' | '=' | ':' | ',' | '.' | '/' | '-')
}

/// Quote a `cd` target while leaving a leading `~` visible to the shell so
/// it still expands to the home directory.
pub fn quote_cd_target(target: &str) -> String {
    if target == "~" {
        return "~".to_string();
    }
    match target.strip_prefix("~/") {
        Some("") => "~/".to_string(),
        Some(rest) => format!("~/{}", quote(rest)),
        None => quote(target),
    }
}

/// Script asking bash for file and command completions of `partial`.
pub fn compgen_script(partial: &str) -> String {
    format!("compgen -f -c -- {} 2>/dev/null", quote(partial))
}

/// Split `compgen` output into candidates, keeping the shell's order and
/// dropping blank lines and repeats.
pub fn parse_completions(output: &str) -> Vec<String> {
    let mut candidates: Vec<String> = Vec::new();
    for line in output.lines() {
        let candidate = line.trim();
        if candidate.is_empty() || candidates.iter().any(|seen| seen == candidate) {
            continue;
        }
        candidates.push(candidate.to_string());
    }
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_neutralises_injection_attempts() {
        let hostile = "x'; rm -rf / #";
        let quoted = quote(hostile);
        assert_eq!(quoted, "'x'\\''; rm -rf / #'");
        assert_eq!(
            compgen_script(hostile),
            "compgen -f -c -- 'x'\\''; rm -rf / #' 2>/dev/null"
        );
    }

    #[test]
    fn quote_wraps_empty_words() {
        assert_eq!(quote(""), "''");
    }

    #[test]
    fn cd_targets_keep_tilde_expansion() {
        assert_eq!(quote_cd_target("~"), "~");
        assert_eq!(quote_cd_target("~/My Docs"), "~/'My Docs'");
        assert_eq!(quote_cd_target("/srv/app"), "/srv/app");
        assert_eq!(quote_cd_target("~user"), "'~user'");
    }

    #[test]
    fn completions_preserve_order_and_drop_repeats() {
        let output = "ls\nlsblk\n\n  ls  \nlsof\n";
        assert_eq!(parse_completions(output), vec!["ls", "lsblk", "lsof"]);
    }
}
