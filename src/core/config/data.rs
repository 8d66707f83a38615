use crate::core::constants::DEFAULT_SSH_PORT;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

fn default_port() -> u16 {
    DEFAULT_SSH_PORT
}

/// A saved SSH server.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ServerProfile {
    pub name: String,
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub username: String,
    /// Plain-text password. Prefer the keyring; this exists for hosts
    /// without a usable keyring backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Private key used when no password is available.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_file: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub servers: Vec<ServerProfile>,
    /// Server connected to at startup; unset means the local terminal
    pub last_server: Option<String>,
    /// Base URL of the Ollama endpoint
    pub model_url: Option<String>,
    pub model: Option<String>,
    /// Name the assistant introduces itself with
    pub persona_name: Option<String>,
    pub persona_role: Option<String>,
    /// Characters of command output kept; zero or negative means the default
    pub max_output_chars: Option<i64>,
    /// Stream command output as it arrives
    pub stream_output: Option<bool>,
    /// Timeout for a single model request, in seconds
    pub request_timeout_secs: Option<u64>,
}

/// Get a user-friendly display string for a path
/// Converts absolute paths to use ~ notation on Unix-like systems when possible
///
/// # Examples
/// - Unix: `/home/user/.config/aiterm/config.toml` → `~/.config/aiterm/config.toml`
/// - macOS: `/Users/user/Library/Application Support/...` → `~/Library/Application Support/...`
pub fn path_display<P: AsRef<Path>>(path: P) -> String {
    let path = path.as_ref();

    #[cfg(unix)]
    {
        if let Some(home) = std::env::var_os("HOME") {
            let home_path = PathBuf::from(home);
            if let Ok(relative) = path.strip_prefix(&home_path) {
                return format!("~/{}", relative.display());
            }
        }
    }

    path.display().to_string()
}

/// Expand a leading `~/` against the home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(dirs) = directories::BaseDirs::new() {
            return dirs.home_dir().join(rest);
        }
    }
    PathBuf::from(path)
}
