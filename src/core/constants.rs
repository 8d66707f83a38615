//! Shared constants used across the application

/// Number of prior conversation turns embedded in a prompt.
pub const PROMPT_HISTORY_TURNS: usize = 5;

/// Output kept for the transcript and history when no limit is configured.
pub const DEFAULT_MAX_OUTPUT_CHARS: i64 = 150_000;

pub const DEFAULT_MODEL_URL: &str = "http://localhost:11434";
pub const DEFAULT_MODEL: &str = "llama2";
pub const DEFAULT_PERSONA_NAME: &str = "Jarvis";
pub const DEFAULT_PERSONA_ROLE: &str = "Linux Expert";
pub const DEFAULT_SSH_PORT: u16 = 22;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

/// Service name under which server passwords are stored in the OS keyring.
pub const KEYRING_SERVICE: &str = "aiterm";
