use crate::core::config::data::{Config, ServerProfile};
use crate::core::constants::{
    DEFAULT_MAX_OUTPUT_CHARS, DEFAULT_MODEL, DEFAULT_MODEL_URL, DEFAULT_PERSONA_NAME,
    DEFAULT_PERSONA_ROLE, DEFAULT_REQUEST_TIMEOUT_SECS,
};
use crate::core::dispatch::DispatchSettings;
use crate::core::prompt::Persona;
use crate::utils::url::validate_model_url;
use std::time::Duration;

/// Keys accepted by `aiterm set` / `aiterm unset`.
pub const SETTABLE_KEYS: &[&str] = &[
    "model-url",
    "model",
    "persona-name",
    "persona-role",
    "max-output-chars",
    "stream-output",
    "request-timeout",
    "last-server",
];

fn parse_bool(value: &str) -> Result<bool, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "on" | "true" | "yes" | "1" => Ok(true),
        "off" | "false" | "no" | "0" => Ok(false),
        other => Err(format!("Expected on/off, got '{other}'")),
    }
}

fn non_empty(value: &str, key: &str) -> Result<String, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(format!("{key} cannot be empty"))
    } else {
        Ok(trimmed.to_string())
    }
}

impl Config {
    pub fn effective_model_url(&self) -> String {
        self.model_url
            .clone()
            .unwrap_or_else(|| DEFAULT_MODEL_URL.to_string())
    }

    pub fn effective_model(&self) -> String {
        self.model.clone().unwrap_or_else(|| DEFAULT_MODEL.to_string())
    }

    pub fn persona(&self) -> Persona {
        Persona {
            name: self
                .persona_name
                .clone()
                .unwrap_or_else(|| DEFAULT_PERSONA_NAME.to_string()),
            role: self
                .persona_role
                .clone()
                .unwrap_or_else(|| DEFAULT_PERSONA_ROLE.to_string()),
        }
    }

    pub fn effective_max_output_chars(&self) -> i64 {
        match self.max_output_chars {
            Some(value) if value > 0 => value,
            _ => DEFAULT_MAX_OUTPUT_CHARS,
        }
    }

    pub fn effective_stream_output(&self) -> bool {
        self.stream_output.unwrap_or(true)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(
            self.request_timeout_secs
                .filter(|secs| *secs > 0)
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
        )
    }

    pub fn dispatch_settings(&self) -> DispatchSettings {
        DispatchSettings {
            persona: self.persona(),
            max_output_chars: self.effective_max_output_chars(),
            stream_output: self.effective_stream_output(),
        }
    }

    pub fn set_value(&mut self, key: &str, value: &str) -> Result<(), String> {
        match key {
            "model-url" => self.model_url = Some(validate_model_url(value)?),
            "model" => self.model = Some(non_empty(value, key)?),
            "persona-name" => self.persona_name = Some(non_empty(value, key)?),
            "persona-role" => self.persona_role = Some(non_empty(value, key)?),
            "max-output-chars" => {
                let parsed = value
                    .trim()
                    .parse::<i64>()
                    .map_err(|_| format!("Expected a number, got '{value}'"))?;
                self.max_output_chars = Some(parsed);
            }
            "stream-output" => self.stream_output = Some(parse_bool(value)?),
            "request-timeout" => {
                let parsed = value
                    .trim()
                    .parse::<u64>()
                    .ok()
                    .filter(|secs| *secs > 0)
                    .ok_or_else(|| format!("Expected a positive number of seconds, got '{value}'"))?;
                self.request_timeout_secs = Some(parsed);
            }
            "last-server" => {
                let name = value.trim();
                if self.find_server(name).is_none() {
                    return Err(format!("No saved server named '{name}'"));
                }
                self.last_server = Some(name.to_string());
            }
            other => return Err(unknown_key(other)),
        }
        Ok(())
    }

    pub fn unset_value(&mut self, key: &str) -> Result<(), String> {
        match key {
            "model-url" => self.model_url = None,
            "model" => self.model = None,
            "persona-name" => self.persona_name = None,
            "persona-role" => self.persona_role = None,
            "max-output-chars" => self.max_output_chars = None,
            "stream-output" => self.stream_output = None,
            "request-timeout" => self.request_timeout_secs = None,
            "last-server" => self.last_server = None,
            other => return Err(unknown_key(other)),
        }
        Ok(())
    }

    pub fn find_server(&self, name: &str) -> Option<&ServerProfile> {
        self.servers.iter().find(|server| server.name == name)
    }

    /// Add `profile`, replacing a saved server of the same name. Returns
    /// true when one was replaced.
    pub fn upsert_server(&mut self, profile: ServerProfile) -> bool {
        match self
            .servers
            .iter_mut()
            .find(|server| server.name == profile.name)
        {
            Some(existing) => {
                *existing = profile;
                true
            }
            None => {
                self.servers.push(profile);
                false
            }
        }
    }

    /// Remove a saved server, forgetting it as the last-used one too.
    pub fn remove_server(&mut self, name: &str) -> Option<ServerProfile> {
        let index = self.servers.iter().position(|server| server.name == name)?;
        if self.last_server.as_deref() == Some(name) {
            self.last_server = None;
        }
        Some(self.servers.remove(index))
    }
}

fn unknown_key(key: &str) -> String {
    format!(
        "Unknown setting '{key}'. Available: {}",
        SETTABLE_KEYS.join(", ")
    )
}
