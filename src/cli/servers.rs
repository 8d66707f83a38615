//! `aiterm servers list|add|remove`.

use std::error::Error;

use tracing::warn;

use crate::core::config::orchestrator::ConfigOrchestrator;
use crate::core::config::{Config, ServerProfile};
use crate::core::keyring::{self, KeyringAccessError};
use crate::utils::line_editor::prompt_hidden;

pub struct AddServerRequest {
    pub name: String,
    pub host: String,
    pub username: String,
    pub port: u16,
    pub key_file: Option<String>,
    pub password_in_config: bool,
}

pub fn render_servers(config: &Config) -> String {
    if config.servers.is_empty() {
        return "No saved servers. Add one with `aiterm servers add <name> --host <host> --user <user>`.\n"
            .to_string();
    }
    let mut out = String::from("Saved servers:\n");
    for server in &config.servers {
        let marker = if config.last_server.as_deref() == Some(server.name.as_str()) {
            " (last used)"
        } else {
            ""
        };
        out.push_str(&format!(
            "  • {}: {}@{}:{}{marker}\n",
            server.name, server.username, server.host, server.port
        ));
    }
    out
}

pub fn list_servers(config: &Config) {
    print!("{}", render_servers(config));
}

fn prompt_password(name: &str) -> Result<String, Box<dyn Error>> {
    let password = prompt_hidden(&format!("Password for '{name}': "))?;
    if password.is_empty() {
        return Err("A password is required unless --key-file is given.".into());
    }
    Ok(password)
}

pub fn add_server(
    store: &ConfigOrchestrator,
    request: AddServerRequest,
) -> Result<(), Box<dyn Error>> {
    let password = match request.key_file {
        Some(_) => None,
        None => Some(prompt_password(&request.name)?),
    };
    let replaced = save_server(store, request, password, keyring::set_server_password)?;
    if replaced {
        println!("✅ Updated server");
    } else {
        println!("✅ Saved server");
    }
    Ok(())
}

/// Store the profile, putting `password` in the keyring unless the request
/// asks for it to live in the config file. Returns true when an existing
/// profile was replaced.
pub fn save_server<F>(
    store: &ConfigOrchestrator,
    request: AddServerRequest,
    password: Option<String>,
    store_password: F,
) -> Result<bool, Box<dyn Error>>
where
    F: FnOnce(&str, &str) -> Result<(), KeyringAccessError>,
{
    if request.name.trim().is_empty() {
        return Err("Server name cannot be empty.".into());
    }

    let mut profile = ServerProfile {
        name: request.name,
        host: request.host,
        port: request.port,
        username: request.username,
        password: None,
        key_file: request.key_file,
    };

    if let Some(password) = password {
        if request.password_in_config {
            profile.password = Some(password);
        } else {
            store_password(&profile.name, &password).map_err(|err| {
                format!(
                    "Could not store the password in the keyring ({err}). Use --password-in-config \
                     or --key-file instead."
                )
            })?;
        }
    }

    store.mutate(move |config| Ok(config.upsert_server(profile)))
}

pub fn remove_server(store: &ConfigOrchestrator, name: &str) -> Result<(), Box<dyn Error>> {
    remove_server_with(store, name, keyring::delete_server_password)?;
    println!("✅ Removed server '{name}'");
    Ok(())
}

pub fn remove_server_with<F>(
    store: &ConfigOrchestrator,
    name: &str,
    delete_password: F,
) -> Result<ServerProfile, Box<dyn Error>>
where
    F: FnOnce(&str) -> Result<bool, KeyringAccessError>,
{
    let removed = store.mutate(|config| {
        config
            .remove_server(name)
            .ok_or_else(|| format!("No saved server named '{name}'").into())
    })?;
    if let Err(err) = delete_password(name) {
        warn!(server = name, error = %err, "Failed to delete stored password");
    }
    Ok(removed)
}
