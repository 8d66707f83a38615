//! Command-line interface parsing and handling
//!
//! This module handles parsing command-line arguments and executing the appropriate commands.

pub mod ask;
pub mod model_list;
pub mod servers;

use std::error::Error;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use crate::api::ollama::OllamaClient;
use crate::cli::ask::run_ask;
use crate::cli::model_list::{check_model, list_models};
use crate::cli::servers::{add_server, list_servers, remove_server, AddServerRequest};
use crate::core::config::orchestrator::ConfigOrchestrator;
use crate::core::config::Config;
use crate::ui::event_loop::{run_chat, ChatOptions};

#[derive(Parser)]
#[command(name = "aiterm", version)]
#[command(about = "A shell you drive in plain language, locally or over SSH")]
#[command(
    long_about = "aiterm is a full-screen terminal where requests in plain language are turned \
into shell commands by a local AI model (Ollama). Commands run on this machine or on a saved \
SSH server, with output streamed back and the working directory tracked across commands.\n\n\
Controls:\n\
  Enter             Send the request\n\
  !<command>        Run a command directly, without the AI\n\
  Tab               Complete the word under the cursor (again to cycle)\n\
  Ctrl+C            Interrupt the running command, or quit when idle\n\
  Esc               Kill the running command\n\
  PgUp/PgDn         Scroll the transcript\n\n\
Commands:\n\
  /help             Show commands and key bindings\n\
  /connect <name>   Connect to a saved server\n\
  /local            Switch back to the local terminal\n\
  /log <filename>   Enable logging to specified file\n\
  /log              Toggle logging pause/resume"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Model to use instead of the configured one
    #[arg(short = 'm', long, global = true)]
    pub model: Option<String>,

    /// Saved server to connect to instead of the last used one
    #[arg(short = 's', long, global = true)]
    pub server: Option<String>,

    /// Enable logging to specified file
    #[arg(short = 'l', long, global = true)]
    pub log: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the interactive terminal (default)
    Chat,
    /// Run one request without the interface and print what happens
    Ask {
        /// The request, in plain language
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        request: Vec<String>,
    },
    /// List the models installed on the AI endpoint
    Models,
    /// Check that the AI endpoint is reachable
    Check,
    /// Manage saved SSH servers
    Servers {
        #[command(subcommand)]
        command: ServersCommand,
    },
    /// Set a configuration value
    Set {
        /// Configuration key to set
        key: String,
        /// Value to set (may be several words, e.g. for persona-role)
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        value: Vec<String>,
    },
    /// Reset a configuration value to its default
    Unset {
        /// Configuration key to unset
        key: String,
    },
    /// Print the current configuration
    Config,
}

#[derive(Subcommand)]
pub enum ServersCommand {
    /// List saved servers
    List,
    /// Save a server. Prompts for a password unless --key-file is given.
    Add {
        name: String,
        #[arg(long)]
        host: String,
        #[arg(short = 'u', long = "user")]
        username: String,
        #[arg(short = 'p', long, default_value_t = 22)]
        port: u16,
        /// Authenticate with this private key instead of a password
        #[arg(long)]
        key_file: Option<String>,
        /// Store the password in the config file instead of the keyring
        #[arg(long)]
        password_in_config: bool,
    },
    /// Remove a saved server and its stored password
    Remove { name: String },
}

pub fn main() -> Result<(), Box<dyn Error>> {
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async_main())
}

fn model_client(config: &Config, model: Option<String>) -> Result<OllamaClient, Box<dyn Error>> {
    let model = model.unwrap_or_else(|| config.effective_model());
    Ok(OllamaClient::new(
        &config.effective_model_url(),
        &model,
        config.request_timeout(),
    )?)
}

async fn async_main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    match args.command.unwrap_or(Commands::Chat) {
        Commands::Chat => {
            run_chat(ChatOptions {
                server: args.server,
                model: args.model,
                log: args.log,
            })
            .await
        }
        Commands::Ask { request } => {
            let config = Config::load()?;
            let client = model_client(&config, args.model)?;
            run_ask(&config, Arc::new(client), args.server, request.join(" ")).await
        }
        Commands::Models => {
            let config = Config::load()?;
            list_models(&model_client(&config, args.model)?).await
        }
        Commands::Check => {
            let config = Config::load()?;
            check_model(&model_client(&config, args.model)?).await
        }
        Commands::Servers { command } => {
            let store = ConfigOrchestrator::open_default()?;
            match command {
                ServersCommand::List => {
                    list_servers(&store.load_with_cache()?);
                    Ok(())
                }
                ServersCommand::Add {
                    name,
                    host,
                    username,
                    port,
                    key_file,
                    password_in_config,
                } => add_server(
                    &store,
                    AddServerRequest {
                        name,
                        host,
                        username,
                        port,
                        key_file,
                        password_in_config,
                    },
                ),
                ServersCommand::Remove { name } => remove_server(&store, &name),
            }
        }
        Commands::Set { key, value } => {
            let value = value.join(" ");
            let store = ConfigOrchestrator::open_default()?;
            store.mutate(|config| Ok(config.set_value(&key, &value)?))?;
            println!("✅ Set {key} to: {value}");
            Ok(())
        }
        Commands::Unset { key } => {
            let store = ConfigOrchestrator::open_default()?;
            store.mutate(|config| Ok(config.unset_value(&key)?))?;
            println!("✅ Unset {key}");
            Ok(())
        }
        Commands::Config => {
            Config::load()?.print_all();
            Ok(())
        }
    }
}
