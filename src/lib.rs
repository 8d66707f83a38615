//! aiterm is a terminal shell driven through plain-language requests.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`backend`] runs shell commands locally or over SSH behind one
//!   [`backend::ExecutionBackend`] trait, with streaming output, interrupts
//!   and working-directory tracking.
//! - [`core`] owns the session, the AI dispatch loop that turns model replies
//!   into commands, tab completion cycling and configuration.
//! - [`api`] talks to the Ollama HTTP API.
//! - [`ui`] renders the terminal interface and runs the interactive event loop.
//! - [`commands`] implements slash commands and `!` direct commands.
//!
//! Runtime entrypoints live in the binary crate (`src/main.rs`) and route
//! through [`crate::cli::main`].

pub mod api;
pub mod backend;
pub mod cli;
pub mod commands;
pub mod core;
pub mod ui;
pub mod utils;
