//! Full-screen terminal interface.
//!
//! - [`event_loop`]: reads keys, routes them to [`crate::commands`] and the
//!   line editor, spawns background work and applies its events.
//! - [`renderer`]: draws the transcript, the status line and the input box.
//! - [`lifecycle`]: raw mode and alternate screen setup and teardown.
//!
//! This layer only presents state. [`crate::core`] owns the session and the
//! dispatch loop.

pub mod event_loop;
pub mod lifecycle;
pub mod renderer;
