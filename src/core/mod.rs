pub mod app;
pub mod completion;
pub mod config;
pub mod constants;
pub mod decision;
pub mod dispatch;
pub mod events;
pub mod keyring;
pub mod message;
pub mod prompt;
pub mod session;
