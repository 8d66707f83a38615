use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

/// Diagnostics go to `AITERM_LOG_FILE` when set, so they stay out of the
/// full-screen interface; otherwise to stderr.
fn init_tracing() {
    let filter = EnvFilter::try_from_env("AITERM_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    let log_file = std::env::var_os("AITERM_LOG_FILE")
        .and_then(|path| OpenOptions::new().create(true).append(true).open(path).ok());
    match log_file {
        Some(file) => builder.with_ansi(false).with_writer(Mutex::new(file)).init(),
        None => builder.with_writer(std::io::stderr).init(),
    }
}

fn main() {
    init_tracing();
    if let Err(err) = aiterm::cli::main() {
        eprintln!("❌ {err}");
        std::process::exit(1);
    }
}
