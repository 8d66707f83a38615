//! The directory-tracking `execute` path shared by both backends.

use super::directory::{self, DirectoryProbe};
use super::{BackendError, ExecOutput, OutputSink, SlotGuard};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// Working directory of a backend.
///
/// Commands always run in `confirmed`, the last directory a probe proved to
/// exist. `reported` is what the user sees and can hold the estimate left
/// behind by a failed `cd`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryState {
    pub confirmed: Option<String>,
    pub reported: Option<String>,
}

impl DirectoryState {
    pub fn confirmed(directory: Option<String>) -> Self {
        Self {
            reported: directory.clone(),
            confirmed: directory,
        }
    }
}

/// What a backend has to provide for [`execute_with_tracking`]: somewhere to
/// keep the tracked directory and a way to run a script in a given
/// directory.
#[async_trait]
pub trait ShellTransport: DirectoryProbe {
    /// OS handle stored in the command slot while `run` is in flight.
    type Control: Send + 'static;

    fn directories(&self) -> DirectoryState;

    fn set_directories(&self, state: DirectoryState);

    /// Directory the next command runs in.
    fn directory(&self) -> Option<String> {
        self.directories().confirmed
    }

    fn set_directory(&self, directory: Option<String>) {
        self.set_directories(DirectoryState::confirmed(directory));
    }

    /// Run `script` with `cwd` as working directory. Implementations attach
    /// their control handle to `guard` once the command has started.
    async fn run(
        &self,
        guard: &SlotGuard<Self::Control>,
        cwd: Option<&str>,
        script: &str,
        sink: Option<OutputSink>,
        timeout: Option<Duration>,
    ) -> Result<ExecOutput, BackendError>;
}

/// Resolve the `cd` segments of `command`, record the resulting directory,
/// and run whatever is left.
///
/// A lone `cd` never reaches the shell: its output is the resolved path,
/// also handed to `sink` when one is given.
pub async fn execute_with_tracking<T: ShellTransport + ?Sized>(
    transport: &T,
    guard: &SlotGuard<T::Control>,
    command: &str,
    sink: Option<OutputSink>,
    timeout: Option<Duration>,
) -> Result<ExecOutput, BackendError> {
    let start = transport.directories();
    let base = start.confirmed.clone();
    let tracked = directory::track(command, base.as_deref(), transport).await;

    let next = DirectoryState {
        confirmed: tracked.confirmed.clone(),
        reported: tracked.directory.clone(),
    };
    if next != start {
        debug!(
            from = start.reported.as_deref().unwrap_or("<unknown>"),
            to = next.reported.as_deref().unwrap_or("<unknown>"),
            confirmed = next.confirmed.as_deref().unwrap_or("<unknown>"),
            "Tracked directory changed"
        );
        transport.set_directories(next);
    }

    if tracked.is_navigation_only() {
        let output = tracked.navigation_output();
        if let Some(sink) = &sink {
            if !output.is_empty() {
                sink(&output);
            }
        }
        return Ok(ExecOutput::completed(output));
    }

    let plan = tracked.plan(base.as_deref());
    transport
        .run(guard, plan.cwd.as_deref(), &plan.script, sink, timeout)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::CommandSlot;
    use crate::utils::test_utils::FakeTransport;
    use std::sync::{Arc, Mutex};

    #[tokio::test]
    async fn navigation_only_command_runs_nothing() {
        let transport = FakeTransport::new("/home/me", &["/home/me", "/srv/www"]);
        transport.set_directory(Some("/home/me".into()));
        let slot = CommandSlot::new();
        let guard = slot.reserve().expect("reserve");

        let seen = Arc::new(Mutex::new(Vec::<String>::new()));
        let collector = Arc::clone(&seen);
        let sink: OutputSink = Arc::new(move |chunk: &str| {
            collector.lock().unwrap().push(chunk.to_string());
        });

        let result = execute_with_tracking(&transport, &guard, "cd /srv/www", Some(sink), None)
            .await
            .expect("navigation succeeds");

        assert_eq!(result.output, "/srv/www");
        assert_eq!(transport.directory().as_deref(), Some("/srv/www"));
        assert!(transport.runs().is_empty());
        assert_eq!(seen.lock().unwrap().as_slice(), ["/srv/www".to_string()]);
    }

    #[tokio::test]
    async fn cd_then_command_runs_in_target() {
        let transport = FakeTransport::new("/home/me", &["/home/me", "/srv/www"]);
        transport.set_directory(Some("/home/me".into()));
        let slot = CommandSlot::new();
        let guard = slot.reserve().expect("reserve");

        execute_with_tracking(&transport, &guard, "cd /srv/www && ls", None, None)
            .await
            .expect("command runs");

        assert_eq!(transport.directory().as_deref(), Some("/srv/www"));
        assert_eq!(
            transport.runs(),
            vec![(Some("/srv/www".to_string()), "ls".to_string())]
        );
    }

    #[tokio::test]
    async fn failed_cd_still_runs_remaining_segments() {
        let transport = FakeTransport::new("/home/me", &["/home/me"]);
        transport.set_directory(Some("/home/me".into()));
        let slot = CommandSlot::new();
        let guard = slot.reserve().expect("reserve");

        execute_with_tracking(&transport, &guard, "cd nope; ls", None, None)
            .await
            .expect("command runs");

        assert_eq!(
            transport.directories(),
            DirectoryState {
                confirmed: Some("/home/me".into()),
                reported: Some("/home/me/nope".into()),
            }
        );
        assert_eq!(
            transport.runs(),
            vec![(Some("/home/me".to_string()), "cd nope; ls".to_string())]
        );
    }

    #[tokio::test]
    async fn failed_cd_does_not_move_later_commands() {
        let transport = FakeTransport::new("/home/me", &["/home/me", "/srv"]);
        transport.set_directory(Some("/home/me".into()));
        let slot = CommandSlot::new();

        {
            let guard = slot.reserve().expect("reserve");
            let result = execute_with_tracking(&transport, &guard, "cd ghost", None, None)
                .await
                .expect("navigation reports the failure");
            assert!(result.output.contains("No such file or directory"));
        }
        assert_eq!(transport.directory().as_deref(), Some("/home/me"));

        let guard = slot.reserve().expect("reserve");
        execute_with_tracking(&transport, &guard, "echo ok", None, None)
            .await
            .expect("command runs");
        drop(guard);

        let guard = slot.reserve().expect("reserve");
        execute_with_tracking(&transport, &guard, "cd /srv && ls", None, None)
            .await
            .expect("command runs");

        assert_eq!(
            transport.runs(),
            vec![
                (Some("/home/me".to_string()), "echo ok".to_string()),
                (Some("/srv".to_string()), "ls".to_string()),
            ]
        );
        assert_eq!(transport.directories(), DirectoryState::confirmed(Some("/srv".into())));
    }
}
