//! The active backend and its connection state.
//!
//! Exactly one backend is active at a time. Switching hands the outgoing
//! backend to [`switch_backend`], which kills and disconnects it before the
//! incoming one connects, all inside one task.

use crate::backend::{same_backend, ExecutionBackend};
use crate::core::events::ConnectionState;
use std::sync::Arc;
use tracing::debug;

pub struct SessionManager {
    backend: Option<Arc<dyn ExecutionBackend>>,
    state: ConnectionState,
    directory: Option<String>,
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionManager {
    pub fn new() -> Self {
        Self {
            backend: None,
            state: ConnectionState::Disconnected,
            directory: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn backend(&self) -> Option<&Arc<dyn ExecutionBackend>> {
        self.backend.as_ref()
    }

    /// The active backend, only once its connection succeeded.
    pub fn connected_backend(&self) -> Option<Arc<dyn ExecutionBackend>> {
        match self.state {
            ConnectionState::Connected => self.backend.clone(),
            _ => None,
        }
    }

    pub fn label(&self) -> String {
        self.backend
            .as_ref()
            .map(|backend| backend.label())
            .unwrap_or_else(|| "None".to_string())
    }

    pub fn directory(&self) -> Option<&str> {
        self.directory.as_deref()
    }

    pub fn set_directory(&mut self, directory: String) {
        self.directory = Some(directory);
    }

    /// Make `incoming` the active backend in the `Connecting` state and
    /// return the one it replaces.
    pub fn begin_switch(
        &mut self,
        incoming: Arc<dyn ExecutionBackend>,
    ) -> Option<Arc<dyn ExecutionBackend>> {
        self.state = ConnectionState::Connecting;
        self.directory = None;
        self.backend.replace(incoming)
    }

    /// Record a connect result. Results for a backend that is no longer
    /// active are ignored and `false` is returned.
    pub fn mark(
        &mut self,
        backend: &Arc<dyn ExecutionBackend>,
        result: &Result<String, String>,
    ) -> bool {
        let Some(active) = &self.backend else {
            return false;
        };
        if !same_backend(active, backend) {
            debug!(label = %backend.label(), "Ignoring connect result for replaced backend");
            return false;
        }
        match result {
            Ok(_) => {
                self.state = ConnectionState::Connected;
                self.directory = backend.current_directory();
            }
            Err(_) => {
                self.state = ConnectionState::Failed;
                self.directory = None;
            }
        }
        true
    }

    /// Forget the active backend. The caller disconnects it.
    pub fn clear(&mut self) -> Option<Arc<dyn ExecutionBackend>> {
        self.state = ConnectionState::Disconnected;
        self.directory = None;
        self.backend.take()
    }
}

/// Tear down `outgoing` (killing its command first) and connect `incoming`.
pub async fn switch_backend(
    outgoing: Option<Arc<dyn ExecutionBackend>>,
    incoming: Arc<dyn ExecutionBackend>,
) -> Result<String, String> {
    if let Some(outgoing) = outgoing {
        if !same_backend(&outgoing, &incoming) {
            outgoing.kill();
            outgoing.disconnect().await;
        }
    }
    incoming.connect().await.map_err(|err| err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::test_utils::FakeBackend;

    #[test]
    fn switch_moves_through_connecting() {
        let mut session = SessionManager::new();
        assert_eq!(session.state(), ConnectionState::Disconnected);
        assert!(session.connected_backend().is_none());

        let backend: Arc<dyn ExecutionBackend> = Arc::new(FakeBackend::new(Some("/srv")));
        assert!(session.begin_switch(Arc::clone(&backend)).is_none());
        assert_eq!(session.state(), ConnectionState::Connecting);
        assert!(session.connected_backend().is_none());

        assert!(session.mark(&backend, &Ok("ok".to_string())));
        assert_eq!(session.state(), ConnectionState::Connected);
        assert_eq!(session.directory(), Some("/srv"));
        assert!(session.connected_backend().is_some());
    }

    #[test]
    fn stale_connect_results_are_ignored() {
        let mut session = SessionManager::new();
        let first: Arc<dyn ExecutionBackend> = Arc::new(FakeBackend::new(None));
        let second: Arc<dyn ExecutionBackend> = Arc::new(FakeBackend::new(None));
        session.begin_switch(Arc::clone(&first));
        let replaced = session.begin_switch(Arc::clone(&second)).expect("first");
        assert!(same_backend(&replaced, &first));

        assert!(!session.mark(&first, &Ok("late".to_string())));
        assert_eq!(session.state(), ConnectionState::Connecting);

        assert!(session.mark(&second, &Err("refused".to_string())));
        assert_eq!(session.state(), ConnectionState::Failed);
    }

    #[tokio::test]
    async fn switching_disconnects_the_outgoing_backend() {
        let outgoing = Arc::new(FakeBackend::new(None));
        let incoming = Arc::new(FakeBackend::new(None));
        outgoing.connect().await.expect("connect");

        let previous: Arc<dyn ExecutionBackend> = outgoing.clone();
        let result = switch_backend(Some(previous), incoming.clone()).await;

        assert!(result.is_ok());
        assert!(!outgoing.is_connected());
        assert!(outgoing.was_killed());
        assert!(incoming.is_connected());
    }

    #[tokio::test]
    async fn connect_failure_is_reported() {
        let incoming = Arc::new(FakeBackend::new(None));
        incoming.fail_connect("auth rejected");

        let result = switch_backend(None, incoming).await;
        assert_eq!(result, Err("Connection failed: auth rejected".to_string()));
    }
}
