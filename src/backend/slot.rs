//! Exclusive ownership of the single in-flight command of a backend.
//!
//! `execute` reserves the slot before any directory probing happens and
//! holds the returned [`SlotGuard`] until it returns, so a second `execute`
//! fails with [`BackendError::Busy`] instead of racing the first. Once the
//! process or channel exists, its control handle is attached to the slot,
//! where `interrupt`/`kill` can reach it from other threads.

use super::{BackendError, CommandStatus};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// The one running command: its OS-level control handle and status.
struct CommandHandle<C> {
    id: u64,
    control: C,
    status: CommandStatus,
}

enum SlotState<C> {
    Idle,
    Reserved { id: u64 },
    Running(CommandHandle<C>),
}

pub struct CommandSlot<C> {
    state: Arc<Mutex<SlotState<C>>>,
    next_id: AtomicU64,
}

fn lock<C>(state: &Mutex<SlotState<C>>) -> MutexGuard<'_, SlotState<C>> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl<C> Default for CommandSlot<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> CommandSlot<C> {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SlotState::Idle)),
            next_id: AtomicU64::new(1),
        }
    }

    /// Claim the slot for a new command.
    pub fn reserve(&self) -> Result<SlotGuard<C>, BackendError> {
        let mut state = lock(&self.state);
        if !matches!(*state, SlotState::Idle) {
            return Err(BackendError::Busy);
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        *state = SlotState::Reserved { id };
        Ok(SlotGuard {
            state: Arc::clone(&self.state),
            id,
        })
    }

    pub fn is_idle(&self) -> bool {
        matches!(*lock(&self.state), SlotState::Idle)
    }

    /// True while a process or channel is attached.
    pub fn is_running(&self) -> bool {
        matches!(*lock(&self.state), SlotState::Running(_))
    }

    /// Run `deliver` against the attached control handle. When delivery
    /// succeeds the command is marked with `status`, which it reports once
    /// it ends. Returns false when nothing is attached.
    pub fn signal(&self, status: CommandStatus, deliver: impl FnOnce(&C) -> bool) -> bool {
        let mut state = lock(&self.state);
        let SlotState::Running(handle) = &mut *state else {
            return false;
        };
        if handle.status.is_terminal() && handle.status != CommandStatus::Interrupted {
            return false;
        }
        let delivered = deliver(&handle.control);
        if delivered {
            debug!(command_id = handle.id, ?status, "Signal delivered");
            handle.status = status;
        }
        delivered
    }
}

/// Proof of ownership of the slot; releases it on drop.
pub struct SlotGuard<C> {
    state: Arc<Mutex<SlotState<C>>>,
    id: u64,
}

impl<C> SlotGuard<C> {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Attach the control handle of the process or channel just started.
    pub fn attach(&self, control: C) {
        let mut state = lock(&self.state);
        if matches!(*state, SlotState::Reserved { id } if id == self.id) {
            *state = SlotState::Running(CommandHandle {
                id: self.id,
                control,
                status: CommandStatus::Running,
            });
        }
    }

    /// Detach the control handle and settle the command's terminal status.
    ///
    /// A status recorded by `interrupt`/`kill` takes precedence over
    /// `natural`, the status derived from how the command ended.
    pub fn finish(&self, natural: CommandStatus) -> CommandStatus {
        let mut state = lock(&self.state);
        let signalled = match &*state {
            SlotState::Running(handle) if handle.id == self.id => Some(handle.status),
            _ => None,
        };
        if matches!(&*state, SlotState::Running(handle) if handle.id == self.id) {
            *state = SlotState::Reserved { id: self.id };
        }
        match signalled {
            Some(status) if status.is_terminal() => status,
            _ => natural,
        }
    }
}

impl<C> Drop for SlotGuard<C> {
    fn drop(&mut self) {
        let mut state = lock(&self.state);
        let owned = match &*state {
            SlotState::Reserved { id } => *id == self.id,
            SlotState::Running(handle) => handle.id == self.id,
            SlotState::Idle => false,
        };
        if owned {
            *state = SlotState::Idle;
        }
    }
}
