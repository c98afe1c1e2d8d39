/*!
 * Loopback Backend
 *
 * In-memory execution backend. Launches are recorded instead of executed and
 * posted messages are kept for inspection, either all of them or a bounded
 * tail. Clones share state, so a test (or the driver binary) can hold one
 * clone while the kernel owns another.
 */

use super::{BackendError, ExecutionBackend, LaunchSpec, UnitMessage};
use crate::core::types::UnitHandle;
use crate::manifest::ProgramKind;
use parking_lot::Mutex;
use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Default)]
struct LoopbackState {
    next_handle: u64,
    /// Entries kept per record; `None` keeps everything
    history: Option<usize>,
    launched: VecDeque<(UnitHandle, LaunchSpec)>,
    posted: VecDeque<(UnitHandle, UnitMessage)>,
    terminated: VecDeque<UnitHandle>,
    disabled: BTreeSet<ProgramKind>,
    /// When set, the next launch fails with this message
    fail_next_launch: Option<String>,
}

impl LoopbackState {
    fn record<T>(history: Option<usize>, entries: &mut VecDeque<T>, entry: T) {
        entries.push_back(entry);
        if let Some(limit) = history {
            while entries.len() > limit {
                entries.pop_front();
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LoopbackBackend {
    state: Arc<Mutex<LoopbackState>>,
}

impl LoopbackBackend {
    /// A backend that keeps every launch and message for inspection
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend that keeps only the latest `limit` launches, messages and
    /// terminations, for long-running sessions
    pub fn bounded(limit: usize) -> Self {
        let backend = Self::default();
        backend.state.lock().history = Some(limit);
        backend
    }

    /// Refuse every launch of the given program kind
    pub fn disable(&self, kind: ProgramKind) {
        self.state.lock().disabled.insert(kind);
    }

    pub fn enable(&self, kind: ProgramKind) {
        self.state.lock().disabled.remove(&kind);
    }

    pub fn fail_next_launch(&self, message: impl Into<String>) {
        self.state.lock().fail_next_launch = Some(message.into());
    }

    /// Handle issued to the launch of `pid`
    pub fn handle_of(&self, pid: i32) -> Option<UnitHandle> {
        self.state
            .lock()
            .launched
            .iter()
            .find(|(_, spec)| spec.pid == pid)
            .map(|(handle, _)| *handle)
    }

    pub fn launch_of(&self, pid: i32) -> Option<LaunchSpec> {
        self.state
            .lock()
            .launched
            .iter()
            .find(|(_, spec)| spec.pid == pid)
            .map(|(_, spec)| spec.clone())
    }

    pub fn launched_count(&self) -> usize {
        self.state.lock().launched.len()
    }

    /// Messages posted to one unit, in order
    pub fn posted_to(&self, handle: UnitHandle) -> Vec<UnitMessage> {
        self.state
            .lock()
            .posted
            .iter()
            .filter(|(h, _)| *h == handle)
            .map(|(_, message)| message.clone())
            .collect()
    }

    pub fn is_terminated(&self, handle: UnitHandle) -> bool {
        self.state.lock().terminated.contains(&handle)
    }
}

impl ExecutionBackend for LoopbackBackend {
    fn supports(&self, kind: ProgramKind) -> bool {
        !self.state.lock().disabled.contains(&kind)
    }

    fn launch(&mut self, spec: &LaunchSpec) -> Result<UnitHandle, BackendError> {
        let mut state = self.state.lock();
        if let Some(message) = state.fail_next_launch.take() {
            return Err(BackendError::LaunchFailed(message));
        }
        state.next_handle += 1;
        let handle = UnitHandle(state.next_handle);
        info!(%handle, pid = spec.pid, command = %spec.command, "Loopback launch");
        let history = state.history;
        LoopbackState::record(history, &mut state.launched, (handle, spec.clone()));
        Ok(handle)
    }

    fn post(&mut self, handle: UnitHandle, message: UnitMessage) {
        debug!(%handle, ?message, "Loopback post");
        let mut state = self.state.lock();
        let history = state.history;
        LoopbackState::record(history, &mut state.posted, (handle, message));
    }

    fn terminate(&mut self, handle: UnitHandle) {
        debug!(%handle, "Loopback terminate");
        let mut state = self.state.lock();
        let history = state.history;
        LoopbackState::record(history, &mut state.terminated, handle);
    }
}
