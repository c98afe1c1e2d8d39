/*!
 * Shared Test Harness
 * Process manager over the loopback backend with a recording listener
 */

#![allow(dead_code)]

use jobctl_kernel::backend::{HeadlessPresenter, LoadProgress, LoopbackBackend};
use jobctl_kernel::core::types::{ExitCode, Pid, UnitHandle};
use jobctl_kernel::manifest::{ManifestLocation, ProgramKind, ResolvedProgram};
use jobctl_kernel::process::{
    ExitReport, HostListener, ProcessManager, SpawnPlan, WaitOptions, WaitReply, WaitResult,
};
use jobctl_kernel::KernelConfig;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::oneshot;

/// Something the manager told the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Stdout(String),
    Error { command: String, message: String },
    RootLoaded,
    RootProgress(u64),
}

#[derive(Clone, Default)]
pub struct RecordingListener {
    notices: Arc<Mutex<Vec<Notice>>>,
}

impl RecordingListener {
    pub fn take(&self) -> Vec<Notice> {
        std::mem::take(&mut *self.notices.lock())
    }
}

impl HostListener for RecordingListener {
    fn on_stdout(&mut self, text: &str) {
        self.notices.lock().push(Notice::Stdout(text.to_string()));
    }

    fn on_error(&mut self, command: &str, message: &str) {
        self.notices.lock().push(Notice::Error {
            command: command.to_string(),
            message: message.to_string(),
        });
    }

    fn on_root_load(&mut self) {
        self.notices.lock().push(Notice::RootLoaded);
    }

    fn on_root_progress(&mut self, progress: &LoadProgress) {
        self.notices.lock().push(Notice::RootProgress(progress.loaded));
    }
}

pub struct Harness {
    pub manager: ProcessManager,
    pub backend: LoopbackBackend,
    pub listener: RecordingListener,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(KernelConfig::default())
    }

    pub fn with_config(config: KernelConfig) -> Self {
        let backend = LoopbackBackend::new();
        let listener = RecordingListener::default();
        let manager = ProcessManager::builder(backend.clone(), HeadlessPresenter::new())
            .with_listener(listener.clone())
            .with_config(config)
            .build();
        Self {
            manager,
            backend,
            listener,
        }
    }

    pub fn spawn_root(&mut self, command: &str) -> Pid {
        self.manager
            .spawn(plan(command, None, &[]))
            .expect("root spawn")
    }

    pub fn spawn_child(&mut self, caller: Pid, command: &str) -> Pid {
        self.manager
            .spawn(plan(command, Some(caller), &[]))
            .expect("child spawn")
    }

    pub fn spawn_with_env(&mut self, caller: Option<Pid>, command: &str, envs: &[&str]) -> Pid {
        self.manager
            .spawn(plan(command, caller, envs))
            .expect("spawn")
    }

    pub fn handle(&self, pid: Pid) -> UnitHandle {
        self.backend.handle_of(pid).expect("launched unit")
    }

    pub fn exit(&mut self, pid: Pid, code: ExitCode) -> Option<ExitReport> {
        let handle = self.handle(pid);
        self.manager.handle_exit(handle, code).expect("consistent tables")
    }

    /// Issue a wait; the receiver resolves once the manager replies
    pub fn wait(
        &mut self,
        target: Pid,
        options: WaitOptions,
        caller: Option<Pid>,
    ) -> oneshot::Receiver<WaitResult> {
        let (reply, rx) = WaitReply::channel();
        self.manager.waitpid(target, options, caller, reply);
        rx
    }

    /// Issue a wait that must complete immediately
    pub fn wait_now(
        &mut self,
        target: Pid,
        options: WaitOptions,
        caller: Option<Pid>,
    ) -> WaitResult {
        let mut rx = self.wait(target, options, caller);
        rx.try_recv().expect("wait completed immediately")
    }
}

/// Completed result of a wait, if any
pub fn ready(rx: &mut oneshot::Receiver<WaitResult>) -> Option<WaitResult> {
    rx.try_recv().ok()
}

pub fn program(command: &str) -> ResolvedProgram {
    ResolvedProgram {
        location: ManifestLocation::Named(format!("{}.json", command)),
        kind: ProgramKind::Native,
    }
}

pub fn plan(command: &str, caller: Option<Pid>, envs: &[&str]) -> SpawnPlan {
    SpawnPlan {
        program: program(command),
        argv: vec![command.to_string()],
        envs: envs.iter().map(|e| e.to_string()).collect(),
        cwd: "/".to_string(),
        caller,
    }
}
