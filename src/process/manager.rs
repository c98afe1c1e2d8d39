/*!
 * Process Management
 *
 * The process manager is the single owned context behind job control: the
 * process, group and wait tables, the foreground router and the execution
 * backend all live here and are only touched through `&mut self`. Every
 * operation runs to completion before the next one starts, so a spawn, an
 * exit and a wait never observe each other half-done.
 */

use super::allocator::PidAllocator;
use super::foreground::ForegroundRouter;
use super::group::GroupTable;
use super::listener::HostListener;
use super::manager_builder::ProcessManagerBuilder;
use super::table::ProcessTable;
use super::types::{
    ExitReport, GroupSnapshot, ProcessRecord, ProcessSnapshot, SpawnPlan, WaitOptions, WaitResult,
    WaitStatus,
};
use super::unit::ExecutionUnit;
use super::wait::{WaitKey, WaitQueue, WaitReply, WaitRequest};
use crate::backend::{
    BackendError, Environment, ExecutionBackend, LaunchSpec, LoadProgress, Presentation, Presenter,
    UnitMessage,
};
use crate::core::config::KernelConfig;
use crate::core::errno::{Errno, ErrnoResult};
use crate::core::errors::{
    InvariantViolation, KernelError, KernelResult, ProcessResult, SpawnError,
};
use crate::core::limits::{EXIT_CODE_KILL, EXIT_CODE_NO_EXEC, INIT_PID};
use crate::core::types::{ExitCode, Pgid, Pid, Sid, TtySize, UnitHandle};
use ahash::RandomState;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of checking a wait against the tables
enum WaitPoll {
    Ready(WaitStatus),
    Pending(WaitKey),
}

pub struct ProcessManager {
    processes: ProcessTable,
    groups: GroupTable,
    waits: WaitQueue,
    allocator: PidAllocator,
    foreground: ForegroundRouter,
    /// Units that have not terminated, by backend handle
    live_units: HashMap<UnitHandle, Arc<ExecutionUnit>, RandomState>,
    backend: Box<dyn ExecutionBackend>,
    presenter: Box<dyn Presenter>,
    listener: Box<dyn HostListener>,
    tty: TtySize,
    config: KernelConfig,
}

impl ProcessManager {
    /// Start building a manager around an execution backend and a presenter
    pub fn builder<B, P>(backend: B, presenter: P) -> ProcessManagerBuilder
    where
        B: ExecutionBackend + 'static,
        P: Presenter + 'static,
    {
        ProcessManagerBuilder::new(backend, presenter)
    }

    pub(super) fn assemble(
        backend: Box<dyn ExecutionBackend>,
        presenter: Box<dyn Presenter>,
        listener: Box<dyn HostListener>,
        config: KernelConfig,
    ) -> Self {
        Self {
            processes: ProcessTable::new(),
            groups: GroupTable::new(),
            waits: WaitQueue::new(),
            allocator: PidAllocator::new(),
            foreground: ForegroundRouter::new(),
            live_units: HashMap::default(),
            backend,
            presenter,
            listener,
            tty: config.tty,
            config,
        }
    }

    // =========================================================================
    // Spawn
    // =========================================================================

    /// Commit a resolved spawn: allocate a pid, launch the unit and record it
    ///
    /// With a caller the child joins the caller's group; without one it
    /// founds a new group and session. Any error leaves the tables untouched.
    pub fn spawn(&mut self, plan: SpawnPlan) -> Result<Pid, SpawnError> {
        let SpawnPlan {
            program,
            argv,
            envs,
            cwd,
            caller,
        } = plan;

        let command = argv.first().cloned().ok_or(SpawnError::EmptyArgv)?;
        if !self.backend.supports(program.kind) {
            warn!(%command, kind = %program.kind, "Program kind not supported by backend");
            return Err(BackendError::Unsupported(program.kind).into());
        }

        let parent = match caller {
            Some(caller) => {
                let record = self
                    .processes
                    .live(caller)
                    .ok_or(SpawnError::CallerGone(caller))?;
                if !self.groups.contains(record.pgid) {
                    return Err(InvariantViolation::GroupMissing(record.pgid).into());
                }
                Some((record.pid, record.pgid, Arc::clone(&record.unit)))
            }
            None => {
                let pid = self.allocator.peek();
                if self.groups.contains(pid) {
                    return Err(InvariantViolation::GroupExists(pid).into());
                }
                None
            }
        };

        let pid = self.allocator.allocate();
        let (ppid, pgid) = parent
            .as_ref()
            .map_or((INIT_PID, pid), |(ppid, pgid, _)| (*ppid, *pgid));

        let env = Environment::parse(&envs);
        let presentation =
            Presentation::from_env(&env, &command, &self.config.popup, &self.config.embed);
        let spec = LaunchSpec::build(
            pid,
            ppid,
            &argv,
            &cwd,
            &env,
            program,
            self.tty,
            presentation.clone(),
        );

        let handle = self.backend.launch(&spec).map_err(|e| {
            warn!(pid, %command, error = %e, "Launch failed");
            e
        })?;

        let joined = match parent {
            None => self.groups.create(pid, pid),
            Some(_) => self.groups.add_member(pgid, pid),
        };
        if let Err(violation) = joined {
            self.backend.terminate(handle);
            return Err(violation.into());
        }

        let unit = Arc::new(ExecutionUnit::new(
            handle,
            pid,
            parent.map(|(_, _, unit)| unit),
            command,
            env,
            presentation,
        ));
        self.processes.insert(ProcessRecord {
            pid,
            ppid,
            pgid,
            exit_code: None,
            unit: Arc::clone(&unit),
        });
        self.live_units.insert(handle, Arc::clone(&unit));
        self.presenter.attach(handle, unit.presentation());

        info!(pid, ppid, pgid, %handle, command = %unit.command(), "Spawned process");
        self.foreground.set(unit);
        Ok(pid)
    }

    // =========================================================================
    // Exit
    // =========================================================================

    /// Record the termination of a unit
    ///
    /// Waiters keyed on the exact pid, on "any child" and on the process's
    /// group are satisfied in that order, but only those issued by the
    /// parent. A process nobody was waiting for stays in the table with its
    /// exit code until a later wait reaps it. Exits of unknown or already
    /// terminated units are ignored.
    pub fn handle_exit(
        &mut self,
        handle: UnitHandle,
        code: ExitCode,
    ) -> Result<Option<ExitReport>, InvariantViolation> {
        let Some(unit) = self.live_units.get(&handle).cloned() else {
            debug!(%handle, code, "Ignoring exit of unknown or terminated unit");
            return Ok(None);
        };
        let pid = unit.pid();
        let (ppid, pgid) = self
            .processes
            .get(pid)
            .map(|record| (record.ppid, record.pgid))
            .ok_or(InvariantViolation::ProcessMissing(pid))?;

        self.groups.remove_member(pid, pgid)?;
        self.live_units.remove(&handle);

        let replies = self.waits.take_matching(&WaitKey::for_exit(pid, pgid), ppid);
        let reaped = replies.len();
        if reaped > 0 {
            self.processes.remove(pid);
        } else if let Some(record) = self.processes.get_mut(pid) {
            record.exit_code = Some(code);
        }
        let status = WaitStatus { pid, status: code };
        for reply in replies {
            self.deliver(reply, Ok(status));
        }

        let orphans = self.processes.reparent_children(pid, INIT_PID);
        let discarded = self.waits.discard_issued_by(pid);

        unit.mark_terminated();
        self.presenter.detach(handle, unit.presentation());
        self.backend.terminate(handle);
        let foreground = self.foreground.on_exit(&unit);

        info!(pid, code, reaped, orphans, discarded, "Process exited");
        Ok(Some(ExitReport {
            pid,
            status: code,
            reaped,
            foreground,
        }))
    }

    // =========================================================================
    // Wait
    // =========================================================================

    /// `waitpid(target, options)` on behalf of `caller` (init when absent)
    ///
    /// The reply is invoked exactly once: immediately when the result is
    /// known, or later from [`handle_exit`](Self::handle_exit).
    pub fn waitpid(
        &mut self,
        target: Pid,
        options: WaitOptions,
        caller: Option<Pid>,
        reply: WaitReply,
    ) {
        let caller = caller.unwrap_or(INIT_PID);
        match self.poll_wait(target, caller) {
            Err(errno) => {
                debug!(wait_target = target, caller, %errno, "waitpid failed");
                self.deliver(reply, Err(errno));
            }
            Ok(WaitPoll::Ready(status)) => {
                debug!(pid = status.pid, status = status.status, caller, "Reaped process");
                self.deliver(reply, Ok(status));
            }
            Ok(WaitPoll::Pending(_)) if options.contains(WaitOptions::WNOHANG) => {
                self.deliver(reply, Ok(WaitStatus::NOT_READY));
            }
            Ok(WaitPoll::Pending(key)) => {
                debug!(?key, caller, "Queued wait");
                self.waits.enqueue(
                    key,
                    WaitRequest {
                        issuer: caller,
                        options,
                        reply,
                    },
                );
            }
        }
    }

    fn poll_wait(&mut self, target: Pid, caller: Pid) -> ErrnoResult<WaitPoll> {
        if target > 0 {
            let record = self
                .processes
                .get(target)
                .filter(|record| record.ppid == caller)
                .ok_or(Errno::ECHILD)?;
            if !record.has_exited() {
                return Ok(WaitPoll::Pending(WaitKey::Pid(target)));
            }
            return self.reap(target).map(WaitPoll::Ready).ok_or(Errno::ECHILD);
        }

        let target = if target == 0 {
            if caller == INIT_PID {
                return Err(Errno::ECHILD);
            }
            let record = self.processes.live(caller).ok_or(Errno::ECHILD)?;
            -record.pgid
        } else {
            target
        };

        let key = WaitKey::from_target(target);
        let group = match key {
            WaitKey::Group(pgid) => Some(pgid),
            _ => None,
        };
        match self.processes.find_exited_child(caller, group) {
            Some(child) => self.reap(child).map(WaitPoll::Ready).ok_or(Errno::ECHILD),
            None => Ok(WaitPoll::Pending(key)),
        }
    }

    fn reap(&mut self, pid: Pid) -> Option<WaitStatus> {
        let record = self.processes.remove(pid)?;
        Some(WaitStatus {
            pid,
            status: record.exit_code.unwrap_or_default(),
        })
    }

    fn deliver(&mut self, reply: WaitReply, result: WaitResult) {
        match reply {
            WaitReply::Unit { handle, id } => {
                let status = WaitStatus::encode(&result);
                self.post_reply(handle, id, json!({ "pid": status.pid, "status": status.status }));
            }
            WaitReply::Callback(reply) => reply(result),
        }
    }

    // =========================================================================
    // Groups and sessions
    // =========================================================================

    pub fn getpgid(&self, pid: Option<Pid>, caller: Option<Pid>) -> ErrnoResult<Pgid> {
        let pid = target_or_caller(pid, caller);
        if pid < 0 {
            return Err(Errno::EINVAL);
        }
        self.processes
            .live(pid)
            .map(|record| record.pgid)
            .ok_or(Errno::ESRCH)
    }

    /// Move `pid` (the caller when absent) into group `pgid` (`pid` when absent)
    pub fn setpgid(
        &mut self,
        pid: Option<Pid>,
        pgid: Option<Pgid>,
        caller: Option<Pid>,
    ) -> ProcessResult<i32> {
        let caller = caller.unwrap_or(INIT_PID);
        let pid = pid.filter(|pid| *pid != 0).unwrap_or(caller);
        let new_pgid = pgid.filter(|pgid| *pgid != 0).unwrap_or(pid);

        if new_pgid < 0 {
            return Err(Errno::EINVAL.into());
        }
        let record = self
            .processes
            .live(pid)
            .filter(|record| caller == pid || caller == record.ppid)
            .ok_or(Errno::ESRCH)?;
        let old_pgid = record.pgid;
        let sid = self.groups.sid_of(old_pgid)?;

        if let Some(destination) = self.groups.get(new_pgid) {
            if destination.sid != sid {
                return Err(Errno::EPERM.into());
            }
        }
        let caller_pgid = self
            .processes
            .live(caller)
            .map(|record| record.pgid)
            .ok_or(Errno::EPERM)?;
        if self.groups.sid_of(caller_pgid)? != sid {
            return Err(Errno::EPERM.into());
        }
        if sid == pid {
            return Err(Errno::EPERM.into());
        }
        if new_pgid == old_pgid {
            return Ok(0);
        }
        let create = !self.groups.contains(new_pgid);
        if create && new_pgid != pid {
            return Err(Errno::EPERM.into());
        }

        self.groups.remove_member(pid, old_pgid)?;
        if create {
            self.groups.create(new_pgid, sid)?;
        } else {
            self.groups.add_member(new_pgid, pid)?;
        }
        if let Some(record) = self.processes.get_mut(pid) {
            record.pgid = new_pgid;
        }
        debug!(pid, old_pgid, new_pgid, sid, "Moved process between groups");
        Ok(0)
    }

    pub fn getsid(&self, pid: Option<Pid>, caller: Option<Pid>) -> ProcessResult<Sid> {
        let pid = target_or_caller(pid, caller);
        let record = self.processes.live(pid).ok_or(Errno::ESRCH)?;
        Ok(self.groups.sid_of(record.pgid)?)
    }

    /// Make the caller leader of a new group and session
    pub fn setsid(&mut self, caller: Option<Pid>) -> ProcessResult<Sid> {
        let pid = caller.unwrap_or(INIT_PID);
        if self.groups.contains(pid) {
            return Err(Errno::EPERM.into());
        }
        let old_pgid = self
            .processes
            .live(pid)
            .map(|record| record.pgid)
            .ok_or(Errno::ESRCH)?;

        self.groups.remove_member(pid, old_pgid)?;
        self.groups.create(pid, pid)?;
        if let Some(record) = self.processes.get_mut(pid) {
            record.pgid = pid;
        }
        info!(pid, old_pgid, "Created session");
        Ok(pid)
    }

    // =========================================================================
    // Foreground
    // =========================================================================

    /// Deliver an interrupt to the foreground process
    ///
    /// Kills it with [`EXIT_CODE_KILL`] when it is not a root unit and opted
    /// in through its environment. Returns whether it was killed.
    pub fn interrupt(&mut self) -> KernelResult<bool> {
        let unit = self
            .foreground
            .current()
            .cloned()
            .ok_or(KernelError::NoForeground)?;
        if unit.is_root() || !unit.abort_enabled() {
            debug!(pid = unit.pid(), "Interrupt not handled");
            return Ok(false);
        }
        self.handle_exit(unit.handle(), EXIT_CODE_KILL)?;
        Ok(true)
    }

    /// Send standard input to the foreground process
    pub fn send_stdin(&mut self, text: impl Into<String>) -> KernelResult<()> {
        let handle = self
            .foreground
            .current()
            .map(|unit| unit.handle())
            .ok_or(KernelError::NoForeground)?;
        self.backend.post(handle, UnitMessage::Stdin { text: text.into() });
        Ok(())
    }

    /// Remember the terminal size and tell the foreground process
    pub fn resize(&mut self, size: TtySize) {
        self.tty = size;
        if let Some(handle) = self.foreground.current().map(|unit| unit.handle()) {
            self.backend.post(handle, UnitMessage::Resize { size });
        }
    }

    // =========================================================================
    // Backend notifications
    // =========================================================================

    /// Post a reply to a live unit; replies to terminated units are dropped
    pub fn post_reply(&mut self, handle: UnitHandle, id: String, body: Value) {
        if !self.live_units.contains_key(&handle) {
            debug!(%handle, %id, "Dropping reply to terminated unit");
            return;
        }
        self.backend.post(handle, UnitMessage::Reply { id, body });
    }

    /// Report a failure to the host listener
    pub fn report_error(&mut self, command: &str, message: &str) {
        self.listener.on_error(command, message);
    }

    pub fn forward_stdout(&mut self, handle: UnitHandle, text: &str) {
        if self.live_units.contains_key(&handle) {
            self.listener.on_stdout(text);
        }
    }

    /// Report the load failure, then exit the unit as not executable
    pub fn handle_load_error(
        &mut self,
        handle: UnitHandle,
        message: &str,
    ) -> Result<Option<ExitReport>, InvariantViolation> {
        let Some(unit) = self.live_units.get(&handle).cloned() else {
            return Ok(None);
        };
        warn!(pid = unit.pid(), command = %unit.command(), message, "Unit failed to load");
        self.listener.on_error(unit.command(), message);
        self.handle_exit(handle, EXIT_CODE_NO_EXEC)
    }

    pub fn handle_loaded(&mut self, handle: UnitHandle) {
        if self.live_units.get(&handle).is_some_and(|unit| unit.is_root()) {
            self.listener.on_root_load();
        }
    }

    pub fn handle_progress(&mut self, handle: UnitHandle, progress: &LoadProgress) {
        if self.live_units.get(&handle).is_some_and(|unit| unit.is_root()) {
            self.listener.on_root_progress(progress);
        }
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    /// Live unit behind a backend handle
    pub fn unit(&self, handle: UnitHandle) -> Option<&Arc<ExecutionUnit>> {
        self.live_units.get(&handle)
    }

    pub fn process(&self, pid: Pid) -> Option<ProcessSnapshot> {
        self.processes.get(pid).map(ProcessRecord::snapshot)
    }

    pub fn processes(&self) -> Vec<ProcessSnapshot> {
        self.processes.snapshot()
    }

    pub fn groups(&self) -> Vec<GroupSnapshot> {
        self.groups.snapshot()
    }

    pub fn foreground(&self) -> Option<Pid> {
        self.foreground.pid()
    }

    pub fn pending_waits(&self) -> usize {
        self.waits.len()
    }

    pub fn tty(&self) -> TtySize {
        self.tty
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }
}

/// A zero or missing pid means the caller; a missing caller means init
fn target_or_caller(pid: Option<Pid>, caller: Option<Pid>) -> Pid {
    pid.filter(|pid| *pid != 0)
        .unwrap_or_else(|| caller.unwrap_or(INIT_PID))
}
