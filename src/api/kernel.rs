/*!
 * Kernel Event Loop
 *
 * Owns the process manager and serializes everything that touches it: host
 * requests, backend events and the completions of asynchronous work
 * (manifest fetches, pipe creation). Asynchronous work runs on spawned tasks
 * and re-enters the loop as a message, so table mutations never interleave.
 */

use super::protocol::{self, RequestId, UnitInbound};
use super::request::Request;
use super::request::Response;
use crate::backend::{BackendEvent, LoadProgress};
use crate::core::errors::{
    InvariantViolation, KernelError, KernelResult, ProcessError, ProcessResult, SpawnError,
};
use crate::core::limits::EXIT_CODE_KILL;
use crate::core::types::{ExitCode, Pid, TtySize, UnitHandle};
use crate::ipc::{PipeEnds, PipeServer};
use crate::manifest::{ManifestResolver, ResolvedProgram};
use crate::monitoring::{record_outcome, span_request};
use crate::process::{
    GroupSnapshot, HostListener, ProcessManager, ProcessSnapshot, SpawnPlan, WaitOptions,
    WaitReply, WaitStatus,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Notifications for the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HostEvent {
    Stdout { text: String },
    Error { command: String, message: String },
    RootLoaded,
    RootProgress { progress: LoadProgress },
}

/// Stream of host notifications
pub type HostEvents = mpsc::UnboundedReceiver<HostEvent>;

/// Forwards listener callbacks into the host event stream
struct ChannelListener {
    tx: mpsc::UnboundedSender<HostEvent>,
}

impl ChannelListener {
    fn emit(&self, event: HostEvent) {
        if self.tx.send(event).is_err() {
            debug!("Host event stream closed");
        }
    }
}

impl HostListener for ChannelListener {
    fn on_stdout(&mut self, text: &str) {
        self.emit(HostEvent::Stdout {
            text: text.to_string(),
        });
    }

    fn on_error(&mut self, command: &str, message: &str) {
        self.emit(HostEvent::Error {
            command: command.to_string(),
            message: message.to_string(),
        });
    }

    fn on_root_load(&mut self) {
        self.emit(HostEvent::RootLoaded);
    }

    fn on_root_progress(&mut self, progress: &LoadProgress) {
        self.emit(HostEvent::RootProgress {
            progress: progress.clone(),
        });
    }
}

type HostReply = oneshot::Sender<KernelResult<Response>>;

/// Where a response goes
enum ReplyTo {
    /// Posted to the requesting unit as `{"<id>": body}`
    Unit { handle: UnitHandle, id: RequestId },
    Host(HostReply),
}

/// Spawn arguments held while the manifest is being resolved
struct PendingSpawn {
    argv: Vec<String>,
    envs: Vec<String>,
    cwd: String,
    caller: Option<Pid>,
}

enum Message {
    Host {
        caller: Option<Pid>,
        request: Request,
        reply: HostReply,
    },
    Backend(BackendEvent),
    SpawnResolved {
        spawn: PendingSpawn,
        result: Result<ResolvedProgram, SpawnError>,
        reply: ReplyTo,
    },
    PipeOpened {
        ends: PipeEnds,
        reply: ReplyTo,
    },
}

/// The single writer over a [`ProcessManager`]
pub struct Kernel {
    manager: ProcessManager,
    resolver: ManifestResolver,
    pipes: Arc<dyn PipeServer>,
    rx: mpsc::UnboundedReceiver<Message>,
    /// Re-entry for completed async work; weak so handles decide the lifetime
    loopback: mpsc::WeakUnboundedSender<Message>,
}

impl Kernel {
    /// Wire a kernel around a manager
    ///
    /// Attach [`Kernel::listener`] to the manager to receive [`HostEvent`]s.
    pub fn new(
        manager: ProcessManager,
        resolver: ManifestResolver,
        pipes: Arc<dyn PipeServer>,
    ) -> (Self, KernelHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let kernel = Self {
            manager,
            resolver,
            pipes,
            rx,
            loopback: tx.downgrade(),
        };
        (kernel, KernelHandle { tx })
    }

    /// A listener that turns manager notifications into [`HostEvent`]s
    pub fn listener() -> (impl HostListener, HostEvents) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ChannelListener { tx }, rx)
    }

    /// Run the loop on the current runtime until every handle is dropped
    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(mut self) {
        info!("Kernel event loop started");
        while let Some(message) = self.rx.recv().await {
            self.handle(message);
        }
        info!("Kernel event loop stopped");
    }

    fn handle(&mut self, message: Message) {
        match message {
            Message::Host {
                caller,
                request,
                reply,
            } => self.dispatch(caller, request, ReplyTo::Host(reply)),
            Message::Backend(event) => self.on_backend_event(event),
            Message::SpawnResolved {
                spawn,
                result,
                reply,
            } => self.finish_spawn(spawn, result, reply),
            Message::PipeOpened { ends, reply } => self.respond(
                reply,
                Response::Pipe {
                    read: ends.read,
                    write: ends.write,
                },
            ),
        }
    }

    // =========================================================================
    // Requests
    // =========================================================================

    fn dispatch(&mut self, caller: Option<Pid>, request: Request, reply: ReplyTo) {
        let span = span_request(request.op(), caller);
        let _entered = span.enter();

        match request {
            Request::Spawn {
                argv,
                envs,
                cwd,
                manifest,
            } => {
                let spawn = PendingSpawn {
                    argv,
                    envs,
                    cwd,
                    caller,
                };
                self.begin_spawn(spawn, manifest, reply);
            }
            Request::Wait { pid, options } => {
                let options = WaitOptions::from_bits_truncate(options);
                let reply = match reply {
                    ReplyTo::Unit { handle, id } => WaitReply::Unit {
                        handle,
                        id: id.key(),
                    },
                    ReplyTo::Host(tx) => WaitReply::callback(move |result| {
                        let status = WaitStatus::encode(&result);
                        let _ = tx.send(Ok(Response::Wait {
                            pid: status.pid,
                            status: status.status,
                        }));
                    }),
                };
                self.manager.waitpid(pid, options, caller, reply);
            }
            Request::GetPgid { pid } => {
                let result = self.manager.getpgid(pid, caller).map_err(ProcessError::Errno);
                self.respond_with(reply, result, |pgid| Response::Pgid { pgid });
            }
            Request::SetPgid { pid, pgid } => {
                let result = self.manager.setpgid(pid, pgid, caller);
                self.respond_with(reply, result, |result| Response::Result { result });
            }
            Request::GetSid { pid } => {
                let result = self.manager.getsid(pid, caller);
                self.respond_with(reply, result, |sid| Response::Sid { sid });
            }
            Request::SetSid => {
                let result = self.manager.setsid(caller);
                self.respond_with(reply, result, |sid| Response::Sid { sid });
            }
            Request::Pipe => self.begin_pipe(reply),
            Request::Interrupt => match self.manager.interrupt() {
                Ok(handled) => self.respond(reply, Response::Interrupt { handled }),
                Err(e) => self.fail(reply, e),
            },
            Request::Stdin { text } => match self.manager.send_stdin(text) {
                Ok(()) => self.respond(reply, Response::Ack { ok: true }),
                Err(e) => self.fail(reply, e),
            },
            Request::Resize { cols, rows } => {
                self.manager.resize(TtySize { cols, rows });
                self.respond(reply, Response::Ack { ok: true });
            }
            Request::Snapshot => {
                let response = Response::Snapshot {
                    processes: self.manager.processes(),
                    groups: self.manager.groups(),
                };
                self.respond(reply, response);
            }
        }
    }

    fn begin_spawn(&mut self, spawn: PendingSpawn, manifest: Option<Value>, reply: ReplyTo) {
        let Some(executable) = spawn.argv.first().cloned() else {
            self.finish_spawn(spawn, Err(SpawnError::EmptyArgv), reply);
            return;
        };
        if let Err(e) = self
            .resolver
            .precheck(Some(&executable), manifest.is_some())
        {
            self.finish_spawn(spawn, Err(e), reply);
            return;
        }

        if let Some(inline) = manifest {
            let result = self.resolver.resolve_inline(&executable, inline);
            self.finish_spawn(spawn, result, reply);
            return;
        }

        let Some(tx) = self.loopback.upgrade() else {
            return;
        };
        let resolver = self.resolver.clone();
        tokio::spawn(async move {
            let result = resolver.resolve_named(&executable).await;
            let message = Message::SpawnResolved {
                spawn,
                result,
                reply,
            };
            if tx.send(message).is_err() {
                debug!(%executable, "Kernel stopped before spawn resolved");
            }
        });
    }

    fn finish_spawn(
        &mut self,
        spawn: PendingSpawn,
        result: Result<ResolvedProgram, SpawnError>,
        reply: ReplyTo,
    ) {
        let command = spawn.argv.first().cloned().unwrap_or_default();
        let result = result.and_then(|program| {
            self.manager.spawn(SpawnPlan {
                program,
                argv: spawn.argv,
                envs: spawn.envs,
                cwd: spawn.cwd,
                caller: spawn.caller,
            })
        });

        match result {
            Ok(pid) => self.respond(reply, Response::Spawn { pid }),
            Err(SpawnError::Invariant(violation)) => self.drop_reply(reply, violation),
            // Abandoned spawn: answered in-band, never reported to the host
            Err(e @ SpawnError::CallerGone(_)) => {
                debug!(%command, error = %e, "Caller gone before spawn completed");
                record_outcome("errno");
                self.deliver(
                    reply,
                    Response::Spawn {
                        pid: e.errno().to_wire(),
                    },
                );
            }
            Err(e) => {
                warn!(%command, error = %e, "Spawn failed");
                self.manager.report_error(&command, &e.to_string());
                record_outcome("errno");
                self.deliver(
                    reply,
                    Response::Spawn {
                        pid: e.errno().to_wire(),
                    },
                );
            }
        }
    }

    fn begin_pipe(&mut self, reply: ReplyTo) {
        let Some(tx) = self.loopback.upgrade() else {
            return;
        };
        let pipes = Arc::clone(&self.pipes);
        tokio::spawn(async move {
            let ends = pipes.pipe().await.unwrap_or_else(|e| {
                warn!(error = %e, "Pipe creation failed");
                PipeEnds::FAILED
            });
            if tx.send(Message::PipeOpened { ends, reply }).is_err() {
                debug!("Kernel stopped before pipe opened");
            }
        });
    }

    // =========================================================================
    // Replies
    // =========================================================================

    fn respond(&mut self, reply: ReplyTo, response: Response) {
        record_outcome("success");
        self.deliver(reply, response);
    }

    fn deliver(&mut self, reply: ReplyTo, response: Response) {
        match reply {
            ReplyTo::Unit { handle, id } => match serde_json::to_value(&response) {
                Ok(body) => self.manager.post_reply(handle, id.key(), body),
                Err(e) => error!(%handle, %id, error = %e, "Failed to encode reply"),
            },
            ReplyTo::Host(tx) => {
                let _ = tx.send(Ok(response));
            }
        }
    }

    /// Caller errors travel in-band as negative errno; corruption drops the reply
    fn respond_with<T>(
        &mut self,
        reply: ReplyTo,
        result: ProcessResult<T>,
        into: impl FnOnce(i32) -> Response,
    ) where
        T: Into<i32>,
    {
        match result {
            Ok(value) => self.respond(reply, into(value.into())),
            Err(ProcessError::Errno(errno)) => {
                debug!(%errno, "Request failed");
                record_outcome("errno");
                self.deliver(reply, into(errno.to_wire()));
            }
            Err(ProcessError::Invariant(violation)) => self.drop_reply(reply, violation),
        }
    }

    fn fail(&mut self, reply: ReplyTo, error: KernelError) {
        record_outcome("error");
        match reply {
            ReplyTo::Unit { handle, id } => {
                warn!(%handle, %id, %error, "Unit request failed");
            }
            ReplyTo::Host(tx) => {
                let _ = tx.send(Err(error));
            }
        }
    }

    fn drop_reply(&mut self, reply: ReplyTo, violation: InvariantViolation) {
        record_outcome("dropped");
        error!(%violation, "Process tables corrupted; request dropped");
        if let ReplyTo::Host(tx) = reply {
            let _ = tx.send(Err(KernelError::Dropped(violation.to_string())));
        }
    }

    // =========================================================================
    // Backend events
    // =========================================================================

    fn on_backend_event(&mut self, event: BackendEvent) {
        match event {
            BackendEvent::Message { handle, payload } => self.on_unit_message(handle, payload),
            BackendEvent::Crashed { handle, status } => self.exit(handle, status),
            BackendEvent::Aborted { handle } | BackendEvent::PopupClosed { handle } => {
                self.exit(handle, EXIT_CODE_KILL)
            }
            BackendEvent::LoadError { handle, message } => {
                if let Err(violation) = self.manager.handle_load_error(handle, &message) {
                    error!(%handle, %violation, "Process tables corrupted during exit");
                }
            }
            BackendEvent::Loaded { handle } => self.manager.handle_loaded(handle),
            BackendEvent::Progress { handle, progress } => {
                self.manager.handle_progress(handle, &progress)
            }
        }
    }

    fn on_unit_message(&mut self, handle: UnitHandle, payload: Value) {
        let Some(pid) = self.manager.unit(handle).map(|unit| unit.pid()) else {
            debug!(%handle, "Ignoring message from unknown or terminated unit");
            return;
        };
        match protocol::decode(payload) {
            UnitInbound::Request { id, command } => {
                debug!(pid, %id, ?command, "Unit request");
                self.dispatch(Some(pid), command.into_request(), ReplyTo::Unit { handle, id });
            }
            UnitInbound::Stdout(text) => self.manager.forward_stdout(handle, &text),
            UnitInbound::Exited(code) => self.exit(handle, code),
            UnitInbound::Unexpected(payload) => {
                warn!(pid, %payload, "Unexpected message from unit");
            }
        }
    }

    fn exit(&mut self, handle: UnitHandle, code: ExitCode) {
        if let Err(violation) = self.manager.handle_exit(handle, code) {
            error!(%handle, %violation, "Process tables corrupted during exit");
        }
    }
}

/// A submitted request awaiting its response
pub struct PendingResponse {
    rx: oneshot::Receiver<KernelResult<Response>>,
}

impl PendingResponse {
    pub async fn response(self) -> KernelResult<Response> {
        self.rx.await.map_err(|_| KernelError::Closed)?
    }
}

/// Cloneable front door to a running [`Kernel`]
#[derive(Clone)]
pub struct KernelHandle {
    tx: mpsc::UnboundedSender<Message>,
}

impl KernelHandle {
    /// Issue a request as the host, optionally on behalf of `caller`
    pub async fn request(&self, caller: Option<Pid>, request: Request) -> KernelResult<Response> {
        self.submit(caller, request)?.response().await
    }

    /// Queue a request without waiting for its response
    ///
    /// The request is on the loop once this returns, so requests submitted in
    /// order are dispatched in order.
    pub fn submit(&self, caller: Option<Pid>, request: Request) -> KernelResult<PendingResponse> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(Message::Host {
                caller,
                request,
                reply: tx,
            })
            .map_err(|_| KernelError::Closed)?;
        Ok(PendingResponse { rx })
    }

    /// Deliver an event from the execution backend
    pub fn backend_event(&self, event: BackendEvent) -> KernelResult<()> {
        self.tx
            .send(Message::Backend(event))
            .map_err(|_| KernelError::Closed)
    }

    /// Spawn a root process; returns its pid or a negative errno
    pub async fn spawn(
        &self,
        argv: Vec<String>,
        envs: Vec<String>,
        cwd: impl Into<String>,
    ) -> KernelResult<Pid> {
        let request = Request::Spawn {
            argv,
            envs,
            cwd: cwd.into(),
            manifest: None,
        };
        match self.request(None, request).await? {
            Response::Spawn { pid } => Ok(pid),
            other => Err(unexpected(other)),
        }
    }

    /// `waitpid` as `caller` (init when `None`); resolves once the wait completes
    pub async fn waitpid(
        &self,
        pid: Pid,
        options: WaitOptions,
        caller: Option<Pid>,
    ) -> KernelResult<WaitStatus> {
        let request = Request::Wait {
            pid,
            options: options.bits(),
        };
        match self.request(caller, request).await? {
            Response::Wait { pid, status } => Ok(WaitStatus { pid, status }),
            other => Err(unexpected(other)),
        }
    }

    pub async fn interrupt(&self) -> KernelResult<bool> {
        match self.request(None, Request::Interrupt).await? {
            Response::Interrupt { handled } => Ok(handled),
            other => Err(unexpected(other)),
        }
    }

    pub async fn send_stdin(&self, text: impl Into<String>) -> KernelResult<()> {
        let request = Request::Stdin { text: text.into() };
        self.request(None, request).await.map(|_| ())
    }

    pub async fn resize(&self, cols: u16, rows: u16) -> KernelResult<()> {
        self.request(None, Request::Resize { cols, rows })
            .await
            .map(|_| ())
    }

    pub async fn snapshot(&self) -> KernelResult<(Vec<ProcessSnapshot>, Vec<GroupSnapshot>)> {
        match self.request(None, Request::Snapshot).await? {
            Response::Snapshot { processes, groups } => Ok((processes, groups)),
            other => Err(unexpected(other)),
        }
    }
}

fn unexpected(response: Response) -> KernelError {
    KernelError::Protocol(format!("{:?}", response))
}
