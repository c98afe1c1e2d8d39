/*!
 * Execution Backend
 *
 * Interfaces to the collaborator that actually loads and runs units of native
 * code. The kernel only holds [`UnitHandle`]s; everything behind them belongs
 * to the backend.
 *
 * Outbound calls go through [`ExecutionBackend`]. Inbound traffic (messages
 * posted by a unit, load progress, crashes, aborts) arrives as
 * [`BackendEvent`]s on the kernel's event loop.
 */

pub mod launch;
pub mod loopback;
pub mod presentation;

use crate::core::types::{ExitCode, TtySize, UnitHandle};
use crate::manifest::ProgramKind;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

pub use launch::{Environment, LaunchSpec};
pub use loopback::LoopbackBackend;
pub use presentation::{HeadlessPresenter, Presentation, Presenter};

/// Execution backend errors
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackendError {
    #[error("backend does not support {0} programs or they are disabled")]
    Unsupported(ProgramKind),

    #[error("launch failed: {0}")]
    LaunchFailed(String),
}

/// Messages the kernel posts to a running unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum UnitMessage {
    /// Reply to a request the unit issued, keyed by the request id
    Reply { id: String, body: Value },
    /// Standard input from the user
    Stdin { text: String },
    /// Terminal resize
    Resize { size: TtySize },
}

impl UnitMessage {
    /// Encode the message the way units expect it on the wire
    pub fn to_wire(&self, tty_prefix: &str, resize_key: &str) -> Value {
        match self {
            UnitMessage::Reply { id, body } => {
                let mut reply = serde_json::Map::new();
                reply.insert(id.clone(), body.clone());
                Value::Object(reply)
            }
            UnitMessage::Stdin { text } => {
                let mut message = serde_json::Map::new();
                message.insert(tty_prefix.to_string(), Value::String(text.clone()));
                Value::Object(message)
            }
            UnitMessage::Resize { size } => {
                let mut message = serde_json::Map::new();
                message.insert(resize_key.to_string(), json!([size.cols, size.rows]));
                Value::Object(message)
            }
        }
    }
}

/// Load progress reported for a unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadProgress {
    pub url: String,
    pub length_computable: bool,
    pub loaded: u64,
    pub total: u64,
}

/// Events delivered by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "event")]
pub enum BackendEvent {
    /// A unit posted a message (request, stdout or termination string)
    Message { handle: UnitHandle, payload: Value },
    /// The unit crashed with the given status
    Crashed { handle: UnitHandle, status: ExitCode },
    /// Loading was aborted
    Aborted { handle: UnitHandle },
    /// Loading failed
    LoadError { handle: UnitHandle, message: String },
    /// Loading finished
    Loaded { handle: UnitHandle },
    Progress {
        handle: UnitHandle,
        progress: LoadProgress,
    },
    /// The popup window hosting the unit was closed by the user
    PopupClosed { handle: UnitHandle },
}

impl BackendEvent {
    pub fn handle(&self) -> UnitHandle {
        match self {
            BackendEvent::Message { handle, .. }
            | BackendEvent::Crashed { handle, .. }
            | BackendEvent::Aborted { handle }
            | BackendEvent::LoadError { handle, .. }
            | BackendEvent::Loaded { handle }
            | BackendEvent::Progress { handle, .. }
            | BackendEvent::PopupClosed { handle } => *handle,
        }
    }
}

/// The opaque execution-unit capability the kernel is built on
///
/// Implementations must not call back into the kernel synchronously; anything
/// a unit reports is delivered later as a [`BackendEvent`].
pub trait ExecutionBackend: Send {
    /// Whether units of this program kind can be launched at all
    fn supports(&self, kind: ProgramKind) -> bool {
        let _ = kind;
        true
    }

    /// Create and start a unit
    fn launch(&mut self, spec: &LaunchSpec) -> Result<UnitHandle, BackendError>;

    /// Deliver a message to a unit
    fn post(&mut self, handle: UnitHandle, message: UnitMessage);

    /// Tear a unit down. Called once per unit, after its exit was recorded.
    fn terminate(&mut self, handle: UnitHandle);
}

impl<B: ExecutionBackend + ?Sized> ExecutionBackend for Box<B> {
    fn supports(&self, kind: ProgramKind) -> bool {
        (**self).supports(kind)
    }

    fn launch(&mut self, spec: &LaunchSpec) -> Result<UnitHandle, BackendError> {
        (**self).launch(spec)
    }

    fn post(&mut self, handle: UnitHandle, message: UnitMessage) {
        (**self).post(handle, message)
    }

    fn terminate(&mut self, handle: UnitHandle) {
        (**self).terminate(handle)
    }
}
