/*!
 * Requests and Responses
 *
 * The closed set of operations the kernel serves. Units issue a subset of
 * them (see [`UnitCommand`](super::protocol::UnitCommand)); the host can issue
 * all of them. Every request is dispatched through one exhaustive match in
 * the event loop.
 */

use crate::core::types::{ExitCode, Pgid, Pid, Sid};
use crate::process::{GroupSnapshot, ProcessSnapshot};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kernel request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    /// Start a program. `argv[0]` names it unless `manifest` is given inline.
    Spawn {
        argv: Vec<String>,
        #[serde(default)]
        envs: Vec<String>,
        #[serde(default = "default_cwd")]
        cwd: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        manifest: Option<Value>,
    },
    /// `waitpid(pid, options)`
    Wait {
        pid: Pid,
        #[serde(default)]
        options: u32,
    },
    GetPgid {
        #[serde(default)]
        pid: Option<Pid>,
    },
    SetPgid {
        #[serde(default)]
        pid: Option<Pid>,
        #[serde(default)]
        pgid: Option<Pgid>,
    },
    GetSid {
        #[serde(default)]
        pid: Option<Pid>,
    },
    SetSid,
    Pipe,
    /// Ctrl-C for the foreground process
    Interrupt,
    /// Standard input for the foreground process
    Stdin { text: String },
    /// Terminal resize
    Resize { cols: u16, rows: u16 },
    /// Process and group tables, for diagnostics
    Snapshot,
}

fn default_cwd() -> String {
    "/".to_string()
}

impl Request {
    /// Operation name, used for tracing
    pub fn op(&self) -> &'static str {
        match self {
            Request::Spawn { .. } => "spawn",
            Request::Wait { .. } => "wait",
            Request::GetPgid { .. } => "getpgid",
            Request::SetPgid { .. } => "setpgid",
            Request::GetSid { .. } => "getsid",
            Request::SetSid => "setsid",
            Request::Pipe => "pipe",
            Request::Interrupt => "interrupt",
            Request::Stdin { .. } => "stdin",
            Request::Resize { .. } => "resize",
            Request::Snapshot => "snapshot",
        }
    }
}

/// A request from the host, optionally issued on behalf of a process
///
/// Without a caller, spawns start a new root and everything else acts as
/// init.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caller: Option<Pid>,
    #[serde(flatten)]
    pub request: Request,
}

/// Reply bodies. Failures of process operations travel in-band as negative
/// errno values, the way units expect them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Response {
    Wait { pid: Pid, status: ExitCode },
    Spawn { pid: Pid },
    Pgid { pgid: Pgid },
    Result { result: i32 },
    Sid { sid: Sid },
    Pipe { read: i32, write: i32 },
    Interrupt { handled: bool },
    Snapshot {
        processes: Vec<ProcessSnapshot>,
        groups: Vec<GroupSnapshot>,
    },
    Ack { ok: bool },
}
