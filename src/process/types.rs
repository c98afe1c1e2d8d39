/*!
 * Process Types
 * Records, wait results and snapshots shared by the process tables
 */

use super::unit::ExecutionUnit;
use crate::core::errno::Errno;
use crate::core::limits;
use crate::core::types::{ExitCode, Pgid, Pid, Sid};
use crate::manifest::ResolvedProgram;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Process table entry
#[derive(Debug, Clone)]
pub struct ProcessRecord {
    pub pid: Pid,
    pub ppid: Pid,
    pub pgid: Pgid,
    /// Unset while running; set once the unit terminated and nobody reaped it
    pub exit_code: Option<ExitCode>,
    pub unit: Arc<ExecutionUnit>,
}

impl ProcessRecord {
    #[inline]
    pub fn has_exited(&self) -> bool {
        self.exit_code.is_some()
    }

    pub fn snapshot(&self) -> ProcessSnapshot {
        ProcessSnapshot {
            pid: self.pid,
            ppid: self.ppid,
            pgid: self.pgid,
            exit_code: self.exit_code,
            command: self.unit.command().to_string(),
        }
    }
}

/// Group table entry. The session is the `sid` shared by its groups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessGroup {
    pub sid: Sid,
    pub members: BTreeSet<Pid>,
}

bitflags! {
    /// `waitpid` options
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct WaitOptions: u32 {
        /// Return `(0, 0)` instead of queueing when no child is ready
        const WNOHANG = limits::WNOHANG;
    }
}

/// A reaped child, or `(0, 0)` when nothing was ready under `WNOHANG`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitStatus {
    pub pid: Pid,
    pub status: ExitCode,
}

impl WaitStatus {
    pub const NOT_READY: WaitStatus = WaitStatus { pid: 0, status: 0 };

    /// Wire form: errors travel as a negative pid with status 0
    pub fn encode(result: &WaitResult) -> WaitStatus {
        match result {
            Ok(status) => *status,
            Err(errno) => WaitStatus {
                pid: errno.to_wire(),
                status: 0,
            },
        }
    }
}

pub type WaitResult = Result<WaitStatus, Errno>;

/// What an exit did to the tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitReport {
    pub pid: Pid,
    pub status: ExitCode,
    /// Number of waiters satisfied; the record is deleted when non-zero
    pub reaped: usize,
    /// Foreground process after the exit
    pub foreground: Option<Pid>,
}

/// A resolved spawn request, ready to be committed to the tables
#[derive(Debug, Clone)]
pub struct SpawnPlan {
    pub program: ResolvedProgram,
    pub argv: Vec<String>,
    pub envs: Vec<String>,
    pub cwd: String,
    /// Requesting process; `None` starts a new root with its own session
    pub caller: Option<Pid>,
}

/// Read-only view of a process record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessSnapshot {
    pub pid: Pid,
    pub ppid: Pid,
    pub pgid: Pgid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<ExitCode>,
    pub command: String,
}

/// Read-only view of a process group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSnapshot {
    pub pgid: Pgid,
    pub sid: Sid,
    pub members: Vec<Pid>,
}
