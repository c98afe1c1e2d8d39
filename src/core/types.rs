/*!
 * Core Types
 * Identifier aliases shared across the process-control subsystem
 */

use serde::{Deserialize, Serialize};
use std::fmt;

/// Process ID type
///
/// Signed because wait targets and wire replies reuse the same integer space
/// for "any child", "any child in group" and negative errno values.
pub type Pid = i32;

/// Process group ID type (the pid of the group's founder)
pub type Pgid = i32;

/// Session ID type (the pid of the session's founder)
pub type Sid = i32;

/// Exit code reported by an execution unit
pub type ExitCode = i32;

/// Opaque identifier of an execution unit, issued by the execution backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitHandle(pub u64);

impl fmt::Display for UnitHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unit#{}", self.0)
    }
}

/// Terminal dimensions in character cells
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TtySize {
    pub cols: u16,
    pub rows: u16,
}

impl Default for TtySize {
    fn default() -> Self {
        Self { cols: 80, rows: 24 }
    }
}
