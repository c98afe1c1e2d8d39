/*!
 * Error Types
 * Centralized error handling with thiserror and miette
 */

use super::errno::Errno;
use super::types::{Pgid, Pid};
use miette::Diagnostic;
use thiserror::Error;

pub use crate::backend::BackendError;
pub use crate::manifest::ManifestError;

/// Table corruption detected while mutating the process/group tables
///
/// These indicate a programming defect, never a caller mistake. The operation
/// that hit one is aborted.
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
pub enum InvariantViolation {
    #[error("process group {0} already exists")]
    #[diagnostic(
        code(invariant::group_exists),
        help("Groups are founded once by their leader; a second founding means corruption.")
    )]
    GroupExists(Pgid),

    #[error("process {0} does not exist")]
    #[diagnostic(code(invariant::process_missing))]
    ProcessMissing(Pid),

    #[error("process group {0} does not exist")]
    #[diagnostic(code(invariant::group_missing))]
    GroupMissing(Pgid),

    #[error("process {pid} is not recorded in group {pgid}")]
    #[diagnostic(
        code(invariant::membership_missing),
        help("A process record points at a group that does not list it as a member.")
    )]
    MembershipMissing { pid: Pid, pgid: Pgid },
}

/// Process-control operation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProcessError {
    #[error(transparent)]
    Errno(#[from] Errno),

    #[error("invariant violation: {0}")]
    Invariant(#[from] InvariantViolation),
}

impl ProcessError {
    /// The caller-facing errno, or `None` for table corruption
    pub fn errno(&self) -> Option<Errno> {
        match self {
            ProcessError::Errno(errno) => Some(*errno),
            ProcessError::Invariant(_) => None,
        }
    }
}

/// Process operation result
pub type ProcessResult<T> = Result<T, ProcessError>;

/// Spawn failures. None of these leave a record behind.
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
pub enum SpawnError {
    #[error("{0} not in whitelist")]
    #[diagnostic(
        code(spawn::not_whitelisted),
        help("Add the executable to the configured whitelist or drop the whitelist.")
    )]
    NotWhitelisted(String),

    #[error("no executable given")]
    #[diagnostic(code(spawn::empty_argv))]
    EmptyArgv,

    #[error(transparent)]
    #[diagnostic(code(spawn::manifest))]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    #[diagnostic(code(spawn::backend))]
    Backend(#[from] BackendError),

    #[error("requesting process {0} terminated before the spawn completed")]
    #[diagnostic(code(spawn::caller_gone))]
    CallerGone(Pid),

    #[error("invariant violation: {0}")]
    #[diagnostic(code(spawn::invariant))]
    Invariant(#[from] InvariantViolation),
}

impl SpawnError {
    /// Errno carried in the spawn reply
    pub fn errno(&self) -> Errno {
        match self {
            SpawnError::CallerGone(_) => Errno::ESRCH,
            SpawnError::Invariant(_) => Errno::EINVAL,
            _ => Errno::ENOENT,
        }
    }
}

/// Unified kernel error type with miette diagnostics
#[derive(Error, Debug, Diagnostic)]
pub enum KernelError {
    #[error("Spawn error: {0}")]
    #[diagnostic(transparent)]
    Spawn(#[from] SpawnError),

    #[error("Invariant violation: {0}")]
    #[diagnostic(transparent)]
    Invariant(#[from] InvariantViolation),

    #[error("No foreground process running")]
    #[diagnostic(
        code(kernel::no_foreground),
        help("Input and interrupts are only delivered while a process is in the foreground.")
    )]
    NoForeground,

    #[error("Kernel event loop has shut down")]
    #[diagnostic(code(kernel::closed))]
    Closed,

    #[error("Request dropped: {0}")]
    #[diagnostic(
        code(kernel::dropped),
        help("The request hit table corruption; see the error log for details.")
    )]
    Dropped(String),

    #[error("Unexpected response: {0}")]
    #[diagnostic(code(kernel::protocol))]
    Protocol(String),

    #[error("Configuration error: {0}")]
    #[diagnostic(code(kernel::config))]
    Config(String),

    #[error("I/O error: {0}")]
    #[diagnostic(code(kernel::io))]
    Io(#[from] std::io::Error),
}

/// Common result type for kernel operations
pub type KernelResult<T> = Result<T, KernelError>;
