/*!
 * Errno
 * Caller-facing error codes, encoded on the wire as negative integers
 */

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for operations that fail with a caller error
pub type ErrnoResult<T> = Result<T, Errno>;

/// Constants that correspond to values in errno.h
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
#[repr(i32)]
pub enum Errno {
    /// Operation not permitted
    #[error("operation not permitted")]
    EPERM = 1,

    /// File or directory not found
    #[error("no such file or directory")]
    ENOENT = 2,

    /// Process not found
    #[error("no such process")]
    ESRCH = 3,

    /// No child processes
    #[error("no child processes")]
    ECHILD = 10,

    /// Permission denied
    #[error("permission denied")]
    EACCES = 13,

    /// Invalid argument
    #[error("invalid argument")]
    EINVAL = 22,
}

impl Errno {
    /// Positive errno value
    #[inline]
    pub const fn code(self) -> i32 {
        self as i32
    }

    /// Negative value carried in replies in place of a pid/pgid/sid
    #[inline]
    pub const fn to_wire(self) -> i32 {
        -(self as i32)
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(Errno::EPERM),
            2 => Some(Errno::ENOENT),
            3 => Some(Errno::ESRCH),
            10 => Some(Errno::ECHILD),
            13 => Some(Errno::EACCES),
            22 => Some(Errno::EINVAL),
            _ => None,
        }
    }
}
