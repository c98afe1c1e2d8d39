/*!
 * Core Module
 * Fundamental types, errno values, constants, configuration and errors
 */

pub mod config;
pub mod errno;
pub mod errors;
pub mod limits;
pub mod types;

// Re-export for convenience
pub use config::KernelConfig;
pub use errno::{Errno, ErrnoResult};
pub use errors::*;
pub use types::*;
