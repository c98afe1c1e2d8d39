/*!
 * IPC Module
 * Pipes handed out to execution units
 */

pub mod pipe;

// Re-export for convenience
pub use pipe::{LocalPipeServer, PipeEnds, PipeError, PipeServer};
