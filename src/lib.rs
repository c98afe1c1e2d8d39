/*!
 * Job Control Kernel Library
 * POSIX-style process groups, sessions and waitpid over async execution units
 */

pub mod api;
pub mod backend;
pub mod core;
pub mod ipc;
pub mod manifest;
pub mod monitoring;
pub mod process;

// Re-exports
pub use api::{HostEvent, HostEvents, HostRequest, Kernel, KernelHandle, Request, Response};
pub use backend::{
    BackendEvent, ExecutionBackend, HeadlessPresenter, LoopbackBackend, Presenter, UnitMessage,
};
pub use crate::core::errors::*;
pub use crate::core::{Errno, ErrnoResult, KernelConfig};
pub use ipc::{LocalPipeServer, PipeEnds, PipeServer};
pub use manifest::{FsManifestSource, ManifestResolver, ManifestSource, StaticManifestSource};
pub use monitoring::init_tracing;
pub use process::{
    ProcessManager, ProcessManagerBuilder, SpawnPlan, WaitOptions, WaitResult, WaitStatus,
};
