/*!
 * API Module
 * Request surface, unit wire protocol, the kernel event loop and its
 * JSON lines driver
 */

pub mod driver;
pub mod kernel;
pub mod protocol;
pub mod request;

// Re-export for convenience
pub use driver::serve;
pub use kernel::{HostEvent, HostEvents, Kernel, KernelHandle, PendingResponse};
pub use protocol::{decode, RequestId, UnitCommand, UnitInbound};
pub use request::{HostRequest, Request, Response};
