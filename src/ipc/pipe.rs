/*!
 * Pipe Server
 *
 * Pipes are owned by an external collaborator; the kernel only asks for a
 * new pair of endpoint ids and forwards them to the requesting unit. A failed
 * request is reported as `{read: -1, write: -1}`.
 */

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Pipe error types
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipeError {
    #[error("Pipe server unavailable: {0}")]
    Unavailable(String),

    #[error("Pipe ids exhausted")]
    Exhausted,
}

/// Endpoint ids of a new pipe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipeEnds {
    pub read: i32,
    pub write: i32,
}

impl PipeEnds {
    /// Reported when the pipe server fails
    pub const FAILED: PipeEnds = PipeEnds { read: -1, write: -1 };
}

/// Creates pipes on behalf of units
pub trait PipeServer: Send + Sync {
    fn pipe(&self) -> BoxFuture<'static, Result<PipeEnds, PipeError>>;
}

impl<S: PipeServer + ?Sized> PipeServer for Arc<S> {
    fn pipe(&self) -> BoxFuture<'static, Result<PipeEnds, PipeError>> {
        (**self).pipe()
    }
}

/// In-process pipe server handing out consecutive endpoint ids
#[derive(Debug, Clone)]
pub struct LocalPipeServer {
    next_id: Arc<AtomicI32>,
}

impl LocalPipeServer {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    pub fn starting_at(first_id: i32) -> Self {
        Self {
            next_id: Arc::new(AtomicI32::new(first_id)),
        }
    }
}

impl Default for LocalPipeServer {
    fn default() -> Self {
        Self::new()
    }
}

impl PipeServer for LocalPipeServer {
    fn pipe(&self) -> BoxFuture<'static, Result<PipeEnds, PipeError>> {
        let read = self.next_id.fetch_add(2, Ordering::Relaxed);
        let result = match read.checked_add(1) {
            Some(write) if read > 0 => {
                debug!(read, write, "Created pipe");
                Ok(PipeEnds { read, write })
            }
            _ => Err(PipeError::Exhausted),
        };
        futures::future::ready(result).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn local_server_hands_out_distinct_ends() {
        let server = LocalPipeServer::new();
        assert_eq!(server.pipe().await, Ok(PipeEnds { read: 1, write: 2 }));
        assert_eq!(server.pipe().await, Ok(PipeEnds { read: 3, write: 4 }));
    }

    #[tokio::test]
    async fn exhausted_server_fails() {
        let server = LocalPipeServer::starting_at(i32::MAX);
        assert_eq!(server.pipe().await, Err(PipeError::Exhausted));
    }
}
