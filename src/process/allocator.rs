/*!
 * PID Allocator
 * Monotonic process identifiers; values are never handed out twice
 */

use crate::core::limits::FIRST_PID;
use crate::core::types::Pid;

#[derive(Debug)]
pub struct PidAllocator {
    next: Pid,
}

impl PidAllocator {
    pub fn new() -> Self {
        Self { next: FIRST_PID }
    }

    /// Issue the next pid
    pub fn allocate(&mut self) -> Pid {
        let pid = self.next;
        self.next += 1;
        pid
    }

    /// The pid the next allocation will return
    #[inline]
    pub fn peek(&self) -> Pid {
        self.next
    }
}

impl Default for PidAllocator {
    fn default() -> Self {
        Self::new()
    }
}
