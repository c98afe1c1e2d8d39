/*!
 * Foreground Router
 * Tracks the single unit that receives input and interrupts
 */

use super::unit::ExecutionUnit;
use crate::core::types::Pid;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Default)]
pub struct ForegroundRouter {
    current: Option<Arc<ExecutionUnit>>,
}

impl ForegroundRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<&Arc<ExecutionUnit>> {
        self.current.as_ref()
    }

    pub fn pid(&self) -> Option<Pid> {
        self.current.as_ref().map(|unit| unit.pid())
    }

    /// Install a freshly spawned unit
    pub fn set(&mut self, unit: Arc<ExecutionUnit>) {
        debug!(pid = unit.pid(), "Foreground changed");
        self.current = Some(unit);
    }

    /// Re-route after `exited` terminated
    ///
    /// Only acts when `exited` is the foreground. The new foreground is the
    /// nearest ancestor that has not terminated, or none.
    pub fn on_exit(&mut self, exited: &ExecutionUnit) -> Option<Pid> {
        let is_current = self
            .current
            .as_ref()
            .is_some_and(|current| current.handle() == exited.handle());
        if is_current {
            let mut next = exited.parent().cloned();
            while next.as_ref().is_some_and(|unit| unit.is_terminated()) {
                next = next.and_then(|unit| unit.parent().cloned());
            }
            debug!(
                exited = exited.pid(),
                next = ?next.as_ref().map(|unit| unit.pid()),
                "Foreground exited"
            );
            self.current = next;
        }
        self.pid()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Environment, Presentation};
    use crate::core::types::UnitHandle;

    fn unit(pid: Pid, parent: Option<&Arc<ExecutionUnit>>) -> Arc<ExecutionUnit> {
        Arc::new(ExecutionUnit::new(
            UnitHandle(pid as u64),
            pid,
            parent.cloned(),
            "sh".to_string(),
            Environment::default(),
            Presentation::Inline,
        ))
    }

    #[test]
    fn exit_of_foreground_skips_terminated_ancestors() {
        let root = unit(2, None);
        let middle = unit(3, Some(&root));
        let leaf = unit(4, Some(&middle));

        let mut router = ForegroundRouter::new();
        router.set(Arc::clone(&leaf));

        middle.mark_terminated();
        leaf.mark_terminated();
        assert_eq!(router.on_exit(&leaf), Some(2));

        root.mark_terminated();
        assert_eq!(router.on_exit(&root), None);
        assert!(router.current().is_none());
    }

    #[test]
    fn exit_of_background_unit_keeps_foreground() {
        let root = unit(2, None);
        let background = unit(3, Some(&root));
        let mut router = ForegroundRouter::new();
        router.set(Arc::clone(&root));

        background.mark_terminated();
        assert_eq!(router.on_exit(&background), Some(2));
    }
}
