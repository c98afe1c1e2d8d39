/*!
 * Execution Units
 * The kernel's side of a launched unit: identity, parent chain and launch hints
 */

use crate::backend::{Environment, Presentation};
use crate::core::limits::{ENV_ABORT, ENV_ABORT_VALUE};
use crate::core::types::{Pid, UnitHandle};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A launched unit
///
/// Units outlive their process records: a descendant keeps its ancestors
/// alive through `parent`, which is how the foreground walks past exited
/// ancestors whose records were already reaped.
#[derive(Debug)]
pub struct ExecutionUnit {
    handle: UnitHandle,
    pid: Pid,
    parent: Option<Arc<ExecutionUnit>>,
    command: String,
    env: Environment,
    presentation: Presentation,
    terminated: AtomicBool,
}

impl ExecutionUnit {
    pub fn new(
        handle: UnitHandle,
        pid: Pid,
        parent: Option<Arc<ExecutionUnit>>,
        command: String,
        env: Environment,
        presentation: Presentation,
    ) -> Self {
        Self {
            handle,
            pid,
            parent,
            command,
            env,
            presentation,
            terminated: AtomicBool::new(false),
        }
    }

    #[inline]
    pub fn handle(&self) -> UnitHandle {
        self.handle
    }

    #[inline]
    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn parent(&self) -> Option<&Arc<ExecutionUnit>> {
        self.parent.as_ref()
    }

    /// Spawned by the host rather than by another unit
    #[inline]
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    pub fn presentation(&self) -> &Presentation {
        &self.presentation
    }

    /// Whether an interrupt may kill this unit
    pub fn abort_enabled(&self) -> bool {
        self.env.get(ENV_ABORT) == Some(ENV_ABORT_VALUE)
    }

    #[inline]
    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }

    pub(crate) fn mark_terminated(&self) {
        self.terminated.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(pid: Pid, parent: Option<Arc<ExecutionUnit>>, env: &[&str]) -> Arc<ExecutionUnit> {
        Arc::new(ExecutionUnit::new(
            UnitHandle(pid as u64),
            pid,
            parent,
            "sh".to_string(),
            Environment::parse(env),
            Presentation::Inline,
        ))
    }

    #[test]
    fn abort_requires_exact_opt_in() {
        assert!(unit(2, None, &["ENABLE_CONTROL_C=1"]).abort_enabled());
        assert!(!unit(2, None, &["ENABLE_CONTROL_C=yes"]).abort_enabled());
        assert!(!unit(2, None, &[]).abort_enabled());
    }

    #[test]
    fn root_is_the_unit_without_parent() {
        let root = unit(2, None, &[]);
        let child = unit(3, Some(Arc::clone(&root)), &[]);
        assert!(root.is_root());
        assert!(!child.is_root());
        assert_eq!(child.parent().map(|p| p.pid()), Some(2));

        root.mark_terminated();
        assert!(child.parent().is_some_and(|p| p.is_terminated()));
    }
}
