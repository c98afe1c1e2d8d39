/*!
 * Host Listener
 * Notifications the kernel raises towards the host (terminal, UI)
 */

use crate::backend::LoadProgress;

/// Receives output and lifecycle notifications. Every method defaults to a no-op.
pub trait HostListener: Send {
    /// Standard output of any live unit, prefix stripped
    fn on_stdout(&mut self, text: &str) {
        let _ = text;
    }

    /// A unit failed to load
    fn on_error(&mut self, command: &str, message: &str) {
        let _ = (command, message);
    }

    /// A root unit finished loading
    fn on_root_load(&mut self) {}

    /// Load progress of a root unit
    fn on_root_progress(&mut self, progress: &LoadProgress) {
        let _ = progress;
    }
}

/// Listener that drops everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullListener;

impl HostListener for NullListener {}
