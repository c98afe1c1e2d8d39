/*!
 * Process Manager Builder
 * Builder pattern for ProcessManager construction
 */

use super::listener::{HostListener, NullListener};
use super::manager::ProcessManager;
use crate::backend::{ExecutionBackend, Presenter};
use crate::core::config::KernelConfig;
use tracing::info;

/// Builder for ProcessManager
pub struct ProcessManagerBuilder {
    backend: Box<dyn ExecutionBackend>,
    presenter: Box<dyn Presenter>,
    listener: Option<Box<dyn HostListener>>,
    config: KernelConfig,
}

impl ProcessManagerBuilder {
    /// Create a new ProcessManager builder
    pub fn new<B, P>(backend: B, presenter: P) -> Self
    where
        B: ExecutionBackend + 'static,
        P: Presenter + 'static,
    {
        Self {
            backend: Box::new(backend),
            presenter: Box::new(presenter),
            listener: None,
            config: KernelConfig::default(),
        }
    }

    /// Receive stdout, load errors and root load notifications
    pub fn with_listener<L: HostListener + 'static>(mut self, listener: L) -> Self {
        self.listener = Some(Box::new(listener));
        self
    }

    pub fn with_config(mut self, config: KernelConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the ProcessManager
    pub fn build(self) -> ProcessManager {
        let mut features = vec!["backend", "presenter"];
        if self.listener.is_some() {
            features.push("listener");
        }
        if self.config.whitelist.is_some() {
            features.push("whitelist");
        }

        info!(
            tty_cols = self.config.tty.cols,
            tty_rows = self.config.tty.rows,
            "Process manager initialized with: {}",
            features.join(", ")
        );

        ProcessManager::assemble(
            self.backend,
            self.presenter,
            self.listener
                .unwrap_or_else(|| Box::new(NullListener)),
            self.config,
        )
    }
}
