/*!
 * Process Module
 * Process, group and session tables, wait resolution and the foreground router
 */

pub mod allocator;
pub mod foreground;
pub mod group;
pub mod listener;
pub mod manager;
pub mod manager_builder;
pub mod table;
pub mod types;
pub mod unit;
pub mod wait;

// Re-export for convenience
pub use listener::{HostListener, NullListener};
pub use manager::ProcessManager;
pub use manager_builder::ProcessManagerBuilder;
pub use types::{
    ExitReport, GroupSnapshot, ProcessSnapshot, SpawnPlan, WaitOptions, WaitResult, WaitStatus,
};
pub use unit::ExecutionUnit;
pub use wait::{WaitKey, WaitReply};
