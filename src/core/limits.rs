/*!
 * Protocol Constants
 *
 * Centralized location for reserved identifiers, wait flags, exit codes and
 * the names of the environment hints and TTY keys exchanged with execution
 * units. Organized by domain.
 */

use super::types::{ExitCode, Pid};

// =============================================================================
// RESERVED IDENTIFIERS
// =============================================================================

/// Implicit parent of every ownerless spawn
pub const INIT_PID: Pid = 1;

/// First pid handed out by the allocator (0 and 1 are reserved)
pub const FIRST_PID: Pid = 2;

/// Wait key meaning "any child"
pub const WAIT_ANY: Pid = -1;

/// `waitpid` flag: do not queue when no child is ready
pub const WNOHANG: u32 = 1;

// =============================================================================
// EXIT CODES
// =============================================================================

/// Exit code when a unit could not be loaded
pub const EXIT_CODE_NO_EXEC: ExitCode = 126;

/// Exit code when a unit is killed (128 + SIGKILL)
pub const EXIT_CODE_KILL: ExitCode = 128 + 9;

// =============================================================================
// ENVIRONMENT HINTS
// =============================================================================

/// Must be set to [`ENV_ABORT_VALUE`] for an interrupt to kill the process
pub const ENV_ABORT: &str = "ENABLE_CONTROL_C";
pub const ENV_ABORT_VALUE: &str = "1";

/// Presentation mode selector
pub const ENV_SPAWN_MODE: &str = "PROC_SPAWN_MODE";
pub const ENV_SPAWN_POPUP_VALUE: &str = "popup";
pub const ENV_SPAWN_EMBED_VALUE: &str = "embed";

pub const ENV_POPUP_WIDTH: &str = "PROC_POPUP_WIDTH";
pub const ENV_POPUP_HEIGHT: &str = "PROC_POPUP_HEIGHT";
pub const ENV_EMBED_WIDTH: &str = "PROC_EMBED_WIDTH";
pub const ENV_EMBED_HEIGHT: &str = "PROC_EMBED_HEIGHT";

/// Injected into every launch
pub const ENV_PID: &str = "PROC_PID";
pub const ENV_PPID: &str = "PROC_PPID";

// =============================================================================
// TTY WIRE KEYS
// =============================================================================

/// Prefix of stdout strings from units and key of stdin messages to units
pub const TTY_PREFIX: &str = "proc_tty";

/// Key of resize messages to units
pub const TTY_RESIZE_KEY: &str = "tty_resize";

/// Prefix of termination strings from units (`exited:<code>`)
pub const EXIT_MESSAGE: &str = "exited";

pub const TERM_VALUE: &str = "xterm-256color";

// =============================================================================
// LAUNCH PARAMETER NAMES
// =============================================================================

pub const PARAM_TTY_PREFIX: &str = "PS_TTY_PREFIX";
pub const PARAM_TTY_RESIZE: &str = "PS_TTY_RESIZE";
pub const PARAM_TTY_COLS: &str = "PS_TTY_COLS";
pub const PARAM_TTY_ROWS: &str = "PS_TTY_ROWS";
pub const PARAM_EXIT_MESSAGE: &str = "PS_EXIT_MESSAGE";
pub const PARAM_STDIN: &str = "PS_STDIN";
pub const PARAM_STDOUT: &str = "PS_STDOUT";
pub const PARAM_STDERR: &str = "PS_STDERR";
pub const PARAM_VERBOSITY: &str = "PS_VERBOSITY";

/// Standard streams of every unit are bound to the terminal
pub const STDIO_DEVICE: &str = "/dev/tty";
pub const VERBOSITY_DEFAULT: &str = "2";

// =============================================================================
// PRESENTATION DEFAULTS
// =============================================================================

pub const POPUP_WIDTH_DEFAULT: u32 = 600;
pub const POPUP_HEIGHT_DEFAULT: u32 = 400;
pub const EMBED_WIDTH_DEFAULT: &str = "100%";
pub const EMBED_HEIGHT_DEFAULT: &str = "50%";

// =============================================================================
// DRIVER
// =============================================================================

/// Launches, messages and terminations the driver's loopback backend retains
pub const LOOPBACK_HISTORY: usize = 256;
