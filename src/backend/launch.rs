/*!
 * Launch Parameters
 * Environment parsing and the parameter set handed to the backend
 */

use super::presentation::Presentation;
use crate::core::limits::{
    ENV_PID, ENV_PPID, EXIT_MESSAGE, PARAM_EXIT_MESSAGE, PARAM_STDERR, PARAM_STDIN,
    PARAM_STDOUT, PARAM_TTY_COLS, PARAM_TTY_PREFIX, PARAM_TTY_RESIZE, PARAM_TTY_ROWS,
    PARAM_VERBOSITY, STDIO_DEVICE, TERM_VALUE, TTY_PREFIX, TTY_RESIZE_KEY, VERBOSITY_DEFAULT,
};
use crate::core::types::{Pid, TtySize};
use crate::manifest::ResolvedProgram;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

/// Parsed `KEY=VALUE` environment of a unit
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Environment(BTreeMap<String, String>);

impl Environment {
    /// Parse an environment list
    ///
    /// Entries without `=` are skipped. Keys that collide with parameters the
    /// loader owns (`SRC`, `DATA`, `ARG<n>`, `type`) are never forwarded.
    pub fn parse<S: AsRef<str>>(entries: &[S]) -> Self {
        let mut vars = BTreeMap::new();
        for entry in entries {
            let entry = entry.as_ref();
            let Some((key, value)) = entry.split_once('=') else {
                warn!(entry = %entry, "Broken env entry");
                continue;
            };
            if is_reserved_key(key) {
                continue;
            }
            vars.insert(key.to_string(), value.to_string());
        }
        Self(vars)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        if !is_reserved_key(&key) {
            self.0.insert(key, value.into());
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn is_reserved_key(key: &str) -> bool {
    if key == "SRC" || key == "DATA" || key.eq_ignore_ascii_case("type") {
        return true;
    }
    let bytes = key.as_bytes();
    bytes.len() > 3
        && bytes[..3].eq_ignore_ascii_case(b"arg")
        && bytes[3..].iter().all(u8::is_ascii_digit)
}

/// Everything the backend needs to start a unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchSpec {
    pub pid: Pid,
    pub ppid: Pid,
    /// `argv[0]`
    pub command: String,
    pub program: ResolvedProgram,
    /// Flat parameter map: environment, injected kernel values and `argN`
    pub params: BTreeMap<String, String>,
    pub presentation: Presentation,
}

impl LaunchSpec {
    #[allow(clippy::too_many_arguments)]
    pub fn build(
        pid: Pid,
        ppid: Pid,
        argv: &[String],
        cwd: &str,
        env: &Environment,
        program: ResolvedProgram,
        tty: TtySize,
        presentation: Presentation,
    ) -> Self {
        let mut params: BTreeMap<String, String> = env
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        params.insert(ENV_PID.to_string(), pid.to_string());
        params.insert(ENV_PPID.to_string(), ppid.to_string());
        params.insert(PARAM_TTY_PREFIX.to_string(), TTY_PREFIX.to_string());
        params.insert(PARAM_TTY_RESIZE.to_string(), TTY_RESIZE_KEY.to_string());
        params.insert(PARAM_TTY_COLS.to_string(), tty.cols.to_string());
        params.insert(PARAM_TTY_ROWS.to_string(), tty.rows.to_string());
        for stream in [PARAM_STDIN, PARAM_STDOUT, PARAM_STDERR] {
            params.insert(stream.to_string(), STDIO_DEVICE.to_string());
        }
        params.insert(PARAM_VERBOSITY.to_string(), VERBOSITY_DEFAULT.to_string());
        params.insert(PARAM_EXIT_MESSAGE.to_string(), EXIT_MESSAGE.to_string());
        params.insert("TERM".to_string(), TERM_VALUE.to_string());
        params.insert("PWD".to_string(), cwd.to_string());

        for (n, arg) in argv.iter().enumerate() {
            params.insert(format!("arg{}", n), arg.clone());
        }

        Self {
            pid,
            ppid,
            command: argv.first().cloned().unwrap_or_default(),
            program,
            params,
            presentation,
        }
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }
}
