/*!
 * Manifests
 *
 * A manifest is a JSON document describing a program. It must declare a
 * `program` entry; a `program.portable` entry with a `pnacl-translate` key
 * marks a portable program, anything else is native.
 */

pub mod resolver;
pub mod source;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

pub use resolver::ManifestResolver;
pub use source::{FsManifestSource, ManifestSource, StaticManifestSource};

/// Manifest errors, carrying the location they were reported for
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ManifestError {
    #[error("Manifest is unreachable at {0}")]
    Unreachable(String),

    #[error("Manifest is not valid JSON at {0}")]
    NotJson(String),

    #[error("Manifest has bad format at {0}")]
    BadFormat(String),
}

/// Program kind, selects how the backend loads the unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgramKind {
    Native,
    Portable,
}

impl fmt::Display for ProgramKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProgramKind::Native => f.write_str("native"),
            ProgramKind::Portable => f.write_str("portable"),
        }
    }
}

/// Parsed manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<Map<String, Value>>,
}

impl Manifest {
    /// Parse and validate manifest text fetched from `location`
    pub fn parse(text: &str, location: &str) -> Result<Self, ManifestError> {
        let value: Value = serde_json::from_str(text)
            .map_err(|_| ManifestError::NotJson(location.to_string()))?;
        Self::from_value(value, location)
    }

    /// Validate an already-decoded manifest
    pub fn from_value(value: Value, location: &str) -> Result<Self, ManifestError> {
        if !value.is_object() {
            return Err(ManifestError::BadFormat(location.to_string()));
        }
        let manifest: Manifest = serde_json::from_value(value)
            .map_err(|_| ManifestError::BadFormat(location.to_string()))?;
        if manifest.program.is_none() {
            return Err(ManifestError::BadFormat(location.to_string()));
        }
        Ok(manifest)
    }

    /// Program kind, or `None` when there is no program entry
    pub fn kind(&self) -> Option<ProgramKind> {
        let program = self.program.as_ref()?;
        let portable = program
            .get("portable")
            .and_then(Value::as_object)
            .is_some_and(|portable| portable.contains_key("pnacl-translate"));
        Some(if portable {
            ProgramKind::Portable
        } else {
            ProgramKind::Native
        })
    }
}

/// Where the backend loads the program from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "source", content = "value")]
pub enum ManifestLocation {
    /// Resolved from an executable name
    Named(String),
    /// Supplied by the spawning process
    Inline(Manifest),
}

/// A validated program ready to launch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedProgram {
    pub location: ManifestLocation,
    pub kind: ProgramKind,
}
