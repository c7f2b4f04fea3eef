//! # Configuration: YAML script and daemon definitions.
//!
//! Two file formats are understood:
//!
//! - a *script* file declares an ordered task list (see [`ScriptConfig`]),
//!   compiled against an explicit [`ProbeRegistry`](crate::ProbeRegistry)
//!   into a runnable [`Script`](crate::Script);
//! - a *daemon* file declares a set of scheduled jobs (see [`DaemonConfig`]),
//!   each pointing at a script file.
//!
//! All durations are plain integers in milliseconds. Probe-specific
//! configuration stays an opaque value; only the probe constructor
//! interprets it.

mod daemon;
mod script;

pub use daemon::{DaemonConfig, JobConfig};
pub use script::{ProbeDecl, ScriptConfig, TaskDecl};

use std::path::Path;

use serde::de::DeserializeOwned;

use crate::error::ConfigError;

/// Reads and parses a YAML configuration file.
fn load_yaml<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    serde_yaml::from_str(&text).map_err(|source| ConfigError::Yaml {
        path: path.display().to_string(),
        source,
    })
}
