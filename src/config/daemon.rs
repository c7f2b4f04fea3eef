//! Daemon configuration: scheduled jobs, each pointing at a script file.
//!
//! ```yaml
//! jobs:
//!   - name: infra
//!     script: /etc/probescript/infra.yml
//!     schedule: "0 */5 * * * *"
//!   - name: smoke
//!     script: smoke.yml
//!     once: true
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// Parsed daemon file.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DaemonConfig {
    /// Jobs to schedule.
    pub jobs: Vec<JobConfig>,
}

/// One scheduled job.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobConfig {
    /// Job name, used in logs.
    pub name: String,
    /// Path to the script file this job runs.
    pub script: PathBuf,
    /// Cron expression (with seconds field); required unless `once`.
    #[serde(default)]
    pub schedule: Option<String>,
    /// Run the script a single time at startup instead of on a schedule.
    #[serde(default)]
    pub once: bool,
    /// Overrides the script's own timeout.
    #[serde(default, with = "crate::util::opt_duration_ms")]
    pub timeout: Option<Duration>,
}

impl DaemonConfig {
    /// Loads a daemon file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        super::load_yaml(path.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_jobs() {
        let yaml = r#"
jobs:
  - name: infra
    script: infra.yml
    schedule: "0 */5 * * * *"
    timeout: 15000
  - name: smoke
    script: smoke.yml
    once: true
"#;
        let config: DaemonConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.jobs.len(), 2);
        assert_eq!(config.jobs[0].timeout, Some(Duration::from_millis(15000)));
        assert!(!config.jobs[0].once);
        assert!(config.jobs[1].once);
        assert!(config.jobs[1].schedule.is_none());
    }
}
