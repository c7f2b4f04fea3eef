//! Script configuration: an ordered task list compiled into a runnable
//! [`Script`].
//!
//! ```yaml
//! timeout: 30000
//! script:
//!   - name: port check
//!     cgroup: infra
//!     probe:
//!       name: cmd
//!       configuration: nc -z localhost 5432
//!   - name: frontend
//!     probe:
//!       name: web
//!       options: { timeout: 2000 }
//!       configuration:
//!         urls: [ "https://example.org/health" ]
//! ```
//!
//! Task order matters twice: groups are formed from *adjacent* tasks with
//! the same `cgroup` value, and groups run in declaration order.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::core::{Script, Task, DEFAULT_SCRIPT_TIMEOUT};
use crate::error::ConfigError;
use crate::probes::{ProbeOptions, ProbeRegistry};

/// Parsed script file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ScriptConfig {
    /// Whole-script timeout.
    #[serde(with = "crate::util::duration_ms")]
    pub timeout: Duration,
    /// Task declarations, in execution order.
    pub script: Vec<TaskDecl>,
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_SCRIPT_TIMEOUT,
            script: Vec::new(),
        }
    }
}

/// One task declaration within a script file.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDecl {
    /// Task name, used in logs and reports.
    pub name: String,
    /// Concurrency-group name; adjacent tasks sharing it run in parallel.
    #[serde(default)]
    pub cgroup: Option<String>,
    /// Optional metric labels.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// The probe this task drives.
    pub probe: ProbeDecl,
}

/// Probe declaration: type name, common options, opaque configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeDecl {
    /// Probe-type name, resolved through the registry.
    pub name: String,
    /// Common execution options.
    #[serde(default)]
    pub options: ProbeOptions,
    /// Probe-specific configuration, passed to the constructor unparsed.
    #[serde(default)]
    pub configuration: Value,
}

impl ScriptConfig {
    /// Loads a script file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        super::load_yaml(path.as_ref())
    }

    /// Compiles the declaration list into a runnable [`Script`], resolving
    /// each probe through `registry`. Fails on the first bad task, naming it.
    pub fn build(&self, registry: &ProbeRegistry) -> Result<Script, ConfigError> {
        let mut script = Script::new().with_timeout(self.timeout);
        for decl in &self.script {
            let probe = registry
                .construct(&decl.probe.name, decl.probe.options.clone(), &decl.probe.configuration)
                .map_err(|e| e.for_task(&decl.name))?;
            let task = Task::new(&decl.name, decl.cgroup.clone(), probe)
                .with_labels(decl.labels.clone());
            script.add_task(task);
        }
        Ok(script)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
timeout: 30000
script:
  - name: first
    cgroup: fast
    probe:
      name: cmd
      configuration: "true"
  - name: second
    cgroup: fast
    labels: { tier: "frontend" }
    probe:
      name: cmd
      options: { timeout: 250, expect: false }
      configuration: "false"
  - name: third
    probe:
      name: cmd
      configuration:
        cmd: sh
        args: ["-c", "exit 0"]
"#;

    #[test]
    fn test_parse_and_build() {
        let config: ScriptConfig = serde_yaml::from_str(SAMPLE).unwrap();
        assert_eq!(config.timeout, Duration::from_millis(30000));
        assert_eq!(config.script.len(), 3);
        assert_eq!(config.script[1].probe.options.timeout, Duration::from_millis(250));
        assert!(!config.script[1].probe.options.expect);

        let registry = ProbeRegistry::with_builtins();
        let script = config.build(&registry).unwrap();
        assert_eq!(script.tasks().len(), 3);
        // Adjacent `fast` tasks share a group; the anonymous task gets its own.
        assert_eq!(script.groups().len(), 2);
        assert_eq!(script.groups()[0].tasks().len(), 2);
    }

    #[test]
    fn test_timeout_defaults_when_absent() {
        let config: ScriptConfig = serde_yaml::from_str("script: []").unwrap();
        assert_eq!(config.timeout, DEFAULT_SCRIPT_TIMEOUT);
    }

    #[test]
    fn test_bad_probe_names_the_task() {
        let yaml = r#"
script:
  - name: broken
    probe: { name: bogus }
"#;
        let config: ScriptConfig = serde_yaml::from_str(yaml).unwrap();
        let err = config.build(&ProbeRegistry::with_builtins()).err().unwrap();
        assert!(err.to_string().contains("broken"), "got: {err}");
        assert!(err.to_string().contains("bogus"), "got: {err}");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let config = ScriptConfig::load(file.path()).unwrap();
        assert_eq!(config.script.len(), 3);
    }

    #[test]
    fn test_load_reports_missing_file() {
        let err = ScriptConfig::load("/nonexistent/script.yml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
