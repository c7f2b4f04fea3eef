//! # Explicit probe constructor registry.
//!
//! Maps a probe-type name to a constructor that, given [`ProbeOptions`] and
//! an opaque configuration value, returns a probe instance or a
//! configuration error. The registry is an explicit value built by startup
//! code and passed by reference to the configuration loader — no global
//! mutable state, no init-order dependencies.
//!
//! The core never inspects probe-specific configuration; it only threads
//! the opaque [`Value`] through to the constructor.

use std::collections::HashMap;

use serde_json::Value;

use crate::error::ConfigError;
use crate::probes::{cmd, web, ProbeOptions, ProbeRef};

/// Probe constructor signature: options plus self-parsed configuration.
pub type ConstructorFn = fn(ProbeOptions, &Value) -> Result<ProbeRef, ConfigError>;

/// Name → constructor map for the probe types an application supports.
#[derive(Default)]
pub struct ProbeRegistry {
    constructors: HashMap<&'static str, ConstructorFn>,
}

impl ProbeRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with the built-in probes (`cmd`, `web`).
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(cmd::NAME, cmd::construct);
        registry.register(web::NAME, web::construct);
        registry
    }

    /// Registers (or replaces) a constructor under `name`.
    pub fn register(&mut self, name: &'static str, constructor: ConstructorFn) {
        self.constructors.insert(name, constructor);
    }

    /// Builds a probe of type `name`, or fails with
    /// [`ConfigError::UnknownProbe`].
    pub fn construct(
        &self,
        name: &str,
        options: ProbeOptions,
        configuration: &Value,
    ) -> Result<ProbeRef, ConfigError> {
        let constructor = self
            .constructors
            .get(name)
            .ok_or_else(|| ConfigError::UnknownProbe(name.to_string()))?;
        constructor(options, configuration)
    }

    /// Registered probe-type names, sorted.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.constructors.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unknown_probe_is_rejected() {
        let registry = ProbeRegistry::with_builtins();
        let err = registry
            .construct("bogus", ProbeOptions::default(), &Value::Null)
            .err()
            .unwrap();
        assert!(matches!(err, ConfigError::UnknownProbe(name) if name == "bogus"));
    }

    #[test]
    fn test_builtins_are_registered() {
        let registry = ProbeRegistry::with_builtins();
        assert_eq!(registry.names(), vec!["cmd", "web"]);

        let probe = registry
            .construct("cmd", ProbeOptions::default(), &json!("echo hello"))
            .unwrap();
        assert_eq!(probe.name(), "cmd");
    }
}
