//! # `web` probe: fetch a set of URLs and check their HTTP status.
//!
//! All URLs are fetched in parallel; the check passes when every response
//! arrives with the expected status code before the probe timeout. The
//! payload is a per-URL timing map (`{url: milliseconds}`).
//!
//! Configuration: `{urls, httpStatus}`, or a plain string naming a single
//! URL.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::task::JoinSet;
use tracing::debug;

use crate::error::{ConfigError, ProbeError};
use crate::probes::{
    ProbeHandler, ProbeOptions, ProbeOutcome, ProbeRef, ProbeRunner, RunContext, Timings,
};

/// Registry name of this probe type.
pub const NAME: &str = "web";

/// Probe-specific configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WebConfig {
    /// URLs to fetch, all in parallel.
    pub urls: Vec<String>,
    /// Expected response status for every URL.
    pub http_status: u16,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            urls: Vec::new(),
            http_status: 200,
        }
    }
}

/// Constructs a `web` probe from an opaque configuration value.
pub fn construct(options: ProbeOptions, configuration: &Value) -> Result<ProbeRef, ConfigError> {
    let config = parse_config(configuration)?;
    Ok(Arc::new(ProbeHandler::new(
        NAME,
        options,
        WebRunner {
            config,
            client: reqwest::Client::new(),
        },
    )))
}

fn parse_config(value: &Value) -> Result<WebConfig, ConfigError> {
    let config = if let Some(url) = value.as_str() {
        WebConfig {
            urls: vec![url.to_string()],
            ..WebConfig::default()
        }
    } else {
        serde_json::from_value(value.clone())
            .map_err(|e| ConfigError::Invalid(e.to_string()))?
    };
    if config.urls.is_empty() {
        return Err(ConfigError::Invalid("urls is empty".to_string()));
    }
    Ok(config)
}

struct WebRunner {
    config: WebConfig,
    client: reqwest::Client,
}

impl WebRunner {
    async fn fetch_all(&self) -> ProbeOutcome {
        let want = self.config.http_status;
        let mut set: JoinSet<(String, Duration, Result<u16, String>)> = JoinSet::new();
        for url in &self.config.urls {
            let client = self.client.clone();
            let url = url.clone();
            set.spawn(async move {
                let started = Instant::now();
                let got = client
                    .get(&url)
                    .send()
                    .await
                    .map(|resp| resp.status().as_u16())
                    .map_err(|e| e.to_string());
                (url, started.elapsed(), got)
            });
        }

        let mut timings = Timings::default();
        let mut error = None;
        while let Some(joined) = set.join_next().await {
            let (url, elapsed, got) = match joined {
                Ok(fetched) => fetched,
                Err(e) => {
                    error.get_or_insert(ProbeError::Http(e.to_string()));
                    continue;
                }
            };
            timings.set(&url, elapsed);
            match got {
                Ok(status) if status == want => {
                    debug!(url = %url, status, "url check passed");
                }
                Ok(status) => {
                    error.get_or_insert(ProbeError::Http(format!(
                        "{url}: got status {status}, want {want}"
                    )));
                }
                Err(e) => {
                    error.get_or_insert(ProbeError::Http(format!("{url}: {e}")));
                }
            }
        }

        let mut outcome = match error {
            None => ProbeOutcome::pass(),
            Some(e) => ProbeOutcome::fail(e),
        };
        if !timings.is_empty() {
            outcome = outcome.with_data(timings.to_value());
        }
        outcome
    }
}

#[async_trait]
impl ProbeRunner for WebRunner {
    fn configuration(&self) -> Value {
        serde_json::to_value(&self.config).unwrap_or(Value::Null)
    }

    async fn run(&self, cx: &RunContext) -> ProbeOutcome {
        let raced = tokio::time::timeout(cx.options.timeout, async {
            tokio::select! {
                outcome = self.fetch_all() => Some(outcome),
                _ = cx.token.cancelled() => None,
            }
        })
        .await;

        match raced {
            Ok(Some(outcome)) => outcome,
            Ok(None) => ProbeOutcome::fail(ProbeError::Canceled),
            Err(_elapsed) => ProbeOutcome::fail(ProbeError::Timeout(cx.options.timeout)),
        }
    }
}
