//! Configuration for the actor runtime.

use std::time::Duration;

use anyhow::{Context, Result};
use stagehand_core::{SupervisionPolicy, DEFAULT_REQUEST_TIMEOUT};

/// Runtime configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Capacity of each actor's user mailbox.
    pub mailbox_capacity: usize,

    /// Timeout for requests that set none.
    pub request_timeout: Duration,

    /// How long shutdown waits for actors before aborting them.
    pub shutdown_grace: Duration,

    /// Policy applied to failures of top-level actors.
    pub guardian_policy: SupervisionPolicy,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: 1024,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            shutdown_grace: Duration::from_secs(10),
            guardian_policy: SupervisionPolicy::default(),
            log_level: "info".to_string(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from any key/value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let mailbox_capacity = lookup("STAGEHAND_MAILBOX_CAPACITY")
            .and_then(|s| s.parse().ok())
            .filter(|capacity: &usize| *capacity > 0)
            .unwrap_or(defaults.mailbox_capacity);

        let request_timeout = lookup("STAGEHAND_REQUEST_TIMEOUT_MS")
            .and_then(|s| s.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.request_timeout);

        let shutdown_grace = lookup("STAGEHAND_SHUTDOWN_GRACE_MS")
            .and_then(|s| s.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.shutdown_grace);

        let guardian_policy = match lookup("STAGEHAND_GUARDIAN_POLICY") {
            Some(raw) => serde_json::from_str(&raw)
                .context("STAGEHAND_GUARDIAN_POLICY is not a valid supervision policy")?,
            None => defaults.guardian_policy,
        };

        let log_level = lookup("STAGEHAND_LOG_LEVEL").unwrap_or(defaults.log_level);

        Ok(Self {
            mailbox_capacity,
            request_timeout,
            shutdown_grace,
            guardian_policy,
            log_level,
        })
    }

    pub fn with_mailbox_capacity(mut self, capacity: usize) -> Self {
        self.mailbox_capacity = capacity.max(1);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn with_guardian_policy(mut self, policy: SupervisionPolicy) -> Self {
        self.guardian_policy = policy;
        self
    }
}
