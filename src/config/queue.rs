//! Queue and scheduler configuration structures.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for one named queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Maximum concurrently running executions.
    pub max_concurrent: usize,
    /// Maximum pending executions before submissions are rejected.
    pub max_pending: usize,
    /// Default per-execution timeout in seconds.
    pub default_timeout_secs: u64,
}

impl QueueConfig {
    /// The configured default timeout as a [`Duration`].
    #[must_use]
    pub const fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }

    /// Validate queue configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_concurrent == 0 {
            return Err("max_concurrent must be greater than 0".into());
        }
        if self.max_pending == 0 {
            return Err("max_pending must be greater than 0".into());
        }
        if self.default_timeout_secs == 0 {
            return Err("default_timeout_secs must be greater than 0".into());
        }
        Ok(())
    }
}

/// Root scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Map of queue name to configuration.
    pub queues: HashMap<String, QueueConfig>,
    /// Dispatcher poll interval in milliseconds.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Terminal results retained before oldest-first eviction.
    #[serde(default = "default_retention_limit")]
    pub retention_limit: usize,
}

const fn default_tick_interval_ms() -> u64 {
    50
}

const fn default_retention_limit() -> usize {
    100
}

impl Default for SchedulerConfig {
    /// One `default` queue sized to the host: concurrency matching the
    /// number of CPUs, a 64-deep pending set, and a 60-second timeout.
    fn default() -> Self {
        let mut queues = HashMap::new();
        queues.insert(
            "default".to_string(),
            QueueConfig {
                max_concurrent: num_cpus::get().max(1),
                max_pending: 64,
                default_timeout_secs: 60,
            },
        );
        Self {
            queues,
            tick_interval_ms: default_tick_interval_ms(),
            retention_limit: default_retention_limit(),
        }
    }
}

impl SchedulerConfig {
    /// Validate all queues and ensure at least one queue exists.
    pub fn validate(&self) -> Result<(), String> {
        if self.queues.is_empty() {
            return Err("at least one queue must be defined".into());
        }
        if self.tick_interval_ms == 0 {
            return Err("tick_interval_ms must be greater than 0".into());
        }
        if self.retention_limit == 0 {
            return Err("retention_limit must be greater than 0".into());
        }
        for (name, queue) in &self.queues {
            queue
                .validate()
                .map_err(|e| format!("queue `{name}` invalid: {e}"))?;
        }
        Ok(())
    }

    /// Parse scheduler configuration from a JSON string and validate.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Dispatcher poll interval as a [`Duration`].
    #[must_use]
    pub const fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let cfg = SchedulerConfig::default();
        cfg.validate().unwrap();
        assert!(cfg.queues.contains_key("default"));
    }

    #[test]
    fn test_rejects_empty_queue_map() {
        let cfg = SchedulerConfig {
            queues: HashMap::new(),
            tick_interval_ms: 50,
            retention_limit: 100,
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_limits() {
        let mut cfg = SchedulerConfig::default();
        cfg.queues.insert(
            "bad".into(),
            QueueConfig {
                max_concurrent: 0,
                max_pending: 8,
                default_timeout_secs: 30,
            },
        );
        let err = cfg.validate().unwrap_err();
        assert!(err.contains("bad"));
    }

    #[test]
    fn test_from_json_str() {
        let cfg = SchedulerConfig::from_json_str(
            r#"{
                "queues": {
                    "default": {
                        "max_concurrent": 4,
                        "max_pending": 32,
                        "default_timeout_secs": 30
                    }
                }
            }"#,
        )
        .unwrap();
        assert_eq!(cfg.tick_interval_ms, 50);
        assert_eq!(cfg.retention_limit, 100);
        assert_eq!(cfg.queues["default"].max_concurrent, 4);
    }

    #[test]
    fn test_from_json_str_rejects_invalid() {
        let err = SchedulerConfig::from_json_str(r#"{"queues": {}}"#).unwrap_err();
        assert!(err.contains("at least one queue"));
    }
}
