use std::time::Duration;

use serde::Deserialize;

/// Scheduler and per-call execution settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExecutionConfig {
    /// Maximum number of interviews running concurrently. Clamped to at
    /// least 1 by the scheduler.
    pub concurrency: usize,

    /// Timeout applied to each individual provider call.
    #[serde(deserialize_with = "duration_str::deserialize_duration")]
    pub per_call_timeout: Duration,

    /// Maximum retry attempts for transient provider errors.
    pub max_retries: u32,

    /// Base delay for exponential backoff between retries.
    #[serde(deserialize_with = "duration_str::deserialize_duration")]
    pub backoff_base: Duration,

    /// Upper bound on a single backoff sleep.
    #[serde(deserialize_with = "duration_str::deserialize_duration")]
    pub backoff_max: Duration,

    /// Maximum deterministic repair attempts per question turn before the
    /// turn is recorded as a validation failure.
    pub max_repair_attempts: u32,

    /// Abort an interview on its first failed turn instead of continuing.
    pub stop_on_error: bool,

    /// How often job status snapshots are refreshed for pollers.
    #[serde(deserialize_with = "duration_str::deserialize_duration")]
    pub status_poll_interval: Duration,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            concurrency: 25,
            per_call_timeout: Duration::from_secs(60),
            max_retries: 5,
            backoff_base: Duration::from_secs(1),
            backoff_max: Duration::from_secs(60),
            max_repair_attempts: 2,
            stop_on_error: false,
            status_poll_interval: Duration::from_secs(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::ExecutionConfig;

    #[test]
    fn durations_parse_human_readable() {
        let config: ExecutionConfig = toml::from_str(
            r#"
            concurrency = 100
            per_call_timeout = "2m"
            backoff_base = "250ms"
            "#,
        )
        .unwrap();

        assert_eq!(config.concurrency, 100);
        assert_eq!(config.per_call_timeout, Duration::from_secs(120));
        assert_eq!(config.backoff_base, Duration::from_millis(250));
        assert_eq!(config.backoff_max, Duration::from_secs(60));
    }
}
