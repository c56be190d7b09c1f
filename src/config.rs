use std::str::FromStr;
use std::time::Duration;

/// Settings that shape scheduling behaviour. Everything else about the
/// scheduler is a fixed property of the job type tables.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub watch_interval: Duration,
    pub startup_delay: Duration,
    pub max_concurrent: usize,
    pub heavy_job_limit: usize,
    pub max_attempts: i32,
    pub purge_completed_after: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            watch_interval: Duration::from_secs(300),
            startup_delay: Duration::from_secs(30),
            max_concurrent: 4,
            heavy_job_limit: 1,
            max_attempts: 3,
            purge_completed_after: Duration::from_secs(72 * 3600),
        }
    }
}

impl SchedulerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let heavy_job_limit = env_or("SCHEDULER_HEAVY_JOB_LIMIT", defaults.heavy_job_limit);

        Self {
            watch_interval: Duration::from_secs(env_or(
                "SCHEDULER_WATCH_INTERVAL_SECS",
                defaults.watch_interval.as_secs(),
            )),
            startup_delay: Duration::from_secs(env_or(
                "SCHEDULER_STARTUP_DELAY_SECS",
                defaults.startup_delay.as_secs(),
            )),
            max_concurrent: env_or("SCHEDULER_MAX_CONCURRENT", defaults.max_concurrent),
            // An unset or zero heavy limit still admits one heavy job at a time
            heavy_job_limit: heavy_job_limit.max(1),
            max_attempts: env_or("SCHEDULER_MAX_ATTEMPTS", defaults.max_attempts),
            purge_completed_after: Duration::from_secs(
                env_or::<u64>("SCHEDULER_PURGE_COMPLETED_HOURS", 72) * 3600,
            ),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_concurrent == 0 {
            return Err("SCHEDULER_MAX_CONCURRENT must be at least 1".to_string());
        }
        if self.heavy_job_limit == 0 {
            return Err("SCHEDULER_HEAVY_JOB_LIMIT must be at least 1".to_string());
        }
        if self.max_attempts < 1 {
            return Err("SCHEDULER_MAX_ATTEMPTS must be at least 1".to_string());
        }
        if self.watch_interval.is_zero() {
            return Err("SCHEDULER_WATCH_INTERVAL_SECS must be greater than 0".to_string());
        }
        Ok(())
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = SchedulerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.heavy_job_limit, 1);
        assert_eq!(config.max_attempts, 3);
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let config = SchedulerConfig {
            max_concurrent: 0,
            ..SchedulerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let config = SchedulerConfig {
            max_attempts: 0,
            ..SchedulerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_or_falls_back_on_garbage() {
        std::env::set_var("TICKERFRESH_TEST_GARBAGE", "not-a-number");
        assert_eq!(env_or("TICKERFRESH_TEST_GARBAGE", 7usize), 7);
        std::env::set_var("TICKERFRESH_TEST_NUMBER", " 12 ");
        assert_eq!(env_or("TICKERFRESH_TEST_NUMBER", 7usize), 12);
    }
}
