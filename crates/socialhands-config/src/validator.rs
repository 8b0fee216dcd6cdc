//! Configuration validation.

use crate::schema::Config;

/// Validation result.
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }
}

/// A validation error.
#[derive(Debug)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// A validation warning.
#[derive(Debug)]
pub struct ValidationWarning {
    pub path: String,
    pub message: String,
}

impl ValidationWarning {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

const STRATEGIES: &[&str] = &["balanced", "growth", "engagement", "content"];

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration.
    pub fn validate(config: &Config) -> ValidationResult {
        let mut result = ValidationResult::default();

        Self::validate_server(config, &mut result);
        Self::validate_queue(config, &mut result);
        Self::validate_heartbeat(config, &mut result);
        Self::validate_scheduler(config, &mut result);
        Self::validate_api(config, &mut result);

        result
    }

    fn validate_server(config: &Config, result: &mut ValidationResult) {
        if config.server.port == 0 {
            result.add_error(ValidationError::new("server.port", "Port cannot be 0"));
        }
        if config.server.host.is_empty() {
            result.add_error(ValidationError::new("server.host", "Host cannot be empty"));
        }
    }

    fn validate_queue(config: &Config, result: &mut ValidationResult) {
        let queue = &config.queue;
        if queue.max_attempts == 0 {
            result.add_error(ValidationError::new(
                "queue.max_attempts",
                "max_attempts must be at least 1",
            ));
        }
        if queue.poll_interval_ms == 0 {
            result.add_error(ValidationError::new(
                "queue.poll_interval_ms",
                "poll interval must be greater than 0",
            ));
        }
        if queue.retry_max_delay_ms < queue.retry_base_delay_ms {
            result.add_warning(ValidationWarning::new(
                "queue.retry_max_delay_ms",
                "max retry delay is below the base delay, every retry uses the max",
            ));
        }
        if queue.job_timeout_secs == 0 {
            result.add_error(ValidationError::new(
                "queue.job_timeout_secs",
                "job timeout must be greater than 0",
            ));
        }
    }

    fn validate_heartbeat(config: &Config, result: &mut ValidationResult) {
        let hb = &config.heartbeat;
        if hb.interval_secs == 0 {
            result.add_error(ValidationError::new(
                "heartbeat.interval_secs",
                "interval must be greater than 0",
            ));
        }
        if hb.stale_after_secs <= hb.interval_secs {
            result.add_error(ValidationError::new(
                "heartbeat.stale_after_secs",
                "staleness threshold must exceed the beat interval",
            ));
        }
    }

    fn validate_scheduler(config: &Config, result: &mut ValidationResult) {
        let scheduler = &config.scheduler;
        match scheduler.window() {
            Ok((start, end)) if end <= start => {
                result.add_error(ValidationError::new(
                    "scheduler.day_end",
                    "day_end must be after day_start",
                ));
            }
            Ok(_) => {}
            Err(e) => result.add_error(ValidationError::new("scheduler", e.to_string())),
        }
        if !STRATEGIES.contains(&scheduler.strategy.as_str()) {
            result.add_error(ValidationError::new(
                "scheduler.strategy",
                format!("unknown strategy '{}'", scheduler.strategy),
            ));
        }
        if scheduler.utc_offset_minutes.abs() > 14 * 60 {
            result.add_error(ValidationError::new(
                "scheduler.utc_offset_minutes",
                "offset must be within +/-14 hours",
            ));
        }
        if scheduler.check_interval_secs == 0 {
            result.add_error(ValidationError::new(
                "scheduler.check_interval_secs",
                "check interval must be greater than 0",
            ));
        }
    }

    fn validate_api(config: &Config, result: &mut ValidationResult) {
        if config.api.users.is_empty() {
            result.add_warning(ValidationWarning::new(
                "api.users",
                "no API users configured, every authenticated endpoint will reject requests",
            ));
        }
        for (i, user) in config.api.users.iter().enumerate() {
            if user.token.is_empty() {
                result.add_error(ValidationError::new(
                    format!("api.users[{}].token", i),
                    "token cannot be empty",
                ));
            }
        }
    }
}

#[cfg(test)]
#[path = "validator_tests.rs"]
mod tests;
