use super::*;
use crate::schema::ApiUser;

fn with_user(mut config: Config) -> Config {
    config.api.users.push(ApiUser {
        token: "t".to_string(),
        user_id: "u".to_string(),
        permissions: vec![],
    });
    config
}

#[test]
fn test_default_config_is_valid() {
    let result = ConfigValidator::validate(&with_user(Config::default()));
    assert!(result.is_valid(), "{:?}", result.errors);
    assert!(result.warnings.is_empty());
}

#[test]
fn test_no_users_warns() {
    let result = ConfigValidator::validate(&Config::default());
    assert!(result.is_valid());
    assert!(result.warnings.iter().any(|w| w.path == "api.users"));
}

#[test]
fn test_zero_attempts_rejected() {
    let mut config = with_user(Config::default());
    config.queue.max_attempts = 0;
    let result = ConfigValidator::validate(&config);
    assert!(result.errors.iter().any(|e| e.path == "queue.max_attempts"));
}

#[test]
fn test_threshold_must_exceed_interval() {
    let mut config = with_user(Config::default());
    config.heartbeat.interval_secs = 30;
    config.heartbeat.stale_after_secs = 30;
    let result = ConfigValidator::validate(&config);
    assert!(result.errors.iter().any(|e| e.path == "heartbeat.stale_after_secs"));
}

#[test]
fn test_inverted_window_rejected() {
    let mut config = with_user(Config::default());
    config.scheduler.day_start = "20:00".to_string();
    config.scheduler.day_end = "09:00".to_string();
    let result = ConfigValidator::validate(&config);
    assert!(result.errors.iter().any(|e| e.path == "scheduler.day_end"));
}

#[test]
fn test_unknown_strategy_rejected() {
    let mut config = with_user(Config::default());
    config.scheduler.strategy = "viral".to_string();
    let result = ConfigValidator::validate(&config);
    assert!(result.errors.iter().any(|e| e.path == "scheduler.strategy"));
}

#[test]
fn test_empty_token_rejected() {
    let mut config = Config::default();
    config.api.users.push(ApiUser {
        token: String::new(),
        user_id: "u".to_string(),
        permissions: vec![],
    });
    let result = ConfigValidator::validate(&config);
    assert!(result.errors.iter().any(|e| e.path == "api.users[0].token"));
}
