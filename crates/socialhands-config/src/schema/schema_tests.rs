use super::*;
use chrono::NaiveTime;

#[test]
fn test_default_config() {
    let config = Config::default();
    assert_eq!(config.server.host, "127.0.0.1");
    assert_eq!(config.queue.max_attempts, 3);
    assert_eq!(config.heartbeat.interval_secs, 10);
    assert_eq!(config.scheduler.strategy, "balanced");
    assert_eq!(config.browser.debug_port, 9222);
    assert!(config.api.users.is_empty());
    assert!(config.storage.db_path.ends_with("socialhands.db"));
}

#[test]
fn test_scheduler_window() {
    let config = SchedulerConfig::default();
    let (start, end) = config.window().unwrap();
    assert_eq!(start, NaiveTime::from_hms_opt(8, 0, 0).unwrap());
    assert_eq!(end, NaiveTime::from_hms_opt(22, 0, 0).unwrap());
}

#[test]
fn test_scheduler_window_invalid() {
    let config = SchedulerConfig {
        day_start: "8am".to_string(),
        ..Default::default()
    };
    let err = config.window().unwrap_err();
    assert!(err.to_string().contains("scheduler.day_start"));
}

#[test]
fn test_content_config_deserialize() {
    let config: Config = toml::from_str(
        r#"
        [content]
        drafts = ["hello world"]
        follow_targets = ["rustlang"]
        "#,
    )
    .unwrap();
    assert_eq!(config.content.drafts, vec!["hello world"]);
    assert_eq!(config.content.follow_targets, vec!["rustlang"]);
    assert!(config.content.scrape_sources.is_empty());
}

#[test]
fn test_config_serialize_roundtrip_keeps_defaults() {
    let config = Config::default();
    let text = toml::to_string(&config).unwrap();
    let parsed: Config = toml::from_str(&text).unwrap();
    assert_eq!(parsed.queue.retry_max_delay_ms, config.queue.retry_max_delay_ms);
}
