//! Configuration loader.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

use crate::error::ConfigError;
use crate::schema::Config;

static ENV_VAR_RE: OnceLock<Regex> = OnceLock::new();

/// Configuration loader with environment variable substitution.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let content = fs::read_to_string(path)?;
        Self::load_str(&content)
    }

    /// Load configuration from a file if it exists, otherwise use defaults.
    pub fn load_or_default(path: &Path) -> Result<Config, ConfigError> {
        match Self::load(path) {
            Err(ConfigError::NotFound(_)) => Ok(Config::default()),
            other => other,
        }
    }

    /// Load configuration from a string.
    pub fn load_str(content: &str) -> Result<Config, ConfigError> {
        let expanded = Self::expand_env_vars(content)?;
        let mut config: Config = toml::from_str(&expanded)?;
        config.storage.db_path = Self::expand_path(&config.storage.db_path);
        config.browser.profile_dir = Self::expand_path(&config.browser.profile_dir);
        config.browser.screenshot_dir = Self::expand_path(&config.browser.screenshot_dir);
        Ok(config)
    }

    /// Expand environment variables in the format `${VAR}`.
    fn expand_env_vars(content: &str) -> Result<String, ConfigError> {
        let re = ENV_VAR_RE.get_or_init(|| {
            Regex::new(r"\$\{([^}]+)\}").expect("env var pattern is valid")
        });

        let mut result = content.to_string();
        for cap in re.captures_iter(content) {
            let var_name = &cap[1];
            let var_value = std::env::var(var_name)
                .map_err(|_| ConfigError::EnvVarNotSet(var_name.to_string()))?;
            result = result.replace(&cap[0], &var_value);
        }

        Ok(result)
    }

    /// Expand shell-style paths (e.g., `~/.socialhands`).
    pub fn expand_path(path: &Path) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_empty_config() {
        let config = ConfigLoader::load_str("").unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.queue.max_attempts, 3);
        assert_eq!(config.heartbeat.stale_after_secs, 30);
    }

    #[test]
    fn test_load_basic_config() {
        let content = r#"
            [server]
            host = "0.0.0.0"
            port = 3000

            [queue]
            max_attempts = 5
            poll_interval_ms = 500
        "#;
        let config = ConfigLoader::load_str(content).unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.queue.max_attempts, 5);
        assert_eq!(config.queue.poll_interval_ms, 500);
        assert_eq!(config.queue.retry_base_delay_ms, 2000);
    }

    #[test]
    fn test_load_users() {
        let content = r#"
            [[api.users]]
            token = "secret"
            user_id = "operator"
            permissions = ["operate", "admin"]
        "#;
        let config = ConfigLoader::load_str(content).unwrap();
        assert_eq!(config.api.users.len(), 1);
        assert_eq!(config.api.users[0].user_id, "operator");
        assert_eq!(config.api.users[0].permissions.len(), 2);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[scheduler]").unwrap();
        writeln!(file, "strategy = \"growth\"").unwrap();

        let config = ConfigLoader::load(file.path()).unwrap();
        assert_eq!(config.scheduler.strategy, "growth");
    }

    #[test]
    fn test_load_expands_tilde_paths() {
        let config = ConfigLoader::load_str("[storage]\ndb_path = \"~/agent.db\"").unwrap();
        assert!(!config.storage.db_path.to_string_lossy().starts_with('~'));
        assert!(config.storage.db_path.ends_with("agent.db"));
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = ConfigLoader::load(Path::new("/nonexistent/path/socialhands.toml"));
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config =
            ConfigLoader::load_or_default(Path::new("/nonexistent/path/socialhands.toml")).unwrap();
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn test_load_invalid_toml() {
        let result = ConfigLoader::load_str("invalid = [unclosed");
        assert!(result.is_err());
    }

    #[test]
    fn test_expand_env_vars() {
        // SAFETY: test-only variable name, not read elsewhere
        unsafe {
            std::env::set_var("SOCIALHANDS_TEST_TOKEN", "tok-123");
        }
        let content = "[[api.users]]\ntoken = \"${SOCIALHANDS_TEST_TOKEN}\"\nuser_id = \"me\"";
        let config = ConfigLoader::load_str(content).unwrap();
        assert_eq!(config.api.users[0].token, "tok-123");
        unsafe {
            std::env::remove_var("SOCIALHANDS_TEST_TOKEN");
        }
    }

    #[test]
    fn test_expand_env_vars_not_set() {
        let content = "value = \"${NONEXISTENT_SOCIALHANDS_VAR_12345}\"";
        let result = ConfigLoader::expand_env_vars(content);
        assert!(matches!(result, Err(ConfigError::EnvVarNotSet(_))));
    }

    #[test]
    fn test_expand_path_with_tilde() {
        let expanded = ConfigLoader::expand_path(Path::new("~/test"));
        assert!(!expanded.to_string_lossy().starts_with('~'));
        assert!(expanded.ends_with("test"));
    }

    #[test]
    fn test_expand_path_no_tilde() {
        let expanded = ConfigLoader::expand_path(Path::new("/usr/local/bin"));
        assert_eq!(expanded, PathBuf::from("/usr/local/bin"));
    }
}
