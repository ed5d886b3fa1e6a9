use reqwest::Url;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub backend_url: Url,
    pub request_timeout: Duration,
    pub log_level: Level,
    pub learner_email: Option<String>,
    pub learner_password: Option<String>,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let backend_url_str =
            std::env::var("BACKEND_URL").unwrap_or_else(|_| "http://localhost:5000".to_string());
        let backend_url = Url::parse(&backend_url_str)
            .map_err(|e| ConfigError::InvalidValue("BACKEND_URL".to_string(), e.to_string()))?;
        if !matches!(backend_url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidValue(
                "BACKEND_URL".to_string(),
                format!("'{}' is not an http(s) URL", backend_url_str),
            ));
        }

        let timeout_str = std::env::var("REQUEST_TIMEOUT_SECS").unwrap_or_else(|_| "30".to_string());
        let request_timeout = match timeout_str.parse::<u64>() {
            Ok(secs) if secs > 0 => Duration::from_secs(secs),
            _ => {
                return Err(ConfigError::InvalidValue(
                    "REQUEST_TIMEOUT_SECS".to_string(),
                    format!("'{}' is not a positive number of seconds", timeout_str),
                ));
            }
        };

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let learner_email = std::env::var("LEARNER_EMAIL").ok().filter(|v| !v.is_empty());
        let learner_password = std::env::var("LEARNER_PASSWORD").ok().filter(|v| !v.is_empty());

        Ok(Self {
            backend_url,
            request_timeout,
            log_level,
            learner_email,
            learner_password,
        })
    }

    /// The learner's login, required by every authenticated command.
    pub fn credentials(&self) -> Result<(&str, &str), ConfigError> {
        let email = self
            .learner_email
            .as_deref()
            .ok_or_else(|| ConfigError::MissingVar("LEARNER_EMAIL".to_string()))?;
        let password = self
            .learner_password
            .as_deref()
            .ok_or_else(|| ConfigError::MissingVar("LEARNER_PASSWORD".to_string()))?;
        Ok((email, password))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    fn clear_env_vars() {
        unsafe {
            env::remove_var("BACKEND_URL");
            env::remove_var("REQUEST_TIMEOUT_SECS");
            env::remove_var("RUST_LOG");
            env::remove_var("LEARNER_EMAIL");
            env::remove_var("LEARNER_PASSWORD");
        }
    }

    #[test]
    fn test_config_error_display() {
        let missing_var = ConfigError::MissingVar("TEST_VAR".to_string());
        assert_eq!(
            format!("{}", missing_var),
            "Missing environment variable: TEST_VAR"
        );

        let invalid_value =
            ConfigError::InvalidValue("TEST_VAR".to_string(), "bad_value".to_string());
        assert_eq!(
            format!("{}", invalid_value),
            "Invalid value for environment variable TEST_VAR: bad_value"
        );
    }

    #[test]
    #[serial]
    fn test_config_defaults() {
        clear_env_vars();

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.backend_url.as_str(), "http://localhost:5000/");
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.log_level, Level::INFO);
        assert_eq!(config.learner_email, None);
        assert_eq!(config.learner_password, None);
    }

    #[test]
    #[serial]
    fn test_config_custom_values() {
        clear_env_vars();
        unsafe {
            env::set_var("BACKEND_URL", "https://skillpath.example/app/");
            env::set_var("REQUEST_TIMEOUT_SECS", "5");
            env::set_var("RUST_LOG", "debug");
            env::set_var("LEARNER_EMAIL", "ada@example.test");
            env::set_var("LEARNER_PASSWORD", "hunter2");
        }

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.backend_url.as_str(), "https://skillpath.example/app/");
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.log_level, Level::DEBUG);
        assert_eq!(
            config.credentials().unwrap(),
            ("ada@example.test", "hunter2")
        );
    }

    #[test]
    #[serial]
    fn test_config_invalid_backend_url() {
        clear_env_vars();
        unsafe {
            env::set_var("BACKEND_URL", "not a url");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "BACKEND_URL"),
            _ => panic!("Expected InvalidValue for BACKEND_URL"),
        }

        unsafe {
            env::set_var("BACKEND_URL", "ftp://skillpath.example");
        }
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::InvalidValue(_, _))
        ));
    }

    #[test]
    #[serial]
    fn test_config_invalid_timeout() {
        clear_env_vars();
        for value in ["0", "-3", "soon"] {
            unsafe {
                env::set_var("REQUEST_TIMEOUT_SECS", value);
            }
            let err = Config::from_env().unwrap_err();
            match err {
                ConfigError::InvalidValue(var, _) => assert_eq!(var, "REQUEST_TIMEOUT_SECS"),
                _ => panic!("Expected InvalidValue for REQUEST_TIMEOUT_SECS"),
            }
        }
    }

    #[test]
    #[serial]
    fn test_config_invalid_log_level() {
        clear_env_vars();
        unsafe {
            env::set_var("RUST_LOG", "not-a-level");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "RUST_LOG"),
            _ => panic!("Expected InvalidValue for RUST_LOG"),
        }
    }

    #[test]
    #[serial]
    fn test_credentials_require_both_vars() {
        clear_env_vars();
        unsafe {
            env::set_var("LEARNER_EMAIL", "ada@example.test");
        }

        let config = Config::from_env().unwrap();
        match config.credentials().unwrap_err() {
            ConfigError::MissingVar(var) => assert_eq!(var, "LEARNER_PASSWORD"),
            _ => panic!("Expected MissingVar for LEARNER_PASSWORD"),
        }
    }
}
