use intake::config::{Config as IntakeConfig, ValidationError};
use recordstore::config::RecordStoreType;
use serde::Deserialize;
use std::fs::File;
use std::path::Path;

const DEFAULT_STATSD_PORT: u16 = 8125;

fn default_statsd_port() -> u16 {
    DEFAULT_STATSD_PORT
}

#[derive(Debug, Deserialize)]
pub struct MetricsConfig {
    pub statsd_host: String,
    #[serde(default = "default_statsd_port")]
    pub statsd_port: u16,
}

#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    pub sentry_dsn: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CommonConfig {
    pub metrics: Option<MetricsConfig>,
    pub logging: Option<LoggingConfig>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    #[serde(flatten)]
    pub common: CommonConfig,
    pub intake: IntakeConfig,
    pub record_store: RecordStoreType,
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        let data = serde_yaml::from_reader(file)?;

        Ok(data)
    }

    /// File (or defaults), then the process environment, then validation.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Config::from_file(path)?,
            None => Config::default(),
        };
        config.apply_env(|name| std::env::var(name).ok())?;
        config.intake.validate()?;

        Ok(config)
    }

    /// Applies the supported environment overrides. Empty values count as unset.
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        let var = |name: &str| lookup(name).filter(|value| !value.is_empty());

        if let Some(port) = var("PORT") {
            self.intake.listener.port = port
                .parse()
                .map_err(|_| ConfigError::InvalidEnvVar("PORT", port))?;
        }
        if let Some(secret) = var("SESSION_SECRET") {
            self.intake.session.secret = secret;
        }
        if let Some(dsn) = var("SENTRY_DSN") {
            self.common.logging = Some(LoggingConfig { sentry_dsn: dsn });
        }

        if let RecordStoreType::Dynamodb(dynamodb) = &mut self.record_store {
            if let Some(region) = var("AWS_REGION") {
                dynamodb.region = region;
            }
            if let Some(key) = var("AWS_ACCESS_KEY_ID") {
                dynamodb.access_key_id = Some(key);
            }
            if let Some(secret) = var("AWS_SECRET_ACCESS_KEY") {
                dynamodb.secret_access_key = Some(secret);
            }
            if let Some(token) = var("AWS_SESSION_TOKEN") {
                dynamodb.session_token = Some(token);
            }
        }

        Ok(())
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("could not load config from file: {0}")]
    LoadError(#[from] std::io::Error),
    #[error("could not parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),
    #[error("invalid value for {0}: {1:?}")]
    InvalidEnvVar(&'static str, String),
    #[error("invalid config: {0}")]
    Invalid(#[from] ValidationError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use intake::config::StoreErrorPolicy;
    use std::collections::HashMap;
    use std::io::Write;

    fn write_tmp_file(s: &str) -> tempfile::NamedTempFile {
        let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
        write!(tmp, "{}", s).expect("write yaml");

        tmp
    }

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn full_config() {
        let yaml = r#"
            metrics:
                statsd_host: 127.0.0.1
            logging:
                sentry_dsn: https://public@sentry.example.com/1
            intake:
                listener:
                    host: 127.0.0.1
                    port: 3000
                admin_listener:
                    host: 127.0.0.1
                    port: 3001
                cors:
                    allowed_origins: ["http://localhost:3000"]
                email_store_errors: log_only
            record_store:
                type: filesystem
                base_dir: /var/lib/formdesk
            "#;
        let tmp = write_tmp_file(yaml);
        let config = Config::from_file(tmp.path()).expect("load config");

        let metrics = config.common.metrics.expect("metrics config");
        assert_eq!(metrics.statsd_host, "127.0.0.1");
        assert_eq!(metrics.statsd_port, 8125);
        assert!(config.common.logging.is_some());

        assert_eq!(config.intake.listener.port, 3000);
        assert_eq!(config.intake.admin_listener.unwrap().port, 3001);
        assert_eq!(config.intake.cors.allowed_origins, vec!["http://localhost:3000"]);
        assert_eq!(config.intake.email_store_errors, StoreErrorPolicy::LogOnly);
        // Unset sections keep their defaults
        assert_eq!(config.intake.session.max_age_secs, 600);
        assert_eq!(
            config.record_store,
            RecordStoreType::Filesystem {
                base_dir: "/var/lib/formdesk".into()
            }
        );
    }

    #[test]
    fn empty_file_uses_defaults() {
        let tmp = write_tmp_file("{}");
        let config = Config::from_file(tmp.path()).expect("load config");
        assert!(config.common.metrics.is_none());
        assert_eq!(config.intake.listener.port, 8080);
        assert!(matches!(config.record_store, RecordStoreType::Dynamodb(_)));
    }

    #[test]
    fn env_overrides() {
        let mut config = Config::default();
        config
            .apply_env(env(&[
                ("PORT", "9090"),
                ("SESSION_SECRET", "s3cret"),
                ("AWS_REGION", "ap-south-1"),
                ("AWS_ACCESS_KEY_ID", "AKID"),
                ("AWS_SECRET_ACCESS_KEY", "shh"),
                ("AWS_SESSION_TOKEN", ""),
                ("SENTRY_DSN", "https://public@sentry.example.com/1"),
            ]))
            .unwrap();

        assert_eq!(config.intake.listener.port, 9090);
        assert_eq!(config.intake.session.secret, "s3cret");
        assert!(config.common.logging.is_some());
        let RecordStoreType::Dynamodb(dynamodb) = &config.record_store else {
            panic!("expected dynamodb store");
        };
        assert_eq!(dynamodb.region, "ap-south-1");
        assert_eq!(dynamodb.access_key_id.as_deref(), Some("AKID"));
        assert_eq!(dynamodb.secret_access_key.as_deref(), Some("shh"));
        assert_eq!(dynamodb.session_token, None);
    }

    #[test]
    fn invalid_port_from_env() {
        let mut config = Config::default();
        let err = config.apply_env(env(&[("PORT", "eighty")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar("PORT", _)));
    }

    #[test]
    fn validation_errors_surface() {
        let tmp = write_tmp_file("intake:\n  listener:\n    host: 0.0.0.0\n    port: 0\n");
        let config = Config::from_file(tmp.path()).expect("load config");
        assert_eq!(
            config.intake.validate(),
            Err(ValidationError::InvalidPort)
        );
    }

    #[test]
    fn missing_file() {
        let err = Config::from_file(Path::new("/nonexistent/formdesk.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::LoadError(_)));
    }
}
