use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sqlx::postgres::PgConnectOptions;
use tokio::net::TcpListener;

use crate::error::{LabError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub bridge: BridgeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub user: String,
    pub host: String,
    pub port: u16,
    pub name: String,
    #[serde(skip_serializing)]
    pub password: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

/// Settings for the external training project and how it is invoked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Interpreter used to run the project's scripts.
    pub interpreter: String,
    /// Root of the external project; scripts run with this as cwd.
    pub project_root: PathBuf,
    /// Base run configuration, relative to `project_root`.
    pub base_config: PathBuf,
    pub train_script: String,
    pub evaluate_script: String,
    /// Model artifact reported by training and used as the evaluation default.
    pub model_path: String,
    /// Leave the materialized run config on disk when a run fails.
    pub keep_config_on_failure: bool,
    /// Kill the external process after this many seconds. Unset means no limit.
    pub timeout_secs: Option<u64>,
    /// Keep at most this many trailing bytes of each output stream.
    pub max_output_bytes: Option<usize>,
    /// Reject a run while another run for the same experiment is in flight.
    pub exclusive_runs: bool,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    4000
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    2
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            user: "user".to_string(),
            host: "localhost".to_string(),
            port: 5432,
            name: "lccde_db".to_string(),
            password: String::new(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
        }
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            interpreter: "python".to_string(),
            project_root: PathBuf::from("../lccde_project"),
            base_config: PathBuf::from("configs/base.yaml"),
            train_script: "scripts/train.py".to_string(),
            evaluate_script: "scripts/evaluate.py".to_string(),
            model_path: "artifacts/model.joblib".to_string(),
            keep_config_on_failure: true,
            timeout_secs: None,
            max_output_bytes: None,
            exclusive_runs: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: default_host(),
                port: default_port(),
            },
            database: DatabaseConfig::default(),
            bridge: BridgeConfig::default(),
        }
    }
}

impl Config {
    /// Loads configuration from environment variables, falling back to the
    /// defaults for anything unset.
    ///
    /// # Errors
    ///
    /// Returns `LabError::Config` if a variable is set but cannot be parsed.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();
        let text = |key: &str, default: String| lookup(key).unwrap_or(default);

        let server = ServerConfig {
            host: text("HOST", defaults.server.host),
            port: parse_or(&lookup, "PORT", defaults.server.port)?,
        };

        let database = DatabaseConfig {
            user: text("DB_USER", defaults.database.user),
            host: text("DB_HOST", defaults.database.host),
            port: parse_or(&lookup, "DB_PORT", defaults.database.port)?,
            name: text("DB_NAME", defaults.database.name),
            password: text("DB_PASSWORD", defaults.database.password),
            max_connections: parse_or(
                &lookup,
                "DB_MAX_CONNECTIONS",
                defaults.database.max_connections,
            )?,
            min_connections: parse_or(
                &lookup,
                "DB_MIN_CONNECTIONS",
                defaults.database.min_connections,
            )?,
        };

        let bridge_defaults = defaults.bridge;
        let bridge = BridgeConfig {
            interpreter: text("PYTHON_PATH", bridge_defaults.interpreter),
            project_root: lookup("LCCDE_PROJECT_PATH")
                .map(PathBuf::from)
                .unwrap_or(bridge_defaults.project_root),
            base_config: lookup("LCCDE_BASE_CONFIG")
                .map(PathBuf::from)
                .unwrap_or(bridge_defaults.base_config),
            train_script: bridge_defaults.train_script,
            evaluate_script: bridge_defaults.evaluate_script,
            model_path: text("LCCDE_MODEL_PATH", bridge_defaults.model_path),
            keep_config_on_failure: parse_or(
                &lookup,
                "KEEP_CONFIG_ON_FAILURE",
                bridge_defaults.keep_config_on_failure,
            )?,
            timeout_secs: parse_opt(&lookup, "TRAINING_TIMEOUT_SECS")?,
            max_output_bytes: parse_opt(&lookup, "MAX_PROCESS_OUTPUT_BYTES")?,
            exclusive_runs: parse_or(&lookup, "EXCLUSIVE_RUNS", bridge_defaults.exclusive_runs)?,
        };

        Ok(Self {
            server,
            database,
            bridge,
        })
    }
}

impl DatabaseConfig {
    /// Connection options for the configured Postgres instance.
    pub fn connect_options(&self) -> PgConnectOptions {
        let options = PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .database(&self.name);

        if self.password.is_empty() {
            options
        } else {
            options.password(&self.password)
        }
    }
}

impl ServerConfig {
    /// Binds the listener. `host` may be a name such as `localhost`.
    pub async fn bind(&self) -> Result<TcpListener> {
        Ok(TcpListener::bind((self.host.as_str(), self.port)).await?)
    }
}

impl BridgeConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    /// Absolute-or-relative path of the base run configuration.
    pub fn base_config_path(&self) -> PathBuf {
        self.project_root.join(&self.base_config)
    }

    /// Directory where per-run configs are written.
    pub fn run_config_dir(&self) -> PathBuf {
        self.project_root.join("configs")
    }
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    Ok(parse_opt(lookup, key)?.unwrap_or(default))
}

fn parse_opt<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| LabError::config(format!("{key}={raw}: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.server.port, 4000);
        assert_eq!(config.database.name, "lccde_db");
        assert_eq!(config.bridge.interpreter, "python");
        assert!(config.bridge.keep_config_on_failure);
        assert!(config.bridge.timeout().is_none());
        assert!(!config.bridge.exclusive_runs);
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = Config::from_lookup(lookup_from(&[
            ("PORT", "5050"),
            ("DB_HOST", "db.internal"),
            ("DB_PASSWORD", "s3cr3t"),
            ("PYTHON_PATH", "/opt/venv/bin/python"),
            ("LCCDE_PROJECT_PATH", "/srv/lccde"),
            ("TRAINING_TIMEOUT_SECS", "900"),
            ("KEEP_CONFIG_ON_FAILURE", "false"),
            ("EXCLUSIVE_RUNS", "true"),
        ]))
        .unwrap();

        assert_eq!(config.server.port, 5050);
        assert_eq!(config.database.host, "db.internal");
        assert_eq!(config.database.password, "s3cr3t");
        assert_eq!(config.bridge.interpreter, "/opt/venv/bin/python");
        assert_eq!(
            config.bridge.base_config_path(),
            PathBuf::from("/srv/lccde/configs/base.yaml")
        );
        assert_eq!(config.bridge.timeout(), Some(Duration::from_secs(900)));
        assert!(!config.bridge.keep_config_on_failure);
        assert!(config.bridge.exclusive_runs);
    }

    #[test]
    fn test_malformed_value_is_config_error() {
        let err = Config::from_lookup(lookup_from(&[("DB_PORT", "five")])).unwrap_err();
        assert!(matches!(err, LabError::Config(_)));
        assert!(err.to_string().contains("DB_PORT"));
    }

    #[test]
    fn test_blank_optional_value_is_unset() {
        let config =
            Config::from_lookup(lookup_from(&[("MAX_PROCESS_OUTPUT_BYTES", "  ")])).unwrap();
        assert!(config.bridge.max_output_bytes.is_none());
    }

    #[tokio::test]
    async fn test_bind_accepts_hostname() {
        let server = ServerConfig {
            host: "localhost".to_string(),
            port: 0,
        };

        let listener = server.bind().await.unwrap();
        assert!(listener.local_addr().unwrap().ip().is_loopback());
    }

    #[test]
    fn test_password_not_serialized() {
        let mut config = Config::default();
        config.database.password = "hunter2".to_string();
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("hunter2"));
    }
}
