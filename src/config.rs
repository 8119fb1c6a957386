use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub trino: TrinoConfig,
    pub dataframe: DataFrameConfig,
    pub logging: LoggingConfig,
}

/// Connection settings shared by every query-service example
#[derive(Debug, Clone, Deserialize)]
pub struct TrinoConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub catalog: Option<String>,
    pub schema: Option<String>,
    pub http_scheme: Option<String>,
    pub request_timeout_secs: u64,
    pub auth_user: String,
    pub auth_password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DataFrameConfig {
    pub app_name: String,
    pub output_path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        // Pick up a .env file before reading variables
        let _ = dotenv::dotenv();

        let mut builder = config::Config::builder()
            .set_default("trino.host", "localhost")?
            .set_default("trino.port", 8080)?
            .set_default("trino.user", "trino")?
            .set_default("trino.catalog", "mysql")?
            .set_default("trino.schema", "example")?
            .set_default("trino.request_timeout_secs", 30)?
            .set_default("trino.auth_user", "admin")?
            .set_default("trino.auth_password", "password")?
            .set_default("dataframe.app_name", "Lakehouse on k3d")?
            .set_default("dataframe.output_path", "s3a://spark-data/sample-data")?
            .set_default("logging.level", "info")?;

        let overrides = [
            ("TRINO_HOST", "trino.host"),
            ("TRINO_USER", "trino.user"),
            ("TRINO_CATALOG", "trino.catalog"),
            ("TRINO_SCHEMA", "trino.schema"),
            ("TRINO_HTTP_SCHEME", "trino.http_scheme"),
            ("TRINO_AUTH_USER", "trino.auth_user"),
            ("TRINO_AUTH_PASSWORD", "trino.auth_password"),
            ("DATAFRAME_APP_NAME", "dataframe.app_name"),
            ("DATAFRAME_OUTPUT_PATH", "dataframe.output_path"),
            ("RUST_LOG", "logging.level"),
        ];
        for (var, key) in overrides {
            if let Ok(value) = env::var(var) {
                builder = builder.set_override(key, value)?;
            }
        }

        if let Ok(port) = env::var("TRINO_PORT") {
            let port = port.parse::<u16>().map_err(|e| {
                config::ConfigError::Message(format!("TRINO_PORT must be a port number: {}", e))
            })?;
            builder = builder.set_override("trino.port", port)?;
        }

        if let Ok(timeout) = env::var("TRINO_REQUEST_TIMEOUT_SECS") {
            let timeout = timeout.parse::<u64>().map_err(|e| {
                config::ConfigError::Message(format!(
                    "TRINO_REQUEST_TIMEOUT_SECS must be a number of seconds: {}",
                    e
                ))
            })?;
            builder = builder.set_override("trino.request_timeout_secs", timeout)?;
        }

        builder.build()?.try_deserialize()
    }
}

impl TrinoConfig {
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
