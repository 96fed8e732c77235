use std::env;

/// Which record store backs the API
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    MySql,
    Memory,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("unknown STORE_BACKEND: {0} (expected \"mysql\" or \"memory\")")]
    UnknownBackend(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub store_backend: StoreBackend,
    pub http_port: u16,
    pub log_level: String,
    pub log_dir: String,
    pub log_retention_days: u64,
    pub tls_cert_path: Option<String>,
    pub tls_key_path: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if exists
        dotenvy::dotenv().ok();

        let database_url = env::var("DATABASE_URL").unwrap_or_else(|_| {
            let db_host = env::var("RDB_HOST").unwrap_or_else(|_| "localhost".to_string());
            let db_port = env::var("RDB_PORT").unwrap_or_else(|_| "3306".to_string());
            let db_user = env::var("RDB_USER").unwrap_or_else(|_| "root".to_string());
            let db_password = env::var("RDB_PASSWORD").unwrap_or_else(|_| "".to_string());
            let db_name = env::var("RDB_NAME").unwrap_or_else(|_| "db".to_string());

            format!(
                "mysql://{}:{}@{}:{}/{}",
                db_user, db_password, db_host, db_port, db_name
            )
        });

        let store_backend = parse_backend(
            &env::var("STORE_BACKEND").unwrap_or_else(|_| "mysql".to_string()),
        )?;

        let http_port = env::var("HTTP_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8080);

        let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let log_dir = env::var("LOG_DIR").unwrap_or_else(|_| "logs".to_string());
        let log_retention_days = env::var("LOG_RETENTION_DAYS")
            .ok()
            .and_then(|d| d.parse().ok())
            .unwrap_or(7);

        let tls_cert_path = env::var("TLS_CERT_PATH").ok();
        let tls_key_path = env::var("TLS_KEY_PATH").ok();

        Ok(Config {
            database_url,
            store_backend,
            http_port,
            log_level,
            log_dir,
            log_retention_days,
            tls_cert_path,
            tls_key_path,
        })
    }
}

fn parse_backend(value: &str) -> Result<StoreBackend, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "mysql" => Ok(StoreBackend::MySql),
        "memory" => Ok(StoreBackend::Memory),
        other => Err(ConfigError::UnknownBackend(other.to_string())),
    }
}
