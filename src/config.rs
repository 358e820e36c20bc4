use std::env;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Directory containing the SQLite databases to serve (one `.db` file each)
    pub data_dir: String,

    /// Address the control API binds to, e.g. "127.0.0.1:8080"
    pub bind_addr: String,

    /// Maximum payload size for all requests (in bytes)
    /// Default: 1MB (1024 * 1024)
    pub max_payload_size: usize,

    /// Directory for rotating log files
    pub log_dir: String,

    /// Optional path to a JSON file backing the secret store
    pub secrets_file: Option<String>,
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Required environment variables:
    /// - DATA_DIR: directory of SQLite database files
    ///
    /// Optional environment variables:
    /// - BIND_ADDR: listen address (default: 127.0.0.1:8080)
    /// - MAX_PAYLOAD_SIZE: maximum request payload size in bytes (default: 1048576 = 1MB)
    /// - LOG_DIR: log file directory (default: logs)
    /// - SECRETS_FILE: JSON file backing the secret store (default: none)
    pub fn from_env() -> Result<Self, String> {
        // Load .env file if it exists
        dotenv::dotenv().ok();

        let data_dir = env::var("DATA_DIR")
            .map_err(|_| "DATA_DIR must be set in .env file or environment".to_string())?;

        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string());

        // Parse MAX_PAYLOAD_SIZE with default fallback
        let max_payload_size = env::var("MAX_PAYLOAD_SIZE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(1024 * 1024); // Default: 1MB

        let log_dir = env::var("LOG_DIR").unwrap_or_else(|_| "logs".to_string());

        let secrets_file = env::var("SECRETS_FILE").ok();

        Ok(Config {
            data_dir,
            bind_addr,
            max_payload_size,
            log_dir,
            secrets_file,
        })
    }
}
