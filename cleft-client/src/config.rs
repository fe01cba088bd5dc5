use std::path::PathBuf;
use std::time::Duration;

use crate::error::{ClientError, Result};
use crate::storage::FileTokenStore;

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000/api/v1";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

/// Client settings, normally read from the environment.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Versioned API root, without a trailing slash
    pub api_base_url: String,
    pub token_path: PathBuf,
    pub request_timeout: Duration,
}

impl ClientConfig {
    pub fn new(api_base_url: &str, token_path: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self {
            api_base_url: normalize_base_url(api_base_url)?,
            token_path: token_path.into(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        })
    }

    /// Reads `CLEFT_API_BASE_URL`, `CLEFT_TOKEN_PATH` and
    /// `CLEFT_REQUEST_TIMEOUT_SECS`, falling back to defaults.
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var("CLEFT_API_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_API_BASE_URL.to_string());

        let token_path = match std::env::var("CLEFT_TOKEN_PATH") {
            Ok(path) => PathBuf::from(path),
            Err(_) => FileTokenStore::default_path().ok_or_else(|| {
                ClientError::Config(
                    "No data directory available, set CLEFT_TOKEN_PATH".to_string(),
                )
            })?,
        };

        let timeout_secs = std::env::var("CLEFT_REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS);

        let mut config = Self::new(&base_url, token_path)?;
        config.request_timeout = Duration::from_secs(timeout_secs);
        Ok(config)
    }

    pub fn with_base_url(mut self, api_base_url: &str) -> Result<Self> {
        self.api_base_url = normalize_base_url(api_base_url)?;
        Ok(self)
    }
}

fn normalize_base_url(raw: &str) -> Result<String> {
    let cleaned = raw.trim().trim_end_matches('/');
    if !(cleaned.starts_with("http://") || cleaned.starts_with("https://")) {
        return Err(ClientError::Config(format!(
            "API base URL must use http or https, got: {}",
            raw
        )));
    }
    Ok(cleaned.to_string())
}
