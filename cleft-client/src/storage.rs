use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{ClientError, Result};

/// Key under which the bearer token is persisted.
pub const TOKEN_KEY: &str = "cleft_assist_token";

/// Durable, device-local storage for the bearer token.
///
/// Only the session store and the gateway's authorization interceptor write
/// through this trait; every other component only reads.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn load(&self) -> Result<Option<String>>;
    async fn save(&self, token: &str) -> Result<()>;
    async fn clear(&self) -> Result<()>;
}

/// In-memory implementation of TokenStore
pub struct InMemoryTokenStore {
    entries: Arc<DashMap<String, String>>,
}

impl InMemoryTokenStore {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
        }
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        let store = Self::new();
        store.entries.insert(TOKEN_KEY.to_string(), token.into());
        store
    }

    /// Synchronous read, for callers that cannot await
    pub fn peek(&self) -> Option<String> {
        self.entries.get(TOKEN_KEY).map(|entry| entry.clone())
    }
}

impl Default for InMemoryTokenStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn load(&self) -> Result<Option<String>> {
        Ok(self.entries.get(TOKEN_KEY).map(|entry| entry.clone()))
    }

    async fn save(&self, token: &str) -> Result<()> {
        self.entries.insert(TOKEN_KEY.to_string(), token.to_string());
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.entries.remove(TOKEN_KEY);
        Ok(())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct TokenFile {
    #[serde(rename = "cleft_assist_token", default)]
    token: Option<String>,
}

/// JSON-file implementation of TokenStore, survives process restarts.
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<data dir>/cleft-assist/session.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::data_dir().map(|dir| dir.join("cleft-assist").join("session.json"))
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    async fn write(&self, file: &TokenFile) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(file)
            .map_err(|e| ClientError::Storage(e.to_string()))?;
        tokio::fs::write(&self.path, json).await?;
        debug!("Saved token file to {:?}", self.path);
        Ok(())
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn load(&self) -> Result<Option<String>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_str::<TokenFile>(&content) {
            Ok(file) => Ok(file.token.filter(|t| !t.is_empty())),
            Err(e) => {
                // A corrupt file is treated as "no token" so the user can log in again
                warn!("Failed to parse token file {:?}: {}", self.path, e);
                Ok(None)
            }
        }
    }

    async fn save(&self, token: &str) -> Result<()> {
        self.write(&TokenFile {
            token: Some(token.to_string()),
        })
        .await
    }

    async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_store() {
        let store = InMemoryTokenStore::new();
        assert!(store.load().await.unwrap().is_none());

        store.save("abc").await.unwrap();
        assert_eq!(store.load().await.unwrap().as_deref(), Some("abc"));

        store.clear().await.unwrap();
        store.clear().await.unwrap();
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("session.json");

        FileTokenStore::new(&path).save("jwt-token").await.unwrap();

        let reopened = FileTokenStore::new(&path);
        assert_eq!(reopened.load().await.unwrap().as_deref(), Some("jwt-token"));

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains(TOKEN_KEY));

        reopened.clear().await.unwrap();
        assert!(reopened.load().await.unwrap().is_none());
        reopened.clear().await.unwrap();
    }

    #[tokio::test]
    async fn test_file_store_ignores_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, "not json").unwrap();

        let store = FileTokenStore::new(&path);
        assert!(store.load().await.unwrap().is_none());
    }
}
