use std::path::PathBuf;

use async_trait::async_trait;

use super::SyncError;
use crate::core::tab::RawTab;

/// Enumerates currently open tabs.
#[async_trait]
pub trait TabSource: Send + Sync {
    async fn query(&self) -> Result<Vec<RawTab>, SyncError>;
}

/// Reads the tab list the browser bridge exports as a JSON array.
pub struct FileTabSource {
    path: PathBuf,
}

impl FileTabSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl TabSource for FileTabSource {
    async fn query(&self) -> Result<Vec<RawTab>, SyncError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("No tab export at {}", self.path.display());
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&content)
            .map_err(|e| SyncError::Tabs(format!("{}: {}", self.path.display(), e)))
    }
}

/// Fixed tab list.
#[derive(Default)]
pub struct StaticTabSource {
    tabs: Vec<RawTab>,
}

impl StaticTabSource {
    pub fn new(tabs: Vec<RawTab>) -> Self {
        Self { tabs }
    }
}

#[async_trait]
impl TabSource for StaticTabSource {
    async fn query(&self) -> Result<Vec<RawTab>, SyncError> {
        Ok(self.tabs.clone())
    }
}
