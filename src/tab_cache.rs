//! Local cache for open tabs and the last-active session.
//!
//! A small JSON file, read once on startup and rewritten on every tab-list
//! change, so the tab bar survives a process restart without a round trip
//! to the durable store. It is a cache, not a system of record: a missing
//! or corrupt file degrades to the empty state.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One cached tab: enough to render the tab bar before any store call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedTab {
    pub id: String,
    pub title: String,
}

/// Cached tab-bar state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedTabs {
    pub open_tabs: Vec<CachedTab>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_session_id: Option<String>,
}

/// File-backed cache with an explicit load/save/clear lifecycle.
#[derive(Debug, Clone)]
pub struct TabCache {
    path: PathBuf,
}

impl TabCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Read the cached state; any failure degrades to the default.
    pub async fn load(&self) -> CachedTabs {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!(path = %self.path.display(), error = %e, "corrupt tab cache, starting empty");
                CachedTabs::default()
            }),
            Err(_) => CachedTabs::default(),
        }
    }

    /// Write the cached state.
    pub async fn save(&self, state: &CachedTabs) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, serde_json::to_string(state)?).await?;
        Ok(())
    }

    /// Remove the cache file; absence is not an error.
    pub async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
