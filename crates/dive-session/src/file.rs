// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::warn;

use crate::store::{sort_and_page, ListFilter, SessionStore, StoreError};
use crate::Session;

/// File-backed session store: one JSON document per session.
///
/// Writers serialize on the inner lock; readers share.  A write materialises
/// the full JSON into a sibling temp file and renames it over the target so a
/// crashed write never leaves a truncated session behind.
pub struct FileSessionStore {
    dir: PathBuf,
    lock: RwLock<()>,
}

impl FileSessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            lock: RwLock::new(()),
        }
    }

    /// Store under the default base directory, `~/.dive/sessions`.
    pub fn default_dir() -> Self {
        let dir = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".dive")
            .join("sessions");
        Self::new(dir)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn put(&self, session: &Session) -> Result<(), StoreError> {
        let _guard = self.lock.write().await;
        tokio::fs::create_dir_all(&self.dir).await?;
        let json = serde_json::to_vec_pretty(session)?;
        let target = self.path(&session.id);
        let tmp = self.dir.join(format!("{}.json.tmp", session.id));
        tokio::fs::write(&tmp, &json).await?;
        tokio::fs::rename(&tmp, &target).await?;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Session, StoreError> {
        let _guard = self.lock.read().await;
        let raw = match tokio::fs::read_to_string(self.path(id)).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(id.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_str(&raw)?)
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let _guard = self.lock.write().await;
        match tokio::fs::remove_file(self.path(id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self, filter: ListFilter) -> Result<Vec<Session>, StoreError> {
        let _guard = self.lock.read().await;
        let mut sessions = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(sessions),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let raw = match tokio::fs::read_to_string(&path).await {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable session file");
                    continue;
                }
            };
            match serde_json::from_str::<Session>(&raw) {
                Ok(session) => sessions.push(session),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping malformed session file");
                }
            }
        }
        sort_and_page(&mut sessions, filter);
        Ok(sessions)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
