// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::Session;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("session \"{0}\" not found")]
    NotFound(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}

/// Pagination window for [`SessionStore::list`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ListFilter {
    pub offset: usize,
    pub limit: Option<usize>,
}

/// Persistence seam for sessions.
///
/// `list` returns sessions ordered by `updated_at` descending.  `delete` is
/// idempotent.  `fork` deep-copies the source under a fresh id and stores it.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn put(&self, session: &Session) -> Result<(), StoreError>;
    async fn get(&self, id: &str) -> Result<Session, StoreError>;
    async fn delete(&self, id: &str) -> Result<(), StoreError>;
    async fn list(&self, filter: ListFilter) -> Result<Vec<Session>, StoreError>;

    async fn fork(&self, source_id: &str) -> Result<Session, StoreError> {
        let source = self.get(source_id).await?;
        let forked = source.fork();
        self.put(&forked).await?;
        Ok(forked)
    }
}

/// In-memory store for tests and embedded use.
#[derive(Default)]
pub struct MemorySessionStore {
    inner: RwLock<HashMap<String, Session>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn put(&self, session: &Session) -> Result<(), StoreError> {
        self.inner
            .write()
            .await
            .insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Session, StoreError> {
        self.inner
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.inner.write().await.remove(id);
        Ok(())
    }

    async fn list(&self, filter: ListFilter) -> Result<Vec<Session>, StoreError> {
        let mut sessions: Vec<Session> = self.inner.read().await.values().cloned().collect();
        sort_and_page(&mut sessions, filter);
        Ok(sessions)
    }
}

/// Shared ordering/pagination: `updated_at` descending, id as a stable
/// tie-break, then the filter's window.
pub(crate) fn sort_and_page(sessions: &mut Vec<Session>, filter: ListFilter) {
    sessions.sort_by(|a, b| {
        b.updated_at
            .cmp(&a.updated_at)
            .then_with(|| a.id.cmp(&b.id))
    });
    let offset = filter.offset.min(sessions.len());
    sessions.drain(..offset);
    if let Some(limit) = filter.limit {
        sessions.truncate(limit);
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
