// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use dive_model::Message;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A persisted conversation: ordered messages plus identity and bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, Value>,
}

impl Session {
    pub fn new() -> Self {
        Self::with_id(Uuid::new_v4().to_string())
    }

    pub fn with_id(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            user_id: None,
            created_at: now,
            updated_at: now,
            messages: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    /// Append a message and bump `updated_at`.
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
        self.touch();
    }

    pub fn push_many(&mut self, messages: impl IntoIterator<Item = Message>) {
        for m in messages {
            self.push(m);
        }
    }

    /// Bump `updated_at`.  Monotonically non-decreasing even when the system
    /// clock steps backwards.
    pub fn touch(&mut self) {
        self.updated_at = self.updated_at.max(Utc::now());
    }

    /// Deep-copy this session under a fresh id.
    ///
    /// Messages are independently owned by the copy; the metadata map is
    /// copied entry-wise; both timestamps are stamped to now.
    pub fn fork(&self) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: self.user_id.clone(),
            created_at: now,
            updated_at: now,
            messages: self.messages.clone(),
            metadata: self.metadata.clone(),
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
