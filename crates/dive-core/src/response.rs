// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use dive_model::{Message, Role, Usage};

use crate::events::EventHandler;

/// One top-level invocation of the agent loop.  `messages` mirrors the
/// ordered sequence of emitted `message` items: assistant messages and the
/// synthetic tool-result messages, interleaved as produced.
#[derive(Debug, Clone)]
pub struct Response {
    pub id: String,
    pub session_id: String,
    pub user_id: Option<String>,
    pub messages: Vec<Message>,
    /// Element-wise sum of per-iteration usages.
    pub usage: Usage,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Response {
    pub(crate) fn new(session_id: String, user_id: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            session_id,
            user_id,
            messages: Vec::new(),
            usage: Usage::default(),
            created_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Text of the final assistant message.
    pub fn output_text(&self) -> String {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .map(|m| m.text())
            .unwrap_or_default()
    }
}

/// Input to `Agent::create_response`.
#[derive(Clone, Default)]
pub struct CreateResponse {
    /// Conversation messages for this response.  Required, non-empty.
    pub messages: Vec<Message>,
    /// Continue an existing session; a fresh id is minted when absent.
    pub session_id: Option<String>,
    pub user_id: Option<String>,
    /// Optional event callback.
    pub handler: Option<Arc<dyn EventHandler>>,
}

impl CreateResponse {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            ..Self::default()
        }
    }

    pub fn with_session_id(mut self, id: impl Into<String>) -> Self {
        self.session_id = Some(id.into());
        self
    }

    pub fn with_user_id(mut self, id: impl Into<String>) -> Self {
        self.user_id = Some(id.into());
        self
    }

    pub fn with_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.handler = Some(handler);
        self
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
