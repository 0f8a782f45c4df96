// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use dive_model::{Message, StreamEvent, Usage};
use dive_tools::{TodoItem, ToolCall, ToolOutput};

use crate::error::AgentError;

/// The bound record stored after each tool invocation.
///
/// Either `output` (a structured result, possibly with `is_error` set) or
/// `error` (a transport-level failure, also mirrored into `output` as an
/// error result for the model) is populated.
#[derive(Debug, Clone)]
pub struct ToolCallResult {
    pub call_id: String,
    pub tool_name: String,
    /// The input the tool was (or would have been) invoked with.
    pub input: Value,
    pub preview: Option<String>,
    pub output: Option<ToolOutput>,
    /// Raw transport/panic error text, retained for telemetry.
    pub error: Option<String>,
}

/// One typed item delivered to the caller's event callback.
#[derive(Debug, Clone)]
pub enum ResponseItem {
    /// Emitted exactly once, before all other items, when a callback is
    /// supplied.
    Init { session_id: String },
    /// A complete assistant or tool-result message plus that turn's usage.
    Message { message: Message, usage: Usage },
    /// The model requested a tool invocation.
    ToolCall { call: ToolCall },
    /// The paired result for an earlier `ToolCall`.
    ToolCallResult { result: ToolCallResult },
    /// Opaque streaming delta, passed through as received.
    ModelEvent { event: StreamEvent },
    /// Progress update from a todo-reporting tool.
    Todo { items: Vec<TodoItem> },
}

/// Caller-supplied event callback.
///
/// Invoked synchronously, in program order, on the task driving the loop.
/// Returning an error aborts the response.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn on_item(&self, item: &ResponseItem) -> anyhow::Result<()>;
}

/// Bridges the callback contract onto an unbounded channel for consumers that
/// prefer to drain a receiver.  A dropped receiver fails delivery and
/// therefore aborts the response.
pub struct ChannelEventHandler {
    tx: mpsc::UnboundedSender<ResponseItem>,
}

impl ChannelEventHandler {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ResponseItem>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl EventHandler for ChannelEventHandler {
    async fn on_item(&self, item: &ResponseItem) -> anyhow::Result<()> {
        self.tx
            .send(item.clone())
            .map_err(|_| anyhow::anyhow!("event receiver dropped"))
    }
}

/// Orders item delivery for one response.
///
/// `init` is sent lazily before the first real item so that a response that
/// fails before producing anything emits nothing.  No lock is held across the
/// callback; the emitter is owned by the loop task.
pub(crate) struct Emitter {
    handler: Option<Arc<dyn EventHandler>>,
    session_id: String,
    init_sent: bool,
}

impl Emitter {
    pub(crate) fn new(handler: Option<Arc<dyn EventHandler>>, session_id: String) -> Self {
        Self {
            handler,
            session_id,
            init_sent: false,
        }
    }

    pub(crate) async fn emit(&mut self, item: ResponseItem) -> Result<(), AgentError> {
        let Some(handler) = &self.handler else {
            return Ok(());
        };
        if !self.init_sent {
            self.init_sent = true;
            handler
                .on_item(&ResponseItem::Init {
                    session_id: self.session_id.clone(),
                })
                .await
                .map_err(AgentError::Callback)?;
        }
        handler.on_item(&item).await.map_err(AgentError::Callback)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
