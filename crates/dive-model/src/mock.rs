// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream;
use serde_json::json;

use crate::accumulator;
use crate::provider::EventStream;
use crate::{
    ContentPart, GenerateOptions, Message, ModelProvider, ModelResponse, Role, StreamEvent, Usage,
};

/// Deterministic mock provider for tests.  Echoes the last user message back
/// as the assistant response.
#[derive(Default)]
pub struct MockProvider;

#[async_trait]
impl ModelProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }
    fn model_name(&self) -> &str {
        "mock-model"
    }

    async fn generate(&self, req: GenerateOptions) -> anyhow::Result<ModelResponse> {
        let reply = req
            .messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.text())
            .unwrap_or_else(|| "[no input]".into());
        Ok(ModelResponse {
            message: Message::assistant(format!("MOCK: {reply}")),
            usage: Usage {
                input_tokens: 10,
                output_tokens: 10,
                ..Usage::default()
            },
        })
    }
}

/// A pre-scripted mock provider.  Each model call pops the next event script
/// from the front of the queue, so tests can specify exact turn sequences —
/// including tool calls and argument deltas — without network access.
pub struct ScriptedProvider {
    scripts: Arc<Mutex<Vec<Vec<StreamEvent>>>>,
    streaming: bool,
    /// Every `GenerateOptions` seen by this provider, in call order.
    /// Tests inspect this to assert on tool-choice overrides and headers.
    pub requests: Arc<Mutex<Vec<GenerateOptions>>>,
}

impl ScriptedProvider {
    /// Build a provider from a list of event scripts.  The outer `Vec` is the
    /// ordered list of calls; the inner `Vec` is the event sequence streamed
    /// for that call.
    pub fn new(scripts: Vec<Vec<StreamEvent>>) -> Self {
        Self {
            scripts: Arc::new(Mutex::new(scripts)),
            streaming: true,
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Disable streaming: callers will use `generate`, which assembles the
    /// same scripts through the accumulator.  Used to prove the two paths
    /// produce identical messages.
    pub fn blocking(mut self) -> Self {
        self.streaming = false;
        self
    }

    /// Convenience: provider that always returns a single text reply.
    pub fn always_text(reply: impl Into<String>) -> Self {
        Self::new(vec![text_script(reply.into())])
    }

    /// Convenience: a tool call on the first turn, a text reply on the second.
    /// The tool-use arguments arrive as a streamed JSON delta.
    pub fn tool_then_text(
        tool_id: impl Into<String>,
        tool_name: impl Into<String>,
        args_json: impl Into<String>,
        final_text: impl Into<String>,
    ) -> Self {
        Self::new(vec![
            vec![
                StreamEvent::ContentBlockStart {
                    index: 0,
                    part: ContentPart::tool_use(tool_id, tool_name, json!({})),
                },
                StreamEvent::InputJsonDelta {
                    index: 0,
                    partial_json: args_json.into(),
                },
                StreamEvent::ContentBlockStop { index: 0 },
                StreamEvent::MessageStop {
                    usage: script_usage(),
                },
            ],
            text_script(final_text.into()),
        ])
    }

    pub fn last_request(&self) -> Option<GenerateOptions> {
        self.requests.lock().unwrap().last().cloned()
    }

    fn next_script(&self) -> Vec<StreamEvent> {
        let mut scripts = self.scripts.lock().unwrap();
        if scripts.is_empty() {
            // Default fallback when all scripts are consumed
            text_script("[no more scripts]".into())
        } else {
            scripts.remove(0)
        }
    }
}

fn text_script(text: String) -> Vec<StreamEvent> {
    vec![
        StreamEvent::ContentBlockStart {
            index: 0,
            part: ContentPart::text(""),
        },
        StreamEvent::TextDelta { index: 0, text },
        StreamEvent::ContentBlockStop { index: 0 },
        StreamEvent::MessageStop {
            usage: script_usage(),
        },
    ]
}

fn script_usage() -> Usage {
    Usage {
        input_tokens: 5,
        output_tokens: 5,
        ..Usage::default()
    }
}

#[async_trait]
impl ModelProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted-mock"
    }
    fn model_name(&self) -> &str {
        "scripted-mock-model"
    }

    fn supports_streaming(&self) -> bool {
        self.streaming
    }

    async fn generate(&self, req: GenerateOptions) -> anyhow::Result<ModelResponse> {
        self.requests.lock().unwrap().push(req);
        let events = self.next_script();
        let stream: EventStream = Box::pin(stream::iter(events.into_iter().map(Ok)));
        let (message, usage) = accumulator::assemble(stream).await?;
        Ok(ModelResponse { message, usage })
    }

    async fn stream(&self, req: GenerateOptions) -> anyhow::Result<EventStream> {
        self.requests.lock().unwrap().push(req);
        let events = self.next_script();
        Ok(Box::pin(stream::iter(events.into_iter().map(Ok))))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
