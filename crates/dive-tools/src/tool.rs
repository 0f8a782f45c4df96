// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use crate::events::ToolEvent;

/// A single tool invocation requested by the model.
#[derive(Debug, Clone)]
pub struct ToolCall {
    /// Call id issued by the model (forwarded verbatim)
    pub id: String,
    pub name: String,
    /// Parsed JSON input
    pub input: Value,
}

/// Behavioural hints a tool declares about itself.  The permission modes read
/// these: `plan` only runs `read_only` tools, `accept_edits` auto-approves
/// `edit` operations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolAnnotations {
    #[serde(default)]
    pub read_only: bool,
    #[serde(default)]
    pub destructive: bool,
    #[serde(default)]
    pub idempotent: bool,
    #[serde(default)]
    pub open_world: bool,
    #[serde(default)]
    pub edit: bool,
}

impl ToolAnnotations {
    pub fn read_only() -> Self {
        Self {
            read_only: true,
            idempotent: true,
            ..Self::default()
        }
    }

    pub fn edit() -> Self {
        Self {
            edit: true,
            ..Self::default()
        }
    }
}

/// A single content item in a tool output.
///
/// Most tools produce only `Text`.  Vision-capable tools may mix in `Image`
/// items; tools that hand back artifacts reference them with `ResourceLink`.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutputPart {
    /// Plain UTF-8 text.
    Text(String),
    /// Base64 data URL or HTTPS URL.
    Image(String),
    /// Link to an externally stored artifact.
    ResourceLink { uri: String, title: Option<String> },
}

/// The result of executing a tool.
///
/// `is_error` marks a protocol-level failure the model is expected to read
/// and react to; transport-level failures are returned as `Err` from
/// [`Tool::call`] instead.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    pub content: Vec<ToolOutputPart>,
    pub is_error: bool,
}

impl ToolOutput {
    /// Successful plain-text result.
    pub fn ok(content: impl Into<String>) -> Self {
        Self {
            content: vec![ToolOutputPart::Text(content.into())],
            is_error: false,
        }
    }

    /// Error result containing a plain-text error message.
    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            content: vec![ToolOutputPart::Text(msg.into())],
            is_error: true,
        }
    }

    /// Result with arbitrary parts.
    pub fn with_parts(parts: Vec<ToolOutputPart>) -> Self {
        Self {
            content: parts,
            is_error: false,
        }
    }

    /// Plain-text view: concatenation of all `Text` parts.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|p| match p {
                ToolOutputPart::Text(t) => Some(t.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Execution context handed to every tool invocation.
///
/// Carries the response's cancellation token (tools that block should honour
/// it) and an optional event sender for stateful tools that report progress
/// back to the agent loop.
#[derive(Clone, Default)]
pub struct ToolContext {
    pub cancel: CancellationToken,
    events: Option<UnboundedSender<ToolEvent>>,
}

impl ToolContext {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            events: None,
        }
    }

    pub fn with_events(mut self, events: UnboundedSender<ToolEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Emit a tool event.  Dropped silently when the loop is no longer
    /// listening.
    pub fn emit(&self, event: ToolEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }
}

/// Trait that every tool must implement.
///
/// The required surface is name/description/schema/call.  The remaining
/// methods are optional capabilities with probing defaults: the dispatch
/// pipeline asks "does this tool also implement X?" by checking for a
/// non-default answer.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique within an agent's toolbelt.
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON Schema for the input object
    fn input_schema(&self) -> Value;
    fn annotations(&self) -> ToolAnnotations {
        ToolAnnotations::default()
    }
    /// Execute the tool.  Protocol-level failures should be wrapped in
    /// [`ToolOutput::err`]; returning `Err` reports a transport failure.
    async fn call(&self, ctx: &ToolContext, input: &Value) -> anyhow::Result<ToolOutput>;

    /// Human-readable summary of what this call would do, for UI display and
    /// confirmation prompts.  `None` = capability not implemented.
    async fn preview(&self, _input: &Value) -> Option<String> {
        None
    }

    /// Tool-specific prose appended to the agent's system prompt.
    fn system_instructions(&self) -> Option<String> {
        None
    }

    /// Skill-style restriction over sibling tools: `Some(false)` vetoes the
    /// named tool for the duration of this tool's presence in the belt.
    /// `None` = capability not implemented.
    fn allows_tool(&self, _name: &str) -> Option<bool> {
        None
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    struct MinimalTool;

    #[async_trait]
    impl Tool for MinimalTool {
        fn name(&self) -> &str {
            "minimal"
        }
        fn description(&self) -> &str {
            "a minimal tool"
        }
        fn input_schema(&self) -> Value {
            json!({ "type": "object" })
        }
        async fn call(&self, _ctx: &ToolContext, _input: &Value) -> anyhow::Result<ToolOutput> {
            Ok(ToolOutput::ok("ok"))
        }
    }

    #[test]
    fn default_annotations_are_all_false() {
        let a = MinimalTool.annotations();
        assert!(!a.read_only && !a.destructive && !a.idempotent && !a.open_world && !a.edit);
    }

    #[test]
    fn default_capabilities_absent() {
        assert!(MinimalTool.system_instructions().is_none());
        assert!(MinimalTool.allows_tool("anything").is_none());
    }

    #[tokio::test]
    async fn default_preview_absent() {
        assert!(MinimalTool.preview(&json!({})).await.is_none());
    }

    #[test]
    fn output_ok_is_not_error() {
        let out = ToolOutput::ok("fine");
        assert!(!out.is_error);
        assert_eq!(out.text(), "fine");
    }

    #[test]
    fn output_err_is_error() {
        let out = ToolOutput::err("boom");
        assert!(out.is_error);
        assert_eq!(out.text(), "boom");
    }

    #[test]
    fn output_text_skips_non_text_parts() {
        let out = ToolOutput::with_parts(vec![
            ToolOutputPart::Text("a".into()),
            ToolOutputPart::Image("data:image/png;base64,X".into()),
            ToolOutputPart::Text("b".into()),
        ]);
        assert_eq!(out.text(), "a\nb");
    }

    #[test]
    fn annotations_read_only_helper() {
        let a = ToolAnnotations::read_only();
        assert!(a.read_only && a.idempotent && !a.edit);
    }

    #[test]
    fn context_emit_without_listener_is_silent() {
        let ctx = ToolContext::default();
        ctx.emit(ToolEvent::TodoUpdate(vec![]));
    }

    #[test]
    fn context_emit_reaches_listener() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let ctx = ToolContext::default().with_events(tx);
        ctx.emit(ToolEvent::TodoUpdate(vec![]));
        assert!(rx.try_recv().is_ok());
    }
}
