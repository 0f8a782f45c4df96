// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use dive_model::{Message, Usage};
use dive_tools::ToolOutput;

use crate::error::{AgentError, HookFamily};
use crate::response::Response;

/// Sentinel error a hook returns to abort the whole response.
///
/// Ordinary hook errors are demoted (pre-tool-use) or swallowed (post
/// families); only this sentinel terminates the response.  Detected by
/// downcast, so hooks just return `Err(hook_abort("reason"))`.
#[derive(Debug, Error)]
#[error("{reason}")]
pub struct HookAbort {
    pub reason: String,
}

/// Build the abort sentinel as an `anyhow::Error`.
pub fn hook_abort(reason: impl Into<String>) -> anyhow::Error {
    anyhow::Error::new(HookAbort {
        reason: reason.into(),
    })
}

fn as_abort(err: &anyhow::Error) -> Option<&HookAbort> {
    err.downcast_ref::<HookAbort>()
}

/// Mutable state handed to pre-generation hooks: the composed system prompt
/// and the working conversation, both rewritable.
#[derive(Debug)]
pub struct GenerationState {
    pub system_prompt: String,
    pub messages: Vec<Message>,
}

/// Read-only state handed to post-generation hooks.
#[derive(Debug)]
pub struct PostGenerationState<'a> {
    pub response: &'a Response,
    /// Assistant and tool-result messages appended during this response.
    pub new_messages: &'a [Message],
    pub usage: Usage,
}

/// Mutable per-call state for pre-tool-use hooks.  Hooks may rewrite `input`;
/// the (possibly rewritten) value is what the tool is invoked with.
#[derive(Debug)]
pub struct ToolUseContext {
    pub tool_name: String,
    pub call_id: String,
    pub input: Value,
}

/// What a pre-tool-use hook decided for the call.  The first non-`Continue`
/// answer short-circuits the rest of the permission pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum HookDecision {
    /// No opinion; later hooks and the permission pipeline decide.
    Continue,
    Allow,
    Deny { message: String },
    Ask { message: Option<String> },
}

/// Mutable per-result state for post-tool-use hooks.  Hooks may rewrite
/// `result` in place before it is sent to the model.
#[derive(Debug)]
pub struct ToolResultContext {
    pub tool_name: String,
    pub call_id: String,
    pub input: Value,
    pub result: ToolOutput,
}

#[async_trait]
pub trait PreGenerationHook: Send + Sync {
    async fn run(&self, state: &mut GenerationState) -> anyhow::Result<()>;
}

#[async_trait]
pub trait PostGenerationHook: Send + Sync {
    async fn run(&self, state: &PostGenerationState<'_>) -> anyhow::Result<()>;
}

#[async_trait]
pub trait PreToolUseHook: Send + Sync {
    async fn run(&self, ctx: &mut ToolUseContext) -> anyhow::Result<HookDecision>;
}

#[async_trait]
pub trait PostToolUseHook: Send + Sync {
    async fn run(&self, ctx: &mut ToolResultContext) -> anyhow::Result<()>;
}

/// User-supplied interceptors, invoked in registration order within each
/// family.
#[derive(Default, Clone)]
pub struct Hooks {
    pre_generation: Vec<Arc<dyn PreGenerationHook>>,
    post_generation: Vec<Arc<dyn PostGenerationHook>>,
    pre_tool_use: Vec<Arc<dyn PreToolUseHook>>,
    post_tool_use: Vec<Arc<dyn PostToolUseHook>>,
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pre_generation(mut self, hook: impl PreGenerationHook + 'static) -> Self {
        self.pre_generation.push(Arc::new(hook));
        self
    }

    pub fn post_generation(mut self, hook: impl PostGenerationHook + 'static) -> Self {
        self.post_generation.push(Arc::new(hook));
        self
    }

    pub fn pre_tool_use(mut self, hook: impl PreToolUseHook + 'static) -> Self {
        self.pre_tool_use.push(Arc::new(hook));
        self
    }

    pub fn post_tool_use(mut self, hook: impl PostToolUseHook + 'static) -> Self {
        self.post_tool_use.push(Arc::new(hook));
        self
    }
}

/// Drives the four hook families with their respective fatality rules.
#[derive(Default, Clone)]
pub struct HookRunner {
    hooks: Hooks,
}

impl HookRunner {
    pub fn new(hooks: Hooks) -> Self {
        Self { hooks }
    }

    /// Any error is fatal; the abort sentinel keeps its family tag.
    pub async fn run_pre_generation(&self, state: &mut GenerationState) -> Result<(), AgentError> {
        for hook in &self.hooks.pre_generation {
            if let Err(e) = hook.run(state).await {
                if let Some(abort) = as_abort(&e) {
                    return Err(AgentError::HookAbort {
                        family: HookFamily::PreGeneration,
                        reason: abort.reason.clone(),
                    });
                }
                return Err(AgentError::Transport(e.context("pre-generation hook failed")));
            }
        }
        Ok(())
    }

    /// Regular errors are logged and swallowed; only the abort sentinel is
    /// surfaced.
    pub async fn run_post_generation(
        &self,
        state: &PostGenerationState<'_>,
    ) -> Result<(), AgentError> {
        for hook in &self.hooks.post_generation {
            if let Err(e) = hook.run(state).await {
                if let Some(abort) = as_abort(&e) {
                    return Err(AgentError::HookAbort {
                        family: HookFamily::PostGeneration,
                        reason: abort.reason.clone(),
                    });
                }
                warn!(error = %e, "post-generation hook failed; continuing");
            }
        }
        Ok(())
    }

    /// First non-`Continue` decision wins.  Regular errors are demoted to a
    /// deny carrying the error text; the abort sentinel is fatal.
    pub async fn run_pre_tool_use(
        &self,
        ctx: &mut ToolUseContext,
    ) -> Result<HookDecision, AgentError> {
        for hook in &self.hooks.pre_tool_use {
            match hook.run(ctx).await {
                Ok(HookDecision::Continue) => {}
                Ok(decision) => return Ok(decision),
                Err(e) => {
                    if let Some(abort) = as_abort(&e) {
                        return Err(AgentError::HookAbort {
                            family: HookFamily::PreToolUse,
                            reason: abort.reason.clone(),
                        });
                    }
                    return Ok(HookDecision::Deny {
                        message: e.to_string(),
                    });
                }
            }
        }
        Ok(HookDecision::Continue)
    }

    /// Regular errors are logged and swallowed; the abort sentinel is fatal.
    pub async fn run_post_tool_use(&self, ctx: &mut ToolResultContext) -> Result<(), AgentError> {
        for hook in &self.hooks.post_tool_use {
            if let Err(e) = hook.run(ctx).await {
                if let Some(abort) = as_abort(&e) {
                    return Err(AgentError::HookAbort {
                        family: HookFamily::PostToolUse,
                        reason: abort.reason.clone(),
                    });
                }
                warn!(error = %e, "post-tool-use hook failed; continuing");
            }
        }
        Ok(())
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
