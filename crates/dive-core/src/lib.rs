// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod agent;
mod error;
mod events;
mod hooks;
mod permissions;
mod response;

pub use agent::{
    Agent, AgentConfig, ModelSettings, DEFAULT_RESPONSE_TIMEOUT, DEFAULT_TOOL_ITERATION_LIMIT,
};
pub use error::{AgentError, HookFamily};
pub use events::{ChannelEventHandler, EventHandler, ResponseItem, ToolCallResult};
pub use hooks::{
    hook_abort, GenerationState, HookAbort, HookDecision, HookRunner, Hooks, PostGenerationHook,
    PostGenerationState, PostToolUseHook, PreGenerationHook, PreToolUseHook, ToolResultContext,
    ToolUseContext,
};
pub use permissions::{
    derive_category, is_edit_operation, CanUseTool, Confirmation, ConfirmationRequest, Confirmer,
    PermissionDecision, PermissionManager, PermissionMode,
};
pub use response::{CreateResponse, Response};
