// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Which hook pipeline stage an abort originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookFamily {
    PreGeneration,
    PostGeneration,
    PreToolUse,
    PostToolUse,
}

impl fmt::Display for HookFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::PreGeneration => "pre_generation",
            Self::PostGeneration => "post_generation",
            Self::PreToolUse => "pre_tool_use",
            Self::PostToolUse => "post_tool_use",
        };
        f.write_str(name)
    }
}

/// Errors surfaced from `create_response`.
///
/// Tool-level failures are never here: they are captured in the tool-result
/// message and fed back to the model.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("no messages provided")]
    NoMessages,

    /// The model requested a tool outside the agent's belt.  Fatal: the
    /// request cannot be satisfied and the generation would spin.
    #[error("model requested unknown tool \"{0}\"")]
    UnknownTool(String),

    /// The provider finished without producing a response.
    #[error("model produced no response")]
    NoResponse(#[source] anyhow::Error),

    /// A hook returned the fatal abort sentinel.
    #[error("response aborted by {family} hook: {reason}")]
    HookAbort { family: HookFamily, reason: String },

    #[error("response cancelled")]
    Cancelled,

    #[error("response timed out after {0:?}")]
    Timeout(Duration),

    /// The caller's event callback failed; delivery is mandatory, so the
    /// whole response fails.
    #[error("event callback failed")]
    Callback(#[source] anyhow::Error),

    #[error("session store error")]
    Store(#[from] dive_session::StoreError),

    /// Any other model or streaming transport failure.
    #[error(transparent)]
    Transport(#[from] anyhow::Error),
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
