// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! `dive` drives large-language-model agents through multi-step tool-using
//! conversations: a bounded loop of generate → dispatch tool calls → collect
//! results → feed back, with layered permissions, interception hooks, ordered
//! event delivery, and persisted sessions.
//!
//! This crate is a facade re-exporting the workspace members:
//!
//! - [`core`] — the agent loop, permission manager, hook runner, event emitter
//! - [`model`] — message/usage types, the provider trait, the stream accumulator
//! - [`tools`] — the `Tool` trait, registry, and declarative rule engine
//! - [`session`] — the session store seam with file and memory backends
//! - [`config`] — settings files and subagent definitions

pub use dive_config as config;
pub use dive_core as core;
pub use dive_model as model;
pub use dive_session as session;
pub use dive_tools as tools;

pub use dive_core::{
    Agent, AgentConfig, AgentError, CreateResponse, EventHandler, Hooks, ModelSettings,
    PermissionManager, PermissionMode, Response, ResponseItem,
};
pub use dive_model::{Message, ModelProvider};
pub use dive_session::{FileSessionStore, MemorySessionStore, Session, SessionStore};
pub use dive_tools::{PermissionRule, Tool, ToolRegistry};
