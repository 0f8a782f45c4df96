// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;
use std::sync::Arc;

use crate::Tool;

/// A tool schema – mirrors `dive_model::ToolSchema` but keeps the tools crate
/// independent from the model crate.
#[derive(Debug, Clone)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Central registry holding all tools available to an agent.
///
/// Declaration order is preserved: system-instruction composition and schema
/// listing both follow the order tools were registered in.
#[derive(Default)]
pub struct ToolRegistry {
    order: Vec<String>,
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.register_arc(Arc::new(tool));
    }

    /// Register an already-shared tool (dynamic toolsets).
    /// Re-registering a name replaces the tool but keeps its original position.
    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if !self.tools.contains_key(&name) {
            self.order.push(name.clone());
        }
        self.tools.insert(name, tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Tool names in declaration order.
    pub fn names(&self) -> Vec<String> {
        self.order.clone()
    }

    /// Tools in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Tool>> {
        self.order.iter().filter_map(|name| self.tools.get(name))
    }

    /// Schemas for all registered tools, in declaration order.
    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.iter()
            .map(|t| ToolSchema {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.input_schema(),
            })
            .collect()
    }

    /// Tool-specific system-prompt additions, in declaration order.
    pub fn system_instructions(&self) -> Vec<String> {
        self.iter().filter_map(|t| t.system_instructions()).collect()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
