// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Subagent definition discovery.
//!
//! Subagents are markdown files with YAML frontmatter under
//! `<cwd>/.dive/agents/*.md`:
//!
//! ```markdown
//! ---
//! description: Reviews changes for security problems.
//! model: fast
//! tools: [read_file, grep]
//! ---
//!
//! You are a security reviewer.
//! ```
//!
//! The name defaults to the file stem.  Definitions are looked up by name at
//! dispatch time through [`AgentRegistry`]; a definition never references the
//! agent instance that spawned it.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use tracing::warn;

/// A discovered subagent definition.
#[derive(Debug, Clone)]
pub struct AgentDefinition {
    /// Unique name, from the file stem.
    pub name: String,
    /// One-line purpose that guides delegation.
    pub description: String,
    /// Optional model nick; `None` means inherit the parent's model.
    pub model: Option<String>,
    /// Tool names this subagent may use; `None` means the full belt.
    pub tools: Option<Vec<String>>,
    /// System prompt body (everything after the closing `---` fence).
    pub prompt: String,
}

#[derive(Debug, Default, Deserialize)]
struct AgentFrontmatter {
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    tools: Option<Vec<String>>,
}

/// Name-keyed lookup over discovered definitions.
#[derive(Debug, Default)]
pub struct AgentRegistry {
    agents: HashMap<String, AgentDefinition>,
}

impl AgentRegistry {
    pub fn from_definitions(definitions: Vec<AgentDefinition>) -> Self {
        Self {
            agents: definitions
                .into_iter()
                .map(|d| (d.name.clone(), d))
                .collect(),
        }
    }

    /// Discover definitions under `<cwd>/.dive/agents/`.
    pub fn discover(cwd: &Path) -> Self {
        Self::from_definitions(discover_agents(cwd))
    }

    pub fn get(&self, name: &str) -> Option<&AgentDefinition> {
        self.agents.get(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.agents.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Enumerate and parse all definitions; malformed files are skipped.
pub fn discover_agents(cwd: &Path) -> Vec<AgentDefinition> {
    let dir = cwd.join(".dive").join("agents");
    let Ok(entries) = std::fs::read_dir(&dir) else {
        return Vec::new();
    };

    let mut definitions = Vec::new();
    for entry in entries.filter_map(|e| e.ok()) {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("md") {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read agent file — skipping");
                continue;
            }
        };
        if let Some(def) = parse_agent_file(&raw, stem, &path) {
            definitions.push(def);
        }
    }
    definitions.sort_by(|a, b| a.name.cmp(&b.name));
    definitions
}

/// Parse a raw agent markdown file.
///
/// Without frontmatter the whole body is the prompt and the description is
/// synthesised from the first non-empty line.
fn parse_agent_file(raw: &str, stem: &str, path: &Path) -> Option<AgentDefinition> {
    let rest = raw.trim_start_matches('\n');

    let (fm, prompt) = if let Some(after_open) = rest.strip_prefix("---") {
        let close = after_open.find("\n---")?;
        let yaml_block = &after_open[..close];
        let body = after_open[close + 4..].trim_start_matches('\n').to_string();

        let fm: AgentFrontmatter = match serde_yaml::from_str(yaml_block) {
            Ok(f) => f,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to parse agent frontmatter — skipping");
                return None;
            }
        };
        (fm, body)
    } else {
        (AgentFrontmatter::default(), rest.to_string())
    };

    let description = fm.description.unwrap_or_else(|| {
        prompt
            .lines()
            .find(|l| !l.trim().is_empty())
            .unwrap_or("")
            .trim()
            .to_string()
    });

    Some(AgentDefinition {
        name: stem.to_string(),
        description,
        model: fm.model,
        tools: fm.tools,
        prompt,
    })
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
