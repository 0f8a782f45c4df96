// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::fmt;
use std::sync::Arc;

use regex::Regex;
use serde_json::Value;

use crate::glob::{command_glob_match, glob_to_regex, path_glob_match};

/// What a matching rule decides for the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleType {
    Deny,
    Allow,
    Ask,
}

/// Programmatic predicate over the parsed tool input.
pub type InputPredicate = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// Keys probed, in order, for the command string of a tool input.
const COMMAND_KEYS: [&str; 4] = ["command", "cmd", "script", "code"];

/// Keys probed, in order, for the path field of a tool input.
const PATH_KEYS: [&str; 5] = ["path", "file_path", "filePath", "filename", "file"];

/// Pick the command string out of a tool input.
pub fn command_field(input: &Value) -> Option<&str> {
    COMMAND_KEYS.iter().find_map(|k| input.get(k)?.as_str())
}

/// Pick the path string out of a tool input.
pub fn path_field(input: &Value) -> Option<&str> {
    PATH_KEYS.iter().find_map(|k| input.get(k)?.as_str())
}

/// One declarative permission rule.
///
/// All specified criteria must match for the rule to fire: the tool-name glob
/// always, the command glob and the input predicate only when present.
/// Evaluation over a rule list is first-match-wins in list order.
#[derive(Clone)]
pub struct PermissionRule {
    pub rule_type: RuleType,
    pub tool_pattern: String,
    pub command_pattern: Option<String>,
    pub message: Option<String>,
    pub input_match: Option<InputPredicate>,
    tool_re: Option<Regex>,
}

impl fmt::Debug for PermissionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PermissionRule")
            .field("rule_type", &self.rule_type)
            .field("tool_pattern", &self.tool_pattern)
            .field("command_pattern", &self.command_pattern)
            .field("message", &self.message)
            .field("input_match", &self.input_match.as_ref().map(|_| ".."))
            .finish()
    }
}

impl PermissionRule {
    pub fn new(rule_type: RuleType, tool_pattern: impl Into<String>) -> Self {
        let tool_pattern = tool_pattern.into();
        let tool_re = glob_to_regex(&tool_pattern);
        Self {
            rule_type,
            tool_pattern,
            command_pattern: None,
            message: None,
            input_match: None,
            tool_re,
        }
    }

    pub fn allow(tool_pattern: impl Into<String>) -> Self {
        Self::new(RuleType::Allow, tool_pattern)
    }

    pub fn deny(tool_pattern: impl Into<String>) -> Self {
        Self::new(RuleType::Deny, tool_pattern)
    }

    pub fn ask(tool_pattern: impl Into<String>) -> Self {
        Self::new(RuleType::Ask, tool_pattern)
    }

    /// Require the input's command field to match a command glob.
    pub fn with_command(mut self, pattern: impl Into<String>) -> Self {
        self.command_pattern = Some(pattern.into());
        self
    }

    /// Message surfaced to the model (deny) or the confirmation prompt (ask).
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Require a programmatic predicate over the parsed input.
    pub fn with_input_match(
        mut self,
        pred: impl Fn(&Value) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.input_match = Some(Arc::new(pred));
        self
    }

    /// Whether every specified criterion matches this call.
    pub fn matches(&self, tool_name: &str, input: &Value) -> bool {
        let Some(re) = &self.tool_re else {
            return false;
        };
        if !re.is_match(tool_name) {
            return false;
        }
        if let Some(pattern) = &self.command_pattern {
            match command_field(input) {
                Some(command) => {
                    if !command_glob_match(pattern, command) {
                        return false;
                    }
                }
                None => return false,
            }
        }
        if let Some(pred) = &self.input_match {
            if !pred(input) {
                return false;
            }
        }
        true
    }
}

/// First matching rule wins; a non-matching rule contributes nothing.
pub fn first_match<'a>(
    rules: &'a [PermissionRule],
    tool_name: &str,
    input: &Value,
) -> Option<&'a PermissionRule> {
    rules.iter().find(|r| r.matches(tool_name, input))
}

/// Predicate matching the input's path field against a path glob
/// (`**` recursive, `*` within a segment).
pub fn match_path(pattern: impl Into<String>) -> InputPredicate {
    let pattern = pattern.into();
    Arc::new(move |input| path_field(input).is_some_and(|p| path_glob_match(&pattern, p)))
}

/// Predicate matching a prefix of the input's command field.
pub fn match_command_prefix(prefix: impl Into<String>) -> InputPredicate {
    let prefix = prefix.into();
    Arc::new(move |input| command_field(input).is_some_and(|c| c.starts_with(&prefix)))
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
