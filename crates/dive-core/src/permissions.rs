// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use dive_config::Settings;
use dive_tools::{
    command_field, first_match, rules_from_patterns, PermissionRule, RuleType, Tool, ToolCall,
};

/// Global dial over permission verdicts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionMode {
    /// Every call not decided earlier in the pipeline asks.
    #[default]
    Default,
    /// Read-only tools run; everything else is denied.
    Plan,
    /// Edit operations run without asking; the rest asks.
    AcceptEdits,
    /// Everything runs.
    BypassPermissions,
}

/// What the pipeline decided for a call.
#[derive(Debug, Clone, PartialEq)]
pub enum PermissionDecision {
    Allow {
        /// Set when the allow came from the session allowlist.
        category: Option<String>,
    },
    Deny {
        /// Dispatch falls back to the preview summary, then to
        /// `"Tool execution denied"`, when unset.
        message: Option<String>,
    },
    Ask {
        message: Option<String>,
    },
}

/// Answer from the confirmation callback.
#[derive(Debug, Clone, PartialEq)]
pub enum Confirmation {
    Approved,
    /// Approve, and promote this call's category to the session allowlist so
    /// the rest of the session skips the prompt.
    ApprovedForSession,
    Denied,
    /// Deny, with user-supplied text as the tool-result content.
    Feedback(String),
}

/// What the confirmer is asked about.
#[derive(Debug, Clone, Copy)]
pub struct ConfirmationRequest<'a> {
    pub tool_name: &'a str,
    pub call: &'a ToolCall,
    /// Rule message, preview summary, or empty.
    pub message: &'a str,
}

/// Optional callback resolving `ask` verdicts interactively.
/// An error answer is treated as a deny.
#[async_trait]
pub trait Confirmer: Send + Sync {
    async fn confirm(&self, req: ConfirmationRequest<'_>) -> anyhow::Result<Confirmation>;
}

/// Programmatic catch-all consulted after the declarative rules.
#[async_trait]
pub trait CanUseTool: Send + Sync {
    async fn can_use(
        &self,
        tool: &dyn Tool,
        call: &ToolCall,
    ) -> anyhow::Result<PermissionDecision>;
}

/// Derive the permission category of a tool name.
///
/// A pure function of the name; must be stable across runs because session
/// allowlist entries are stored as categories.  Users think in families
/// ("always allow shell commands"), hence category rather than tool-name
/// granularity.
pub fn derive_category(tool_name: &str) -> String {
    let name = tool_name.to_lowercase();
    if name.contains("bash") || name.contains("shell") || name.contains("command") {
        "bash".into()
    } else if name.contains("edit") || name.contains("write") || name.contains("mkdir") {
        "edit".into()
    } else if name.contains("read") {
        "read".into()
    } else if name.contains("glob") || name.contains("grep") || name.contains("search") {
        "search".into()
    } else {
        name
    }
}

/// Whether a call is an edit operation for `accept_edits` purposes.
pub fn is_edit_operation(tool: &dyn Tool, call: &ToolCall) -> bool {
    if tool.annotations().edit {
        return true;
    }
    let name = call.name.to_lowercase();
    if ["edit", "write", "create", "mkdir"]
        .iter()
        .any(|k| name.contains(k))
    {
        return true;
    }
    if derive_category(&call.name) == "bash" {
        if let Some(command) = command_field(&call.input) {
            let first = command.split_whitespace().next().unwrap_or("");
            return ["touch", "rm", "cp", "mv", "chmod", "mkdir"].contains(&first);
        }
    }
    false
}

/// Layered permission decision machine.
///
/// The dispatch pipeline consults, in order: pre-tool-use hooks (outside this
/// type), the session allowlist, the declarative rules (first match wins),
/// the `can_use_tool` callback, and finally the mode fallback.
///
/// Mode and allowlist are mutable behind a mutex; user code may call
/// [`set_mode`](Self::set_mode) and [`allow_for_session`](Self::allow_for_session)
/// while responses run.  Reads copy the state out before any await so no lock
/// is ever held across a suspension point.
pub struct PermissionManager {
    rules: Vec<PermissionRule>,
    mode: Mutex<PermissionMode>,
    session_allow: Mutex<HashMap<String, HashSet<String>>>,
    can_use_tool: Option<Arc<dyn CanUseTool>>,
}

impl Default for PermissionManager {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl PermissionManager {
    pub fn new(rules: Vec<PermissionRule>) -> Self {
        Self {
            rules,
            mode: Mutex::new(PermissionMode::default()),
            session_allow: Mutex::new(HashMap::new()),
            can_use_tool: None,
        }
    }

    /// Build a manager from a settings document: deny patterns compile ahead
    /// of allow patterns so denies always win.
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(rules_from_patterns(
            &settings.permissions.deny,
            &settings.permissions.allow,
        ))
    }

    pub fn with_mode(self, mode: PermissionMode) -> Self {
        self.set_mode(mode);
        self
    }

    pub fn with_can_use_tool(mut self, callback: Arc<dyn CanUseTool>) -> Self {
        self.can_use_tool = Some(callback);
        self
    }

    pub fn mode(&self) -> PermissionMode {
        *self.mode.lock().unwrap()
    }

    pub fn set_mode(&self, mode: PermissionMode) {
        *self.mode.lock().unwrap() = mode;
    }

    pub fn rules(&self) -> &[PermissionRule] {
        &self.rules
    }

    /// Promote a category to "allow" for the rest of the session.
    pub fn allow_for_session(&self, session_id: &str, category: impl Into<String>) {
        self.session_allow
            .lock()
            .unwrap()
            .entry(session_id.to_string())
            .or_default()
            .insert(category.into());
    }

    pub fn is_allowed_for_session(&self, session_id: &str, category: &str) -> bool {
        self.session_allow
            .lock()
            .unwrap()
            .get(session_id)
            .is_some_and(|set| set.contains(category))
    }

    /// Evaluate the allowlist → rules → callback → mode ladder for one call.
    pub async fn evaluate(
        &self,
        tool: &dyn Tool,
        call: &ToolCall,
        session_id: &str,
    ) -> PermissionDecision {
        let category = derive_category(&call.name);
        if self.is_allowed_for_session(session_id, &category) {
            return PermissionDecision::Allow {
                category: Some(category),
            };
        }

        if let Some(rule) = first_match(&self.rules, &call.name, &call.input) {
            return match rule.rule_type {
                RuleType::Deny => PermissionDecision::Deny {
                    message: rule.message.clone(),
                },
                RuleType::Allow => PermissionDecision::Allow { category: None },
                RuleType::Ask => PermissionDecision::Ask {
                    message: rule.message.clone(),
                },
            };
        }

        if let Some(callback) = &self.can_use_tool {
            return match callback.can_use(tool, call).await {
                Ok(decision) => decision,
                Err(e) => PermissionDecision::Deny {
                    message: Some(e.to_string()),
                },
            };
        }

        self.mode_fallback(tool, call)
    }

    fn mode_fallback(&self, tool: &dyn Tool, call: &ToolCall) -> PermissionDecision {
        match self.mode() {
            PermissionMode::BypassPermissions => PermissionDecision::Allow { category: None },
            PermissionMode::Plan => {
                if tool.annotations().read_only {
                    PermissionDecision::Allow { category: None }
                } else {
                    PermissionDecision::Deny {
                        message: Some("plan mode permits read-only tools only".into()),
                    }
                }
            }
            PermissionMode::AcceptEdits => {
                if is_edit_operation(tool, call) {
                    PermissionDecision::Allow { category: None }
                } else {
                    PermissionDecision::Ask { message: None }
                }
            }
            PermissionMode::Default => PermissionDecision::Ask { message: None },
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
