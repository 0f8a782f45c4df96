// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Compiles settings-file permission patterns into [`PermissionRule`]s.
//!
//! Pattern grammar:
//!
//! ```text
//! ToolName                      bare tool-name glob
//! Bash(go test:*)               command-prefix match for bash-like tools
//! Read(/workspace/**)           path glob for read/write/edit tools
//! WebFetch(domain:example.com)  host-or-subdomain match on the input url
//! Tool(args)                    anything else: command glob over args
//! ```

use crate::rules::{match_command_prefix, match_path, PermissionRule, RuleType};

/// Compile settings patterns into an ordered rule list.
/// Deny rules are emitted before allow rules so denies always win.
pub fn rules_from_patterns(deny: &[String], allow: &[String]) -> Vec<PermissionRule> {
    let mut rules = Vec::with_capacity(deny.len() + allow.len());
    rules.extend(deny.iter().map(|p| rule_from_pattern(RuleType::Deny, p)));
    rules.extend(allow.iter().map(|p| rule_from_pattern(RuleType::Allow, p)));
    rules
}

fn rule_from_pattern(rule_type: RuleType, pattern: &str) -> PermissionRule {
    let Some((tool, args)) = pattern
        .split_once('(')
        .and_then(|(t, rest)| rest.strip_suffix(')').map(|a| (t, a)))
    else {
        // Bare tool name (may itself be a glob).
        return PermissionRule::new(rule_type, pattern);
    };

    let rule = PermissionRule::new(rule_type, tool);
    let tool_lower = tool.to_lowercase();

    if tool_lower.contains("bash") || tool_lower.contains("shell") || tool_lower.contains("command")
    {
        return match args.strip_suffix(":*") {
            Some(prefix) => {
                let pred = match_command_prefix(prefix.to_string());
                rule.with_input_match(move |input| pred(input))
            }
            None => rule.with_command(args),
        };
    }

    if tool_lower.contains("read") || tool_lower.contains("write") || tool_lower.contains("edit") {
        let pred = match_path(args.to_string());
        return rule.with_input_match(move |input| pred(input));
    }

    if let Some(domain) = args.strip_prefix("domain:") {
        let domain = domain.to_string();
        return rule.with_input_match(move |input| {
            input
                .get("url")
                .and_then(|u| u.as_str())
                .and_then(url_host)
                .is_some_and(|host| host == domain || host.ends_with(&format!(".{domain}")))
        });
    }

    // Unknown argument form: treat args as a command glob.
    rule.with_command(args)
}

/// Extract the host from a URL without pulling in a full URL parser.
fn url_host(url: &str) -> Option<&str> {
    let rest = url.split_once("://").map(|(_, r)| r).unwrap_or(url);
    let authority = rest.split(['/', '?', '#']).next()?;
    let host = authority.rsplit('@').next()?;
    let host = host.split(':').next()?;
    (!host.is_empty()).then_some(host)
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
