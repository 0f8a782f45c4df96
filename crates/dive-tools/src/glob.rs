// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use regex::Regex;

/// Convert a simple glob pattern to a [`Regex`].
/// Only `*` (match anything) and `?` (match one char) are supported.
/// Used for tool-name matching; `*` alone matches every tool.
pub fn glob_to_regex(pattern: &str) -> Option<Regex> {
    let mut re = String::from("^");
    for ch in pattern.chars() {
        match ch {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            c => {
                for esc in regex::escape(&c.to_string()).chars() {
                    re.push(esc);
                }
            }
        }
    }
    re.push('$');
    Regex::new(&re).ok()
}

/// Convert a path glob to a [`Regex`].  `**` crosses directory separators,
/// `*` matches within one segment, `?` matches one non-separator char.
pub fn path_glob_to_regex(pattern: &str) -> Option<Regex> {
    let mut re = String::from("^");
    let chars: Vec<char> = pattern.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' if chars.get(i + 1) == Some(&'*') => {
                re.push_str(".*");
                i += 2;
            }
            '*' => {
                re.push_str("[^/]*");
                i += 1;
            }
            '?' => {
                re.push_str("[^/]");
                i += 1;
            }
            c => {
                for esc in regex::escape(&c.to_string()).chars() {
                    re.push(esc);
                }
                i += 1;
            }
        }
    }
    re.push('$');
    Regex::new(&re).ok()
}

/// Match a path against a path glob.
pub fn path_glob_match(pattern: &str, path: &str) -> bool {
    path_glob_to_regex(pattern).is_some_and(|re| re.is_match(path))
}

/// Match a command string against a command glob.
///
/// The pattern is split on `*`; each non-empty fragment must occur in the
/// command in order.  When the pattern does not start with `*` the first
/// fragment must appear at position 0; when it does not end with `*` the last
/// fragment must also match at the tail.
pub fn command_glob_match(pattern: &str, command: &str) -> bool {
    let fragments: Vec<&str> = pattern.split('*').filter(|f| !f.is_empty()).collect();
    if fragments.is_empty() {
        // Only stars (match anything), or an empty pattern (match empty).
        return !pattern.is_empty() || command.is_empty();
    }

    let mut pos = 0usize;
    for (i, frag) in fragments.iter().enumerate() {
        if i == 0 && !pattern.starts_with('*') {
            if !command.starts_with(frag) {
                return false;
            }
            pos = frag.len();
        } else {
            match command[pos..].find(frag) {
                Some(idx) => pos += idx + frag.len(),
                None => return false,
            }
        }
    }

    if !pattern.ends_with('*') {
        // The fragments matched in order; additionally anchor the last one.
        let last = fragments[fragments.len() - 1];
        if !command.ends_with(last) {
            return false;
        }
    }
    true
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
