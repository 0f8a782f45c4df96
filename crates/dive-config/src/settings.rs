// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Workspace settings document (`.dive/settings.json`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub permissions: PermissionSettings,
}

/// Declarative permission patterns.  Deny patterns always win over allow
/// patterns; the pattern grammar is interpreted by the rule engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PermissionSettings {
    #[serde(default)]
    pub allow: Vec<String>,
    #[serde(default)]
    pub deny: Vec<String>,
}

/// Load settings by merging the layered documents under `<cwd>/.dive/`:
/// `settings.json` first, then `settings.local.json` on top.  Missing files
/// contribute nothing; a file that exists but does not parse is an error.
pub fn load_settings(cwd: &Path) -> anyhow::Result<Settings> {
    let mut merged = serde_json::Value::Object(serde_json::Map::new());

    for name in ["settings.json", "settings.local.json"] {
        let path = cwd.join(".dive").join(name);
        if !path.is_file() {
            continue;
        }
        debug!(path = %path.display(), "loading settings layer");
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        let layer: serde_json::Value =
            serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
        merge_json(&mut merged, layer);
    }

    if merged.as_object().is_some_and(|m| m.is_empty()) {
        return Ok(Settings::default());
    }
    serde_json::from_value(merged).context("invalid settings document")
}

/// Deep-merge `src` into `dst`; src wins on scalar and array conflicts.
fn merge_json(dst: &mut serde_json::Value, src: serde_json::Value) {
    match (dst, src) {
        (serde_json::Value::Object(d), serde_json::Value::Object(s)) => {
            for (k, v) in s {
                let entry = d
                    .entry(k)
                    .or_insert(serde_json::Value::Object(serde_json::Map::new()));
                merge_json(entry, v);
            }
        }
        (dst, src) => *dst = src,
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn val(s: &str) -> serde_json::Value {
        serde_json::from_str(s).unwrap()
    }

    fn write_settings(dir: &Path, name: &str, content: &str) {
        let dive = dir.join(".dive");
        std::fs::create_dir_all(&dive).unwrap();
        std::fs::write(dive.join(name), content).unwrap();
    }

    // ── Merge semantics ───────────────────────────────────────────────────────

    #[test]
    fn merge_scalar_src_wins() {
        let mut dst = val(r#"{"x": 1}"#);
        merge_json(&mut dst, val(r#"{"x": 2}"#));
        assert_eq!(dst["x"], 2);
    }

    #[test]
    fn merge_preserves_keys_not_in_src() {
        let mut dst = val(r#"{"a": 1, "b": 2}"#);
        merge_json(&mut dst, val(r#"{"b": 99}"#));
        assert_eq!(dst["a"], 1);
        assert_eq!(dst["b"], 99);
    }

    #[test]
    fn merge_nested_objects() {
        let mut dst = val(r#"{"permissions": {"allow": ["A"], "deny": ["D"]}}"#);
        merge_json(&mut dst, val(r#"{"permissions": {"allow": ["B"]}}"#));
        assert_eq!(dst["permissions"]["allow"], val(r#"["B"]"#));
        assert_eq!(dst["permissions"]["deny"], val(r#"["D"]"#));
    }

    // ── Loading ───────────────────────────────────────────────────────────────

    #[test]
    fn missing_files_yield_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load_settings(dir.path()).unwrap();
        assert!(settings.permissions.allow.is_empty());
        assert!(settings.permissions.deny.is_empty());
    }

    #[test]
    fn loads_base_settings() {
        let dir = tempfile::tempdir().unwrap();
        write_settings(
            dir.path(),
            "settings.json",
            r#"{"permissions": {"allow": ["Read(/tmp/**)"], "deny": ["Bash(rm -rf *:*)"]}}"#,
        );
        let settings = load_settings(dir.path()).unwrap();
        assert_eq!(settings.permissions.allow, vec!["Read(/tmp/**)"]);
        assert_eq!(settings.permissions.deny, vec!["Bash(rm -rf *:*)"]);
    }

    #[test]
    fn local_settings_take_precedence() {
        let dir = tempfile::tempdir().unwrap();
        write_settings(
            dir.path(),
            "settings.json",
            r#"{"permissions": {"allow": ["Base"]}}"#,
        );
        write_settings(
            dir.path(),
            "settings.local.json",
            r#"{"permissions": {"allow": ["Local"]}}"#,
        );
        let settings = load_settings(dir.path()).unwrap();
        assert_eq!(settings.permissions.allow, vec!["Local"]);
    }

    #[test]
    fn malformed_settings_are_an_error() {
        let dir = tempfile::tempdir().unwrap();
        write_settings(dir.path(), "settings.json", "{broken");
        assert!(load_settings(dir.path()).is_err());
    }
}
