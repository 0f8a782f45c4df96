// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
pub mod events;
pub mod glob;
pub mod registry;
pub mod rules;
pub mod settings;
pub mod tool;

pub use events::{TodoItem, ToolEvent};
pub use glob::{command_glob_match, glob_to_regex, path_glob_match};
pub use registry::{ToolRegistry, ToolSchema};
pub use rules::{
    command_field, first_match, match_command_prefix, match_path, path_field, InputPredicate,
    PermissionRule, RuleType,
};
pub use settings::rules_from_patterns;
pub use tool::{Tool, ToolAnnotations, ToolCall, ToolContext, ToolOutput, ToolOutputPart};
