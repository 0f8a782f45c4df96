// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod accumulator;
mod mock;
mod provider;
mod types;

pub use accumulator::{assemble, synthetic_stream, StreamAccumulator};
pub use mock::{MockProvider, ScriptedProvider};
pub use provider::{EventStream, ModelProvider};
pub use types::*;
