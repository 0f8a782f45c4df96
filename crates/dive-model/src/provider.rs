// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::{GenerateOptions, ModelResponse, StreamEvent};

pub type EventStream = Pin<Box<dyn Stream<Item = anyhow::Result<StreamEvent>> + Send>>;

/// Handle to a language model.
///
/// `generate` is the required entry point.  Providers that can stream
/// override `supports_streaming` and `stream`; for the rest, the default
/// `stream` adapts the one-shot response into a synthetic single-chunk event
/// stream so that every caller can assemble messages through the
/// [`crate::StreamAccumulator`].
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Human-readable provider name for status display.
    fn name(&self) -> &str;

    /// Model identifier as reported to users.
    fn model_name(&self) -> &str;

    /// One-shot completion.
    async fn generate(&self, req: GenerateOptions) -> anyhow::Result<ModelResponse>;

    /// Whether [`ModelProvider::stream`] delivers true incremental deltas.
    /// When false, callers should not surface the synthetic events as
    /// streaming progress.
    fn supports_streaming(&self) -> bool {
        false
    }

    /// Streaming completion.
    async fn stream(&self, req: GenerateOptions) -> anyhow::Result<EventStream> {
        let resp = self.generate(req).await?;
        Ok(crate::accumulator::synthetic_stream(resp))
    }
}
