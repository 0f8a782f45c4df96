// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::BTreeMap;

use anyhow::{bail, Context};
use futures::{stream, StreamExt};
use tracing::warn;

use crate::provider::EventStream;
use crate::{ContentPart, Message, ModelResponse, Role, StreamEvent, Usage};

/// Reassembles a complete assistant [`Message`] from streamed deltas.
///
/// This is the canonical constructor for assistant messages: the streaming
/// path feeds provider deltas in as they arrive, and the one-shot path is
/// adapted through [`synthetic_stream`] so both produce identical messages.
///
/// Blocks are keyed by the provider's content-part index.  Text deltas append
/// to the block's text; tool-use argument deltas append to a per-block JSON
/// buffer that is parsed when the block stops.
#[derive(Default)]
pub struct StreamAccumulator {
    blocks: BTreeMap<usize, Block>,
    usage: Option<Usage>,
}

struct Block {
    part: ContentPart,
    json_buf: String,
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one streamed event into the accumulator.
    pub fn push(&mut self, event: &StreamEvent) -> anyhow::Result<()> {
        match event {
            StreamEvent::ContentBlockStart { index, part } => {
                self.blocks.insert(
                    *index,
                    Block {
                        part: part.clone(),
                        json_buf: String::new(),
                    },
                );
            }
            StreamEvent::TextDelta { index, text } => {
                // Some providers skip the start event for plain text blocks.
                let block = self.blocks.entry(*index).or_insert_with(|| Block {
                    part: ContentPart::text(""),
                    json_buf: String::new(),
                });
                match &mut block.part {
                    ContentPart::Text { text: buf, .. } => buf.push_str(text),
                    other => bail!("text delta for non-text block {index}: {other:?}"),
                }
            }
            StreamEvent::InputJsonDelta {
                index,
                partial_json,
            } => {
                let block = self
                    .blocks
                    .get_mut(index)
                    .with_context(|| format!("argument delta for unknown block {index}"))?;
                if !matches!(block.part, ContentPart::ToolUse { .. }) {
                    bail!("argument delta for non-tool-use block {index}");
                }
                block.json_buf.push_str(partial_json);
            }
            StreamEvent::ContentBlockStop { index } => {
                let block = self
                    .blocks
                    .get_mut(index)
                    .with_context(|| format!("stop for unknown block {index}"))?;
                if !block.json_buf.is_empty() {
                    let parsed: serde_json::Value = serde_json::from_str(&block.json_buf)
                        .with_context(|| {
                            format!("invalid tool-use argument JSON in block {index}")
                        })?;
                    if let ContentPart::ToolUse { input, .. } = &mut block.part {
                        *input = parsed;
                    }
                    block.json_buf.clear();
                }
            }
            StreamEvent::MessageStop { usage } => {
                self.usage = Some(*usage);
            }
        }
        Ok(())
    }

    /// Finish accumulation and return the assembled message plus usage.
    ///
    /// Fails when the stream never delivered a `MessageStop` — a provider that
    /// ends a stream without one produced no response at all.
    pub fn finish(self) -> anyhow::Result<(Message, Usage)> {
        let usage = self
            .usage
            .context("stream ended without a message stop")?;
        let mut content = Vec::with_capacity(self.blocks.len());
        for (index, block) in self.blocks {
            let keep = match &block.part {
                // Drop blocks that carry nothing; providers occasionally emit
                // an empty leading text block.
                ContentPart::Text { text, citations, .. } => {
                    !text.is_empty() || !citations.is_empty()
                }
                ContentPart::ToolUse { name, .. } if name.is_empty() => {
                    warn!(index, "dropping tool-use block with empty name");
                    false
                }
                _ => true,
            };
            if keep {
                content.push(block.part);
            }
        }
        Ok((
            Message {
                role: Role::Assistant,
                content,
            },
            usage,
        ))
    }
}

/// Adapt a one-shot [`ModelResponse`] into the event sequence a streaming
/// provider would have produced: one start/stop pair per content part with the
/// full part carried on the start event, then a message stop with the usage.
pub fn synthetic_stream(resp: ModelResponse) -> EventStream {
    let mut events = Vec::with_capacity(resp.message.content.len() * 2 + 1);
    for (index, part) in resp.message.content.into_iter().enumerate() {
        events.push(StreamEvent::ContentBlockStart { index, part });
        events.push(StreamEvent::ContentBlockStop { index });
    }
    events.push(StreamEvent::MessageStop { usage: resp.usage });
    Box::pin(stream::iter(events.into_iter().map(Ok)))
}

/// Drain a full event stream through an accumulator.
pub async fn assemble(mut events: EventStream) -> anyhow::Result<(Message, Usage)> {
    let mut acc = StreamAccumulator::new();
    while let Some(event) = events.next().await {
        acc.push(&event?)?;
    }
    acc.finish()
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn usage(output: u32) -> Usage {
        Usage {
            input_tokens: 1,
            output_tokens: output,
            ..Usage::default()
        }
    }

    // ── Text accumulation ─────────────────────────────────────────────────────

    #[test]
    fn text_deltas_append_in_order() {
        let mut acc = StreamAccumulator::new();
        acc.push(&StreamEvent::ContentBlockStart {
            index: 0,
            part: ContentPart::text(""),
        })
        .unwrap();
        acc.push(&StreamEvent::TextDelta {
            index: 0,
            text: "Hel".into(),
        })
        .unwrap();
        acc.push(&StreamEvent::TextDelta {
            index: 0,
            text: "lo".into(),
        })
        .unwrap();
        acc.push(&StreamEvent::ContentBlockStop { index: 0 }).unwrap();
        acc.push(&StreamEvent::MessageStop { usage: usage(2) }).unwrap();

        let (message, u) = acc.finish().unwrap();
        assert_eq!(message.role, Role::Assistant);
        assert_eq!(message.text(), "Hello");
        assert_eq!(u.output_tokens, 2);
    }

    #[test]
    fn text_delta_without_start_creates_block() {
        let mut acc = StreamAccumulator::new();
        acc.push(&StreamEvent::TextDelta {
            index: 0,
            text: "hi".into(),
        })
        .unwrap();
        acc.push(&StreamEvent::MessageStop {
            usage: Usage::default(),
        })
        .unwrap();
        let (message, _) = acc.finish().unwrap();
        assert_eq!(message.text(), "hi");
    }

    // ── Tool-use argument accumulation ────────────────────────────────────────

    #[test]
    fn tool_use_arguments_parsed_at_block_stop() {
        let mut acc = StreamAccumulator::new();
        acc.push(&StreamEvent::ContentBlockStart {
            index: 0,
            part: ContentPart::tool_use("call-1", "bash", json!({})),
        })
        .unwrap();
        acc.push(&StreamEvent::InputJsonDelta {
            index: 0,
            partial_json: "{\"command\":".into(),
        })
        .unwrap();
        acc.push(&StreamEvent::InputJsonDelta {
            index: 0,
            partial_json: "\"ls\"}".into(),
        })
        .unwrap();
        acc.push(&StreamEvent::ContentBlockStop { index: 0 }).unwrap();
        acc.push(&StreamEvent::MessageStop {
            usage: Usage::default(),
        })
        .unwrap();

        let (message, _) = acc.finish().unwrap();
        let uses = message.tool_uses();
        assert_eq!(uses.len(), 1);
        assert_eq!(uses[0].id, "call-1");
        assert_eq!(*uses[0].input, json!({"command": "ls"}));
    }

    #[test]
    fn invalid_argument_json_is_an_error() {
        let mut acc = StreamAccumulator::new();
        acc.push(&StreamEvent::ContentBlockStart {
            index: 0,
            part: ContentPart::tool_use("c", "t", json!({})),
        })
        .unwrap();
        acc.push(&StreamEvent::InputJsonDelta {
            index: 0,
            partial_json: "{not json".into(),
        })
        .unwrap();
        assert!(acc.push(&StreamEvent::ContentBlockStop { index: 0 }).is_err());
    }

    #[test]
    fn argument_delta_for_unknown_block_is_an_error() {
        let mut acc = StreamAccumulator::new();
        let err = acc.push(&StreamEvent::InputJsonDelta {
            index: 7,
            partial_json: "{}".into(),
        });
        assert!(err.is_err());
    }

    // ── Interleaved blocks ────────────────────────────────────────────────────

    #[test]
    fn parts_ordered_by_index_not_arrival() {
        let mut acc = StreamAccumulator::new();
        acc.push(&StreamEvent::ContentBlockStart {
            index: 1,
            part: ContentPart::tool_use("c", "t", json!({"a": 1})),
        })
        .unwrap();
        acc.push(&StreamEvent::ContentBlockStart {
            index: 0,
            part: ContentPart::text("lead"),
        })
        .unwrap();
        acc.push(&StreamEvent::ContentBlockStop { index: 1 }).unwrap();
        acc.push(&StreamEvent::ContentBlockStop { index: 0 }).unwrap();
        acc.push(&StreamEvent::MessageStop {
            usage: Usage::default(),
        })
        .unwrap();

        let (message, _) = acc.finish().unwrap();
        assert!(matches!(message.content[0], ContentPart::Text { .. }));
        assert!(matches!(message.content[1], ContentPart::ToolUse { .. }));
    }

    // ── Missing message stop ──────────────────────────────────────────────────

    #[test]
    fn finish_without_message_stop_fails() {
        let mut acc = StreamAccumulator::new();
        acc.push(&StreamEvent::TextDelta {
            index: 0,
            text: "partial".into(),
        })
        .unwrap();
        assert!(acc.finish().is_err());
    }

    // ── Synthetic stream round-trip ───────────────────────────────────────────

    #[tokio::test]
    async fn synthetic_stream_reassembles_identically() {
        let original = ModelResponse {
            message: Message {
                role: Role::Assistant,
                content: vec![
                    ContentPart::text("Checking"),
                    ContentPart::tool_use("a", "get_time", json!({"tz": "UTC"})),
                ],
            },
            usage: usage(9),
        };
        let (message, u) = assemble(synthetic_stream(original.clone())).await.unwrap();
        assert_eq!(message, original.message);
        assert_eq!(u, original.usage);
    }

    #[tokio::test]
    async fn empty_text_blocks_are_dropped() {
        let resp = ModelResponse {
            message: Message {
                role: Role::Assistant,
                content: vec![ContentPart::text(""), ContentPart::text("real")],
            },
            usage: Usage::default(),
        };
        let (message, _) = assemble(synthetic_stream(resp)).await.unwrap();
        assert_eq!(message.content.len(), 1);
        assert_eq!(message.text(), "real");
    }
}
