use serde::{Deserialize, Serialize};
use serde_json::Value;

// ─── Content part types ───────────────────────────────────────────────────────

/// Prompt-caching marker attached to a content part.
///
/// Providers that support prompt caching cache the prefix of the request up to
/// and including the marked part.  The agent loop re-seats the marker on the
/// last part of the last message before every model call; markers are never
/// persisted in a fixed position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CacheControl {
    Ephemeral,
}

/// A citation attached to a text part (provider-supplied source attribution).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub cited_text: String,
    pub source: String,
}

/// A single content part in a tool result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolResultPart {
    Text {
        text: String,
    },
    Image {
        /// Data URL (`data:image/png;base64,...`) or HTTPS URL.
        image_url: String,
    },
    ResourceLink {
        uri: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
    },
}

impl ToolResultPart {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }
}

/// A single content part in a multi-part message.
///
/// Assistant messages interleave `Text` and `ToolUse` parts; the synthetic
/// tool-result message the loop inserts carries one `ToolResult` part per
/// answered call.  Both are retained verbatim in the conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text {
        text: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        citations: Vec<Citation>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cache_control: Option<CacheControl>,
    },
    ToolUse {
        /// Call id issued by the model; unique within a response.
        id: String,
        name: String,
        /// Parsed JSON input object.
        input: Value,
    },
    ToolResult {
        /// Matches the `id` of the answered `ToolUse` part.
        tool_use_id: String,
        content: Vec<ToolResultPart>,
        #[serde(default)]
        is_error: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cache_control: Option<CacheControl>,
    },
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text {
            text: text.into(),
            citations: Vec::new(),
            cache_control: None,
        }
    }

    pub fn tool_use(id: impl Into<String>, name: impl Into<String>, input: Value) -> Self {
        Self::ToolUse {
            id: id.into(),
            name: name.into(),
            input,
        }
    }

    pub fn tool_result(
        tool_use_id: impl Into<String>,
        content: Vec<ToolResultPart>,
        is_error: bool,
    ) -> Self {
        Self::ToolResult {
            tool_use_id: tool_use_id.into(),
            content,
            is_error,
            cache_control: None,
        }
    }

    /// Whether this part can carry a [`CacheControl`] marker.
    /// Tool-use parts cannot; providers reject markers on them.
    pub fn supports_cache_control(&self) -> bool {
        !matches!(self, Self::ToolUse { .. })
    }

    pub fn clear_cache_control(&mut self) {
        match self {
            Self::Text { cache_control, .. } | Self::ToolResult { cache_control, .. } => {
                *cache_control = None;
            }
            Self::ToolUse { .. } => {}
        }
    }

    /// Set the marker; returns false when this part does not support one.
    pub fn set_cache_control(&mut self, cc: CacheControl) -> bool {
        match self {
            Self::Text { cache_control, .. } | Self::ToolResult { cache_control, .. } => {
                *cache_control = Some(cc);
                true
            }
            Self::ToolUse { .. } => false,
        }
    }
}

// ─── Message types ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    /// Role of the synthetic message carrying tool results back to the model.
    Tool,
}

/// A single message in the conversation history: a role plus an ordered list
/// of content parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Vec<ContentPart>,
}

/// Borrowed view of a tool-use request inside an assistant message.
#[derive(Debug, Clone, Copy)]
pub struct ToolUseRef<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub input: &'a Value,
}

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: vec![ContentPart::text(text)],
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: vec![ContentPart::text(text)],
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: vec![ContentPart::text(text)],
        }
    }

    /// The synthetic message answering one assistant turn's tool calls.
    /// `parts` must be `ToolResult` parts in the order the calls were issued.
    pub fn tool_results(parts: Vec<ContentPart>) -> Self {
        Self {
            role: Role::Tool,
            content: parts,
        }
    }

    /// Concatenated text of all `Text` parts, in order.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|p| match p {
                ContentPart::Text { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// All tool-use requests issued by this message, in order.
    pub fn tool_uses(&self) -> Vec<ToolUseRef<'_>> {
        self.content
            .iter()
            .filter_map(|p| match p {
                ContentPart::ToolUse { id, name, input } => Some(ToolUseRef {
                    id: id.as_str(),
                    name: name.as_str(),
                    input,
                }),
                _ => None,
            })
            .collect()
    }

    pub fn clear_cache_control(&mut self) {
        for part in &mut self.content {
            part.clear_cache_control();
        }
    }

    /// Mark the last content part as the cache boundary.  Returns false when
    /// the message is empty or the last part does not support a marker.
    pub fn mark_last_part_ephemeral(&mut self) -> bool {
        match self.content.last_mut() {
            Some(part) => part.set_cache_control(CacheControl::Ephemeral),
            None => false,
        }
    }
}

// ─── Usage ────────────────────────────────────────────────────────────────────

/// Token usage from one model turn.  Summed element-wise across a response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub cache_creation_input_tokens: u32,
    pub cache_read_input_tokens: u32,
}

impl Usage {
    pub fn add(&mut self, other: &Usage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.cache_creation_input_tokens += other.cache_creation_input_tokens;
        self.cache_read_input_tokens += other.cache_read_input_tokens;
    }
}

// ─── Request types ────────────────────────────────────────────────────────────

/// A tool schema provided to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    /// JSON Schema of the input object
    pub parameters: Value,
}

/// How the model may use tools on a given turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolChoice {
    /// The model decides.
    Auto,
    /// The model must call some tool.
    Any,
    /// The model must not call any tool.
    None,
    /// The model must call the named tool.
    Tool(String),
}

/// Request sent to a model provider.  Built from the agent's model settings
/// plus per-turn state (messages, composed system prompt, tool schemas).
#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    pub messages: Vec<Message>,
    pub system_prompt: Option<String>,
    pub tools: Vec<ToolSchema>,
    pub temperature: Option<f32>,
    pub presence_penalty: Option<f32>,
    pub frequency_penalty: Option<f32>,
    pub max_tokens: Option<u32>,
    pub tool_choice: Option<ToolChoice>,
    pub parallel_tool_calls: Option<bool>,
    /// Enables the prompt-caching marker migration in the loop and forwards
    /// the caching hint to providers that honour it.
    pub caching: Option<bool>,
    pub reasoning_effort: Option<String>,
    pub reasoning_budget: Option<u32>,
    pub features: Vec<String>,
    pub request_headers: Vec<(String, String)>,
}

impl GenerateOptions {
    pub fn with_messages(mut self, messages: Vec<Message>) -> Self {
        self.messages = messages;
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolSchema>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_tool_choice(mut self, choice: ToolChoice) -> Self {
        self.tool_choice = Some(choice);
        self
    }
}

/// One complete assistant turn returned by a provider.
#[derive(Debug, Clone)]
pub struct ModelResponse {
    pub message: Message,
    pub usage: Usage,
}

impl ModelResponse {
    pub fn tool_uses(&self) -> Vec<ToolUseRef<'_>> {
        self.message.tool_uses()
    }
}

// ─── Streaming events ─────────────────────────────────────────────────────────

/// A single streamed delta from the model.
///
/// Streaming providers emit these as received; the non-streaming path adapts
/// a one-shot response into the same event sequence so both paths assemble
/// the final [`Message`] through [`crate::StreamAccumulator`].
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A new content part begins.  For tool-use parts the `input` may be an
    /// empty object, to be filled in by `InputJsonDelta` events.
    ContentBlockStart { index: usize, part: ContentPart },
    /// Text appended to the part at `index`.
    TextDelta { index: usize, text: String },
    /// A fragment of the JSON arguments of the tool-use part at `index`.
    InputJsonDelta { index: usize, partial_json: String },
    /// The part at `index` is complete.
    ContentBlockStop { index: usize },
    /// The message is complete; carries the turn's usage.
    MessageStop { usage: Usage },
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    // ── Message construction ──────────────────────────────────────────────────

    #[test]
    fn message_user_sets_role_and_text() {
        let m = Message::user("hello");
        assert_eq!(m.role, Role::User);
        assert_eq!(m.text(), "hello");
    }

    #[test]
    fn message_assistant_sets_role_and_text() {
        let m = Message::assistant("reply");
        assert_eq!(m.role, Role::Assistant);
        assert_eq!(m.text(), "reply");
    }

    #[test]
    fn tool_results_message_uses_tool_role() {
        let m = Message::tool_results(vec![ContentPart::tool_result(
            "id-1",
            vec![ToolResultPart::text("out")],
            false,
        )]);
        assert_eq!(m.role, Role::Tool);
        assert_eq!(m.content.len(), 1);
    }

    #[test]
    fn text_concatenates_text_parts_only() {
        let m = Message {
            role: Role::Assistant,
            content: vec![
                ContentPart::text("a"),
                ContentPart::tool_use("1", "t", json!({})),
                ContentPart::text("b"),
            ],
        };
        assert_eq!(m.text(), "a\nb");
    }

    #[test]
    fn tool_uses_returns_requests_in_order() {
        let m = Message {
            role: Role::Assistant,
            content: vec![
                ContentPart::tool_use("a", "first", json!({"x": 1})),
                ContentPart::text("between"),
                ContentPart::tool_use("b", "second", json!({})),
            ],
        };
        let uses = m.tool_uses();
        assert_eq!(uses.len(), 2);
        assert_eq!(uses[0].id, "a");
        assert_eq!(uses[0].name, "first");
        assert_eq!(uses[1].id, "b");
    }

    // ── Cache-control markers ─────────────────────────────────────────────────

    #[test]
    fn mark_last_part_ephemeral_on_text() {
        let mut m = Message::user("hi");
        assert!(m.mark_last_part_ephemeral());
        match &m.content[0] {
            ContentPart::Text { cache_control, .. } => {
                assert_eq!(*cache_control, Some(CacheControl::Ephemeral));
            }
            _ => panic!("wrong part"),
        }
    }

    #[test]
    fn mark_last_part_refused_for_tool_use() {
        let mut m = Message {
            role: Role::Assistant,
            content: vec![ContentPart::tool_use("1", "t", json!({}))],
        };
        assert!(!m.mark_last_part_ephemeral());
    }

    #[test]
    fn mark_last_part_refused_for_empty_message() {
        let mut m = Message {
            role: Role::User,
            content: vec![],
        };
        assert!(!m.mark_last_part_ephemeral());
    }

    #[test]
    fn clear_cache_control_removes_markers() {
        let mut m = Message::user("hi");
        m.mark_last_part_ephemeral();
        m.clear_cache_control();
        match &m.content[0] {
            ContentPart::Text { cache_control, .. } => assert!(cache_control.is_none()),
            _ => panic!("wrong part"),
        }
    }

    // ── Usage ─────────────────────────────────────────────────────────────────

    #[test]
    fn usage_add_is_elementwise() {
        let mut total = Usage {
            input_tokens: 1,
            output_tokens: 2,
            cache_creation_input_tokens: 3,
            cache_read_input_tokens: 4,
        };
        total.add(&Usage {
            input_tokens: 10,
            output_tokens: 20,
            cache_creation_input_tokens: 30,
            cache_read_input_tokens: 40,
        });
        assert_eq!(total.input_tokens, 11);
        assert_eq!(total.output_tokens, 22);
        assert_eq!(total.cache_creation_input_tokens, 33);
        assert_eq!(total.cache_read_input_tokens, 44);
    }

    // ── Serialisation round-trip ──────────────────────────────────────────────

    #[test]
    fn message_serialises_and_deserialises() {
        let original = Message {
            role: Role::Assistant,
            content: vec![
                ContentPart::text("checking"),
                ContentPart::tool_use("call-1", "get_time", json!({"tz": "UTC"})),
            ],
        };
        let encoded = serde_json::to_string(&original).unwrap();
        let decoded: Message = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn tool_result_part_round_trip() {
        let original = ContentPart::tool_result(
            "call-1",
            vec![
                ToolResultPart::text("ok"),
                ToolResultPart::ResourceLink {
                    uri: "file:///tmp/x".into(),
                    title: None,
                },
            ],
            true,
        );
        let encoded = serde_json::to_string(&original).unwrap();
        let decoded: ContentPart = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn cache_control_omitted_from_json_when_none() {
        let encoded = serde_json::to_string(&ContentPart::text("x")).unwrap();
        assert!(!encoded.contains("cache_control"), "got: {encoded}");
    }

    #[test]
    fn tool_choice_serialises_snake_case() {
        let encoded = serde_json::to_string(&ToolChoice::None).unwrap();
        assert_eq!(encoded, "\"none\"");
    }
}
