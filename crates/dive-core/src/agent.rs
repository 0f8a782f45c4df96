// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use dive_model::{
    assemble, synthetic_stream, ContentPart, GenerateOptions, Message, ModelProvider,
    StreamAccumulator, ToolChoice, ToolResultPart, Usage,
};
use dive_session::{Session, SessionStore, StoreError};
use dive_tools::{ToolCall, ToolContext, ToolEvent, ToolOutput, ToolOutputPart, ToolRegistry};

use crate::error::AgentError;
use crate::events::{Emitter, ResponseItem, ToolCallResult};
use crate::hooks::{
    GenerationState, HookDecision, HookRunner, Hooks, PostGenerationState, ToolResultContext,
    ToolUseContext,
};
use crate::permissions::{
    derive_category, Confirmation, ConfirmationRequest, Confirmer, PermissionDecision,
    PermissionManager,
};
use crate::response::{CreateResponse, Response};

pub const DEFAULT_TOOL_ITERATION_LIMIT: usize = 100;
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Default message for a denied call when neither the rule nor the preview
/// supplies one.
const DENIED_MESSAGE: &str = "Tool execution denied";

/// Appended to the tool-result message of the last permitted iteration so the
/// model wraps up instead of returning a partial answer mid-call.
const TOOL_BUDGET_NOTICE: &str = "You have reached the tool-call limit. \
     Do not call any more tools. \
     Produce your final answer for the user from the results gathered so far.";

/// Per-request knobs forwarded to the model on every iteration.
#[derive(Debug, Clone)]
pub struct ModelSettings {
    pub temperature: Option<f32>,
    pub presence_penalty: Option<f32>,
    pub frequency_penalty: Option<f32>,
    pub parallel_tool_calls: Option<bool>,
    /// Enables the cache-marker migration and the provider caching hint.
    pub caching: bool,
    pub max_tokens: Option<u32>,
    pub reasoning_budget: Option<u32>,
    pub reasoning_effort: Option<String>,
    pub tool_choice: Option<ToolChoice>,
    pub features: Vec<String>,
    pub request_headers: Vec<(String, String)>,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            temperature: None,
            presence_penalty: None,
            frequency_penalty: None,
            parallel_tool_calls: None,
            caching: true,
            max_tokens: None,
            reasoning_budget: None,
            reasoning_effort: None,
            tool_choice: None,
            features: Vec::new(),
            request_headers: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub name: String,
    /// Base system prompt; tool system-instructions are appended to it.
    pub system_prompt: Option<String>,
    pub response_timeout: Duration,
    /// Maximum tool-dispatching iterations; one extra model call is always
    /// granted for the final answer.
    pub tool_iteration_limit: usize,
    pub model_settings: ModelSettings,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: "agent".into(),
            system_prompt: None,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            tool_iteration_limit: DEFAULT_TOOL_ITERATION_LIMIT,
            model_settings: ModelSettings::default(),
        }
    }
}

/// Internal resolution of a permission verdict after confirmation.
enum Verdict {
    Allow,
    Deny { message: Option<String> },
    Feedback(String),
}

/// A configured bundle of model + tools + hooks + permission policy.
///
/// Immutable after construction and shareable across concurrent responses;
/// the only mutable state (permission mode, session allowlist) lives behind
/// the permission manager's mutex.
pub struct Agent {
    config: AgentConfig,
    model: Arc<dyn ModelProvider>,
    tools: Arc<ToolRegistry>,
    hooks: HookRunner,
    permissions: Arc<PermissionManager>,
    confirmer: Option<Arc<dyn Confirmer>>,
    store: Option<Arc<dyn SessionStore>>,
}

impl Agent {
    pub fn new(model: Arc<dyn ModelProvider>, tools: Arc<ToolRegistry>, config: AgentConfig) -> Self {
        Self {
            config,
            model,
            tools,
            hooks: HookRunner::default(),
            permissions: Arc::new(PermissionManager::default()),
            confirmer: None,
            store: None,
        }
    }

    pub fn with_hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = HookRunner::new(hooks);
        self
    }

    pub fn with_permissions(mut self, permissions: Arc<PermissionManager>) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn with_confirmer(mut self, confirmer: Arc<dyn Confirmer>) -> Self {
        self.confirmer = Some(confirmer);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn permissions(&self) -> &Arc<PermissionManager> {
        &self.permissions
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    /// Drive one response to completion: a bounded loop of model calls and
    /// sequential tool dispatch, with events delivered in program order.
    pub async fn create_response(
        &self,
        cancel: CancellationToken,
        request: CreateResponse,
    ) -> Result<Response, AgentError> {
        if request.messages.is_empty() {
            return Err(AgentError::NoMessages);
        }
        if cancel.is_cancelled() {
            return Err(AgentError::Cancelled);
        }
        let deadline = Instant::now() + self.config.response_timeout;

        let mut session = match (&self.store, request.session_id.as_deref()) {
            (Some(store), Some(id)) => match self.guard(deadline, &cancel, store.get(id)).await? {
                Ok(session) => session,
                Err(StoreError::NotFound(_)) => Session::with_id(id),
                Err(e) => return Err(e.into()),
            },
            (None, Some(id)) => Session::with_id(id),
            _ => Session::new(),
        };
        if session.user_id.is_none() {
            session.user_id = request.user_id.clone();
        }

        let mut emitter = Emitter::new(request.handler.clone(), session.id.clone());

        // Working conversation = stored history + this request's messages.
        let mut conversation = session.messages.clone();
        conversation.extend(request.messages.iter().cloned());
        session.push_many(request.messages.iter().cloned());

        // Pre-generation hooks may rewrite the prompt and the conversation.
        let mut state = GenerationState {
            system_prompt: self.compose_system_prompt(),
            messages: conversation,
        };
        self.hooks.run_pre_generation(&mut state).await?;
        let GenerationState {
            system_prompt,
            messages: mut conversation,
        } = state;

        let mut response = Response::new(session.id.clone(), session.user_id.clone());
        let mut new_messages: Vec<Message> = Vec::new();
        let mut forced_tool_choice: Option<ToolChoice> = None;
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();

        let limit = self.config.tool_iteration_limit;
        for iteration in 0..=limit {
            // The cache marker belongs on the last part of the last message:
            // the stable prefix grows at the tail, so the marker is re-seated
            // on every iteration rather than persisted.
            for message in &mut conversation {
                message.clear_cache_control();
            }
            if self.config.model_settings.caching {
                if let Some(last) = conversation.last_mut() {
                    last.mark_last_part_ephemeral();
                }
            }

            let options =
                self.build_options(&conversation, &system_prompt, forced_tool_choice.take());

            let (assistant, turn_usage) = if self.model.supports_streaming() {
                let mut stream = self
                    .guard(deadline, &cancel, self.model.stream(options))
                    .await?
                    .map_err(AgentError::Transport)?;
                let mut acc = StreamAccumulator::new();
                loop {
                    let next = self.guard(deadline, &cancel, stream.next()).await?;
                    let Some(event) = next else { break };
                    let event = event.map_err(AgentError::Transport)?;
                    emitter
                        .emit(ResponseItem::ModelEvent {
                            event: event.clone(),
                        })
                        .await?;
                    acc.push(&event).map_err(AgentError::Transport)?;
                }
                acc.finish().map_err(AgentError::NoResponse)?
            } else {
                let generated = self
                    .guard(deadline, &cancel, self.model.generate(options))
                    .await?
                    .map_err(AgentError::Transport)?;
                // Both paths assemble through the accumulator so they cannot
                // diverge in message shape.
                assemble(synthetic_stream(generated))
                    .await
                    .map_err(AgentError::NoResponse)?
            };

            response.usage.add(&turn_usage);
            emitter
                .emit(ResponseItem::Message {
                    message: assistant.clone(),
                    usage: turn_usage,
                })
                .await?;
            conversation.push(assistant.clone());
            new_messages.push(assistant.clone());
            response.messages.push(assistant.clone());

            let calls: Vec<ToolCall> = assistant
                .tool_uses()
                .iter()
                .map(|u| ToolCall {
                    id: u.id.to_string(),
                    name: u.name.to_string(),
                    input: u.input.clone(),
                })
                .collect();
            if calls.is_empty() {
                break;
            }

            debug!(iteration, count = calls.len(), "dispatching tool calls");
            let mut parts = Vec::with_capacity(calls.len() + 1);
            for call in &calls {
                let result = self
                    .dispatch_tool_call(
                        deadline,
                        &cancel,
                        &mut emitter,
                        &session.id,
                        call,
                        &events_tx,
                        &mut events_rx,
                    )
                    .await?;
                parts.push(tool_result_part(&result));
            }

            // Last permitted iteration: force a tool-free final turn so the
            // model wraps up instead of exhausting the budget mid-call.
            if iteration + 1 == limit {
                parts.push(ContentPart::text(TOOL_BUDGET_NOTICE));
                forced_tool_choice = Some(ToolChoice::None);
            }

            let tool_message = Message::tool_results(parts);
            emitter
                .emit(ResponseItem::Message {
                    message: tool_message.clone(),
                    usage: Usage::default(),
                })
                .await?;
            conversation.push(tool_message.clone());
            new_messages.push(tool_message.clone());
            response.messages.push(tool_message);
        }

        response.finished_at = Some(Utc::now());

        let post_state = PostGenerationState {
            response: &response,
            new_messages: &new_messages,
            usage: response.usage,
        };
        self.hooks.run_post_generation(&post_state).await?;

        if let Some(store) = &self.store {
            session.push_many(new_messages);
            self.guard(deadline, &cancel, store.put(&session)).await??;
        }

        Ok(response)
    }

    /// Run the dispatch pipeline for one call: lookup, skill restriction,
    /// preview, permission ladder, confirmation, execution, post hooks.
    #[allow(clippy::too_many_arguments)]
    async fn dispatch_tool_call(
        &self,
        deadline: Instant,
        cancel: &CancellationToken,
        emitter: &mut Emitter,
        session_id: &str,
        call: &ToolCall,
        events_tx: &mpsc::UnboundedSender<ToolEvent>,
        events_rx: &mut mpsc::UnboundedReceiver<ToolEvent>,
    ) -> Result<ToolCallResult, AgentError> {
        // An unknown tool is a model hallucination; the response cannot
        // continue meaningfully.
        let Some(tool) = self.tools.get(&call.name) else {
            return Err(AgentError::UnknownTool(call.name.clone()));
        };

        // Skill restriction: every restricting tool in the belt must approve.
        let mut skill_block: Option<String> = None;
        for restricting in self.tools.iter() {
            if restricting.allows_tool(&call.name) == Some(false) {
                skill_block = Some(format!(
                    "tool \"{}\" is not allowed while \"{}\" is active",
                    call.name,
                    restricting.name()
                ));
                break;
            }
        }

        // Preview is advisory: it feeds the UI and confirmation prompts.
        let preview = if skill_block.is_none() {
            self.guard(deadline, cancel, tool.preview(&call.input))
                .await?
        } else {
            None
        };

        emitter
            .emit(ResponseItem::ToolCall { call: call.clone() })
            .await?;

        let mut effective_input = call.input.clone();
        let mut transport_error: Option<String> = None;

        let output = if let Some(message) = skill_block {
            ToolOutput::err(message)
        } else {
            let mut hook_ctx = ToolUseContext {
                tool_name: call.name.clone(),
                call_id: call.id.clone(),
                input: effective_input,
            };
            let hook_decision = self.hooks.run_pre_tool_use(&mut hook_ctx).await?;
            effective_input = hook_ctx.input;

            let decision = match hook_decision {
                HookDecision::Continue => {
                    let effective_call = ToolCall {
                        id: call.id.clone(),
                        name: call.name.clone(),
                        input: effective_input.clone(),
                    };
                    self.permissions
                        .evaluate(tool.as_ref(), &effective_call, session_id)
                        .await
                }
                HookDecision::Allow => PermissionDecision::Allow { category: None },
                HookDecision::Deny { message } => PermissionDecision::Deny {
                    message: Some(message),
                },
                HookDecision::Ask { message } => PermissionDecision::Ask { message },
            };

            let verdict = match decision {
                PermissionDecision::Allow { .. } => Verdict::Allow,
                PermissionDecision::Deny { message } => Verdict::Deny { message },
                PermissionDecision::Ask { message } => {
                    self.resolve_ask(
                        deadline,
                        cancel,
                        session_id,
                        call,
                        message.or_else(|| preview.clone()),
                    )
                    .await?
                }
            };

            match verdict {
                Verdict::Allow => {
                    let tool_cancel = cancel.child_token();
                    let ctx =
                        ToolContext::new(tool_cancel.clone()).with_events(events_tx.clone());
                    let task_tool = Arc::clone(&tool);
                    let task_input = effective_input.clone();
                    // Spawned so a panicking tool is isolated and reported;
                    // awaited immediately, so dispatch stays sequential in
                    // issued order.
                    let handle =
                        tokio::spawn(async move { task_tool.call(&ctx, &task_input).await });
                    let joined = match self.guard(deadline, cancel, handle).await {
                        Ok(joined) => joined,
                        Err(e) => {
                            tool_cancel.cancel();
                            return Err(e);
                        }
                    };
                    match joined {
                        Ok(Ok(output)) => output,
                        Ok(Err(e)) => {
                            let text = e.to_string();
                            transport_error = Some(text.clone());
                            ToolOutput::err(text)
                        }
                        Err(join_error) => {
                            let text = format!("tool execution panicked: {join_error}");
                            transport_error = Some(text.clone());
                            ToolOutput::err(text)
                        }
                    }
                }
                Verdict::Deny { message } => {
                    let text = message
                        .or_else(|| preview.clone())
                        .unwrap_or_else(|| DENIED_MESSAGE.to_string());
                    ToolOutput::err(text)
                }
                // User feedback reads as guidance, not as a tool failure.
                Verdict::Feedback(text) => ToolOutput {
                    content: vec![ToolOutputPart::Text(text)],
                    is_error: false,
                },
            }
        };

        // Post hooks run after every result (allow, deny, or error) and may
        // rewrite it before it reaches the model.
        let mut post_ctx = ToolResultContext {
            tool_name: call.name.clone(),
            call_id: call.id.clone(),
            input: effective_input.clone(),
            result: output,
        };
        self.hooks.run_post_tool_use(&mut post_ctx).await?;

        let result = ToolCallResult {
            call_id: call.id.clone(),
            tool_name: call.name.clone(),
            input: effective_input,
            preview,
            output: Some(post_ctx.result),
            error: transport_error,
        };

        // Surface progress events the tool reported while running.
        while let Ok(ToolEvent::TodoUpdate(items)) = events_rx.try_recv() {
            emitter.emit(ResponseItem::Todo { items }).await?;
        }

        emitter
            .emit(ResponseItem::ToolCallResult {
                result: result.clone(),
            })
            .await?;
        Ok(result)
    }

    /// Resolve an `ask` verdict through the confirmation callback.  Without a
    /// configured confirmer, ask degrades to allow.
    async fn resolve_ask(
        &self,
        deadline: Instant,
        cancel: &CancellationToken,
        session_id: &str,
        call: &ToolCall,
        message: Option<String>,
    ) -> Result<Verdict, AgentError> {
        let Some(confirmer) = &self.confirmer else {
            return Ok(Verdict::Allow);
        };
        let message = message.unwrap_or_default();
        let request = ConfirmationRequest {
            tool_name: &call.name,
            call,
            message: &message,
        };
        let answer = self
            .guard(deadline, cancel, confirmer.confirm(request))
            .await?;
        Ok(match answer {
            Ok(Confirmation::Approved) => Verdict::Allow,
            Ok(Confirmation::ApprovedForSession) => {
                self.permissions
                    .allow_for_session(session_id, derive_category(&call.name));
                Verdict::Allow
            }
            Ok(Confirmation::Denied) => Verdict::Deny { message: None },
            Ok(Confirmation::Feedback(text)) => Verdict::Feedback(text),
            Err(e) => {
                warn!(error = %e, tool = %call.name, "confirmation callback failed; denying");
                Verdict::Deny { message: None }
            }
        })
    }

    /// Base prompt plus every tool's system instructions, in declaration
    /// order, separated by blank lines.  Composed once per response.
    fn compose_system_prompt(&self) -> String {
        let mut sections: Vec<String> = Vec::new();
        if let Some(base) = &self.config.system_prompt {
            if !base.is_empty() {
                sections.push(base.clone());
            }
        }
        sections.extend(self.tools.system_instructions());
        sections.join("\n\n")
    }

    fn build_options(
        &self,
        conversation: &[Message],
        system_prompt: &str,
        forced_tool_choice: Option<ToolChoice>,
    ) -> GenerateOptions {
        let settings = &self.config.model_settings;
        GenerateOptions {
            messages: conversation.to_vec(),
            system_prompt: (!system_prompt.is_empty()).then(|| system_prompt.to_string()),
            tools: self
                .tools
                .schemas()
                .into_iter()
                .map(|s| dive_model::ToolSchema {
                    name: s.name,
                    description: s.description,
                    parameters: s.parameters,
                })
                .collect(),
            temperature: settings.temperature,
            presence_penalty: settings.presence_penalty,
            frequency_penalty: settings.frequency_penalty,
            max_tokens: settings.max_tokens,
            tool_choice: forced_tool_choice.or_else(|| settings.tool_choice.clone()),
            parallel_tool_calls: settings.parallel_tool_calls,
            caching: Some(settings.caching),
            reasoning_effort: settings.reasoning_effort.clone(),
            reasoning_budget: settings.reasoning_budget,
            features: settings.features.clone(),
            request_headers: settings.request_headers.clone(),
        }
    }

    /// Race a suspension point against cancellation and the response
    /// deadline.
    async fn guard<F: Future>(
        &self,
        deadline: Instant,
        cancel: &CancellationToken,
        fut: F,
    ) -> Result<F::Output, AgentError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AgentError::Cancelled),
            _ = tokio::time::sleep_until(deadline) => {
                Err(AgentError::Timeout(self.config.response_timeout))
            }
            out = fut => Ok(out),
        }
    }
}

/// Fold a tool call's bound result into the `ToolResult` part sent back to
/// the model.
fn tool_result_part(result: &ToolCallResult) -> ContentPart {
    let output = result
        .output
        .clone()
        .unwrap_or_else(|| ToolOutput::err(DENIED_MESSAGE));
    let is_error = output.is_error;
    let content = output
        .content
        .into_iter()
        .map(|p| match p {
            ToolOutputPart::Text(text) => ToolResultPart::Text { text },
            ToolOutputPart::Image(image_url) => ToolResultPart::Image { image_url },
            ToolOutputPart::ResourceLink { uri, title } => {
                ToolResultPart::ResourceLink { uri, title }
            }
        })
        .collect();
    ContentPart::tool_result(result.call_id.clone(), content, is_error)
}
