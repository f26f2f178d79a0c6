//! LlmGateway - SynthesisGateway backed by an LLM client

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};

use super::{GatewayError, SynthesisGateway, plan_schema};
use crate::domain::{Role, StructuredPlan, Turn};
use crate::llm::{CompletionRequest, LlmClient, Message, ToolDefinition};

/// Name of the tool the model fills in with the plan
pub const RECORD_PLAN_TOOL: &str = "record_project_plan";

/// Reply used when the model answers with nothing
pub const EMPTY_REPLY: &str = "I'm having trouble processing that response.";

const CONVERSE_MAX_TOKENS: u32 = 2048;
const SYNTHESIZE_MAX_TOKENS: u32 = 8192;

/// Gateway that talks to a language model
pub struct LlmGateway {
    llm: Arc<dyn LlmClient>,
    max_tokens: u32,
}

impl LlmGateway {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            llm,
            max_tokens: SYNTHESIZE_MAX_TOKENS,
        }
    }

    /// Cap response length; replies are capped lower still
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Build the system prompt and user-first message list for a reply
    ///
    /// Chat APIs expect the transcript to open with a user message, so any
    /// leading assistant turns (the greeting) move into the system prompt.
    /// Consecutive turns from the same role are merged.
    fn build_chat_request(&self, history: &[Turn], message: &str) -> CompletionRequest {
        debug!(history_len = history.len(), "build_chat_request: called");
        let mut system_prompt = CHAT_SYSTEM_PROMPT.to_string();

        let opening = history.iter().take_while(|t| t.role == Role::Assistant).count();
        if opening > 0 {
            system_prompt.push_str("\n\nYou opened the conversation with:\n");
            for turn in &history[..opening] {
                system_prompt.push_str(&turn.text);
                system_prompt.push('\n');
            }
        }

        let mut messages: Vec<Message> = Vec::new();
        let rest = history[opening..].iter().map(|t| (t.role, t.text.as_str()));
        for (role, text) in rest.chain(std::iter::once((Role::User, message))) {
            if text.trim().is_empty() {
                continue;
            }
            match messages.last_mut() {
                Some(last) if last.role == role => {
                    last.content.push_str("\n\n");
                    last.content.push_str(text);
                }
                _ => messages.push(Message {
                    role,
                    content: text.to_string(),
                }),
            }
        }

        CompletionRequest {
            system_prompt,
            messages,
            tools: vec![],
            tool_choice: None,
            max_tokens: CONVERSE_MAX_TOKENS.min(self.max_tokens),
        }
    }

    fn build_synthesis_request(&self, history: &[Turn]) -> CompletionRequest {
        debug!(history_len = history.len(), "build_synthesis_request: called");
        let prompt = format!(
            "Analyze the following conversation history between a User and a Project Manager.\n\
             Based strictly on the information provided in the conversation, generate a structured Project Plan \
             by calling the {} tool.\n\
             If information is missing for a specific section, make reasonable assumptions based on context \
             or leave it generic/empty, but do NOT make up wild facts.\n\n\
             CONVERSATION HISTORY:\n{}",
            RECORD_PLAN_TOOL,
            render_transcript(history)
        );

        CompletionRequest {
            system_prompt: SYNTHESIS_SYSTEM_PROMPT.to_string(),
            messages: vec![Message::user(prompt)],
            tools: vec![ToolDefinition::new(
                RECORD_PLAN_TOOL,
                "Record the structured project plan extracted from the conversation.",
                plan_schema(),
            )],
            tool_choice: Some(RECORD_PLAN_TOOL.to_string()),
            max_tokens: self.max_tokens,
        }
    }
}

/// Render turns as `ROLE: text` blocks separated by blank lines
pub fn render_transcript(history: &[Turn]) -> String {
    history
        .iter()
        .map(|t| format!("{}: {}", t.role.label(), t.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Find the first JSON object in free text, tolerating code fences
fn extract_json_object(text: &str) -> Option<Value> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}

#[async_trait]
impl SynthesisGateway for LlmGateway {
    async fn converse(&self, history: &[Turn], message: &str) -> Result<String, GatewayError> {
        debug!(history_len = history.len(), "converse: called");
        let request = self.build_chat_request(history, message);
        let response = self.llm.complete(request).await?;

        let reply = response
            .content
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| {
                debug!("converse: empty reply from model");
                EMPTY_REPLY.to_string()
            });
        Ok(reply)
    }

    async fn synthesize(&self, history: &[Turn]) -> Result<Option<StructuredPlan>, GatewayError> {
        debug!(history_len = history.len(), "synthesize: called");
        if history.is_empty() {
            return Ok(None);
        }

        let response = self.llm.complete(self.build_synthesis_request(history)).await?;

        if let Some(call) = response.tool_calls.into_iter().find(|c| c.name == RECORD_PLAN_TOOL) {
            debug!(id = %call.id, "synthesize: plan from tool call");
            let plan = StructuredPlan::from_payload(call.input);
            info!(parsed = plan.is_some(), "Synthesis returned tool payload");
            return Ok(plan);
        }

        // Some models answer with raw JSON text instead of calling the tool
        if let Some(value) = response.content.as_deref().and_then(extract_json_object) {
            debug!("synthesize: plan from text content");
            return Ok(StructuredPlan::from_payload(value));
        }

        debug!("synthesize: no usable plan in response");
        Ok(None)
    }
}

/// Persona for the conversational side
const CHAT_SYSTEM_PROMPT: &str = r#"You are an expert Project Manager and Consultant.
Your goal is to help the user create a comprehensive "Basic Project Plan".
Start by asking clarifying questions about the project's purpose, goals, key features, target audience, timeline, and resources.
DO NOT ask all questions at once. Ask 1-2 relevant questions at a time to keep the conversation flowing naturally.
As the user provides details, acknowledge them and ask for the next missing piece of information.
Be concise, professional, and encouraging."#;

const SYNTHESIS_SYSTEM_PROMPT: &str =
    "You extract structured project plans from planning conversations. Respond only by calling the provided tool.";
