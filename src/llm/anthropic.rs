use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use crate::llm::{
    check_status,
    models::{ChatOptions, ChatResponse, Message, Role, Usage},
    LlmError, LlmProvider,
};

const OPENING_TURN: &str = "Please begin.";

pub struct AnthropicProvider {
    client: Client,
    api_key: String,
    base_url: String,
    default_model: String,
}

impl AnthropicProvider {
    pub fn new(api_key: String, base_url: String, default_model: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url,
            default_model,
        }
    }
}

/// Splits a prompt into Anthropic's `system` field and a `messages` array.
///
/// Leading system entries become the system field. System entries that
/// appear later in the transcript are kept in place as user turns so the
/// model still sees them in chronological order. The array always starts
/// with a user turn.
fn to_anthropic_turns(messages: &[Message]) -> (String, Vec<Value>) {
    let leading = messages
        .iter()
        .take_while(|m| m.role == Role::System)
        .count();

    let system = messages[..leading]
        .iter()
        .map(|m| m.content.as_str())
        .collect::<Vec<_>>()
        .join("\n");

    let mut turns: Vec<Value> = Vec::new();
    for m in &messages[leading..] {
        let turn = match m.role {
            Role::Assistant => json!({"role": "assistant", "content": m.content}),
            Role::User => json!({"role": "user", "content": m.content}),
            Role::System => json!({"role": "user", "content": format!("[context] {}", m.content)}),
        };
        turns.push(turn);
    }

    if turns.first().map_or(true, |t| t["role"] != "user") {
        turns.insert(0, json!({"role": "user", "content": OPENING_TURN}));
    }

    (system, turns)
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn chat(&self, messages: &[Message], options: ChatOptions) -> Result<ChatResponse, LlmError> {
        let model = options.model.as_deref().unwrap_or(&self.default_model);
        let (system, turns) = to_anthropic_turns(messages);

        let body = json!({
            "model": model,
            "messages": turns,
            "system": system,
            "temperature": options.temperature.unwrap_or(0.7),
            "max_tokens": options.max_tokens.unwrap_or(4096),
        });

        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;

        let response = check_status(response, "Anthropic").await?;

        let json: Value = response
            .json()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;

        let content = json["content"][0]["text"]
            .as_str()
            .ok_or_else(|| LlmError::InvalidResponse("missing content[0].text".to_string()))?
            .to_string();

        let usage = json.get("usage").map(|u| Usage {
            input_tokens: u["input_tokens"].as_u64().unwrap_or(0) as u32,
            output_tokens: u["output_tokens"].as_u64().unwrap_or(0) as u32,
        });

        Ok(ChatResponse {
            content,
            model: model.to_string(),
            usage,
        })
    }
}
