use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use crate::llm::{
    check_status,
    models::{ChatOptions, ChatResponse, Message, Role, Usage},
    LlmError, LlmProvider,
};

const OPENING_TURN: &str = "Please begin.";

/// Google Generative Language API (`models/{model}:generateContent`).
pub struct GeminiProvider {
    client: Client,
    api_key: String,
    base_url: String,
    default_model: String,
}

impl GeminiProvider {
    pub fn new(api_key: String, base_url: String, default_model: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url,
            default_model,
        }
    }
}

fn gemini_role(role: Role) -> &'static str {
    match role {
        Role::Assistant => "model",
        Role::User | Role::System => "user",
    }
}

/// Leading system entries become `systemInstruction`; everything after is
/// grouped into alternating `contents`, merging consecutive turns of the
/// same role into one content with several parts.
fn to_gemini_body(messages: &[Message], options: &ChatOptions) -> Value {
    let leading = messages
        .iter()
        .take_while(|m| m.role == Role::System)
        .count();

    let system_parts: Vec<Value> = messages[..leading]
        .iter()
        .map(|m| json!({"text": m.content}))
        .collect();

    let mut contents: Vec<Value> = Vec::new();
    for m in &messages[leading..] {
        let role = gemini_role(m.role);
        let part = json!({"text": m.content});
        match contents.last_mut() {
            Some(last) if last["role"] == role => {
                if let Some(parts) = last["parts"].as_array_mut() {
                    parts.push(part);
                }
            }
            _ => contents.push(json!({"role": role, "parts": [part]})),
        }
    }

    if contents.first().map_or(true, |c| c["role"] != "user") {
        contents.insert(0, json!({"role": "user", "parts": [{"text": OPENING_TURN}]}));
    }

    let mut body = json!({
        "contents": contents,
        "generationConfig": {
            "temperature": options.temperature.unwrap_or(0.7),
            "maxOutputTokens": options.max_tokens.unwrap_or(4096),
        },
    });
    if !system_parts.is_empty() {
        body["systemInstruction"] = json!({"parts": system_parts});
    }
    body
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn chat(&self, messages: &[Message], options: ChatOptions) -> Result<ChatResponse, LlmError> {
        let model = options.model.as_deref().unwrap_or(&self.default_model);
        let body = to_gemini_body(messages, &options);

        let response = self
            .client
            .post(format!(
                "{}/v1beta/models/{}:generateContent",
                self.base_url, model
            ))
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;

        let response = check_status(response, "Gemini").await?;

        let json: Value = response
            .json()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;

        let parts = json["candidates"][0]["content"]["parts"]
            .as_array()
            .ok_or_else(|| LlmError::InvalidResponse("missing candidates[0].content.parts".to_string()))?;

        let content = parts
            .iter()
            .filter_map(|p| p["text"].as_str())
            .collect::<Vec<_>>()
            .join("");

        let usage = json.get("usageMetadata").map(|u| Usage {
            input_tokens: u["promptTokenCount"].as_u64().unwrap_or(0) as u32,
            output_tokens: u["candidatesTokenCount"].as_u64().unwrap_or(0) as u32,
        });

        Ok(ChatResponse {
            content,
            model: model.to_string(),
            usage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merges_consecutive_user_side_turns() {
        let prompt = vec![
            Message::system("persona"),
            Message::assistant("Welcome, seeker."),
            Message::user("Will I find love?"),
            Message::system("Selected cards: The Lovers"),
        ];
        let body = to_gemini_body(&prompt, &ChatOptions::default());

        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "persona");
        let contents = body["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[0]["parts"][0]["text"], OPENING_TURN);
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(contents[2]["role"], "user");
        assert_eq!(contents[2]["parts"].as_array().unwrap().len(), 2);
    }
}
