use super::{
    types::{ChatMessage, ChatRequest, ChatResponse, ContentPart, ImageUrl, MessageContent},
    ModelClient, ModelRequest,
};
use crate::config::Config;
use anyhow::{anyhow, Context, Result};
use std::time::Duration;
use tracing::debug;

/// OpenAI-compatible `/chat/completions` client.
pub struct OpenAiClient {
    agent: ureq::Agent,
    endpoint: String,
    api_key: String,
    max_tokens: u32,
    temperature: Option<f32>,
}

impl OpenAiClient {
    pub fn new(cfg: &Config) -> Result<Self> {
        let api_key = std::env::var(&cfg.model.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| anyhow!("API key variable {} is not set", cfg.model.api_key_env))?;

        let mut builder = ureq::AgentBuilder::new();
        if cfg.model.timeout_seconds > 0 {
            builder = builder.timeout(Duration::from_secs(cfg.model.timeout_seconds));
        }

        Ok(Self {
            agent: builder.build(),
            endpoint: format!(
                "{}/chat/completions",
                cfg.model.base_url.trim_end_matches('/')
            ),
            api_key,
            max_tokens: cfg.model.max_tokens,
            temperature: cfg.model.temperature,
        })
    }
}

/// Chat payload: a system message fixing the output language, then one user
/// message holding the prompt plus any document text or image.
pub fn chat_request(req: &ModelRequest<'_>, max_tokens: u32, temperature: Option<f32>) -> ChatRequest {
    let mut parts = vec![ContentPart::Text {
        text: req.prompt.clone(),
    }];
    if let Some(text) = req.document_text.filter(|t| !t.trim().is_empty()) {
        parts.push(ContentPart::Text {
            text: format!("Lerninhalt:\n{text}"),
        });
    }
    if let Some(image) = req.image {
        parts.push(ContentPart::ImageUrl {
            image_url: ImageUrl {
                url: image.data_url(),
            },
        });
    }

    ChatRequest {
        model: req.model.to_string(),
        messages: vec![
            ChatMessage {
                role: "system".into(),
                content: MessageContent::Text(system_prompt(req.language)),
            },
            ChatMessage {
                role: "user".into(),
                content: MessageContent::Parts(parts),
            },
        ],
        max_tokens,
        temperature,
    }
}

fn system_prompt(language: &str) -> String {
    format!(
        "You are an assistant that writes exam questions for the OLAT learning platform. \
         Write every question, answer and explanation in {language}."
    )
}

impl ModelClient for OpenAiClient {
    fn complete(&self, req: &ModelRequest<'_>) -> Result<String> {
        let body = chat_request(req, self.max_tokens, self.temperature);
        debug!(
            "model request model={} language={} image={}",
            req.model,
            req.language,
            req.image.is_some()
        );

        let response = self
            .agent
            .post(&self.endpoint)
            .set("Authorization", &format!("Bearer {}", self.api_key))
            .send_json(&body)
            .map_err(|e| match e {
                ureq::Error::Status(code, resp) => {
                    let detail = resp.into_string().unwrap_or_default();
                    anyhow!("model API returned status {code}: {}", detail.trim())
                }
                other => anyhow!("model API request failed: {other}"),
            })?;

        let parsed: ChatResponse = response
            .into_json()
            .context("decoding chat completion response")?;

        Ok(parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }
}
