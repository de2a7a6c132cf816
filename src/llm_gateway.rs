use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

use crate::config::LlmSettings;
use crate::error::AppError;

/// Narrow seam the interpreter and normalizer talk through, so tests can
/// substitute canned completions for the network.
#[async_trait]
pub trait CompletionApi: Send + Sync {
    async fn call(&self, messages: Vec<Value>, use_vision: bool) -> Result<String, AppError>;
}

/// Partial settings update; only present fields replace the current values.
#[derive(Debug, Default, Deserialize)]
pub struct LlmSettingsUpdate {
    pub provider: Option<String>,
    pub api_key: Option<String>,
    pub api_base: Option<String>,
    pub model: Option<String>,
    pub vision_model: Option<String>,
    pub enable_reasoning: Option<bool>,
}

pub struct LlmClient {
    client: Client,
    settings: RwLock<LlmSettings>,
}

impl LlmClient {
    pub fn new(settings: LlmSettings) -> Result<Self, AppError> {
        // One hard timeout per request; retry policy belongs to callers and
        // no caller in this pipeline retries.
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            settings: RwLock::new(settings),
        })
    }

    pub fn settings(&self) -> LlmSettings {
        self.settings.read().expect("llm settings lock poisoned").clone()
    }

    pub fn is_configured(&self) -> bool {
        self.settings().is_configured()
    }

    pub fn update_settings(&self, update: LlmSettingsUpdate) -> LlmSettings {
        let mut guard = self.settings.write().expect("llm settings lock poisoned");
        if let Some(v) = update.provider {
            guard.provider = v;
        }
        if let Some(v) = update.api_key {
            guard.api_key = v;
        }
        if let Some(v) = update.api_base {
            guard.api_base = v;
        }
        if let Some(v) = update.model {
            guard.model = v;
        }
        if let Some(v) = update.vision_model {
            guard.vision_model = v;
        }
        if let Some(v) = update.enable_reasoning {
            guard.enable_reasoning = v;
        }
        guard.clone()
    }

    async fn chat_completion(
        &self,
        messages: Vec<Value>,
        use_vision: bool,
    ) -> Result<Value, AppError> {
        let settings = self.settings();
        let model = if use_vision {
            settings.vision_model.clone()
        } else {
            settings.model.clone()
        };

        let mut payload = json!({
            "model": model,
            "messages": messages,
        });
        if settings.enable_reasoning && settings.provider == "openrouter" {
            payload["extra_body"] = json!({ "reasoning": { "enabled": true } });
        }

        let response = self
            .client
            .post(format!("{}/chat/completions", settings.api_base))
            .header("Authorization", format!("Bearer {}", settings.api_key))
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%status, "completion endpoint returned an error");
            return Err(AppError::api_status(status, &body));
        }

        let body: Value = response.json().await?;
        Ok(body)
    }

    /// Completion call that also surfaces the provider's reasoning trace
    /// when one is present on the assistant message.
    pub async fn call_with_reasoning(
        &self,
        messages: Vec<Value>,
        use_vision: bool,
    ) -> Result<(String, Option<Value>), AppError> {
        let body = self.chat_completion(messages, use_vision).await?;
        let message = &body["choices"][0]["message"];
        let content = message["content"].as_str().unwrap_or_default().to_string();
        let reasoning = message.get("reasoning_details").cloned();
        Ok((content, reasoning))
    }
}

#[async_trait]
impl CompletionApi for LlmClient {
    async fn call(&self, messages: Vec<Value>, use_vision: bool) -> Result<String, AppError> {
        let (content, _) = self.call_with_reasoning(messages, use_vision).await?;
        Ok(content)
    }
}

/// Single user-role text message, the shape every prompt in this crate sends.
pub fn user_message(text: &str) -> Vec<Value> {
    vec![json!({ "role": "user", "content": text })]
}

/// User message carrying one inline PNG alongside the text, for vision calls.
pub fn vision_message(text: &str, png_base64: &str) -> Vec<Value> {
    vec![json!({
        "role": "user",
        "content": [
            { "type": "text", "text": text },
            {
                "type": "image_url",
                "image_url": { "url": format!("data:image/png;base64,{}", png_base64) }
            }
        ]
    })]
}
