//! Caption generation via OpenAI chat completions

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{Caption, CaptionGenerator, CheerRequest};
use crate::error::{CheerError, Result, Service};

const SYSTEM_PROMPT: &str = "입력된 단체명(최대 8자)과 이름(최대 5자)을 받아 '{단체명}! {이름}이 응원해!' 또는 \
'{단체명}! {이름}가 응원해!' 형식으로 반환하세요. 이름이 받침으로 끝나면 '이', 그렇지 않으면 '가'를 \
사용합니다. 단체명과 이름은 절대로 변경, 가공 할 수 없습니다. 그 외 어떠한 설명도 추가하지 않습니다.";

/// OpenAI settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiConfig {
    /// Chat completions endpoint
    pub endpoint: String,
    pub model: String,
    /// Usually supplied through `OPENAI_API_KEY`
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            model: "gpt-4o-mini-2024-07-18".to_string(),
            api_key: None,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: Option<String>,
}

fn user_message(request: &CheerRequest) -> String {
    format!("단체명: {}, 이름: {}", request.group.trim(), request.name.trim())
}

/// First non-empty completion text
fn completion_text(response: ChatResponse) -> Option<String> {
    response
        .choices
        .into_iter()
        .filter_map(|c| c.message.content)
        .map(|c| c.trim().to_string())
        .find(|c| !c.is_empty())
}

/// [`CaptionGenerator`] backed by OpenAI
#[derive(Debug, Clone)]
pub struct OpenAiCaptioner {
    client: reqwest::Client,
    config: OpenAiConfig,
    api_key: String,
}

impl OpenAiCaptioner {
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| CheerError::collaborator(Service::TextGeneration, "OPENAI_API_KEY is not set"))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| CheerError::collaborator(Service::TextGeneration, e.to_string()))?;
        Ok(Self {
            client,
            config,
            api_key,
        })
    }
}

#[async_trait]
impl CaptionGenerator for OpenAiCaptioner {
    async fn generate(&self, request: &CheerRequest) -> Result<Caption> {
        let body = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: user_message(request),
                },
            ],
        };

        info!("Requesting caption from {}", self.config.model);
        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| CheerError::collaborator(Service::TextGeneration, e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error = response.text().await.unwrap_or_default();
            return Err(CheerError::collaborator(
                Service::TextGeneration,
                format!("API returned {status}: {error}"),
            ));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| CheerError::collaborator(Service::TextGeneration, e.to_string()))?;

        let line = completion_text(parsed)
            .ok_or_else(|| CheerError::collaborator(Service::TextGeneration, "empty completion"))?;

        Ok(Caption::new(line, request.phrase.as_deref()))
    }
}
