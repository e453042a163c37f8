//! Speech synthesis via the Typecast API
//!
//! Jobs are submitted to `/api/speak`, which answers with a `speak_v2_url`.
//! That URL is polled until `status` is `done` and carries an
//! `audio_download_url`.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{SpeechJob, SpeechStatus, SpeechSynthesizer};
use crate::error::{CheerError, Result, Service};
use crate::retry::RetryPolicy;

/// Typecast settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TypecastConfig {
    pub endpoint: String,
    /// Usually supplied through `TYPECAST_API_KEY`
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub actor_id: String,
    pub lang: String,
    pub tempo: f32,
    pub volume: u32,
    pub pitch: i32,
    pub hd: bool,
    pub max_seconds: u32,
    pub model_version: String,
    pub audio_format: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Status polling bounds
    pub poll: RetryPolicy,
}

impl Default for TypecastConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://typecast.ai/api/speak".to_string(),
            api_key: None,
            actor_id: "66596206b7bd6e89c3a2c54e".to_string(),
            lang: "auto".to_string(),
            tempo: 1.3,
            volume: 100,
            pitch: 0,
            hd: true,
            max_seconds: 60,
            model_version: "latest".to_string(),
            audio_format: "wav".to_string(),
            timeout_secs: 30,
            poll: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Serialize)]
struct SpeakRequest<'a> {
    actor_id: &'a str,
    text: &'a str,
    lang: &'a str,
    tempo: f32,
    volume: u32,
    pitch: i32,
    xapi_hd: bool,
    max_seconds: u32,
    model_version: &'a str,
    xapi_audio_format: &'a str,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct SpeakAccepted {
    speak_v2_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SpeakProgress {
    #[serde(default)]
    status: String,
    audio_download_url: Option<String>,
}

fn tts_error(message: impl Into<String>) -> CheerError {
    CheerError::collaborator(Service::SpeechSynthesis, message)
}

/// Map a status body to a job status. Only `progress` keeps the poll going.
fn status_from_body(body: &str) -> Result<SpeechStatus> {
    let envelope: Envelope<SpeakProgress> =
        serde_json::from_str(body).map_err(|e| tts_error(format!("malformed status response: {e}")))?;
    let progress = envelope
        .result
        .ok_or_else(|| tts_error("status response has no result"))?;

    Ok(match progress.status.as_str() {
        "progress" => SpeechStatus::InProgress,
        "done" => match progress.audio_download_url {
            Some(url) => SpeechStatus::Done { audio_url: url },
            None => SpeechStatus::Failed("job done without an audio URL".to_string()),
        },
        other => SpeechStatus::Failed(format!("unexpected status {other:?}")),
    })
}

fn poll_url_from_body(body: &str) -> Result<String> {
    let envelope: Envelope<SpeakAccepted> =
        serde_json::from_str(body).map_err(|e| tts_error(format!("malformed speak response: {e}")))?;
    envelope
        .result
        .and_then(|r| r.speak_v2_url)
        .ok_or_else(|| tts_error("speak response has no speak_v2_url"))
}

/// [`SpeechSynthesizer`] backed by Typecast
#[derive(Debug, Clone)]
pub struct TypecastSynthesizer {
    client: reqwest::Client,
    config: TypecastConfig,
    api_key: String,
}

impl TypecastSynthesizer {
    pub fn new(config: TypecastConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| tts_error("TYPECAST_API_KEY is not set"))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| tts_error(e.to_string()))?;
        Ok(Self {
            client,
            config,
            api_key,
        })
    }

    async fn get_text(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| tts_error(e.to_string()))?;
        if !response.status().is_success() {
            return Err(tts_error(format!("status poll returned {}", response.status())));
        }
        response.text().await.map_err(|e| tts_error(e.to_string()))
    }
}

#[async_trait]
impl SpeechSynthesizer for TypecastSynthesizer {
    async fn submit(&self, script: &str) -> Result<SpeechJob> {
        let c = &self.config;
        let body = SpeakRequest {
            actor_id: &c.actor_id,
            text: script,
            lang: &c.lang,
            tempo: c.tempo,
            volume: c.volume,
            pitch: c.pitch,
            xapi_hd: c.hd,
            max_seconds: c.max_seconds,
            model_version: &c.model_version,
            xapi_audio_format: &c.audio_format,
        };

        info!("Submitting {} characters to Typecast", script.chars().count());
        let response = self
            .client
            .post(&c.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| tts_error(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error = response.text().await.unwrap_or_default();
            return Err(tts_error(format!("API returned {status}: {error}")));
        }

        let text = response.text().await.map_err(|e| tts_error(e.to_string()))?;
        Ok(SpeechJob {
            poll_url: poll_url_from_body(&text)?,
        })
    }

    async fn poll(&self, job: &SpeechJob) -> Result<SpeechStatus> {
        let body = self.get_text(&job.poll_url).await?;
        let status = status_from_body(&body)?;
        debug!("Typecast status: {:?}", status);
        Ok(status)
    }

    async fn download(&self, audio_url: &str, dest: &Path) -> Result<()> {
        let response = self
            .client
            .get(audio_url)
            .send()
            .await
            .map_err(|e| tts_error(e.to_string()))?;
        if !response.status().is_success() {
            return Err(tts_error(format!("audio download returned {}", response.status())));
        }
        let bytes = response.bytes().await.map_err(|e| tts_error(e.to_string()))?;
        tokio::fs::write(dest, &bytes).await?;
        info!("Downloaded {} bytes of speech", bytes.len());
        Ok(())
    }

    fn poll_policy(&self) -> RetryPolicy {
        self.config.poll.clone()
    }
}
