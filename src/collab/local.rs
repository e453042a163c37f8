//! Offline collaborators for composing from local files

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::{Caption, CaptionGenerator, CheerRequest, SpeechJob, SpeechStatus, SpeechSynthesizer};
use crate::error::{CheerError, Result, Service};

/// Caption with fixed text
#[derive(Debug, Clone)]
pub struct StaticCaption {
    line: String,
}

impl StaticCaption {
    pub fn new(line: impl Into<String>) -> Self {
        Self { line: line.into() }
    }
}

#[async_trait]
impl CaptionGenerator for StaticCaption {
    async fn generate(&self, request: &CheerRequest) -> Result<Caption> {
        if self.line.trim().is_empty() {
            return Err(CheerError::collaborator(Service::TextGeneration, "caption text is empty"));
        }
        Ok(Caption::new(self.line.clone(), request.phrase.as_deref()))
    }
}

/// `{group}! {name}이 응원해!` / `{group}! {name}가 응원해!` without a model.
///
/// Names ending in a Hangul syllable with a final consonant take `이`;
/// everything else takes `가`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateCaption;

fn has_final_consonant(c: char) -> bool {
    let code = u32::from(c);
    (0xAC00..=0xD7A3).contains(&code) && (code - 0xAC00) % 28 != 0
}

/// The cheer line for a group and name
#[must_use]
pub fn cheer_line(group: &str, name: &str) -> String {
    let (group, name) = (group.trim(), name.trim());
    let particle = match name.chars().last() {
        Some(c) if has_final_consonant(c) => "이",
        _ => "가",
    };
    format!("{group}! {name}{particle} 응원해!")
}

#[async_trait]
impl CaptionGenerator for TemplateCaption {
    async fn generate(&self, request: &CheerRequest) -> Result<Caption> {
        Ok(Caption::new(
            cheer_line(&request.group, &request.name),
            request.phrase.as_deref(),
        ))
    }
}

/// Speech read from an existing audio file
#[derive(Debug, Clone)]
pub struct LocalSpeech {
    path: PathBuf,
}

impl LocalSpeech {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl SpeechSynthesizer for LocalSpeech {
    async fn submit(&self, _script: &str) -> Result<SpeechJob> {
        if !tokio::fs::try_exists(&self.path).await.unwrap_or(false) {
            return Err(CheerError::collaborator(
                Service::SpeechSynthesis,
                format!("speech file not found: {}", self.path.display()),
            ));
        }
        Ok(SpeechJob {
            poll_url: self.path.display().to_string(),
        })
    }

    async fn poll(&self, job: &SpeechJob) -> Result<SpeechStatus> {
        Ok(SpeechStatus::Done {
            audio_url: job.poll_url.clone(),
        })
    }

    async fn download(&self, audio_url: &str, dest: &Path) -> Result<()> {
        tokio::fs::copy(audio_url, dest).await?;
        Ok(())
    }
}
