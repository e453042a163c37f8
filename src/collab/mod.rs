//! External collaborators
//!
//! The pipeline only talks to the outside world through the traits defined
//! here: a [`CaptionGenerator`] writes the cheer text, a
//! [`SpeechSynthesizer`] turns it into audio, the [`AssetStore`] provides the
//! fixed intro/outro/font and a [`Delivery`] hands off the finished video.
//! Default implementations talk HTTP with `reqwest`.

pub mod assets;
pub mod delivery;
pub mod local;
pub mod openai;
pub mod typecast;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::{CheerError, Result, Service};
use crate::retry::{poll_until, PollOutcome, PollStatus, RetryPolicy};

pub use assets::{AssetConfig, AssetPaths, AssetStore};
pub use delivery::{DeliveryConfig, DeliveryReceipt, HttpUpload, MailRelay, SaveToFile};
pub use local::{cheer_line, LocalSpeech, StaticCaption, TemplateCaption};
pub use openai::{OpenAiCaptioner, OpenAiConfig};
pub use typecast::{TypecastConfig, TypecastSynthesizer};

/// Longest accepted group name, in characters
pub const MAX_GROUP_CHARS: usize = 10;
/// Longest accepted person name, in characters
pub const MAX_NAME_CHARS: usize = 5;
/// Longest accepted cheer phrase, in characters
pub const MAX_PHRASE_CHARS: usize = 20;

/// What the user asked for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheerRequest {
    pub group: String,
    pub name: String,
    pub phrase: Option<String>,
}

impl CheerRequest {
    pub fn new(group: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            name: name.into(),
            phrase: None,
        }
    }

    #[must_use]
    pub fn with_phrase(mut self, phrase: impl Into<String>) -> Self {
        let phrase = phrase.into();
        self.phrase = if phrase.trim().is_empty() { None } else { Some(phrase) };
        self
    }

    /// Check the character limits
    pub fn validate(&self) -> Result<()> {
        check_field("group name", &self.group, MAX_GROUP_CHARS, true)?;
        check_field("name", &self.name, MAX_NAME_CHARS, true)?;
        if let Some(ref phrase) = self.phrase {
            check_field("cheer phrase", phrase, MAX_PHRASE_CHARS, false)?;
        }
        Ok(())
    }
}

fn check_field(label: &str, value: &str, max: usize, required: bool) -> Result<()> {
    let trimmed = value.trim();
    if required && trimmed.is_empty() {
        return Err(CheerError::InvalidRequest(format!("{label} must not be empty")));
    }
    let count = trimmed.chars().count();
    if count > max {
        return Err(CheerError::InvalidRequest(format!(
            "{label} is {count} characters long, at most {max} allowed"
        )));
    }
    Ok(())
}

/// Generated cheer text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caption {
    /// Text drawn on the video
    pub display: String,
    /// Text spoken by the synthesizer
    pub script: String,
}

impl Caption {
    /// Caption whose spoken script is the displayed line plus the optional phrase
    pub fn new(line: impl Into<String>, phrase: Option<&str>) -> Self {
        let display = line.into().trim().to_string();
        let script = match phrase.map(str::trim).filter(|p| !p.is_empty()) {
            Some(phrase) => format!("{display} {phrase}"),
            None => display.clone(),
        };
        Self { display, script }
    }
}

/// Produces the caption for a request
#[async_trait]
pub trait CaptionGenerator: Send + Sync {
    async fn generate(&self, request: &CheerRequest) -> Result<Caption>;
}

/// Handle to a submitted synthesis job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechJob {
    pub poll_url: String,
}

/// Status of a synthesis job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeechStatus {
    InProgress,
    Done { audio_url: String },
    Failed(String),
}

/// Asynchronous text-to-speech service
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Start a job for `script`
    async fn submit(&self, script: &str) -> Result<SpeechJob>;

    /// Ask for the job's status once
    async fn poll(&self, job: &SpeechJob) -> Result<SpeechStatus>;

    /// Fetch finished audio to `dest`
    async fn download(&self, audio_url: &str, dest: &Path) -> Result<()>;

    /// How long to keep polling
    fn poll_policy(&self) -> RetryPolicy {
        RetryPolicy::default()
    }
}

/// Submit, poll until done and download the audio to `dest`.
///
/// Polling only continues on an explicit in-progress status; running out of
/// attempts is [`CheerError::CollaboratorTimeout`].
pub async fn synthesize_speech(synth: &dyn SpeechSynthesizer, script: &str, dest: &Path) -> Result<PathBuf> {
    let job = synth.submit(script).await?;
    info!("Speech job submitted");

    let policy = synth.poll_policy();
    let job_ref = &job;
    let outcome = poll_until(&policy, move |attempt| async move {
        match synth.poll(job_ref).await? {
            SpeechStatus::InProgress => Ok(PollStatus::Pending),
            SpeechStatus::Done { audio_url } => {
                debug!("Speech ready after {attempt} poll(s)");
                Ok(PollStatus::Ready(audio_url))
            }
            SpeechStatus::Failed(message) => Err(CheerError::collaborator(Service::SpeechSynthesis, message)),
        }
    })
    .await?;

    match outcome {
        PollOutcome::Ready { value, .. } => {
            synth.download(&value, dest).await?;
            Ok(dest.to_path_buf())
        }
        PollOutcome::Exhausted { attempts } => Err(CheerError::CollaboratorTimeout {
            service: Service::SpeechSynthesis,
            attempts,
        }),
    }
}

/// Hands the finished artifact to its destination
#[async_trait]
pub trait Delivery: Send + Sync {
    /// Channel name for logs and reports
    fn channel(&self) -> &'static str;

    async fn deliver(&self, artifact: &Path) -> Result<DeliveryReceipt>;
}
