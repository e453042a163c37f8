//! Error taxonomy shared by every stage of the cheer pipeline.
//!
//! All variants are fatal for the request that produced them. The only
//! automatic retry in the crate is the speech-synthesis status poll, which
//! surfaces [`CheerError::CollaboratorTimeout`] once its attempt ceiling is hit.

use std::fmt;

use thiserror::Error;

/// External collaborator a failure originated from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    /// Caption / script generation
    TextGeneration,
    /// Speech synthesis job submission, polling and download
    SpeechSynthesis,
    /// Intro, outro and font retrieval
    AssetFetch,
    /// Download, upload or email handoff
    Delivery,
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::TextGeneration => "text generation",
            Self::SpeechSynthesis => "speech synthesis",
            Self::AssetFetch => "asset fetch",
            Self::Delivery => "delivery",
        };
        f.write_str(name)
    }
}

/// Cheer pipeline errors
#[derive(Error, Debug)]
pub enum CheerError {
    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("Font load error: {0}")]
    FontLoad(String),

    #[error(
        "Audio overrun: speech of {speech:.3}s after {lead_in:.3}s lead-in does not fit in {video:.3}s of video"
    )]
    AudioOverrun { video: f64, lead_in: f64, speech: f64 },

    #[error("{service} failed: {message}")]
    Collaborator { service: Service, message: String },

    #[error("{service} timed out after {attempts} attempts")]
    CollaboratorTimeout { service: Service, attempts: u32 },

    #[error("Encode error: {0}")]
    Encode(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Audio error: {0}")]
    Audio(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CheerError {
    /// Shorthand for a collaborator failure
    pub fn collaborator(service: Service, message: impl Into<String>) -> Self {
        Self::Collaborator {
            service,
            message: message.into(),
        }
    }

    /// Returns the collaborator this error came from, if any
    #[must_use]
    pub fn service(&self) -> Option<Service> {
        match self {
            Self::Collaborator { service, .. } | Self::CollaboratorTimeout { service, .. } => {
                Some(*service)
            }
            _ => None,
        }
    }
}

impl From<hound::Error> for CheerError {
    fn from(err: hound::Error) -> Self {
        match err {
            hound::Error::IoError(io) => Self::Io(io),
            other => Self::Audio(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, CheerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrun_message_names_all_durations() {
        let err = CheerError::AudioOverrun {
            video: 10.0,
            lead_in: 1.0,
            speech: 9.5,
        };
        let msg = err.to_string();
        assert!(msg.contains("9.500s"));
        assert!(msg.contains("1.000s"));
        assert!(msg.contains("10.000s"));
    }

    #[test]
    fn collaborator_errors_keep_their_service() {
        let err = CheerError::collaborator(Service::TextGeneration, "HTTP 500");
        assert_eq!(err.service(), Some(Service::TextGeneration));
        assert_eq!(err.to_string(), "text generation failed: HTTP 500");

        let timeout = CheerError::CollaboratorTimeout {
            service: Service::SpeechSynthesis,
            attempts: 120,
        };
        assert_eq!(timeout.service(), Some(Service::SpeechSynthesis));
        assert!(timeout.to_string().contains("120 attempts"));

        assert_eq!(CheerError::Encode("boom".into()).service(), None);
    }
}
