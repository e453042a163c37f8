//! Ordered video segments with their bound audio

use crate::audio::timeline::DURATION_EPSILON;
use crate::error::{CheerError, Result};
use crate::media::VideoSegment;

/// Audio played under a segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioSource {
    /// The timed speech track alone
    Timed,
    /// The timed speech track summed with the segment's own audio
    TimedOverOriginal,
    /// The segment's own audio
    Original,
    /// Generated silence
    Silence,
}

#[derive(Debug, Clone)]
pub struct TimelineEntry {
    pub segment: VideoSegment,
    pub audio: AudioSource,
}

/// Segments in playback order. Every segment's audio lasts as long as its video.
#[derive(Debug, Clone, Default)]
pub struct Timeline {
    entries: Vec<TimelineEntry>,
}

impl Timeline {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a segment whose bound audio lasts `audio_duration` seconds
    pub fn push(&mut self, segment: VideoSegment, audio: AudioSource, audio_duration: f64) -> Result<()> {
        if !segment.duration.is_finite() || segment.duration <= 0.0 {
            return Err(CheerError::Encode(format!(
                "segment {} has no usable duration",
                segment.path.display()
            )));
        }
        if (audio_duration - segment.duration).abs() > DURATION_EPSILON {
            return Err(CheerError::Audio(format!(
                "audio lasts {audio_duration:.3}s but {} lasts {:.3}s",
                segment.path.display(),
                segment.duration
            )));
        }
        self.entries.push(TimelineEntry { segment, audio });
        Ok(())
    }

    #[must_use]
    pub fn entries(&self) -> &[TimelineEntry] {
        &self.entries
    }

    /// Total playback length
    #[must_use]
    pub fn duration(&self) -> f64 {
        self.entries.iter().map(|e| e.segment.duration).sum()
    }
}
