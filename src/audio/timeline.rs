//! Speech timing against a fixed-length video
//!
//! The intro clip has a fixed duration and the speech starts after a fixed
//! lead-in. Whatever the synthesized speech length, the track handed to the
//! composer must last exactly as long as the video.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{seconds_to_frames, AudioTrack, TIMELINE_SAMPLE_RATE};
use crate::error::{CheerError, Result};

/// Tolerance on timeline durations, in seconds
pub const DURATION_EPSILON: f64 = 1e-3;

/// How speech that does not exactly fill its slot is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimingPolicy {
    /// Lead-in, speech, trailing silence; speech longer than the slot is an overrun
    #[default]
    Exact,
    /// Speech clipped or padded to the slot after the lead-in
    ClipOrPad,
}

/// What occupies a span of the timed track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentKind {
    Silence,
    Speech,
}

/// A span of the timed track
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimedSegment {
    pub kind: SegmentKind,
    /// Start offset in seconds
    pub start: f64,
    /// Duration in seconds
    pub duration: f64,
}

/// Track whose duration matches the video it will be bound to
#[derive(Debug, Clone)]
pub struct TimedTrack {
    pub track: AudioTrack,
    pub segments: Vec<TimedSegment>,
}

impl TimedTrack {
    #[must_use]
    pub fn duration(&self) -> f64 {
        self.track.duration()
    }

    /// Silence after the speech (zero when the speech fills the slot)
    #[must_use]
    pub fn trailing_silence(&self) -> f64 {
        match self.segments.last() {
            Some(seg) if seg.kind == SegmentKind::Silence && self.segments.len() > 1 => seg.duration,
            _ => 0.0,
        }
    }

    /// Speech start offset
    #[must_use]
    pub fn speech_start(&self) -> Option<f64> {
        self.segments
            .iter()
            .find(|s| s.kind == SegmentKind::Speech)
            .map(|s| s.start)
    }
}

/// Builds exact-length audio for a video segment
#[derive(Debug, Clone, Copy)]
pub struct AudioTimeline {
    policy: TimingPolicy,
    sample_rate: u32,
    channels: u16,
}

impl Default for AudioTimeline {
    fn default() -> Self {
        Self::new(TimingPolicy::Exact)
    }
}

impl AudioTimeline {
    #[must_use]
    pub fn new(policy: TimingPolicy) -> Self {
        Self {
            policy,
            sample_rate: TIMELINE_SAMPLE_RATE,
            channels: 1,
        }
    }

    /// Output format (silence is generated in this format, speech is conformed to it)
    #[must_use]
    pub fn with_format(mut self, sample_rate: u32, channels: u16) -> Self {
        self.sample_rate = sample_rate.max(1);
        self.channels = channels.max(1);
        self
    }

    #[must_use]
    pub fn policy(&self) -> TimingPolicy {
        self.policy
    }

    /// Place `speech` after `lead_in` seconds of silence on a track lasting
    /// exactly `video_duration` seconds.
    pub fn build(&self, video_duration: f64, lead_in: f64, speech: AudioTrack) -> Result<TimedTrack> {
        if !video_duration.is_finite() || video_duration <= 0.0 {
            return Err(CheerError::Audio(format!(
                "video duration must be positive, got {video_duration}"
            )));
        }
        if !lead_in.is_finite() || lead_in < 0.0 {
            return Err(CheerError::Audio(format!(
                "lead-in must be zero or positive, got {lead_in}"
            )));
        }

        let speech_duration = speech.duration();
        let overrun = || CheerError::AudioOverrun {
            video: video_duration,
            lead_in,
            speech: speech_duration,
        };

        let slot = video_duration - lead_in;
        if slot < 0.0 {
            return Err(overrun());
        }

        let trailing = slot - speech_duration;
        if self.policy == TimingPolicy::Exact && trailing < 0.0 {
            return Err(overrun());
        }

        let speech = speech.conform(self.sample_rate, self.channels);

        // Frame arithmetic keeps the total exact; float rounding may cost the
        // speech at most one frame.
        let total_frames = seconds_to_frames(video_duration, self.sample_rate);
        let lead_frames = seconds_to_frames(lead_in, self.sample_rate).min(total_frames);
        let speech_frames = speech.frames().min(total_frames - lead_frames);
        let tail_frames = total_frames - lead_frames - speech_frames;

        let parts = [
            AudioTrack::silence_frames(lead_frames, self.sample_rate, self.channels),
            speech.truncated(speech_frames),
            AudioTrack::silence_frames(tail_frames, self.sample_rate, self.channels),
        ];
        let track = AudioTrack::concat(&parts)?;

        let rate = f64::from(self.sample_rate);
        let mut segments = vec![
            TimedSegment {
                kind: SegmentKind::Silence,
                start: 0.0,
                duration: lead_frames as f64 / rate,
            },
            TimedSegment {
                kind: SegmentKind::Speech,
                start: lead_frames as f64 / rate,
                duration: speech_frames as f64 / rate,
            },
        ];
        if tail_frames > 0 || self.policy == TimingPolicy::Exact {
            segments.push(TimedSegment {
                kind: SegmentKind::Silence,
                start: (lead_frames + speech_frames) as f64 / rate,
                duration: tail_frames as f64 / rate,
            });
        }

        if self.policy == TimingPolicy::ClipOrPad && speech_duration > slot {
            info!(
                "Clipped speech from {:.3}s to {:.3}s to fit the video",
                speech_duration,
                speech_frames as f64 / rate
            );
        }
        debug!(
            "Timed audio: lead-in {:.3}s, speech {:.3}s, trailing {:.3}s ({:?})",
            lead_frames as f64 / rate,
            speech_frames as f64 / rate,
            tail_frames as f64 / rate,
            self.policy
        );

        Ok(TimedTrack { track, segments })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn speech(seconds: f64) -> AudioTrack {
        let frames = seconds_to_frames(seconds, TIMELINE_SAMPLE_RATE);
        AudioTrack::from_samples(TIMELINE_SAMPLE_RATE, 1, vec![0.25; frames]).unwrap()
    }

    #[test]
    fn ten_second_intro_with_six_seconds_of_speech() {
        let timed = AudioTimeline::default().build(10.0, 1.0, speech(6.0)).unwrap();

        assert!((timed.trailing_silence() - 3.0).abs() < DURATION_EPSILON);
        assert!((timed.duration() - 10.0).abs() < DURATION_EPSILON);
        assert_eq!(timed.speech_start(), Some(1.0));
        assert_eq!(timed.segments.len(), 3);
    }

    #[test]
    fn duration_matches_video_for_many_inputs() {
        let timeline = AudioTimeline::default();
        for &(video, lead, spoken) in &[
            (10.0, 1.0, 6.0),
            (10.0, 1.333, 8.6),
            (7.3, 0.0, 7.0),
            (5.005, 1.333, 0.0),
            (12.25, 2.5, 3.123_456),
            (3.0, 3.0, 0.0),
        ] {
            let timed = timeline.build(video, lead, speech(spoken)).unwrap();
            assert!(
                (timed.duration() - video).abs() < DURATION_EPSILON,
                "video {video}, lead {lead}, speech {spoken}: got {}",
                timed.duration()
            );
        }
    }

    #[test]
    fn overrun_is_rejected() {
        let err = AudioTimeline::default().build(10.0, 1.333, speech(9.0)).unwrap_err();
        assert!(matches!(err, CheerError::AudioOverrun { .. }));
    }

    #[test]
    fn lead_in_longer_than_video_is_overrun() {
        let err = AudioTimeline::new(TimingPolicy::ClipOrPad)
            .build(1.0, 2.0, speech(0.5))
            .unwrap_err();
        assert!(matches!(err, CheerError::AudioOverrun { .. }));
    }

    #[test]
    fn speech_lands_after_lead_in() {
        let timed = AudioTimeline::default().build(4.0, 1.0, speech(2.0)).unwrap();
        let samples = timed.track.samples();
        let lead = seconds_to_frames(1.0, TIMELINE_SAMPLE_RATE);
        let end = seconds_to_frames(3.0, TIMELINE_SAMPLE_RATE);

        assert!(samples[..lead].iter().all(|s| *s == 0.0));
        assert!(samples[lead..end].iter().all(|s| *s > 0.0));
        assert!(samples[end..].iter().all(|s| *s == 0.0));
    }

    #[test]
    fn clip_or_pad_truncates_long_speech() {
        let timed = AudioTimeline::new(TimingPolicy::ClipOrPad)
            .build(5.0, 1.0, speech(6.0))
            .unwrap();
        assert!((timed.duration() - 5.0).abs() < DURATION_EPSILON);
        assert_eq!(timed.segments.len(), 2);
        assert!((timed.segments[1].duration - 4.0).abs() < DURATION_EPSILON);
        assert_eq!(timed.trailing_silence(), 0.0);
    }

    #[test]
    fn clip_or_pad_pads_short_speech() {
        let timed = AudioTimeline::new(TimingPolicy::ClipOrPad)
            .build(5.0, 1.0, speech(2.0))
            .unwrap();
        assert!((timed.duration() - 5.0).abs() < DURATION_EPSILON);
        assert!((timed.trailing_silence() - 2.0).abs() < DURATION_EPSILON);
    }

    #[test]
    fn speech_in_other_formats_is_conformed() {
        let stereo = AudioTrack::from_samples(22_050, 2, vec![0.1; 22_050 * 2 * 2]).unwrap();
        let timed = AudioTimeline::default().build(6.0, 1.0, stereo).unwrap();
        assert_eq!(timed.track.sample_rate(), TIMELINE_SAMPLE_RATE);
        assert_eq!(timed.track.channels(), 1);
        assert!((timed.duration() - 6.0).abs() < DURATION_EPSILON);
    }

    #[test]
    fn rejects_nonsense_durations() {
        let timeline = AudioTimeline::default();
        assert!(timeline.build(0.0, 0.0, speech(0.0)).is_err());
        assert!(timeline.build(f64::NAN, 1.0, speech(1.0)).is_err());
        assert!(timeline.build(5.0, -1.0, speech(1.0)).is_err());
    }
}
