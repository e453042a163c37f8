//! PCM audio tracks and the speech timeline
//!
//! [`AudioTrack`] holds interleaved `f32` samples in memory. Silence is
//! generated analytically; speech comes from a decoded WAV. The
//! [`timeline`] module places them on an exact-length track.

pub mod timeline;

use std::io::Cursor;
use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

use crate::error::{CheerError, Result};

pub use timeline::{AudioTimeline, SegmentKind, TimedSegment, TimedTrack, TimingPolicy};

/// Sample rate used for generated silence and timeline output
pub const TIMELINE_SAMPLE_RATE: u32 = 44_100;

/// In-memory PCM signal
#[derive(Debug, Clone, PartialEq)]
pub struct AudioTrack {
    sample_rate: u32,
    channels: u16,
    /// Interleaved, normalized to [-1.0, 1.0]
    samples: Vec<f32>,
}

impl AudioTrack {
    pub fn from_samples(sample_rate: u32, channels: u16, samples: Vec<f32>) -> Result<Self> {
        if sample_rate == 0 || channels == 0 {
            return Err(CheerError::Audio(format!(
                "invalid audio format: {sample_rate} Hz, {channels} channel(s)"
            )));
        }
        if samples.len() % usize::from(channels) != 0 {
            return Err(CheerError::Audio(format!(
                "{} samples do not divide into {channels} channel(s)",
                samples.len()
            )));
        }
        Ok(Self {
            sample_rate,
            channels,
            samples,
        })
    }

    /// Constant-zero track of exactly `frames` frames
    #[must_use]
    pub fn silence_frames(frames: usize, sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
            samples: vec![0.0; frames * usize::from(channels)],
        }
    }

    /// Constant-zero track of `duration` seconds, rounded to the nearest frame
    #[must_use]
    pub fn silence(duration: f64, sample_rate: u32, channels: u16) -> Self {
        Self::silence_frames(seconds_to_frames(duration, sample_rate), sample_rate, channels)
    }

    /// Decode a WAV file
    pub fn read_wav(path: &Path) -> Result<Self> {
        let reader = WavReader::open(path)
            .map_err(|e| CheerError::Audio(format!("cannot read {}: {e}", path.display())))?;
        Self::from_reader(reader)
    }

    /// Decode WAV bytes
    pub fn decode_wav(bytes: &[u8]) -> Result<Self> {
        let reader = WavReader::new(Cursor::new(bytes))?;
        Self::from_reader(reader)
    }

    fn from_reader<R: std::io::Read>(mut reader: WavReader<R>) -> Result<Self> {
        let spec = reader.spec();
        let samples: Vec<f32> = match spec.sample_format {
            SampleFormat::Float => reader.samples::<f32>().collect::<std::result::Result<Vec<f32>, hound::Error>>()?,
            SampleFormat::Int => {
                let bits = u32::from(spec.bits_per_sample);
                if bits == 0 || bits > 32 {
                    return Err(CheerError::Audio(format!("unsupported bit depth {bits}")));
                }
                let scale = (1_i64 << (bits - 1)) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / scale))
                    .collect::<std::result::Result<Vec<f32>, hound::Error>>()?
            }
        };
        Self::from_samples(spec.sample_rate, spec.channels, samples)
    }

    /// Encode as 16-bit PCM WAV
    pub fn write_wav(&self, path: &Path) -> Result<()> {
        let spec = WavSpec {
            channels: self.channels,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(path, spec)?;
        for &sample in &self.samples {
            let value = (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)).round() as i16;
            writer.write_sample(value)?;
        }
        writer.finalize()?;
        Ok(())
    }

    #[must_use]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    #[must_use]
    pub fn channels(&self) -> u16 {
        self.channels
    }

    #[must_use]
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Number of sample frames (samples per channel)
    #[must_use]
    pub fn frames(&self) -> usize {
        self.samples.len() / usize::from(self.channels)
    }

    /// Duration in seconds
    #[must_use]
    pub fn duration(&self) -> f64 {
        self.frames() as f64 / f64::from(self.sample_rate)
    }

    /// True when every sample is zero
    #[must_use]
    pub fn is_silent(&self) -> bool {
        self.samples.iter().all(|s| *s == 0.0)
    }

    /// Keep at most `frames` frames
    #[must_use]
    pub fn truncated(mut self, frames: usize) -> Self {
        self.samples.truncate(frames * usize::from(self.channels));
        self
    }

    /// Convert to another rate and channel count.
    ///
    /// Channel changes go through a mono mix; rate changes use linear
    /// interpolation.
    #[must_use]
    pub fn conform(self, sample_rate: u32, channels: u16) -> Self {
        let track = if self.channels == channels {
            self
        } else {
            self.remix(channels)
        };
        if track.sample_rate == sample_rate {
            track
        } else {
            track.resample(sample_rate)
        }
    }

    fn remix(self, channels: u16) -> Self {
        let from = usize::from(self.channels);
        let to = usize::from(channels);
        let samples = self
            .samples
            .chunks_exact(from)
            .flat_map(|frame| {
                let mono = frame.iter().sum::<f32>() / from as f32;
                std::iter::repeat(mono).take(to)
            })
            .collect();
        Self {
            sample_rate: self.sample_rate,
            channels,
            samples,
        }
    }

    fn resample(self, sample_rate: u32) -> Self {
        let channels = usize::from(self.channels);
        let in_frames = self.frames();
        let ratio = f64::from(sample_rate) / f64::from(self.sample_rate);
        let out_frames = (in_frames as f64 * ratio).round() as usize;

        let mut samples = Vec::with_capacity(out_frames * channels);
        for i in 0..out_frames {
            let pos = i as f64 / ratio;
            let idx = pos.floor() as usize;
            let frac = (pos - idx as f64) as f32;
            for ch in 0..channels {
                let a = self.samples.get(idx * channels + ch).copied().unwrap_or(0.0);
                let b = self
                    .samples
                    .get((idx + 1).min(in_frames.saturating_sub(1)) * channels + ch)
                    .copied()
                    .unwrap_or(a);
                samples.push(a + (b - a) * frac);
            }
        }

        Self {
            sample_rate,
            channels: self.channels,
            samples,
        }
    }

    /// Join tracks back to back. All parts must share rate and channel count.
    pub fn concat(parts: &[AudioTrack]) -> Result<Self> {
        let first = parts
            .first()
            .ok_or_else(|| CheerError::Audio("nothing to concatenate".to_string()))?;

        if let Some(odd) = parts
            .iter()
            .find(|p| p.sample_rate != first.sample_rate || p.channels != first.channels)
        {
            return Err(CheerError::Audio(format!(
                "cannot join {} Hz/{}ch with {} Hz/{}ch",
                first.sample_rate, first.channels, odd.sample_rate, odd.channels
            )));
        }

        let samples = parts.iter().flat_map(|p| p.samples.iter().copied()).collect();
        Ok(Self {
            sample_rate: first.sample_rate,
            channels: first.channels,
            samples,
        })
    }
}

/// Seconds to whole frames at `sample_rate`
#[must_use]
pub fn seconds_to_frames(seconds: f64, sample_rate: u32) -> usize {
    if seconds.is_finite() && seconds > 0.0 {
        (seconds * f64::from(sample_rate)).round() as usize
    } else {
        0
    }
}
