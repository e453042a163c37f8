//! ffmpeg-based segment composer
//!
//! Binds the timed speech track to the intro, concatenates the intro with the
//! outro and burns the caption overlay over the whole result:
//!
//! ```text
//!   intro video ──┐
//!   timed audio ──┤ (replace | sum with intro audio)
//!                 ├─ concat ── overlay(caption) ── H.264 + AAC
//!   outro video ──┤
//!   outro audio ──┘ (silence | original)
//! ```
//!
//! Composition is split into a pure [`ComposePlan`] (filter graph, arguments,
//! expected duration) and its execution, so the timing invariants can be
//! checked without running ffmpeg.

pub mod timeline;

use std::path::{Path, PathBuf};
use std::process::Stdio;

use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, info};

use crate::audio::TIMELINE_SAMPLE_RATE;
use crate::error::{CheerError, Result};
use crate::media::{AudioFile, VideoSegment};

pub use timeline::{AudioSource, Timeline, TimelineEntry};

/// What happens to the clips' own audio
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioMix {
    /// Original audio of both clips is dropped; the outro plays silence
    #[default]
    Replace,
    /// Timed audio is summed with the intro's audio; the outro keeps its own
    Sum,
}

/// Rendered caption image on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayFile {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
}

/// Configuration for the composer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComposeConfig {
    /// Path to ffmpeg binary
    pub ffmpeg_path: String,
    /// Path to ffprobe binary
    pub ffprobe_path: String,
    /// Video codec
    pub video_codec: String,
    /// Audio codec
    pub audio_codec: String,
    /// Output pixel format
    pub pixel_format: String,
    /// Audio bitrate (e.g., "192k")
    pub audio_bitrate: Option<String>,
    /// Encoder preset (e.g., "medium")
    pub preset: Option<String>,
    /// Replace or sum the clips' original audio
    pub audio_mix: AudioMix,
    /// Additional ffmpeg output arguments
    pub output_args: Vec<String>,
}

fn locate(binary: &str) -> String {
    which::which(binary).map_or_else(|_| binary.to_string(), |p| p.to_string_lossy().to_string())
}

impl Default for ComposeConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: locate("ffmpeg"),
            ffprobe_path: locate("ffprobe"),
            video_codec: "libx264".to_string(),
            audio_codec: "aac".to_string(),
            pixel_format: "yuv420p".to_string(),
            audio_bitrate: Some("192k".to_string()),
            preset: Some("medium".to_string()),
            audio_mix: AudioMix::Replace,
            output_args: vec!["-movflags".to_string(), "+faststart".to_string()],
        }
    }
}

impl ComposeConfig {
    /// Sum the timed track with the clips' original audio
    #[must_use]
    pub fn with_audio_mix(mut self, mix: AudioMix) -> Self {
        self.audio_mix = mix;
        self
    }
}

/// Everything needed to run one composition
#[derive(Debug, Clone)]
pub struct ComposePlan {
    pub timeline: Timeline,
    pub filter_graph: String,
    pub args: Vec<String>,
    pub output: PathBuf,
}

impl ComposePlan {
    /// Duration of the encoded result
    #[must_use]
    pub fn duration(&self) -> f64 {
        self.timeline.duration()
    }
}

/// ffmpeg-based composer
#[derive(Debug, Clone, Default)]
pub struct SegmentComposer {
    config: ComposeConfig,
}

const AUDIO_FORMAT: &str = "aformat=sample_fmts=fltp:channel_layouts=stereo";

impl SegmentComposer {
    #[must_use]
    pub fn with_config(config: ComposeConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &ComposeConfig {
        &self.config
    }

    /// Check if ffmpeg is available
    pub async fn check_available(&self) -> bool {
        Command::new(&self.config.ffmpeg_path)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }

    /// Bind audio to the intro according to the mix mode
    fn build_timeline(&self, intro: &VideoSegment, outro: &VideoSegment, audio: &AudioFile) -> Result<Timeline> {
        let (intro_source, outro_source) = match self.config.audio_mix {
            AudioMix::Replace => (AudioSource::Timed, AudioSource::Silence),
            AudioMix::Sum => (
                if intro.has_audio {
                    AudioSource::TimedOverOriginal
                } else {
                    AudioSource::Timed
                },
                if outro.has_audio {
                    AudioSource::Original
                } else {
                    AudioSource::Silence
                },
            ),
        };

        let mut timeline = Timeline::new();
        timeline.push(intro.clone(), intro_source, audio.duration)?;
        timeline.push(outro.clone(), outro_source, outro.duration)?;
        Ok(timeline)
    }

    fn build_filter_graph(&self, timeline: &Timeline, overlay_input: usize, audio_input: usize) -> String {
        let entries = timeline.entries();
        let Some(first) = entries.first() else {
            return String::new();
        };
        let (width, height) = (first.segment.width, first.segment.height);
        let fps = first.segment.frame_rate;

        let mut chains = Vec::new();
        let mut concat_inputs = String::new();

        for (i, entry) in entries.iter().enumerate() {
            let d = entry.segment.duration;
            chains.push(format!(
                "[{i}:v]fps={fps:.6},scale={width}:{height},setsar=1,trim=duration={d:.6},setpts=PTS-STARTPTS[v{i}]"
            ));

            let audio = match entry.audio {
                AudioSource::Timed => format!("[{audio_input}:a]{AUDIO_FORMAT},apad"),
                AudioSource::TimedOverOriginal => format!(
                    "[{i}:a]{AUDIO_FORMAT}[o{i}];[{audio_input}:a]{AUDIO_FORMAT}[t{i}];\
                     [o{i}][t{i}]amix=inputs=2:duration=longest:normalize=0,apad"
                ),
                AudioSource::Original => format!("[{i}:a]{AUDIO_FORMAT},apad"),
                AudioSource::Silence => {
                    format!("anullsrc=r={TIMELINE_SAMPLE_RATE}:cl=stereo,{AUDIO_FORMAT}")
                }
            };
            chains.push(format!(
                "{audio},aresample={TIMELINE_SAMPLE_RATE},atrim=duration={d:.6},asetpts=PTS-STARTPTS[a{i}]"
            ));

            concat_inputs.push_str(&format!("[v{i}][a{i}]"));
        }

        chains.push(format!(
            "{concat_inputs}concat=n={}:v=1:a=1[cv][ca]",
            entries.len()
        ));
        chains.push(format!(
            "[{overlay_input}:v]format=rgba[ov];[cv][ov]overlay=0:0:shortest=1:format=auto,format={}[vout]",
            self.config.pixel_format
        ));

        chains.join(";")
    }

    fn build_args(&self, timeline: &Timeline, overlay: &OverlayFile, audio: &AudioFile, filter: &str, output: &Path) -> Vec<String> {
        let mut args: Vec<String> = ["-hide_banner", "-loglevel", "error", "-nostdin"]
            .iter()
            .map(std::string::ToString::to_string)
            .collect();

        for entry in timeline.entries() {
            args.push("-i".to_string());
            args.push(entry.segment.path.to_string_lossy().to_string());
        }

        args.extend(["-loop".to_string(), "1".to_string(), "-i".to_string()]);
        args.push(overlay.path.to_string_lossy().to_string());

        args.push("-i".to_string());
        args.push(audio.path.to_string_lossy().to_string());

        args.push("-filter_complex".to_string());
        args.push(filter.to_string());
        args.extend(["-map".to_string(), "[vout]".to_string(), "-map".to_string(), "[ca]".to_string()]);

        args.push("-c:v".to_string());
        args.push(self.config.video_codec.clone());
        if let Some(ref preset) = self.config.preset {
            args.push("-preset".to_string());
            args.push(preset.clone());
        }
        args.push("-pix_fmt".to_string());
        args.push(self.config.pixel_format.clone());

        args.push("-c:a".to_string());
        args.push(self.config.audio_codec.clone());
        if let Some(ref bitrate) = self.config.audio_bitrate {
            args.push("-b:a".to_string());
            args.push(bitrate.clone());
        }
        args.push("-ar".to_string());
        args.push(TIMELINE_SAMPLE_RATE.to_string());

        args.extend(self.config.output_args.clone());

        args.push("-t".to_string());
        args.push(format!("{:.6}", timeline.duration()));
        args.push("-y".to_string());
        args.push(output.to_string_lossy().to_string());

        args
    }

    /// Plan a composition without running it
    pub fn plan(
        &self,
        intro: &VideoSegment,
        outro: &VideoSegment,
        overlay: &OverlayFile,
        audio: &AudioFile,
        output: &Path,
    ) -> Result<ComposePlan> {
        if overlay.width != intro.width || overlay.height != intro.height {
            return Err(CheerError::InvalidGeometry(format!(
                "overlay is {}x{} but the intro frame is {}x{}",
                overlay.width, overlay.height, intro.width, intro.height
            )));
        }

        let timeline = self.build_timeline(intro, outro, audio)?;
        let inputs = timeline.entries().len();
        let filter_graph = self.build_filter_graph(&timeline, inputs, inputs + 1);
        let args = self.build_args(&timeline, overlay, audio, &filter_graph, output);

        Ok(ComposePlan {
            timeline,
            filter_graph,
            args,
            output: output.to_path_buf(),
        })
    }

    /// Run a planned composition
    pub async fn execute(&self, plan: &ComposePlan) -> Result<VideoSegment> {
        debug!("ffmpeg args: {:?}", plan.args);

        let output = Command::new(&self.config.ffmpeg_path)
            .args(&plan.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| CheerError::Encode(format!("failed to run {}: {e}", self.config.ffmpeg_path)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: Vec<&str> = stderr.lines().rev().take(5).collect();
            return Err(CheerError::Encode(format!(
                "ffmpeg exited with status {}: {}",
                output.status,
                tail.into_iter().rev().collect::<Vec<_>>().join(" | ")
            )));
        }

        let first = plan
            .timeline
            .entries()
            .first()
            .ok_or_else(|| CheerError::Encode("empty timeline".to_string()))?;

        info!("Composed {:.3}s video to {:?}", plan.duration(), plan.output);

        Ok(VideoSegment::new(
            &plan.output,
            first.segment.width,
            first.segment.height,
            plan.duration(),
            first.segment.frame_rate,
        )
        .with_audio(true))
    }

    /// Plan and run a composition
    pub async fn compose(
        &self,
        intro: &VideoSegment,
        outro: &VideoSegment,
        overlay: &OverlayFile,
        audio: &AudioFile,
        output: &Path,
    ) -> Result<VideoSegment> {
        let plan = self.plan(intro, outro, overlay, audio, output)?;
        self.execute(&plan).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intro() -> VideoSegment {
        VideoSegment::new("/assets/intro.mp4", 1920, 1080, 10.0, 30.0).with_audio(true)
    }

    fn outro() -> VideoSegment {
        VideoSegment::new("/assets/outro.mp4", 1280, 720, 4.5, 25.0)
    }

    fn overlay() -> OverlayFile {
        OverlayFile {
            path: PathBuf::from("/tmp/req/caption.png"),
            width: 1920,
            height: 1080,
        }
    }

    fn audio(duration: f64) -> AudioFile {
        AudioFile {
            path: PathBuf::from("/tmp/req/timed.wav"),
            duration,
            sample_rate: TIMELINE_SAMPLE_RATE,
        }
    }

    fn composer(mix: AudioMix) -> SegmentComposer {
        SegmentComposer::with_config(ComposeConfig {
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            ..ComposeConfig::default().with_audio_mix(mix)
        })
    }

    #[test]
    fn plan_duration_is_sum_of_segments() {
        for (i, o) in [(10.0, 4.5), (3.2, 0.8), (12.345, 6.789)] {
            let intro = VideoSegment::new("i.mp4", 1920, 1080, i, 30.0);
            let outro = VideoSegment::new("o.mp4", 1920, 1080, o, 30.0);
            let plan = composer(AudioMix::Replace)
                .plan(&intro, &outro, &overlay(), &audio(i), Path::new("out.mp4"))
                .unwrap();
            assert!((plan.duration() - (i + o)).abs() < 1e-9);
        }
    }

    #[test]
    fn audio_shorter_than_intro_is_rejected() {
        let err = composer(AudioMix::Replace)
            .plan(&intro(), &outro(), &overlay(), &audio(9.0), Path::new("out.mp4"))
            .unwrap_err();
        assert!(matches!(err, CheerError::Audio(_)));
    }

    #[test]
    fn overlay_must_match_intro_frame() {
        let small = OverlayFile {
            width: 1280,
            height: 720,
            ..overlay()
        };
        let err = composer(AudioMix::Replace)
            .plan(&intro(), &outro(), &small, &audio(10.0), Path::new("out.mp4"))
            .unwrap_err();
        assert!(matches!(err, CheerError::InvalidGeometry(_)));
    }

    #[test]
    fn replace_mode_discards_original_audio() {
        let plan = composer(AudioMix::Replace)
            .plan(&intro(), &outro(), &overlay(), &audio(10.0), Path::new("out.mp4"))
            .unwrap();

        assert!(!plan.filter_graph.contains("[0:a]"));
        assert!(!plan.filter_graph.contains("[1:a]"));
        assert!(plan.filter_graph.contains("[3:a]"));
        assert!(plan.filter_graph.contains("anullsrc"));
        assert!(!plan.filter_graph.contains("amix"));
        assert_eq!(plan.timeline.entries()[0].audio, AudioSource::Timed);
        assert_eq!(plan.timeline.entries()[1].audio, AudioSource::Silence);
    }

    #[test]
    fn sum_mode_mixes_intro_audio() {
        let outro_with_audio = outro().with_audio(true);
        let plan = composer(AudioMix::Sum)
            .plan(&intro(), &outro_with_audio, &overlay(), &audio(10.0), Path::new("out.mp4"))
            .unwrap();

        assert!(plan.filter_graph.contains("amix=inputs=2"));
        assert!(plan.filter_graph.contains("normalize=0"));
        assert!(plan.filter_graph.contains("[1:a]"));
        assert_eq!(plan.timeline.entries()[1].audio, AudioSource::Original);
    }

    #[test]
    fn sum_mode_without_intro_audio_uses_timed_track_only() {
        let silent_intro = intro().with_audio(false);
        let plan = composer(AudioMix::Sum)
            .plan(&silent_intro, &outro(), &overlay(), &audio(10.0), Path::new("out.mp4"))
            .unwrap();
        assert!(!plan.filter_graph.contains("amix"));
        assert!(!plan.filter_graph.contains("[0:a]"));
    }

    #[test]
    fn outro_is_scaled_to_intro_frame_and_trimmed() {
        let plan = composer(AudioMix::Replace)
            .plan(&intro(), &outro(), &overlay(), &audio(10.0), Path::new("out.mp4"))
            .unwrap();
        assert!(plan
            .filter_graph
            .contains("[1:v]fps=30.000000,scale=1920:1080,setsar=1,trim=duration=4.500000"));
        assert!(plan.filter_graph.contains("atrim=duration=10.000000"));
        assert!(plan.filter_graph.contains("concat=n=2:v=1:a=1[cv][ca]"));
        assert!(plan.filter_graph.contains("[2:v]format=rgba[ov]"));
        assert!(plan.filter_graph.contains("overlay=0:0:shortest=1"));
    }

    #[test]
    fn args_use_fixed_codecs_and_exact_length() {
        let plan = composer(AudioMix::Replace)
            .plan(&intro(), &outro(), &overlay(), &audio(10.0), Path::new("/tmp/req/final.mp4"))
            .unwrap();
        let args = &plan.args;

        let after = |flag: &str| {
            args.iter()
                .position(|a| a == flag)
                .and_then(|i| args.get(i + 1))
                .cloned()
        };
        assert_eq!(after("-c:v").as_deref(), Some("libx264"));
        assert_eq!(after("-c:a").as_deref(), Some("aac"));
        assert_eq!(after("-t").as_deref(), Some("14.500000"));
        assert_eq!(after("-loop").as_deref(), Some("1"));
        assert_eq!(args.last().map(String::as_str), Some("/tmp/req/final.mp4"));
        assert_eq!(args.iter().filter(|a| *a == "-i").count(), 4);
    }
}
