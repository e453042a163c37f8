//! Full cheer pipeline: caption -> speech -> overlay -> timing -> compose -> deliver
//!
//! One request runs start to finish on the calling task. Every request gets
//! its own scratch directory, removed when the request ends whatever the
//! outcome. Fixed assets and the caption font are resolved once per
//! pipeline and shared by all requests.
//!
//! Requests cannot be cancelled halfway; dropping the future leaves any
//! running ffmpeg child to finish on its own.

pub mod state;

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use serde::Serialize;
use tempfile::TempDir;
use tokio::process::Command;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::audio::{AudioTimeline, AudioTrack, TIMELINE_SAMPLE_RATE};
use crate::collab::{
    synthesize_speech, AssetStore, Caption, CaptionGenerator, CheerRequest, Delivery, DeliveryReceipt,
    OpenAiCaptioner, SpeechSynthesizer, TypecastSynthesizer,
};
use crate::compose::{ComposeConfig, OverlayFile, SegmentComposer};
use crate::config::CheerConfig;
use crate::error::{CheerError, Result};
use crate::media::{AudioFile, Prober};
use crate::overlay::{CanvasSize, CaptionSpec, FontResource, TextOverlayRenderer};

pub use state::{PipelineFailure, PipelineStage, StageRecord};
use state::StageTracker;

/// Composed durations that differ from the plan by more than this are rejected
const DRIFT_TOLERANCE_SECS: f64 = 0.1;

/// External services used by the pipeline
#[derive(Clone)]
pub struct Collaborators {
    pub captions: Arc<dyn CaptionGenerator>,
    pub speech: Arc<dyn SpeechSynthesizer>,
    pub assets: Arc<AssetStore>,
}

impl Collaborators {
    /// OpenAI captions, Typecast speech and the configured assets
    pub fn from_config(config: &CheerConfig) -> Result<Self> {
        Ok(Self {
            captions: Arc::new(OpenAiCaptioner::new(config.text.clone())?),
            speech: Arc::new(TypecastSynthesizer::new(config.speech.clone())?),
            assets: Arc::new(AssetStore::new(config.assets.clone())),
        })
    }
}

/// Outcome of a finalized request
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub display: String,
    pub script: String,
    pub lead_in: f64,
    pub speech_duration: f64,
    pub trailing_silence: f64,
    pub intro_duration: f64,
    pub outro_duration: f64,
    /// Duration of the composed video
    pub duration: f64,
    pub receipt: DeliveryReceipt,
    pub stages: Vec<StageRecord>,
}

/// The cheer video pipeline
pub struct VideoPipeline {
    config: CheerConfig,
    collaborators: Collaborators,
    renderer: TextOverlayRenderer,
    timeline: AudioTimeline,
    composer: SegmentComposer,
    prober: Prober,
    font: OnceCell<FontResource>,
}

impl VideoPipeline {
    /// Create a new pipeline
    #[must_use]
    pub fn new(config: CheerConfig, collaborators: Collaborators) -> Self {
        let renderer = TextOverlayRenderer::new(config.caption.layout.clone());
        let timeline = AudioTimeline::new(config.audio.policy);
        let composer = SegmentComposer::with_config(config.compose.clone());
        let prober = Prober::new(config.compose.ffprobe_path.clone());
        Self {
            config,
            collaborators,
            renderer,
            timeline,
            composer,
            prober,
            font: OnceCell::new(),
        }
    }

    /// Create pipeline with the default HTTP collaborators
    pub fn from_config(config: CheerConfig) -> Result<Self> {
        let collaborators = Collaborators::from_config(&config)?;
        Ok(Self::new(config, collaborators))
    }

    #[must_use]
    pub fn config(&self) -> &CheerConfig {
        &self.config
    }

    /// Check if all required tools are available
    pub async fn check_dependencies(&self) -> Vec<(String, bool)> {
        check_dependencies(&self.config.compose).await
    }

    /// Run one request and hand the result to `delivery`
    pub async fn run(
        &self,
        request: &CheerRequest,
        delivery: &dyn Delivery,
    ) -> std::result::Result<PipelineReport, PipelineFailure> {
        let mut tracker = StageTracker::new();

        let workspace = match self.workspace() {
            Ok(dir) => dir,
            Err(e) => return Err(tracker.fail(e)),
        };
        debug!("Request workspace: {}", workspace.path().display());

        let outcome = self.run_stages(&mut tracker, request, workspace.path(), delivery).await;

        // Scratch files go whether or not the handoff worked
        let scratch = workspace.path().to_path_buf();
        if let Err(e) = workspace.close() {
            warn!("Failed to remove {}: {e}", scratch.display());
        }

        match outcome {
            Ok(report) => Ok(PipelineReport {
                stages: tracker.finish(),
                ..report
            }),
            Err(e) => Err(tracker.fail(e)),
        }
    }

    fn workspace(&self) -> Result<TempDir> {
        let parent = self.config.work_dir.clone().unwrap_or_else(std::env::temp_dir);
        std::fs::create_dir_all(&parent)?;
        let prefix = format!("cheerclip-{}", uuid::Uuid::new_v4().simple());
        Ok(tempfile::Builder::new().prefix(&prefix).rand_bytes(0).tempdir_in(parent)?)
    }

    async fn run_stages(
        &self,
        tracker: &mut StageTracker,
        request: &CheerRequest,
        dir: &Path,
        delivery: &dyn Delivery,
    ) -> Result<PipelineReport> {
        request.validate()?;

        // Idle -> CaptionReady
        let caption = self.collaborators.captions.generate(request).await?;
        info!("Caption: {:?}", caption.display);
        tracker.advance();

        // CaptionReady -> SpeechReady
        let speech = self.speech(&caption, dir).await?;
        tracker.advance();

        // SpeechReady -> OverlayRendered
        let assets = self.collaborators.assets.paths().await?;
        let intro = self.prober.probe(&assets.intro).await?;
        let outro = self.prober.probe(&assets.outro).await?;
        let font = self.font.get_or_try_init(|| async { FontResource::load(&assets.font) }).await?;

        let canvas = CanvasSize::new(intro.width, intro.height)?;
        let spec = CaptionSpec::new(
            &caption.display,
            font,
            self.config.caption.font_size,
            self.config.caption.color,
            canvas,
        );
        let overlay = self.renderer.render(&spec)?;
        let overlay_file = OverlayFile {
            path: dir.join("caption.png"),
            width: overlay.width(),
            height: overlay.height(),
        };
        overlay.save_png(&overlay_file.path)?;
        tracker.advance();

        // OverlayRendered -> AudioTimed
        let lead_in = self.config.audio.lead_in;
        let timed = self.timeline.build(intro.duration, lead_in, speech)?;
        let speech_start = timed.speech_start().unwrap_or(lead_in);
        let speech_duration = timed.segments.get(1).map_or(0.0, |s| s.duration);
        let trailing_silence = timed.trailing_silence();
        let audio_file = AudioFile {
            path: dir.join("timed.wav"),
            duration: timed.duration(),
            sample_rate: timed.track.sample_rate(),
        };
        timed.track.write_wav(&audio_file.path)?;
        tracker.advance();

        // AudioTimed -> Composed
        let artifact = dir.join(artifact_name(request));
        let plan = self.composer.plan(&intro, &outro, &overlay_file, &audio_file, &artifact)?;
        let composed = self.composer.execute(&plan).await?;
        self.check_drift(&composed.path, plan.duration()).await?;
        tracker.advance();

        // Composed -> Finalized
        let receipt = delivery.deliver(&composed.path).await?;
        info!("Delivered via {} to {}", receipt.channel, receipt.location);
        tracker.advance();

        Ok(PipelineReport {
            display: caption.display,
            script: caption.script,
            lead_in: speech_start,
            speech_duration,
            trailing_silence,
            intro_duration: intro.duration,
            outro_duration: outro.duration,
            duration: composed.duration,
            receipt,
            stages: Vec::new(),
        })
    }

    /// Synthesize, download and decode the spoken script
    async fn speech(&self, caption: &Caption, dir: &Path) -> Result<AudioTrack> {
        let downloaded = dir.join("speech.download");
        synthesize_speech(self.collaborators.speech.as_ref(), &caption.script, &downloaded).await?;

        let wav = dir.join("speech.wav");
        self.normalize_speech(&downloaded, &wav).await?;
        let track = AudioTrack::read_wav(&wav)?;
        info!("Speech lasts {:.3}s", track.duration());
        Ok(track)
    }

    /// Transcode whatever the synthesizer returned to 44.1 kHz mono PCM
    async fn normalize_speech(&self, input: &Path, output: &Path) -> Result<()> {
        let status = Command::new(&self.config.compose.ffmpeg_path)
            .args(["-hide_banner", "-loglevel", "error", "-nostdin", "-i"])
            .arg(input)
            .args(["-vn", "-acodec", "pcm_s16le", "-ar"])
            .arg(TIMELINE_SAMPLE_RATE.to_string())
            .args(["-ac", "1", "-y"])
            .arg(output)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|e| CheerError::Encode(format!("failed to run {}: {e}", self.config.compose.ffmpeg_path)))?;

        if !status.success() {
            return Err(CheerError::Encode("failed to decode synthesized speech".to_string()));
        }
        Ok(())
    }

    /// Re-measure the encoded file; a video that cannot be measured or has the
    /// wrong length is never delivered
    async fn check_drift(&self, output: &Path, expected: f64) -> Result<()> {
        let actual = self
            .prober
            .duration(output)
            .await
            .map_err(|e| CheerError::Encode(format!("cannot verify composed duration: {e}")))?;
        if (actual - expected).abs() > DRIFT_TOLERANCE_SECS {
            return Err(CheerError::Encode(format!(
                "composed video lasts {actual:.3}s, planned {expected:.3}s"
            )));
        }
        debug!("Composed video lasts {actual:.3}s");
        Ok(())
    }
}

/// Check that ffmpeg and ffprobe run
pub async fn check_dependencies(config: &ComposeConfig) -> Vec<(String, bool)> {
    let ffmpeg_ok = SegmentComposer::with_config(config.clone()).check_available().await;
    let ffprobe_ok = tool_responds(&config.ffprobe_path).await;
    vec![("ffmpeg".to_string(), ffmpeg_ok), ("ffprobe".to_string(), ffprobe_ok)]
}

async fn tool_responds(binary: &str) -> bool {
    Command::new(binary)
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map(|s| s.success())
        .unwrap_or(false)
}

/// `cheer-<group>-<name>.mp4`, with anything but letters and digits replaced
fn artifact_name(request: &CheerRequest) -> PathBuf {
    let clean = |s: &str| -> String {
        s.trim()
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { '_' })
            .collect()
    };
    PathBuf::from(format!("cheer-{}-{}.mp4", clean(&request.group), clean(&request.name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::{AssetConfig, SaveToFile, SpeechJob, SpeechStatus};
    use crate::error::Service;
    use crate::retry::RetryPolicy;
    use async_trait::async_trait;
    use std::time::Duration;

    struct FixedCaption(Option<&'static str>);

    #[async_trait]
    impl CaptionGenerator for FixedCaption {
        async fn generate(&self, request: &CheerRequest) -> Result<Caption> {
            match self.0 {
                Some(line) => Ok(Caption::new(line, request.phrase.as_deref())),
                None => Err(CheerError::collaborator(Service::TextGeneration, "rate limited")),
            }
        }
    }

    struct StuckSpeech;

    #[async_trait]
    impl SpeechSynthesizer for StuckSpeech {
        async fn submit(&self, _script: &str) -> Result<SpeechJob> {
            Ok(SpeechJob {
                poll_url: "https://tts.test/job".to_string(),
            })
        }

        async fn poll(&self, _job: &SpeechJob) -> Result<SpeechStatus> {
            Ok(SpeechStatus::InProgress)
        }

        async fn download(&self, _audio_url: &str, _dest: &Path) -> Result<()> {
            Ok(())
        }

        fn poll_policy(&self) -> RetryPolicy {
            RetryPolicy::fixed(2, Duration::from_millis(1))
        }
    }

    fn pipeline(work_dir: &Path, caption: Option<&'static str>) -> VideoPipeline {
        let config = CheerConfig {
            work_dir: Some(work_dir.to_path_buf()),
            ..CheerConfig::default()
        };
        let collaborators = Collaborators {
            captions: Arc::new(FixedCaption(caption)),
            speech: Arc::new(StuckSpeech),
            assets: Arc::new(AssetStore::new(AssetConfig::local(
                Path::new("/nonexistent/intro.mp4"),
                Path::new("/nonexistent/outro.mp4"),
                Path::new("/nonexistent/font.ttf"),
            ))),
        };
        VideoPipeline::new(config, collaborators)
    }

    fn is_empty(dir: &Path) -> bool {
        std::fs::read_dir(dir).unwrap().next().is_none()
    }

    #[tokio::test]
    async fn invalid_request_fails_while_idle() {
        let work = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let failure = pipeline(work.path(), Some("A! B!"))
            .run(&CheerRequest::new("", "kim"), &SaveToFile::new(out.path()))
            .await
            .unwrap_err();

        assert_eq!(failure.last_completed, PipelineStage::Idle);
        assert!(matches!(failure.source, CheerError::InvalidRequest(_)));
        assert!(is_empty(work.path()));
        assert!(is_empty(out.path()));
    }

    #[tokio::test]
    async fn caption_failure_keeps_collaborator_error() {
        let work = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let failure = pipeline(work.path(), None)
            .run(&CheerRequest::new("team", "kim"), &SaveToFile::new(out.path()))
            .await
            .unwrap_err();

        assert_eq!(failure.attempted, PipelineStage::CaptionReady);
        assert_eq!(failure.source.service(), Some(Service::TextGeneration));
        assert_eq!(
            failure.stages.iter().map(|s| s.stage).collect::<Vec<_>>(),
            vec![PipelineStage::Idle, PipelineStage::Failed]
        );
        assert!(is_empty(work.path()));
    }

    #[tokio::test]
    async fn speech_timeout_fails_after_caption() {
        let work = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let failure = pipeline(work.path(), Some("팀! 민수가 응원해!"))
            .run(&CheerRequest::new("팀", "민수"), &SaveToFile::new(out.path()))
            .await
            .unwrap_err();

        assert_eq!(failure.last_completed, PipelineStage::CaptionReady);
        assert!(matches!(
            failure.source,
            CheerError::CollaboratorTimeout {
                service: Service::SpeechSynthesis,
                attempts: 2
            }
        ));
        assert!(is_empty(work.path()));
        assert!(is_empty(out.path()));
    }

    // ─── Full runs against stand-in ffmpeg/ffprobe ───────────────────────────

    /// Writes the `-t` length into the output, or copies the first input
    #[cfg(unix)]
    const FAKE_FFMPEG: &str = r#"#!/bin/sh
input=""; length=""; prev=""; out=""
for arg in "$@"; do
  case "$prev" in
    -i) if [ -z "$input" ]; then input="$arg"; fi ;;
    -t) length="$arg" ;;
  esac
  prev="$arg"; out="$arg"
done
if [ -n "$length" ]; then printf '%s\n' "$length" > "$out"; else cp "$input" "$out"; fi
"#;

    /// Like `FAKE_FFMPEG`, but every encode measures two seconds
    #[cfg(unix)]
    const SHORT_FFMPEG: &str = r#"#!/bin/sh
input=""; length=""; prev=""; out=""
for arg in "$@"; do
  case "$prev" in
    -i) if [ -z "$input" ]; then input="$arg"; fi ;;
    -t) length="$arg" ;;
  esac
  prev="$arg"; out="$arg"
done
if [ -n "$length" ]; then printf '2.000000\n' > "$out"; else cp "$input" "$out"; fi
"#;

    /// Prints the probed file, which holds either ffprobe JSON or a duration
    #[cfg(unix)]
    const FAKE_FFPROBE: &str = "#!/bin/sh\nfor arg in \"$@\"; do last=\"$arg\"; done\ncat \"$last\"\n";

    #[cfg(unix)]
    fn tools() -> &'static Path {
        use std::os::unix::fs::PermissionsExt;
        use std::sync::OnceLock;

        static TOOLS: OnceLock<tempfile::TempDir> = OnceLock::new();
        TOOLS
            .get_or_init(|| {
                let dir = tempfile::tempdir().unwrap();
                for (name, body) in [
                    ("ffmpeg", FAKE_FFMPEG),
                    ("ffmpeg-short", SHORT_FFMPEG),
                    ("ffprobe", FAKE_FFPROBE),
                ] {
                    let path = dir.path().join(name);
                    std::fs::write(&path, body).unwrap();
                    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
                }
                dir
            })
            .path()
    }

    #[cfg(unix)]
    fn probe_json(duration: f64, has_audio: bool) -> String {
        let audio = if has_audio { r#", {"codec_type": "audio"}"# } else { "" };
        format!(
            r#"{{"streams": [{{"codec_type": "video", "width": 320, "height": 240, "r_frame_rate": "25/1"}}{audio}], "format": {{"duration": "{duration}"}}}}"#
        )
    }

    /// Intro of 10.0s, outro of 4.5s, 6.0s of speech, lead-in 1.0s
    #[cfg(unix)]
    struct Scene {
        assets: tempfile::TempDir,
        work: tempfile::TempDir,
        out: tempfile::TempDir,
    }

    #[cfg(unix)]
    impl Scene {
        fn new() -> Self {
            let assets = tempfile::tempdir().unwrap();
            std::fs::write(assets.path().join("intro.mp4"), probe_json(10.0, true)).unwrap();
            std::fs::write(assets.path().join("outro.mp4"), probe_json(4.5, false)).unwrap();
            let frames = crate::audio::seconds_to_frames(6.0, TIMELINE_SAMPLE_RATE);
            AudioTrack::from_samples(TIMELINE_SAMPLE_RATE, 1, vec![0.2; frames])
                .unwrap()
                .write_wav(&assets.path().join("speech.wav"))
                .unwrap();
            Self {
                assets,
                work: tempfile::tempdir().unwrap(),
                out: tempfile::tempdir().unwrap(),
            }
        }

        fn pipeline(&self, ffmpeg: &str) -> VideoPipeline {
            let mut config = CheerConfig {
                work_dir: Some(self.work.path().to_path_buf()),
                ..CheerConfig::default()
            }
            .with_lead_in(1.0);
            config.compose.ffmpeg_path = tools().join(ffmpeg).display().to_string();
            config.compose.ffprobe_path = tools().join("ffprobe").display().to_string();

            let font = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/DejaVuSans.ttf");
            let collaborators = Collaborators {
                captions: Arc::new(crate::collab::TemplateCaption),
                speech: Arc::new(crate::collab::LocalSpeech::new(self.assets.path().join("speech.wav"))),
                assets: Arc::new(AssetStore::new(AssetConfig::local(
                    &self.assets.path().join("intro.mp4"),
                    &self.assets.path().join("outro.mp4"),
                    &font,
                ))),
            };
            VideoPipeline::new(config, collaborators)
        }
    }

    #[cfg(unix)]
    struct RefusingDelivery;

    #[cfg(unix)]
    #[async_trait]
    impl Delivery for RefusingDelivery {
        fn channel(&self) -> &'static str {
            "upload"
        }

        async fn deliver(&self, _artifact: &Path) -> Result<DeliveryReceipt> {
            Err(CheerError::collaborator(Service::Delivery, "bucket refused the object"))
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn full_run_times_speech_and_delivers() {
        let scene = Scene::new();
        let report = scene
            .pipeline("ffmpeg")
            .run(&CheerRequest::new("team", "kim"), &SaveToFile::new(scene.out.path()))
            .await
            .unwrap();

        assert!((report.lead_in - 1.0).abs() < 1e-3);
        assert!((report.speech_duration - 6.0).abs() < 1e-3);
        assert!((report.trailing_silence - 3.0).abs() < 1e-3);
        assert!((report.intro_duration - 10.0).abs() < 1e-9);
        assert!((report.duration - (report.intro_duration + report.outro_duration)).abs() < 1e-9);
        assert!((report.duration - 14.5).abs() < 1e-9);
        assert_eq!(
            report.stages.iter().map(|s| s.stage).collect::<Vec<_>>(),
            vec![
                PipelineStage::Idle,
                PipelineStage::CaptionReady,
                PipelineStage::SpeechReady,
                PipelineStage::OverlayRendered,
                PipelineStage::AudioTimed,
                PipelineStage::Composed,
                PipelineStage::Finalized,
            ]
        );

        let delivered = scene.out.path().join("cheer-team-kim.mp4");
        assert_eq!(report.receipt.location, delivered.display().to_string());
        assert!(delivered.exists());
        assert!(is_empty(scene.work.path()));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn refused_delivery_still_removes_workspace() {
        let scene = Scene::new();
        let failure = scene
            .pipeline("ffmpeg")
            .run(&CheerRequest::new("team", "kim"), &RefusingDelivery)
            .await
            .unwrap_err();

        assert_eq!(failure.last_completed, PipelineStage::Composed);
        assert_eq!(failure.attempted, PipelineStage::Finalized);
        assert_eq!(failure.source.service(), Some(Service::Delivery));
        assert!(is_empty(scene.work.path()));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn mistimed_encode_is_never_delivered() {
        let scene = Scene::new();
        let failure = scene
            .pipeline("ffmpeg-short")
            .run(&CheerRequest::new("team", "kim"), &SaveToFile::new(scene.out.path()))
            .await
            .unwrap_err();

        assert_eq!(failure.last_completed, PipelineStage::AudioTimed);
        assert_eq!(failure.attempted, PipelineStage::Composed);
        assert!(matches!(failure.source, CheerError::Encode(ref msg) if msg.contains("2.000s")));
        assert!(is_empty(scene.out.path()));
        assert!(is_empty(scene.work.path()));
    }

    #[test]
    fn artifact_names_are_filesystem_safe() {
        let name = artifact_name(&CheerRequest::new("응원 단/1", "민수"));
        assert_eq!(name, PathBuf::from("cheer-응원_단_1-민수.mp4"));
    }
}
