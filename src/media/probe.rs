//! Video metadata via ffprobe

use std::path::Path;

use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;

use super::VideoSegment;
use crate::error::{CheerError, Result};
use crate::overlay::CanvasSize;

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
    format: FfprobeFormat,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    width: Option<f64>,
    height: Option<f64>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

/// ffprobe wrapper producing [`VideoSegment`]s
#[derive(Debug, Clone)]
pub struct Prober {
    ffprobe_path: String,
}

impl Prober {
    pub fn new(ffprobe_path: impl Into<String>) -> Self {
        Self {
            ffprobe_path: ffprobe_path.into(),
        }
    }

    /// Probe a clip's geometry, duration, frame rate and audio presence
    pub async fn probe(&self, path: &Path) -> Result<VideoSegment> {
        debug!("Probing {:?}", path);

        let output = Command::new(&self.ffprobe_path)
            .args(["-v", "quiet", "-print_format", "json", "-show_format", "-show_streams"])
            .arg(path)
            .output()
            .await
            .map_err(|e| CheerError::Encode(format!("failed to run {}: {e}", self.ffprobe_path)))?;

        if !output.status.success() {
            return Err(CheerError::Encode(format!(
                "ffprobe failed for {}: {}",
                path.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        parse_probe(path, &output.stdout)
    }

    /// Duration of any media file (audio or video)
    pub async fn duration(&self, path: &Path) -> Result<f64> {
        let output = Command::new(&self.ffprobe_path)
            .args(["-v", "error", "-show_entries", "format=duration", "-of", "default=noprint_wrappers=1:nokey=1"])
            .arg(path)
            .output()
            .await
            .map_err(|e| CheerError::Encode(format!("failed to run {}: {e}", self.ffprobe_path)))?;

        if !output.status.success() {
            return Err(CheerError::Encode(format!("ffprobe failed for {}", path.display())));
        }

        String::from_utf8_lossy(&output.stdout)
            .trim()
            .parse()
            .map_err(|_| CheerError::Encode(format!("unreadable duration for {}", path.display())))
    }
}

/// Parse a rate like `30000/1001` or `25`
fn parse_rate(rate: &str) -> Option<f64> {
    match rate.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.parse().ok()?;
            let den: f64 = den.parse().ok()?;
            (den != 0.0 && num > 0.0).then(|| num / den)
        }
        None => rate.parse().ok().filter(|r: &f64| *r > 0.0),
    }
}

/// Turn ffprobe JSON into a segment, rejecting clips without usable geometry
fn parse_probe(path: &Path, json: &[u8]) -> Result<VideoSegment> {
    let probe: FfprobeOutput = serde_json::from_slice(json)?;

    let video = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| CheerError::Encode(format!("no video stream in {}", path.display())))?;

    let frame = CanvasSize::from_metadata(video.width, video.height).map_err(|e| match e {
        CheerError::InvalidGeometry(msg) => CheerError::InvalidGeometry(format!("{}: {msg}", path.display())),
        other => other,
    })?;

    let duration = probe
        .format
        .duration
        .as_deref()
        .or(video.duration.as_deref())
        .and_then(|d| d.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0)
        .ok_or_else(|| CheerError::Encode(format!("no duration for {}", path.display())))?;

    let frame_rate = video
        .avg_frame_rate
        .as_deref()
        .and_then(parse_rate)
        .or_else(|| video.r_frame_rate.as_deref().and_then(parse_rate))
        .unwrap_or(30.0);

    let has_audio = probe
        .streams
        .iter()
        .any(|s| s.codec_type.as_deref() == Some("audio"));

    Ok(VideoSegment::new(path, frame.width, frame.height, duration, frame_rate).with_audio(has_audio))
}
