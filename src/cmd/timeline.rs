use std::path::Path;

use anyhow::{Context, Result};

use cheerclip::{AudioTimeline, AudioTrack, CheerConfig, TimingPolicy};

pub fn cmd_timeline(
    config: CheerConfig,
    speech: &Path,
    duration: f64,
    lead_in: Option<f64>,
    policy: Option<TimingPolicy>,
    output: &Path,
    json: bool,
) -> Result<()> {
    let lead_in = lead_in.unwrap_or(config.audio.lead_in);
    let policy = policy.unwrap_or(config.audio.policy);

    let track = AudioTrack::read_wav(speech).with_context(|| format!("cannot read {}", speech.display()))?;
    let timed = AudioTimeline::new(policy).build(duration, lead_in, track)?;
    timed.track.write_wav(output)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&timed.segments)?);
        return Ok(());
    }

    eprintln!("🔊 {:.3}s track ({policy:?})", timed.duration());
    for segment in &timed.segments {
        eprintln!(
            "   {:>8.3}s  +{:<8.3}  {:?}",
            segment.start, segment.duration, segment.kind
        );
    }
    println!("{}", output.display());

    Ok(())
}
