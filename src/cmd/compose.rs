use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;

use cheerclip::collab::{AssetConfig, AssetStore, LocalSpeech, StaticCaption, TemplateCaption};
use cheerclip::pipeline::Collaborators;
use cheerclip::{AudioMix, CaptionGenerator, CaptionStyle, CheerConfig, CheerRequest, SaveToFile, VideoPipeline};

use super::print_stages;

/// Inputs for an offline composition
pub struct LocalFiles {
    pub intro: PathBuf,
    pub outro: PathBuf,
    pub speech: PathBuf,
    pub font: PathBuf,
}

#[allow(clippy::too_many_arguments)]
pub async fn cmd_compose(
    mut config: CheerConfig,
    files: LocalFiles,
    group: &str,
    name: &str,
    text: Option<&str>,
    output: &Path,
    lead_in: Option<f64>,
    style: Option<CaptionStyle>,
    mix: Option<AudioMix>,
) -> Result<()> {
    if let Some(style) = style {
        config = config.with_style(style);
    }
    if let Some(mix) = mix {
        config = config.with_audio_mix(mix);
    }
    if let Some(lead_in) = lead_in {
        config = config.with_lead_in(lead_in);
    }

    let captions: Arc<dyn CaptionGenerator> = match text {
        Some(text) => Arc::new(StaticCaption::new(text)),
        None => Arc::new(TemplateCaption),
    };
    let collaborators = Collaborators {
        captions,
        speech: Arc::new(LocalSpeech::new(files.speech)),
        assets: Arc::new(AssetStore::new(AssetConfig::local(&files.intro, &files.outro, &files.font))),
    };

    eprintln!("🎬 Composing {} + {}", files.intro.display(), files.outro.display());

    let pipeline = VideoPipeline::new(config, collaborators);
    let request = CheerRequest::new(group, name);
    let report = match pipeline.run(&request, &SaveToFile::new(output)).await {
        Ok(report) => report,
        Err(failure) => {
            print_stages(&failure.stages);
            return Err(failure.into());
        }
    };

    eprintln!("✅ {:.3}s video, caption {:?}", report.duration, report.display);
    print_stages(&report.stages);
    println!("{}", report.receipt.location);
    Ok(())
}
