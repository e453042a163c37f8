use std::path::Path;

use anyhow::{Context, Result};

use cheerclip::overlay::{CanvasSize, Rgb};
use cheerclip::{CaptionSpec, CaptionStyle, CheerConfig, FontResource, Prober, TextOverlayRenderer};

#[allow(clippy::too_many_arguments)]
pub async fn cmd_overlay(
    mut config: CheerConfig,
    text: &str,
    font_path: &Path,
    output: &Path,
    size: (u32, u32),
    video: Option<&Path>,
    style: Option<CaptionStyle>,
    font_size: Option<f32>,
    color: Option<&str>,
) -> Result<()> {
    if let Some(style) = style {
        config = config.with_style(style);
    }
    if let Some(size) = font_size {
        config.caption.font_size = size;
    }
    if let Some(color) = color {
        config.caption.color = color.parse::<Rgb>()?;
    }

    let canvas = match video {
        Some(video) => {
            let segment = Prober::new(config.compose.ffprobe_path.clone())
                .probe(video)
                .await
                .with_context(|| format!("cannot probe {}", video.display()))?;
            CanvasSize::new(segment.width, segment.height)?
        }
        None => CanvasSize::new(size.0, size.1)?,
    };

    let font = FontResource::load(font_path)?;
    let text = text.replace("\\n", "\n");
    let spec = CaptionSpec::new(&text, &font, config.caption.font_size, config.caption.color, canvas);
    let overlay = TextOverlayRenderer::new(config.caption.layout.clone()).render(&spec)?;
    overlay.save_png(output)?;

    eprintln!("🖼️  {}x{} caption, {}", overlay.width(), overlay.height(), config.caption.color);
    for line in overlay.lines() {
        eprintln!("   ({:>5}, {:>5})  {}", line.x, line.y, line.text);
    }
    println!("{}", output.display());

    Ok(())
}
