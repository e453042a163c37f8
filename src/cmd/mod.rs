pub mod check;
pub mod compose;
pub mod make;
pub mod overlay;
pub mod timeline;

use std::path::Path;

use anyhow::Result;
use cheerclip::CheerConfig;

/// Load the configuration file and environment secrets
pub fn load_config(path: Option<&Path>) -> Result<CheerConfig> {
    let config = CheerConfig::load(path)?;
    if let Some(path) = path {
        tracing::debug!("Loaded configuration from {}", path.display());
    }
    Ok(config)
}

/// Print stage timings recorded by the pipeline
pub fn print_stages(stages: &[cheerclip::pipeline::StageRecord]) {
    for record in stages {
        eprintln!("   {:>6} ms  {}", record.elapsed_ms, record.stage);
    }
}
