use anyhow::{bail, Result};

use cheerclip::pipeline::check_dependencies;
use cheerclip::CheerConfig;

pub async fn cmd_check(config: CheerConfig) -> Result<()> {
    eprintln!("🔍 Checking dependencies");

    let mut missing = Vec::new();
    for (tool, ok) in check_dependencies(&config.compose).await {
        eprintln!("   {} {tool}", if ok { "✅" } else { "❌" });
        if !ok {
            missing.push(tool);
        }
    }

    // Keys are only needed by `make`
    let keys = [
        ("OPENAI_API_KEY", config.text.api_key.is_some()),
        ("TYPECAST_API_KEY", config.speech.api_key.is_some()),
    ];
    for (key, set) in keys {
        eprintln!("   {} {key}", if set { "✅" } else { "⚠️ " });
    }

    if !missing.is_empty() {
        bail!("missing tools: {}", missing.join(", "));
    }
    eprintln!("✅ Ready");
    Ok(())
}
