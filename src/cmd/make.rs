use std::path::PathBuf;

use anyhow::{Context, Result};

use cheerclip::collab::DeliveryConfig;
use cheerclip::{AudioMix, CaptionStyle, CheerConfig, CheerRequest, VideoPipeline};

use super::print_stages;

/// Where `make` sends the finished video
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryTarget {
    /// Whatever the configuration file says
    Configured,
    Save(PathBuf),
    Upload(String),
    Email { recipient: String, relay: String },
}

impl DeliveryTarget {
    pub fn from_flags(
        output: Option<PathBuf>,
        upload: Option<String>,
        email: Option<String>,
        mail_relay: Option<String>,
    ) -> Self {
        match (output, upload, email, mail_relay) {
            (_, Some(url), _, _) => Self::Upload(url),
            (_, _, Some(recipient), Some(relay)) => Self::Email { recipient, relay },
            (Some(path), _, _, _) => Self::Save(path),
            _ => Self::Configured,
        }
    }

    fn resolve(self, configured: &DeliveryConfig) -> DeliveryConfig {
        match self {
            Self::Configured => configured.clone(),
            Self::Save(dest) => DeliveryConfig::Save { dest },
            Self::Upload(url) => DeliveryConfig::Upload {
                url,
                content_type: "video/mp4".to_string(),
            },
            Self::Email { recipient, relay } => {
                let (sender, subject, api_key) = match configured {
                    DeliveryConfig::Email {
                        sender,
                        subject,
                        api_key,
                        ..
                    } => (sender.clone(), subject.clone(), api_key.clone()),
                    _ => (
                        "cheerclip@localhost".to_string(),
                        "Your cheer video".to_string(),
                        std::env::var("CHEERCLIP_MAIL_API_KEY").ok(),
                    ),
                };
                DeliveryConfig::Email {
                    endpoint: relay,
                    recipient,
                    sender,
                    subject,
                    api_key,
                }
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
pub async fn cmd_make(
    mut config: CheerConfig,
    group: &str,
    name: &str,
    phrase: Option<&str>,
    target: DeliveryTarget,
    style: Option<CaptionStyle>,
    mix: Option<AudioMix>,
    json: bool,
) -> Result<()> {
    if let Some(style) = style {
        config = config.with_style(style);
    }
    if let Some(mix) = mix {
        config = config.with_audio_mix(mix);
    }
    let delivery_config = target.resolve(&config.delivery);
    let delivery = delivery_config.build()?;

    let mut request = CheerRequest::new(group, name);
    if let Some(phrase) = phrase {
        request = request.with_phrase(phrase);
    }

    eprintln!("🎬 Cheer video for {group} / {name}");
    eprintln!("   Delivery: {}", delivery.channel());

    let pipeline = VideoPipeline::from_config(config).context("failed to set up collaborators")?;

    let start = std::time::Instant::now();
    let report = match pipeline.run(&request, delivery.as_ref()).await {
        Ok(report) => report,
        Err(failure) => {
            print_stages(&failure.stages);
            return Err(failure.into());
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    eprintln!("\n✅ Done in {:.1}s", start.elapsed().as_secs_f64());
    eprintln!("   Caption: {}", report.display);
    eprintln!(
        "   Timing: {:.3}s lead-in, {:.3}s speech, {:.3}s trailing",
        report.lead_in, report.speech_duration, report.trailing_silence
    );
    eprintln!(
        "   Video: {:.3}s ({:.3}s intro + {:.3}s outro)",
        report.duration, report.intro_duration, report.outro_duration
    );
    print_stages(&report.stages);
    println!("{}", report.receipt.location);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_wins_over_output() {
        let target = DeliveryTarget::from_flags(
            Some(PathBuf::from("a.mp4")),
            Some("https://bucket.test/a".to_string()),
            None,
            None,
        );
        assert_eq!(target, DeliveryTarget::Upload("https://bucket.test/a".to_string()));
    }

    #[test]
    fn no_flags_use_configuration() {
        let target = DeliveryTarget::from_flags(None, None, None, None);
        assert_eq!(target.resolve(&DeliveryConfig::default()), DeliveryConfig::default());
    }

    #[test]
    fn email_keeps_configured_sender() {
        let configured = DeliveryConfig::Email {
            endpoint: "https://old.test".to_string(),
            recipient: "old@test".to_string(),
            sender: "team@test".to_string(),
            subject: "Go".to_string(),
            api_key: None,
        };
        let target = DeliveryTarget::Email {
            recipient: "fan@test".to_string(),
            relay: "https://mail.test".to_string(),
        };
        match target.resolve(&configured) {
            DeliveryConfig::Email {
                endpoint,
                recipient,
                sender,
                ..
            } => {
                assert_eq!(endpoint, "https://mail.test");
                assert_eq!(recipient, "fan@test");
                assert_eq!(sender, "team@test");
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
