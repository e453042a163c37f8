//! Pipeline configuration loaded from `~/.config/cheerclip/config.toml`.
//!
//! Every section is optional; missing values fall back to the defaults the
//! hosted service uses. API keys are read from the environment and take
//! precedence over anything in the file.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::audio::TimingPolicy;
use crate::collab::{AssetConfig, DeliveryConfig, OpenAiConfig, TypecastConfig};
use crate::compose::{AudioMix, ComposeConfig};
use crate::overlay::{BottomLayout, CaptionLayout, Rgb, SplitLayout};

/// Caption appearance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptionConfig {
    pub layout: CaptionLayout,
    /// Pixel font size
    pub font_size: f32,
    pub color: Rgb,
}

impl Default for CaptionConfig {
    fn default() -> Self {
        Self {
            layout: CaptionLayout::default(),
            font_size: 90.0,
            color: Rgb(0x00, 0x24, 0x70),
        }
    }
}

/// Speech timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Silence before the speech starts, in seconds
    pub lead_in: f64,
    pub policy: TimingPolicy,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            lead_in: 1.333,
            policy: TimingPolicy::Exact,
        }
    }
}

/// Named caption presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CaptionStyle {
    /// Two-line banner at 65.5% of the frame height
    #[default]
    Banner,
    /// Two-line banner at 72.5% of the frame height
    BannerLow,
    /// Lines stacked above the bottom margin, speech clipped or padded
    Stacked,
}

impl FromStr for CaptionStyle {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "banner" => Ok(Self::Banner),
            "banner-low" | "banner_low" => Ok(Self::BannerLow),
            "stacked" => Ok(Self::Stacked),
            other => Err(format!("unknown caption style {other:?} (banner, banner-low, stacked)")),
        }
    }
}

/// Complete pipeline configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheerConfig {
    pub assets: AssetConfig,
    pub caption: CaptionConfig,
    pub audio: AudioConfig,
    pub compose: ComposeConfig,
    pub text: OpenAiConfig,
    pub speech: TypecastConfig,
    pub delivery: DeliveryConfig,
    /// Parent of the per-request scratch directories (system temp dir if unset)
    pub work_dir: Option<PathBuf>,
}

impl CheerConfig {
    /// Banner caption at 0.655 of the frame, exact timing
    #[must_use]
    pub fn banner() -> Self {
        Self::default()
    }

    /// Banner caption at 0.725 of the frame
    #[must_use]
    pub fn banner_low() -> Self {
        Self::default().with_style(CaptionStyle::BannerLow)
    }

    /// Bottom-stacked caption with clip-or-pad timing
    #[must_use]
    pub fn stacked() -> Self {
        Self::default().with_style(CaptionStyle::Stacked)
    }

    /// Apply a caption preset
    #[must_use]
    pub fn with_style(mut self, style: CaptionStyle) -> Self {
        match style {
            CaptionStyle::Banner => {
                self.caption.layout = CaptionLayout::Split(SplitLayout::default());
                self.audio.policy = TimingPolicy::Exact;
            }
            CaptionStyle::BannerLow => {
                self.caption.layout = CaptionLayout::Split(SplitLayout {
                    anchor: 0.725,
                    ..SplitLayout::default()
                });
                self.audio.policy = TimingPolicy::Exact;
            }
            CaptionStyle::Stacked => {
                self.caption.layout = CaptionLayout::Bottom(BottomLayout::default());
                self.audio.policy = TimingPolicy::ClipOrPad;
            }
        }
        self
    }

    /// Set the audio mix mode
    #[must_use]
    pub fn with_audio_mix(mut self, mix: AudioMix) -> Self {
        self.compose.audio_mix = mix;
        self
    }

    /// Set the delivery channel
    #[must_use]
    pub fn with_delivery(mut self, delivery: DeliveryConfig) -> Self {
        self.delivery = delivery;
        self
    }

    /// Set the speech lead-in
    #[must_use]
    pub fn with_lead_in(mut self, seconds: f64) -> Self {
        self.audio.lead_in = seconds;
        self
    }

    /// Parse TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).context("invalid configuration TOML")
    }

    /// Load from `path`, or from the default location when `path` is `None`.
    ///
    /// A missing default file yields the defaults; a missing explicit file is
    /// an error. Environment secrets are applied either way.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::read(path)?,
            None => {
                let default = config_path();
                if default.exists() {
                    Self::read(&default)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn read(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("invalid TOML in {}", path.display()))
    }

    /// Fill secrets from the environment (`OPENAI_API_KEY`, `TYPECAST_API_KEY`,
    /// `CHEERCLIP_MAIL_API_KEY`)
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = non_empty("OPENAI_API_KEY") {
            self.text.api_key = Some(key);
        }
        if let Some(key) = non_empty("TYPECAST_API_KEY") {
            self.speech.api_key = Some(key);
        }
        if let DeliveryConfig::Email { ref mut api_key, .. } = self.delivery {
            if let Some(key) = non_empty("CHEERCLIP_MAIL_API_KEY") {
                *api_key = Some(key);
            }
        }
    }
}

/// Return the path to the default config file.
#[must_use]
pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("cheerclip")
        .join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_is_default() {
        let config = CheerConfig::from_toml("").unwrap();
        assert_eq!(config, CheerConfig::default());
        assert_eq!(config.caption.font_size, 90.0);
        assert_eq!(config.caption.color, Rgb(0x00, 0x24, 0x70));
        assert_eq!(config.audio.lead_in, 1.333);
        assert_eq!(config.compose.audio_mix, AudioMix::Replace);
    }

    #[test]
    fn partial_sections_keep_defaults() {
        let config = CheerConfig::from_toml(
            r##"
work_dir = "/var/tmp/cheer"

[caption]
color = "#FF0000"

[caption.layout]
kind = "split"
anchor = 0.725

[audio]
policy = "clip_or_pad"

[compose]
audio_mix = "sum"

[speech.poll]
max_attempts = 30

[delivery]
channel = "email"
endpoint = "https://mail.test/send"
recipient = "fan@test"
sender = "cheer@test"
"##,
        )
        .unwrap();

        assert_eq!(config.caption.color, Rgb(0xFF, 0, 0));
        assert_eq!(config.caption.font_size, 90.0);
        assert!(matches!(config.caption.layout, CaptionLayout::Split(ref s) if s.anchor == 0.725));
        assert_eq!(config.audio.policy, TimingPolicy::ClipOrPad);
        assert_eq!(config.audio.lead_in, 1.333);
        assert_eq!(config.compose.audio_mix, AudioMix::Sum);
        assert_eq!(config.compose.video_codec, "libx264");
        assert_eq!(config.speech.poll.max_attempts, 30);
        assert_eq!(config.speech.poll.interval_ms, 1000);
        assert_eq!(config.work_dir, Some(PathBuf::from("/var/tmp/cheer")));
        assert!(matches!(config.delivery, DeliveryConfig::Email { .. }));
    }

    #[test]
    fn bad_color_is_rejected() {
        assert!(CheerConfig::from_toml("[caption]\ncolor = \"blue\"\n").is_err());
    }

    #[test]
    fn presets() {
        assert!(matches!(
            CheerConfig::banner().caption.layout,
            CaptionLayout::Split(ref s) if s.anchor == 0.655
        ));
        assert!(matches!(
            CheerConfig::banner_low().caption.layout,
            CaptionLayout::Split(ref s) if s.anchor == 0.725
        ));
        let stacked = CheerConfig::stacked();
        assert!(matches!(stacked.caption.layout, CaptionLayout::Bottom(_)));
        assert_eq!(stacked.audio.policy, TimingPolicy::ClipOrPad);
    }

    #[test]
    fn style_names_parse() {
        assert_eq!("banner-low".parse::<CaptionStyle>().unwrap(), CaptionStyle::BannerLow);
        assert_eq!("stacked".parse::<CaptionStyle>().unwrap(), CaptionStyle::Stacked);
        assert!("wavy".parse::<CaptionStyle>().is_err());
    }

    #[test]
    fn environment_overrides_file_secrets() {
        let mut config = CheerConfig::from_toml("[text]\napi_key = \"from-file\"\n").unwrap();
        config.apply_env(|key| match key {
            "OPENAI_API_KEY" => Some("from-env".to_string()),
            "TYPECAST_API_KEY" => Some(String::new()),
            _ => None,
        });
        assert_eq!(config.text.api_key.as_deref(), Some("from-env"));
        assert_eq!(config.speech.api_key, None);
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        assert!(CheerConfig::load(Some(Path::new("/nonexistent/cheerclip.toml"))).is_err());
    }

    #[test]
    fn config_path_ends_with_app_dir() {
        assert!(config_path().ends_with("cheerclip/config.toml"));
    }
}
