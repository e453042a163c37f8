//! `cheerclip` CLI - generate cheer videos and run the pipeline stages by hand

mod cmd;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use cheerclip::{AudioMix, CaptionStyle, TimingPolicy};

#[derive(Parser)]
#[command(name = "cheerclip")]
#[command(about = "Personalized cheer video generator")]
#[command(version)]
struct Cli {
    /// Configuration file (default: ~/.config/cheerclip/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Caption presets
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum StyleArg {
    /// Two-line banner at 65.5% height
    Banner,
    /// Two-line banner at 72.5% height
    BannerLow,
    /// Bottom-stacked lines, speech clipped or padded
    Stacked,
}

impl From<StyleArg> for CaptionStyle {
    fn from(arg: StyleArg) -> Self {
        match arg {
            StyleArg::Banner => Self::Banner,
            StyleArg::BannerLow => Self::BannerLow,
            StyleArg::Stacked => Self::Stacked,
        }
    }
}

/// Audio mix modes
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum MixArg {
    /// Speech only; clip audio is dropped
    Replace,
    /// Speech summed with the clips' own audio
    Sum,
}

impl From<MixArg> for AudioMix {
    fn from(arg: MixArg) -> Self {
        match arg {
            MixArg::Replace => Self::Replace,
            MixArg::Sum => Self::Sum,
        }
    }
}

/// Speech timing policies
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum PolicyArg {
    /// Fail when the speech does not fit
    Exact,
    /// Clip or pad the speech to fit
    ClipOrPad,
}

impl From<PolicyArg> for TimingPolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::Exact => Self::Exact,
            PolicyArg::ClipOrPad => Self::ClipOrPad,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a cheer video end to end
    Make {
        /// Group name (up to 10 characters)
        #[arg(short, long)]
        group: String,

        /// Name of the person cheering (up to 5 characters)
        #[arg(short, long)]
        name: String,

        /// Extra phrase appended to the spoken cheer (up to 20 characters)
        #[arg(short, long)]
        phrase: Option<String>,

        /// Save the video to this file or directory
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Upload the video to this pre-signed URL instead
        #[arg(long, conflicts_with_all = ["output", "email"])]
        upload: Option<String>,

        /// Email the video to this address (requires --mail-relay)
        #[arg(long, requires = "mail_relay", conflicts_with = "output")]
        email: Option<String>,

        /// Mail relay endpoint
        #[arg(long)]
        mail_relay: Option<String>,

        /// Caption preset
        #[arg(short, long, value_enum)]
        style: Option<StyleArg>,

        /// Audio mix mode
        #[arg(short, long, value_enum)]
        mix: Option<MixArg>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Render a caption overlay to PNG
    Overlay {
        /// Caption text (use \n for line breaks with --style stacked)
        text: String,

        /// Font file (TTF/OTF)
        #[arg(short, long)]
        font: PathBuf,

        /// Output PNG
        #[arg(short, long, default_value = "caption.png")]
        output: PathBuf,

        /// Canvas width
        #[arg(long, default_value = "1920")]
        width: u32,

        /// Canvas height
        #[arg(long, default_value = "1080")]
        height: u32,

        /// Take the canvas size from this video instead
        #[arg(long)]
        video: Option<PathBuf>,

        /// Caption preset
        #[arg(short, long, value_enum)]
        style: Option<StyleArg>,

        /// Font size in pixels
        #[arg(long)]
        font_size: Option<f32>,

        /// Fill color (#RRGGBB)
        #[arg(long)]
        color: Option<String>,
    },

    /// Place a speech WAV on a silent track of fixed length
    Timeline {
        /// Speech WAV file
        speech: PathBuf,

        /// Video duration in seconds
        #[arg(short, long)]
        duration: f64,

        /// Silence before the speech, in seconds
        #[arg(short, long)]
        lead_in: Option<f64>,

        /// Timing policy
        #[arg(short, long, value_enum)]
        policy: Option<PolicyArg>,

        /// Output WAV
        #[arg(short, long, default_value = "timed.wav")]
        output: PathBuf,

        /// Print the segments as JSON
        #[arg(long)]
        json: bool,
    },

    /// Compose a cheer video from local files
    Compose {
        /// Intro clip
        #[arg(long)]
        intro: PathBuf,

        /// Outro clip
        #[arg(long)]
        outro: PathBuf,

        /// Speech audio (any format ffmpeg reads)
        #[arg(long)]
        speech: PathBuf,

        /// Font file (TTF/OTF)
        #[arg(short, long)]
        font: PathBuf,

        /// Group name
        #[arg(short, long)]
        group: String,

        /// Name of the person cheering
        #[arg(short, long)]
        name: String,

        /// Caption text (default: built from group and name)
        #[arg(short, long)]
        text: Option<String>,

        /// Output video
        #[arg(short, long, default_value = "cheer.mp4")]
        output: PathBuf,

        /// Silence before the speech, in seconds
        #[arg(short, long)]
        lead_in: Option<f64>,

        /// Caption preset
        #[arg(short, long, value_enum)]
        style: Option<StyleArg>,

        /// Audio mix mode
        #[arg(short, long, value_enum)]
        mix: Option<MixArg>,
    },

    /// Check that ffmpeg and ffprobe are available
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let cli = Cli::parse();
    let config = cmd::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Make {
            group,
            name,
            phrase,
            output,
            upload,
            email,
            mail_relay,
            style,
            mix,
            json,
        } => {
            let delivery = cmd::make::DeliveryTarget::from_flags(output, upload, email, mail_relay);
            cmd::make::cmd_make(
                config,
                &group,
                &name,
                phrase.as_deref(),
                delivery,
                style.map(Into::into),
                mix.map(Into::into),
                json,
            )
            .await?;
        }
        Commands::Overlay {
            text,
            font,
            output,
            width,
            height,
            video,
            style,
            font_size,
            color,
        } => {
            cmd::overlay::cmd_overlay(
                config,
                &text,
                &font,
                &output,
                (width, height),
                video.as_deref(),
                style.map(Into::into),
                font_size,
                color.as_deref(),
            )
            .await?;
        }
        Commands::Timeline {
            speech,
            duration,
            lead_in,
            policy,
            output,
            json,
        } => {
            cmd::timeline::cmd_timeline(config, &speech, duration, lead_in, policy.map(Into::into), &output, json)?;
        }
        Commands::Compose {
            intro,
            outro,
            speech,
            font,
            group,
            name,
            text,
            output,
            lead_in,
            style,
            mix,
        } => {
            let files = cmd::compose::LocalFiles {
                intro,
                outro,
                speech,
                font,
            };
            cmd::compose::cmd_compose(
                config,
                files,
                &group,
                &name,
                text.as_deref(),
                &output,
                lead_in,
                style.map(Into::into),
                mix.map(Into::into),
            )
            .await?;
        }
        Commands::Check => {
            cmd::check::cmd_check(config).await?;
        }
    }

    Ok(())
}
