//! `cheerclip` - personalized cheer video generator
//!
//! # Features
//!
//! - **Caption overlay**: text rasterized onto a transparent frame-sized canvas
//! - **Speech timing**: synthesized speech placed after a fixed lead-in on a
//!   track exactly as long as the intro
//! - **Composition**: intro + outro concatenated with ffmpeg, caption burned in
//! - **Collaborators**: caption generation, speech synthesis, asset fetch and
//!   delivery behind traits
//!
//! # Example
//!
//! ```rust,no_run
//! use cheerclip::{CheerConfig, CheerRequest, SaveToFile, VideoPipeline};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = CheerConfig::load(None)?;
//!     let pipeline = VideoPipeline::from_config(config)?;
//!     let request = CheerRequest::new("응원단", "민수");
//!     let report = pipeline.run(&request, &SaveToFile::new("cheer.mp4")).await?;
//!     println!("{:.2}s video at {}", report.duration, report.receipt.location);
//!     Ok(())
//! }
//! ```

pub mod audio;
pub mod collab;
pub mod compose;
pub mod config;
pub mod error;
pub mod media;
pub mod overlay;
pub mod pipeline;
pub mod retry;

pub use audio::{AudioTimeline, AudioTrack, TimedTrack, TimingPolicy};
pub use collab::{CaptionGenerator, CheerRequest, Delivery, SaveToFile, SpeechSynthesizer};
pub use compose::{AudioMix, ComposeConfig, SegmentComposer};
pub use config::{CaptionStyle, CheerConfig};
pub use error::{CheerError, Result, Service};
pub use media::{Prober, VideoSegment};
pub use overlay::{CaptionLayout, CaptionSpec, FontResource, TextOverlayRenderer};
pub use pipeline::{PipelineFailure, PipelineReport, PipelineStage, VideoPipeline};

/// Version of cheerclip
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
