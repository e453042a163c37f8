//! Pipeline lifecycle states and the record of transitions

use std::fmt;
use std::time::Instant;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::error::CheerError;

/// Lifecycle of one request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Idle,
    CaptionReady,
    SpeechReady,
    OverlayRendered,
    AudioTimed,
    Composed,
    Finalized,
    Failed,
}

impl PipelineStage {
    /// The stage that follows on success
    #[must_use]
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Idle => Some(Self::CaptionReady),
            Self::CaptionReady => Some(Self::SpeechReady),
            Self::SpeechReady => Some(Self::OverlayRendered),
            Self::OverlayRendered => Some(Self::AudioTimed),
            Self::AudioTimed => Some(Self::Composed),
            Self::Composed => Some(Self::Finalized),
            Self::Finalized | Self::Failed => None,
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finalized | Self::Failed)
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::CaptionReady => "caption ready",
            Self::SpeechReady => "speech ready",
            Self::OverlayRendered => "overlay rendered",
            Self::AudioTimed => "audio timed",
            Self::Composed => "composed",
            Self::Finalized => "finalized",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// A stage the pipeline entered
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StageRecord {
    pub stage: PipelineStage,
    /// Milliseconds since the request started
    pub elapsed_ms: u64,
}

/// A request that ended in [`PipelineStage::Failed`]
#[derive(Debug, Error)]
#[error("pipeline failed before reaching {attempted} (last stage: {last_completed}): {source}")]
pub struct PipelineFailure {
    /// Last stage reached successfully
    pub last_completed: PipelineStage,
    /// Stage the pipeline was working towards
    pub attempted: PipelineStage,
    #[source]
    pub source: CheerError,
    /// Every stage entered, ending with `Failed`
    pub stages: Vec<StageRecord>,
}

/// Enforces the linear stage order and records transitions
#[derive(Debug)]
pub(crate) struct StageTracker {
    current: PipelineStage,
    started: Instant,
    stages: Vec<StageRecord>,
}

impl StageTracker {
    pub(crate) fn new() -> Self {
        let mut tracker = Self {
            current: PipelineStage::Idle,
            started: Instant::now(),
            stages: Vec::new(),
        };
        tracker.record(PipelineStage::Idle);
        tracker
    }

    fn record(&mut self, stage: PipelineStage) {
        let elapsed_ms = u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.stages.push(StageRecord { stage, elapsed_ms });
    }

    /// Move to the next stage
    pub(crate) fn advance(&mut self) -> PipelineStage {
        if let Some(next) = self.current.next() {
            info!("Pipeline: {} -> {}", self.current, next);
            self.current = next;
            self.record(next);
        }
        self.current
    }

    pub(crate) fn fail(mut self, source: CheerError) -> PipelineFailure {
        let last_completed = self.current;
        let attempted = last_completed.next().unwrap_or(last_completed);
        warn!("Pipeline failed while working towards {}: {}", attempted, source);
        self.current = PipelineStage::Failed;
        self.record(PipelineStage::Failed);
        PipelineFailure {
            last_completed,
            attempted,
            source,
            stages: self.stages,
        }
    }

    pub(crate) fn finish(self) -> Vec<StageRecord> {
        self.stages
    }
}
