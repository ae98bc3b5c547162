//! Pipeline run records.
//!
//! A `PipelineRun` is owned by the worker executing it and persisted into
//! `Video.metadata` at stage boundaries and on completion.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of one pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    /// Stage never started because an earlier stage failed
    Skipped,
}

impl StageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageStatus::Pending => "pending",
            StageStatus::Running => "running",
            StageStatus::Completed => "completed",
            StageStatus::Failed => "failed",
            StageStatus::Skipped => "skipped",
        }
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One entry of a pipeline run's stage history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StageRecord {
    /// Stage name (e.g. "subtitles")
    pub name: String,
    /// Outcome of the stage
    pub status: StageStatus,
    /// Intra-stage progress at last observation (0-100)
    #[serde(default)]
    pub progress: u8,
}

impl StageRecord {
    pub fn pending(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: StageStatus::Pending,
            progress: 0,
        }
    }
}

/// In-memory state of one pipeline execution.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PipelineRun {
    /// Ordered stage records, one per configured stage
    pub stages: Vec<StageRecord>,
    /// Index of the stage currently executing
    pub current_stage_index: usize,
}

impl PipelineRun {
    /// Initialize a run for an ordered stage list.
    pub fn new(stage_names: &[&str]) -> Self {
        Self {
            stages: stage_names.iter().map(|n| StageRecord::pending(*n)).collect(),
            current_stage_index: 0,
        }
    }

    /// Overall progress across stages with equal weighting.
    ///
    /// `intra` is the running stage's own 0-100 progress.
    pub fn overall_progress(&self, intra: u8) -> u8 {
        if self.stages.is_empty() {
            return 100;
        }
        let total = self.stages.len() as u32;
        let done = self.current_stage_index.min(self.stages.len()) as u32;
        let intra = intra.min(100) as u32;
        ((done * 100 + intra) / total).min(100) as u8
    }

    /// Mark the current stage as running.
    pub fn start_stage(&mut self) {
        if let Some(stage) = self.stages.get_mut(self.current_stage_index) {
            stage.status = StageStatus::Running;
        }
    }

    /// Record intra-stage progress for the current stage.
    pub fn stage_progress(&mut self, progress: u8) {
        if let Some(stage) = self.stages.get_mut(self.current_stage_index) {
            stage.progress = progress.min(100);
        }
    }

    /// Complete the current stage and advance.
    pub fn complete_stage(&mut self) {
        if let Some(stage) = self.stages.get_mut(self.current_stage_index) {
            stage.status = StageStatus::Completed;
            stage.progress = 100;
        }
        self.current_stage_index += 1;
    }

    /// Fail the current stage and mark the rest skipped.
    pub fn fail_stage(&mut self) {
        let failed = self.current_stage_index;
        for (i, stage) in self.stages.iter_mut().enumerate() {
            if i == failed {
                stage.status = StageStatus::Failed;
            } else if i > failed {
                stage.status = StageStatus::Skipped;
            }
        }
    }

    /// Name of the stage currently executing, if any.
    pub fn current_stage_name(&self) -> Option<&str> {
        self.stages
            .get(self.current_stage_index)
            .map(|s| s.name.as_str())
    }
}
