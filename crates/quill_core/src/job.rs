use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::accumulator::ContentAccumulator;
use crate::payload::Payload;
use crate::telemetry::{TelemetryEstimator, TelemetrySettings};

/// Failure recorded when a stream closes without a completion signal.
pub const STREAM_ENDED_MESSAGE: &str = "stream ended unexpectedly";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Whether a queue pass should dispatch a unit in this state.
    pub fn is_eligible(self) -> bool {
        matches!(self, Self::Pending | Self::Failed | Self::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum JobError {
    #[error("unit {unit} already has an attempt running")]
    AlreadyRunning { unit: u32 },
}

/// Result of feeding one event into a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// Nothing observable changed.
    Ignored,
    /// Content or telemetry changed; status is still `Running`.
    Updated,
    /// The attempt settled into the given terminal status.
    Finished(JobStatus),
}

impl Applied {
    pub fn changed(self) -> bool {
        !matches!(self, Applied::Ignored)
    }
}

/// Record pushed to the store on every transition and content delta.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub unit_number: u32,
    pub attempt: u32,
    pub status: JobStatus,
    pub content: String,
    pub progress: f64,
    pub tokens: u64,
    pub estimated_cost_usd: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
}

/// Lifecycle of generating one unit: `pending -> running -> completed | failed | cancelled`.
///
/// A new attempt may start from any non-running state. Content from the
/// previous attempt stays visible until the new attempt produces output.
#[derive(Debug, Clone)]
pub struct GenerationJob {
    unit_number: u32,
    attempt: u32,
    status: JobStatus,
    content: ContentAccumulator,
    telemetry: TelemetryEstimator,
    error_detail: Option<String>,
    stage: Option<String>,
    duration_seconds: Option<f64>,
    cache_hit: bool,
    awaiting_output: bool,
}

impl GenerationJob {
    pub fn new(unit_number: u32, settings: TelemetrySettings) -> Self {
        Self {
            unit_number,
            attempt: 0,
            status: JobStatus::Pending,
            content: ContentAccumulator::new(),
            telemetry: TelemetryEstimator::new(settings),
            error_detail: None,
            stage: None,
            duration_seconds: None,
            cache_hit: false,
            awaiting_output: false,
        }
    }

    /// A job whose content was produced earlier (for example loaded from an archive).
    pub fn restored(
        unit_number: u32,
        content: impl Into<String>,
        tokens: u64,
        settings: TelemetrySettings,
    ) -> Self {
        let mut job = Self::new(unit_number, settings);
        job.content = ContentAccumulator::with_content(content);
        job.telemetry.on_complete(Some(tokens));
        job.status = JobStatus::Completed;
        job
    }

    pub fn start_attempt(&mut self) -> Result<(), JobError> {
        if self.status == JobStatus::Running {
            return Err(JobError::AlreadyRunning {
                unit: self.unit_number,
            });
        }
        self.attempt += 1;
        self.status = JobStatus::Running;
        self.telemetry.reset();
        self.error_detail = None;
        self.stage = None;
        self.duration_seconds = None;
        self.cache_hit = false;
        self.awaiting_output = true;
        Ok(())
    }

    pub fn apply(&mut self, payload: Payload) -> Applied {
        if self.status != JobStatus::Running {
            return Applied::Ignored;
        }
        match payload {
            Payload::ContentToken(text) => {
                self.begin_output();
                self.content.append(&text);
                self.telemetry.on_token();
                Applied::Updated
            }
            Payload::Checkpoint {
                progress,
                stage,
                tokens,
            } => {
                self.telemetry.on_checkpoint(progress, tokens);
                if stage.is_some() {
                    self.stage = stage;
                }
                Applied::Updated
            }
            Payload::CacheHit { content } => {
                self.awaiting_output = false;
                self.content.replace(content);
                self.cache_hit = true;
                Applied::Updated
            }
            Payload::Complete {
                tokens,
                duration_seconds,
            } => {
                self.begin_output();
                self.telemetry.on_complete(tokens);
                self.duration_seconds = duration_seconds;
                self.status = JobStatus::Completed;
                Applied::Finished(JobStatus::Completed)
            }
            Payload::Error { message } => self.fail(message),
            Payload::Opaque { .. } => Applied::Ignored,
        }
    }

    /// The stream closed. Only a prior cache hit makes that a success.
    pub fn finish_stream(&mut self) -> Applied {
        if self.status != JobStatus::Running {
            return Applied::Ignored;
        }
        if self.cache_hit {
            self.telemetry.on_complete(None);
            self.status = JobStatus::Completed;
            Applied::Finished(JobStatus::Completed)
        } else {
            self.fail(STREAM_ENDED_MESSAGE)
        }
    }

    pub fn fail(&mut self, message: impl Into<String>) -> Applied {
        if self.status != JobStatus::Running {
            return Applied::Ignored;
        }
        self.status = JobStatus::Failed;
        self.error_detail = Some(message.into());
        Applied::Finished(JobStatus::Failed)
    }

    /// Idempotent: only a running attempt can be cancelled.
    pub fn cancel(&mut self) -> Applied {
        if self.status != JobStatus::Running {
            return Applied::Ignored;
        }
        self.status = JobStatus::Cancelled;
        Applied::Finished(JobStatus::Cancelled)
    }

    pub fn unit_number(&self) -> u32 {
        self.unit_number
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn content(&self) -> &str {
        self.content.snapshot()
    }

    pub fn progress(&self) -> f64 {
        self.telemetry.progress()
    }

    pub fn tokens(&self) -> u64 {
        self.telemetry.tokens()
    }

    pub fn estimated_cost_usd(&self) -> f64 {
        self.telemetry.estimated_cost_usd()
    }

    pub fn error_detail(&self) -> Option<&str> {
        self.error_detail.as_deref()
    }

    pub fn stage(&self) -> Option<&str> {
        self.stage.as_deref()
    }

    pub fn duration_seconds(&self) -> Option<f64> {
        self.duration_seconds
    }

    pub fn telemetry_settings(&self) -> TelemetrySettings {
        self.telemetry.settings()
    }

    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            unit_number: self.unit_number,
            attempt: self.attempt,
            status: self.status,
            content: self.content.snapshot().to_string(),
            progress: self.telemetry.progress(),
            tokens: self.telemetry.tokens(),
            estimated_cost_usd: self.telemetry.estimated_cost_usd(),
            error_detail: self.error_detail.clone(),
            stage: self.stage.clone(),
        }
    }

    // First output of an attempt discards what the previous attempt left behind.
    fn begin_output(&mut self) {
        if self.awaiting_output {
            self.content.clear();
            self.awaiting_output = false;
        }
    }
}
