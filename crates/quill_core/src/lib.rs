//! Quill core: synchronous stream decoding, job state machine and store fold.
mod accumulator;
mod event;
mod frame;
mod job;
mod payload;
mod run;
mod store;
mod telemetry;
mod unit;

pub use accumulator::ContentAccumulator;
pub use event::PipelineEvent;
pub use frame::{Frame, FrameDecoder, DEFAULT_EVENT};
pub use job::{Applied, GenerationJob, JobError, JobSnapshot, JobStatus, STREAM_ENDED_MESSAGE};
pub use payload::{interpret, Payload};
pub use run::{PipelineRun, RunMode};
pub use store::{update, StoreEffect, StoreState, StoreView, UnitRowView};
pub use telemetry::{TelemetryEstimator, TelemetrySettings, STREAMING_PROGRESS_CAP};
pub use unit::{ContextEntry, Outline, OutlineError, Unit};
