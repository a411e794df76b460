use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use quill_core::{
    GenerationJob, JobSnapshot, JobStatus, Outline, PipelineEvent, PipelineRun, RunMode,
    TelemetrySettings,
};
use quill_logging::{quill_debug, quill_info, quill_warn};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::attempt::run_attempt;
use crate::sink::StoreSink;
use crate::transport::GenerationTransport;
use crate::{GenerationRequest, RequestMode};

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub telemetry: TelemetrySettings,
    /// How many completed earlier units travel with each request. 0 sends none.
    pub context_window: usize,
    pub style: Option<String>,
    pub model: Option<String>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            telemetry: TelemetrySettings::default(),
            context_window: 3,
            style: None,
            model: None,
        }
    }
}

/// Why a `start()`/`resume()` call returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Another pass is already dispatching units.
    AlreadyRunning,
    /// Every unit is already completed.
    NothingToDo,
    /// The queue emptied; every unit is completed.
    Exhausted,
    /// A unit failed; it is eligible again on the next pass.
    Halted { unit_number: u32 },
    /// `pause()` was requested. `unit_number` is the job it cancelled, if any.
    Paused { unit_number: Option<u32> },
    /// `stop()` was requested.
    Stopped,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OrchestratorError {
    #[error("unit {0} is not part of this run")]
    UnknownUnit(u32),
    #[error("another generation is in progress")]
    Busy,
}

struct Shared {
    run: PipelineRun,
    cancel: Option<CancellationToken>,
}

/// Runs generation jobs one at a time over an ordered set of units.
///
/// Control calls (`pause`, `stop`) may arrive from any task while `start`
/// is awaiting a stream. The shared state lock is never held across an
/// await; the worker gate serializes dispatch.
pub struct Orchestrator {
    transport: Arc<dyn GenerationTransport>,
    sink: Arc<dyn StoreSink>,
    settings: PipelineSettings,
    shared: Mutex<Shared>,
    worker: tokio::sync::Mutex<()>,
}

impl Orchestrator {
    pub fn new(
        outline: Outline,
        transport: Arc<dyn GenerationTransport>,
        sink: Arc<dyn StoreSink>,
        settings: PipelineSettings,
    ) -> Self {
        let run = PipelineRun::new(outline, settings.telemetry);
        Self {
            transport,
            sink,
            settings,
            shared: Mutex::new(Shared { run, cancel: None }),
            worker: tokio::sync::Mutex::new(()),
        }
    }

    /// Dispatch eligible units in ascending order until the queue empties,
    /// a unit fails, or the run is paused or stopped.
    pub async fn start(&self) -> RunOutcome {
        if self.lock().run.mode() == RunMode::Running {
            return RunOutcome::AlreadyRunning;
        }
        // Waits for a pass that is still settling after pause/stop.
        let _worker = self.worker.lock().await;
        {
            let mut shared = self.lock();
            if shared.run.mode() == RunMode::Running {
                return RunOutcome::AlreadyRunning;
            }
            if shared.run.eligible_queue().is_empty() {
                quill_info!("nothing to generate: every unit is completed");
                self.set_mode(&mut shared, RunMode::Idle);
                self.sink.publish(PipelineEvent::NothingToDo);
                return RunOutcome::NothingToDo;
            }
            self.set_mode(&mut shared, RunMode::Running);
        }

        loop {
            let (mut lease, request) = {
                let mut shared = self.lock();
                match shared.run.mode() {
                    RunMode::Running => {}
                    RunMode::Paused => return RunOutcome::Paused { unit_number: None },
                    RunMode::Stopped => return RunOutcome::Stopped,
                    RunMode::Idle => return RunOutcome::Exhausted,
                }
                let Some(next) = shared.run.eligible_queue().first().copied() else {
                    quill_info!("queue exhausted");
                    self.set_mode(&mut shared, RunMode::Idle);
                    return RunOutcome::Exhausted;
                };
                match self.checkout(&mut shared, next, RequestMode::Generate, None) {
                    Some(dispatch) => dispatch,
                    None => {
                        self.set_mode(&mut shared, RunMode::Idle);
                        return RunOutcome::Halted { unit_number: next };
                    }
                }
            };

            let unit_number = lease.job.unit_number();
            let status = run_attempt(
                self.transport.as_ref(),
                &mut lease.job,
                &request,
                &lease.cancel,
                self.sink.as_ref(),
            )
            .await;
            drop(lease);

            let outcome = {
                let mut shared = self.lock();
                match status {
                    JobStatus::Completed => None,
                    JobStatus::Cancelled => Some(match shared.run.mode() {
                        RunMode::Paused => RunOutcome::Paused {
                            unit_number: Some(unit_number),
                        },
                        _ => {
                            self.set_mode(&mut shared, RunMode::Stopped);
                            RunOutcome::Stopped
                        }
                    }),
                    JobStatus::Failed | JobStatus::Pending | JobStatus::Running => {
                        quill_info!("run halted at unit {}", unit_number);
                        self.set_mode(&mut shared, RunMode::Idle);
                        Some(RunOutcome::Halted { unit_number })
                    }
                }
            };
            if let Some(outcome) = outcome {
                return outcome;
            }
        }
    }

    /// Same as `start()`: the eligible queue is recomputed from current state.
    pub async fn resume(&self) -> RunOutcome {
        self.start().await
    }

    /// Cancel the current job and keep the rest of the queue for `resume()`.
    ///
    /// Returns `false` when no pass is running. A `retry_unit` or
    /// `revise_unit` in flight is not a pass: `pause()` leaves it running,
    /// only `stop()` cancels it.
    pub fn pause(&self) -> bool {
        let mut shared = self.lock();
        if shared.run.mode() != RunMode::Running {
            return false;
        }
        self.set_mode(&mut shared, RunMode::Paused);
        if let Some(cancel) = &shared.cancel {
            cancel.cancel();
        }
        true
    }

    /// Cancel the current job (queue pass, retry or revision) and stop.
    ///
    /// Returns `false` when there was nothing to stop.
    pub fn stop(&self) -> bool {
        let mut shared = self.lock();
        let had_job = match &shared.cancel {
            Some(cancel) => {
                cancel.cancel();
                true
            }
            None => false,
        };
        let changed = self.set_mode(&mut shared, RunMode::Stopped);
        had_job || changed
    }

    /// Regenerate one unit outside the queue. Only allowed while idle.
    pub async fn retry_unit(&self, unit_number: u32) -> Result<JobSnapshot, OrchestratorError> {
        self.dispatch_single(unit_number, RequestMode::Generate, None)
            .await
    }

    /// Regenerate one unit with revision instructions; replaces its content.
    pub async fn revise_unit(
        &self,
        unit_number: u32,
        instructions: impl Into<String>,
    ) -> Result<JobSnapshot, OrchestratorError> {
        self.dispatch_single(unit_number, RequestMode::Revise, Some(instructions.into()))
            .await
    }

    /// Mark a unit completed with content produced earlier (for example an archive).
    pub fn restore_completed(
        &self,
        unit_number: u32,
        content: impl Into<String>,
        tokens: u64,
    ) -> Result<(), OrchestratorError> {
        let mut shared = self.lock();
        if !shared.run.contains(unit_number) {
            return Err(OrchestratorError::UnknownUnit(unit_number));
        }
        if shared.run.restore_completed(unit_number, content, tokens) {
            Ok(())
        } else {
            Err(OrchestratorError::Busy)
        }
    }

    pub fn mode(&self) -> RunMode {
        self.lock().run.mode()
    }

    pub fn active_unit(&self) -> Option<u32> {
        self.lock().run.active()
    }

    pub fn eligible_units(&self) -> Vec<u32> {
        self.lock().run.eligible_queue()
    }

    /// Latest state of a unit; `None` for unknown units and the active one.
    pub fn snapshot(&self, unit_number: u32) -> Option<JobSnapshot> {
        self.lock().run.job(unit_number).map(GenerationJob::snapshot)
    }

    async fn dispatch_single(
        &self,
        unit_number: u32,
        mode: RequestMode,
        instructions: Option<String>,
    ) -> Result<JobSnapshot, OrchestratorError> {
        let _worker = self
            .worker
            .try_lock()
            .map_err(|_| OrchestratorError::Busy)?;

        let (mut lease, request) = {
            let mut shared = self.lock();
            if !shared.run.contains(unit_number) {
                return Err(OrchestratorError::UnknownUnit(unit_number));
            }
            self.checkout(&mut shared, unit_number, mode, instructions)
                .ok_or(OrchestratorError::Busy)?
        };

        run_attempt(
            self.transport.as_ref(),
            &mut lease.job,
            &request,
            &lease.cancel,
            self.sink.as_ref(),
        )
        .await;

        let snapshot = lease.job.snapshot();
        drop(lease);
        Ok(snapshot)
    }

    fn checkout(
        &self,
        shared: &mut Shared,
        unit_number: u32,
        mode: RequestMode,
        instructions: Option<String>,
    ) -> Option<(Lease<'_>, GenerationRequest)> {
        let prior_context = shared
            .run
            .prior_context(unit_number, self.settings.context_window);
        let unit = shared.run.unit(unit_number)?.clone();
        let job = shared.run.checkout(unit_number)?;

        let current_content = match mode {
            RequestMode::Revise if !job.content().is_empty() => Some(job.content().to_string()),
            _ => None,
        };
        let request = GenerationRequest {
            mode,
            unit_number,
            title: unit.title,
            notes: unit.notes,
            prior_context,
            instructions,
            current_content,
            style: self.settings.style.clone(),
            model: self.settings.model.clone(),
        };

        let cancel = CancellationToken::new();
        shared.cancel = Some(cancel.clone());
        quill_debug!(
            "checked out unit {} with {} context units",
            unit_number,
            request.prior_context.len()
        );
        Some((
            Lease {
                owner: self,
                job,
                cancel,
            },
            request,
        ))
    }

    fn set_mode(&self, shared: &mut Shared, mode: RunMode) -> bool {
        let changed = shared.run.set_mode(mode);
        if changed {
            quill_info!("run mode -> {}", mode);
            self.sink.publish(PipelineEvent::RunModeChanged { mode });
        }
        changed
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A job checked out for one attempt.
///
/// Dropping the lease puts the job back into the run. If the attempt never
/// settled because the caller dropped the `start()`/`retry_unit()` future,
/// the attempt is cancelled first and a running pass falls back to idle.
struct Lease<'a> {
    owner: &'a Orchestrator,
    job: GenerationJob,
    cancel: CancellationToken,
}

impl Drop for Lease<'_> {
    fn drop(&mut self) {
        let placeholder =
            GenerationJob::new(self.job.unit_number(), self.job.telemetry_settings());
        let mut job = std::mem::replace(&mut self.job, placeholder);
        let mut shared = self.owner.lock();
        if job.status() == JobStatus::Running {
            self.cancel.cancel();
            job.cancel();
            quill_warn!(
                "unit {} attempt {} abandoned by its caller",
                job.unit_number(),
                job.attempt()
            );
            self.owner
                .sink
                .publish(PipelineEvent::JobUpdated(job.snapshot()));
            if shared.run.mode() == RunMode::Running {
                self.owner.set_mode(&mut shared, RunMode::Idle);
            }
        }
        shared.run.checkin(job);
        shared.cancel = None;
    }
}
