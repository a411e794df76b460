use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::job::{GenerationJob, JobStatus};
use crate::telemetry::TelemetrySettings;
use crate::unit::{ContextEntry, Outline, Unit};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    #[default]
    Idle,
    Running,
    Paused,
    Stopped,
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RunMode::Idle => "idle",
            RunMode::Running => "running",
            RunMode::Paused => "paused",
            RunMode::Stopped => "stopped",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone)]
struct UnitSlot {
    unit: Unit,
    /// `None` while the job is checked out to an in-flight attempt.
    job: Option<GenerationJob>,
}

/// Ordered working set of units plus run mode and the active unit.
///
/// The job of the active unit is checked out while its stream is read, so
/// nothing else can observe or mutate it mid-attempt.
#[derive(Debug, Clone)]
pub struct PipelineRun {
    slots: BTreeMap<u32, UnitSlot>,
    active: Option<u32>,
    mode: RunMode,
}

impl PipelineRun {
    pub fn new(outline: Outline, settings: TelemetrySettings) -> Self {
        let slots = outline
            .units
            .into_iter()
            .map(|unit| {
                let job = GenerationJob::new(unit.number, settings);
                (
                    unit.number,
                    UnitSlot {
                        unit,
                        job: Some(job),
                    },
                )
            })
            .collect();
        Self {
            slots,
            active: None,
            mode: RunMode::Idle,
        }
    }

    pub fn mode(&self) -> RunMode {
        self.mode
    }

    /// Returns `true` when the mode actually changed.
    pub fn set_mode(&mut self, mode: RunMode) -> bool {
        let changed = self.mode != mode;
        self.mode = mode;
        changed
    }

    pub fn active(&self) -> Option<u32> {
        self.active
    }

    pub fn contains(&self, number: u32) -> bool {
        self.slots.contains_key(&number)
    }

    pub fn unit(&self, number: u32) -> Option<&Unit> {
        self.slots.get(&number).map(|slot| &slot.unit)
    }

    pub fn job(&self, number: u32) -> Option<&GenerationJob> {
        self.slots.get(&number).and_then(|slot| slot.job.as_ref())
    }

    pub fn status(&self, number: u32) -> Option<JobStatus> {
        let slot = self.slots.get(&number)?;
        Some(
            slot.job
                .as_ref()
                .map_or(JobStatus::Running, GenerationJob::status),
        )
    }

    /// Units a queue pass would dispatch, ascending by number.
    pub fn eligible_queue(&self) -> Vec<u32> {
        self.slots
            .iter()
            .filter(|(_, slot)| {
                slot.job
                    .as_ref()
                    .is_some_and(|job| job.status().is_eligible())
            })
            .map(|(number, _)| *number)
            .collect()
    }

    /// Take the job out for an attempt. Fails if another unit is active.
    pub fn checkout(&mut self, number: u32) -> Option<GenerationJob> {
        if self.active.is_some() {
            return None;
        }
        let job = self.slots.get_mut(&number)?.job.take()?;
        self.active = Some(number);
        Some(job)
    }

    pub fn checkin(&mut self, job: GenerationJob) {
        let number = job.unit_number();
        if let Some(slot) = self.slots.get_mut(&number) {
            slot.job = Some(job);
        }
        if self.active == Some(number) {
            self.active = None;
        }
    }

    /// Mark a unit as completed with content produced elsewhere.
    ///
    /// Returns `false` for unknown units and for the active unit.
    pub fn restore_completed(&mut self, number: u32, content: impl Into<String>, tokens: u64) -> bool {
        let Some(slot) = self.slots.get_mut(&number) else {
            return false;
        };
        let Some(job) = slot.job.as_mut() else {
            return false;
        };
        let settings = job.telemetry_settings();
        *job = GenerationJob::restored(number, content, tokens, settings);
        true
    }

    /// Completed units before `number`, ascending, at most `window` of them.
    pub fn prior_context(&self, number: u32, window: usize) -> Vec<ContextEntry> {
        if window == 0 {
            return Vec::new();
        }
        let mut entries: Vec<ContextEntry> = self
            .slots
            .range(..number)
            .rev()
            .filter_map(|(n, slot)| {
                let job = slot.job.as_ref()?;
                (job.status() == JobStatus::Completed).then(|| ContextEntry {
                    number: *n,
                    title: slot.unit.title.clone(),
                    content: job.content().to_string(),
                })
            })
            .take(window)
            .collect();
        entries.reverse();
        entries
    }

    pub fn is_complete(&self) -> bool {
        self.slots
            .values()
            .all(|slot| matches!(slot.job.as_ref(), Some(job) if job.status() == JobStatus::Completed))
    }
}
