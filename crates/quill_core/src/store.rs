use std::collections::BTreeMap;

use crate::event::PipelineEvent;
use crate::job::{JobSnapshot, JobStatus};
use crate::run::RunMode;

/// Side effects requested by the store fold.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEffect {
    /// A unit reached `completed`; persist its content.
    Archive(JobSnapshot),
}

/// Latest known record per unit, as seen by presenters.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StoreState {
    mode: RunMode,
    records: BTreeMap<u32, JobSnapshot>,
    nothing_to_do: bool,
    dirty: bool,
}

impl StoreState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, unit_number: u32) -> Option<&JobSnapshot> {
        self.records.get(&unit_number)
    }

    pub fn mode(&self) -> RunMode {
        self.mode
    }

    /// Returns whether anything changed since the last call, and clears the flag.
    pub fn consume_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    pub fn view(&self) -> StoreView {
        let units: Vec<UnitRowView> = self
            .records
            .values()
            .map(|record| UnitRowView {
                unit_number: record.unit_number,
                status: record.status,
                percent: (record.progress * 100.0).round() as u8,
                tokens: record.tokens,
                words: record.content.split_whitespace().count(),
                estimated_cost_usd: record.estimated_cost_usd,
                error_detail: record.error_detail.clone(),
            })
            .collect();
        StoreView {
            mode: self.mode,
            completed: units
                .iter()
                .filter(|row| row.status == JobStatus::Completed)
                .count(),
            total_tokens: units.iter().map(|row| row.tokens).sum(),
            total_estimated_cost_usd: units.iter().map(|row| row.estimated_cost_usd).sum(),
            nothing_to_do: self.nothing_to_do,
            units,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct StoreView {
    pub mode: RunMode,
    pub units: Vec<UnitRowView>,
    pub completed: usize,
    pub total_tokens: u64,
    /// Advisory only; real billing comes from the backend account.
    pub total_estimated_cost_usd: f64,
    pub nothing_to_do: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnitRowView {
    pub unit_number: u32,
    pub status: JobStatus,
    pub percent: u8,
    pub tokens: u64,
    pub words: usize,
    pub estimated_cost_usd: f64,
    pub error_detail: Option<String>,
}

/// Pure fold: applies one pipeline event to the store and returns any effects.
///
/// Records are replaced wholesale (last write wins). Snapshots from an older
/// attempt than the stored one are dropped, and re-applying an identical
/// snapshot produces no effect.
pub fn update(mut state: StoreState, event: PipelineEvent) -> (StoreState, Vec<StoreEffect>) {
    let effects = match event {
        PipelineEvent::RunModeChanged { mode } => {
            if state.mode != mode {
                state.mode = mode;
                state.dirty = true;
            }
            if mode == RunMode::Running {
                state.nothing_to_do = false;
            }
            Vec::new()
        }
        PipelineEvent::NothingToDo => {
            state.nothing_to_do = true;
            state.dirty = true;
            Vec::new()
        }
        PipelineEvent::JobUpdated(snapshot) => apply_snapshot(&mut state, snapshot),
    };

    (state, effects)
}

fn apply_snapshot(state: &mut StoreState, snapshot: JobSnapshot) -> Vec<StoreEffect> {
    let previous = state.records.get(&snapshot.unit_number);
    if let Some(previous) = previous {
        if snapshot.attempt < previous.attempt || *previous == snapshot {
            return Vec::new();
        }
    }

    let newly_completed = snapshot.status == JobStatus::Completed
        && previous.map_or(true, |prev| {
            prev.status != JobStatus::Completed || prev.attempt != snapshot.attempt
        });

    let effects = if newly_completed {
        vec![StoreEffect::Archive(snapshot.clone())]
    } else {
        Vec::new()
    };
    state.records.insert(snapshot.unit_number, snapshot);
    state.dirty = true;
    effects
}
