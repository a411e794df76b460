use std::collections::BTreeMap;
use std::sync::mpsc;
use std::thread::{self, JoinHandle};

use quill_core::{update, JobStatus, PipelineEvent, StoreEffect, StoreState, StoreView, UnitRowView};
use quill_engine::ChapterArchive;
use quill_logging::{quill_error, quill_info};

/// Folds pipeline events into the store on its own thread, archives
/// completed chapters and prints progress. Returns the final state once
/// every sender is gone.
pub fn spawn_adapter(
    events: mpsc::Receiver<PipelineEvent>,
    archive: ChapterArchive,
    titles: BTreeMap<u32, String>,
) -> JoinHandle<StoreState> {
    thread::spawn(move || {
        let mut state = StoreState::new();
        let mut printed: BTreeMap<u32, (JobStatus, u8)> = BTreeMap::new();
        for event in events {
            let (next, effects) = update(state, event);
            state = next;
            for effect in effects {
                run_effect(&archive, &titles, effect);
            }
            if state.consume_dirty() {
                print_changes(&state.view(), &mut printed);
            }
        }
        state
    })
}

fn run_effect(archive: &ChapterArchive, titles: &BTreeMap<u32, String>, effect: StoreEffect) {
    match effect {
        StoreEffect::Archive(snapshot) => {
            let title = titles
                .get(&snapshot.unit_number)
                .map(String::as_str)
                .unwrap_or_default();
            match archive.save(title, &snapshot) {
                Ok(path) => quill_info!("chapter {} saved to {:?}", snapshot.unit_number, path),
                Err(err) => quill_error!(
                    "failed to archive chapter {}: {}",
                    snapshot.unit_number,
                    err
                ),
            }
        }
    }
}

// One line per unit whenever its status or whole percent changes.
fn print_changes(view: &StoreView, printed: &mut BTreeMap<u32, (JobStatus, u8)>) {
    for row in &view.units {
        let key = (row.status, row.percent);
        if printed.get(&row.unit_number) == Some(&key) {
            continue;
        }
        printed.insert(row.unit_number, key);
        println!("{}", format_row(row));
    }
}

pub fn format_row(row: &UnitRowView) -> String {
    let mut line = format!(
        "chapter {:>3}  {:<9} {:>3}%  {:>6} tokens  {:>6} words  ~${:.4}",
        row.unit_number,
        row.status.as_str(),
        row.percent,
        row.tokens,
        row.words,
        row.estimated_cost_usd
    );
    if let Some(detail) = &row.error_detail {
        line.push_str("  ");
        line.push_str(detail);
    }
    line
}

pub fn format_summary(view: &StoreView) -> String {
    format!(
        "{} of {} chapters completed this session, {} tokens, estimated ~${:.4} (advisory)",
        view.completed,
        view.units.len(),
        view.total_tokens,
        view.total_estimated_cost_usd
    )
}
