use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use quill_core::{JobStatus, Outline};
use quill_engine::{
    ArchiveSettings, ChannelStoreSink, ChapterArchive, Orchestrator, OrchestratorError,
    ReqwestTransport, RunOutcome,
};
use quill_logging::{quill_info, quill_warn};
use tokio::task::JoinHandle;

use crate::cli::Command;
use crate::config::QuillConfig;
use crate::{outline, store};

pub async fn run(command: Command, config: QuillConfig) -> Result<()> {
    let outline = outline::load(command.outline())?;
    let titles = outline::titles(&outline);

    let archive_settings = ArchiveSettings {
        dir: config.output_dir.clone(),
        clock: Arc::new(|| Utc::now().to_rfc3339()),
    };
    let archive = ChapterArchive::new(archive_settings.clone());
    archive
        .ensure_dir()
        .with_context(|| format!("output directory {:?}", config.output_dir))?;

    let transport =
        ReqwestTransport::new(config.transport_settings()).context("building http client")?;
    let (sink, events) = ChannelStoreSink::channel();
    let adapter = store::spawn_adapter(events, ChapterArchive::new(archive_settings), titles);

    let orchestrator = Arc::new(Orchestrator::new(
        outline.clone(),
        Arc::new(transport),
        Arc::new(sink),
        config.pipeline_settings(),
    ));
    restore_archived(&orchestrator, &archive, &outline)?;

    let result = dispatch(&orchestrator, command).await;

    // The adapter thread exits once the last sink handle is gone.
    drop(orchestrator);
    let state = adapter
        .join()
        .map_err(|_| anyhow::anyhow!("store adapter thread panicked"))?;
    println!("{}", store::format_summary(&state.view()));
    result
}

async fn dispatch(orchestrator: &Arc<Orchestrator>, command: Command) -> Result<()> {
    match command {
        Command::Run { .. } => {
            let watcher = on_interrupt(orchestrator, |o| {
                o.pause();
            });
            let outcome = orchestrator.start().await;
            release(watcher).await;
            report_outcome(orchestrator, outcome)
        }
        Command::Retry { unit, .. } => {
            let watcher = on_interrupt(orchestrator, |o| {
                o.stop();
            });
            let result = orchestrator.retry_unit(unit).await;
            release(watcher).await;
            report_single(unit, result)
        }
        Command::Revise {
            unit, instructions, ..
        } => {
            let watcher = on_interrupt(orchestrator, |o| {
                o.stop();
            });
            let result = orchestrator.revise_unit(unit, instructions).await;
            release(watcher).await;
            report_single(unit, result)
        }
    }
}

fn restore_archived(
    orchestrator: &Orchestrator,
    archive: &ChapterArchive,
    outline: &Outline,
) -> Result<()> {
    let mut restored = 0;
    for chapter in archive.load().context("reading archived chapters")? {
        if !outline.units.iter().any(|unit| unit.number == chapter.number) {
            quill_warn!(
                "archived chapter {} is not in the outline; ignoring {:?}",
                chapter.number,
                chapter.path
            );
            continue;
        }
        orchestrator.restore_completed(chapter.number, chapter.content, chapter.tokens)?;
        restored += 1;
    }
    if restored > 0 {
        quill_info!("restored {} archived chapters", restored);
    }
    Ok(())
}

fn on_interrupt(
    orchestrator: &Arc<Orchestrator>,
    action: fn(&Orchestrator),
) -> JoinHandle<()> {
    let orchestrator = Arc::clone(orchestrator);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            quill_info!("interrupt received");
            action(&orchestrator);
        }
    })
}

// Drops the watcher's orchestrator handle before the adapter is joined.
async fn release(watcher: JoinHandle<()>) {
    watcher.abort();
    let _ = watcher.await;
}

fn report_outcome(orchestrator: &Orchestrator, outcome: RunOutcome) -> Result<()> {
    match outcome {
        RunOutcome::Exhausted => {
            println!("all chapters generated");
            Ok(())
        }
        RunOutcome::NothingToDo => {
            println!("nothing to do: every chapter is already archived");
            Ok(())
        }
        RunOutcome::Paused { unit_number } => {
            match unit_number {
                Some(n) => println!("paused during chapter {n}; run again to continue"),
                None => println!("paused; run again to continue"),
            }
            Ok(())
        }
        RunOutcome::Stopped => {
            println!("stopped");
            Ok(())
        }
        RunOutcome::AlreadyRunning => bail!("a run is already in progress"),
        RunOutcome::Halted { unit_number } => {
            let detail = orchestrator
                .snapshot(unit_number)
                .and_then(|snapshot| snapshot.error_detail)
                .unwrap_or_else(|| "unknown error".to_string());
            bail!("chapter {unit_number} failed: {detail}")
        }
    }
}

fn report_single(
    unit: u32,
    result: Result<quill_core::JobSnapshot, OrchestratorError>,
) -> Result<()> {
    let snapshot = result?;
    match snapshot.status {
        JobStatus::Completed => {
            println!("chapter {unit} regenerated ({} tokens)", snapshot.tokens);
            Ok(())
        }
        JobStatus::Cancelled => {
            println!("chapter {unit} cancelled; previous text kept");
            Ok(())
        }
        _ => bail!(
            "chapter {unit} failed: {}",
            snapshot.error_detail.unwrap_or_default()
        ),
    }
}
