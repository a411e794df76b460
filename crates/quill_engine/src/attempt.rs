use futures_util::StreamExt;
use quill_core::{interpret, Applied, Frame, FrameDecoder, GenerationJob, JobStatus, PipelineEvent};
use quill_logging::{quill_debug, quill_info, quill_warn};
use tokio_util::sync::CancellationToken;

use crate::sink::StoreSink;
use crate::transport::GenerationTransport;
use crate::GenerationRequest;

/// Drive one attempt of `job` from dispatch to a terminal status.
///
/// Every transition and every chunk that changed the job is published to
/// `sink`. Cancellation wins over any chunk that arrives at the same time.
pub async fn run_attempt(
    transport: &dyn GenerationTransport,
    job: &mut GenerationJob,
    request: &GenerationRequest,
    cancel: &CancellationToken,
    sink: &dyn StoreSink,
) -> JobStatus {
    if let Err(err) = job.start_attempt() {
        quill_warn!("dispatch refused: {}", err);
        return job.status();
    }
    quill_info!(
        "unit {} attempt {} dispatched ({:?})",
        job.unit_number(),
        job.attempt(),
        request.mode
    );
    publish(sink, job);

    let opened = tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        result = transport.open(request, cancel) => Some(result),
    };
    let mut stream = match opened {
        None => return settle_cancelled(job, sink),
        Some(Err(_)) if cancel.is_cancelled() => return settle_cancelled(job, sink),
        Some(Err(err)) => return settle_failed(job, sink, err.to_string()),
        Some(Ok(stream)) => stream,
    };

    let mut decoder = FrameDecoder::new();
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return settle_cancelled(job, sink),
            next = stream.next() => next,
        };
        match next {
            Some(Ok(chunk)) => {
                let frames = decoder.push(&chunk);
                if apply_frames(job, frames, sink) {
                    return job.status();
                }
            }
            Some(Err(_)) if cancel.is_cancelled() => return settle_cancelled(job, sink),
            Some(Err(err)) => return settle_failed(job, sink, err.to_string()),
            None if cancel.is_cancelled() => return settle_cancelled(job, sink),
            None => {
                let frames = decoder.finish();
                if apply_frames(job, frames, sink) {
                    return job.status();
                }
                if job.finish_stream().changed() {
                    log_settled(job);
                    publish(sink, job);
                }
                return job.status();
            }
        }
    }
}

/// Returns `true` once the job has settled.
fn apply_frames(job: &mut GenerationJob, frames: Vec<Frame>, sink: &dyn StoreSink) -> bool {
    let mut changed = false;
    for frame in frames {
        match job.apply(interpret(&frame)) {
            Applied::Ignored => {}
            Applied::Updated => changed = true,
            Applied::Finished(_) => {
                log_settled(job);
                publish(sink, job);
                return true;
            }
        }
    }
    if changed {
        publish(sink, job);
    }
    false
}

fn settle_cancelled(job: &mut GenerationJob, sink: &dyn StoreSink) -> JobStatus {
    if job.cancel().changed() {
        log_settled(job);
        publish(sink, job);
    }
    job.status()
}

fn settle_failed(job: &mut GenerationJob, sink: &dyn StoreSink, message: String) -> JobStatus {
    if job.fail(message).changed() {
        log_settled(job);
        publish(sink, job);
    }
    job.status()
}

fn log_settled(job: &GenerationJob) {
    match job.status() {
        JobStatus::Failed => quill_warn!(
            "unit {} attempt {} failed: {}",
            job.unit_number(),
            job.attempt(),
            job.error_detail().unwrap_or_default()
        ),
        status => quill_debug!(
            "unit {} attempt {} {} ({} tokens, {} bytes)",
            job.unit_number(),
            job.attempt(),
            status,
            job.tokens(),
            job.content().len()
        ),
    }
}

fn publish(sink: &dyn StoreSink, job: &GenerationJob) {
    sink.publish(PipelineEvent::JobUpdated(job.snapshot()));
}
