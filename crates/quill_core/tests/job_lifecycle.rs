use quill_core::{
    Applied, GenerationJob, JobError, JobStatus, Payload, TelemetrySettings, STREAMING_PROGRESS_CAP,
    STREAM_ENDED_MESSAGE,
};

fn settings() -> TelemetrySettings {
    TelemetrySettings {
        expected_token_budget: 4,
        per_token_rate_usd: 0.01,
    }
}

fn running_job() -> GenerationJob {
    let mut job = GenerationJob::new(1, settings());
    job.start_attempt().expect("fresh job starts");
    job
}

fn token(text: &str) -> Payload {
    Payload::ContentToken(text.to_string())
}

#[test]
fn tokens_accumulate_until_complete() {
    let mut job = running_job();
    assert_eq!(job.status(), JobStatus::Running);
    assert_eq!(job.attempt(), 1);

    assert_eq!(job.apply(token("Hello ")), Applied::Updated);
    assert_eq!(job.apply(token("world.")), Applied::Updated);
    assert_eq!(
        job.apply(Payload::Complete {
            tokens: Some(2),
            duration_seconds: Some(1.5),
        }),
        Applied::Finished(JobStatus::Completed)
    );

    let snapshot = job.snapshot();
    assert_eq!(snapshot.status, JobStatus::Completed);
    assert_eq!(snapshot.content, "Hello world.");
    assert_eq!(snapshot.progress, 1.0);
    assert_eq!(snapshot.tokens, 2);
    assert!((snapshot.estimated_cost_usd - 0.02).abs() < 1e-12);
    assert_eq!(job.duration_seconds(), Some(1.5));
}

#[test]
fn progress_is_monotonic_and_reaches_one_only_on_completion() {
    let mut job = running_job();
    let mut observed = vec![job.progress()];
    let payloads = vec![
        token("a"),
        Payload::Checkpoint {
            progress: Some(0.5),
            stage: Some("drafting".to_string()),
            tokens: None,
        },
        Payload::Checkpoint {
            progress: Some(0.2),
            stage: None,
            tokens: None,
        },
        token("b"),
        Payload::Checkpoint {
            progress: Some(1.0),
            stage: None,
            tokens: None,
        },
        token("c"),
    ];
    for payload in payloads {
        job.apply(payload);
        observed.push(job.progress());
    }

    assert!(observed.windows(2).all(|pair| pair[0] <= pair[1]), "{observed:?}");
    assert!(observed.iter().all(|p| *p <= STREAMING_PROGRESS_CAP));
    assert_eq!(job.stage(), Some("drafting"));

    job.apply(Payload::Complete {
        tokens: None,
        duration_seconds: None,
    });
    assert_eq!(job.progress(), 1.0);
}

#[test]
fn cache_hit_then_close_completes_with_exact_content() {
    let mut job = running_job();
    job.apply(token("partial "));
    job.apply(Payload::CacheHit {
        content: "FULL TEXT".to_string(),
    });
    assert_eq!(job.status(), JobStatus::Running);
    assert_eq!(job.finish_stream(), Applied::Finished(JobStatus::Completed));
    assert_eq!(job.content(), "FULL TEXT");
    assert_eq!(job.progress(), 1.0);
}

#[test]
fn stream_end_without_completion_fails() {
    let mut job = running_job();
    job.apply(token("half a chapter"));
    assert_eq!(job.finish_stream(), Applied::Finished(JobStatus::Failed));
    assert_eq!(job.error_detail(), Some(STREAM_ENDED_MESSAGE));
    assert_eq!(job.content(), "half a chapter");
}

#[test]
fn backend_error_fails_the_attempt() {
    let mut job = running_job();
    assert_eq!(
        job.apply(Payload::Error {
            message: "rate limited".to_string()
        }),
        Applied::Finished(JobStatus::Failed)
    );
    assert_eq!(job.error_detail(), Some("rate limited"));
    // Frames after settling are ignored.
    assert_eq!(job.apply(token("late")), Applied::Ignored);
    assert_eq!(job.finish_stream(), Applied::Ignored);
}

#[test]
fn cancellation_is_idempotent() {
    let mut job = running_job();
    job.apply(token("Once upon a..."));
    assert_eq!(job.cancel(), Applied::Finished(JobStatus::Cancelled));
    assert_eq!(job.cancel(), Applied::Ignored);
    assert_eq!(job.cancel(), Applied::Ignored);
    assert_eq!(job.status(), JobStatus::Cancelled);
    assert_eq!(job.content(), "Once upon a...");
    assert!(job.error_detail().is_none());
}

#[test]
fn cancelling_a_settled_job_is_a_no_op() {
    let mut pending = GenerationJob::new(3, settings());
    assert_eq!(pending.cancel(), Applied::Ignored);
    assert_eq!(pending.status(), JobStatus::Pending);

    let mut done = running_job();
    done.apply(Payload::Complete {
        tokens: None,
        duration_seconds: None,
    });
    assert_eq!(done.cancel(), Applied::Ignored);
    assert_eq!(done.status(), JobStatus::Completed);
}

#[test]
fn retry_keeps_previous_content_until_new_output_arrives() {
    let mut job = running_job();
    job.apply(token("Old chapter."));
    job.apply(Payload::Complete {
        tokens: Some(10),
        duration_seconds: None,
    });

    job.start_attempt().unwrap();
    assert_eq!(job.attempt(), 2);
    assert_eq!(job.progress(), 0.0);
    assert_eq!(job.tokens(), 0);
    assert_eq!(job.content(), "Old chapter.");

    // A checkpoint is not output; the old text stays visible.
    job.apply(Payload::Checkpoint {
        progress: Some(0.1),
        stage: None,
        tokens: None,
    });
    assert_eq!(job.content(), "Old chapter.");

    job.apply(token("New"));
    assert_eq!(job.content(), "New");
}

#[test]
fn immediate_failure_on_retry_does_not_blank_content() {
    let mut job = running_job();
    job.apply(token("Kept."));
    job.apply(Payload::Complete {
        tokens: None,
        duration_seconds: None,
    });

    job.start_attempt().unwrap();
    job.fail("connection refused");
    assert_eq!(job.status(), JobStatus::Failed);
    assert_eq!(job.content(), "Kept.");
}

#[test]
fn running_job_cannot_start_again() {
    let mut job = running_job();
    assert_eq!(
        job.start_attempt(),
        Err(JobError::AlreadyRunning { unit: 1 })
    );
}

#[test]
fn opaque_payloads_do_not_touch_the_job() {
    let mut job = running_job();
    let applied = job.apply(Payload::Opaque {
        event_type: "review".to_string(),
        value: serde_json::json!({"score": 9}),
    });
    assert_eq!(applied, Applied::Ignored);
    assert!(job.content().is_empty());
}

#[test]
fn restored_job_is_completed() {
    let job = GenerationJob::restored(4, "Archived text", 321, settings());
    assert_eq!(job.status(), JobStatus::Completed);
    assert_eq!(job.tokens(), 321);
    assert_eq!(job.progress(), 1.0);
    assert_eq!(job.attempt(), 0);
}
