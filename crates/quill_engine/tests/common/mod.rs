#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use bytes::Bytes;
use futures_util::stream;
use futures_util::StreamExt;
use quill_core::{JobSnapshot, JobStatus, Outline, PipelineEvent, Unit};
use quill_engine::{
    ChunkStream, GenerationRequest, GenerationTransport, StoreSink, TransportError,
};
use tokio_util::sync::CancellationToken;

pub fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(quill_logging::initialize_for_tests);
}

pub fn outline(numbers: &[u32]) -> Outline {
    Outline::new(
        numbers
            .iter()
            .map(|n| Unit::new(*n, format!("Chapter {n}")))
            .collect(),
    )
    .expect("valid outline")
}

pub fn token(text: &str) -> String {
    format!("data: {}\n\n", serde_json::to_string(text).unwrap())
}

pub fn complete(tokens: u64) -> String {
    format!("event: complete\ndata: {{\"tokens\": {tokens}}}\n\n")
}

pub fn error(message: &str) -> String {
    format!("data: {{\"error\": {}}}\n\n", serde_json::to_string(message).unwrap())
}

pub fn cache(content: &str) -> String {
    format!(
        "data: {{\"source\": \"cache\", \"content\": {}}}\n\n",
        serde_json::to_string(content).unwrap()
    )
}

pub enum Step {
    Chunk(String),
    Fail(TransportError),
    /// Keep the stream open forever.
    Hang,
}

pub enum Script {
    Stream(Vec<Step>),
    Refuse(TransportError),
}

pub fn chunks(parts: &[String]) -> Script {
    Script::Stream(parts.iter().cloned().map(Step::Chunk).collect())
}

pub fn chunks_then_hang(parts: &[String]) -> Script {
    let mut steps: Vec<Step> = parts.iter().cloned().map(Step::Chunk).collect();
    steps.push(Step::Hang);
    Script::Stream(steps)
}

/// In-memory backend: each `open` for a unit pops that unit's next script.
#[derive(Default)]
pub struct ScriptedTransport {
    scripts: Mutex<HashMap<u32, VecDeque<Script>>>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, unit_number: u32, script: Script) {
        self.scripts
            .lock()
            .unwrap()
            .entry(unit_number)
            .or_default()
            .push_back(script);
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn opened_units(&self) -> Vec<u32> {
        self.requests().iter().map(|r| r.unit_number).collect()
    }
}

#[async_trait::async_trait]
impl GenerationTransport for ScriptedTransport {
    async fn open(
        &self,
        request: &GenerationRequest,
        _cancel: &CancellationToken,
    ) -> Result<ChunkStream, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        let script = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&request.unit_number)
            .and_then(VecDeque::pop_front)
            .unwrap_or(Script::Stream(Vec::new()));

        let steps = match script {
            Script::Refuse(err) => return Err(err),
            Script::Stream(steps) => steps,
        };
        let mut items = Vec::new();
        let mut hang = false;
        for step in steps {
            match step {
                Step::Chunk(text) => items.push(Ok(Bytes::from(text))),
                Step::Fail(err) => items.push(Err(err)),
                Step::Hang => {
                    hang = true;
                    break;
                }
            }
        }
        let head = stream::iter(items);
        if hang {
            Ok(head.chain(stream::pending::<Result<Bytes, TransportError>>()).boxed())
        } else {
            Ok(head.boxed())
        }
    }
}

#[derive(Default, Clone)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<PipelineEvent>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<PipelineEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn updates(&self, unit_number: u32) -> Vec<JobSnapshot> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                PipelineEvent::JobUpdated(snapshot) if snapshot.unit_number == unit_number => {
                    Some(snapshot)
                }
                _ => None,
            })
            .collect()
    }

    pub fn saw(&self, unit_number: u32, status: JobStatus, content: &str) -> bool {
        self.updates(unit_number)
            .iter()
            .any(|s| s.status == status && s.content == content)
    }
}

impl StoreSink for RecordingSink {
    fn publish(&self, event: PipelineEvent) {
        self.events.lock().unwrap().push(event);
    }
}

pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}
