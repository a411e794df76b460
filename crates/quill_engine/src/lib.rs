//! Quill engine: streaming transport, attempt driver and pipeline orchestration.
mod archive;
mod attempt;
mod orchestrator;
mod sink;
mod transport;
mod types;

pub use archive::{chapter_filename, ArchiveError, ArchiveSettings, ArchivedChapter, ChapterArchive, Clock};
pub use attempt::run_attempt;
pub use orchestrator::{Orchestrator, OrchestratorError, PipelineSettings, RunOutcome};
pub use sink::{ChannelStoreSink, StoreSink};
pub use transport::{ChunkStream, GenerationTransport, ReqwestTransport, TransportSettings};
pub use types::{FailureKind, GenerationRequest, RequestMode, TransportError};
