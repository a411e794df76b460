use quill_logging::quill_protocol;

/// Event type used for frames that carry no `event:` line.
pub const DEFAULT_EVENT: &str = "token";

const EVENT_MARKER: &str = "event:";
const DATA_MARKER: &str = "data:";

/// One decoded `(event type, raw payload)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub event_type: String,
    pub payload: String,
}

impl Frame {
    pub fn new(event_type: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            payload: payload.into(),
        }
    }

    pub fn token(payload: impl Into<String>) -> Self {
        Self::new(DEFAULT_EVENT, payload)
    }
}

/// Incremental line-framed decoder.
///
/// Chunks may split lines (and UTF-8 sequences) anywhere; only complete lines
/// are decoded. The decoder never fails: lines it does not recognize become
/// content frames of the default event type.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    pending: Vec<u8>,
    current_event: Option<String>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk and return every frame completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Frame> {
        self.pending.extend_from_slice(chunk);

        let mut frames = Vec::new();
        let mut consumed = 0;
        while let Some(offset) = self.pending[consumed..].iter().position(|&b| b == b'\n') {
            let end = consumed + offset;
            let line = decode_line(&self.pending[consumed..end]);
            consumed = end + 1;
            if let Some(frame) = self.process_line(&line) {
                frames.push(frame);
            }
        }
        self.pending.drain(..consumed);
        frames
    }

    /// Flush a trailing unterminated line once the stream has ended.
    pub fn finish(&mut self) -> Vec<Frame> {
        if self.pending.is_empty() {
            self.current_event = None;
            return Vec::new();
        }
        let line = decode_line(&self.pending);
        self.pending.clear();
        let frame = self.process_line(&line);
        self.current_event = None;
        frame.into_iter().collect()
    }

    /// Bytes buffered while waiting for a line terminator.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn process_line(&mut self, line: &str) -> Option<Frame> {
        if line.is_empty() {
            return None;
        }
        if let Some(value) = line.strip_prefix(EVENT_MARKER) {
            let value = value.trim();
            self.current_event = if value.is_empty() {
                None
            } else {
                Some(value.to_string())
            };
            return None;
        }
        if let Some(value) = line.strip_prefix(DATA_MARKER) {
            let payload = value.strip_prefix(' ').unwrap_or(value);
            let event_type = self
                .current_event
                .take()
                .unwrap_or_else(|| DEFAULT_EVENT.to_string());
            return Some(Frame::new(event_type, payload));
        }
        if line.starts_with(':') || line.starts_with("id:") || line.starts_with("retry:") {
            return None;
        }

        quill_protocol!("unmarked line treated as content ({} bytes)", line.len());
        Some(Frame::token(line))
    }
}

fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}
