use quill_logging::quill_protocol;
use serde_json::{Map, Value};

use crate::frame::Frame;

/// Interpreted meaning of one frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Literal text to append, whitespace preserved.
    ContentToken(String),
    /// Mid-stream progress telemetry.
    Checkpoint {
        progress: Option<f64>,
        stage: Option<String>,
        tokens: Option<u64>,
    },
    /// Full cached result; replaces the buffer.
    CacheHit { content: String },
    /// The attempt finished.
    Complete {
        tokens: Option<u64>,
        duration_seconds: Option<f64>,
    },
    /// The backend reported a failure.
    Error { message: String },
    /// Well-formed structured payload with no known shape (for example review events).
    Opaque { event_type: String, value: Value },
}

/// Classify a decoded frame. Never fails; anything unparseable is content.
pub fn interpret(frame: &Frame) -> Payload {
    let raw = frame.payload.as_str();
    let event = frame.event_type.as_str();

    let value = match serde_json::from_str::<Value>(raw) {
        Ok(value) => value,
        Err(err) => {
            if looks_structured(raw) {
                quill_protocol!(
                    "malformed structured payload on '{event}' kept as content: {err}"
                );
            }
            return Payload::ContentToken(raw.to_string());
        }
    };

    match value {
        Value::String(text) => match event {
            "error" => Payload::Error { message: text },
            _ => Payload::ContentToken(text),
        },
        Value::Object(map) => interpret_object(event, map),
        Value::Array(_) => Payload::Opaque {
            event_type: event.to_string(),
            value,
        },
        // Bare scalars are not a known control shape; keep the text exactly.
        Value::Number(_) | Value::Bool(_) | Value::Null => Payload::ContentToken(raw.to_string()),
    }
}

fn interpret_object(event: &str, map: Map<String, Value>) -> Payload {
    if let Some(error) = map.get("error") {
        return Payload::Error {
            message: message_text(error),
        };
    }

    match event {
        "error" => {
            let message = map
                .get("message")
                .map(message_text)
                .unwrap_or_else(|| "generation failed".to_string());
            return Payload::Error { message };
        }
        "checkpoint" => return checkpoint(&map),
        "complete" => return complete(&map),
        _ => {}
    }

    let is_cache = event == "cache" || map.get("source").and_then(Value::as_str) == Some("cache");
    if is_cache {
        if let Some(content) = map.get("content").and_then(Value::as_str) {
            return Payload::CacheHit {
                content: content.to_string(),
            };
        }
    }

    if ["outline_id", "cached", "duration"]
        .iter()
        .any(|key| map.contains_key(*key))
    {
        return complete(&map);
    }

    if map.contains_key("progress") || map.contains_key("stage") {
        return checkpoint(&map);
    }

    quill_protocol!("unrecognized structured payload on '{event}'");
    Payload::Opaque {
        event_type: event.to_string(),
        value: Value::Object(map),
    }
}

fn checkpoint(map: &Map<String, Value>) -> Payload {
    Payload::Checkpoint {
        progress: map.get("progress").and_then(Value::as_f64).map(normalize_progress),
        stage: map.get("stage").and_then(Value::as_str).map(str::to_string),
        tokens: token_field(map),
    }
}

fn complete(map: &Map<String, Value>) -> Payload {
    Payload::Complete {
        tokens: token_field(map),
        duration_seconds: map.get("duration").and_then(Value::as_f64),
    }
}

fn token_field(map: &Map<String, Value>) -> Option<u64> {
    let value = map.get("tokens")?;
    value
        .as_u64()
        .or_else(|| value.as_f64().filter(|t| *t >= 0.0).map(|t| t as u64))
}

/// Progress above 1.0 is a percentage.
fn normalize_progress(progress: f64) -> f64 {
    let fraction = if progress > 1.0 {
        progress / 100.0
    } else {
        progress
    };
    fraction.clamp(0.0, 1.0)
}

fn message_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Object(map) => map
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| value.to_string()),
        other => other.to_string(),
    }
}

fn looks_structured(raw: &str) -> bool {
    matches!(raw.trim_start().chars().next(), Some('{') | Some('['))
}

#[cfg(test)]
mod tests {
    use super::{looks_structured, normalize_progress};

    #[test]
    fn percentages_are_scaled() {
        assert_eq!(normalize_progress(0.4), 0.4);
        assert_eq!(normalize_progress(40.0), 0.4);
        assert_eq!(normalize_progress(250.0), 1.0);
        assert_eq!(normalize_progress(-3.0), 0.0);
    }

    #[test]
    fn structured_detection_ignores_leading_whitespace() {
        assert!(looks_structured("  {\"a\":"));
        assert!(looks_structured("[1,"));
        assert!(!looks_structured("plain"));
    }
}
