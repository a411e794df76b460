use pretty_assertions::assert_eq;
use quill_core::{interpret, Frame, FrameDecoder, GenerationJob, Payload, TelemetrySettings};

const STREAM: &str = concat!(
    "data: \"Hello \"\n\n",
    "event: checkpoint\n",
    "data: {\"progress\": 0.2, \"stage\": \"drafting\"}\n\n",
    "data: \"  two  spaces  \"\n\n",
    ": keep-alive\n\n",
    "data: \"caf\u{e9} \u{2014} na\u{ef}ve\"\r\n\r\n",
    "data: {\"outline_id\": 7, \"tokens\": 3}\n\n",
);

fn decode_chunks(chunks: &[&[u8]]) -> Vec<Frame> {
    let mut decoder = FrameDecoder::new();
    let mut frames = Vec::new();
    for chunk in chunks {
        frames.extend(decoder.push(chunk));
    }
    frames.extend(decoder.finish());
    frames
}

fn replay(frames: &[Frame]) -> (Vec<Payload>, String) {
    let mut job = GenerationJob::new(1, TelemetrySettings::default());
    job.start_attempt().unwrap();
    let payloads: Vec<Payload> = frames.iter().map(interpret).collect();
    for payload in payloads.iter().cloned() {
        job.apply(payload);
    }
    (payloads, job.content().to_string())
}

#[test]
fn whole_stream_decodes_into_expected_frames() {
    let frames = decode_chunks(&[STREAM.as_bytes()]);
    assert_eq!(
        frames,
        vec![
            Frame::token("\"Hello \""),
            Frame::new("checkpoint", "{\"progress\": 0.2, \"stage\": \"drafting\"}"),
            Frame::token("\"  two  spaces  \""),
            Frame::token("\"caf\u{e9} \u{2014} na\u{ef}ve\""),
            Frame::token("{\"outline_id\": 7, \"tokens\": 3}"),
        ]
    );
}

#[test]
fn every_two_way_split_yields_identical_events_and_content() {
    let bytes = STREAM.as_bytes();
    let expected = replay(&decode_chunks(&[bytes]));
    assert_eq!(
        expected.1,
        "Hello   two  spaces  caf\u{e9} \u{2014} na\u{ef}ve"
    );

    for split in 0..=bytes.len() {
        let (head, tail) = bytes.split_at(split);
        let actual = replay(&decode_chunks(&[head, tail]));
        assert_eq!(actual, expected, "split at byte {split}");
    }
}

#[test]
fn single_byte_chunks_yield_identical_events_and_content() {
    let bytes = STREAM.as_bytes();
    let expected = replay(&decode_chunks(&[bytes]));
    let chunks: Vec<&[u8]> = bytes.chunks(1).collect();
    assert_eq!(replay(&decode_chunks(&chunks)), expected);
}

#[test]
fn marker_split_across_chunks_is_reassembled() {
    let frames = decode_chunks(&[b"ev", b"ent: check", b"point\nd", b"ata: {}\n"]);
    assert_eq!(frames, vec![Frame::new("checkpoint", "{}")]);
}

#[test]
fn unmarked_lines_degrade_to_content() {
    let frames = decode_chunks(&[b"data: \"a\"\nstray text\n\n"]);
    assert_eq!(
        frames,
        vec![Frame::token("\"a\""), Frame::token("stray text")]
    );
}

#[test]
fn trailing_line_without_terminator_is_flushed_on_finish() {
    let mut decoder = FrameDecoder::new();
    assert!(decoder.push(b"data: \"tail\"").is_empty());
    assert_eq!(decoder.finish(), vec![Frame::token("\"tail\"")]);
    assert!(decoder.finish().is_empty());
}

#[test]
fn only_one_space_after_marker_is_stripped() {
    let frames = decode_chunks(&[b"data:  raw\ndata:tight\n"]);
    assert_eq!(frames, vec![Frame::token(" raw"), Frame::token("tight")]);
}
