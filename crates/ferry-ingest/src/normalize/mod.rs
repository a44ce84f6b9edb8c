//! Normalizers: raw bytes in, [`NormalizedRecord`]s out
//!
//! Normalization runs in two stages. A format-specific [`Framer`] cuts the
//! byte stream into one [`Frame`] per record, incrementally and across chunk
//! boundaries. The generic [`decode`] stage then parses and validates each
//! frame on its own, so one bad record is skipped instead of ending the run.
//!
//! Only structural damage that hides where the next record starts (a
//! document that is not an object, a type whose value is not an array,
//! truncated input) surfaces as a [`SourceError`]. Frames cut before the
//! damage are still delivered first.

mod json;
mod ndjson;

pub use json::JsonDocumentFramer;
pub use ndjson::NdjsonFramer;

use crate::error::{RecordError, SourceError};
use crate::source::ByteStream;
use crate::types::NormalizedRecord;
use futures::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use std::collections::VecDeque;
use std::fmt;
use std::path::Path;
use std::pin::Pin;
use std::str::FromStr;

/// Raw bytes of one record, cut out of the input.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Zero-based position among all frames of the input
    pub ordinal: u64,
    /// Type name taken from the enclosing document, when the format has one
    pub type_name: Option<String>,
    pub bytes: Vec<u8>,
}

/// Splits a byte stream into record frames.
pub trait Framer: Send {
    /// Consume one chunk, appending every frame it completes to `out`.
    ///
    /// On error, frames completed before the damage are already in `out`.
    fn push(&mut self, chunk: &[u8], out: &mut VecDeque<Frame>) -> Result<(), SourceError>;

    /// Signal end of input.
    fn finish(&mut self, out: &mut VecDeque<Frame>) -> Result<(), SourceError>;
}

/// Outcome of normalizing one frame
pub type ParsedRecord = Result<NormalizedRecord, RecordError>;

pub type RecordStream = Pin<Box<dyn Stream<Item = Result<ParsedRecord, SourceError>> + Send>>;

/// Input layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordFormat {
    /// `{ "User": [ {...}, ... ], "Post": [ ... ] }`
    #[default]
    Json,
    /// One `{"typeName": "User", "record": {...}}` per line
    Ndjson,
}

impl RecordFormat {
    /// Guess the format from a path or URL; `.ndjson` and `.jsonl` mean
    /// ND-JSON, anything else is a JSON document.
    pub fn infer(location: &str) -> Self {
        let path = location.split(['?', '#']).next().unwrap_or(location);
        match Path::new(path).extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("ndjson") || ext.eq_ignore_ascii_case("jsonl") => {
                RecordFormat::Ndjson
            }
            _ => RecordFormat::Json,
        }
    }

    pub fn framer(self) -> Box<dyn Framer> {
        match self {
            RecordFormat::Json => Box::new(JsonDocumentFramer::new()),
            RecordFormat::Ndjson => Box::new(NdjsonFramer::new()),
        }
    }
}

impl FromStr for RecordFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(RecordFormat::Json),
            "ndjson" | "jsonl" => Ok(RecordFormat::Ndjson),
            other => Err(format!("unknown record format '{}'", other)),
        }
    }
}

impl fmt::Display for RecordFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RecordFormat::Json => "json",
            RecordFormat::Ndjson => "ndjson",
        })
    }
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "typeName")]
    type_name: String,
    record: Value,
}

/// Parse and validate one frame.
pub fn decode(frame: Frame) -> ParsedRecord {
    let ordinal = frame.ordinal;
    let malformed = |reason: String| RecordError { ordinal, reason };

    let (type_name, body) = match frame.type_name {
        Some(type_name) => {
            let body: Value = serde_json::from_slice(&frame.bytes)
                .map_err(|e| malformed(format!("invalid JSON: {}", e)))?;
            (type_name, body)
        }
        None => {
            let envelope: Envelope = serde_json::from_slice(&frame.bytes)
                .map_err(|e| malformed(format!("invalid record line: {}", e)))?;
            (envelope.type_name, envelope.record)
        }
    };

    NormalizedRecord::from_value(&type_name, body).map_err(malformed)
}

struct NormalizeState {
    bytes: ByteStream,
    framer: Box<dyn Framer>,
    pending: VecDeque<Frame>,
    failure: Option<SourceError>,
    exhausted: bool,
}

/// Lazily normalize a byte stream, preserving source order.
pub fn normalize(bytes: ByteStream, framer: Box<dyn Framer>) -> RecordStream {
    let state = NormalizeState {
        bytes,
        framer,
        pending: VecDeque::new(),
        failure: None,
        exhausted: false,
    };

    Box::pin(stream::unfold(state, |mut state| async move {
        loop {
            if let Some(frame) = state.pending.pop_front() {
                return Some((Ok(decode(frame)), state));
            }
            if let Some(err) = state.failure.take() {
                state.exhausted = true;
                return Some((Err(err), state));
            }
            if state.exhausted {
                return None;
            }

            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    if let Err(err) = state.framer.push(&chunk, &mut state.pending) {
                        state.failure = Some(err);
                    }
                }
                Some(Err(err)) => state.failure = Some(err),
                None => {
                    state.exhausted = true;
                    if let Err(err) = state.framer.finish(&mut state.pending) {
                        state.failure = Some(err);
                    }
                }
            }
        }
    }))
}
