//! Line framer for ND-JSON input
//!
//! Every non-blank line is one frame. A broken line only ever affects its
//! own record, so this framer never reports a structure error.

use super::{Frame, Framer};
use crate::error::SourceError;
use std::collections::VecDeque;

#[derive(Debug, Default)]
pub struct NdjsonFramer {
    line: Vec<u8>,
    next_ordinal: u64,
}

impl NdjsonFramer {
    pub fn new() -> Self {
        Self::default()
    }

    fn end_line(&mut self, out: &mut VecDeque<Frame>) {
        let mut line = std::mem::take(&mut self.line);
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        if line.iter().all(|b| b.is_ascii_whitespace()) {
            return;
        }
        out.push_back(Frame {
            ordinal: self.next_ordinal,
            type_name: None,
            bytes: line,
        });
        self.next_ordinal += 1;
    }
}

impl Framer for NdjsonFramer {
    fn push(&mut self, chunk: &[u8], out: &mut VecDeque<Frame>) -> Result<(), SourceError> {
        let mut rest = chunk;
        while let Some(pos) = rest.iter().position(|&b| b == b'\n') {
            self.line.extend_from_slice(&rest[..pos]);
            self.end_line(out);
            rest = &rest[pos + 1..];
        }
        self.line.extend_from_slice(rest);
        Ok(())
    }

    fn finish(&mut self, out: &mut VecDeque<Frame>) -> Result<(), SourceError> {
        self.end_line(out);
        Ok(())
    }
}
