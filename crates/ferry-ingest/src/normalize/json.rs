//! Incremental framer for `{ "Type": [ record, ... ], ... }` documents
//!
//! Element extents are found by tracking string/escape state and bracket
//! depth, so memory use is bounded by the largest single record.

use super::{Frame, Framer};
use crate::error::SourceError;
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Expecting the opening `{` of the document
    Start,
    /// Expecting a type name, or `}` when `first`
    ExpectKey { first: bool },
    InKey { escaped: bool },
    /// Expecting `:` after a type name
    AfterKey,
    /// Expecting the `[` opening a type's records
    ExpectArray,
    /// Expecting a record, or `]` when `first`
    ExpectElement { first: bool },
    InElement(Element),
    /// Expecting `,` or `]` after a record
    AfterElement,
    /// Expecting `,` or `}` after a type's records
    AfterArray,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Element {
    /// Object or array, with current bracket depth
    Composite {
        depth: u32,
        in_string: bool,
        escaped: bool,
    },
    /// Top-level string element
    Str { escaped: bool },
    /// Number, literal, or anything else that ends at a delimiter
    Scalar,
}

#[derive(Debug)]
pub struct JsonDocumentFramer {
    state: State,
    key: Vec<u8>,
    type_name: String,
    element: Vec<u8>,
    offset: u64,
    next_ordinal: u64,
}

impl Default for JsonDocumentFramer {
    fn default() -> Self {
        Self::new()
    }
}

fn is_whitespace(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | b'\r')
}

impl JsonDocumentFramer {
    pub fn new() -> Self {
        Self {
            state: State::Start,
            key: Vec::new(),
            type_name: String::new(),
            element: Vec::new(),
            offset: 0,
            next_ordinal: 0,
        }
    }

    fn structure_error(&self, message: impl Into<String>) -> SourceError {
        SourceError::Structure {
            offset: self.offset,
            message: message.into(),
        }
    }

    fn unexpected(&self, b: u8, expected: &str) -> SourceError {
        self.structure_error(format!(
            "expected {}, found '{}'",
            expected,
            char::from(b).escape_default()
        ))
    }

    fn emit(&mut self, out: &mut VecDeque<Frame>) {
        out.push_back(Frame {
            ordinal: self.next_ordinal,
            type_name: Some(self.type_name.clone()),
            bytes: std::mem::take(&mut self.element),
        });
        self.next_ordinal += 1;
        self.state = State::AfterElement;
    }

    /// Feed one byte. Returns `false` when the byte was not consumed and
    /// must be fed again in the new state.
    fn step(&mut self, b: u8, out: &mut VecDeque<Frame>) -> Result<bool, SourceError> {
        match self.state {
            State::Start => match b {
                // UTF-8 byte order mark
                0xEF | 0xBB | 0xBF if self.offset < 3 => {}
                b'{' => self.state = State::ExpectKey { first: true },
                b if is_whitespace(b) => {}
                b => return Err(self.unexpected(b, "a JSON object of type names")),
            },

            State::ExpectKey { first } => match b {
                b'"' => {
                    self.key.clear();
                    self.key.push(b);
                    self.state = State::InKey { escaped: false };
                }
                b'}' if first => self.state = State::Done,
                b if is_whitespace(b) => {}
                b => return Err(self.unexpected(b, "a type name")),
            },

            State::InKey { escaped } => {
                self.key.push(b);
                self.state = match (escaped, b) {
                    (true, _) => State::InKey { escaped: false },
                    (false, b'\\') => State::InKey { escaped: true },
                    (false, b'"') => {
                        self.type_name = serde_json::from_slice(&self.key)
                            .map_err(|e| self.structure_error(format!("invalid type name: {}", e)))?;
                        State::AfterKey
                    }
                    (false, _) => State::InKey { escaped: false },
                };
            }

            State::AfterKey => match b {
                b':' => self.state = State::ExpectArray,
                b if is_whitespace(b) => {}
                b => return Err(self.unexpected(b, "':'")),
            },

            State::ExpectArray => match b {
                b'[' => self.state = State::ExpectElement { first: true },
                b if is_whitespace(b) => {}
                _ => {
                    return Err(self.structure_error(format!(
                        "records of type '{}' are not an array",
                        self.type_name
                    )))
                }
            },

            State::ExpectElement { first } => match b {
                b']' if first => self.state = State::AfterArray,
                b']' | b',' => return Err(self.unexpected(b, "a record")),
                b if is_whitespace(b) => {}
                b'{' | b'[' => {
                    self.element.push(b);
                    self.state = State::InElement(Element::Composite {
                        depth: 1,
                        in_string: false,
                        escaped: false,
                    });
                }
                b'"' => {
                    self.element.push(b);
                    self.state = State::InElement(Element::Str { escaped: false });
                }
                b => {
                    self.element.push(b);
                    self.state = State::InElement(Element::Scalar);
                }
            },

            State::InElement(element) => return self.step_element(element, b, out),

            State::AfterElement => match b {
                b',' => self.state = State::ExpectElement { first: false },
                b']' => self.state = State::AfterArray,
                b if is_whitespace(b) => {}
                b => return Err(self.unexpected(b, "',' or ']'")),
            },

            State::AfterArray => match b {
                b',' => self.state = State::ExpectKey { first: false },
                b'}' => self.state = State::Done,
                b if is_whitespace(b) => {}
                b => return Err(self.unexpected(b, "',' or '}'")),
            },

            State::Done => {
                if !is_whitespace(b) {
                    return Err(self.structure_error("trailing data after document"));
                }
            }
        }
        Ok(true)
    }

    fn step_element(
        &mut self,
        element: Element,
        b: u8,
        out: &mut VecDeque<Frame>,
    ) -> Result<bool, SourceError> {
        match element {
            Element::Composite {
                depth,
                in_string: true,
                escaped,
            } => {
                self.element.push(b);
                let (in_string, escaped) = match (escaped, b) {
                    (true, _) => (true, false),
                    (false, b'\\') => (true, true),
                    (false, b'"') => (false, false),
                    (false, _) => (true, false),
                };
                self.state = State::InElement(Element::Composite {
                    depth,
                    in_string,
                    escaped,
                });
            }
            Element::Composite { depth, .. } => {
                self.element.push(b);
                let depth = match b {
                    b'{' | b'[' => depth + 1,
                    b'}' | b']' => depth - 1,
                    _ => depth,
                };
                if depth == 0 {
                    self.emit(out);
                } else {
                    self.state = State::InElement(Element::Composite {
                        depth,
                        in_string: b == b'"',
                        escaped: false,
                    });
                }
            }
            Element::Str { escaped } => {
                self.element.push(b);
                match (escaped, b) {
                    (false, b'"') => self.emit(out),
                    (false, b'\\') => self.state = State::InElement(Element::Str { escaped: true }),
                    _ => self.state = State::InElement(Element::Str { escaped: false }),
                }
            }
            Element::Scalar => {
                if is_whitespace(b) || b == b',' || b == b']' {
                    self.emit(out);
                    return Ok(false);
                }
                self.element.push(b);
            }
        }
        Ok(true)
    }
}

impl Framer for JsonDocumentFramer {
    fn push(&mut self, chunk: &[u8], out: &mut VecDeque<Frame>) -> Result<(), SourceError> {
        let mut i = 0;
        while i < chunk.len() {
            if self.step(chunk[i], out)? {
                i += 1;
                self.offset += 1;
            }
        }
        Ok(())
    }

    fn finish(&mut self, _out: &mut VecDeque<Frame>) -> Result<(), SourceError> {
        match self.state {
            // An empty input holds no records.
            State::Done | State::Start => Ok(()),
            State::InElement(_) | State::AfterElement | State::ExpectElement { .. } => {
                Err(SourceError::Truncated(format!(
                    "input ends inside the records of type '{}'",
                    self.type_name
                )))
            }
            _ => Err(SourceError::Truncated(
                "input ends before the document is closed".to_string(),
            )),
        }
    }
}
