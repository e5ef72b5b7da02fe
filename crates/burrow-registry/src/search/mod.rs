//! Incremental decoding of search responses
//!
//! A search response is `{"objects": [ ... ], "total": n, ...}`. The
//! decoder scans bytes as they arrive and hands out each element of the
//! top-level `objects` array as soon as it is complete, without waiting for
//! the rest of the body. Memory is bounded by the largest single element.

use std::collections::VecDeque;
use std::pin::Pin;

use burrow_core::error::BurrowError;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::api::SearchObject;
use crate::RegistryResult;

/// Lazily decoded search results; finite and not restartable
pub type SearchStream = Pin<Box<dyn Stream<Item = RegistryResult<SearchObject>> + Send>>;

/// Nesting depth of elements inside the `objects` array
const ELEMENT_DEPTH: usize = 2;

/// Longest top-level key worth remembering while looking for `objects`
const MAX_KEY_LEN: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Looking for the `objects` key in the root object
    Seeking,
    /// Inside the `objects` array
    Elements,
    /// The array has been closed; the rest of the body is ignored
    Done,
}

/// Byte-level scanner for the `objects` array
#[derive(Debug)]
pub(crate) struct ObjectsDecoder {
    buf: Vec<u8>,
    pos: usize,
    depth: usize,
    in_string: bool,
    escaped: bool,
    string_start: usize,
    last_string: Option<Vec<u8>>,
    key: Option<Vec<u8>>,
    element_start: Option<usize>,
    phase: Phase,
}

impl ObjectsDecoder {
    pub(crate) fn new() -> Self {
        Self {
            buf: Vec::new(),
            pos: 0,
            depth: 0,
            in_string: false,
            escaped: false,
            string_start: 0,
            last_string: None,
            key: None,
            element_start: None,
            phase: Phase::Seeking,
        }
    }

    /// Consume a chunk and return the elements it completed
    pub(crate) fn feed(&mut self, chunk: &[u8]) -> RegistryResult<Vec<SearchObject>> {
        if self.phase == Phase::Done {
            return Ok(Vec::new());
        }
        self.buf.extend_from_slice(chunk);

        let mut complete = Vec::new();
        while self.pos < self.buf.len() && self.phase != Phase::Done {
            let i = self.pos;
            let byte = self.buf[i];
            self.pos += 1;

            if self.in_string {
                self.scan_string_byte(byte, i);
                continue;
            }

            let at_elements = self.phase == Phase::Elements && self.depth == ELEMENT_DEPTH;
            match byte {
                b'"' => {
                    self.in_string = true;
                    self.string_start = i;
                    if at_elements && self.element_start.is_none() {
                        self.element_start = Some(i);
                    }
                },
                b'{' | b'[' => {
                    if at_elements && self.element_start.is_none() {
                        self.element_start = Some(i);
                    }
                    self.depth += 1;
                    if self.phase == Phase::Seeking
                        && byte == b'['
                        && self.depth == ELEMENT_DEPTH
                        && self.key.as_deref() == Some(b"objects".as_slice())
                    {
                        self.phase = Phase::Elements;
                    }
                },
                b'}' | b']' => {
                    if self.depth == 0 {
                        return Err(malformed());
                    }
                    if at_elements {
                        // Closing the objects array; flush a trailing scalar
                        if let Some(start) = self.element_start.take() {
                            complete.push(start..i);
                        }
                        self.phase = Phase::Done;
                    }
                    self.depth -= 1;
                    if self.phase == Phase::Elements && self.depth == ELEMENT_DEPTH {
                        if let Some(start) = self.element_start.take() {
                            complete.push(start..i + 1);
                        }
                    }
                },
                b':' => {
                    if self.phase == Phase::Seeking && self.depth == 1 {
                        self.key = self.last_string.take();
                    }
                },
                b',' => {
                    if self.phase == Phase::Seeking && self.depth == 1 {
                        self.key = None;
                        self.last_string = None;
                    }
                    if at_elements {
                        if let Some(start) = self.element_start.take() {
                            complete.push(start..i);
                        }
                    }
                },
                b' ' | b'\t' | b'\n' | b'\r' => {},
                _ => {
                    if at_elements && self.element_start.is_none() {
                        self.element_start = Some(i);
                    }
                },
            }
        }

        let objects = complete
            .into_iter()
            .map(|range| {
                serde_json::from_slice::<SearchObject>(&self.buf[range])
                    .map_err(|e| BurrowError::internal("failed to decode search result".to_string(), e))
            })
            .collect::<RegistryResult<Vec<_>>>()?;

        self.compact();
        Ok(objects)
    }

    /// Check that the body ended in a sensible place
    pub(crate) fn finish(&self) -> RegistryResult<()> {
        match self.phase {
            Phase::Done => Ok(()),
            // No objects array at all: nothing to yield
            Phase::Seeking if self.depth == 0 && !self.in_string => Ok(()),
            _ => Err(BurrowError::Network {
                message: "search response ended before the objects array was complete".to_string(),
                source: None,
            }),
        }
    }

    fn scan_string_byte(&mut self, byte: u8, i: usize) {
        if self.escaped {
            self.escaped = false;
        } else if byte == b'\\' {
            self.escaped = true;
        } else if byte == b'"' {
            self.in_string = false;
            if self.phase == Phase::Seeking && self.depth == 1 {
                let contents = &self.buf[self.string_start + 1..i];
                self.last_string = (contents.len() <= MAX_KEY_LEN).then(|| contents.to_vec());
            }
        }
    }

    /// Drop bytes that no pending element or key still needs
    fn compact(&mut self) {
        let keep_from = match (self.element_start, self.phase) {
            (Some(start), _) => start,
            (None, Phase::Seeking) if self.in_string && self.depth == 1 => self.string_start,
            _ => self.buf.len(),
        };
        if keep_from == 0 {
            return;
        }

        self.buf.drain(..keep_from);
        self.pos = self.pos.saturating_sub(keep_from);
        self.element_start = self.element_start.map(|start| start - keep_from);
        self.string_start = self.string_start.saturating_sub(keep_from);
    }
}

fn malformed() -> BurrowError {
    BurrowError::Network {
        message: "malformed search response".to_string(),
        source: None,
    }
}

struct DecodeState<S> {
    body: S,
    decoder: ObjectsDecoder,
    ready: VecDeque<SearchObject>,
    token: CancellationToken,
    finished: bool,
}

/// Decode `objects` elements from a byte stream as they arrive.
///
/// Cancelling `token` ends the stream with a single `Aborted` error. A
/// body error or a decode error is yielded once and ends the stream.
pub fn decode_objects<S>(body: S, token: CancellationToken) -> SearchStream
where
    S: Stream<Item = RegistryResult<Bytes>> + Send + Unpin + 'static,
{
    let state = DecodeState {
        body,
        decoder: ObjectsDecoder::new(),
        ready: VecDeque::new(),
        token,
        finished: false,
    };

    let stream = futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(object) = state.ready.pop_front() {
                return Some((Ok(object), state));
            }
            if state.finished {
                return None;
            }

            let next = tokio::select! {
                biased;
                _ = state.token.cancelled() => None,
                next = state.body.next() => Some(next),
            };
            let Some(next) = next else {
                state.finished = true;
                return Some((Err(BurrowError::aborted("search was aborted")), state));
            };

            match next {
                Some(Ok(chunk)) => match state.decoder.feed(&chunk) {
                    Ok(objects) => state.ready.extend(objects),
                    Err(err) => {
                        state.finished = true;
                        return Some((Err(err), state));
                    },
                },
                Some(Err(err)) => {
                    state.finished = true;
                    return Some((Err(err), state));
                },
                None => {
                    state.finished = true;
                    if let Err(err) = state.decoder.finish() {
                        return Some((Err(err), state));
                    }
                    debug!("search response fully decoded");
                },
            }
        }
    });

    Box::pin(stream)
}
