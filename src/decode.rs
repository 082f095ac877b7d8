//! Incremental decoding of the transformation engine's response body.
//!
//! A successful response is a concatenation of independent JSON objects, not
//! an array. Records are decoded one at a time as bytes arrive, so the first
//! record is available before the body has been read in full.

use std::fmt;

use futures::stream::{self, BoxStream, StreamExt};
use serde::Deserialize;

use crate::error::ShardError;

/// Body chunks as they come off the connection.
pub type ByteStream = BoxStream<'static, Result<Vec<u8>, ShardError>>;

/// One record as the engine sends it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawRewriteRecord {
    #[serde(default)]
    pub uri: String,
    #[serde(default)]
    pub rewritten_source: Option<String>,
    #[serde(default)]
    pub in_place_substitutions: Option<Vec<RawSubstitution>>,
    #[serde(default, rename = "Diff", alias = "diff")]
    pub diff: Option<String>,
}

impl RawRewriteRecord {
    /// Number of substitutions in the record; zero means "scanned, unchanged".
    #[must_use]
    pub fn substitution_count(&self) -> usize {
        self.in_place_substitutions.as_ref().map_or(0, Vec::len)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawSubstitution {
    #[serde(default)]
    pub range: RawRange,
    #[serde(default)]
    pub replacement_content: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawRange {
    #[serde(default, alias = "Start")]
    pub start: RawLocation,
    #[serde(default, alias = "End")]
    pub end: RawLocation,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawLocation {
    #[serde(default, rename = "Offset", alias = "offset")]
    pub offset: i64,
}

/// Splits a byte stream of concatenated JSON objects into records.
///
/// Bytes are scanned once: a bracket and string scanner finds where the
/// current object ends, resuming where the previous call stopped, and only
/// the complete object is handed to serde_json. Consumed bytes are dropped
/// when they make up at least half of the buffer.
#[derive(Debug, Default)]
pub struct RecordDecoder {
    buf: Vec<u8>,
    /// First byte not yet consumed by a record.
    start: usize,
    /// First byte the scanner has not looked at.
    scanned: usize,
    depth: usize,
    in_string: bool,
    escaped: bool,
}

impl RecordDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes read from the connection.
    pub fn feed(&mut self, chunk: &[u8]) {
        if self.start > 0 && self.start * 2 >= self.buf.len() {
            self.buf.drain(..self.start);
            self.scanned -= self.start;
            self.start = 0;
        }
        self.buf.extend_from_slice(chunk);
    }

    /// Take the next complete record from the buffered bytes.
    ///
    /// Returns `Ok(None)` when more input is needed.
    pub fn next_record(&mut self) -> Result<Option<RawRewriteRecord>, ShardError> {
        let Some(end) = self.scan()? else {
            return Ok(None);
        };
        let record = serde_json::from_slice(&self.buf[self.start..end])
            .map_err(|e| ShardError::Decode(e.to_string()))?;
        self.start = end;
        Ok(Some(record))
    }

    /// Advance the scanner; returns the end offset of the current object
    /// once its closing bracket has been seen.
    fn scan(&mut self) -> Result<Option<usize>, ShardError> {
        while self.scanned < self.buf.len() {
            let byte = self.buf[self.scanned];
            self.scanned += 1;

            if self.depth == 0 {
                match byte {
                    b'{' => self.depth = 1,
                    b if b.is_ascii_whitespace() => self.start = self.scanned,
                    other => {
                        return Err(ShardError::Decode(format!(
                            "expected a JSON object, found {:?}",
                            char::from(other)
                        )))
                    }
                }
                continue;
            }

            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if byte == b'\\' {
                    self.escaped = true;
                } else if byte == b'"' {
                    self.in_string = false;
                }
                continue;
            }

            match byte {
                b'"' => self.in_string = true,
                b'{' | b'[' => self.depth += 1,
                b'}' | b']' => {
                    self.depth -= 1;
                    if self.depth == 0 {
                        return Ok(Some(self.scanned));
                    }
                }
                _ => {}
            }
        }
        Ok(None)
    }

    /// Check that the input ended on a record boundary.
    pub fn finish(&self) -> Result<(), ShardError> {
        let rest = &self.buf[self.start..];
        if rest.iter().all(u8::is_ascii_whitespace) {
            Ok(())
        } else {
            Err(ShardError::Decode(format!(
                "unexpected end of stream with {} undecoded bytes",
                rest.len()
            )))
        }
    }
}

/// Lazy, finite, non-restartable sequence of records pulled from a response.
///
/// Dropping the stream drops the underlying connection.
pub struct RecordStream {
    bytes: ByteStream,
    decoder: RecordDecoder,
    done: bool,
}

impl RecordStream {
    pub fn new(bytes: ByteStream) -> Self {
        Self {
            bytes,
            decoder: RecordDecoder::new(),
            done: false,
        }
    }

    /// Stream over in-memory chunks.
    pub fn from_chunks<I>(chunks: I) -> Self
    where
        I: IntoIterator<Item = Vec<u8>>,
        I::IntoIter: Send + 'static,
    {
        Self::new(stream::iter(chunks.into_iter().map(Ok)).boxed())
    }

    /// Pull the next record, reading more of the body only when needed.
    ///
    /// After the first `None` or error, every later call returns `None`.
    pub async fn next_record(&mut self) -> Option<Result<RawRewriteRecord, ShardError>> {
        if self.done {
            return None;
        }
        loop {
            match self.decoder.next_record() {
                Ok(Some(record)) => return Some(Ok(record)),
                Ok(None) => {}
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }

            match self.bytes.next().await {
                Some(Ok(chunk)) => self.decoder.feed(&chunk),
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(e));
                }
                None => {
                    self.done = true;
                    return self.decoder.finish().err().map(Err);
                }
            }
        }
    }
}

impl fmt::Debug for RecordStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordStream")
            .field("decoder", &self.decoder)
            .field("done", &self.done)
            .finish_non_exhaustive()
    }
}
