//! Newline-delimited message framing.
//!
//! Reads arrive as arbitrary byte chunks. [`LineBuffer`] carries the partial
//! tail of one chunk over to the next and yields only complete lines, so a
//! message split across reads (or a multi-byte character split across reads)
//! is reassembled before it is parsed.

use tracing::warn;

/// Longest line accepted by default. Servers answer with JSON documents, so
/// this is generous.
pub const DEFAULT_MAX_LINE: usize = 16 * 1024 * 1024;

/// Carry-over buffer that splits a byte stream into lines.
#[derive(Debug)]
pub struct LineBuffer {
    carry: Vec<u8>,
    /// Prefix of `carry` already known to hold no newline.
    scanned: usize,
    max_line: usize,
    /// Dropping the rest of an oversized line until its newline arrives.
    discarding: bool,
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::with_max_line(DEFAULT_MAX_LINE)
    }
}

impl LineBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_max_line(max_line: usize) -> Self {
        Self {
            carry: Vec::new(),
            scanned: 0,
            max_line,
            discarding: false,
        }
    }

    /// Appends `chunk` and returns every line it completed.
    ///
    /// Line terminators (`\n`, optionally preceded by `\r`) are stripped and
    /// blank lines are dropped. Invalid UTF-8 is replaced lossily. A line
    /// longer than the limit is logged and discarded in full.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut chunk = chunk;
        if self.discarding {
            match chunk.iter().position(|&b| b == b'\n') {
                Some(pos) => {
                    self.discarding = false;
                    chunk = &chunk[pos + 1..];
                }
                None => return Vec::new(),
            }
        }
        self.carry.extend_from_slice(chunk);

        let mut lines = Vec::new();
        let mut start = 0;
        let mut search_from = self.scanned;
        while let Some(offset) = self.carry[search_from..].iter().position(|&b| b == b'\n') {
            let end = search_from + offset;
            let mut line = &self.carry[start..end];
            if line.last() == Some(&b'\r') {
                line = &line[..line.len() - 1];
            }
            if line.len() > self.max_line {
                warn!(bytes = line.len(), limit = self.max_line, "Discarding oversized line");
            } else if !line.iter().all(u8::is_ascii_whitespace) {
                lines.push(String::from_utf8_lossy(line).into_owned());
            }
            start = end + 1;
            search_from = start;
        }
        self.carry.drain(..start);

        if self.carry.len() > self.max_line {
            warn!(
                bytes = self.carry.len(),
                limit = self.max_line,
                "Discarding oversized line"
            );
            self.carry.clear();
            self.discarding = true;
        }
        self.scanned = self.carry.len();
        lines
    }

    /// Bytes held back waiting for a newline.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.carry.len()
    }

    /// Returns whatever partial line remains, emptying the buffer.
    pub fn take_remainder(&mut self) -> Option<String> {
        self.scanned = 0;
        self.discarding = false;
        if self.carry.iter().all(u8::is_ascii_whitespace) {
            self.carry.clear();
            return None;
        }
        let rest = String::from_utf8_lossy(&self.carry).trim_end().to_string();
        self.carry.clear();
        Some(rest)
    }
}
