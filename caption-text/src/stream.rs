//! Line-at-a-time normalization over any buffered reader.

use crate::normalize_sentence;
use serde::Serialize;
use std::error::Error;
use std::fmt;
use std::io::{self, BufRead, Lines};

/// Tokens produced for one non-blank input line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizedLine {
    /// Zero-based line number in the input.
    pub index: usize,
    /// Normalized tokens (may be empty when the line held only punctuation).
    pub tokens: Vec<String>,
}

/// Streaming normalizer yielding one [`NormalizedLine`] per non-blank line.
pub struct LineNormalizer<R> {
    lines: Lines<R>,
    next_index: usize,
}

impl<R: BufRead> LineNormalizer<R> {
    /// Wraps a buffered reader.
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            next_index: 0,
        }
    }
}

impl<R: BufRead> Iterator for LineNormalizer<R> {
    type Item = Result<NormalizedLine, StreamError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let index = self.next_index;
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(source) => return Some(Err(StreamError { line: index, source })),
            };
            self.next_index += 1;
            if line.trim().is_empty() {
                continue;
            }
            return Some(Ok(NormalizedLine {
                index,
                tokens: normalize_sentence(&line),
            }));
        }
    }
}

/// Reading the underlying input failed.
#[derive(Debug)]
pub struct StreamError {
    line: usize,
    source: io::Error,
}

impl StreamError {
    /// Zero-based line number that could not be read.
    pub fn line(&self) -> usize {
        self.line
    }
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to read line {}: {}", self.line + 1, self.source)
    }
}

impl Error for StreamError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.source)
    }
}
