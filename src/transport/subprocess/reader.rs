//! Line reading for the child's stdout and stderr

use std::collections::VecDeque;
use std::io;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

use super::config::STDERR_ALERT_MARKERS;

/// One framed line, or notice that an oversized one was dropped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineEvent {
    /// A complete line without its terminator
    Line(String),
    /// A line longer than the limit was discarded
    Oversized {
        /// Bytes discarded
        bytes: usize,
    },
}

/// Newline-delimited reader with a per-line length limit
///
/// Oversized lines are skipped up to the next newline instead of being
/// buffered, so a misbehaving child cannot exhaust memory. Invalid UTF-8 is
/// replaced rather than rejected.
pub struct LineReader<R> {
    inner: BufReader<R>,
    max_len: usize,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    /// Wrap `reader` with a `max_len` byte limit per line
    pub fn new(reader: R, max_len: usize) -> Self {
        Self {
            inner: BufReader::new(reader),
            max_len,
            buf: Vec::new(),
        }
    }

    /// Read the next line; `Ok(None)` at end of stream
    ///
    /// # Errors
    /// Returns the underlying I/O error
    pub async fn next_line(&mut self) -> io::Result<Option<LineEvent>> {
        self.buf.clear();
        let mut dropped: Option<usize> = None;

        loop {
            let available = self.inner.fill_buf().await?;
            if available.is_empty() {
                return Ok(match dropped {
                    Some(bytes) => Some(LineEvent::Oversized { bytes }),
                    None if self.buf.is_empty() => None,
                    None => Some(LineEvent::Line(self.take_line())),
                });
            }

            let newline = available.iter().position(|&b| b == b'\n');
            let chunk = &available[..newline.unwrap_or(available.len())];
            let consumed = newline.map_or(available.len(), |i| i + 1);

            if let Some(bytes) = dropped {
                dropped = Some(bytes + chunk.len());
            } else if self.buf.len() + chunk.len() > self.max_len {
                dropped = Some(self.buf.len() + chunk.len());
                self.buf.clear();
            } else {
                self.buf.extend_from_slice(chunk);
            }

            self.inner.consume(consumed);

            if newline.is_some() {
                return Ok(Some(match dropped {
                    Some(bytes) => LineEvent::Oversized { bytes },
                    None => LineEvent::Line(self.take_line()),
                }));
            }
        }
    }

    fn take_line(&mut self) -> String {
        if self.buf.last() == Some(&b'\r') {
            self.buf.pop();
        }
        let line = String::from_utf8_lossy(&self.buf).into_owned();
        self.buf.clear();
        line
    }
}

/// Whether a stderr line looks like a warning or error worth surfacing
#[must_use]
pub fn is_alert_line(line: &str) -> bool {
    let lower = line.to_lowercase();
    STDERR_ALERT_MARKERS.iter().any(|marker| lower.contains(marker))
}

/// Bounded tail of recent stderr lines
#[derive(Debug, Clone)]
pub struct StderrTail {
    lines: VecDeque<String>,
    capacity: usize,
}

impl StderrTail {
    /// Keep at most `capacity` lines
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Record a line, evicting the oldest when full
    pub fn push(&mut self, line: String) {
        if self.capacity == 0 {
            return;
        }
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    /// Recorded lines, oldest first
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.lines.iter().cloned().collect()
    }

    /// Recorded lines joined with newlines, `None` when empty
    #[must_use]
    pub fn joined(&self) -> Option<String> {
        (!self.lines.is_empty()).then(|| self.lines().join("\n"))
    }

    /// Forget everything recorded so far
    pub fn clear(&mut self) {
        self.lines.clear();
    }
}
