//! Incremental parsing of `JSONEachRowWithProgress` responses.
//!
//! The server interleaves result rows with progress objects, one JSON object
//! per line:
//!
//! ```text
//! {"progress":{"read_rows":"8192","read_bytes":"65536","total_rows_to_read":"100000"}}
//! {"row":{"count()":"100000"}}
//! ```
//!
//! Progress counters are cumulative for the query; the parser turns them into
//! deltas so the orchestrator can accumulate them directly.

use querybench_core::{ClientError, StreamEvent};
use serde::Deserialize;

/// Longest line kept in memory (1MB); the rest of a longer line is skipped.
const MAX_LINE_SIZE: usize = 1024 * 1024;

/// Bytes of a skipped line retained to tell what kind of line it was
const OVERSIZED_PREFIX: usize = 64;

// ============================================================================
// Line Splitter
// ============================================================================

/// A line produced by [`LineBuffer`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    /// Complete line, trimmed
    Complete(String),
    /// Line longer than the buffer limit; only its beginning was kept
    Oversized {
        /// Leading bytes of the line
        prefix: String,
    },
}

/// JSON Lines splitter.
///
/// Buffers incoming bytes and yields complete, non-empty lines. Bytes are
/// decoded only once a line is complete, so multi-byte characters may span
/// chunks.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buffer: Vec<u8>,
    /// Prefix of an oversized line whose remainder is being skipped
    skipping: Option<String>,
}

impl LineBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes and return complete lines.
    pub fn feed(&mut self, mut bytes: &[u8]) -> Vec<Line> {
        let mut lines = Vec::new();

        while !bytes.is_empty() {
            let newline = bytes.iter().position(|b| *b == b'\n');

            if let Some(prefix) = self.skipping.take() {
                match newline {
                    Some(pos) => {
                        lines.push(Line::Oversized { prefix });
                        bytes = &bytes[pos + 1..];
                        continue;
                    }
                    None => {
                        self.skipping = Some(prefix);
                        break;
                    }
                }
            }

            match newline {
                Some(pos) => {
                    self.buffer.extend_from_slice(&bytes[..pos]);
                    bytes = &bytes[pos + 1..];
                    let line = String::from_utf8_lossy(&self.buffer).trim().to_string();
                    self.buffer.clear();
                    if !line.is_empty() {
                        lines.push(Line::Complete(line));
                    }
                }
                None => {
                    self.buffer.extend_from_slice(bytes);
                    if self.buffer.len() > MAX_LINE_SIZE {
                        tracing::warn!(
                            limit = MAX_LINE_SIZE,
                            "Response line too long, skipping the rest of it"
                        );
                        let head = &self.buffer[..OVERSIZED_PREFIX.min(self.buffer.len())];
                        self.skipping = Some(String::from_utf8_lossy(head).trim_start().to_string());
                        self.buffer.clear();
                    }
                    break;
                }
            }
        }

        lines
    }

    /// Check if the buffer holds an incomplete line.
    pub fn has_buffered_data(&self) -> bool {
        self.skipping.is_some() || !self.buffer.iter().all(u8::is_ascii_whitespace)
    }
}

/// Whether the leading bytes of a line belong to a `{"row": ...}` object
fn is_row_prefix(prefix: &str) -> bool {
    prefix
        .trim_start()
        .strip_prefix('{')
        .is_some_and(|rest| rest.trim_start().starts_with("\"row\""))
}

// ============================================================================
// Wire Types
// ============================================================================

/// Counter that the server may encode either as a JSON number or a string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Counter {
    Number(u64),
    Text(String),
}

impl Counter {
    fn value(&self) -> u64 {
        match self {
            Counter::Number(n) => *n,
            Counter::Text(s) => s.parse().unwrap_or(0),
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireProgress {
    #[serde(default)]
    read_rows: Option<Counter>,
    #[serde(default)]
    read_bytes: Option<Counter>,
}

#[derive(Debug, Deserialize)]
struct WireLine {
    #[serde(default)]
    progress: Option<WireProgress>,
    #[serde(default)]
    row: Option<serde::de::IgnoredAny>,
    #[serde(default)]
    exception: Option<String>,
}

/// Extract the numeric code from `Code: 60. DB::Exception: ...`.
pub fn parse_exception_code(message: &str) -> Option<i32> {
    let rest = message.trim_start().strip_prefix("Code:")?;
    let digits: String = rest
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

// ============================================================================
// Progress Parser
// ============================================================================

/// Turns response bytes into [`StreamEvent`]s.
#[derive(Debug, Default)]
pub struct ProgressParser {
    lines: LineBuffer,
    read_rows: u64,
    read_bytes: u64,
}

impl ProgressParser {
    /// Create a parser for a fresh query.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes and return the events they complete.
    ///
    /// Consecutive rows within one chunk are reported as a single data event.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Result<StreamEvent, ClientError>> {
        let mut events = Vec::new();
        let mut pending_rows = 0u64;

        for line in self.lines.feed(bytes) {
            let parsed = match line {
                Line::Complete(line) => self.parse_line(&line),
                Line::Oversized { prefix } if is_row_prefix(&prefix) => {
                    Ok(Some(StreamEvent::Data { rows: 1 }))
                }
                Line::Oversized { prefix } => Err(ClientError::Protocol(format!(
                    "response line longer than {} bytes: {}...",
                    MAX_LINE_SIZE,
                    truncate(&prefix, 200)
                ))),
            };
            match parsed {
                Ok(Some(StreamEvent::Data { rows })) => pending_rows += rows,
                Ok(Some(event)) => {
                    flush_rows(&mut events, &mut pending_rows);
                    events.push(Ok(event));
                }
                Ok(None) => {}
                Err(e) => {
                    flush_rows(&mut events, &mut pending_rows);
                    events.push(Err(e));
                }
            }
        }
        flush_rows(&mut events, &mut pending_rows);

        events
    }

    fn parse_line(&mut self, line: &str) -> Result<Option<StreamEvent>, ClientError> {
        let parsed: WireLine = match serde_json::from_str(line) {
            Ok(parsed) => parsed,
            Err(e) => {
                // Errors raised after the headers were sent arrive as plain text
                if let Some(code) = parse_exception_code(line) {
                    return Err(ClientError::Server {
                        code,
                        message: line.to_string(),
                    });
                }
                return Err(ClientError::Protocol(format!(
                    "unparseable response line: {} ({})",
                    truncate(line, 200),
                    e
                )));
            }
        };

        if let Some(message) = parsed.exception {
            return Err(ClientError::Server {
                code: parse_exception_code(&message).unwrap_or(querybench_core::codes::LOGICAL_ERROR),
                message,
            });
        }

        if let Some(progress) = parsed.progress {
            let rows = progress.read_rows.map_or(self.read_rows, |c| c.value());
            let bytes = progress.read_bytes.map_or(self.read_bytes, |c| c.value());
            let event = StreamEvent::Progress {
                rows: rows.saturating_sub(self.read_rows),
                bytes: bytes.saturating_sub(self.read_bytes),
            };
            self.read_rows = self.read_rows.max(rows);
            self.read_bytes = self.read_bytes.max(bytes);
            return Ok(Some(event));
        }

        if parsed.row.is_some() {
            return Ok(Some(StreamEvent::Data { rows: 1 }));
        }

        tracing::trace!(line = %truncate(line, 200), "Ignoring response line");
        Ok(None)
    }

    /// Cumulative rows read reported so far.
    pub fn read_rows(&self) -> u64 {
        self.read_rows
    }

    /// Cumulative bytes read reported so far.
    pub fn read_bytes(&self) -> u64 {
        self.read_bytes
    }

    /// Check if an incomplete line is buffered.
    pub fn has_buffered_data(&self) -> bool {
        self.lines.has_buffered_data()
    }
}

fn flush_rows(events: &mut Vec<Result<StreamEvent, ClientError>>, pending: &mut u64) {
    if *pending > 0 {
        events.push(Ok(StreamEvent::Data { rows: *pending }));
        *pending = 0;
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
