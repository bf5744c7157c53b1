//! Writing reports as tests finish

use std::io::{self, Write};

use querybench_core::TestOutcome;

use crate::builder::ReportBuilder;

/// Output style of a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportMode {
    /// Pretty JSON array with one object per test
    Verbose,
    /// One line per run showing the main metric
    Lite,
}

/// Streams test reports to a writer
///
/// Verbose mode opens the JSON array on the first test and closes it in
/// [`finish`](ReportWriter::finish), so a batch aborted by a fatal error
/// still leaves the completed tests on the output.
pub struct ReportWriter<W: Write> {
    out: W,
    builder: ReportBuilder,
    mode: ReportMode,
    written: usize,
}

impl<W: Write> ReportWriter<W> {
    /// Create a writer
    pub fn new(out: W, builder: ReportBuilder, mode: ReportMode) -> Self {
        Self {
            out,
            builder,
            mode,
            written: 0,
        }
    }

    /// Write the report of one finished test
    pub fn write_test(&mut self, outcome: &TestOutcome) -> io::Result<()> {
        match self.mode {
            ReportMode::Verbose => {
                let report = self.builder.build(outcome);
                let json = serde_json::to_string_pretty(&report)?;
                let separator = if self.written == 0 { "[\n" } else { ",\n" };
                write!(self.out, "{}{}", separator, json)?;
            }
            ReportMode::Lite => {
                let text = self.builder.render_lite(outcome);
                if !text.is_empty() {
                    writeln!(self.out, "{}", text)?;
                }
            }
        }
        self.written += 1;
        self.out.flush()
    }

    /// Number of tests written so far
    pub fn written(&self) -> usize {
        self.written
    }

    /// Close the output and return the writer
    pub fn finish(mut self) -> io::Result<W> {
        if self.mode == ReportMode::Verbose {
            if self.written == 0 {
                writeln!(self.out, "[]")?;
            } else {
                writeln!(self.out, "\n]")?;
            }
        }
        self.out.flush()?;
        Ok(self.out)
    }
}

impl<W: Write> std::fmt::Debug for ReportWriter<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReportWriter")
            .field("mode", &self.mode)
            .field("written", &self.written)
            .finish()
    }
}
