//! Streaming output of ingest reports as JSON or JSONL.
//!
//! Reports are written as they complete, so a long batch can be followed
//! with `tail -f`. JSON output is a single array that is opened on the first
//! write and closed by [`OutputWriter::finish`].

use std::collections::BTreeMap;
use std::io::{self, Write};

use serde::Serialize;

use crate::error::FailureKind;
use crate::types::IngestReport;

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// One JSON array
    Json,
    /// One JSON object per line (newline-delimited JSON)
    JsonLines,
}

impl OutputFormat {
    /// Parse format from string (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "json" => Some(Self::Json),
            "jsonl" | "jsonlines" | "ndjson" => Some(Self::JsonLines),
            _ => None,
        }
    }
}

/// Totals for a finished batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub stored: usize,
    pub failed: usize,
    /// Failure counts keyed by kind
    pub failures: BTreeMap<String, usize>,
}

impl BatchSummary {
    fn record(&mut self, report: &IngestReport) {
        match report.failure {
            None => self.stored += 1,
            Some(kind) => {
                self.failed += 1;
                *self.failures.entry(kind.as_str().to_string()).or_default() += 1;
            }
        }
    }

    pub fn total(&self) -> usize {
        self.stored + self.failed
    }

    pub fn count(&self, kind: FailureKind) -> usize {
        self.failures.get(kind.as_str()).copied().unwrap_or(0)
    }
}

/// Writes reports one at a time and tallies them.
pub struct OutputWriter<W: Write> {
    writer: W,
    format: OutputFormat,
    summary: BatchSummary,
}

impl<W: Write> OutputWriter<W> {
    pub fn new(writer: W, format: OutputFormat) -> Self {
        Self {
            writer,
            format,
            summary: BatchSummary::default(),
        }
    }

    /// Write one report and flush, so partial batches are never lost.
    pub fn write(&mut self, report: &IngestReport) -> io::Result<()> {
        match self.format {
            OutputFormat::Json => {
                let sep = if self.summary.total() == 0 { "[\n  " } else { ",\n  " };
                self.writer.write_all(sep.as_bytes())?;
                serde_json::to_writer(&mut self.writer, report).map_err(io::Error::other)?;
            }
            OutputFormat::JsonLines => {
                serde_json::to_writer(&mut self.writer, report).map_err(io::Error::other)?;
                writeln!(self.writer)?;
            }
        }
        self.summary.record(report);
        self.writer.flush()
    }

    pub fn summary(&self) -> &BatchSummary {
        &self.summary
    }

    /// Close the JSON array (if any) and return the totals.
    pub fn finish(mut self) -> io::Result<BatchSummary> {
        if self.format == OutputFormat::Json {
            if self.summary.total() == 0 {
                self.writer.write_all(b"[]\n")?;
            } else {
                self.writer.write_all(b"\n]\n")?;
            }
        }
        self.writer.flush()?;
        Ok(self.summary)
    }
}

/// Serialize a single report to a JSON string.
pub fn to_json<T: Serialize>(item: &T, pretty: bool) -> Result<String, serde_json::Error> {
    if pretty {
        serde_json::to_string_pretty(item)
    } else {
        serde_json::to_string(item)
    }
}
