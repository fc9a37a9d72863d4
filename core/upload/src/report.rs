//! Rendering of upload outcomes.

use std::io::{self, Write};

use crate::outcome::UploadOutcome;

/// Consumes the outcome sequence of a run.
pub trait Reporter {
    /// Report all outcomes of one run.
    fn report(&mut self, outcomes: &[UploadOutcome]) -> io::Result<()>;
}

/// One `[TAG] path: detail` line per outcome.
pub struct ConsoleReporter<W: Write> {
    out: W,
}

impl<W: Write> ConsoleReporter<W> {
    /// Write lines to `out`.
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// Recover the writer.
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl ConsoleReporter<io::Stdout> {
    /// Reporter on standard output.
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> Reporter for ConsoleReporter<W> {
    fn report(&mut self, outcomes: &[UploadOutcome]) -> io::Result<()> {
        for outcome in outcomes {
            writeln!(
                self.out,
                "[{}] {}: {}",
                outcome.status.tag(),
                outcome.path,
                outcome.summary_text()
            )?;
        }
        self.out.flush()
    }
}

/// The outcome sequence as a pretty JSON array.
pub struct JsonReporter<W: Write> {
    out: W,
}

impl<W: Write> JsonReporter<W> {
    /// Write JSON to `out`.
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// Recover the writer.
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Reporter for JsonReporter<W> {
    fn report(&mut self, outcomes: &[UploadOutcome]) -> io::Result<()> {
        serde_json::to_writer_pretty(&mut self.out, outcomes)?;
        writeln!(self.out)?;
        self.out.flush()
    }
}
