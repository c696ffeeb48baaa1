pub mod json;
pub mod text;
pub mod tsv;

use std::io::Write;

use crate::cli::OutputFormat;
use crate::error::PfstatsError;
use crate::monitor::CycleOutcome;

/// Foreground per-cycle report writer.
///
/// Remembers whether the TSV header has gone out so it is written once.
pub struct ReportWriter<W: Write> {
    format: OutputFormat,
    writer: W,
    header_written: bool,
}

impl<W: Write> ReportWriter<W> {
    pub fn new(format: OutputFormat, writer: W) -> Self {
        Self {
            format,
            writer,
            header_written: false,
        }
    }

    pub fn write(&mut self, outcome: &CycleOutcome) -> Result<(), PfstatsError> {
        match self.format {
            OutputFormat::Text => text::write_text(outcome, &mut self.writer)?,
            OutputFormat::Json => json::write_json(outcome, &mut self.writer)?,
            OutputFormat::Tsv => {
                if !self.header_written {
                    tsv::write_header(&mut self.writer)?;
                    self.header_written = true;
                }
                tsv::write_tsv(outcome, &mut self.writer)?;
            }
        }
        self.writer.flush().map_err(PfstatsError::Serialization)
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}
