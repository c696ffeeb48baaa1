use std::io::Write;

use crate::error::PfstatsError;
use crate::monitor::CycleOutcome;

/// Write one cycle as a single-line JSON document.
pub fn write_json(outcome: &CycleOutcome, writer: &mut impl Write) -> Result<(), PfstatsError> {
    serde_json::to_writer(&mut *writer, outcome)
        .map_err(|e| PfstatsError::Serialization(std::io::Error::other(e.to_string())))?;
    writeln!(writer).map_err(PfstatsError::Serialization)
}
