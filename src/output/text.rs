use std::io::Write;

use crate::error::PfstatsError;
use crate::monitor::CycleOutcome;

/// `<ts> states=N (+a -r) bytes=out:in, packets=out:in`
pub fn write_text(outcome: &CycleOutcome, writer: &mut impl Write) -> Result<(), PfstatsError> {
    let r = &outcome.report;
    writeln!(
        writer,
        "{} states={} (+{} -{}) bytes={}:{}, packets={}:{}",
        outcome.timestamp,
        r.states,
        r.added,
        r.removed,
        r.delta.bytes[0],
        r.delta.bytes[1],
        r.delta.packets[0],
        r.delta.packets[1],
    )
    .map_err(PfstatsError::Serialization)?;

    if outcome.emitted.failed > 0 {
        writeln!(writer, "  {} series update(s) failed", outcome.emitted.failed)
            .map_err(PfstatsError::Serialization)?;
    }
    Ok(())
}
