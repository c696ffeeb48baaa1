use std::io::Write;

use crate::error::PfstatsError;
use crate::monitor::CycleOutcome;

const HEADER: &str = "timestamp\tstates\tadded\tremoved\tchanged\tfiltered\t\
                      bytes_out\tbytes_in\tpackets_out\tpackets_in\tsent\tstale\tfailed";

pub fn write_header(writer: &mut impl Write) -> Result<(), PfstatsError> {
    writeln!(writer, "{HEADER}").map_err(PfstatsError::Serialization)
}

/// Write one cycle as a tab-separated row matching [`write_header`].
pub fn write_tsv(outcome: &CycleOutcome, writer: &mut impl Write) -> Result<(), PfstatsError> {
    let r = &outcome.report;
    let e = &outcome.emitted;
    writeln!(
        writer,
        "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
        outcome.timestamp,
        r.states,
        r.added,
        r.removed,
        r.changed,
        r.filtered,
        r.delta.bytes[0],
        r.delta.bytes[1],
        r.delta.packets[0],
        r.delta.packets[1],
        e.sent,
        e.stale,
        e.failed,
    )
    .map_err(PfstatsError::Serialization)
}
