pub mod rrdcached;
pub mod statsd;

use crate::error::PfstatsError;
use crate::model::traffic::ScopeSet;

pub use self::rrdcached::RrdcachedClient;
pub use self::statsd::StatsdClient;

/// Destination for per-scope time-series updates.
pub trait SeriesSink {
    /// Append one encoded sample to `series`.
    fn update(&mut self, series: &str, timestamp: u64, encoded: &str) -> Result<(), PfstatsError>;

    /// Make previously queued updates for `series` durable.
    fn flush(&mut self, series: &str) -> Result<(), PfstatsError>;
}

impl<T: SeriesSink + ?Sized> SeriesSink for Box<T> {
    fn update(&mut self, series: &str, timestamp: u64, encoded: &str) -> Result<(), PfstatsError> {
        (**self).update(series, timestamp, encoded)
    }

    fn flush(&mut self, series: &str) -> Result<(), PfstatsError> {
        (**self).flush(series)
    }
}

/// Sink used with `--dry-run`: logs updates and writes nothing.
#[derive(Debug, Default)]
pub struct DryRunSink;

impl SeriesSink for DryRunSink {
    fn update(&mut self, series: &str, _timestamp: u64, encoded: &str) -> Result<(), PfstatsError> {
        log::debug!("dry-run: UPDATE {series} {encoded}");
        Ok(())
    }

    fn flush(&mut self, _series: &str) -> Result<(), PfstatsError> {
        Ok(())
    }
}

/// Outcome of one emission pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct EmitSummary {
    pub sent: usize,
    /// Scopes whose emission guard rejected the timestamp.
    pub stale: usize,
    pub failed: usize,
}

impl ScopeSet {
    /// Write every scope with non-zero cumulative counters to `sink`.
    ///
    /// A scope's guard is advanced before its update is sent, so a failed
    /// write is not retried with the same timestamp.
    ///
    /// After a transport error (timeout, hang-up) the remaining scopes are
    /// counted as failed without being sent, so one stalled sink costs at
    /// most one timeout per pass. Their cumulative counters go out next
    /// cycle.
    pub fn emit<K: SeriesSink + ?Sized>(&mut self, timestamp: u64, sink: &mut K) -> EmitSummary {
        let mut summary = EmitSummary::default();
        let mut sink_down = false;
        for scope in self.iter_mut() {
            if scope.counters().is_zero() {
                continue;
            }
            if !scope.advance_guard(timestamp) {
                log::debug!(
                    "{}: timestamp {timestamp} precedes last update {}",
                    scope.series(),
                    scope.last_emitted()
                );
                summary.stale += 1;
                continue;
            }

            if sink_down {
                summary.failed += 1;
                continue;
            }

            let encoded = scope.counters().encode(timestamp);
            let result = sink
                .update(scope.series(), timestamp, &encoded)
                .and_then(|()| sink.flush(scope.series()));
            match result {
                Ok(()) => summary.sent += 1,
                Err(e) => {
                    log::warn!(
                        "{} ({}): {e}",
                        scope.series(),
                        scope.interface().unwrap_or("global")
                    );
                    summary.failed += 1;
                    sink_down = matches!(e, PfstatsError::SinkIo(_));
                }
            }
        }
        if sink_down {
            log::warn!("sink unavailable, skipped the rest of cycle {timestamp}");
        }
        summary
    }
}


#[cfg(test)]
mod tests {
    use super::recording::RecordingSink;
    use super::*;
    use crate::model::traffic::{Bucket, TrafficCounters};
    use std::path::Path;

    fn scopes() -> ScopeSet {
        ScopeSet::new(Path::new("/var/db/rrd"), &["em0".to_string(), "em1".to_string()])
    }

    fn delta(bytes: u64) -> TrafficCounters {
        let mut d = TrafficCounters::default();
        d.add_to(Bucket::LocalToRemote, bytes, 1);
        d
    }

    #[test]
    fn ut_emit_skips_zero_scopes() {
        let mut s = scopes();
        let mut sink = RecordingSink::default();
        assert_eq!(s.emit(100, &mut sink), EmitSummary::default());
        assert!(sink.updates.is_empty());
    }

    #[test]
    fn ut_emit_global_and_interface() {
        let mut s = scopes();
        s.attribute("em0", &delta(50));
        let mut sink = RecordingSink::default();

        let summary = s.emit(100, &mut sink);
        assert_eq!(summary.sent, 2);
        assert_eq!(
            sink.updates,
            vec![
                ("/var/db/rrd/pf.rrd".to_string(), 100, "100:50:0:1:0".to_string()),
                ("/var/db/rrd/pf-em0.rrd".to_string(), 100, "100:50:0:1:0".to_string()),
            ]
        );
        assert_eq!(sink.flushes, vec!["/var/db/rrd/pf.rrd", "/var/db/rrd/pf-em0.rrd"]);
    }

    #[test]
    fn ut_emit_counters_are_cumulative() {
        let mut s = scopes();
        let mut sink = RecordingSink::default();
        s.attribute("em1", &delta(10));
        s.emit(100, &mut sink);
        s.attribute("em1", &delta(5));
        s.emit(101, &mut sink);
        assert_eq!(sink.updates[2].2, "101:15:0:2:0");
    }

    #[test]
    fn ut_emit_guard_rejects_older_timestamp() {
        let mut s = scopes();
        s.attribute("em0", &delta(1));
        let mut sink = RecordingSink::default();

        s.emit(100, &mut sink);
        let summary = s.emit(99, &mut sink);
        assert_eq!(summary.stale, 2);
        assert_eq!(sink.updates.len(), 2);
        assert_eq!(s.global().last_emitted(), 100);
    }

    #[test]
    fn ut_emit_same_timestamp_allowed() {
        let mut s = scopes();
        s.attribute("em0", &delta(1));
        let mut sink = RecordingSink::default();
        s.emit(100, &mut sink);
        assert_eq!(s.emit(100, &mut sink).sent, 2);
    }

    #[test]
    fn ut_emit_failure_is_counted_and_guard_advances() {
        let mut s = scopes();
        s.attribute("em0", &delta(1));
        let mut sink = RecordingSink {
            fail_updates: true,
            ..Default::default()
        };

        let summary = s.emit(100, &mut sink);
        assert_eq!(summary.failed, 2);
        assert_eq!(summary.sent, 0);
        assert_eq!(s.global().last_emitted(), 100);
        assert!(sink.flushes.is_empty());
    }

    #[test]
    fn ut_emit_flush_failure_is_non_fatal() {
        let mut s = scopes();
        s.attribute("em0", &delta(1));
        let mut sink = RecordingSink {
            fail_flushes: true,
            ..Default::default()
        };
        let summary = s.emit(100, &mut sink);
        assert_eq!(summary.failed, 2);
        assert_eq!(sink.updates.len(), 2);
    }

    #[test]
    fn ut_emit_rejection_does_not_stop_pass() {
        let mut s = scopes();
        s.attribute("em0", &delta(1));
        s.attribute("em1", &delta(1));
        let mut sink = RecordingSink {
            fail_updates: true,
            ..Default::default()
        };
        // Every scope is still attempted; rejections are per series.
        assert_eq!(s.emit(100, &mut sink).failed, 3);
    }

    #[test]
    fn ut_emit_transport_error_skips_remaining_scopes() {
        let mut s = scopes();
        s.attribute("em0", &delta(1));
        s.attribute("em1", &delta(1));
        let mut sink = RecordingSink {
            transport_down: true,
            ..Default::default()
        };

        let summary = s.emit(100, &mut sink);
        assert_eq!(summary.failed, 3);
        assert_eq!(summary.sent, 0);
        assert!(sink.flushes.is_empty());

        // The next pass tries again and catches up with cumulative values.
        sink.transport_down = false;
        s.attribute("em0", &delta(2));
        let summary = s.emit(101, &mut sink);
        assert_eq!(summary.sent, 3);
        assert_eq!(sink.updates[0], ("/var/db/rrd/pf.rrd".to_string(), 101, "101:4:0:3:0".to_string()));
    }

    #[test]
    fn ut_dry_run_sink_accepts_everything() {
        let mut s = scopes();
        s.attribute("em0", &delta(1));
        assert_eq!(s.emit(5, &mut DryRunSink).sent, 2);
    }

    #[test]
    fn ut_boxed_sink_dispatch() {
        let mut s = scopes();
        s.attribute("em1", &delta(3));
        let mut sink: Box<dyn SeriesSink> = Box::new(RecordingSink::default());
        assert_eq!(s.emit(7, &mut sink).sent, 2);
    }
}
