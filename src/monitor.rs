use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use serde::Serialize;

use crate::error::PfstatsError;
use crate::model::Snapshot;
use crate::schedule::{self, Schedule, Tick};
use crate::sink::statsd::StatsdClient;
use crate::sink::{EmitSummary, SeriesSink};
use crate::state::{Accountant, CycleReport};
use crate::system::StateSource;

/// Where the monitor is within a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Sampling,
    Accounting,
    Emitting,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Sampling => "sampling",
            Self::Accounting => "accounting",
            Self::Emitting => "emitting",
        };
        f.write_str(s)
    }
}

/// Everything one cycle produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleOutcome {
    pub timestamp: u64,
    #[serde(flatten)]
    pub report: CycleReport,
    pub emitted: EmitSummary,
}

/// Sample, account and emit on a fixed cadence.
pub struct Monitor<S, K> {
    source: S,
    sink: K,
    accountant: Accountant,
    statsd: Option<StatsdClient>,
    previous: Snapshot,
    phase: Phase,
}

impl<S: StateSource, K: SeriesSink> Monitor<S, K> {
    pub fn new(source: S, sink: K, accountant: Accountant) -> Self {
        Self {
            source,
            sink,
            accountant,
            statsd: None,
            previous: Snapshot::empty(),
            phase: Phase::Idle,
        }
    }

    pub fn with_statsd(mut self, statsd: StatsdClient) -> Self {
        self.statsd = Some(statsd);
        self
    }

    pub fn accountant(&self) -> &Accountant {
        &self.accountant
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn previous(&self) -> &Snapshot {
        &self.previous
    }

    fn enter(&mut self, phase: Phase) {
        log::trace!("{} -> {}", self.phase, phase);
        self.phase = phase;
    }

    /// Take the warm-up snapshot so states that exist at startup are not
    /// counted as new traffic.
    pub fn prime(&mut self) -> Result<usize, PfstatsError> {
        self.previous = self.source.acquire()?;
        log::info!("warm-up snapshot: {} states", self.previous.len());
        Ok(self.previous.len())
    }

    /// Run one sampling, accounting and emitting pass stamped `timestamp`.
    pub fn cycle(&mut self, timestamp: u64) -> Result<CycleOutcome, PfstatsError> {
        self.enter(Phase::Sampling);
        let current = match self.source.acquire() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.enter(Phase::Idle);
                return Err(e);
            }
        };

        self.enter(Phase::Accounting);
        let report = self.accountant.account(&current, &self.previous);
        self.previous = current;

        self.enter(Phase::Emitting);
        let emitted = self.accountant.scopes_mut().emit(timestamp, &mut self.sink);
        if let Some(statsd) = &self.statsd {
            statsd.publish(&report);
        }

        self.enter(Phase::Idle);
        log::debug!(
            "cycle {timestamp}: {} states (+{} -{} ={}), {} series sent, {} failed",
            report.states,
            report.added,
            report.removed,
            report.changed,
            emitted.sent,
            emitted.failed
        );
        Ok(CycleOutcome {
            timestamp,
            report,
            emitted,
        })
    }

    /// Cycle every `interval` until `shutdown` is raised.
    ///
    /// `on_cycle` sees each outcome; an error from it or from acquisition
    /// ends the loop.
    pub fn run<F>(
        &mut self,
        interval: Duration,
        shutdown: &AtomicBool,
        mut on_cycle: F,
    ) -> Result<(), PfstatsError>
    where
        F: FnMut(&CycleOutcome) -> Result<(), PfstatsError>,
    {
        let mut schedule = Schedule::new(interval, Instant::now());
        while !shutdown.load(Ordering::Relaxed) {
            let outcome = self.cycle(unix_now())?;
            on_cycle(&outcome)?;

            let now = Instant::now();
            match schedule.tick(now) {
                Tick::Sleep(remaining) => {
                    if !schedule::sleep_until(now + remaining, shutdown) {
                        break;
                    }
                }
                Tick::Overrun(late) => {
                    log::warn!("cycle overran its deadline by {:.3}s", late.as_secs_f64());
                }
            }
        }
        log::info!("shutdown requested, stopping");
        Ok(())
    }
}

/// Wall-clock seconds since the Unix epoch.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
