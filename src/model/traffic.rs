use std::path::Path;

use rustc_hash::FxHashMap;
use serde::Serialize;

/// Coarse direction of attributed traffic relative to the local prefix.
#[derive(Clone, Copy, Serialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Bucket {
    LocalToRemote = 0,
    RemoteToLocal = 1,
}

/// Cumulative packet/byte counters indexed by [`Bucket`].
#[derive(Clone, Copy, Serialize, Debug, Default, PartialEq, Eq)]
pub struct TrafficCounters {
    pub packets: [u64; 2],
    pub bytes: [u64; 2],
}

impl TrafficCounters {
    pub fn add_to(&mut self, bucket: Bucket, bytes: u64, packets: u64) {
        let i = bucket as usize;
        self.bytes[i] = self.bytes[i].wrapping_add(bytes);
        self.packets[i] = self.packets[i].wrapping_add(packets);
    }

    pub fn add(&mut self, other: &TrafficCounters) {
        for i in 0..2 {
            self.bytes[i] = self.bytes[i].wrapping_add(other.bytes[i]);
            self.packets[i] = self.packets[i].wrapping_add(other.packets[i]);
        }
    }

    pub fn is_zero(&self) -> bool {
        self.packets == [0, 0] && self.bytes == [0, 0]
    }

    /// Encode as an RRD update value: `ts:bytes0:bytes1:packets0:packets1`.
    pub fn encode(&self, timestamp: u64) -> String {
        format!(
            "{}:{}:{}:{}:{}",
            timestamp, self.bytes[0], self.bytes[1], self.packets[0], self.packets[1]
        )
    }
}

/// A named accumulation target: the global scope or one interface.
#[derive(Clone, Debug)]
pub struct Scope {
    series: String,
    interface: Option<String>,
    counters: TrafficCounters,
    last_emitted: u64,
}

impl Scope {
    pub fn new(series: impl Into<String>, interface: Option<String>) -> Self {
        Self {
            series: series.into(),
            interface,
            counters: TrafficCounters::default(),
            last_emitted: 0,
        }
    }

    pub fn series(&self) -> &str {
        &self.series
    }

    pub fn interface(&self) -> Option<&str> {
        self.interface.as_deref()
    }

    pub fn counters(&self) -> &TrafficCounters {
        &self.counters
    }

    pub fn last_emitted(&self) -> u64 {
        self.last_emitted
    }

    pub fn add(&mut self, delta: &TrafficCounters) {
        self.counters.add(delta);
    }

    /// Advance the emission guard to `timestamp`.
    ///
    /// Returns false, leaving the guard untouched, if `timestamp` is older
    /// than the last emission.
    pub fn advance_guard(&mut self, timestamp: u64) -> bool {
        if timestamp < self.last_emitted {
            return false;
        }
        self.last_emitted = timestamp;
        true
    }
}

/// The global scope plus one scope per monitored interface.
#[derive(Clone, Debug)]
pub struct ScopeSet {
    global: Scope,
    interfaces: Vec<Scope>,
    by_name: FxHashMap<String, usize>,
}

impl ScopeSet {
    /// Series are `<dir>/pf.rrd` and `<dir>/pf-<ifname>.rrd`.
    /// Repeated interface names collapse into one scope.
    pub fn new(series_dir: &Path, interfaces: &[String]) -> Self {
        let global = Scope::new(series_dir.join("pf.rrd").to_string_lossy(), None);
        let mut set = Self {
            global,
            interfaces: Vec::with_capacity(interfaces.len()),
            by_name: FxHashMap::default(),
        };
        for name in interfaces {
            if set.by_name.contains_key(name) {
                continue;
            }
            let series = series_dir.join(format!("pf-{name}.rrd"));
            set.by_name.insert(name.clone(), set.interfaces.len());
            set.interfaces
                .push(Scope::new(series.to_string_lossy(), Some(name.clone())));
        }
        set
    }

    pub fn global(&self) -> &Scope {
        &self.global
    }

    pub fn interface(&self, name: &str) -> Option<&Scope> {
        self.by_name.get(name).map(|&i| &self.interfaces[i])
    }

    pub fn interfaces(&self) -> &[Scope] {
        &self.interfaces
    }

    /// Add attributed traffic to the global scope and, if `ifname` is
    /// monitored, to that interface's scope.
    pub fn attribute(&mut self, ifname: &str, delta: &TrafficCounters) {
        self.global.add(delta);
        if let Some(&i) = self.by_name.get(ifname) {
            self.interfaces[i].add(delta);
        }
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Scope> {
        std::iter::once(&mut self.global).chain(self.interfaces.iter_mut())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Scope> {
        std::iter::once(&self.global).chain(self.interfaces.iter())
    }
}
