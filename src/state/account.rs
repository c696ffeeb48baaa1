use serde::Serialize;

use crate::model::prefix::AddressPrefix;
use crate::model::traffic::{Bucket, ScopeSet, TrafficCounters};
use crate::model::{FlowCounters, FlowRecord, Snapshot, StateKey};
use crate::state::classify::{Classification, classify};
use crate::state::merge::{FlowEvent, diff};

/// Which states take part in accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowFilter {
    /// Every state.
    #[default]
    All,
    /// Only states untouched by NAT.
    SimpleOnly,
    /// Only NAT-translated states, so a gateway does not count both the
    /// inside and outside state of one connection.
    TranslatedOnly,
}

impl FlowFilter {
    pub fn admits(&self, class: &Classification) -> bool {
        match self {
            Self::All => true,
            Self::SimpleOnly => class.is_simple,
            Self::TranslatedOnly => !class.is_simple,
        }
    }
}

/// Summary of one accounting pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub states: usize,
    pub added: usize,
    pub removed: usize,
    pub changed: usize,
    pub filtered: usize,
    /// Traffic attributed to the global scope during this pass.
    pub delta: TrafficCounters,
}

/// Turns flow events into scope counters.
pub struct Accountant {
    local: AddressPrefix,
    filter: FlowFilter,
    scopes: ScopeSet,
}

impl Accountant {
    pub fn new(local: AddressPrefix, filter: FlowFilter, scopes: ScopeSet) -> Self {
        Self {
            local,
            filter,
            scopes,
        }
    }

    pub fn scopes(&self) -> &ScopeSet {
        &self.scopes
    }

    pub fn scopes_mut(&mut self) -> &mut ScopeSet {
        &mut self.scopes
    }

    /// Account every event between two consecutive snapshots.
    pub fn account(&mut self, current: &Snapshot, previous: &Snapshot) -> CycleReport {
        let mut report = CycleReport {
            states: current.len(),
            ..CycleReport::default()
        };

        for event in diff(current, previous) {
            match event {
                FlowEvent::Added(_) => report.added += 1,
                FlowEvent::Removed(_) => report.removed += 1,
                FlowEvent::Changed { .. } => report.changed += 1,
            }
            match self.apply(&event) {
                Applied::Filtered => report.filtered += 1,
                Applied::Counted(delta) => report.delta.add(&delta),
                Applied::Nothing => {}
            }
        }

        report
    }

    /// Account a single event against the scopes.
    pub fn apply(&mut self, event: &FlowEvent<'_>) -> Applied {
        let record = event.record();
        let class = classify(record);
        if !self.filter.admits(&class) {
            return Applied::Filtered;
        }

        let delta = match *event {
            // The traffic between the last sample and the state's removal is
            // not observable any more and stays uncounted.
            FlowEvent::Removed(_) => return Applied::Nothing,
            FlowEvent::Added(current) => current.counters,
            FlowEvent::Changed { current, previous } => {
                current.counters.wrapping_sub(&previous.counters)
            }
        };

        log::trace!("{record} delta={:?}", delta.bytes);

        let attributed = attribute(&self.local, record, &class, &delta);
        if attributed.is_zero() {
            return Applied::Nothing;
        }
        self.scopes.attribute(&record.ifname, &attributed);
        Applied::Counted(attributed)
    }
}

/// Result of [`Accountant::apply`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Filtered,
    Nothing,
    Counted(TrafficCounters),
}

/// Split a flow delta into local→remote and remote→local traffic.
///
/// Each direction of the state is checked on its own; a slice whose
/// endpoints are both local or both remote does not cross the boundary
/// and is dropped.
pub fn attribute(
    local: &AddressPrefix,
    record: &FlowRecord,
    class: &Classification,
    delta: &FlowCounters,
) -> TrafficCounters {
    let mut out = TrafficCounters::default();

    let idx = class.outbound_index;
    if delta.bytes[idx] > 0 {
        let key = class.outbound_view(record);
        account_slice(local, key, 1, 0, delta.bytes[idx], delta.packets[idx], &mut out);
    }

    let idx = class.inbound_index();
    if delta.bytes[idx] > 0 {
        let key = class.inbound_view(record);
        account_slice(local, key, 0, 1, delta.bytes[idx], delta.packets[idx], &mut out);
    }

    out
}

fn account_slice(
    local: &AddressPrefix,
    key: &StateKey,
    src: usize,
    dst: usize,
    bytes: u64,
    packets: u64,
    out: &mut TrafficCounters,
) {
    let src_local = local.matches(key.addrs[src]);
    let dst_local = local.matches(key.addrs[dst]);
    if src_local == dst_local {
        return;
    }
    let bucket = if src_local {
        Bucket::LocalToRemote
    } else {
        Bucket::RemoteToLocal
    };
    out.add_to(bucket, bytes, packets);
}
