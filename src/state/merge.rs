use std::cmp::Ordering;

use crate::model::{FlowRecord, Snapshot};

/// Outcome of pairing one state id across two consecutive snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowEvent<'a> {
    /// Present only in the current snapshot.
    Added(&'a FlowRecord),
    /// Present only in the previous snapshot.
    Removed(&'a FlowRecord),
    /// Present in both.
    Changed {
        current: &'a FlowRecord,
        previous: &'a FlowRecord,
    },
}

impl<'a> FlowEvent<'a> {
    /// The record describing this flow, preferring the current one.
    pub fn record(&self) -> &'a FlowRecord {
        match *self {
            Self::Added(r) | Self::Removed(r) => r,
            Self::Changed { current, .. } => current,
        }
    }

    pub fn id(&self) -> u64 {
        self.record().id
    }
}

/// Lazy merge-join of two id-sorted snapshots.
///
/// Single pass over each input; yields events in ascending id order.
pub struct SnapshotDiff<'a> {
    current: &'a [FlowRecord],
    previous: &'a [FlowRecord],
    i: usize,
    i_prev: usize,
}

/// Pair `current` against `previous` by state id.
pub fn diff<'a>(current: &'a Snapshot, previous: &'a Snapshot) -> SnapshotDiff<'a> {
    SnapshotDiff {
        current: current.records(),
        previous: previous.records(),
        i: 0,
        i_prev: 0,
    }
}

impl<'a> Iterator for SnapshotDiff<'a> {
    type Item = FlowEvent<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let cur = self.current.get(self.i);
        let prev = self.previous.get(self.i_prev);

        match (cur, prev) {
            (None, None) => None,
            (None, Some(p)) => {
                self.i_prev += 1;
                Some(FlowEvent::Removed(p))
            }
            (Some(c), None) => {
                self.i += 1;
                Some(FlowEvent::Added(c))
            }
            (Some(c), Some(p)) => match c.id.cmp(&p.id) {
                Ordering::Greater => {
                    self.i_prev += 1;
                    Some(FlowEvent::Removed(p))
                }
                Ordering::Less => {
                    self.i += 1;
                    Some(FlowEvent::Added(c))
                }
                Ordering::Equal => {
                    self.i += 1;
                    self.i_prev += 1;
                    Some(FlowEvent::Changed {
                        current: c,
                        previous: p,
                    })
                }
            },
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.current.len() - self.i;
        let left_prev = self.previous.len() - self.i_prev;
        (left.max(left_prev), Some(left + left_prev))
    }
}

impl std::iter::FusedIterator for SnapshotDiff<'_> {}
