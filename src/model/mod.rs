pub mod prefix;
pub mod traffic;

use std::fmt;
use std::net::IpAddr;

use serde::Serialize;

use crate::error::PfstatsError;

/// Address family of a state key, as recorded by pf.
#[derive(Clone, Copy, Serialize, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AddrFamily {
    Inet,
    Inet6,
    Other(u8),
}

/// Direction the state was created in, relative to the interface.
#[derive(Clone, Copy, Serialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    In,
    Out,
}

impl fmt::Display for AddrFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inet => write!(f, "inet"),
            Self::Inet6 => write!(f, "inet6"),
            Self::Other(af) => write!(f, "af={af}"),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::In => write!(f, "in"),
            Self::Out => write!(f, "out"),
        }
    }
}

/// One directional view of a state: the wire-side or the stack-side key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StateKey {
    pub addrs: [IpAddr; 2],
    pub ports: [u16; 2],
    pub rdomain: u16,
    pub af: AddrFamily,
}

/// Packet and byte counters of a state, index 0 and 1 per pf direction.
#[derive(Clone, Copy, Serialize, Debug, Default, PartialEq, Eq)]
pub struct FlowCounters {
    pub packets: [u64; 2],
    pub bytes: [u64; 2],
}

impl FlowCounters {
    /// Per-index `self - earlier`, wrapping if a kernel counter went backwards.
    pub fn wrapping_sub(&self, earlier: &FlowCounters) -> FlowCounters {
        FlowCounters {
            packets: [
                self.packets[0].wrapping_sub(earlier.packets[0]),
                self.packets[1].wrapping_sub(earlier.packets[1]),
            ],
            bytes: [
                self.bytes[0].wrapping_sub(earlier.bytes[0]),
                self.bytes[1].wrapping_sub(earlier.bytes[1]),
            ],
        }
    }

    pub fn is_zero(&self) -> bool {
        self.packets == [0, 0] && self.bytes == [0, 0]
    }
}

/// A pf state entry observed at one sampling instant.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlowRecord {
    pub id: u64,
    pub ifname: String,
    pub af: AddrFamily,
    pub proto: u8,
    pub direction: Direction,
    pub wire: StateKey,
    pub stack: StateKey,
    pub rt_addr: IpAddr,
    pub counters: FlowCounters,
}

impl fmt::Display for FlowRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let key = match self.direction {
            Direction::Out => &self.wire,
            Direction::In => &self.stack,
        };
        let arrow = match self.direction {
            Direction::Out => "->",
            Direction::In => "<-",
        };
        write!(
            f,
            "{} {} {} {}:{} {} {}:{} ({}) bytes={}:{}, packets={}:{}",
            self.id,
            self.ifname,
            proto_name(self.proto),
            key.addrs[1],
            key.ports[1],
            arrow,
            key.addrs[0],
            key.ports[0],
            self.rt_addr,
            self.counters.bytes[0],
            self.counters.bytes[1],
            self.counters.packets[0],
            self.counters.packets[1],
        )
    }
}

pub fn proto_name(proto: u8) -> String {
    match proto {
        1 => "icmp".to_string(),
        6 => "tcp".to_string(),
        17 => "udp".to_string(),
        58 => "icmp6".to_string(),
        other => format!("proto={other}"),
    }
}

/// State records captured at one instant, strictly ascending by id.
///
/// The ordering is established on construction, which is what the
/// merge-join in `state::merge` relies on.
#[derive(Clone, Debug, Default)]
pub struct Snapshot {
    records: Vec<FlowRecord>,
}

impl Snapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Sort records by id. Duplicate ids are rejected.
    pub fn from_unsorted(mut records: Vec<FlowRecord>) -> Result<Self, PfstatsError> {
        records.sort_unstable_by_key(|r| r.id);
        Self::from_sorted(records)
    }

    /// Accept records already sorted by id, verifying strict ascending order.
    pub fn from_sorted(records: Vec<FlowRecord>) -> Result<Self, PfstatsError> {
        if let Some(w) = records.windows(2).find(|w| w[0].id >= w[1].id) {
            return Err(PfstatsError::Ordering {
                prev: w[0].id,
                id: w[1].id,
            });
        }
        Ok(Self { records })
    }

    pub fn records(&self) -> &[FlowRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::bare;
    use super::*;

    #[test]
    fn ut_snapshot_sorts_by_id() {
        let snap = Snapshot::from_unsorted(vec![bare(9), bare(2), bare(5)]).unwrap();
        let ids: Vec<u64> = snap.records().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![2, 5, 9]);
    }

    #[test]
    fn ut_snapshot_rejects_duplicate_id() {
        let err = Snapshot::from_unsorted(vec![bare(3), bare(1), bare(3)]).unwrap_err();
        assert!(matches!(err, PfstatsError::Ordering { prev: 3, id: 3 }));
    }

    #[test]
    fn ut_snapshot_from_sorted_rejects_unsorted() {
        let err = Snapshot::from_sorted(vec![bare(1), bare(4), bare(2)]).unwrap_err();
        assert!(matches!(err, PfstatsError::Ordering { prev: 4, id: 2 }));
    }

    #[test]
    fn ut_counters_wrapping_sub() {
        let cur = FlowCounters {
            packets: [3, 2],
            bytes: [150, 80],
        };
        let prev = FlowCounters {
            packets: [2, 1],
            bytes: [100, 50],
        };
        let d = cur.wrapping_sub(&prev);
        assert_eq!(d.bytes, [50, 30]);
        assert_eq!(d.packets, [1, 1]);
        assert!(cur.wrapping_sub(&cur).is_zero());
    }

    #[test]
    fn ut_record_display() {
        let line = bare(42).to_string();
        assert!(line.starts_with("42 em0 tcp 10.0.0.1:50000 -> 8.8.8.8:443"));
        assert!(line.ends_with("bytes=0:0, packets=0:0"));
    }
}
