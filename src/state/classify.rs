use crate::model::{AddrFamily, Direction, FlowRecord, StateKey};

/// How a state's counters and keys map onto traffic directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    /// IPv4 and untouched by NAT: wire and stack keys are identical.
    pub is_simple: bool,
    /// Address-family translation (af-to): wire and stack families differ.
    pub translated: bool,
    /// Counter index carrying traffic sent from the key's `addrs[1]` side.
    pub outbound_index: usize,
}

impl Classification {
    pub fn inbound_index(&self) -> usize {
        1 - self.outbound_index
    }

    /// Key whose `addrs[1] -> addrs[0]` describes the outbound slice.
    pub fn outbound_view<'a>(&self, record: &'a FlowRecord) -> &'a StateKey {
        if self.translated {
            &record.stack
        } else {
            &record.wire
        }
    }

    /// Key whose `addrs[0] -> addrs[1]` describes the inbound slice.
    pub fn inbound_view<'a>(&self, record: &'a FlowRecord) -> &'a StateKey {
        &record.stack
    }
}

pub fn classify(record: &FlowRecord) -> Classification {
    let translated = record.wire.af != record.stack.af;
    let outbound_index = if translated || record.direction == Direction::Out {
        0
    } else {
        1
    };
    Classification {
        is_simple: is_simple(record),
        translated,
        outbound_index,
    }
}

fn is_simple(record: &FlowRecord) -> bool {
    record.af == AddrFamily::Inet && (0..2).all(|idx| same_endpoint(&record.stack, &record.wire, idx))
}

fn same_endpoint(stack: &StateKey, wire: &StateKey, idx: usize) -> bool {
    stack.af == wire.af
        && stack.addrs[idx] == wire.addrs[idx]
        && stack.ports[idx] == wire.ports[idx]
        && stack.rdomain == wire.rdomain
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures::simple_record;
    use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

    fn record(direction: Direction) -> FlowRecord {
        simple_record(
            1,
            "em0",
            direction,
            [Ipv4Addr::new(8, 8, 8, 8), Ipv4Addr::new(10, 0, 0, 5)],
            [0, 0],
            [0, 0],
        )
    }

    #[test]
    fn ut_classify_simple_out() {
        let c = classify(&record(Direction::Out));
        assert!(c.is_simple);
        assert!(!c.translated);
        assert_eq!(c.outbound_index, 0);
        assert_eq!(c.inbound_index(), 1);
    }

    #[test]
    fn ut_classify_simple_in() {
        let c = classify(&record(Direction::In));
        assert!(c.is_simple);
        assert_eq!(c.outbound_index, 1);
        assert_eq!(c.inbound_index(), 0);
    }

    #[test]
    fn ut_classify_nat_port_rewrite_not_simple() {
        let mut r = record(Direction::Out);
        r.wire.ports[1] = 61000;
        r.wire.addrs[1] = IpAddr::V4(Ipv4Addr::new(203, 0, 113, 1));
        let c = classify(&r);
        assert!(!c.is_simple);
        assert!(!c.translated);
        assert_eq!(c.outbound_index, 0);
    }

    #[test]
    fn ut_classify_rdomain_mismatch_not_simple() {
        let mut r = record(Direction::In);
        r.wire.rdomain = 3;
        assert!(!classify(&r).is_simple);
    }

    #[test]
    fn ut_classify_ipv6_never_simple() {
        let mut r = record(Direction::Out);
        r.af = AddrFamily::Inet6;
        assert!(!classify(&r).is_simple);
    }

    #[test]
    fn ut_classify_af_translation_forces_index_0() {
        let mut r = record(Direction::In);
        r.wire.af = AddrFamily::Inet6;
        r.wire.addrs = [
            IpAddr::V6(Ipv6Addr::new(0x64, 0xff9b, 0, 0, 0, 0, 0x0808, 0x0808)),
            IpAddr::V6(Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 5)),
        ];
        let c = classify(&r);
        assert!(c.translated);
        assert!(!c.is_simple);
        assert_eq!(c.outbound_index, 0);
        assert!(std::ptr::eq(c.outbound_view(&r), &r.stack));
    }

    #[test]
    fn ut_classify_views_untranslated() {
        let r = record(Direction::Out);
        let c = classify(&r);
        assert!(std::ptr::eq(c.outbound_view(&r), &r.wire));
        assert!(std::ptr::eq(c.inbound_view(&r), &r.stack));
    }

    // Both records of a continuing flow classify identically.
    #[test]
    fn ut_classify_stable_across_samples() {
        let prev = record(Direction::Out);
        let mut cur = prev.clone();
        cur.counters.bytes = [999, 1];
        assert_eq!(classify(&prev), classify(&cur));
    }
}
