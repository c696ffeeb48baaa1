// Decoder for the `struct pfsync_state` records returned by DIOCGETSTATES.
//
// The kernel hands back a packed array of fixed-size records. Each one is
// copied field by field into a `FlowRecord`; nothing keeps pointing into the
// raw buffer afterwards.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use crate::error::PfstatsError;
use crate::model::{AddrFamily, Direction, FlowCounters, FlowRecord, StateKey};

/// `sizeof(struct pfsync_state)`.
pub const PFSYNC_STATE_SIZE: usize = 264;

pub const AF_INET: u8 = 2;
pub const AF_INET6: u8 = 24;
pub const PF_IN: u8 = 1;
pub const PF_OUT: u8 = 2;

const PF_SK_WIRE: usize = 0;
const PF_SK_STACK: usize = 1;

const IFNAMSIZ: usize = 16;
const PF_ADDR_LEN: usize = 16;

// struct pfsync_state_key: addr[2] (32) | port[2] (4) | rdomain (2) | af (1) | pad (1)
const KEY_SIZE: usize = 40;
const KEY_PORT: usize = 2 * PF_ADDR_LEN;
const KEY_RDOMAIN: usize = KEY_PORT + 4;
const KEY_AF: usize = KEY_RDOMAIN + 2;

// struct pfsync_state field offsets.
const OFF_ID: usize = 0;
const OFF_IFNAME: usize = 8;
const OFF_KEY: usize = OFF_IFNAME + IFNAMSIZ;
const OFF_SRC_PEER: usize = OFF_KEY + 2 * KEY_SIZE;
const PEER_SIZE: usize = 32;
const OFF_RT_ADDR: usize = OFF_SRC_PEER + 2 * PEER_SIZE;
const OFF_RULE: usize = OFF_RT_ADDR + PF_ADDR_LEN;
const OFF_PACKETS: usize = OFF_RULE + 5 * 4; // rule, anchor, nat_rule, creation, expire
const OFF_BYTES: usize = OFF_PACKETS + 16;
const OFF_CREATORID: usize = OFF_BYTES + 16;
const OFF_AF: usize = OFF_CREATORID + 4 + 8 + 2; // creatorid, rtableid[2], max_mss
const OFF_PROTO: usize = OFF_AF + 1;
const OFF_DIRECTION: usize = OFF_PROTO + 1;

const _: () = assert!(OFF_KEY == 24);
const _: () = assert!(OFF_RT_ADDR == 168);
const _: () = assert!(OFF_PACKETS == 204);
const _: () = assert!(OFF_AF == 250);
// direction, then 7 single-byte fields, state_flags and set_prio[2].
const TRAILER_SIZE: usize = 1 + 7 + 2 + 2;
const _: () = assert!(OFF_DIRECTION + TRAILER_SIZE == PFSYNC_STATE_SIZE);

/// Decode a DIOCGETSTATES buffer.
///
/// Fails if the length is not a whole number of records.
pub fn decode_states(buf: &[u8]) -> Result<Vec<FlowRecord>, PfstatsError> {
    if buf.len() % PFSYNC_STATE_SIZE != 0 {
        return Err(PfstatsError::Decode {
            len: buf.len(),
            record_size: PFSYNC_STATE_SIZE,
        });
    }
    Ok(buf.chunks_exact(PFSYNC_STATE_SIZE).map(decode_state).collect())
}

fn decode_state(raw: &[u8]) -> FlowRecord {
    FlowRecord {
        id: be_u64(raw, OFF_ID),
        ifname: ifname(&raw[OFF_IFNAME..OFF_IFNAME + IFNAMSIZ]),
        af: family(raw[OFF_AF]),
        proto: raw[OFF_PROTO],
        direction: if raw[OFF_DIRECTION] == PF_OUT {
            Direction::Out
        } else {
            Direction::In
        },
        wire: decode_key(&raw[OFF_KEY + PF_SK_WIRE * KEY_SIZE..][..KEY_SIZE]),
        stack: decode_key(&raw[OFF_KEY + PF_SK_STACK * KEY_SIZE..][..KEY_SIZE]),
        rt_addr: addr(family(raw[OFF_AF]), &raw[OFF_RT_ADDR..OFF_RT_ADDR + PF_ADDR_LEN]),
        counters: FlowCounters {
            packets: [be_u64(raw, OFF_PACKETS), be_u64(raw, OFF_PACKETS + 8)],
            bytes: [be_u64(raw, OFF_BYTES), be_u64(raw, OFF_BYTES + 8)],
        },
    }
}

fn decode_key(raw: &[u8]) -> StateKey {
    let af = family(raw[KEY_AF]);
    StateKey {
        addrs: [
            addr(af, &raw[..PF_ADDR_LEN]),
            addr(af, &raw[PF_ADDR_LEN..2 * PF_ADDR_LEN]),
        ],
        ports: [
            u16::from_be_bytes([raw[KEY_PORT], raw[KEY_PORT + 1]]),
            u16::from_be_bytes([raw[KEY_PORT + 2], raw[KEY_PORT + 3]]),
        ],
        rdomain: u16::from_be_bytes([raw[KEY_RDOMAIN], raw[KEY_RDOMAIN + 1]]),
        af,
    }
}

fn family(af: u8) -> AddrFamily {
    match af {
        AF_INET => AddrFamily::Inet,
        AF_INET6 => AddrFamily::Inet6,
        other => AddrFamily::Other(other),
    }
}

// pf_addr is a 16-byte union; IPv4 lives in the first four bytes. Unknown
// families keep all 16 bytes so key comparisons stay byte-exact.
fn addr(af: AddrFamily, raw: &[u8]) -> IpAddr {
    match af {
        AddrFamily::Inet => IpAddr::V4(Ipv4Addr::new(raw[0], raw[1], raw[2], raw[3])),
        AddrFamily::Inet6 | AddrFamily::Other(_) => {
            let mut octets = [0u8; 16];
            octets.copy_from_slice(&raw[..16]);
            IpAddr::V6(Ipv6Addr::from(octets))
        }
    }
}

fn ifname(raw: &[u8]) -> String {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

fn be_u64(raw: &[u8], off: usize) -> u64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&raw[off..off + 8]);
    u64::from_be_bytes(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RawKey {
        addrs: [[u8; 4]; 2],
        ports: [u16; 2],
        rdomain: u16,
        af: u8,
    }

    fn put_key(buf: &mut [u8], k: &RawKey) {
        buf[..4].copy_from_slice(&k.addrs[0]);
        buf[16..20].copy_from_slice(&k.addrs[1]);
        buf[KEY_PORT..KEY_PORT + 2].copy_from_slice(&k.ports[0].to_be_bytes());
        buf[KEY_PORT + 2..KEY_PORT + 4].copy_from_slice(&k.ports[1].to_be_bytes());
        buf[KEY_RDOMAIN..KEY_RDOMAIN + 2].copy_from_slice(&k.rdomain.to_be_bytes());
        buf[KEY_AF] = k.af;
    }

    fn raw_state(id: u64, ifname: &str, direction: u8, bytes: [u64; 2], packets: [u64; 2]) -> Vec<u8> {
        let mut buf = vec![0u8; PFSYNC_STATE_SIZE];
        buf[OFF_ID..OFF_ID + 8].copy_from_slice(&id.to_be_bytes());
        buf[OFF_IFNAME..OFF_IFNAME + ifname.len()].copy_from_slice(ifname.as_bytes());
        let key = RawKey {
            addrs: [[8, 8, 8, 8], [10, 0, 0, 5]],
            ports: [53, 40000],
            rdomain: 0,
            af: AF_INET,
        };
        put_key(&mut buf[OFF_KEY..OFF_KEY + KEY_SIZE], &key);
        put_key(&mut buf[OFF_KEY + KEY_SIZE..OFF_KEY + 2 * KEY_SIZE], &key);
        buf[OFF_RT_ADDR..OFF_RT_ADDR + 4].copy_from_slice(&[192, 0, 2, 1]);
        for i in 0..2 {
            let p = OFF_PACKETS + i * 8;
            buf[p..p + 8].copy_from_slice(&packets[i].to_be_bytes());
            let b = OFF_BYTES + i * 8;
            buf[b..b + 8].copy_from_slice(&bytes[i].to_be_bytes());
        }
        buf[OFF_AF] = AF_INET;
        buf[OFF_PROTO] = 17;
        buf[OFF_DIRECTION] = direction;
        buf
    }

    #[test]
    fn ut_decode_empty_buffer() {
        assert!(decode_states(&[]).unwrap().is_empty());
    }

    #[test]
    fn ut_decode_rejects_partial_record() {
        let buf = vec![0u8; PFSYNC_STATE_SIZE + 10];
        match decode_states(&buf) {
            Err(PfstatsError::Decode { len, record_size }) => {
                assert_eq!(len, PFSYNC_STATE_SIZE + 10);
                assert_eq!(record_size, PFSYNC_STATE_SIZE);
            }
            other => panic!("expected Decode error, got {other:?}"),
        }
    }

    #[test]
    fn ut_decode_fields() {
        let buf = raw_state(0x0102_0304_0506_0708, "em0", PF_OUT, [1500, 300], [10, 4]);
        let states = decode_states(&buf).unwrap();
        assert_eq!(states.len(), 1);
        let s = &states[0];

        assert_eq!(s.id, 0x0102_0304_0506_0708);
        assert_eq!(s.ifname, "em0");
        assert_eq!(s.af, AddrFamily::Inet);
        assert_eq!(s.proto, 17);
        assert_eq!(s.direction, Direction::Out);
        assert_eq!(s.counters.bytes, [1500, 300]);
        assert_eq!(s.counters.packets, [10, 4]);
        assert_eq!(s.rt_addr, IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1)));
        assert_eq!(s.wire.addrs[0], IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8)));
        assert_eq!(s.wire.addrs[1], IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5)));
        assert_eq!(s.wire.ports, [53, 40000]);
        assert_eq!(s.wire, s.stack);
    }

    #[test]
    fn ut_record_layout_offsets() {
        assert_eq!(OFF_DIRECTION, 252);
        assert_eq!(OFF_DIRECTION + TRAILER_SIZE, PFSYNC_STATE_SIZE);

        // Trailing bytes after `direction` must not leak into decoded fields.
        let mut buf = raw_state(5, "em0", PF_IN, [7, 8], [1, 2]);
        buf[OFF_DIRECTION + 1..].fill(0xff);
        let s = &decode_states(&buf).unwrap()[0];
        assert_eq!(s.direction, Direction::In);
        assert_eq!(s.counters.bytes, [7, 8]);
    }

    #[test]
    fn ut_decode_multiple_records_in_order() {
        let mut buf = raw_state(9, "em0", PF_IN, [0, 0], [0, 0]);
        buf.extend(raw_state(3, "vio0", PF_OUT, [0, 0], [0, 0]));
        let states = decode_states(&buf).unwrap();
        assert_eq!(states.iter().map(|s| s.id).collect::<Vec<_>>(), vec![9, 3]);
        assert_eq!(states[0].direction, Direction::In);
        assert_eq!(states[1].ifname, "vio0");
    }

    #[test]
    fn ut_decode_full_length_ifname() {
        let buf = raw_state(1, "abcdefghijklmnop", PF_OUT, [0, 0], [0, 0]);
        assert_eq!(decode_states(&buf).unwrap()[0].ifname, "abcdefghijklmnop");
    }

    #[test]
    fn ut_decode_inet6_key() {
        let mut buf = raw_state(1, "em0", PF_OUT, [0, 0], [0, 0]);
        let wire = OFF_KEY;
        buf[wire..wire + 16].copy_from_slice(&Ipv6Addr::LOCALHOST.octets());
        buf[wire + KEY_AF] = AF_INET6;
        let s = &decode_states(&buf).unwrap()[0];
        assert_eq!(s.wire.af, AddrFamily::Inet6);
        assert_eq!(s.wire.addrs[0], IpAddr::V6(Ipv6Addr::LOCALHOST));
        assert_eq!(s.stack.af, AddrFamily::Inet);
    }
}
