use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};

use crate::error::PfstatsError;
use crate::state::CycleReport;

pub const DEFAULT_PREFIX: &str = "pfstatsd.";

/// Fire-and-forget statsd counters over UDP, one datagram per counter.
pub struct StatsdClient {
    socket: UdpSocket,
    target: SocketAddr,
    prefix: String,
}

impl StatsdClient {
    /// Resolve `target` (`host:port`) and bind an ephemeral local socket of
    /// the matching family.
    pub fn new(target: &str, prefix: impl Into<String>) -> Result<Self, PfstatsError> {
        let target = target
            .to_socket_addrs()
            .map_err(|e| PfstatsError::InvalidAddress(format!("statsd target {target}: {e}")))?
            .next()
            .ok_or_else(|| {
                PfstatsError::InvalidAddress(format!("statsd target {target} did not resolve"))
            })?;
        let bind: SocketAddr = if target.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            ([0u16; 8], 0).into()
        };
        let socket = UdpSocket::bind(bind).map_err(PfstatsError::SinkIo)?;
        Ok(Self {
            socket,
            target,
            prefix: prefix.into(),
        })
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }

    /// Send one counter. Zero values are skipped.
    pub fn count(&self, name: &str, value: u64) -> Result<(), PfstatsError> {
        if value == 0 {
            return Ok(());
        }
        let line = format_counter(&self.prefix, name, value);
        self.socket
            .send_to(line.as_bytes(), self.target)
            .map_err(PfstatsError::SinkIo)?;
        Ok(())
    }

    /// Publish a cycle's deltas. Failures are logged and otherwise ignored.
    pub fn publish(&self, report: &CycleReport) {
        for (name, value) in counters(report) {
            if let Err(e) = self.count(name, value) {
                log::debug!("statsd {}: {name}: {e}", self.target);
            }
        }
    }
}

/// `<prefix><name>:<value>|c\n`
pub fn format_counter(prefix: &str, name: &str, value: u64) -> String {
    format!("{prefix}{name}:{value}|c\n")
}

fn counters(report: &CycleReport) -> [(&'static str, u64); 6] {
    let d = &report.delta;
    [
        ("bytes.out", d.bytes[0]),
        ("bytes.in", d.bytes[1]),
        ("packets.out", d.packets[0]),
        ("packets.in", d.packets[1]),
        ("states.added", report.added as u64),
        ("states.removed", report.removed as u64),
    ]
}
