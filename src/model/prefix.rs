use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

use crate::error::PfstatsError;

/// IPv4 network prefix used to decide whether an address is local.
///
/// Parsed from `address[/length]`. Without a length the mask covers all 32
/// bits, so only the literal address matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressPrefix {
    network: u32,
    mask: u32,
    len: u8,
}

impl AddressPrefix {
    pub fn new(network: Ipv4Addr, len: u8) -> Result<Self, PfstatsError> {
        if len > 32 {
            return Err(PfstatsError::InvalidPrefixLength(len.to_string()));
        }
        Ok(Self {
            network: u32::from(network),
            mask: mask_for(len),
            len,
        })
    }

    pub fn parse(text: &str) -> Result<Self, PfstatsError> {
        let (addr, len) = match text.split_once('/') {
            Some((addr, len)) => (addr, Some(len)),
            None => (text, None),
        };

        let network: Ipv4Addr = addr
            .trim()
            .parse()
            .map_err(|_| PfstatsError::InvalidAddress(addr.to_string()))?;

        let len = match len {
            None => 32,
            Some(raw) => raw
                .trim()
                .parse::<u8>()
                .ok()
                .filter(|l| *l <= 32)
                .ok_or_else(|| PfstatsError::InvalidPrefixLength(raw.to_string()))?,
        };

        Self::new(network, len)
    }

    /// True if `addr` lies inside the prefix. Non-IPv4 addresses never match.
    pub fn matches(&self, addr: IpAddr) -> bool {
        match addr {
            IpAddr::V4(v4) => self.matches_v4(v4),
            IpAddr::V6(_) => false,
        }
    }

    pub fn matches_v4(&self, addr: Ipv4Addr) -> bool {
        (u32::from(addr) & self.mask) == (self.network & self.mask)
    }

    pub fn mask(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.mask)
    }

    pub fn prefix_len(&self) -> u8 {
        self.len
    }
}

// `u32::MAX << 32` overflows; a zero-length prefix masks nothing.
fn mask_for(len: u8) -> u32 {
    u32::MAX.checked_shl(32 - len as u32).unwrap_or(0)
}

impl FromStr for AddressPrefix {
    type Err = PfstatsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for AddressPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", Ipv4Addr::from(self.network), self.len)
    }
}
