//! CDN edge membership by exact CIDR prefix arithmetic.

use ipnetwork::{IpNetwork, IpNetworkError, Ipv4Network, Ipv6Network};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;
use tracing::warn;

use crate::error::RangeError;

/// Bumped whenever the embedded range lists change.
pub const CLOUDFLARE_RANGES_VERSION: &str = "2024-06";

/// https://www.cloudflare.com/ips-v4
pub const CLOUDFLARE_IPV4: &[&str] = &[
    "173.245.48.0/20",
    "103.21.244.0/22",
    "103.22.200.0/22",
    "103.31.4.0/22",
    "141.101.64.0/18",
    "108.162.192.0/18",
    "190.93.240.0/20",
    "188.114.96.0/20",
    "197.234.240.0/22",
    "198.41.128.0/17",
    "162.158.0.0/15",
    "104.16.0.0/13",
    "104.24.0.0/14",
    "172.64.0.0/13",
    "131.0.72.0/22",
];

/// https://www.cloudflare.com/ips-v6
pub const CLOUDFLARE_IPV6: &[&str] = &[
    "2400:cb00::/32",
    "2606:4700::/32",
    "2803:f800::/32",
    "2405:b500::/32",
    "2405:8100::/32",
    "2a06:98c0::/29",
    "2c0f:f248::/32",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CidrBlock {
    V4 { network: u32, prefix: u8 },
    V6 { network: u128, prefix: u8 },
}

fn mask_v4(prefix: u8) -> u32 {
    u32::MAX.checked_shl(32 - u32::from(prefix)).unwrap_or(0)
}

fn mask_v6(prefix: u8) -> u128 {
    u128::MAX.checked_shl(128 - u32::from(prefix)).unwrap_or(0)
}

/// A bare address is a syntax error, not a host route.
fn parse_network(s: &str) -> Result<IpNetwork, RangeError> {
    let s = s.trim();
    if !s.contains('/') {
        return Err(RangeError::Syntax(s.to_string()));
    }
    let parsed = if s.contains(':') {
        Ipv6Network::from_str(s).map(IpNetwork::V6)
    } else {
        Ipv4Network::from_str(s).map(IpNetwork::V4)
    };
    parsed.map_err(|e| match e {
        IpNetworkError::InvalidAddr(_) => RangeError::Address(s.to_string()),
        IpNetworkError::InvalidPrefix => RangeError::Prefix(s.to_string()),
        _ => RangeError::Syntax(s.to_string()),
    })
}

impl CidrBlock {
    /// Parse `address/prefix`. The network is masked down to its prefix;
    /// use [`CidrBlock::is_aligned`] on the raw text to detect host bits.
    pub fn parse(s: &str) -> Result<Self, RangeError> {
        Ok(match parse_network(s)? {
            IpNetwork::V4(n) => CidrBlock::V4 { network: u32::from(n.network()), prefix: n.prefix() },
            IpNetwork::V6(n) => CidrBlock::V6 { network: u128::from(n.network()), prefix: n.prefix() },
        })
    }

    /// Whether the written network address has no bits past its prefix.
    pub fn is_aligned(s: &str) -> Result<bool, RangeError> {
        let net = parse_network(s)?;
        Ok(net.ip() == net.network())
    }

    pub fn prefix(&self) -> u8 {
        match *self {
            CidrBlock::V4 { prefix, .. } | CidrBlock::V6 { prefix, .. } => prefix,
        }
    }

    pub fn contains(&self, ip: IpAddr) -> bool {
        match (*self, ip) {
            (CidrBlock::V4 { network, prefix }, IpAddr::V4(a)) => {
                let mask = mask_v4(prefix);
                (u32::from(a) & mask) == (network & mask)
            }
            (CidrBlock::V6 { network, prefix }, IpAddr::V6(a)) => {
                let mask = mask_v6(prefix);
                (u128::from(a) & mask) == (network & mask)
            }
            _ => false,
        }
    }
}

impl fmt::Display for CidrBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            CidrBlock::V4 { network, prefix } => write!(f, "{}/{}", Ipv4Addr::from(network), prefix),
            CidrBlock::V6 { network, prefix } => write!(f, "{}/{}", Ipv6Addr::from(network), prefix),
        }
    }
}

impl FromStr for CidrBlock {
    type Err = RangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// A published set of edge network blocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeRanges {
    blocks: Vec<CidrBlock>,
    misaligned: Vec<String>,
}

impl EdgeRanges {
    pub fn cloudflare() -> Self {
        Self::parse(CLOUDFLARE_IPV4.iter().chain(CLOUDFLARE_IPV6)).expect("embedded Cloudflare ranges are valid CIDR")
    }

    pub fn empty() -> Self {
        Self { blocks: Vec::new(), misaligned: Vec::new() }
    }

    /// Parse CIDR lines; blank lines and `#` comments are skipped.
    pub fn parse<I, S>(lines: I) -> Result<Self, RangeError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut blocks = Vec::new();
        let mut misaligned = Vec::new();
        for line in lines {
            let line = line.as_ref().trim();
            if line.is_empty() || line.starts_with('#') { continue; }
            if !CidrBlock::is_aligned(line)? {
                warn!(range = line, "network address has host bits set; matching on the masked prefix");
                misaligned.push(line.to_string());
            }
            blocks.push(CidrBlock::parse(line)?);
        }
        Ok(Self { blocks, misaligned })
    }

    pub fn blocks(&self) -> &[CidrBlock] { &self.blocks }

    /// Lines whose network address was not aligned to the declared prefix.
    pub fn misaligned(&self) -> &[String] { &self.misaligned }

    pub fn contains(&self, ip: IpAddr) -> bool {
        self.blocks.iter().any(|b| b.contains(ip))
    }

    /// `None` is never a member.
    pub fn classify(&self, ip: Option<IpAddr>) -> bool {
        ip.map_or(false, |ip| self.contains(ip))
    }
}

impl Default for EdgeRanges {
    fn default() -> Self {
        Self::cloudflare()
    }
}
