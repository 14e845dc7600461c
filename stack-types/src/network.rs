//! Network boundary declaration.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use crate::error::ValidationError;

/// An IPv4 CIDR block.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Cidr {
    base: u32,
    prefix: u8,
}

impl Cidr {
    /// Create a CIDR block, masking off host bits.
    pub fn new(addr: Ipv4Addr, prefix: u8) -> Result<Self, ValidationError> {
        if prefix > 32 {
            return Err(ValidationError::InvalidCidr(format!("{}/{}", addr, prefix)));
        }
        Ok(Self {
            base: u32::from(addr) & mask_bits(prefix),
            prefix,
        })
    }

    /// Prefix length.
    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    /// First address of the block.
    pub fn network(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.base)
    }

    /// Number of `/mask` blocks that fit inside this block.
    pub fn capacity(&self, mask: u8) -> u64 {
        if mask < self.prefix || mask > 32 {
            0
        } else {
            1u64 << (mask - self.prefix)
        }
    }

    /// The `index`-th `/mask` block inside this block.
    pub fn subdivide(&self, mask: u8, index: u32) -> Option<Cidr> {
        if u64::from(index) >= self.capacity(mask) {
            return None;
        }
        let step = if mask == 32 { 1 } else { 1u32 << (32 - mask) };
        Some(Cidr {
            base: self.base + index * step,
            prefix: mask,
        })
    }
}

fn mask_bits(prefix: u8) -> u32 {
    if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(prefix))
    }
}

impl FromStr for Cidr {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, prefix) = s
            .split_once('/')
            .ok_or_else(|| ValidationError::InvalidCidr(s.to_string()))?;
        let addr: Ipv4Addr = addr
            .parse()
            .map_err(|_| ValidationError::InvalidCidr(s.to_string()))?;
        let prefix: u8 = prefix
            .parse()
            .map_err(|_| ValidationError::InvalidCidr(s.to_string()))?;
        Self::new(addr, prefix)
    }
}

impl TryFrom<String> for Cidr {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Cidr> for String {
    fn from(cidr: Cidr) -> Self {
        cidr.to_string()
    }
}

impl fmt::Display for Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network(), self.prefix)
    }
}

impl fmt::Debug for Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cidr({})", self)
    }
}

/// Routing visibility of a subnet group.
///
/// Only public subnets are modeled; the environment has no private tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubnetVisibility {
    /// Routed through an internet gateway.
    Public,
}

/// A subnet group, instantiated once per availability zone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubnetSpec {
    /// Subnet group name.
    pub name: String,
    /// Prefix length of each subnet.
    pub cidr_mask: u8,
    /// Routing visibility.
    pub visibility: SubnetVisibility,
}

impl SubnetSpec {
    /// A public subnet group.
    pub fn public(name: &str, cidr_mask: u8) -> Self {
        Self {
            name: name.into(),
            cidr_mask,
            visibility: SubnetVisibility::Public,
        }
    }
}

/// The isolated network the test environment lives in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkBoundary {
    /// Address range of the whole network.
    pub cidr: Cidr,
    /// Number of availability zones to spread subnets across.
    pub availability_zone_count: u8,
    /// Subnet groups; each one yields a subnet per zone.
    pub subnets: Vec<SubnetSpec>,
}

impl NetworkBoundary {
    /// Default network range.
    pub const DEFAULT_CIDR: &'static str = "10.0.0.0/16";

    /// A network over `10.0.0.0/16` spanning `availability_zone_count` zones.
    pub fn new(availability_zone_count: u8) -> Self {
        Self {
            cidr: Cidr {
                base: u32::from(Ipv4Addr::new(10, 0, 0, 0)),
                prefix: 16,
            },
            availability_zone_count,
            subnets: Vec::new(),
        }
    }

    /// Add a subnet group.
    pub fn with_subnet(mut self, subnet: SubnetSpec) -> Self {
        self.subnets.push(subnet);
        self
    }

    /// Use a different network range.
    pub fn with_cidr(mut self, cidr: Cidr) -> Self {
        self.cidr = cidr;
        self
    }

    /// Allocate subnet blocks: one per (subnet group, zone), in declaration
    /// order. Returns `None` if the blocks do not fit in the network range.
    pub fn subnet_layout(&self) -> Option<Vec<(u8, &SubnetSpec, Cidr)>> {
        let mut layout = Vec::new();
        let mut cursor: u64 = 0;
        for spec in &self.subnets {
            let capacity = self.cidr.capacity(spec.cidr_mask);
            if capacity == 0 {
                return None;
            }
            // Blocks of different masks are aligned by scaling the running offset.
            let block_addrs = 1u64 << (32 - u32::from(spec.cidr_mask));
            let first = cursor.div_ceil(block_addrs);
            for zone in 0..self.availability_zone_count {
                let index = first + u64::from(zone);
                let index = u32::try_from(index).ok()?;
                let cidr = self.cidr.subdivide(spec.cidr_mask, index)?;
                layout.push((zone, spec, cidr));
            }
            cursor = (first + u64::from(self.availability_zone_count)) * block_addrs;
        }
        Some(layout)
    }
}
