//! Load-balancer reconciliation index
//!
//! The index turns intent resources into the configuration of an external
//! load-balancing appliance. It is driven by watch events for the following
//! resources:
//!
//! - A `VirtualServer` exposes L7 routes (host + path) on a virtual address.
//!   Virtual servers sharing a host, a host group or an address are merged
//!   into one appliance virtual per port, subject to port and TLS rules.
//! - A `TransportServer` exposes a single service on an L4 virtual.
//! - A `Service` of type `LoadBalancer` annotated with an IPAM label is
//!   exposed on an address allocated through IPAM.
//! - A `TLSProfile` and a `Policy` decorate the virtuals referencing them.
//! - An `ExternalDNS` publishes the virtuals serving a domain as a wide IP.
//! - An `IngressLink` exposes the oldest service matching its selector on an
//!   L4 virtual per service port.
//! - `Service`, `Pod` and `Node` changes update the members of the pools.
//!
//! ```text
//! [ VirtualServer ]* -> [ virtual/port ] -> [ Pool ] <- [ Service ] <- [ Node | Pod ]
//!                            ^
//!                      [ ExternalDNS ]
//! ```
//!
//! Addresses not given explicitly are requested from an external IPAM
//! provider through a shared `IPAM` resource; processing resumes when the
//! provider publishes the allocation.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod association;
pub mod ipam;
pub mod members;
pub mod nodes;
pub mod ports;
pub mod processor;
mod store;


pub use self::{
    ipam::{Allocator, IpStatus, IpamClient, LabelChangePolicy},
    members::{MemberReconciler, PoolMemberType},
    nodes::{NodeAddressType, NodeInfo, NodeInventory},
    processor::{Processor, ProcessorConfig, SharedProcessor},
    store::Store,
};
use ahash::AHashSet as HashSet;

/// The namespaces whose resources are reconciled.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Namespaces {
    #[default]
    All,
    Only(HashSet<String>),
}

/// Collects the failures of a batch of independent operations.
#[derive(Debug, Default)]
pub struct Errors(Vec<anyhow::Error>);

// === impl Namespaces ===

impl Namespaces {
    pub fn contains(&self, namespace: &str) -> bool {
        match self {
            Self::All => true,
            Self::Only(namespaces) => namespaces.contains(namespace),
        }
    }
}

/// An empty set of namespaces watches all namespaces.
impl FromIterator<String> for Namespaces {
    fn from_iter<T: IntoIterator<Item = String>>(iter: T) -> Self {
        let namespaces = iter.into_iter().collect::<HashSet<_>>();
        if namespaces.is_empty() {
            Self::All
        } else {
            Self::Only(namespaces)
        }
    }
}

// === impl Errors ===

impl Errors {
    pub fn push(&mut self, error: anyhow::Error) {
        self.0.push(error);
    }

    pub fn ok_if_empty(self) -> anyhow::Result<()> {
        if self.0.is_empty() {
            return Ok(());
        }
        Err(anyhow::anyhow!("{}", self))
    }
}

impl std::fmt::Display for Errors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, e) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{e:#}")?;
        }
        Ok(())
    }
}
