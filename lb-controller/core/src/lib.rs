//! The desired configuration of the load-balancing appliance.
//!
//! A [`ResourceStore`] holds, per administrative partition, the local traffic
//! virtuals (with their pools and members) and the global traffic wide IPs.
//! It is computed by the index and handed, serialized, to the agent that
//! applies it.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod gtm;
pub mod ltm;
pub mod naming;

pub use self::{
    gtm::{GslbPool, GtmMonitor, GtmPartitionConfig, WideIp},
    ltm::{
        MetaData, PartitionConfig, Pool, PoolMember, Protocol, ResourceConfig, ResourceKind,
        ResourceMap, Rule, RuleAction, Session, Virtual,
    },
};
use serde::Serialize;
use std::collections::BTreeMap;

/// SNAT setting used when neither the resource nor its policy names one.
pub const DEFAULT_SNAT: &str = "auto";

pub const DEFAULT_PARTITION: &str = "Common";

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ResourceStore {
    pub ltm: BTreeMap<String, PartitionConfig>,
    pub gtm: BTreeMap<String, GtmPartitionConfig>,
}

// === impl ResourceStore ===

impl ResourceStore {
    pub fn partition(&self, partition: &str) -> Option<&PartitionConfig> {
        self.ltm.get(partition)
    }

    pub fn get(&self, partition: &str, name: &str) -> Option<&ResourceConfig> {
        self.ltm.get(partition)?.resources.get(name)
    }

    /// Replaces the resource with the same name in the resource's partition.
    pub fn upsert(&mut self, rs: ResourceConfig) -> Option<ResourceConfig> {
        self.ltm
            .entry(rs.virtual_server.partition.clone())
            .or_default()
            .resources
            .insert(rs.virtual_server.name.clone(), rs)
    }

    pub fn remove(&mut self, partition: &str, name: &str) -> Option<ResourceConfig> {
        self.ltm.get_mut(partition)?.resources.remove(name)
    }

    /// Iterates over all virtuals, in all partitions, serving `host`.
    pub fn resources_for_host<'a>(
        &'a self,
        host: &'a str,
    ) -> impl Iterator<Item = &'a ResourceConfig> + 'a {
        self.ltm
            .values()
            .flat_map(|p| p.resources.values())
            .filter(move |rs| rs.meta.hosts.iter().any(|h| h == host))
    }

    pub fn gtm_partition(&self, partition: &str) -> Option<&GtmPartitionConfig> {
        self.gtm.get(partition)
    }

    pub fn gtm_partition_mut(&mut self, partition: &str) -> &mut GtmPartitionConfig {
        self.gtm.entry(partition.to_string()).or_default()
    }
}
