//! Builds the appliance configuration from intent resources.
//!
//! The processor is owned by the task handling watch events; each `process_*`
//! operation is synchronous and runs to completion before the next event is
//! handled. Configuration is only modified once everything it depends on
//! (addresses, TLS profiles, policies) is known, so that a failed operation
//! leaves the previous configuration in place.

mod external_dns;
mod filters;
mod ingress_link;
mod service;
mod transport_server;
mod virtual_server;

pub use self::filters::{
    ingress_links_for_service, sort_services_by_creation, transport_servers_for_service,
    virtual_servers_for_policy, virtual_servers_for_service, virtual_servers_for_tls_profile,
};
use crate::{
    ipam::{Allocator, IpStatus},
    members::{self, MemberReconciler, PoolMemberType},
    store::Store,
    Namespaces,
};
use anyhow::{anyhow, bail, Context, Result};
use lb_controller_core::{
    ResourceConfig, ResourceKind, ResourceStore, Virtual, DEFAULT_PARTITION, DEFAULT_SNAT,
};
use lb_controller_k8s_api::cis::PolicySpec;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info};

/// Annotation selecting the IPAM label of a `LoadBalancer` service.
pub const IPAM_LABEL_ANNOTATION: &str = "lbctl.dev/ipamLabel";

/// Annotation naming the policy applied to a `LoadBalancer` service.
pub const POLICY_NAME_ANNOTATION: &str = "lbctl.dev/policyName";

#[derive(Clone, Debug)]
pub struct ProcessorConfig {
    /// The partition used by resources that do not name one.
    pub partition: String,

    /// The SNAT used when neither a resource nor its policy sets one.
    pub default_snat: String,

    pub pool_member_type: PoolMemberType,

    pub namespaces: Namespaces,

    /// The appliance's host, used to name GSLB pools.
    pub appliance_host: String,
}

pub type SharedProcessor<S> = Arc<RwLock<Processor<S>>>;

#[derive(Debug)]
pub struct Processor<S> {
    config: ProcessorConfig,
    store: S,
    ipam: Option<Allocator>,
    members: MemberReconciler,
    resources: ResourceStore,
}

// === impl ProcessorConfig ===

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            partition: DEFAULT_PARTITION.to_string(),
            default_snat: DEFAULT_SNAT.to_string(),
            pool_member_type: PoolMemberType::default(),
            namespaces: Namespaces::default(),
            appliance_host: String::new(),
        }
    }
}

// === impl Processor ===

impl<S: Store> Processor<S> {
    pub fn new(config: ProcessorConfig, store: S, ipam: Option<Allocator>) -> Self {
        let members = MemberReconciler::new(config.namespaces.clone());
        Self {
            config,
            store,
            ipam,
            members,
            resources: ResourceStore::default(),
        }
    }

    pub fn shared(config: ProcessorConfig, store: S, ipam: Option<Allocator>) -> SharedProcessor<S> {
        Arc::new(RwLock::new(Self::new(config, store, ipam)))
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    pub fn resources(&self) -> &ResourceStore {
        &self.resources
    }

    pub fn members(&self) -> &MemberReconciler {
        &self.members
    }

    pub fn ipam(&self) -> Option<&Allocator> {
        self.ipam.as_ref()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn partition_for(&self, partition: &str) -> String {
        if partition.is_empty() {
            self.config.partition.clone()
        } else {
            partition.to_string()
        }
    }

    /// Looks up a referenced policy. An unset reference is not an error; a
    /// dangling one is.
    fn lookup_policy(&self, namespace: &str, name: &str) -> Result<Option<PolicySpec>> {
        if name.is_empty() {
            return Ok(None);
        }
        self.store
            .policy(namespace, name)
            .map(|p| Some(p.spec))
            .ok_or_else(|| anyhow!("policy {namespace}/{name} not found"))
    }

    /// Requests an address for `key`, returning it once allocated.
    fn allocated_address(ipam: &Allocator, label: &str, host: &str, key: &str) -> Result<Option<String>> {
        let status = ipam
            .request_ip(label, host, key)
            .with_context(|| format!("failed to request an address for {host}{key}"))?;
        match status {
            IpStatus::Allocated(ip) => Ok(Some(ip)),
            IpStatus::NotRequested => {
                bail!("stale IPAM allocation for label {label:?}; the request will be retried")
            }
            status => {
                debug!(?status, %label, %host, %key, "Address not allocated");
                Ok(None)
            }
        }
    }

    /// Refreshes the cached services of `rs`'s pools and recomputes their
    /// members.
    fn sync_members(&mut self, rs: &mut ResourceConfig, namespace: &str) {
        for pool in &rs.pools {
            match self.store.service(&pool.service_namespace, &pool.service_name) {
                Some(svc) => {
                    let mode = members::endpoint_mode(&svc, self.config.pool_member_type);
                    self.members.apply_service(&svc, mode);
                }
                None => {
                    self.members
                        .delete_service(&pool.service_namespace, &pool.service_name);
                }
            }
        }
        self.members.update_pool_members_for_node_port(rs, namespace);
        self.members
            .update_pool_members_for_npl(rs, namespace, &self.store);
    }

    /// Removes the virtuals built from the `kind` resource `base` other than
    /// `keep` in `partition`, e.g. after an address, port or partition change.
    fn remove_superseded(
        &mut self,
        partition: &str,
        base: &str,
        kind: ResourceKind,
        keep: &[String],
    ) -> Vec<ResourceConfig> {
        let mut removed = Vec::new();
        for (p, config) in self.resources.ltm.iter_mut() {
            let superseded = config
                .resources
                .iter()
                .filter(|&(name, rs)| {
                    rs.meta.base_resources.get(base) == Some(&kind)
                        && !(p == partition && keep.contains(name))
                })
                .map(|(name, _)| name.clone())
                .collect::<Vec<_>>();
            for name in superseded {
                if let Some(rs) = config.resources.remove(&name) {
                    info!(%name, %base, "Removed superseded virtual");
                    removed.push(rs);
                }
            }
        }
        removed
    }
}

/// Applies a policy's profiles and resolves the SNAT of a virtual: the
/// resource's own setting, then the policy's, then the default.
fn apply_policy(vs: &mut Virtual, policy: Option<&PolicySpec>, snat: &str, default_snat: &str) {
    if let Some(policy) = policy {
        let profiles = &policy.profiles;
        vs.profile_l4 = profiles.profile_l4.clone();
        vs.persistence_profile = profiles.persistence_profile.clone();
        vs.tcp_client_profile = profiles.tcp.client.clone();
        vs.tcp_server_profile = profiles.tcp.server.clone();
        vs.log_profiles = profiles.log_profiles.clone();
    }

    let policy_snat = policy.map_or("", |p| p.snat.as_str());
    vs.snat = [snat, policy_snat]
        .into_iter()
        .find(|s| !s.is_empty())
        .unwrap_or(default_snat)
        .to_string();
}
