//! Computes the backend members of appliance pools.
//!
//! In node-port mode every selected node is a member, reached on the
//! service's node port. In node-port-local mode each pod is reached through
//! the node port allocated for it by Antrea and published as a pod
//! annotation.

use crate::{nodes::NodeInventory, store::Store, Namespaces};
use ahash::AHashMap as HashMap;
use lb_controller_core::{PoolMember, ResourceConfig};
use lb_controller_k8s_api::{
    cis::Port, labels, IntOrString, Pod, ResourceExt, Service, ServicePort,
};
use serde::Deserialize;
use std::{fmt, str::FromStr};
use tracing::{debug, trace, warn};

/// Pod annotation holding the node-port-local mappings of a pod.
pub const NPL_POD_ANNOTATION: &str = "nodeportlocal.antrea.io";

/// Service annotation enabling node-port-local for the service's pods.
pub const NPL_SERVICE_ANNOTATION: &str = "nodeportlocal.antrea.io/enabled";

/// A single node-port-local mapping.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NplRecord {
    pub pod_port: u16,
    #[serde(rename = "nodeIP")]
    pub node_ip: String,
    pub node_port: u16,
}

/// How the controller reaches backends by default.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum PoolMemberType {
    #[default]
    NodePort,
    NodePortLocal,
}

/// How the members of a particular service are reached.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EndpointMode {
    NodePort,
    NodePortLocal,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PortKey {
    pub name: String,
    pub port: u16,
}

/// The last known state of a service referenced by a pool.
#[derive(Clone, Debug, PartialEq)]
pub struct PoolMembersInfo {
    pub mode: EndpointMode,
    pub ports: Vec<ServicePort>,
    pub selector: labels::Map,
    pub members: HashMap<PortKey, Vec<PoolMember>>,
}

#[derive(Debug, Default)]
pub struct MemberReconciler {
    nodes: NodeInventory,
    services: HashMap<String, PoolMembersInfo>,
    npl: HashMap<String, Vec<NplRecord>>,
    namespaces: Namespaces,
}

// === impl MemberReconciler ===

impl MemberReconciler {
    pub fn new(namespaces: Namespaces) -> Self {
        Self {
            namespaces,
            ..Default::default()
        }
    }

    pub fn nodes(&self) -> &NodeInventory {
        &self.nodes
    }

    /// Replaces the node inventory, returning whether it changed.
    pub fn reset_nodes(&mut self, nodes: NodeInventory) -> bool {
        if self.nodes == nodes {
            return false;
        }
        debug!(nodes = nodes.len(), "Node inventory changed");
        self.nodes = nodes;
        true
    }

    /// One member per node matching `selector`, reached on `node_port`.
    pub fn endpoints_for_node_port(&self, node_port: u16, selector: &str) -> Vec<PoolMember> {
        node_port_members(&self.nodes, node_port, selector)
    }

    /// One member per node-port-local mapping of `pods` for `target_port`.
    pub fn endpoints_for_npl(&self, target_port: &IntOrString, pods: &[Pod]) -> Vec<PoolMember> {
        npl_members(&self.npl, target_port, pods)
    }

    /// Records the node-port-local mappings of a pod, returning whether they
    /// changed.
    pub fn apply_pod(&mut self, pod: &Pod) -> bool {
        let key = pod_key(pod);
        let records = parse_npl_annotation(pod);
        if records.is_empty() {
            return self.npl.remove(&key).is_some();
        }
        if self.npl.get(&key) == Some(&records) {
            return false;
        }
        trace!(pod = %key, records = records.len(), "Updated node-port-local mappings");
        self.npl.insert(key, records);
        true
    }

    pub fn delete_pod(&mut self, namespace: &str, name: &str) -> bool {
        self.npl.remove(&format!("{namespace}/{name}")).is_some()
    }

    pub fn npl_records(&self, namespace: &str, name: &str) -> Option<&[NplRecord]> {
        self.npl
            .get(&format!("{namespace}/{name}"))
            .map(Vec::as_slice)
    }

    /// Refreshes the cached state of a service. Cached members are dropped
    /// when the service's ports or endpoint mode change.
    pub fn apply_service(&mut self, svc: &Service, mode: EndpointMode) {
        let key = service_key(&svc.namespace().unwrap_or_default(), &svc.name_any());
        let spec = svc.spec.clone().unwrap_or_default();
        let ports = spec.ports.unwrap_or_default();
        let selector = spec.selector.unwrap_or_default();

        match self.services.get_mut(&key) {
            Some(info) => {
                if info.mode != mode || info.ports != ports {
                    info.members.clear();
                }
                info.mode = mode;
                info.ports = ports;
                info.selector = selector;
            }
            None => {
                self.services.insert(
                    key,
                    PoolMembersInfo {
                        mode,
                        ports,
                        selector,
                        members: HashMap::default(),
                    },
                );
            }
        }
    }

    pub fn delete_service(&mut self, namespace: &str, name: &str) -> Option<PoolMembersInfo> {
        self.services.remove(&service_key(namespace, name))
    }

    pub fn pool_members_info(&self, namespace: &str, name: &str) -> Option<&PoolMembersInfo> {
        self.services.get(&service_key(namespace, name))
    }

    /// Recomputes the members of the node-port pools of `rs` from the current
    /// node inventory.
    ///
    /// Only pools of services cached in node-port mode are rebuilt; the others
    /// are left untouched.
    pub fn update_pool_members_for_node_port(&mut self, rs: &mut ResourceConfig, namespace: &str) {
        if !self.namespaces.contains(namespace) {
            debug!(%namespace, "Namespace is not watched");
            return;
        }

        for pool in rs.pools.iter_mut() {
            let key = service_key(&pool.service_namespace, &pool.service_name);
            let info = match self.services.get_mut(&key) {
                Some(info) if info.mode == EndpointMode::NodePort => info,
                Some(_) => continue,
                None => {
                    trace!(pool = %pool.name, service = %key, "Service not cached");
                    continue;
                }
            };

            let mut members = Vec::new();
            for sp in info.ports.iter().filter(|sp| port_matches(sp, &pool.service_port)) {
                let node_port = match sp.node_port.and_then(|p| u16::try_from(p).ok()) {
                    Some(p) => p,
                    None => {
                        debug!(service = %key, port = sp.port, "Service port has no node port");
                        continue;
                    }
                };
                let ms = node_port_members(&self.nodes, node_port, &pool.node_member_label);
                members.extend(ms.iter().cloned());
                info.members.insert(PortKey::from(sp), ms);
            }
            pool.members = members;
        }
    }

    /// Recomputes the members of the node-port-local pools of `rs` from the
    /// pods selected by each pool's service.
    pub fn update_pool_members_for_npl<S: Store>(
        &mut self,
        rs: &mut ResourceConfig,
        namespace: &str,
        store: &S,
    ) {
        if !self.namespaces.contains(namespace) {
            debug!(%namespace, "Namespace is not watched");
            return;
        }

        for pool in rs.pools.iter_mut() {
            let key = service_key(&pool.service_namespace, &pool.service_name);
            let info = match self.services.get_mut(&key) {
                Some(info) if info.mode == EndpointMode::NodePortLocal => info,
                _ => continue,
            };

            // A service without a selector has no pods.
            let pods = if info.selector.is_empty() {
                Vec::new()
            } else {
                store.pods_for_selector(&pool.service_namespace, &info.selector)
            };

            let mut members = Vec::new();
            for sp in info.ports.iter().filter(|sp| port_matches(sp, &pool.service_port)) {
                let target = sp
                    .target_port
                    .clone()
                    .unwrap_or(IntOrString::Int(sp.port));
                let ms = npl_members(&self.npl, &target, &pods);
                members.extend(ms.iter().cloned());
                info.members.insert(PortKey::from(sp), ms);
            }
            pool.members = members;
        }
    }
}

/// Looks up the node port exposing `port` of a service.
pub fn node_port(svc: &Service, port: &Port) -> Option<u16> {
    svc.spec
        .as_ref()?
        .ports
        .iter()
        .flatten()
        .find(|sp| port_matches(sp, port))
        .and_then(|sp| sp.node_port)
        .and_then(|p| u16::try_from(p).ok())
}

/// Determines how the members of `svc` are reached.
pub fn endpoint_mode(svc: &Service, member_type: PoolMemberType) -> EndpointMode {
    let npl_enabled = svc
        .annotations()
        .get(NPL_SERVICE_ANNOTATION)
        .map_or(false, |v| v == "true");
    match member_type {
        PoolMemberType::NodePortLocal if npl_enabled => EndpointMode::NodePortLocal,
        _ => EndpointMode::NodePort,
    }
}

pub fn service_key(namespace: &str, name: &str) -> String {
    format!("{namespace}/{name}")
}

fn pod_key(pod: &Pod) -> String {
    format!("{}/{}", pod.namespace().unwrap_or_default(), pod.name_any())
}

fn node_port_members(nodes: &NodeInventory, node_port: u16, selector: &str) -> Vec<PoolMember> {
    nodes
        .select(selector)
        .map(|n| PoolMember::enabled(n.address.clone(), node_port))
        .collect()
}

fn npl_members(
    store: &HashMap<String, Vec<NplRecord>>,
    target_port: &IntOrString,
    pods: &[Pod],
) -> Vec<PoolMember> {
    let mut members = Vec::new();
    for pod in pods {
        let port = match resolve_target_port(target_port, pod) {
            Some(port) => port,
            None => {
                trace!(pod = %pod.name_any(), ?target_port, "Pod does not expose the target port");
                continue;
            }
        };

        let parsed;
        let records = match store.get(&pod_key(pod)) {
            Some(records) => records.as_slice(),
            None => {
                parsed = parse_npl_annotation(pod);
                parsed.as_slice()
            }
        };
        members.extend(
            records
                .iter()
                .filter(|r| r.pod_port == port)
                .map(|r| PoolMember::enabled(r.node_ip.clone(), r.node_port)),
        );
    }
    members
}

/// Resolves a service target port against a pod's container ports.
fn resolve_target_port(target_port: &IntOrString, pod: &Pod) -> Option<u16> {
    match target_port {
        IntOrString::Int(port) => u16::try_from(*port).ok(),
        IntOrString::String(name) => {
            if let Ok(port) = name.parse::<u16>() {
                return Some(port);
            }
            pod.spec
                .as_ref()?
                .containers
                .iter()
                .flat_map(|c| c.ports.iter().flatten())
                .find(|p| p.name.as_deref() == Some(name.as_str()))
                .and_then(|p| u16::try_from(p.container_port).ok())
        }
    }
}

/// Parses a pod's node-port-local annotation. Malformed records are skipped
/// individually.
fn parse_npl_annotation(pod: &Pod) -> Vec<NplRecord> {
    let raw = match pod.annotations().get(NPL_POD_ANNOTATION) {
        Some(raw) => raw,
        None => return Vec::new(),
    };
    let values = match serde_json::from_str::<Vec<serde_json::Value>>(raw) {
        Ok(values) => values,
        Err(error) => {
            warn!(pod = %pod.name_any(), %error, "Invalid node-port-local annotation");
            return Vec::new();
        }
    };
    values
        .into_iter()
        .filter_map(|v| match serde_json::from_value::<NplRecord>(v) {
            Ok(record) => Some(record),
            Err(error) => {
                debug!(pod = %pod.name_any(), %error, "Skipping malformed node-port-local record");
                None
            }
        })
        .collect()
}

fn port_matches(sp: &ServicePort, port: &Port) -> bool {
    match port {
        Port::Number(n) => sp.port == i32::from(n.get()),
        Port::Name(name) => sp.name.as_deref() == Some(name.as_str()),
    }
}

// === impl PortKey ===

impl From<&ServicePort> for PortKey {
    fn from(sp: &ServicePort) -> Self {
        Self {
            name: sp.name.clone().unwrap_or_default(),
            port: u16::try_from(sp.port).unwrap_or_default(),
        }
    }
}

// === impl PoolMemberType ===

impl FromStr for PoolMemberType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "nodeport" => Ok(Self::NodePort),
            "nodeportlocal" => Ok(Self::NodePortLocal),
            s => anyhow::bail!("invalid pool member type: {s:?}"),
        }
    }
}

impl fmt::Display for PoolMemberType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NodePort => f.write_str("nodeport"),
            Self::NodePortLocal => f.write_str("nodeportlocal"),
        }
    }
}
