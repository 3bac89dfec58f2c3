use lb_controller_k8s_api::cis::{Port, Tls};
use serde::Serialize;
use std::collections::BTreeMap;

pub type ResourceMap = BTreeMap<String, ResourceConfig>;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PartitionConfig {
    pub resources: ResourceMap,
}

/// A single appliance virtual together with the pools it routes to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceConfig {
    pub virtual_server: Virtual,
    pub pools: Vec<Pool>,
    pub meta: MetaData,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Virtual {
    pub name: String,
    pub partition: String,
    pub enabled: bool,
    pub address: String,
    pub port: u16,
    pub snat: String,
    pub profile_l4: String,
    pub persistence_profile: String,
    pub tcp_client_profile: String,
    pub tcp_server_profile: String,
    pub log_profiles: Vec<String>,
    /// TLS settings by host; hostless virtual servers use the empty host.
    pub tls: BTreeMap<String, Tls>,
    pub rules: Vec<Rule>,
    /// Appliance iRules attached to the virtual, by full path.
    pub irules: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    pub host: String,
    pub path: String,
    pub action: RuleAction,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum RuleAction {
    Forward { pool: String },
    Redirect { port: u16 },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetaData {
    pub kind: ResourceKind,
    pub protocol: Protocol,
    pub namespace: String,
    pub hosts: Vec<String>,
    /// The intent resources (`namespace/name`) this virtual was built from.
    pub base_resources: BTreeMap<String, ResourceKind>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum ResourceKind {
    VirtualServer,
    TransportServer,
    LoadBalancerService,
    IngressLink,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Http,
    Https,
    Tcp,
    Udp,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pool {
    pub name: String,
    pub partition: String,
    pub service_name: String,
    pub service_namespace: String,
    pub service_port: Port,
    pub node_member_label: String,
    pub members: Vec<PoolMember>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct PoolMember {
    pub address: String,
    pub port: u16,
    pub session: Session,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Session {
    UserEnabled,
    UserDisabled,
}

// === impl ResourceConfig ===

impl ResourceConfig {
    pub fn new(
        name: impl Into<String>,
        partition: impl Into<String>,
        address: impl Into<String>,
        port: u16,
        kind: ResourceKind,
        protocol: Protocol,
    ) -> Self {
        Self {
            virtual_server: Virtual {
                name: name.into(),
                partition: partition.into(),
                enabled: true,
                address: address.into(),
                port,
                snat: String::new(),
                profile_l4: String::new(),
                persistence_profile: String::new(),
                tcp_client_profile: String::new(),
                tcp_server_profile: String::new(),
                log_profiles: Vec::new(),
                tls: BTreeMap::new(),
                rules: Vec::new(),
                irules: Vec::new(),
            },
            pools: Vec::new(),
            meta: MetaData {
                kind,
                protocol,
                namespace: String::new(),
                hosts: Vec::new(),
                base_resources: BTreeMap::new(),
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.virtual_server.name
    }

    pub fn add_host(&mut self, host: &str) {
        if !host.is_empty() && !self.meta.hosts.iter().any(|h| h == host) {
            self.meta.hosts.push(host.to_string());
        }
    }

    /// Adds a pool unless one with the same name is already present.
    pub fn add_pool(&mut self, pool: Pool) -> bool {
        if self.pools.iter().any(|p| p.name == pool.name) {
            return false;
        }
        self.pools.push(pool);
        true
    }
}

// === impl PoolMember ===

impl PoolMember {
    pub fn enabled(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
            session: Session::UserEnabled,
        }
    }
}
