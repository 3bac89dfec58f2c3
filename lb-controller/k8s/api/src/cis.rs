//! Intent resources describing how traffic should be exposed through the
//! load-balancing appliance.

pub mod external_dns;
pub mod ingress_link;
pub mod policy;
pub mod tls_profile;
pub mod transport_server;
pub mod virtual_server;

pub use self::{
    external_dns::{DnsPool, ExternalDns, ExternalDnsSpec, Monitor},
    ingress_link::{IngressLink, IngressLinkSpec},
    policy::{Policy, PolicySpec, Profiles, TcpProfiles},
    tls_profile::{Tls, TlsProfile, TlsProfileSpec, TlsTermination},
    transport_server::{TransportMode, TransportProtocol, TransportServer, TransportServerSpec},
    virtual_server::{HttpTraffic, VirtualServer, VirtualServerSpec},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::{fmt, num::NonZeroU16};

pub const GROUP: &str = "lbctl.dev";

/// Binds a path (for virtual servers) to a backend service port.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Pool {
    #[serde(default)]
    pub path: String,
    pub service: String,
    pub service_port: Port,
    /// Label selector restricting the nodes used as members in node-port
    /// mode. Empty selects every node.
    #[serde(default)]
    pub node_member_label: String,
}

/// References a service port by name or number.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize, JsonSchema)]
#[serde(untagged)]
pub enum Port {
    Number(NonZeroU16),
    Name(String),
}

// === impl Port ===

impl Port {
    /// Returns the port number, if the port is referenced by number.
    pub fn number(&self) -> Option<u16> {
        match self {
            Port::Number(n) => Some(n.get()),
            Port::Name(_) => None,
        }
    }
}

impl From<NonZeroU16> for Port {
    fn from(n: NonZeroU16) -> Self {
        Port::Number(n)
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Port::Number(n) => fmt::Display::fmt(n, f),
            Port::Name(n) => fmt::Display::fmt(n, f),
        }
    }
}
