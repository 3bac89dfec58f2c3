use super::Pool;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Exposes a single service on an L4 virtual address.
#[derive(Clone, Debug, PartialEq, Eq, CustomResource, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "lbctl.dev",
    version = "v1",
    kind = "TransportServer",
    shortname = "ts",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct TransportServerSpec {
    #[serde(default)]
    pub virtual_server_address: String,
    pub virtual_server_port: u16,
    #[serde(default)]
    pub virtual_server_name: String,
    #[serde(default)]
    pub mode: TransportMode,
    #[serde(default, rename = "type")]
    pub protocol: TransportProtocol,
    #[serde(default)]
    pub ipam_label: String,
    #[serde(default)]
    pub partition: String,
    #[serde(default)]
    pub policy_name: String,
    #[serde(default)]
    pub snat: String,
    pub pool: Pool,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    #[default]
    Standard,
    Performance,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum TransportProtocol {
    #[default]
    Tcp,
    Udp,
}
