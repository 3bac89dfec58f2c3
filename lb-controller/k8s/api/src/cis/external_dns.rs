use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Publishes a domain through the appliance's global traffic manager.
#[derive(Clone, Debug, Default, PartialEq, Eq, CustomResource, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "lbctl.dev",
    version = "v1",
    kind = "ExternalDNS",
    root = "ExternalDns",
    shortname = "edns",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct ExternalDnsSpec {
    pub domain_name: String,
    #[serde(default)]
    pub dns_record_type: String,
    #[serde(default)]
    pub load_balance_method: String,
    #[serde(default)]
    pub pools: Vec<DnsPool>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DnsPool {
    #[serde(default)]
    pub data_server_name: String,
    #[serde(default)]
    pub dns_record_type: String,
    #[serde(default)]
    pub load_balance_method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monitor: Option<Monitor>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Monitor {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub send: String,
    #[serde(default)]
    pub recv: String,
    #[serde(default)]
    pub interval: u32,
    #[serde(default)]
    pub timeout: u32,
}
