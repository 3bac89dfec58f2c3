//! The address-management resource shared with an external IPAM provider.
//!
//! The controller appends requests to `spec.hostSpecs`; the provider answers
//! by writing allocations to `status.IPStatus`.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Eq, CustomResource, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "ipam.lbctl.dev",
    version = "v1",
    kind = "IPAM",
    root = "Ipam",
    status = "IpamStatus",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct IpamSpec {
    #[serde(default)]
    pub host_specs: Vec<HostSpec>,
}

/// A pending address request. Exactly one of `host` and `key` is set.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HostSpec {
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub key: String,
    pub ipam_label: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct IpamStatus {
    #[serde(default, rename = "IPStatus")]
    pub ip_status: Vec<IpSpec>,
}

/// An address allocated by the provider for a request.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IpSpec {
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub key: String,
    pub ipam_label: String,
    pub ip: String,
}
