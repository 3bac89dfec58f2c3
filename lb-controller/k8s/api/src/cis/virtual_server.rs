use super::Pool;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Exposes a set of L7 routes (host + path) on a virtual address.
///
/// Virtual servers that share an address and a compatible port are merged
/// into a single appliance virtual; see the index crate for the rules.
#[derive(Clone, Debug, Default, PartialEq, Eq, CustomResource, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "lbctl.dev",
    version = "v1",
    kind = "VirtualServer",
    shortname = "vs",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct VirtualServerSpec {
    #[serde(default)]
    pub host: String,

    /// Groups virtual servers with different hosts onto one address.
    #[serde(default)]
    pub host_group: String,

    #[serde(default)]
    pub virtual_server_address: String,

    /// Overrides the HTTP port; zero means the default (80).
    #[serde(default, rename = "virtualServerHTTPPort")]
    pub virtual_server_http_port: u16,

    /// Overrides the HTTPS port; zero means the default (443).
    #[serde(default, rename = "virtualServerHTTPSPort")]
    pub virtual_server_https_port: u16,

    /// Prefix used instead of the address when naming appliance virtuals.
    #[serde(default)]
    pub virtual_server_name: String,

    /// A non-empty TLS profile makes the virtual server secured.
    #[serde(default)]
    pub tls_profile_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_traffic: Option<HttpTraffic>,

    #[serde(default)]
    pub ipam_label: String,

    #[serde(default)]
    pub partition: String,

    #[serde(default)]
    pub policy_name: String,

    #[serde(default)]
    pub snat: String,

    #[serde(default)]
    pub pools: Vec<Pool>,
}

/// How a secured virtual server treats plaintext HTTP traffic.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum HttpTraffic {
    /// Plaintext traffic is not served.
    None,
    /// Plaintext traffic is forwarded to the pools.
    Allow,
    /// Plaintext traffic is redirected to HTTPS.
    Redirect,
}
