use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Binds TLS settings to the hosts of the virtual servers referencing it.
#[derive(Clone, Debug, Default, PartialEq, Eq, CustomResource, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "lbctl.dev",
    version = "v1",
    kind = "TLSProfile",
    root = "TlsProfile",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct TlsProfileSpec {
    /// Hosts the profile may be used for. Empty allows any host.
    #[serde(default)]
    pub hosts: Vec<String>,
    #[serde(default)]
    pub tls: Tls,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Tls {
    #[serde(default)]
    pub termination: TlsTermination,
    #[serde(default, rename = "clientSSL")]
    pub client_ssl: String,
    #[serde(default, rename = "serverSSL")]
    pub server_ssl: String,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum TlsTermination {
    #[default]
    Edge,
    Reencrypt,
    Passthrough,
}

// === impl TlsProfileSpec ===

impl TlsProfileSpec {
    pub fn allows_host(&self, host: &str) -> bool {
        self.hosts.is_empty() || self.hosts.iter().any(|h| h == host)
    }
}
