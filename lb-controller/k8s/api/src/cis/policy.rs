use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Profiles and SNAT settings applied to the virtuals referencing a policy.
#[derive(Clone, Debug, Default, PartialEq, Eq, CustomResource, Deserialize, Serialize, JsonSchema)]
#[kube(group = "lbctl.dev", version = "v1", kind = "Policy", namespaced)]
#[serde(rename_all = "camelCase")]
pub struct PolicySpec {
    #[serde(default)]
    pub profiles: Profiles,

    /// `""` selects the default SNAT, `none` disables SNAT and anything else
    /// names a SNAT pool.
    #[serde(default)]
    pub snat: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Profiles {
    #[serde(default, rename = "profileL4")]
    pub profile_l4: String,
    #[serde(default)]
    pub persistence_profile: String,
    #[serde(default)]
    pub tcp: TcpProfiles,
    #[serde(default)]
    pub log_profiles: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct TcpProfiles {
    #[serde(default)]
    pub client: String,
    #[serde(default)]
    pub server: String,
}
