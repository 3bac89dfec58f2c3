use crate::labels::Selector;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Exposes an in-cluster ingress controller, found by its service labels, on
/// an L4 virtual per service port.
#[derive(Clone, Debug, Default, PartialEq, Eq, CustomResource, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "lbctl.dev",
    version = "v1",
    kind = "IngressLink",
    shortname = "il",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct IngressLinkSpec {
    #[serde(default)]
    pub virtual_server_address: String,

    #[serde(default)]
    pub host: String,

    #[serde(default)]
    pub ipam_label: String,

    #[serde(default)]
    pub partition: String,

    /// Selects the ingress controller's service. When several services
    /// match, the oldest is linked.
    #[serde(default)]
    pub selector: Selector,

    #[serde(default, rename = "iRules")]
    pub irules: Vec<String>,
}
