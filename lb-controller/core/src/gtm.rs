use serde::Serialize;
use std::collections::BTreeMap;

pub const DEFAULT_RECORD_TYPE: &str = "A";
pub const DEFAULT_LB_METHOD: &str = "round-robin";

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GtmPartitionConfig {
    pub wide_ips: BTreeMap<String, WideIp>,
}

/// A DNS name answered by the global traffic manager.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WideIp {
    pub domain_name: String,
    pub record_type: String,
    pub lb_method: String,
    /// UID of the resource that owns the domain.
    pub uid: Option<String>,
    pub pools: Vec<GslbPool>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GslbPool {
    pub name: String,
    pub record_type: String,
    pub lb_method: String,
    pub data_server: String,
    /// Virtual servers, as `<dataServer>:/<partition>/Shared/<virtual>`.
    pub members: Vec<String>,
    pub monitor: Option<GtmMonitor>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GtmMonitor {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub send: String,
    pub recv: String,
    pub interval: u32,
    pub timeout: u32,
}

/// Returns `value`, or `default` when it is empty.
pub fn or_default(value: &str, default: &str) -> String {
    if value.is_empty() {
        default.to_string()
    } else {
        value.to_string()
    }
}
