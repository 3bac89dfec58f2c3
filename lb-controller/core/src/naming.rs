//! Names of the objects created on the appliance.
//!
//! The appliance only accepts `[A-Za-z0-9_]` in object names, so addresses,
//! label selectors and the like are flattened with [`sanitize`].

use lb_controller_k8s_api::cis::Port;

pub fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// Names the virtual for a virtual server port: the custom name when one is
/// given, the address otherwise.
pub fn virtual_server_name(custom: &str, address: &str, port: u16) -> String {
    if custom.is_empty() {
        sanitize(&format!("vs_{address}_{port}"))
    } else {
        sanitize(&format!("{custom}_{port}"))
    }
}

pub fn transport_server_name(custom: &str, address: &str, port: u16) -> String {
    if custom.is_empty() {
        sanitize(&format!("ts_{address}_{port}"))
    } else {
        sanitize(&format!("{custom}_{port}"))
    }
}

pub fn lb_service_name(namespace: &str, name: &str, address: &str, port: u16) -> String {
    sanitize(&format!("vs_lb_svc_{namespace}_{name}_{address}_{port}"))
}

pub fn ingress_link_name(address: &str, port: u16) -> String {
    sanitize(&format!("ingress_link_{address}_{port}"))
}

pub fn pool_name(namespace: &str, service: &str, port: &Port, node_member_label: &str) -> String {
    let name = format!("{service}_{port}_{namespace}");
    if node_member_label.is_empty() {
        sanitize(&name)
    } else {
        sanitize(&format!("{name}_{node_member_label}"))
    }
}

pub fn gslb_pool_name(domain: &str, appliance_host: &str, partition: &str) -> String {
    format!("{domain}_{}_{partition}", sanitize(appliance_host))
}

pub fn gslb_member(data_server: &str, partition: &str, virtual_name: &str) -> String {
    format!("{data_server}:/{partition}/Shared/{virtual_name}")
}

pub fn gslb_monitor_name(pool: &str) -> String {
    format!("{pool}_monitor")
}
