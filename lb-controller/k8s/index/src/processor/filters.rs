use lb_controller_k8s_api::{
    self as k8s,
    cis::{IngressLink, TlsProfile, TransportServer, VirtualServer},
    Labels, ResourceExt,
};

/// Virtual servers in `namespace` with a pool backed by `service`.
pub fn virtual_servers_for_service<'v>(
    virtuals: &'v [VirtualServer],
    namespace: &str,
    service: &str,
) -> Vec<&'v VirtualServer> {
    virtuals
        .iter()
        .filter(|vs| vs.metadata.namespace.as_deref() == Some(namespace))
        .filter(|vs| vs.spec.pools.iter().any(|p| p.service == service))
        .collect()
}

pub fn transport_servers_for_service<'t>(
    transports: &'t [TransportServer],
    namespace: &str,
    service: &str,
) -> Vec<&'t TransportServer> {
    transports
        .iter()
        .filter(|ts| ts.metadata.namespace.as_deref() == Some(namespace))
        .filter(|ts| ts.spec.pool.service == service)
        .collect()
}

/// Virtual servers referencing `tls` whose host the profile allows.
pub fn virtual_servers_for_tls_profile<'v>(
    virtuals: &'v [VirtualServer],
    tls: &TlsProfile,
) -> Vec<&'v VirtualServer> {
    let name = tls.name_any();
    virtuals
        .iter()
        .filter(|vs| vs.metadata.namespace == tls.metadata.namespace)
        .filter(|vs| vs.spec.tls_profile_name == name && tls.spec.allows_host(&vs.spec.host))
        .collect()
}

pub fn virtual_servers_for_policy<'v>(
    virtuals: &'v [VirtualServer],
    namespace: &str,
    policy: &str,
) -> Vec<&'v VirtualServer> {
    virtuals
        .iter()
        .filter(|vs| vs.metadata.namespace.as_deref() == Some(namespace))
        .filter(|vs| vs.spec.policy_name == policy)
        .collect()
}

/// Ingress links in the service's namespace whose selector matches its
/// labels. A link without a selector matches no service.
pub fn ingress_links_for_service<'l>(
    links: &'l [IngressLink],
    svc: &k8s::Service,
) -> Vec<&'l IngressLink> {
    let labels = Labels::from(svc.metadata.labels.clone());
    links
        .iter()
        .filter(|il| il.metadata.namespace == svc.metadata.namespace)
        .filter(|il| !il.spec.selector.selects_all() && il.spec.selector.matches(&labels))
        .collect()
}

/// Orders services by creation time, then by name.
pub fn sort_services_by_creation(services: &mut [k8s::Service]) {
    services.sort_by(|a, b| {
        a.metadata
            .creation_timestamp
            .cmp(&b.metadata.creation_timestamp)
            .then_with(|| a.metadata.name.cmp(&b.metadata.name))
    });
}
