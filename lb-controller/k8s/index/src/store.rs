use lb_controller_k8s_api::{
    self as k8s,
    cis::{ExternalDns, IngressLink, Policy, TlsProfile, TransportServer, VirtualServer},
    labels,
};

/// Read access to the cluster state maintained by the resource watches, plus
/// publication of load balancer status.
///
/// Implementations return the resources in the watched namespaces only.
pub trait Store {
    fn virtual_servers(&self, namespace: &str) -> Vec<VirtualServer>;

    /// Virtual servers in all watched namespaces. Host groups may span
    /// namespaces.
    fn all_virtual_servers(&self) -> Vec<VirtualServer>;

    fn transport_servers(&self, namespace: &str) -> Vec<TransportServer>;

    fn tls_profile(&self, namespace: &str, name: &str) -> Option<TlsProfile>;

    fn policy(&self, namespace: &str, name: &str) -> Option<Policy>;

    fn external_dnses(&self) -> Vec<ExternalDns>;

    fn ingress_links(&self, namespace: &str) -> Vec<IngressLink>;

    fn service(&self, namespace: &str, name: &str) -> Option<k8s::Service>;

    fn services(&self, namespace: &str) -> Vec<k8s::Service>;

    fn pods_for_selector(&self, namespace: &str, selector: &labels::Map) -> Vec<k8s::Pod>;

    /// Sets (or, with `None`, clears) the ingress address in the status of a
    /// `LoadBalancer` service.
    fn update_lb_status(&self, namespace: &str, name: &str, ip: Option<&str>);
}
