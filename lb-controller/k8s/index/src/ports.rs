//! Port and plaintext-traffic rules deciding which virtual servers can share
//! an appliance virtual.

use lb_controller_k8s_api::cis::{HttpTraffic, VirtualServer, VirtualServerSpec};

pub const DEFAULT_HTTP_PORT: u16 = 80;
pub const DEFAULT_HTTPS_PORT: u16 = 443;

/// A port on which a virtual server listens.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum VirtualPort {
    Http(u16),
    Https(u16),
}

pub fn effective_http_port(vs: &VirtualServerSpec) -> u16 {
    match vs.virtual_server_http_port {
        0 => DEFAULT_HTTP_PORT,
        port => port,
    }
}

pub fn effective_https_port(vs: &VirtualServerSpec) -> u16 {
    match vs.virtual_server_https_port {
        0 => DEFAULT_HTTPS_PORT,
        port => port,
    }
}

pub fn is_secured(vs: &VirtualServerSpec) -> bool {
    !vs.tls_profile_name.is_empty()
}

/// Whether the virtual server serves plaintext traffic on its HTTP port.
pub fn handles_http(vs: &VirtualServerSpec) -> bool {
    !is_secured(vs) || has_http_traffic(vs)
}

fn has_http_traffic(vs: &VirtualServerSpec) -> bool {
    matches!(
        vs.http_traffic,
        Some(HttpTraffic::Allow) | Some(HttpTraffic::Redirect)
    )
}

pub fn shares_port(a: &VirtualServerSpec, b: &VirtualServerSpec) -> bool {
    shares_http_port(a, b) || shares_https_port(a, b)
}

fn shares_http_port(a: &VirtualServerSpec, b: &VirtualServerSpec) -> bool {
    effective_http_port(a) == effective_http_port(b)
}

fn shares_https_port(a: &VirtualServerSpec, b: &VirtualServerSpec) -> bool {
    is_secured(a) && is_secured(b) && effective_https_port(a) == effective_https_port(b)
}

/// Decides whether `candidate` must be kept out of `target`'s group.
///
/// Virtual servers only share a virtual when they listen on a common port and
/// both actually serve the traffic arriving on it.
pub fn skip_association(target: &VirtualServerSpec, candidate: &VirtualServerSpec) -> bool {
    if !shares_port(target, candidate) {
        return true;
    }
    if shares_https_port(target, candidate) {
        return false;
    }

    // Only the HTTP port is shared.
    match (is_secured(target), is_secured(candidate)) {
        (false, false) => false,
        (true, false) => !has_http_traffic(target),
        (false, true) => !has_http_traffic(candidate),
        // Secured on different HTTPS ports: the target decides whether its
        // plaintext side may be merged.
        (true, true) => !has_http_traffic(target),
    }
}

/// Whether any member of the group serves plaintext traffic on `vs`'s HTTP
/// port.
pub fn any_handles_http<'a>(
    virtuals: impl IntoIterator<Item = &'a VirtualServer>,
    vs: &VirtualServerSpec,
) -> bool {
    let port = effective_http_port(vs);
    virtuals
        .into_iter()
        .any(|v| handles_http(&v.spec) && effective_http_port(&v.spec) == port)
}

/// Whether any secured member of the group listens on `vs`'s HTTPS port.
pub fn any_uses_https_port<'a>(
    virtuals: impl IntoIterator<Item = &'a VirtualServer>,
    vs: &VirtualServerSpec,
) -> bool {
    let port = effective_https_port(vs);
    virtuals
        .into_iter()
        .any(|v| is_secured(&v.spec) && effective_https_port(&v.spec) == port)
}

/// The ports on which `vs` may need a virtual.
pub fn virtual_ports(vs: &VirtualServerSpec) -> Vec<VirtualPort> {
    let mut ports = vec![VirtualPort::Http(effective_http_port(vs))];
    if is_secured(vs) {
        ports.push(VirtualPort::Https(effective_https_port(vs)));
    }
    ports
}

// === impl VirtualPort ===

impl VirtualPort {
    pub fn port(self) -> u16 {
        match self {
            Self::Http(p) | Self::Https(p) => p,
        }
    }

    /// Whether the virtual server serves traffic arriving on this port.
    pub fn serves(self, vs: &VirtualServerSpec) -> bool {
        match self {
            Self::Http(p) => handles_http(vs) && effective_http_port(vs) == p,
            Self::Https(p) => is_secured(vs) && effective_https_port(vs) == p,
        }
    }
}
