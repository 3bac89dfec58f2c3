//! Groups virtual servers that must be served by the same appliance virtual.

use crate::ports::skip_association;
use ahash::AHashSet as HashSet;
use lb_controller_k8s_api::{
    cis::{VirtualServer, VirtualServerSpec},
    ResourceExt,
};
use std::cmp::Ordering;
use tracing::{debug, trace, warn};

/// Returns the virtual servers in `candidates` that share a virtual with
/// `target`, ordered by host, then creation time, then name.
///
/// When `is_deletion` is set, `target` itself is left out so that the result
/// describes what remains once it is gone. An empty result means that no
/// virtual may be built for `target`'s group.
pub fn associate<'a>(
    target: &VirtualServer,
    candidates: &'a [VirtualServer],
    is_deletion: bool,
) -> Vec<&'a VirtualServer> {
    let spec = &target.spec;

    // Without a host or a host group there is nothing to key an address
    // request on.
    if is_labeled_hostless(spec) {
        debug!(
            ns = ?target.namespace(),
            name = %target.name_any(),
            "Hostless virtual server with an IPAM label cannot be associated"
        );
        return Vec::new();
    }

    let mut ordered = candidates.iter().collect::<Vec<_>>();
    ordered.sort_by(|a, b| creation_order(a, b));

    // A host group converges on a single address: the target's when it has
    // one, else that of the first member admitted with one.
    let mut group_address = spec.virtual_server_address.as_str();
    let mut paths = HashSet::<(&str, &str)>::new();
    let mut group = Vec::new();
    for vs in ordered {
        if is_deletion && is_same_resource(vs, target) {
            continue;
        }
        if vs.spec.partition != spec.partition {
            continue;
        }
        if skip_association(spec, &vs.spec) {
            trace!(name = %vs.name_any(), "No common port");
            continue;
        }

        if spec.host_group.is_empty() {
            if vs.spec.host != spec.host {
                continue;
            }
            if vs.spec.virtual_server_address != spec.virtual_server_address {
                if spec.host.is_empty() {
                    continue;
                }
                warn!(
                    host = %spec.host,
                    name = %vs.name_any(),
                    "Virtual servers for the same host have different addresses"
                );
                return Vec::new();
            }
        } else {
            if vs.spec.host_group != spec.host_group {
                continue;
            }
            if addresses_conflict(group_address, &vs.spec.virtual_server_address) {
                debug!(
                    host_group = %spec.host_group,
                    name = %vs.name_any(),
                    "Host group member has a different address"
                );
                continue;
            }
        }

        if vs.spec.ipam_label != spec.ipam_label {
            warn!(
                name = %vs.name_any(),
                label = %vs.spec.ipam_label,
                expected = %spec.ipam_label,
                "Associated virtual servers must use the same IPAM label"
            );
            return Vec::new();
        }

        let host = vs.spec.host.as_str();
        if let Some(pool) = vs
            .spec
            .pools
            .iter()
            .find(|p| paths.contains(&(host, p.path.as_str())))
        {
            debug!(
                name = %vs.name_any(),
                %host,
                path = %pool.path,
                "Path is already served by an older virtual server"
            );
            continue;
        }
        paths.extend(vs.spec.pools.iter().map(|p| (host, p.path.as_str())));
        if group_address.is_empty() {
            group_address = vs.spec.virtual_server_address.as_str();
        }
        group.push(vs);
    }

    group.sort_by(|a, b| a.spec.host.cmp(&b.spec.host).then_with(|| creation_order(a, b)));
    group
}

/// Orders virtual servers by creation time, then by name.
pub fn creation_order(a: &VirtualServer, b: &VirtualServer) -> Ordering {
    a.metadata
        .creation_timestamp
        .cmp(&b.metadata.creation_timestamp)
        .then_with(|| a.metadata.name.cmp(&b.metadata.name))
}

fn is_same_resource(a: &VirtualServer, b: &VirtualServer) -> bool {
    a.metadata.namespace == b.metadata.namespace && a.metadata.name == b.metadata.name
}

fn is_labeled_hostless(spec: &VirtualServerSpec) -> bool {
    spec.host.is_empty() && spec.host_group.is_empty() && !spec.ipam_label.is_empty()
}

fn addresses_conflict(a: &str, b: &str) -> bool {
    !a.is_empty() && !b.is_empty() && a != b
}
