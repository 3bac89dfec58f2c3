use super::{apply_policy, Processor};
use crate::{
    association, ipam,
    ports::{self, VirtualPort},
    store::Store,
    Errors,
};
use anyhow::{anyhow, bail, Result};
use lb_controller_core::{
    naming, Pool, Protocol, ResourceConfig, ResourceKind, Rule, RuleAction,
};
use lb_controller_k8s_api::{
    cis::{HttpTraffic, PolicySpec, Tls, VirtualServer},
    ResourceExt,
};
use tracing::{debug, info, instrument, warn};

// === impl Processor ===

impl<S: Store> Processor<S> {
    /// Rebuilds the virtuals of the group `vs` belongs to.
    ///
    /// On deletion, the virtuals are rebuilt from the remaining members of the
    /// group, and removed when none remain.
    #[instrument(
        skip(self, vs),
        fields(
            ns = ?vs.metadata.namespace,
            name = ?vs.metadata.name,
        )
    )]
    pub fn process_virtual_server(&mut self, vs: &VirtualServer, is_delete: bool) -> Result<()> {
        let ns = vs
            .namespace()
            .ok_or_else(|| anyhow!("virtual server must be namespaced"))?;

        let mut candidates = if vs.spec.host_group.is_empty() {
            self.store.virtual_servers(&ns)
        } else {
            self.store.all_virtual_servers()
        };
        // The event carries the most recent version of the resource.
        match candidates
            .iter_mut()
            .find(|c| c.metadata.namespace == vs.metadata.namespace && c.metadata.name == vs.metadata.name)
        {
            Some(c) => *c = vs.clone(),
            None => candidates.push(vs.clone()),
        }

        let virtuals = association::associate(vs, &candidates, is_delete);
        if virtuals.is_empty() && !is_delete {
            debug!("No virtual may be built for the group");
            return Ok(());
        }

        let address = match self.virtual_server_address(vs, &virtuals, is_delete)? {
            Some(address) => address,
            None => return Ok(()),
        };
        let partition = self.partition_for(&vs.spec.partition);
        let policy = self.group_policy(&virtuals)?;

        let mut built = Vec::new();
        let mut stale = Vec::new();
        for vport in ports::virtual_ports(&vs.spec) {
            let name =
                naming::virtual_server_name(&vs.spec.virtual_server_name, &address, vport.port());
            let (needed, protocol) = match vport {
                VirtualPort::Http(_) => (
                    ports::any_handles_http(virtuals.iter().copied(), &vs.spec),
                    Protocol::Http,
                ),
                VirtualPort::Https(_) => (
                    ports::any_uses_https_port(virtuals.iter().copied(), &vs.spec),
                    Protocol::Https,
                ),
            };
            if !needed {
                stale.push(name);
                continue;
            }

            let mut rs = ResourceConfig::new(
                name,
                &partition,
                &address,
                vport.port(),
                ResourceKind::VirtualServer,
                protocol,
            );
            rs.meta.namespace = ns.clone();
            apply_policy(
                &mut rs.virtual_server,
                policy.as_ref(),
                &vs.spec.snat,
                &self.config.default_snat,
            );
            for member in virtuals.iter().filter(|m| vport.serves(&m.spec)) {
                let tls = match self.member_tls(member) {
                    Ok(tls) => tls,
                    Err(error) => {
                        // Processing resumes when the TLS profile is applied.
                        warn!(member = %member.name_any(), %error, "Skipping virtual server group");
                        return Ok(());
                    }
                };
                add_member(&mut rs, member, vport, tls);
            }
            built.push(rs);
        }

        let mut hosts = Vec::new();
        for name in stale {
            if let Some(old) = self.resources.remove(&partition, &name) {
                info!(%name, "Removed virtual");
                hosts.extend(old.meta.hosts);
            }
        }

        // Virtuals this resource joined under another address, port or
        // partition. Their other members are rebuilt without it.
        let base = format!("{ns}/{}", vs.name_any());
        let keep = built.iter().map(|rs| rs.name().to_string()).collect::<Vec<_>>();
        let mut orphaned = Vec::new();
        for old in self.remove_superseded(&partition, &base, ResourceKind::VirtualServer, &keep) {
            hosts.extend(old.meta.hosts);
            orphaned.extend(
                old.meta
                    .base_resources
                    .into_iter()
                    .filter(|(b, kind)| *kind == ResourceKind::VirtualServer && *b != base)
                    .map(|(b, _)| b),
            );
        }

        for mut rs in built {
            self.sync_members(&mut rs, &ns);
            hosts.extend(rs.meta.hosts.iter().cloned());
            debug!(name = %rs.name(), pools = rs.pools.len(), "Updated virtual");
            self.resources.upsert(rs);
        }
        self.refresh_external_dns(&hosts);

        let mut errors = Errors::default();
        for other in orphaned {
            let found = other.split_once('/').and_then(|(ns, name)| {
                self.store
                    .virtual_servers(ns)
                    .into_iter()
                    .find(|v| v.name_any() == name)
            });
            if let Some(other) = found {
                if let Err(error) = self.process_virtual_server(&other, false) {
                    errors.push(error);
                }
            }
        }
        errors.ok_if_empty()
    }

    /// Resolves the group's address: an explicit address of the virtual server
    /// or of another member of its group, or else one allocated through IPAM.
    fn virtual_server_address(
        &self,
        vs: &VirtualServer,
        virtuals: &[&VirtualServer],
        is_delete: bool,
    ) -> Result<Option<String>> {
        let explicit = std::iter::once(vs)
            .chain(virtuals.iter().copied())
            .map(|v| v.spec.virtual_server_address.as_str())
            .find(|a| !a.is_empty());
        if let Some(address) = explicit {
            return Ok(Some(address.to_string()));
        }

        let ipam = match self.ipam.as_ref() {
            Some(ipam) => ipam,
            None => {
                warn!("Virtual server has no address and IPAM is not configured");
                return Ok(None);
            }
        };

        let host_group_key;
        let (host, key) = if vs.spec.host_group.is_empty() {
            (vs.spec.host.as_str(), "")
        } else {
            host_group_key = format!("{}_hg", vs.spec.host_group);
            ("", host_group_key.as_str())
        };

        if is_delete && virtuals.is_empty() {
            let released = ipam.release_ip(&vs.spec.ipam_label, host, key)?;
            return Ok(released);
        }

        let label = ipam::ipam_label(virtuals.iter().copied()).unwrap_or_default();
        Self::allocated_address(ipam, label, host, key)
    }

    /// The policy of a group: the first policy referenced by a member.
    fn group_policy(&self, virtuals: &[&VirtualServer]) -> Result<Option<PolicySpec>> {
        match virtuals.iter().find(|v| !v.spec.policy_name.is_empty()) {
            Some(v) => {
                let ns = v.namespace().unwrap_or_default();
                self.lookup_policy(&ns, &v.spec.policy_name)
            }
            None => Ok(None),
        }
    }

    fn member_tls(&self, vs: &VirtualServer) -> Result<Option<Tls>> {
        if !ports::is_secured(&vs.spec) {
            return Ok(None);
        }
        let ns = vs.namespace().unwrap_or_default();
        let name = &vs.spec.tls_profile_name;
        let profile = self
            .store
            .tls_profile(&ns, name)
            .ok_or_else(|| anyhow!("TLS profile {ns}/{name} not found"))?;
        if !profile.spec.allows_host(&vs.spec.host) {
            bail!("TLS profile {ns}/{name} does not allow host {:?}", vs.spec.host);
        }
        Ok(Some(profile.spec.tls))
    }

    pub(super) fn refresh_external_dns(&mut self, hosts: &[String]) {
        if hosts.is_empty() {
            return;
        }
        for edns in self.store.external_dnses() {
            if hosts.contains(&edns.spec.domain_name) {
                self.process_external_dns(&edns, false);
            }
        }
    }
}

/// Adds a group member's routes and pools to the virtual for `vport`.
fn add_member(rs: &mut ResourceConfig, vs: &VirtualServer, vport: VirtualPort, tls: Option<Tls>) {
    let ns = vs.namespace().unwrap_or_default();
    let host = vs.spec.host.as_str();
    rs.add_host(host);
    rs.meta
        .base_resources
        .insert(format!("{ns}/{}", vs.name_any()), ResourceKind::VirtualServer);

    let redirect = match (vport, &tls) {
        (VirtualPort::Http(_), Some(_)) => vs.spec.http_traffic == Some(HttpTraffic::Redirect),
        (VirtualPort::Https(_), Some(tls)) => {
            rs.virtual_server.tls.insert(host.to_string(), tls.clone());
            false
        }
        (_, None) => false,
    };

    for pool in &vs.spec.pools {
        let path = if pool.path.is_empty() { "/" } else { pool.path.as_str() };
        if redirect {
            rs.virtual_server.rules.push(Rule {
                host: host.to_string(),
                path: path.to_string(),
                action: RuleAction::Redirect {
                    port: ports::effective_https_port(&vs.spec),
                },
            });
            continue;
        }

        let name = naming::pool_name(&ns, &pool.service, &pool.service_port, &pool.node_member_label);
        rs.virtual_server.rules.push(Rule {
            host: host.to_string(),
            path: path.to_string(),
            action: RuleAction::Forward { pool: name.clone() },
        });
        let partition = rs.virtual_server.partition.clone();
        rs.add_pool(Pool {
            name,
            partition,
            service_name: pool.service.clone(),
            service_namespace: ns.clone(),
            service_port: pool.service_port.clone(),
            node_member_label: pool.node_member_label.clone(),
            members: Vec::new(),
        });
    }
}
