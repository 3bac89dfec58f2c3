use super::{
    apply_policy, filters, Processor, IPAM_LABEL_ANNOTATION, POLICY_NAME_ANNOTATION,
};
use crate::{
    members::{self, EndpointMode},
    nodes::NodeInventory,
    store::Store,
    Errors,
};
use anyhow::{anyhow, Result};
use lb_controller_core::{naming, Pool, Protocol, ResourceConfig, ResourceKind};
use lb_controller_k8s_api::{
    self as k8s,
    cis::{Policy, Port, TlsProfile},
    labels::Selector,
    Labels, ResourceExt,
};
use std::num::NonZeroU16;
use tracing::{debug, info, instrument};

// === impl Processor ===

impl<S: Store> Processor<S> {
    /// Exposes a `LoadBalancer` service annotated with an IPAM label on an
    /// allocated address, one virtual per service port.
    #[instrument(
        skip(self, svc),
        fields(
            ns = ?svc.metadata.namespace,
            name = ?svc.metadata.name,
        )
    )]
    pub fn process_lb_service(&mut self, svc: &k8s::Service, is_delete: bool) -> Result<()> {
        let ipam = match self.ipam.as_ref() {
            Some(ipam) => ipam,
            None => {
                debug!("IPAM is not configured");
                return Ok(());
            }
        };
        let label = match svc.annotations().get(IPAM_LABEL_ANNOTATION) {
            Some(label) => label.clone(),
            None => {
                debug!("Service has no IPAM label");
                return Ok(());
            }
        };
        let ns = svc
            .namespace()
            .ok_or_else(|| anyhow!("service must be namespaced"))?;
        let name = svc.name_any();
        let base = format!("{ns}/{name}");
        let key = format!("{base}_svc");

        let address = if is_delete {
            ipam.release_ip(&label, "", &key)?
        } else {
            Self::allocated_address(ipam, &label, "", &key)?
        };
        let address = match address {
            Some(address) => address,
            None => return Ok(()),
        };

        let partition = self.config.partition.clone();
        let ports = svc
            .spec
            .as_ref()
            .and_then(|s| s.ports.clone())
            .unwrap_or_default()
            .into_iter()
            .filter_map(|sp| {
                let port = u16::try_from(sp.port).ok().and_then(NonZeroU16::new)?;
                Some((port, sp.protocol))
            })
            .collect::<Vec<_>>();

        if is_delete {
            for (port, _) in &ports {
                let rs_name = naming::lb_service_name(&ns, &name, &address, port.get());
                if self.resources.remove(&partition, &rs_name).is_some() {
                    info!(name = %rs_name, "Removed virtual");
                }
            }
            self.store.update_lb_status(&ns, &name, None);
            return Ok(());
        }

        let policy = match svc.annotations().get(POLICY_NAME_ANNOTATION) {
            Some(policy) => self.lookup_policy(&ns, policy)?,
            None => None,
        };

        let mut names = Vec::with_capacity(ports.len());
        for (port, protocol) in ports {
            let rs_name = naming::lb_service_name(&ns, &name, &address, port.get());
            let protocol = match protocol.as_deref() {
                Some("UDP") => Protocol::Udp,
                _ => Protocol::Tcp,
            };
            let mut rs = ResourceConfig::new(
                rs_name.clone(),
                &partition,
                &address,
                port.get(),
                ResourceKind::LoadBalancerService,
                protocol,
            );
            rs.meta.namespace = ns.clone();
            rs.meta
                .base_resources
                .insert(base.clone(), ResourceKind::LoadBalancerService);
            apply_policy(&mut rs.virtual_server, policy.as_ref(), "", &self.config.default_snat);

            let service_port = Port::Number(port);
            rs.add_pool(Pool {
                name: naming::pool_name(&ns, &name, &service_port, ""),
                partition: partition.clone(),
                service_name: name.clone(),
                service_namespace: ns.clone(),
                service_port,
                node_member_label: String::new(),
                members: Vec::new(),
            });

            self.sync_members(&mut rs, &ns);
            debug!(name = %rs_name, "Updated virtual");
            self.resources.upsert(rs);
            names.push(rs_name);
        }
        self.remove_superseded(&partition, &base, ResourceKind::LoadBalancerService, &names);
        self.store.update_lb_status(&ns, &name, Some(&address));
        Ok(())
    }

    /// Handles a service change: refreshes its cached ports and rebuilds the
    /// resources backed by it.
    #[instrument(
        skip(self, svc),
        fields(
            ns = ?svc.metadata.namespace,
            name = ?svc.metadata.name,
        )
    )]
    pub fn process_service(&mut self, svc: &k8s::Service, is_delete: bool) -> Result<()> {
        let ns = svc
            .namespace()
            .ok_or_else(|| anyhow!("service must be namespaced"))?;
        let name = svc.name_any();
        if !self.config.namespaces.contains(&ns) {
            debug!("Namespace is not watched");
            return Ok(());
        }

        if is_delete {
            self.members.delete_service(&ns, &name);
        } else {
            let mode = members::endpoint_mode(svc, self.config.pool_member_type);
            self.members.apply_service(svc, mode);
        }

        let mut errors = Errors::default();
        if is_load_balancer(svc) {
            if let Err(error) = self.process_lb_service(svc, is_delete) {
                errors.push(error);
            }
        }

        let virtuals = self.store.virtual_servers(&ns);
        for vs in filters::virtual_servers_for_service(&virtuals, &ns, &name) {
            if let Err(error) = self.process_virtual_server(vs, false) {
                errors.push(error);
            }
        }
        let transports = self.store.transport_servers(&ns);
        for ts in filters::transport_servers_for_service(&transports, &ns, &name) {
            if let Err(error) = self.process_transport_server(ts, false) {
                errors.push(error);
            }
        }
        let links = self.store.ingress_links(&ns);
        for il in filters::ingress_links_for_service(&links, svc) {
            if let Err(error) = self.process_ingress_link(il, false) {
                errors.push(error);
            }
        }
        errors.ok_if_empty()
    }

    /// Records a pod's node-port-local mappings and refreshes the pools of the
    /// services selecting it.
    #[instrument(
        skip(self, pod),
        fields(
            ns = ?pod.metadata.namespace,
            name = ?pod.metadata.name,
        )
    )]
    pub fn process_pod(&mut self, pod: &k8s::Pod, is_delete: bool) {
        let ns = pod.namespace().unwrap_or_default();
        let changed = if is_delete {
            self.members.delete_pod(&ns, &pod.name_any())
        } else {
            self.members.apply_pod(pod)
        };
        if !changed {
            return;
        }

        let labels = Labels::from(pod.metadata.labels.clone());
        let members = &mut self.members;
        for rs in self
            .resources
            .ltm
            .values_mut()
            .flat_map(|p| p.resources.values_mut())
        {
            let selects_pod = rs.pools.iter().any(|pool| {
                pool.service_namespace == ns
                    && members
                        .pool_members_info(&pool.service_namespace, &pool.service_name)
                        .map_or(false, |info| {
                            info.mode == EndpointMode::NodePortLocal
                                && !info.selector.is_empty()
                                && Selector::from_map(info.selector.clone()).matches(&labels)
                        })
            });
            if selects_pod {
                let rs_ns = rs.meta.namespace.clone();
                members.update_pool_members_for_npl(rs, &rs_ns, &self.store);
                debug!(name = %rs.name(), "Updated node-port-local members");
            }
        }
    }

    /// Replaces the node inventory and, if it changed, recomputes the members
    /// of all node-port pools.
    #[instrument(skip(self, nodes), fields(nodes = nodes.len()))]
    pub fn process_nodes(&mut self, nodes: NodeInventory) {
        if !self.members.reset_nodes(nodes) {
            return;
        }
        for rs in self
            .resources
            .ltm
            .values_mut()
            .flat_map(|p| p.resources.values_mut())
        {
            let ns = rs.meta.namespace.clone();
            self.members.update_pool_members_for_node_port(rs, &ns);
        }
    }

    /// Rebuilds the virtual servers referencing a TLS profile.
    #[instrument(
        skip(self, tls),
        fields(
            ns = ?tls.metadata.namespace,
            name = ?tls.metadata.name,
        )
    )]
    pub fn process_tls_profile(&mut self, tls: &TlsProfile) -> Result<()> {
        let ns = tls.namespace().unwrap_or_default();
        let virtuals = self.store.virtual_servers(&ns);
        let mut errors = Errors::default();
        for vs in filters::virtual_servers_for_tls_profile(&virtuals, tls) {
            if let Err(error) = self.process_virtual_server(vs, false) {
                errors.push(error);
            }
        }
        errors.ok_if_empty()
    }

    /// Rebuilds the virtual and transport servers referencing a policy.
    #[instrument(
        skip(self, policy),
        fields(
            ns = ?policy.metadata.namespace,
            name = ?policy.metadata.name,
        )
    )]
    pub fn process_policy(&mut self, policy: &Policy) -> Result<()> {
        let ns = policy.namespace().unwrap_or_default();
        let name = policy.name_any();
        let mut errors = Errors::default();

        let virtuals = self.store.virtual_servers(&ns);
        for vs in filters::virtual_servers_for_policy(&virtuals, &ns, &name) {
            if let Err(error) = self.process_virtual_server(vs, false) {
                errors.push(error);
            }
        }
        let transports = self.store.transport_servers(&ns);
        for ts in transports.iter().filter(|ts| ts.spec.policy_name == name) {
            if let Err(error) = self.process_transport_server(ts, false) {
                errors.push(error);
            }
        }
        errors.ok_if_empty()
    }
}

fn is_load_balancer(svc: &k8s::Service) -> bool {
    svc.spec
        .as_ref()
        .and_then(|s| s.type_.as_deref())
        .map_or(false, |t| t == "LoadBalancer")
}
