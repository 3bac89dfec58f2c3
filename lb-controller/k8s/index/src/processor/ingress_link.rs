use super::{apply_policy, filters, Processor};
use crate::store::Store;
use anyhow::{anyhow, Result};
use lb_controller_core::{naming, Pool, Protocol, ResourceConfig, ResourceKind};
use lb_controller_k8s_api::{
    cis::{IngressLink, Port},
    Labels, ResourceExt,
};
use std::num::NonZeroU16;
use tracing::{debug, instrument, warn};

// === impl Processor ===

impl<S: Store> Processor<S> {
    /// Exposes the service selected by an ingress link on one virtual per
    /// service port. The oldest matching service is linked.
    #[instrument(
        skip(self, il),
        fields(
            ns = ?il.metadata.namespace,
            name = ?il.metadata.name,
        )
    )]
    pub fn process_ingress_link(&mut self, il: &IngressLink, is_delete: bool) -> Result<()> {
        let ns = il
            .namespace()
            .ok_or_else(|| anyhow!("ingress link must be namespaced"))?;
        let base = format!("{ns}/{}", il.name_any());
        let partition = self.partition_for(&il.spec.partition);

        let explicit = !il.spec.virtual_server_address.is_empty();
        let key = format!("{base}_il");
        if is_delete {
            if let Some(ipam) = self.ipam.as_ref().filter(|_| !explicit) {
                ipam.release_ip(&il.spec.ipam_label, "", &key)?;
            }
            self.remove_superseded(&partition, &base, ResourceKind::IngressLink, &[]);
            return Ok(());
        }

        let address = if explicit {
            il.spec.virtual_server_address.clone()
        } else {
            let ipam = match self.ipam.as_ref() {
                Some(ipam) => ipam,
                None => {
                    warn!("Ingress link has no address and IPAM is not configured");
                    return Ok(());
                }
            };
            match Self::allocated_address(ipam, &il.spec.ipam_label, "", &key)? {
                Some(address) => address,
                None => return Ok(()),
            }
        };

        let mut services = self.store.services(&ns);
        services.retain(|svc| {
            !il.spec.selector.selects_all()
                && il
                    .spec
                    .selector
                    .matches(&Labels::from(svc.metadata.labels.clone()))
        });
        filters::sort_services_by_creation(&mut services);
        let svc = match services.into_iter().next() {
            Some(svc) => svc,
            None => {
                warn!("No service matches the ingress link selector");
                self.remove_superseded(&partition, &base, ResourceKind::IngressLink, &[]);
                return Ok(());
            }
        };
        let svc_name = svc.name_any();
        debug!(service = %svc_name, "Linking service");

        let ports = svc
            .spec
            .as_ref()
            .and_then(|s| s.ports.as_ref())
            .into_iter()
            .flatten()
            .filter_map(|sp| u16::try_from(sp.port).ok().and_then(NonZeroU16::new))
            .collect::<Vec<_>>();

        let mut names = Vec::with_capacity(ports.len());
        for port in ports {
            let rs_name = naming::ingress_link_name(&address, port.get());
            let mut rs = ResourceConfig::new(
                rs_name.clone(),
                &partition,
                &address,
                port.get(),
                ResourceKind::IngressLink,
                Protocol::Tcp,
            );
            rs.meta.namespace = ns.clone();
            rs.meta
                .base_resources
                .insert(base.clone(), ResourceKind::IngressLink);
            rs.add_host(&il.spec.host);
            rs.virtual_server.irules = il.spec.irules.clone();
            apply_policy(&mut rs.virtual_server, None, "", &self.config.default_snat);

            let service_port = Port::Number(port);
            rs.add_pool(Pool {
                name: naming::pool_name(&ns, &svc_name, &service_port, ""),
                partition: partition.clone(),
                service_name: svc_name.clone(),
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
        self.remove_superseded(&partition, &base, ResourceKind::IngressLink, &names);
        Ok(())
    }
}
