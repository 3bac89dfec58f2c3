use super::{apply_policy, Processor};
use crate::store::Store;
use anyhow::{anyhow, Result};
use lb_controller_core::{naming, Pool, Protocol, ResourceConfig, ResourceKind};
use lb_controller_k8s_api::{
    cis::{TransportProtocol, TransportServer},
    ResourceExt,
};
use tracing::{debug, info, instrument, warn};

// === impl Processor ===

impl<S: Store> Processor<S> {
    #[instrument(
        skip(self, ts),
        fields(
            ns = ?ts.metadata.namespace,
            name = ?ts.metadata.name,
        )
    )]
    pub fn process_transport_server(&mut self, ts: &TransportServer, is_delete: bool) -> Result<()> {
        let ns = ts
            .namespace()
            .ok_or_else(|| anyhow!("transport server must be namespaced"))?;
        let name = ts.name_any();
        let base = format!("{ns}/{name}");

        let address = if !ts.spec.virtual_server_address.is_empty() {
            ts.spec.virtual_server_address.clone()
        } else {
            let ipam = match self.ipam.as_ref() {
                Some(ipam) => ipam,
                None => {
                    warn!("Transport server has no address and IPAM is not configured");
                    return Ok(());
                }
            };
            let key = format!("{base}_ts");
            let address = if is_delete {
                ipam.release_ip(&ts.spec.ipam_label, "", &key)?
            } else {
                Self::allocated_address(ipam, &ts.spec.ipam_label, "", &key)?
            };
            match address {
                Some(address) => address,
                None => return Ok(()),
            }
        };

        let partition = self.partition_for(&ts.spec.partition);
        let rs_name = naming::transport_server_name(
            &ts.spec.virtual_server_name,
            &address,
            ts.spec.virtual_server_port,
        );

        if is_delete {
            if self.resources.remove(&partition, &rs_name).is_some() {
                info!(name = %rs_name, "Removed virtual");
            }
            return Ok(());
        }

        let policy = self.lookup_policy(&ns, &ts.spec.policy_name)?;
        let protocol = match ts.spec.protocol {
            TransportProtocol::Tcp => Protocol::Tcp,
            TransportProtocol::Udp => Protocol::Udp,
        };
        let mut rs = ResourceConfig::new(
            rs_name.clone(),
            &partition,
            address,
            ts.spec.virtual_server_port,
            ResourceKind::TransportServer,
            protocol,
        );
        rs.meta.namespace = ns.clone();
        rs.meta
            .base_resources
            .insert(base.clone(), ResourceKind::TransportServer);
        apply_policy(
            &mut rs.virtual_server,
            policy.as_ref(),
            &ts.spec.snat,
            &self.config.default_snat,
        );

        let pool = &ts.spec.pool;
        rs.add_pool(Pool {
            name: naming::pool_name(&ns, &pool.service, &pool.service_port, &pool.node_member_label),
            partition: partition.clone(),
            service_name: pool.service.clone(),
            service_namespace: ns.clone(),
            service_port: pool.service_port.clone(),
            node_member_label: pool.node_member_label.clone(),
            members: Vec::new(),
        });

        self.sync_members(&mut rs, &ns);
        self.remove_superseded(&partition, &base, ResourceKind::TransportServer, &[rs_name]);
        debug!(name = %rs.name(), "Updated virtual");
        self.resources.upsert(rs);
        Ok(())
    }
}
