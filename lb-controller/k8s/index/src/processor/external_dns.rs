use super::Processor;
use crate::store::Store;
use lb_controller_core::{
    gtm::{self, DEFAULT_LB_METHOD, DEFAULT_RECORD_TYPE},
    naming, GslbPool, GtmMonitor, WideIp,
};
use lb_controller_k8s_api::{
    cis::{DnsPool, ExternalDns},
    ResourceExt,
};
use tracing::{debug, instrument, warn};

impl<S: Store> Processor<S> {
    /// Publishes a domain as a wide IP whose pools reference the virtuals
    /// serving the domain.
    ///
    /// A domain is owned by the first resource publishing it; other
    /// resources naming the same domain are ignored.
    #[instrument(
        skip(self, edns),
        fields(
            ns = ?edns.metadata.namespace,
            name = ?edns.metadata.name,
            domain = %edns.spec.domain_name,
        )
    )]
    pub fn process_external_dns(&mut self, edns: &ExternalDns, is_delete: bool) {
        let partition = self.config.partition.clone();
        let domain = edns.spec.domain_name.clone();
        let uid = edns.uid();

        if let Some(existing) = self
            .resources
            .gtm_partition(&partition)
            .and_then(|p| p.wide_ips.get(&domain))
        {
            if existing.uid.is_some() && existing.uid != uid {
                warn!("Domain is already published by another resource");
                return;
            }
        }

        if is_delete {
            if let Some(p) = self.resources.gtm.get_mut(&partition) {
                if p.wide_ips.remove(&domain).is_some() {
                    debug!("Removed wide IP");
                }
                if p.wide_ips.is_empty() {
                    self.resources.gtm.remove(&partition);
                }
            }
            return;
        }

        let wide_ip = self.wide_ip(edns, &partition, uid);
        debug!(pools = wide_ip.pools.len(), "Updated wide IP");
        self.resources
            .gtm_partition_mut(&partition)
            .wide_ips
            .insert(domain, wide_ip);
    }

    fn wide_ip(&self, edns: &ExternalDns, partition: &str, uid: Option<String>) -> WideIp {
        let spec = &edns.spec;
        let record_type = gtm::or_default(&spec.dns_record_type, DEFAULT_RECORD_TYPE);
        let lb_method = gtm::or_default(&spec.load_balance_method, DEFAULT_LB_METHOD);

        let pools = spec
            .pools
            .iter()
            .map(|pool| self.gslb_pool(pool, &spec.domain_name, partition, &record_type, &lb_method))
            .collect();

        WideIp {
            domain_name: spec.domain_name.clone(),
            record_type,
            lb_method,
            uid,
            pools,
        }
    }

    fn gslb_pool(
        &self,
        pool: &DnsPool,
        domain: &str,
        partition: &str,
        record_type: &str,
        lb_method: &str,
    ) -> GslbPool {
        let name = naming::gslb_pool_name(domain, &self.config.appliance_host, partition);
        let members = self
            .resources
            .resources_for_host(domain)
            .map(|rs| {
                naming::gslb_member(
                    &pool.data_server_name,
                    &rs.virtual_server.partition,
                    rs.name(),
                )
            })
            .collect();
        let monitor = pool
            .monitor
            .as_ref()
            .filter(|m| !m.kind.is_empty())
            .map(|m| GtmMonitor {
                name: naming::gslb_monitor_name(&name),
                kind: m.kind.clone(),
                send: m.send.clone(),
                recv: m.recv.clone(),
                interval: m.interval,
                timeout: m.timeout,
            });

        GslbPool {
            record_type: gtm::or_default(&pool.dns_record_type, record_type),
            lb_method: gtm::or_default(&pool.load_balance_method, lb_method),
            data_server: pool.data_server_name.clone(),
            name,
            members,
            monitor,
        }
    }
}
