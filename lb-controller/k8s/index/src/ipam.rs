//! Requests and releases virtual addresses through the IPAM resource.
//!
//! The controller never allocates addresses itself: it records a request in
//! the resource's spec and waits for the IPAM provider to publish an
//! allocation in its status. The resource is re-read on every operation,
//! since the provider updates it concurrently.

use lb_controller_k8s_api::{
    cis::VirtualServer,
    ipam::{HostSpec, IpSpec, Ipam, IpamSpec},
    ObjectMeta, ResourceExt,
};
use std::{fmt, str::FromStr, sync::Arc};
use tracing::{debug, info, warn};

/// Access to the IPAM resources in the cluster.
pub trait IpamClient {
    fn get(&self, namespace: &str, name: &str) -> Option<Ipam>;

    fn create(&self, ipam: Ipam) -> anyhow::Result<Ipam>;

    fn update(&self, ipam: Ipam) -> anyhow::Result<Ipam>;
}

/// The outcome of an address request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IpStatus {
    /// The IPAM resource does not exist.
    NotEnabled,
    /// The label is empty, or not exactly one of host and key is set.
    InvalidInput,
    /// An allocation exists without a matching request; it is stale and will
    /// be reclaimed by the provider.
    NotRequested,
    /// The request is recorded; the provider has not allocated yet.
    Requested,
    Allocated(String),
}

/// What to do with a host's existing requests when it asks for an address
/// under a different label.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum LabelChangePolicy {
    /// Keep the old request alongside the new one.
    #[default]
    Append,
    /// Drop the old request so that its address is reclaimed.
    Replace,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid IPAM resource reference {0:?}; expected <namespace>/<name>")]
    InvalidReference(String),

    #[error("failed to create IPAM resource {0}")]
    Create(String, #[source] BoxError),

    #[error("failed to update IPAM resource {0}")]
    Update(String, #[source] BoxError),
}

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Clone)]
pub struct Allocator {
    client: Arc<dyn IpamClient + Send + Sync>,
    resource: String,
    label_change: LabelChangePolicy,
}

/// Identifies the requester: a virtual server host or an arbitrary key.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Requester<'a> {
    Host(&'a str),
    Key(&'a str),
}

// === impl Allocator ===

impl Allocator {
    pub fn new(
        client: Arc<dyn IpamClient + Send + Sync>,
        resource: impl Into<String>,
        label_change: LabelChangePolicy,
    ) -> Self {
        Self {
            client,
            resource: resource.into(),
            label_change,
        }
    }

    /// The `namespace/name` reference of the IPAM resource.
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Reads the IPAM resource. Malformed references and missing resources
    /// both yield `None`.
    pub fn ipam_resource(&self) -> Option<Ipam> {
        let (ns, name) = parse_reference(&self.resource)?;
        self.client.get(ns, name)
    }

    /// Creates the IPAM resource unless it already exists.
    pub fn create_ipam_resource(&self) -> Result<(), Error> {
        let (ns, name) = parse_reference(&self.resource)
            .ok_or_else(|| Error::InvalidReference(self.resource.clone()))?;
        if self.client.get(ns, name).is_some() {
            debug!(resource = %self.resource, "IPAM resource already exists");
            return Ok(());
        }

        let ipam = Ipam {
            metadata: ObjectMeta {
                namespace: Some(ns.to_string()),
                name: Some(name.to_string()),
                ..Default::default()
            },
            spec: IpamSpec::default(),
            status: None,
        };
        self.client
            .create(ipam)
            .map_err(|e| Error::Create(self.resource.clone(), e.into()))?;
        info!(resource = %self.resource, "Created IPAM resource");
        Ok(())
    }

    /// Requests an address for `host` or `key` (exactly one of them must be
    /// set) from the provider handling `label`.
    pub fn request_ip(&self, label: &str, host: &str, key: &str) -> Result<IpStatus, Error> {
        let requester = match Requester::new(host, key) {
            Some(r) if !label.is_empty() => r,
            _ => {
                debug!(%label, %host, %key, "Invalid address request");
                return Ok(IpStatus::InvalidInput);
            }
        };
        let mut ipam = match self.ipam_resource() {
            Some(ipam) => ipam,
            None => {
                warn!(resource = %self.resource, "IPAM resource not found");
                return Ok(IpStatus::NotEnabled);
            }
        };

        let allocated = find_allocation(&ipam, label, requester).map(|s| s.ip.clone());

        let specs = &ipam.spec.host_specs;
        if specs
            .iter()
            .any(|hs| hs.ipam_label == label && requester.matches(&hs.host, &hs.key))
        {
            return Ok(match allocated {
                Some(ip) => IpStatus::Allocated(ip),
                None => IpStatus::Requested,
            });
        }

        let relabeled = specs.iter().any(|hs| requester.matches(&hs.host, &hs.key));
        if !relabeled && allocated.is_some() {
            debug!(%label, %requester, "Allocation exists without a request");
            return Ok(IpStatus::NotRequested);
        }

        if relabeled && self.label_change == LabelChangePolicy::Replace {
            info!(%label, %requester, "IPAM label changed; releasing previous request");
            ipam.spec
                .host_specs
                .retain(|hs| !requester.matches(&hs.host, &hs.key));
        }

        ipam.spec.host_specs.push(HostSpec {
            host: host.to_string(),
            key: key.to_string(),
            ipam_label: label.to_string(),
        });
        self.update(ipam)?;
        debug!(%label, %requester, "Requested address");
        Ok(IpStatus::Requested)
    }

    /// Withdraws the request for `host` or `key` under `label`, returning the
    /// address that was allocated for it, if any.
    pub fn release_ip(&self, label: &str, host: &str, key: &str) -> Result<Option<String>, Error> {
        if label.is_empty() {
            return Ok(None);
        }
        let requester = match Requester::new(host, key) {
            Some(r) => r,
            None => return Ok(None),
        };
        let mut ipam = match self.ipam_resource() {
            Some(ipam) => ipam,
            None => return Ok(None),
        };

        let ip = find_allocation(&ipam, label, requester).map(|s| s.ip.clone());
        let before = ipam.spec.host_specs.len();
        ipam.spec
            .host_specs
            .retain(|hs| !(hs.ipam_label == label && requester.matches(&hs.host, &hs.key)));
        if ipam.spec.host_specs.len() != before {
            self.update(ipam)?;
            debug!(%label, %requester, ?ip, "Released address");
        }
        Ok(ip)
    }

    fn update(&self, ipam: Ipam) -> Result<Ipam, Error> {
        self.client
            .update(ipam)
            .map_err(|e| Error::Update(self.resource.clone(), e.into()))
    }
}

impl fmt::Debug for Allocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Allocator")
            .field("resource", &self.resource)
            .field("label_change", &self.label_change)
            .finish()
    }
}

/// Resolves the IPAM label of a group of virtual servers: the first non-empty
/// label, unless members disagree.
pub fn ipam_label<'a>(virtuals: impl IntoIterator<Item = &'a VirtualServer>) -> Option<&'a str> {
    let mut label = None;
    for vs in virtuals {
        let l = vs.spec.ipam_label.as_str();
        if l.is_empty() {
            continue;
        }
        match label {
            None => label = Some(l),
            Some(prior) if prior != l => {
                warn!(name = %vs.name_any(), label = %l, %prior, "Conflicting IPAM labels");
                return None;
            }
            Some(_) => {}
        }
    }
    label
}

fn find_allocation<'i>(ipam: &'i Ipam, label: &str, requester: Requester<'_>) -> Option<&'i IpSpec> {
    ipam.status
        .iter()
        .flat_map(|s| s.ip_status.iter())
        .find(|s| s.ipam_label == label && requester.matches(&s.host, &s.key))
}

fn parse_reference(reference: &str) -> Option<(&str, &str)> {
    let mut parts = reference.split('/');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(ns), Some(name), None) if !ns.is_empty() && !name.is_empty() => Some((ns, name)),
        _ => None,
    }
}

// === impl Requester ===

impl<'a> Requester<'a> {
    fn new(host: &'a str, key: &'a str) -> Option<Self> {
        match (host.is_empty(), key.is_empty()) {
            (false, true) => Some(Self::Host(host)),
            (true, false) => Some(Self::Key(key)),
            _ => None,
        }
    }

    fn matches(&self, host: &str, key: &str) -> bool {
        match *self {
            Self::Host(h) => h == host,
            Self::Key(k) => k == key,
        }
    }
}

impl fmt::Display for Requester<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Host(h) => write!(f, "host:{h}"),
            Self::Key(k) => write!(f, "key:{k}"),
        }
    }
}

// === impl LabelChangePolicy ===

impl FromStr for LabelChangePolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "append" => Ok(Self::Append),
            "replace" => Ok(Self::Replace),
            s => anyhow::bail!("invalid IPAM label change policy: {s:?}"),
        }
    }
}

impl fmt::Display for LabelChangePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Append => f.write_str("append"),
            Self::Replace => f.write_str("replace"),
        }
    }
}
