use crate::index::{
    Allocator, IpamClient, LabelChangePolicy, Namespaces, NodeAddressType, NodeInventory,
    PoolMemberType, ProcessorConfig,
};
use anyhow::Result;
use clap::Parser;
use lb_controller_core::{DEFAULT_PARTITION, DEFAULT_SNAT};
use lb_controller_k8s_api::{
    labels::{ParseError, Selector},
    Node,
};
use std::{str::FromStr, sync::Arc};
use tracing::info;

#[derive(Debug, Parser)]
#[clap(
    name = "lb-controller",
    about = "Configures an external load balancer from Kubernetes resources"
)]
pub struct Args {
    #[clap(
        long,
        default_value = "lb_controller=info,warn",
        env = "LB_CONTROLLER_LOG"
    )]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    /// The appliance partition used by resources that do not name one.
    #[clap(long, default_value = DEFAULT_PARTITION)]
    partition: String,

    /// The SNAT applied when neither a resource nor its policy sets one.
    #[clap(long, default_value = DEFAULT_SNAT)]
    default_snat: String,

    /// How pool members are reached: `nodeport` or `nodeportlocal`.
    #[clap(long, default_value = "nodeport")]
    pool_member_type: PoolMemberType,

    /// Namespaces to watch. All namespaces are watched when none is given.
    #[clap(long = "namespace")]
    namespaces: Vec<String>,

    /// The IPAM resource, as `<namespace>/<name>`. Addresses are only
    /// allocated when set.
    #[clap(long)]
    ipam_resource: Option<String>,

    /// What happens to a host's address request when its IPAM label changes:
    /// `append` or `replace`.
    #[clap(long, default_value = "append")]
    ipam_label_change: LabelChangePolicy,

    /// Uses node internal addresses, rather than external ones, as pool
    /// members.
    #[clap(long)]
    use_node_internal: bool,

    /// Restricts the nodes used as pool members.
    #[clap(long, default_value = "")]
    node_label_selector: String,

    #[clap(long, default_value = "")]
    appliance_url: String,
}

/// The validated controller configuration.
#[derive(Clone, Debug)]
pub struct Config {
    pub processor: ProcessorConfig,
    pub node_selector: Selector,
    pub node_address_type: NodeAddressType,
    pub ipam: Option<IpamConfig>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IpamConfig {
    pub resource: String,
    pub label_change: LabelChangePolicy,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("partition must not be empty")]
    EmptyPartition,

    #[error("invalid node label selector: {0}")]
    NodeSelector(#[source] ParseError),

    #[error("invalid IPAM resource {0:?}; expected <namespace>/<name>")]
    IpamResource(String),

    #[error("invalid appliance URL {0:?}")]
    ApplianceUrl(String),
}

// === impl Args ===

impl Args {
    /// Parses the command line, initializes logging and returns the
    /// validated configuration.
    pub fn parse_and_init() -> Result<Config> {
        let args = Self::parse();
        let config = args.config()?;
        args.log_format.try_init(args.log_level)?;
        info!(
            partition = %config.processor.partition,
            pool_member_type = %config.processor.pool_member_type,
            ipam = ?config.ipam,
            "Configured"
        );
        Ok(config)
    }

    pub fn config(&self) -> Result<Config, ConfigError> {
        if self.partition.is_empty() {
            return Err(ConfigError::EmptyPartition);
        }

        let node_selector =
            Selector::from_str(&self.node_label_selector).map_err(ConfigError::NodeSelector)?;

        let ipam = match self.ipam_resource.as_deref() {
            None | Some("") => None,
            Some(resource) => {
                let valid = matches!(
                    resource.split_once('/'),
                    Some((ns, name)) if !ns.is_empty() && !name.is_empty() && !name.contains('/')
                );
                if !valid {
                    return Err(ConfigError::IpamResource(resource.to_string()));
                }
                Some(IpamConfig {
                    resource: resource.to_string(),
                    label_change: self.ipam_label_change,
                })
            }
        };

        let node_address_type = if self.use_node_internal {
            NodeAddressType::Internal
        } else {
            NodeAddressType::External
        };

        Ok(Config {
            processor: ProcessorConfig {
                partition: self.partition.clone(),
                default_snat: self.default_snat.clone(),
                pool_member_type: self.pool_member_type,
                namespaces: self.namespaces.iter().cloned().collect::<Namespaces>(),
                appliance_host: appliance_host(&self.appliance_url)?,
            },
            node_selector,
            node_address_type,
            ipam,
        })
    }
}

/// Extracts the host of the appliance's management URL.
fn appliance_host(url: &str) -> Result<String, ConfigError> {
    if url.is_empty() {
        return Ok(String::new());
    }
    let uri = http::Uri::from_str(url).map_err(|_| ConfigError::ApplianceUrl(url.to_string()))?;
    uri.host()
        .map(str::to_string)
        .ok_or_else(|| ConfigError::ApplianceUrl(url.to_string()))
}

// === impl Config ===

impl Config {
    /// Builds the address allocator, if IPAM is configured.
    pub fn allocator(&self, client: Arc<dyn IpamClient + Send + Sync>) -> Option<Allocator> {
        self.ipam
            .as_ref()
            .map(|ipam| Allocator::new(client, ipam.resource.clone(), ipam.label_change))
    }

    /// Builds the inventory of the nodes usable as pool members.
    pub fn node_inventory(&self, nodes: impl IntoIterator<Item = Node>) -> NodeInventory {
        NodeInventory::from_nodes(nodes, self.node_address_type, &self.node_selector)
    }
}
