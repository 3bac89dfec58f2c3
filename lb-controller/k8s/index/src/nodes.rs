use lb_controller_k8s_api::{labels::Selector, Labels, Node, ResourceExt};
use std::str::FromStr;
use tracing::{debug, trace};

/// A cluster node eligible to receive node-port traffic.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeInfo {
    pub name: String,
    pub address: String,
    pub labels: Labels,
}

/// An ordered snapshot of the cluster's nodes. Snapshots are replaced
/// wholesale whenever the node set changes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NodeInventory(Vec<NodeInfo>);

/// Which node address is used for pool members.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum NodeAddressType {
    #[default]
    External,
    Internal,
}

// === impl NodeInventory ===

impl NodeInventory {
    /// Builds an inventory from the nodes that are schedulable, match
    /// `selector` and report an address of the requested type.
    pub fn from_nodes(
        nodes: impl IntoIterator<Item = Node>,
        address_type: NodeAddressType,
        selector: &Selector,
    ) -> Self {
        nodes
            .into_iter()
            .filter_map(|node| {
                let name = node.name_any();
                let spec = node.spec.unwrap_or_default();
                if spec.unschedulable == Some(true) {
                    trace!(%name, "Skipping unschedulable node");
                    return None;
                }

                let labels = Labels::from(node.metadata.labels);
                if !selector.matches(&labels) {
                    trace!(%name, "Node does not match the node selector");
                    return None;
                }

                let address = node
                    .status
                    .and_then(|s| s.addresses)
                    .into_iter()
                    .flatten()
                    .find(|a| a.type_ == address_type.as_str())
                    .map(|a| a.address);
                match address {
                    Some(address) => Some(NodeInfo {
                        name,
                        address,
                        labels,
                    }),
                    None => {
                        debug!(
                            %name,
                            address_type = address_type.as_str(),
                            "Node has no usable address"
                        );
                        None
                    }
                }
            })
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &NodeInfo> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over the nodes matching a string label selector. An empty
    /// selector matches every node; an invalid one matches none.
    pub fn select<'a>(&'a self, selector: &str) -> impl Iterator<Item = &'a NodeInfo> + 'a {
        let selector = match Selector::from_str(selector) {
            Ok(s) => Some(s),
            Err(error) => {
                debug!(%error, %selector, "Invalid node member label");
                None
            }
        };
        self.0
            .iter()
            .filter(move |n| selector.as_ref().map_or(false, |s| s.matches(&n.labels)))
    }
}

impl FromIterator<NodeInfo> for NodeInventory {
    fn from_iter<T: IntoIterator<Item = NodeInfo>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

// === impl NodeAddressType ===

impl NodeAddressType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::External => "ExternalIP",
            Self::Internal => "InternalIP",
        }
    }
}
