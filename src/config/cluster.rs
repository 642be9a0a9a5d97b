use std::collections::HashSet;

use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

pub type NodeId = u32;

/// One addressable cache node.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct NodeConfig {
    pub id: NodeId,
    pub host: String,
    pub port: u16,
}

impl NodeConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Name used in logs and failure reports, e.g. `n1@127.0.0.1:11211`
    pub fn label(&self) -> String {
        format!("n{}@{}", self.id, self.address())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ClusterConfig {
    /// Every node a plan may reference, member or not
    #[serde(default = "default_nodes")]
    pub nodes: Vec<NodeConfig>,

    /// Members of the topology when a plan starts
    #[serde(default = "default_initial_members")]
    pub initial_members: Vec<NodeId>,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            nodes: default_nodes(),
            initial_members: default_initial_members(),
        }
    }
}

impl ClusterConfig {
    pub fn node(
        &self,
        id: NodeId,
    ) -> Option<&NodeConfig> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Validates cluster configuration consistency
    /// # Errors
    /// Returns `Error::InvalidConfig` if any configuration rules are violated
    pub fn validate(&self) -> Result<()> {
        if self.nodes.is_empty() {
            return Err(Error::InvalidConfig("cluster.nodes must contain at least one node".into()));
        }

        let mut ids = HashSet::new();
        for node in &self.nodes {
            if !ids.insert(node.id) {
                return Err(Error::InvalidConfig(format!("Duplicate node id {} in cluster.nodes", node.id)));
            }
            if node.host.trim().is_empty() {
                return Err(Error::InvalidConfig(format!("Node {} has an empty host", node.id)));
            }
            if node.port == 0 {
                return Err(Error::InvalidConfig(format!("Node {} must specify a non-zero port", node.id)));
            }
        }

        if self.initial_members.is_empty() {
            return Err(Error::InvalidConfig(
                "cluster.initial_members must contain at least one node".into(),
            ));
        }

        let mut members = HashSet::new();
        for id in &self.initial_members {
            if self.node(*id).is_none() {
                return Err(Error::InvalidConfig(format!(
                    "Initial member {id} not found in cluster.nodes"
                )));
            }
            if !members.insert(*id) {
                return Err(Error::InvalidConfig(format!(
                    "Initial member {id} listed more than once"
                )));
            }
        }

        Ok(())
    }
}

fn default_nodes() -> Vec<NodeConfig> {
    vec![
        NodeConfig {
            id: 1,
            host: "127.0.0.1".to_string(),
            port: 11211,
        },
        NodeConfig {
            id: 2,
            host: "127.0.0.1".to_string(),
            port: 11212,
        },
    ]
}
fn default_initial_members() -> Vec<NodeId> {
    vec![1]
}
