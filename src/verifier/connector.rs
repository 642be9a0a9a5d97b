use async_trait::async_trait;
use tokio::net::TcpStream;

use crate::CacheClient;
use crate::ClusterConfig;
use crate::Connection;
use crate::Member;
use crate::NetworkConfig;
use crate::NodeConfig;
use crate::Result;
use crate::Topology;
use crate::TopologyError;

/// Opens the client used to drive one node.
#[async_trait]
pub trait NodeConnector: Send + Sync {
    type Client: CacheClient;

    async fn connect(
        &self,
        node: &NodeConfig,
    ) -> Result<Self::Client>;
}

#[derive(Debug, Clone)]
pub struct TcpConnector {
    network: NetworkConfig,
}

impl TcpConnector {
    pub fn new(network: NetworkConfig) -> Self {
        Self { network }
    }
}

#[async_trait]
impl NodeConnector for TcpConnector {
    type Client = Connection<TcpStream>;

    async fn connect(
        &self,
        node: &NodeConfig,
    ) -> Result<Self::Client> {
        Connection::connect(node, &self.network).await
    }
}

/// Connects every initial member of `cluster`.
pub async fn connect_topology<N>(
    cluster: &ClusterConfig,
    connector: &N,
) -> Result<Topology<N::Client>>
where
    N: NodeConnector,
{
    let mut members = Vec::with_capacity(cluster.initial_members.len());
    for id in &cluster.initial_members {
        let node = cluster.node(*id).ok_or(TopologyError::UnknownNode(*id))?;
        let client = connector.connect(node).await?;
        members.push(Member::new(node, client));
    }
    Ok(Topology::new(members))
}
