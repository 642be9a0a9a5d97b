pub mod mock_server;
pub use mock_server::*;

use crate::ClusterConfig;
use crate::DefectPolicy;
use crate::Member;
use crate::MockCacheClient;
use crate::NetworkConfig;
use crate::NodeConfig;
use crate::NodeId;
use crate::TcpConnector;
use crate::VerifyConfig;

pub(crate) fn node_config(
    id: NodeId,
    node: &MockCacheNode,
) -> NodeConfig {
    NodeConfig {
        id,
        host: node.host(),
        port: node.port(),
    }
}

pub(crate) fn cluster_config(
    nodes: &[(NodeId, &MockCacheNode)],
    initial_members: &[NodeId],
) -> ClusterConfig {
    ClusterConfig {
        nodes: nodes.iter().map(|(id, node)| node_config(*id, node)).collect(),
        initial_members: initial_members.to_vec(),
    }
}

/// Short timeouts so silent nodes fail tests quickly.
pub(crate) fn test_network() -> NetworkConfig {
    NetworkConfig {
        connect_timeout_in_ms: 500,
        request_timeout_in_ms: 300,
        ..NetworkConfig::default()
    }
}

pub(crate) fn tcp_connector() -> TcpConnector {
    TcpConnector::new(test_network())
}

pub(crate) fn verify_config(defect_policy: DefectPolicy) -> VerifyConfig {
    VerifyConfig {
        defect_policy,
        ..VerifyConfig::default()
    }
}

pub(crate) fn mock_member(
    id: NodeId,
    client: MockCacheClient,
) -> Member<MockCacheClient> {
    Member {
        id,
        label: format!("n{id}@mock"),
        address: format!("mock:{id}"),
        client,
    }
}
