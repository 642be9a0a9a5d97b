#[path = "../../src/test_utils/mock_server.rs"]
mod mock_server;

use cachescale::ClusterConfig;
use cachescale::ClusterVerifier;
use cachescale::DefectPolicy;
use cachescale::NetworkConfig;
use cachescale::NodeConfig;
use cachescale::NodeId;
use cachescale::Scenario;
use cachescale::Stage;
use cachescale::TcpConnector;
use cachescale::TopologyChange;
use cachescale::TopologySync;
use cachescale::VerifyConfig;
pub use mock_server::*;

/// Mock nodes with ids `1..=count`, all on one store.
pub async fn start_settled_cluster(count: u32) -> (SharedStore, Vec<(NodeId, MockCacheNode)>) {
    let store = SharedStore::new();
    let mut nodes = Vec::new();
    for id in 1..=count {
        let node = MockCacheNode::start(store.clone(), WireQuirk::None)
            .await
            .expect("mock node should bind");
        nodes.push((id, node));
    }
    (store, nodes)
}

pub fn cluster_config(
    nodes: &[(NodeId, MockCacheNode)],
    initial_members: &[NodeId],
) -> ClusterConfig {
    ClusterConfig {
        nodes: nodes
            .iter()
            .map(|(id, node)| NodeConfig {
                id: *id,
                host: node.host(),
                port: node.port(),
            })
            .collect(),
        initial_members: initial_members.to_vec(),
    }
}

pub fn network() -> NetworkConfig {
    NetworkConfig {
        connect_timeout_in_ms: 500,
        request_timeout_in_ms: 500,
        ..NetworkConfig::default()
    }
}

pub fn connector() -> TcpConnector {
    TcpConnector::new(network())
}

pub fn verifier<Y: TopologySync>(
    sync: Y,
    defect_policy: DefectPolicy,
) -> ClusterVerifier<Y> {
    ClusterVerifier::new(
        sync,
        VerifyConfig {
            defect_policy,
            ..VerifyConfig::default()
        },
    )
}

pub fn stage(
    name: &str,
    transition: Option<TopologyChange>,
    scenarios: Vec<Scenario>,
) -> Stage {
    Stage {
        name: name.to_string(),
        transition,
        scenarios,
    }
}
