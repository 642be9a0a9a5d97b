//! Removing nodes: every remaining member must keep serving what was
//! written before the change.

use async_trait::async_trait;
use cachescale::DefectPolicy;
use cachescale::Error;
use cachescale::ImmediateSync;
use cachescale::ScalePlan;
use cachescale::Scenario;
use cachescale::TopologyChange;
use cachescale::TopologySync;
use cachescale::TopologyView;

use crate::common::cluster_config;
use crate::common::connector;
use crate::common::stage;
use crate::common::start_settled_cluster;
use crate::common::verifier;
use crate::common::SharedStore;

/// Settles every change but drops `key` from the cluster while doing so.
struct LossyRebalance {
    store: SharedStore,
    key: &'static str,
}

#[async_trait]
impl TopologySync for LossyRebalance {
    async fn await_topology_stable(
        &self,
        _topology: &TopologyView,
    ) -> cachescale::Result<()> {
        self.store.remove(self.key);
        Ok(())
    }
}

#[tokio::test]
async fn test_scale_down_and_back_up() {
    crate::enable_logger();
    let (_store, nodes) = start_settled_cluster(3).await;
    let cluster = cluster_config(&nodes, &[1, 2, 3]);

    let mut transient = Scenario::new("transient", "tmp", 5, 2);
    transient.delete_after = true;
    let plan = ScalePlan {
        name: "three to two to three".to_string(),
        stages: vec![
            stage("baseline", None, vec![Scenario::new("seed", "key", 50, 3)]),
            stage("remove n3", Some(TopologyChange::RemoveNode(3)), vec![transient]),
            stage("re-add n3", Some(TopologyChange::AddNode(3)), vec![]),
        ],
    };

    let report = verifier(ImmediateSync, DefectPolicy::Strict)
        .run_plan(&plan, &cluster, &connector())
        .await;

    assert!(report.is_success(), "{report}");
    let removed = &report.stages[1];
    assert_eq!(removed.members, vec![1, 2]);
    assert_eq!(removed.checks[0].outcome.as_ref().unwrap().exact, 51 * 2);

    let readded = &report.stages[2];
    assert_eq!(readded.members, vec![1, 2, 3]);
    assert_eq!(readded.checks.len(), 1);
    assert_eq!(readded.checks[0].outcome.as_ref().unwrap().exact, 51 * 3);
}

#[tokio::test]
async fn test_data_lost_during_scale_down_is_an_assertion_failure() {
    crate::enable_logger();
    let (store, nodes) = start_settled_cluster(2).await;
    let cluster = cluster_config(&nodes, &[1, 2]);
    let plan = ScalePlan {
        name: "lossy".to_string(),
        stages: vec![
            stage("baseline", None, vec![Scenario::new("seed", "key", 10, 2)]),
            stage("remove n2", Some(TopologyChange::RemoveNode(2)), vec![]),
        ],
    };

    let sync = LossyRebalance {
        store: store.clone(),
        key: "key3",
    };
    let report = verifier(sync, DefectPolicy::Tolerant)
        .run_plan(&plan, &cluster, &connector())
        .await;

    assert!(!report.is_success());
    match &report.stages[1].checks[0].outcome {
        Err(Error::Assertion(failure)) => {
            assert!(failure.node.starts_with("n1@"));
            assert_eq!(failure.key, "key3");
            assert_eq!(failure.expected, "VALUE key3 0 5 / abcde");
            assert_eq!(failure.actual, "END");
        }
        other => panic!("expected an assertion failure, got {other:?}"),
    }
    assert!(report.tolerated_defects().is_empty());
}
