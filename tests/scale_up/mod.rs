//! Adding nodes: data written before the change must be served by the new
//! member, and data written through the new member by the old ones.

use cachescale::DefectPolicy;
use cachescale::Error;
use cachescale::ImmediateSync;
use cachescale::ScalePlan;
use cachescale::Scenario;
use cachescale::TopologyChange;

use crate::common::cluster_config;
use crate::common::connector;
use crate::common::stage;
use crate::common::start_settled_cluster;
use crate::common::verifier;
use crate::common::MockCacheNode;
use crate::common::SharedStore;
use crate::common::WireQuirk;

#[tokio::test]
async fn test_scale_up_from_one_to_two_nodes() {
    crate::enable_logger();
    let (store, nodes) = start_settled_cluster(2).await;
    let cluster = cluster_config(&nodes, &[1]);

    let plan = ScalePlan {
        name: "one to two".to_string(),
        stages: vec![
            stage("baseline", None, vec![Scenario::new("seed", "key", 50, 1)]),
            stage(
                "add n2",
                Some(TopologyChange::AddNode(2)),
                vec![Scenario::new("through new node", "fresh", 20, 2)],
            ),
        ],
    };

    let report = verifier(ImmediateSync, DefectPolicy::Strict)
        .run_plan(&plan, &cluster, &connector())
        .await;

    assert!(report.is_success(), "{report}");
    assert_eq!(report.stages[1].members, vec![1, 2]);
    assert_eq!(report.stages[1].checks[0].outcome.as_ref().unwrap().exact, 102);
    // writer read-back plus one read per member
    assert_eq!(report.stages[1].scenarios[0].tally.exact, 21 * 3);
    assert_eq!(store.len(), 51 + 21);
    assert!(report.to_string().contains("passed"));
}

#[tokio::test]
async fn test_concurrent_writers_on_every_member() {
    crate::enable_logger();
    let (store, nodes) = start_settled_cluster(3).await;
    let cluster = cluster_config(&nodes, &[1, 2, 3]);

    let plan = ScalePlan {
        name: "fan-in".to_string(),
        stages: vec![stage(
            "writes",
            None,
            vec![
                Scenario::new("a", "a", 30, 1),
                Scenario::new("b", "b", 30, 2),
                Scenario::new("c", "c", 30, 3),
                Scenario::new("a2", "a2-", 30, 1),
            ],
        )],
    };

    let report = verifier(ImmediateSync, DefectPolicy::Strict)
        .run_plan(&plan, &cluster, &connector())
        .await;

    assert!(report.is_success(), "{report}");
    assert_eq!(store.len(), 31 * 4);
    for scenario in &report.stages[0].scenarios {
        assert_eq!(scenario.tally.exact, 31 * 4, "{scenario}");
    }
}

#[tokio::test]
async fn test_new_node_without_rebalanced_data_is_reported() {
    crate::enable_logger();
    let store = SharedStore::new();
    let old = MockCacheNode::start(store, WireQuirk::None).await.unwrap();
    let isolated = MockCacheNode::start(SharedStore::new(), WireQuirk::None).await.unwrap();
    let nodes = vec![(1, old), (2, isolated)];
    let cluster = cluster_config(&nodes, &[1]);

    let plan = ScalePlan {
        name: "missed rebalance".to_string(),
        stages: vec![
            stage("baseline", None, vec![Scenario::new("seed", "key", 10, 1)]),
            stage("add n2", Some(TopologyChange::AddNode(2)), vec![]),
            stage("after", None, vec![]),
        ],
    };

    let report = verifier(ImmediateSync, DefectPolicy::Tolerant)
        .run_plan(&plan, &cluster, &connector())
        .await;

    assert!(!report.is_success());
    assert_eq!(report.stages.len(), 3, "a failed check must not stop the plan");
    for stage in &report.stages[1..] {
        match &stage.checks[0].outcome {
            Err(Error::Assertion(failure)) => {
                assert!(failure.node.starts_with("n2@"), "{failure}");
                assert_eq!(failure.key, "key0");
                assert_eq!(failure.actual, "END");
            }
            other => panic!("expected an assertion failure, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_tolerant_run_lists_fused_metadata_from_new_node() {
    crate::enable_logger();
    let store = SharedStore::new();
    let old = MockCacheNode::start(store.clone(), WireQuirk::None).await.unwrap();
    let fused = MockCacheNode::start(store, WireQuirk::FusedFlagLength).await.unwrap();
    let nodes = vec![(1, old), (2, fused)];
    let cluster = cluster_config(&nodes, &[1]);

    let plan = ScalePlan {
        name: "fused metadata".to_string(),
        stages: vec![
            stage("baseline", None, vec![Scenario::new("seed", "key", 50, 1)]),
            stage("add n2", Some(TopologyChange::AddNode(2)), vec![]),
        ],
    };

    let tolerant = verifier(ImmediateSync, DefectPolicy::Tolerant)
        .run_plan(&plan, &cluster, &connector())
        .await;
    assert!(tolerant.is_success(), "{tolerant}");
    let defects = tolerant.tolerated_defects();
    assert_eq!(defects.len(), 51);
    assert_eq!(defects[0].actual, "VALUE key0 05");
    assert_eq!(defects[0].expected, "VALUE key0 0 5");

    let strict = verifier(ImmediateSync, DefectPolicy::Strict)
        .run_plan(&plan, &cluster, &connector())
        .await;
    assert!(!strict.is_success());
    assert!(matches!(
        strict.stages[1].checks[0].outcome,
        Err(Error::KnownFormatDefect(_))
    ));
}
