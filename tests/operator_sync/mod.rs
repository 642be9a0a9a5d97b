//! Topology changes confirmed by an operator or by readiness probes.

use std::time::Duration;

use cachescale::BackoffPolicy;
use cachescale::DefectPolicy;
use cachescale::Error;
use cachescale::OperatorPrompt;
use cachescale::ProbeSync;
use cachescale::ScalePlan;
use cachescale::Scenario;
use cachescale::SyncError;
use cachescale::TopologyChange;

use crate::common::cluster_config;
use crate::common::connector;
use crate::common::network;
use crate::common::stage;
use crate::common::start_settled_cluster;
use crate::common::verifier;

fn up_then_down() -> ScalePlan {
    ScalePlan {
        name: "operator".to_string(),
        stages: vec![
            stage("baseline", None, vec![Scenario::new("seed", "key", 5, 1)]),
            stage("add n2", Some(TopologyChange::AddNode(2)), vec![]),
            stage("remove n1", Some(TopologyChange::RemoveNode(1)), vec![]),
            stage("never runs", None, vec![Scenario::new("late", "late", 5, 2)]),
        ],
    }
}

#[tokio::test]
async fn test_operator_abort_stops_the_plan() {
    crate::enable_logger();
    let (store, nodes) = start_settled_cluster(2).await;
    let cluster = cluster_config(&nodes, &[1]);
    let prompt = OperatorPrompt::new(&b"\nabort\n"[..]);

    let report = verifier(prompt, DefectPolicy::Strict)
        .run_plan(&up_then_down(), &cluster, &connector())
        .await;

    assert!(!report.is_success());
    assert_eq!(report.stages.len(), 3);
    assert!(report.stages[1].is_success());
    assert!(matches!(
        report.stages[2].aborted,
        Some(Error::Sync(SyncError::Aborted { .. }))
    ));
    assert!(!store.contains("late0"));
}

#[tokio::test]
async fn test_probe_sync_runs_whole_plan() {
    crate::enable_logger();
    let (_store, nodes) = start_settled_cluster(2).await;
    let cluster = cluster_config(&nodes, &[1]);
    let policy = BackoffPolicy {
        max_retries: 3,
        timeout_ms: 200,
        base_delay_ms: 10,
        max_delay_ms: 50,
    };
    let probe = ProbeSync::new(&network(), policy, Duration::from_millis(10));

    let report = verifier(probe, DefectPolicy::Strict)
        .run_plan(&up_then_down(), &cluster, &connector())
        .await;

    assert!(report.is_success(), "{report}");
    assert_eq!(report.stages.len(), 4);
    assert_eq!(report.stages[3].members, vec![2]);
}
