use crate::test_utils::mock_member;
use crate::Error;
use crate::Expectation;
use crate::KeyRange;
use crate::MockCacheClient;
use crate::RecordTemplate;
use crate::Topology;
use crate::TopologyChange;
use crate::TopologyError;
use crate::TopologyId;
use crate::TopologyState;

fn topology(ids: &[u32]) -> Topology<MockCacheClient> {
    Topology::new(ids.iter().map(|id| mock_member(*id, MockCacheClient::new())).collect())
}

#[test]
fn test_new_topology_is_stable_generation_zero() {
    let topology = topology(&[1, 2]);
    assert_eq!(topology.id(), TopologyId(0));
    assert!(topology.is_stable());
    assert_eq!(topology.member_ids(), vec![1, 2]);
    assert_eq!(topology.id().to_string(), "g0");
}

#[test]
fn test_add_member_bumps_generation_and_settles() {
    let mut topology = topology(&[1]);
    topology.add_member(mock_member(2, MockCacheClient::new())).unwrap();

    assert_eq!(topology.id(), TopologyId(1));
    assert_eq!(topology.state(), TopologyState::Settling(TopologyChange::AddNode(2)));
    assert_eq!(topology.member_ids(), vec![1, 2]);

    let view = topology.view();
    assert_eq!(view.change, Some(TopologyChange::AddNode(2)));
    assert_eq!(view.members.len(), 2);
    assert_eq!(view.to_string(), "g1 [n1@mock, n2@mock]");

    topology.mark_stable();
    assert!(topology.is_stable());
    assert_eq!(topology.view().change, None);
}

#[test]
fn test_duplicate_member_is_rejected() {
    let mut topology = topology(&[1]);
    let err = topology.add_member(mock_member(1, MockCacheClient::new())).unwrap_err();
    assert!(matches!(err, Error::Topology(TopologyError::DuplicateMember(1))));
    assert_eq!(topology.id(), TopologyId(0));
    assert!(topology.is_stable());
}

#[test]
fn test_remove_retires_and_readmit_restores() {
    let mut topology = topology(&[1, 2]);
    topology.remove_member(2).unwrap();

    assert_eq!(topology.member_ids(), vec![1]);
    assert!(topology.is_retired(2));
    assert_eq!(topology.state(), TopologyState::Settling(TopologyChange::RemoveNode(2)));

    assert!(topology.readmit(2).unwrap());
    assert_eq!(topology.member_ids(), vec![1, 2]);
    assert!(!topology.is_retired(2));
    assert_eq!(topology.id(), TopologyId(2));

    assert!(!topology.readmit(3).unwrap());
    assert!(matches!(
        topology.readmit(1),
        Err(Error::Topology(TopologyError::DuplicateMember(1)))
    ));
}

#[test]
fn test_remove_rejects_unknown_and_last_member() {
    let mut topology = topology(&[1]);
    assert!(matches!(
        topology.remove_member(5),
        Err(Error::Topology(TopologyError::NotAMember(5)))
    ));
    assert!(matches!(
        topology.remove_member(1),
        Err(Error::Topology(TopologyError::LastMember(1)))
    ));
    assert_eq!(topology.member_ids(), vec![1]);
}

#[test]
fn test_expectations_are_keyed_by_prefix() {
    let mut topology = topology(&[1]);
    let expectation = |prefix: &str, value: &'static str| Expectation {
        range: KeyRange::new(prefix, 3),
        template: RecordTemplate::new(value),
        origin: 1,
    };

    topology.expect(expectation("a", "one"));
    topology.expect(expectation("b", "two"));
    topology.expect(expectation("a", "three"));

    let values: Vec<_> = topology.expectations().map(|e| e.template.value.clone()).collect();
    assert_eq!(values, vec!["three", "two"]);

    assert!(topology.forget("a").is_some());
    assert!(topology.forget("a").is_none());
    assert_eq!(topology.expectations().count(), 1);
}
