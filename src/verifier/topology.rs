use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use tracing::info;

use crate::KeyRange;
use crate::NodeConfig;
use crate::NodeId;
use crate::RecordTemplate;
use crate::Result;
use crate::TopologyError;

/// Generation of a topology; bumped by every membership change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TopologyId(pub u64);

impl TopologyId {
    pub fn next(self) -> Self {
        TopologyId(self.0 + 1)
    }
}

impl fmt::Display for TopologyId {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "g{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopologyChange {
    AddNode(NodeId),
    RemoveNode(NodeId),
}

impl TopologyChange {
    pub fn node(&self) -> NodeId {
        match self {
            TopologyChange::AddNode(id) | TopologyChange::RemoveNode(id) => *id,
        }
    }
}

impl fmt::Display for TopologyChange {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            TopologyChange::AddNode(id) => write!(f, "add node {id}"),
            TopologyChange::RemoveNode(id) => write!(f, "remove node {id}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopologyState {
    Stable,
    /// Membership changed and the cluster has not confirmed rebalancing yet
    Settling(TopologyChange),
}

/// A node taking part in the topology, with the client that drives it.
#[derive(Debug)]
pub struct Member<C> {
    pub id: NodeId,
    pub label: String,
    pub address: String,
    pub client: C,
}

impl<C> Member<C> {
    pub fn new(
        node: &NodeConfig,
        client: C,
    ) -> Self {
        Self {
            id: node.id,
            label: node.label(),
            address: node.address(),
            client,
        }
    }
}

/// Data that must be readable from every member of the topology.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expectation {
    pub range: KeyRange,
    pub template: RecordTemplate,
    /// Node the range was written through
    pub origin: NodeId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberAddress {
    pub id: NodeId,
    pub label: String,
    pub address: String,
}

/// Snapshot handed to a [`crate::TopologySync`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopologyView {
    pub id: TopologyId,
    pub change: Option<TopologyChange>,
    pub members: Vec<MemberAddress>,
}

impl fmt::Display for TopologyView {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let labels: Vec<&str> = self.members.iter().map(|m| m.label.as_str()).collect();
        write!(f, "{} [{}]", self.id, labels.join(", "))
    }
}

/// Membership of the cluster under test and what it is expected to hold.
///
/// Removed members are retired rather than dropped so their connection can
/// be reused if the node is added back.
#[derive(Debug)]
pub struct Topology<C> {
    id: TopologyId,
    state: TopologyState,
    members: Vec<Member<C>>,
    retired: Vec<Member<C>>,
    expectations: BTreeMap<String, Expectation>,
}

impl<C> Topology<C> {
    pub fn new(members: Vec<Member<C>>) -> Self {
        Self {
            id: TopologyId::default(),
            state: TopologyState::Stable,
            members,
            retired: Vec::new(),
            expectations: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> TopologyId {
        self.id
    }

    pub fn state(&self) -> TopologyState {
        self.state
    }

    pub fn is_stable(&self) -> bool {
        self.state == TopologyState::Stable
    }

    pub fn members(&self) -> &[Member<C>] {
        &self.members
    }

    pub fn members_mut(&mut self) -> &mut [Member<C>] {
        &mut self.members
    }

    pub fn member_ids(&self) -> Vec<NodeId> {
        self.members.iter().map(|m| m.id).collect()
    }

    pub fn contains(
        &self,
        id: NodeId,
    ) -> bool {
        self.members.iter().any(|m| m.id == id)
    }

    pub fn member_mut(
        &mut self,
        id: NodeId,
    ) -> Option<&mut Member<C>> {
        self.members.iter_mut().find(|m| m.id == id)
    }

    pub fn is_retired(
        &self,
        id: NodeId,
    ) -> bool {
        self.retired.iter().any(|m| m.id == id)
    }

    /// Adds a freshly connected member.
    pub fn add_member(
        &mut self,
        member: Member<C>,
    ) -> Result<()> {
        if self.contains(member.id) {
            return Err(TopologyError::DuplicateMember(member.id).into());
        }
        let id = member.id;
        self.retired.retain(|m| m.id != id);
        self.members.push(member);
        self.settle(TopologyChange::AddNode(id));
        Ok(())
    }

    /// Moves a retired member back into the topology. Returns `false` if
    /// the node was never retired.
    pub fn readmit(
        &mut self,
        id: NodeId,
    ) -> Result<bool> {
        if self.contains(id) {
            return Err(TopologyError::DuplicateMember(id).into());
        }
        let Some(pos) = self.retired.iter().position(|m| m.id == id) else {
            return Ok(false);
        };
        let member = self.retired.remove(pos);
        self.members.push(member);
        self.settle(TopologyChange::AddNode(id));
        Ok(true)
    }

    pub fn remove_member(
        &mut self,
        id: NodeId,
    ) -> Result<()> {
        let Some(pos) = self.members.iter().position(|m| m.id == id) else {
            return Err(TopologyError::NotAMember(id).into());
        };
        if self.members.len() == 1 {
            return Err(TopologyError::LastMember(id).into());
        }
        let member = self.members.remove(pos);
        self.retired.push(member);
        self.settle(TopologyChange::RemoveNode(id));
        Ok(())
    }

    fn settle(
        &mut self,
        change: TopologyChange,
    ) {
        self.id = self.id.next();
        self.state = TopologyState::Settling(change);
        info!(topology = %self.id, %change, members = ?self.member_ids(), "topology changed");
    }

    pub fn mark_stable(&mut self) {
        if !self.is_stable() {
            info!(topology = %self.id, "topology stable");
        }
        self.state = TopologyState::Stable;
    }

    pub fn view(&self) -> TopologyView {
        let change = match self.state {
            TopologyState::Stable => None,
            TopologyState::Settling(change) => Some(change),
        };
        TopologyView {
            id: self.id,
            change,
            members: self
                .members
                .iter()
                .map(|m| MemberAddress {
                    id: m.id,
                    label: m.label.clone(),
                    address: m.address.clone(),
                })
                .collect(),
        }
    }

    /// Registers a range that every member must serve from now on.
    pub fn expect(
        &mut self,
        expectation: Expectation,
    ) {
        self.expectations.insert(expectation.range.prefix.clone(), expectation);
    }

    pub fn forget(
        &mut self,
        prefix: &str,
    ) -> Option<Expectation> {
        self.expectations.remove(prefix)
    }

    pub fn expectations(&self) -> impl Iterator<Item = &Expectation> {
        self.expectations.values()
    }
}
