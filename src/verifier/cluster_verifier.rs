use std::collections::BTreeMap;

use futures::future::join_all;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::assert_absent;
use crate::constants::RESP_END;
use crate::utils::ScopedTimer;
use crate::AssertionFailure;
use crate::CacheClient;
use crate::CheckReport;
use crate::ClusterConfig;
use crate::DefectPolicy;
use crate::Expectation;
use crate::ExpectedMetadata;
use crate::FormatDefect;
use crate::KeyRange;
use crate::Member;
use crate::Metadata;
use crate::MetadataMatch;
use crate::NodeConnector;
use crate::NodeId;
use crate::Op;
use crate::PlanReport;
use crate::ReadTally;
use crate::RecordTemplate;
use crate::Result;
use crate::ScalePlan;
use crate::Scenario;
use crate::ScenarioPhase;
use crate::ScenarioReport;
use crate::ScenarioRun;
use crate::Stage;
use crate::StageReport;
use crate::Topology;
use crate::TopologyChange;
use crate::TopologyError;
use crate::TopologySync;
use crate::VerifyConfig;

/// Drives scale plans against a cluster and checks that every member keeps
/// serving the data written through any other member.
pub struct ClusterVerifier<Y> {
    sync: Y,
    config: VerifyConfig,
}

impl<Y> ClusterVerifier<Y>
where
    Y: TopologySync,
{
    pub fn new(
        sync: Y,
        config: VerifyConfig,
    ) -> Self {
        Self { sync, config }
    }

    pub fn sync(&self) -> &Y {
        &self.sync
    }

    /// Writes `range` through `member`: every key is deleted, confirmed
    /// absent, then stored.
    pub async fn insert_range<C>(
        &self,
        member: &mut Member<C>,
        range: &KeyRange,
        template: &RecordTemplate,
    ) -> Result<()>
    where
        C: CacheClient,
    {
        let _timer = ScopedTimer::new("insert_range", &member.label, range.len());
        for key in range.keys() {
            let outcome = member.client.delete(&key).await?;
            debug!(node = %member.label, %key, ?outcome, "cleared");
            assert_absent(&mut member.client, &member.label, &key).await?;
            member.client.set(&template.record(key)).await?;
        }
        info!(node = %member.label, prefix = %range.prefix, keys = range.len(), "inserted range");
        Ok(())
    }

    /// Reads `range` back through `member`, stopping at the first key that
    /// is missing, differs, or fails the defect policy.
    pub async fn read_range<C>(
        &self,
        member: &mut Member<C>,
        range: &KeyRange,
        template: &RecordTemplate,
        tally: &mut ReadTally,
    ) -> Result<()>
    where
        C: CacheClient,
    {
        let _timer = ScopedTimer::new("read_range", &member.label, range.len());
        for key in range.keys() {
            self.read_key(member, &key, template, tally).await?;
        }
        debug!(node = %member.label, prefix = %range.prefix, %tally, "read range");
        Ok(())
    }

    async fn read_key<C>(
        &self,
        member: &mut Member<C>,
        key: &str,
        template: &RecordTemplate,
        tally: &mut ReadTally,
    ) -> Result<()>
    where
        C: CacheClient,
    {
        let expected_line = Metadata::canonical(key, template.flag, template.value.len());
        let Some(hit) = member.client.get(key).await? else {
            return Err(AssertionFailure {
                node: member.label.clone(),
                op: Op::Get,
                key: key.to_string(),
                expected: format!("{expected_line} / {}", String::from_utf8_lossy(&template.value)),
                actual: RESP_END.to_string(),
            }
            .into());
        };

        if hit.value != template.value {
            return Err(AssertionFailure {
                node: member.label.clone(),
                op: Op::Get,
                key: key.to_string(),
                expected: format!("{expected_line} / {}", String::from_utf8_lossy(&template.value)),
                actual: hit.describe(),
            }
            .into());
        }

        let expected = ExpectedMetadata {
            key,
            flag: template.flag,
            length: template.value.len(),
        };
        match hit.metadata.classify(&expected, self.config.max_length_skew) {
            MetadataMatch::Exact => {
                tally.exact += 1;
                Ok(())
            }
            MetadataMatch::Defect(kinds) => {
                let defect = FormatDefect {
                    node: member.label.clone(),
                    key: key.to_string(),
                    kinds,
                    expected: expected_line,
                    actual: hit.metadata.raw().to_string(),
                };
                match self.config.defect_policy {
                    DefectPolicy::Strict => Err(defect.into()),
                    DefectPolicy::Tolerant => {
                        warn!(%defect, "tolerating known format defect");
                        tally.tolerated.push(defect);
                        Ok(())
                    }
                }
            }
            MetadataMatch::Mismatch(reason) => {
                debug!(node = %member.label, key, reason, "metadata mismatch");
                Err(AssertionFailure {
                    node: member.label.clone(),
                    op: Op::Get,
                    key: key.to_string(),
                    expected: expected_line,
                    actual: hit.metadata.raw().to_string(),
                }
                .into())
            }
        }
    }

    /// Deletes `range` through `member` and confirms each key is gone.
    pub async fn delete_range<C>(
        &self,
        member: &mut Member<C>,
        range: &KeyRange,
    ) -> Result<()>
    where
        C: CacheClient,
    {
        let _timer = ScopedTimer::new("delete_range", &member.label, range.len());
        for key in range.keys() {
            let outcome = member.client.delete(&key).await?;
            debug!(node = %member.label, %key, ?outcome, "deleted");
            assert_absent(&mut member.client, &member.label, &key).await?;
        }
        info!(node = %member.label, prefix = %range.prefix, keys = range.len(), "deleted range");
        Ok(())
    }

    /// Reads `range` from every member once the topology is stable.
    pub async fn verify_topology_stage<C>(
        &self,
        topology: &mut Topology<C>,
        range: &KeyRange,
        template: &RecordTemplate,
    ) -> Result<ReadTally>
    where
        C: CacheClient,
    {
        self.await_stable(topology).await?;

        let mut tally = ReadTally::default();
        for member in topology.members_mut() {
            self.read_range(member, range, template, &mut tally).await?;
        }
        Ok(tally)
    }

    /// Confirms `range` is absent from every member.
    pub async fn verify_absent<C>(
        &self,
        topology: &mut Topology<C>,
        range: &KeyRange,
    ) -> Result<()>
    where
        C: CacheClient,
    {
        self.await_stable(topology).await?;

        for member in topology.members_mut() {
            for key in range.keys() {
                assert_absent(&mut member.client, &member.label, &key).await?;
            }
        }
        Ok(())
    }

    /// Applies `change` and waits until the synchronizer reports the new
    /// topology stable.
    pub async fn apply_change<N>(
        &self,
        topology: &mut Topology<N::Client>,
        change: TopologyChange,
        cluster: &ClusterConfig,
        connector: &N,
    ) -> Result<()>
    where
        N: NodeConnector,
    {
        match change {
            TopologyChange::AddNode(id) => {
                if !topology.readmit(id)? {
                    let node = cluster.node(id).ok_or(TopologyError::UnknownNode(id))?;
                    let client = connector.connect(node).await?;
                    topology.add_member(Member::new(node, client))?;
                }
            }
            TopologyChange::RemoveNode(id) => topology.remove_member(id)?,
        }
        self.await_stable(topology).await
    }

    async fn await_stable<C>(
        &self,
        topology: &mut Topology<C>,
    ) -> Result<()> {
        if topology.is_stable() {
            return Ok(());
        }
        let view = topology.view();
        info!(topology = %view, "waiting for topology to settle");
        self.sync.await_topology_stable(&view).await?;
        topology.mark_stable();
        Ok(())
    }

    /// Runs every plan in order, each against its own freshly connected
    /// topology.
    pub async fn run_all<N>(
        &self,
        plans: &[ScalePlan],
        cluster: &ClusterConfig,
        connector: &N,
    ) -> Vec<PlanReport>
    where
        N: NodeConnector,
    {
        let mut reports = Vec::with_capacity(plans.len());
        for plan in plans {
            let report = self.run_plan(plan, cluster, connector).await;
            info!(%report, "plan finished");
            reports.push(report);
        }
        reports
    }

    pub async fn run_plan<N>(
        &self,
        plan: &ScalePlan,
        cluster: &ClusterConfig,
        connector: &N,
    ) -> PlanReport
    where
        N: NodeConnector,
    {
        info!(plan = %plan.name, stages = plan.stages.len(), "starting plan");
        if let Err(e) = plan.validate(cluster) {
            let mut report = PlanReport::new(&plan.name);
            report.aborted = Some(e);
            return report;
        }
        let mut topology = match crate::connect_topology(cluster, connector).await {
            Ok(topology) => topology,
            Err(e) => {
                let mut report = PlanReport::new(&plan.name);
                report.aborted = Some(e);
                return report;
            }
        };
        self.run_plan_on(plan, &mut topology, cluster, connector).await
    }

    /// Runs `plan` against an already connected topology. A failed
    /// topology change ends the plan; failed scenarios do not.
    pub async fn run_plan_on<N>(
        &self,
        plan: &ScalePlan,
        topology: &mut Topology<N::Client>,
        cluster: &ClusterConfig,
        connector: &N,
    ) -> PlanReport
    where
        N: NodeConnector,
    {
        let mut report = PlanReport::new(&plan.name);
        for stage in &plan.stages {
            let stage_report = self.run_stage(stage, topology, cluster, connector).await;
            info!(plan = %plan.name, report = %stage_report, "stage finished");
            let aborted = stage_report.aborted.is_some();
            report.stages.push(stage_report);
            if aborted {
                warn!(plan = %plan.name, stage = %stage.name, "topology change failed; skipping remaining stages");
                break;
            }
        }
        report
    }

    async fn run_stage<N>(
        &self,
        stage: &Stage,
        topology: &mut Topology<N::Client>,
        cluster: &ClusterConfig,
        connector: &N,
    ) -> StageReport
    where
        N: NodeConnector,
    {
        let mut report = StageReport::new(&stage.name);
        let settled = match stage.transition {
            Some(change) => self.apply_change(topology, change, cluster, connector).await,
            None => self.await_stable(topology).await,
        };
        report.topology = topology.id();
        report.members = topology.member_ids();
        if let Err(e) = settled {
            report.aborted = Some(e);
            return report;
        }

        let carried: Vec<Expectation> = topology.expectations().cloned().collect();
        for expectation in carried {
            let outcome = self
                .verify_topology_stage(topology, &expectation.range, &expectation.template)
                .await;
            report.checks.push(CheckReport {
                prefix: expectation.range.prefix.clone(),
                origin: expectation.origin,
                outcome,
            });
        }

        report.scenarios = self.run_scenarios(topology, &stage.scenarios).await;
        report
    }

    /// Runs a stage's scenarios: concurrent per-node writes, then
    /// cross-node reads, then optional deletes.
    pub async fn run_scenarios<C>(
        &self,
        topology: &mut Topology<C>,
        scenarios: &[Scenario],
    ) -> Vec<ScenarioReport>
    where
        C: CacheClient,
    {
        let mut runs: Vec<ScenarioRun<'_>> = scenarios.iter().map(ScenarioRun::new).collect();

        {
            let mut by_node: BTreeMap<NodeId, Vec<&mut ScenarioRun<'_>>> = BTreeMap::new();
            for run in runs.iter_mut() {
                by_node.entry(run.scenario.node).or_default().push(run);
            }

            let mut writers = Vec::new();
            for member in topology.members_mut() {
                if let Some(node_runs) = by_node.remove(&member.id) {
                    writers.push(self.write_scenarios(member, node_runs));
                }
            }
            for (node, orphans) in by_node {
                for run in orphans {
                    run.fail(TopologyError::NotAMember(node).into());
                }
            }
            join_all(writers).await;
        }

        for run in runs.iter_mut().filter(|r| !r.is_failed()) {
            let range = run.scenario.range();
            let template = run.scenario.template();
            match self.verify_topology_stage(topology, &range, &template).await {
                Ok(tally) => {
                    run.record(tally);
                    topology.expect(Expectation {
                        range,
                        template,
                        origin: run.scenario.node,
                    });
                }
                Err(e) => run.fail(e),
            }
        }

        for run in runs.iter_mut().filter(|r| !r.is_failed() && r.scenario.delete_after) {
            if let Err(e) = self.delete_scenario(topology, run).await {
                run.fail(e);
            }
        }

        runs.into_iter().map(ScenarioRun::finish).collect()
    }

    async fn write_scenarios<C>(
        &self,
        member: &mut Member<C>,
        runs: Vec<&mut ScenarioRun<'_>>,
    ) where
        C: CacheClient,
    {
        for run in runs {
            if let Err(e) = self.write_scenario(member, run).await {
                run.fail(e);
            }
        }
    }

    async fn write_scenario<C>(
        &self,
        member: &mut Member<C>,
        run: &mut ScenarioRun<'_>,
    ) -> Result<()>
    where
        C: CacheClient,
    {
        let range = run.scenario.range();
        let template = run.scenario.template();

        run.advance(ScenarioPhase::Inserting)?;
        self.insert_range(member, &range, &template).await?;

        run.advance(ScenarioPhase::Reading)?;
        let mut tally = ReadTally::default();
        self.read_range(member, &range, &template, &mut tally).await?;
        run.record(tally);
        Ok(())
    }

    async fn delete_scenario<C>(
        &self,
        topology: &mut Topology<C>,
        run: &mut ScenarioRun<'_>,
    ) -> Result<()>
    where
        C: CacheClient,
    {
        run.advance(ScenarioPhase::Deleting)?;
        let range = run.scenario.range();
        let node = run.scenario.node;

        let writer = topology.member_mut(node).ok_or(TopologyError::NotAMember(node))?;
        self.delete_range(writer, &range).await?;
        topology.forget(&range.prefix);
        self.verify_absent(topology, &range).await
    }
}
