//! Outcome summaries for plans, stages and scenarios.

use std::fmt;

use crate::Error;
use crate::FormatDefect;
use crate::NodeId;
use crate::ScenarioPhase;
use crate::TopologyId;

/// Read-back counters: exact metadata matches versus tolerated defects.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadTally {
    pub exact: usize,
    pub tolerated: Vec<FormatDefect>,
}

impl ReadTally {
    pub fn merge(
        &mut self,
        other: ReadTally,
    ) {
        self.exact += other.exact;
        self.tolerated.extend(other.tolerated);
    }

    pub fn reads(&self) -> usize {
        self.exact + self.tolerated.len()
    }
}

impl fmt::Display for ReadTally {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{} exact, {} tolerated", self.exact, self.tolerated.len())
    }
}

#[derive(Debug)]
pub enum ScenarioOutcome {
    Passed,
    Failed { phase: ScenarioPhase, error: Error },
}

#[derive(Debug)]
pub struct ScenarioReport {
    pub name: String,
    pub node: NodeId,
    pub outcome: ScenarioOutcome,
    pub tally: ReadTally,
}

impl ScenarioReport {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, ScenarioOutcome::Passed)
    }

    pub fn error(&self) -> Option<&Error> {
        match &self.outcome {
            ScenarioOutcome::Passed => None,
            ScenarioOutcome::Failed { error, .. } => Some(error),
        }
    }
}

impl fmt::Display for ScenarioReport {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match &self.outcome {
            ScenarioOutcome::Passed => write!(f, "scenario {} via n{}: passed ({})", self.name, self.node, self.tally),
            ScenarioOutcome::Failed { phase, error } => {
                write!(f, "scenario {} via n{}: FAILED while {phase}: {error}", self.name, self.node)
            }
        }
    }
}

/// Re-verification of a range written in an earlier stage.
#[derive(Debug)]
pub struct CheckReport {
    pub prefix: String,
    pub origin: NodeId,
    pub outcome: std::result::Result<ReadTally, Error>,
}

impl CheckReport {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}

impl fmt::Display for CheckReport {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match &self.outcome {
            Ok(tally) => write!(f, "check {}* (from n{}): passed ({tally})", self.prefix, self.origin),
            Err(error) => write!(f, "check {}* (from n{}): FAILED: {error}", self.prefix, self.origin),
        }
    }
}

#[derive(Debug)]
pub struct StageReport {
    pub name: String,
    pub topology: TopologyId,
    pub members: Vec<NodeId>,
    /// Set when the topology change itself failed; nothing else ran
    pub aborted: Option<Error>,
    pub checks: Vec<CheckReport>,
    pub scenarios: Vec<ScenarioReport>,
}

impl StageReport {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            topology: TopologyId::default(),
            members: Vec::new(),
            aborted: None,
            checks: Vec::new(),
            scenarios: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.aborted.is_none()
            && self.checks.iter().all(CheckReport::is_success)
            && self.scenarios.iter().all(ScenarioReport::is_success)
    }

    fn tallies(&self) -> impl Iterator<Item = &ReadTally> {
        self.checks
            .iter()
            .filter_map(|c| c.outcome.as_ref().ok())
            .chain(self.scenarios.iter().map(|s| &s.tally))
    }
}

impl fmt::Display for StageReport {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        if let Some(error) = &self.aborted {
            return write!(f, "stage {} at {}: ABORTED: {error}", self.name, self.topology);
        }
        let failed = self.checks.iter().filter(|c| !c.is_success()).count()
            + self.scenarios.iter().filter(|s| !s.is_success()).count();
        write!(
            f,
            "stage {} at {} members {:?}: {} checks, {} scenarios, {failed} failed",
            self.name,
            self.topology,
            self.members,
            self.checks.len(),
            self.scenarios.len()
        )
    }
}

#[derive(Debug)]
pub struct PlanReport {
    pub name: String,
    /// Set when the plan could not start, e.g. an initial member is down
    pub aborted: Option<Error>,
    pub stages: Vec<StageReport>,
}

impl PlanReport {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            aborted: None,
            stages: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.aborted.is_none() && self.stages.iter().all(StageReport::is_success)
    }

    /// Every defect a tolerant run let through, in the order observed.
    pub fn tolerated_defects(&self) -> Vec<&FormatDefect> {
        self.stages
            .iter()
            .flat_map(StageReport::tallies)
            .flat_map(|t| t.tolerated.iter())
            .collect()
    }

    pub fn exact_reads(&self) -> usize {
        self.stages.iter().flat_map(StageReport::tallies).map(|t| t.exact).sum()
    }
}

impl fmt::Display for PlanReport {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        if let Some(error) = &self.aborted {
            return write!(f, "plan {}: ABORTED before the first stage: {error}", self.name);
        }
        let verdict = if self.is_success() { "passed" } else { "FAILED" };
        write!(
            f,
            "plan {}: {verdict} ({} stages, {} exact reads, {} tolerated defects)",
            self.name,
            self.stages.len(),
            self.exact_reads(),
            self.tolerated_defects().len()
        )
    }
}
