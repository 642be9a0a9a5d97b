use std::fmt;

use bytes::Bytes;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;
use tracing::error;

use crate::validate_key;
use crate::ClusterConfig;
use crate::Error;
use crate::Exptime;
use crate::NodeId;
use crate::ReadTally;
use crate::Record;
use crate::Result;
use crate::ScenarioOutcome;
use crate::ScenarioReport;
use crate::TopologyChange;

/// Keys `prefix0 ..= prefix{count}`; `count + 1` keys in total.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRange {
    pub prefix: String,
    pub count: u32,
}

impl KeyRange {
    pub fn new(
        prefix: impl Into<String>,
        count: u32,
    ) -> Self {
        Self {
            prefix: prefix.into(),
            count,
        }
    }

    pub fn key(
        &self,
        index: u32,
    ) -> String {
        format!("{}{}", self.prefix, index)
    }

    pub fn keys(&self) -> impl Iterator<Item = String> + '_ {
        (0..=self.count).map(move |i| self.key(i))
    }

    pub fn len(&self) -> usize {
        self.count as usize + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Whether the two ranges share at least one key.
    ///
    /// `k` with count 20 and `k1` with count 5 both contain `k10`: a key of
    /// the shorter prefix spells the extra digits of the longer one followed
    /// by an index, and the smallest such index is `<digits>0`.
    pub fn overlaps(
        &self,
        other: &KeyRange,
    ) -> bool {
        let (short, long) = if self.prefix.len() <= other.prefix.len() {
            (self, other)
        } else {
            (other, self)
        };
        let Some(extra) = long.prefix.strip_prefix(short.prefix.as_str()) else {
            return false;
        };
        if extra.is_empty() {
            return true;
        }
        // Indexes are written without leading zeros
        if extra.starts_with('0') || !extra.bytes().all(|b| b.is_ascii_digit()) {
            return false;
        }
        match extra.parse::<u64>() {
            Ok(lead) => lead
                .checked_mul(10)
                .is_some_and(|smallest| smallest <= u64::from(short.count)),
            Err(_) => false,
        }
    }
}

/// Everything but the key of the records a range stores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordTemplate {
    pub flag: u32,
    pub exptime: Exptime,
    pub value: Bytes,
}

impl RecordTemplate {
    pub fn new(value: impl Into<Bytes>) -> Self {
        Self {
            flag: 0,
            exptime: Exptime::Never,
            value: value.into(),
        }
    }

    pub fn record(
        &self,
        key: impl Into<String>,
    ) -> Record {
        Record::new(key, self.value.clone())
            .with_flag(self.flag)
            .with_exptime(self.exptime)
    }
}

/// Named insert/read/(delete) workload against one target node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    pub prefix: String,
    pub count: u32,
    /// Node that receives the writes
    pub node: NodeId,
    #[serde(default)]
    pub flag: u32,
    #[serde(default = "default_exptime")]
    pub exptime: Exptime,
    #[serde(default = "default_value")]
    pub value: String,
    /// Delete the range once it has been verified from every member
    #[serde(default)]
    pub delete_after: bool,
}

impl Scenario {
    pub fn new(
        name: impl Into<String>,
        prefix: impl Into<String>,
        count: u32,
        node: NodeId,
    ) -> Self {
        Self {
            name: name.into(),
            prefix: prefix.into(),
            count,
            node,
            flag: 0,
            exptime: default_exptime(),
            value: default_value(),
            delete_after: false,
        }
    }

    pub fn range(&self) -> KeyRange {
        KeyRange::new(self.prefix.clone(), self.count)
    }

    pub fn template(&self) -> RecordTemplate {
        RecordTemplate {
            flag: self.flag,
            exptime: self.exptime,
            value: Bytes::from(self.value.clone()),
        }
    }

    fn validate(
        &self,
        cluster: &ClusterConfig,
    ) -> Result<()> {
        if cluster.node(self.node).is_none() {
            return Err(Error::InvalidConfig(format!(
                "Scenario {} targets node {} which is not in cluster.nodes",
                self.name, self.node
            )));
        }
        let range = self.range();
        for key in [range.key(0), range.key(range.count)] {
            validate_key(&key).map_err(|e| Error::InvalidConfig(format!("Scenario {}: {e}", self.name)))?;
        }
        self.template()
            .record(range.key(0))
            .validate()
            .map_err(|e| Error::InvalidConfig(format!("Scenario {}: {e}", self.name)))?;
        Ok(())
    }
}

/// Optional topology change followed by the scenarios run on the result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    pub name: String,
    #[serde(default)]
    pub transition: Option<TopologyChange>,
    #[serde(default)]
    pub scenarios: Vec<Scenario>,
}

/// Ordered stages run against one topology.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScalePlan {
    pub name: String,
    #[serde(default)]
    pub stages: Vec<Stage>,
}

impl ScalePlan {
    /// Checks node references and key material, and that no two ranges
    /// that can coexist share a key: neither the scenarios of one stage
    /// nor a scenario and a range carried over from an earlier stage.
    pub fn validate(
        &self,
        cluster: &ClusterConfig,
    ) -> Result<()> {
        if self.stages.is_empty() {
            return Err(Error::InvalidConfig(format!("Plan {} has no stages", self.name)));
        }

        // Ranges still verified at the start of each stage, by prefix
        let mut carried: Vec<KeyRange> = Vec::new();
        for stage in &self.stages {
            if let Some(change) = &stage.transition {
                if cluster.node(change.node()).is_none() {
                    return Err(Error::InvalidConfig(format!(
                        "Stage {} changes node {} which is not in cluster.nodes",
                        stage.name,
                        change.node()
                    )));
                }
            }

            let ranges: Vec<KeyRange> = stage.scenarios.iter().map(Scenario::range).collect();
            for (i, scenario) in stage.scenarios.iter().enumerate() {
                scenario.validate(cluster)?;
                let range = &ranges[i];
                if let Some(other) = stage.scenarios[..i].iter().zip(&ranges).find(|(_, r)| r.overlaps(range)) {
                    return Err(Error::InvalidConfig(format!(
                        "Stage {}: scenarios {} and {} write overlapping keys ({:?} and {:?})",
                        stage.name, other.0.name, scenario.name, other.1.prefix, range.prefix
                    )));
                }
                // Rewriting a carried prefix replaces its expectation
                if let Some(held) = carried.iter().find(|c| c.prefix != range.prefix && c.overlaps(range)) {
                    return Err(Error::InvalidConfig(format!(
                        "Stage {}: scenario {} writes keys of the carried range {:?}",
                        stage.name, scenario.name, held.prefix
                    )));
                }
            }

            for (scenario, range) in stage.scenarios.iter().zip(ranges) {
                carried.retain(|c| c.prefix != range.prefix);
                if !scenario.delete_after {
                    carried.push(range);
                }
            }
        }
        Ok(())
    }
}

fn default_exptime() -> Exptime {
    Exptime::Never
}
fn default_value() -> String {
    "abcde".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioPhase {
    Idle,
    Inserting,
    Reading,
    Deleting,
}

impl ScenarioPhase {
    fn can_enter(
        self,
        next: ScenarioPhase,
    ) -> bool {
        matches!(
            (self, next),
            (ScenarioPhase::Idle, ScenarioPhase::Inserting)
                | (ScenarioPhase::Inserting, ScenarioPhase::Reading)
                | (ScenarioPhase::Reading, ScenarioPhase::Deleting)
                | (ScenarioPhase::Reading, ScenarioPhase::Idle)
                | (ScenarioPhase::Deleting, ScenarioPhase::Idle)
        )
    }
}

impl fmt::Display for ScenarioPhase {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let name = match self {
            ScenarioPhase::Idle => "idle",
            ScenarioPhase::Inserting => "inserting",
            ScenarioPhase::Reading => "reading",
            ScenarioPhase::Deleting => "deleting",
        };
        f.write_str(name)
    }
}

/// Progress of one scenario through its phases.
#[derive(Debug)]
pub struct ScenarioRun<'a> {
    pub scenario: &'a Scenario,
    phase: ScenarioPhase,
    tally: ReadTally,
    failure: Option<(ScenarioPhase, Error)>,
}

impl<'a> ScenarioRun<'a> {
    pub fn new(scenario: &'a Scenario) -> Self {
        Self {
            scenario,
            phase: ScenarioPhase::Idle,
            tally: ReadTally::default(),
            failure: None,
        }
    }

    pub fn phase(&self) -> ScenarioPhase {
        self.phase
    }

    pub fn is_failed(&self) -> bool {
        self.failure.is_some()
    }

    pub fn advance(
        &mut self,
        next: ScenarioPhase,
    ) -> Result<()> {
        if self.is_failed() || !self.phase.can_enter(next) {
            return Err(Error::Fatal(format!(
                "scenario {}: illegal phase transition {} -> {}",
                self.scenario.name, self.phase, next
            )));
        }
        debug!(scenario = %self.scenario.name, from = %self.phase, to = %next, "phase");
        self.phase = next;
        Ok(())
    }

    pub fn record(
        &mut self,
        tally: ReadTally,
    ) {
        self.tally.merge(tally);
    }

    /// Aborts the remaining phases of this scenario.
    pub fn fail(
        &mut self,
        error: Error,
    ) {
        error!(scenario = %self.scenario.name, phase = %self.phase, %error, "scenario failed");
        if self.failure.is_none() {
            self.failure = Some((self.phase, error));
        }
        self.phase = ScenarioPhase::Idle;
    }

    pub fn finish(mut self) -> ScenarioReport {
        let outcome = match self.failure.take() {
            Some((phase, error)) => ScenarioOutcome::Failed { phase, error },
            None => match self.advance(ScenarioPhase::Idle) {
                Ok(()) => ScenarioOutcome::Passed,
                Err(error) => ScenarioOutcome::Failed {
                    phase: self.phase,
                    error,
                },
            },
        };

        ScenarioReport {
            name: self.scenario.name.clone(),
            node: self.scenario.node,
            outcome,
            tally: self.tally,
        }
    }
}
