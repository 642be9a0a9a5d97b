//! Topology-change synchronization.
//!
//! The verifier never reads from a topology that has just changed until a
//! [`TopologySync`] confirms the cluster finished rebalancing.

use std::time::Duration;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tokio::io::AsyncBufRead;
use tokio::io::AsyncBufReadExt;
use tokio::io::BufReader;
use tokio::io::Stdin;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::BackoffPolicy;
use crate::Connection;
use crate::MemberAddress;
use crate::NetworkConfig;
use crate::Result;
use crate::SyncConfig;
use crate::SyncError;
use crate::SyncMode;
use crate::TopologyView;

#[cfg_attr(test, automock)]
#[async_trait]
pub trait TopologySync: Send + Sync {
    /// Resolves once every member of `topology` serves the rebalanced data.
    ///
    /// # Errors
    ///
    /// [`SyncError`] if the change is aborted or never settles. The caller
    /// must not read from the topology in that case.
    async fn await_topology_stable(
        &self,
        topology: &TopologyView,
    ) -> Result<()>;
}

/// Treats every topology as already settled.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImmediateSync;

#[async_trait]
impl TopologySync for ImmediateSync {
    async fn await_topology_stable(
        &self,
        topology: &TopologyView,
    ) -> Result<()> {
        debug!(%topology, "assuming topology is stable");
        Ok(())
    }
}

/// Waits for an operator to confirm each topology change.
///
/// Any line confirms; `abort` (or closing the input) cancels the change.
pub struct OperatorPrompt<R> {
    input: Mutex<R>,
}

impl OperatorPrompt<BufReader<Stdin>> {
    pub fn stdin() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()))
    }
}

impl<R> OperatorPrompt<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    pub fn new(input: R) -> Self {
        Self {
            input: Mutex::new(input),
        }
    }
}

#[async_trait]
impl<R> TopologySync for OperatorPrompt<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    async fn await_topology_stable(
        &self,
        topology: &TopologyView,
    ) -> Result<()> {
        let change = topology.change.map(|c| c.to_string()).unwrap_or_else(|| "no change".to_string());
        eprintln!(
            "Topology {topology} ({change}). Press Enter once rebalancing is complete, or type 'abort':"
        );

        let mut input = self.input.lock().await;
        let mut line = String::new();
        let n = input.read_line(&mut line).await.map_err(SyncError::Input)?;
        if n == 0 {
            return Err(SyncError::Aborted {
                topology: topology.id,
                reason: "operator input closed".to_string(),
            }
            .into());
        }
        if line.trim().eq_ignore_ascii_case("abort") {
            warn!(topology = %topology.id, "operator aborted topology change");
            return Err(SyncError::Aborted {
                topology: topology.id,
                reason: "operator abort".to_string(),
            }
            .into());
        }

        info!(topology = %topology.id, "operator confirmed topology");
        Ok(())
    }
}

/// Polls every member with `version` until it answers, then waits a fixed
/// settle delay.
#[derive(Debug, Clone)]
pub struct ProbeSync {
    network: NetworkConfig,
    policy: BackoffPolicy,
    settle_delay: Duration,
}

impl ProbeSync {
    pub fn new(
        network: &NetworkConfig,
        policy: BackoffPolicy,
        settle_delay: Duration,
    ) -> Self {
        // Each probe is bounded by the policy, not the data-path timeouts
        let mut network = network.clone();
        network.connect_timeout_in_ms = policy.timeout_ms;
        network.request_timeout_in_ms = policy.timeout_ms;
        Self {
            network,
            policy,
            settle_delay,
        }
    }

    async fn probe(
        &self,
        member: &MemberAddress,
    ) -> Result<String> {
        let mut connection = Connection::connect_addr(member.label.clone(), &member.address, &self.network).await?;
        connection.version().await
    }

    async fn await_member(
        &self,
        topology: &TopologyView,
        member: &MemberAddress,
    ) -> Result<()> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.probe(member).await {
                Ok(version) => {
                    debug!(node = %member.label, %version, attempts, "member ready");
                    return Ok(());
                }
                Err(e) => debug!(node = %member.label, attempts, "probe failed: {e}"),
            }

            if self.policy.is_exhausted(attempts) {
                return Err(SyncError::ProbeExhausted {
                    topology: topology.id,
                    node: member.label.clone(),
                    attempts,
                }
                .into());
            }
            sleep(self.policy.delay_for(attempts - 1)).await;
        }
    }
}

#[async_trait]
impl TopologySync for ProbeSync {
    async fn await_topology_stable(
        &self,
        topology: &TopologyView,
    ) -> Result<()> {
        for member in &topology.members {
            self.await_member(topology, member).await?;
        }
        if !self.settle_delay.is_zero() {
            debug!(topology = %topology.id, delay = ?self.settle_delay, "waiting for rebalancing to settle");
            sleep(self.settle_delay).await;
        }
        info!(topology = %topology.id, "all members answered probes");
        Ok(())
    }
}

/// Synchronizer selected by `sync.mode`.
pub enum SyncStrategy {
    Operator(OperatorPrompt<BufReader<Stdin>>),
    Probe(ProbeSync),
    Immediate(ImmediateSync),
}

impl SyncStrategy {
    pub fn from_config(
        sync: &SyncConfig,
        network: &NetworkConfig,
    ) -> Self {
        match sync.mode {
            SyncMode::Operator => SyncStrategy::Operator(OperatorPrompt::stdin()),
            SyncMode::Probe => SyncStrategy::Probe(ProbeSync::new(
                network,
                sync.probe,
                Duration::from_millis(sync.settle_delay_in_ms),
            )),
            SyncMode::Immediate => SyncStrategy::Immediate(ImmediateSync),
        }
    }
}

#[async_trait]
impl TopologySync for SyncStrategy {
    async fn await_topology_stable(
        &self,
        topology: &TopologyView,
    ) -> Result<()> {
        match self {
            SyncStrategy::Operator(prompt) => prompt.await_topology_stable(topology).await,
            SyncStrategy::Probe(probe) => probe.await_topology_stable(topology).await,
            SyncStrategy::Immediate(immediate) => immediate.await_topology_stable(topology).await,
        }
    }
}
