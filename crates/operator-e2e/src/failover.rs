//! Failover target computation and post-failover verification.
//!
//! Waiting for convergence and asserting the final invariants are separate
//! steps: the wait predicate can catch a one-tick coincidence during a double
//! failover, so uniqueness of the primary is checked again on the state that
//! is observed after the wait.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::barrier::ControllerHandle;
use crate::error::{E2eError, Result};
use crate::platform::{PlatformClient, ResourceKind};
use crate::poller::{Poller, Probe};
use crate::selector::LabelSelector;
use crate::topology::{ClusterTopology, TopologyReader};

/// What a completed failover must look like.
///
/// Computed once from the topology observed just before the triggering
/// mutation and left untouched for the duration of the wait.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailoverExpectation {
    pub prior_primary_node: String,
    pub acceptable_target_nodes: BTreeSet<String>,
    pub expected_replica_count: usize,
}

impl FailoverExpectation {
    #[must_use]
    pub fn new(topology: &ClusterTopology, targets: BTreeSet<String>) -> Self {
        Self {
            prior_primary_node: topology.primary_node.clone().unwrap_or_default(),
            acceptable_target_nodes: targets,
            expected_replica_count: topology.replica_count(),
        }
    }

    /// Whether `topology` shows a completed failover.
    #[must_use]
    pub fn is_met_by(&self, topology: &ClusterTopology) -> bool {
        topology.primary_running()
            && topology
                .primary_node
                .as_ref()
                .is_some_and(|node| self.acceptable_target_nodes.contains(node))
            && topology.replica_count() == self.expected_replica_count
    }
}

/// Replica nodes other than the primary's node.
#[must_use]
pub fn replica_targets(topology: &ClusterTopology) -> BTreeSet<String> {
    let primary = topology.primary_node.as_deref().unwrap_or_default();
    topology
        .replica_nodes
        .iter()
        .filter(|node| !node.is_empty() && node.as_str() != primary)
        .cloned()
        .collect()
}

/// Small-cluster policy: when every replica shares the primary's node (or
/// there are none), any eligible node other than the primary's will do.
#[must_use]
pub fn node_pool_targets(topology: &ClusterTopology, eligible_nodes: &[String]) -> BTreeSet<String> {
    let primary = topology.primary_node.as_deref().unwrap_or_default();
    eligible_nodes
        .iter()
        .filter(|node| !node.is_empty() && node.as_str() != primary)
        .cloned()
        .collect()
}

/// Computes failover targets and waits for failovers to complete.
#[derive(Clone)]
pub struct FailoverVerifier {
    platform: Arc<dyn PlatformClient>,
    reader: TopologyReader,
    controller: ControllerHandle,
    poller: Poller,
    node_exclusion: LabelSelector,
}

impl FailoverVerifier {
    #[must_use]
    pub fn new(
        platform: Arc<dyn PlatformClient>,
        reader: TopologyReader,
        controller: ControllerHandle,
        poller: Poller,
        node_exclusion: LabelSelector,
    ) -> Self {
        Self {
            platform,
            reader,
            controller,
            poller,
            node_exclusion,
        }
    }

    /// Nodes the primary may legitimately fail over to.
    ///
    /// Replica nodes other than the primary's come first; the node pool is
    /// only consulted when they supply no alternative.
    ///
    /// # Errors
    ///
    /// `E2eError::InvariantViolated` if no node other than the primary's is
    /// eligible, since no failover could ever complete.
    pub async fn compute_failover_targets(
        &self,
        topology: &ClusterTopology,
    ) -> Result<BTreeSet<String>> {
        let targets = replica_targets(topology);
        if !targets.is_empty() {
            return Ok(targets);
        }

        let nodes = self
            .platform
            .list(ResourceKind::Node, "", &self.node_exclusion)
            .await?;
        let eligible: Vec<String> = nodes.into_iter().map(|n| n.name).collect();
        let targets = node_pool_targets(topology, &eligible);
        info!(
            primary = ?topology.primary_node,
            targets = ?targets,
            "No replica on another node, falling back to node pool"
        );
        if targets.is_empty() {
            return Err(E2eError::InvariantViolated(format!(
                "no failover target: nodes matching '{}' are {:?}, primary is on {}",
                self.node_exclusion,
                eligible,
                topology.primary_node.as_deref().unwrap_or("no node"),
            )));
        }
        Ok(targets)
    }

    /// Wait until the primary runs on an acceptable node with the expected
    /// number of replicas.
    ///
    /// # Errors
    ///
    /// `E2eError::TimeoutExceeded` with the last seen topology and the
    /// operator log tail.
    pub async fn await_failover(
        &self,
        expectation: &FailoverExpectation,
        selector: &LabelSelector,
        namespace: &str,
    ) -> Result<ClusterTopology> {
        info!(
            prior_primary = %expectation.prior_primary_node,
            targets = ?expectation.acceptable_target_nodes,
            replicas = expectation.expected_replica_count,
            "Waiting for failover"
        );
        let reader = &self.reader;
        let result = self
            .poller
            .wait_for("primary failover to a target node", move || async move {
                let topology = reader.read_topology(selector, namespace).await?;
                Ok(Probe::when(expectation.is_met_by(&topology), topology))
            })
            .await;

        match result {
            Ok(topology) => Ok(topology),
            Err(e @ E2eError::TimeoutExceeded { .. }) => {
                warn!(error = %e, "Failover did not complete");
                Err(e.with_diagnostics(self.controller.log_tail().await))
            }
            Err(e) => Err(e),
        }
    }

    /// Full failover check: wait for convergence, wait for the replicas to
    /// run again, then assert the final state.
    ///
    /// # Errors
    ///
    /// Timeouts from the waits; `E2eError::InvariantViolated` if the primary
    /// did not move, the replica count changed, or the primary is not unique.
    pub async fn verify_failover(
        &self,
        expectation: &FailoverExpectation,
        cluster_selector: &LabelSelector,
        namespace: &str,
        cluster_name: &str,
    ) -> Result<ClusterTopology> {
        self.await_failover(expectation, cluster_selector, namespace)
            .await?;

        let labels = self.reader.labels();
        let replicas = cluster_selector.clone().with(&labels.role_key, &labels.replica_role);
        self.wait_replicas_running(&replicas, namespace, expectation.expected_replica_count)
            .await?;

        let topology = self.reader.read_topology(cluster_selector, namespace).await?;
        check_failover_outcome(expectation, &topology)?;
        self.reader
            .assert_primary_unique(namespace, cluster_name)
            .await?;

        info!(
            new_primary = ?topology.primary_node,
            replicas = ?topology.replica_nodes,
            "Failover verified"
        );
        Ok(topology)
    }

    async fn wait_replicas_running(
        &self,
        selector: &LabelSelector,
        namespace: &str,
        expected: usize,
    ) -> Result<()> {
        if expected == 0 {
            return Ok(());
        }
        let platform = &self.platform;
        self.poller
            .wait_for("replica pods running", move || async move {
                let pods = platform.list(ResourceKind::Pod, namespace, selector).await?;
                let running = pods.iter().filter(|p| p.is_running()).count();
                Ok(Probe::when(running >= expected, running))
            })
            .await
            .map(|_| ())
    }
}

/// Assert the converged topology differs from the prior one as a failover must.
///
/// # Errors
///
/// `E2eError::InvariantViolated` describing the first broken invariant.
pub fn check_failover_outcome(
    expectation: &FailoverExpectation,
    topology: &ClusterTopology,
) -> Result<()> {
    let new_primary = topology.primary_node.as_deref().unwrap_or_default();
    if new_primary == expectation.prior_primary_node {
        return Err(E2eError::InvariantViolated(format!(
            "Primary on {} did not fail over to one of {:?}",
            expectation.prior_primary_node, expectation.acceptable_target_nodes
        )));
    }
    if topology.replica_count() != expectation.expected_replica_count {
        return Err(E2eError::InvariantViolated(format!(
            "Expected {} replicas, found {}",
            expectation.expected_replica_count,
            topology.replica_count()
        )));
    }
    Ok(())
}
