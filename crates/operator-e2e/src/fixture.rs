//! The live cluster shared by every scenario.
//!
//! Scenarios receive the fixture by reference and go through it for every
//! mutation and wait, so the selectors, poll settings and controller handle
//! are built once per suite.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tracing::{info, warn};

use crate::barrier::{ConfigPatch, ControllerHandle, RestartBarrier};
use crate::config::{HarnessConfig, LabelConfig};
use crate::error::{E2eError, Result};
use crate::failover::{FailoverExpectation, FailoverVerifier};
use crate::platform::{PlatformClient, ResourceKind, ResourceSummary};
use crate::poller::{Poller, Probe};
use crate::selector::LabelSelector;
use crate::topology::{ClusterTopology, TopologyReader};

/// Long-lived handle on the database cluster under test and its operator.
pub struct ClusterFixture {
    platform: Arc<dyn PlatformClient>,
    config: HarnessConfig,
    poller: Poller,
    reader: TopologyReader,
    controller: ControllerHandle,
    barrier: RestartBarrier,
    verifier: FailoverVerifier,
    controller_lost: AtomicBool,
}

impl ClusterFixture {
    #[must_use]
    pub fn new(platform: Arc<dyn PlatformClient>, config: HarnessConfig) -> Self {
        let poller = Poller::new(config.poll_settings());
        let reader = TopologyReader::new(platform.clone(), config.labels.clone());
        let controller = ControllerHandle::new(platform.clone(), config.controller.clone());
        let barrier = RestartBarrier::new(
            platform.clone(),
            controller.clone(),
            poller,
            config.controller_settle(),
        );
        let verifier = FailoverVerifier::new(
            platform.clone(),
            reader.clone(),
            controller.clone(),
            poller,
            config.node_exclusion_selector.clone(),
        );
        Self {
            platform,
            config,
            poller,
            reader,
            controller,
            barrier,
            verifier,
            controller_lost: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    #[must_use]
    pub fn platform(&self) -> &Arc<dyn PlatformClient> {
        &self.platform
    }

    #[must_use]
    pub fn poller(&self) -> &Poller {
        &self.poller
    }

    #[must_use]
    pub fn reader(&self) -> &TopologyReader {
        &self.reader
    }

    #[must_use]
    pub fn controller(&self) -> &ControllerHandle {
        &self.controller
    }

    #[must_use]
    pub fn verifier(&self) -> &FailoverVerifier {
        &self.verifier
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.config.namespace
    }

    #[must_use]
    pub fn cluster_name(&self) -> &str {
        &self.config.cluster_name
    }

    #[must_use]
    pub fn labels(&self) -> &LabelConfig {
        &self.config.labels
    }

    /// All member pods of the cluster.
    #[must_use]
    pub fn cluster_selector(&self) -> LabelSelector {
        let labels = self.labels();
        LabelSelector::new()
            .with(&labels.application_key, &labels.application_value)
            .with(&labels.cluster_name_key, self.cluster_name())
    }

    /// Everything the operator created for the cluster, pods and services alike.
    #[must_use]
    pub fn owned_selector(&self) -> LabelSelector {
        LabelSelector::new().with(&self.labels().cluster_name_key, self.cluster_name())
    }

    #[must_use]
    pub fn primary_selector(&self) -> LabelSelector {
        let labels = self.labels();
        self.cluster_selector()
            .with(&labels.role_key, &labels.primary_role)
    }

    #[must_use]
    pub fn replica_selector(&self) -> LabelSelector {
        let labels = self.labels();
        self.cluster_selector()
            .with(&labels.role_key, &labels.replica_role)
    }

    /// Pods and services of the connection pooler.
    #[must_use]
    pub fn pooler_selector(&self) -> LabelSelector {
        LabelSelector::new().with(
            &self.labels().pooler_key,
            format!("{}-pooler", self.cluster_name()),
        )
    }

    /// Whether a restart barrier failed and the operator is presumed dead.
    #[must_use]
    pub fn controller_lost(&self) -> bool {
        self.controller_lost.load(Ordering::SeqCst)
    }

    /// Wait for the operator, then for a running primary and (when the
    /// cluster has more than one member) a running replica.
    ///
    /// # Errors
    ///
    /// `E2eError::FatalInfrastructure` if the operator never runs, a timeout
    /// if the cluster members do not.
    pub async fn setup(&self) -> Result<()> {
        info!(
            cluster = %self.cluster_name(),
            namespace = %self.namespace(),
            "Setting up cluster fixture"
        );
        if let Err(e) = self.controller.wait_running(&self.poller).await {
            self.controller_lost.store(true, Ordering::SeqCst);
            return Err(e);
        }
        self.wait_for_running(&self.primary_selector(), 1).await?;
        if self.config.instances > 1 {
            self.wait_for_running(&self.replica_selector(), 1).await?;
        }
        let topology = self.read_topology().await?;
        info!(
            primary = ?topology.primary_node,
            replicas = ?topology.replica_nodes,
            "Cluster fixture ready"
        );
        Ok(())
    }

    /// Log the final topology. The cluster itself is left in place.
    pub async fn teardown(&self) {
        match self.read_topology().await {
            Ok(topology) => info!(
                primary = ?topology.primary_node,
                replicas = ?topology.replica_nodes,
                primaries = topology.primary_count,
                "Final cluster topology"
            ),
            Err(e) => warn!(error = %e, "Could not read final cluster topology"),
        }
    }

    /// Merge-patch the database cluster custom resource.
    pub async fn patch_cluster(&self, patch: &Value) -> Result<()> {
        info!(cluster = %self.cluster_name(), patch = %patch, "Patching cluster");
        self.platform
            .patch(
                ResourceKind::DatabaseCluster,
                self.namespace(),
                self.cluster_name(),
                patch,
            )
            .await?;
        Ok(())
    }

    /// Apply a config change through the restart barrier. A fatal failure
    /// marks the controller as lost for the rest of the suite.
    ///
    /// # Errors
    ///
    /// See [`RestartBarrier::apply_config_and_restart`].
    pub async fn update_config(&self, patch: &ConfigPatch) -> Result<()> {
        let result = self.barrier.apply_config_and_restart(patch).await;
        if let Err(e) = &result {
            if e.is_fatal() {
                self.controller_lost.store(true, Ordering::SeqCst);
            }
        }
        result
    }

    /// Current values of `keys` as a patch that restores them.
    ///
    /// Keys absent from the config map are captured as removals, so the
    /// operator falls back to its defaults after a restore.
    pub async fn snapshot_config(&self, keys: &[&str]) -> Result<ConfigPatch> {
        let current = self.controller.read_config().await?;
        Ok(keys
            .iter()
            .map(|key| ((*key).to_string(), current.get(*key).cloned()))
            .collect())
    }

    /// Put back configuration captured by [`ClusterFixture::snapshot_config`],
    /// skipping the restart when nothing differs.
    pub async fn restore_config(&self, snapshot: &ConfigPatch) -> Result<()> {
        if snapshot.is_empty() {
            return Ok(());
        }
        let current = self.controller.read_config().await?;
        let unchanged = snapshot
            .entries()
            .iter()
            .all(|(key, value)| current.get(key) == value.as_ref());
        if unchanged {
            info!("Operator configuration unchanged, no restore needed");
            return Ok(());
        }
        info!(
            keys = ?snapshot.entries().keys().collect::<Vec<_>>(),
            "Restoring operator configuration"
        );
        self.update_config(snapshot).await
    }

    pub async fn read_topology(&self) -> Result<ClusterTopology> {
        Ok(self
            .reader
            .read_topology(&self.cluster_selector(), self.namespace())
            .await?)
    }

    pub async fn assert_primary_unique(&self) -> Result<()> {
        self.reader
            .assert_primary_unique(self.namespace(), self.cluster_name())
            .await
    }

    /// Poll `kind` objects matching `selector` until `predicate` accepts the
    /// listing, returning that listing.
    ///
    /// # Errors
    ///
    /// `E2eError::TimeoutExceeded` carrying the operator log tail.
    pub async fn wait_for_objects<F>(
        &self,
        condition: &str,
        kind: ResourceKind,
        selector: &LabelSelector,
        predicate: F,
    ) -> Result<Vec<ResourceSummary>>
    where
        F: Fn(&[ResourceSummary]) -> bool,
    {
        let platform = &self.platform;
        let predicate = &predicate;
        let namespace = self.namespace();
        let result = self
            .poller
            .wait_for(condition, move || async move {
                let objects = platform.list(kind, namespace, selector).await?;
                Ok(Probe::when(predicate(&objects), objects))
            })
            .await;
        self.with_log_tail(result).await
    }

    /// Wait until exactly `expected` objects match.
    pub async fn wait_for_count(
        &self,
        kind: ResourceKind,
        selector: &LabelSelector,
        expected: usize,
    ) -> Result<()> {
        let condition = format!("{expected} {kind}(s) matching {selector}");
        self.wait_for_objects(&condition, kind, selector, |objects| {
            objects.len() == expected
        })
        .await
        .map(|_| ())
    }

    /// Wait until at least `expected` pods matching `selector` are running.
    pub async fn wait_for_running(&self, selector: &LabelSelector, expected: usize) -> Result<()> {
        let condition = format!("{expected} running pod(s) matching {selector}");
        self.wait_for_objects(&condition, ResourceKind::Pod, selector, |pods| {
            pods.iter().filter(|p| p.is_running()).count() >= expected
        })
        .await
        .map(|_| ())
    }

    /// Fail unless `selector` still matches exactly `expected` objects.
    ///
    /// A single read: used after a no-op mutation to confirm nothing moved.
    pub async fn assert_count(
        &self,
        kind: ResourceKind,
        selector: &LabelSelector,
        expected: usize,
    ) -> Result<()> {
        let found = self
            .reader
            .count_matching(kind, selector, self.namespace())
            .await?;
        if found == expected {
            Ok(())
        } else {
            Err(E2eError::InvariantViolated(format!(
                "Expected {expected} {kind}(s) matching {selector}, found {found}"
            )))
        }
    }

    /// Sample the count once per poll interval, `samples` times, failing on
    /// the first deviation from `expected`.
    pub async fn assert_count_holds(
        &self,
        kind: ResourceKind,
        selector: &LabelSelector,
        expected: usize,
        samples: u32,
    ) -> Result<()> {
        for sample in 0..samples {
            if sample > 0 {
                tokio::time::sleep(self.poller.settings().interval).await;
            }
            self.assert_count(kind, selector, expected).await?;
        }
        Ok(())
    }

    pub async fn patch_node(&self, node: &str, patch: &Value) -> Result<()> {
        info!(node = %node, patch = %patch, "Patching node");
        self.platform.patch_node(node, patch).await?;
        Ok(())
    }

    /// Snapshot the topology and compute where its primary may fail over to.
    pub async fn expect_failover(&self) -> Result<FailoverExpectation> {
        let topology = self.read_topology().await?;
        let targets = self.verifier.compute_failover_targets(&topology).await?;
        Ok(FailoverExpectation::new(&topology, targets))
    }

    pub async fn verify_failover(&self, expectation: &FailoverExpectation) -> Result<ClusterTopology> {
        self.verifier
            .verify_failover(
                expectation,
                &self.cluster_selector(),
                self.namespace(),
                self.cluster_name(),
            )
            .await
    }

    /// Operator log tail for diagnostics.
    pub async fn log_tail(&self) -> Option<String> {
        self.controller.log_tail().await
    }

    async fn with_log_tail<T>(&self, result: Result<T>) -> Result<T> {
        match result {
            Err(e @ E2eError::TimeoutExceeded { .. }) => {
                Err(e.with_diagnostics(self.log_tail().await))
            }
            other => other,
        }
    }
}
