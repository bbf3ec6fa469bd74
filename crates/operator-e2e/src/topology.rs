//! Primary/replica placement derived from a live pod listing.

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::config::LabelConfig;
use crate::error::{E2eError, Result};
use crate::platform::{PlatformClient, PlatformError, ResourceKind, ResourceSummary};
use crate::selector::LabelSelector;

/// Where the cluster members run, as seen by one pod listing.
///
/// Never cached: every read builds a fresh value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClusterTopology {
    /// Node of the primary pod; empty string if the pod is not scheduled yet.
    pub primary_node: Option<String>,
    /// Phase of the primary pod.
    pub primary_phase: Option<String>,
    /// Node of every replica pod, one entry per pod.
    pub replica_nodes: Vec<String>,
    /// Number of pods carrying the primary role. More than one is only
    /// acceptable mid-transition.
    pub primary_count: usize,
}

impl ClusterTopology {
    #[must_use]
    pub fn has_primary(&self) -> bool {
        self.primary_node.is_some()
    }

    #[must_use]
    pub fn primary_running(&self) -> bool {
        self.primary_phase.as_deref() == Some("Running")
    }

    #[must_use]
    pub fn replica_count(&self) -> usize {
        self.replica_nodes.len()
    }

    /// Classify pods by role label. Pods without a recognised role are ignored.
    #[must_use]
    pub fn from_pods(pods: &[ResourceSummary], labels: &LabelConfig) -> Self {
        let mut topology = Self::default();
        for pod in pods {
            let node = pod.node_name.clone().unwrap_or_default();
            match pod.label(&labels.role_key) {
                Some(role) if role == labels.primary_role => {
                    topology.primary_count += 1;
                    if topology.primary_node.is_none() {
                        topology.primary_node = Some(node);
                        topology.primary_phase.clone_from(&pod.phase);
                    }
                }
                Some(role) if role == labels.replica_role => topology.replica_nodes.push(node),
                _ => {}
            }
        }
        topology
    }
}

/// Reads topology and object counts. One list call per read, no retries:
/// retrying belongs to the poller.
#[derive(Clone)]
pub struct TopologyReader {
    platform: Arc<dyn PlatformClient>,
    labels: LabelConfig,
}

impl TopologyReader {
    #[must_use]
    pub fn new(platform: Arc<dyn PlatformClient>, labels: LabelConfig) -> Self {
        Self { platform, labels }
    }

    #[must_use]
    pub fn labels(&self) -> &LabelConfig {
        &self.labels
    }

    /// Current topology of the pods matching `selector`.
    ///
    /// An empty listing (cluster mid-transition) yields an empty topology.
    pub async fn read_topology(
        &self,
        selector: &LabelSelector,
        namespace: &str,
    ) -> Result<ClusterTopology, PlatformError> {
        let pods = self
            .platform
            .list(ResourceKind::Pod, namespace, selector)
            .await?;
        let topology = ClusterTopology::from_pods(&pods, &self.labels);
        debug!(
            selector = %selector,
            primary = ?topology.primary_node,
            replicas = ?topology.replica_nodes,
            "Read cluster topology"
        );
        Ok(topology)
    }

    /// Number of objects of `kind` matching `selector`.
    pub async fn count_matching(
        &self,
        kind: ResourceKind,
        selector: &LabelSelector,
        namespace: &str,
    ) -> Result<usize, PlatformError> {
        Ok(self.platform.list(kind, namespace, selector).await?.len())
    }

    /// Number of pods matching `selector`.
    pub async fn count_pods(
        &self,
        selector: &LabelSelector,
        namespace: &str,
    ) -> Result<usize, PlatformError> {
        self.count_matching(ResourceKind::Pod, selector, namespace)
            .await
    }

    /// Assert exactly one pod of `cluster_name` carries the primary role.
    ///
    /// # Errors
    ///
    /// `E2eError::InvariantViolated` when zero or several primaries exist.
    pub async fn assert_primary_unique(&self, namespace: &str, cluster_name: &str) -> Result<()> {
        let selector = LabelSelector::new()
            .with(&self.labels.role_key, &self.labels.primary_role)
            .with(&self.labels.cluster_name_key, cluster_name);
        let count = self.count_pods(&selector, namespace).await?;
        ensure_single_primary(count, cluster_name)
    }
}

/// Fail unless exactly one primary was observed.
///
/// # Errors
///
/// `E2eError::InvariantViolated` naming the count found.
pub fn ensure_single_primary(count: usize, cluster_name: &str) -> Result<()> {
    if count == 1 {
        Ok(())
    } else {
        Err(E2eError::InvariantViolated(format!(
            "Expected 1 primary pod in cluster {cluster_name}, found {count}"
        )))
    }
}
