//! Failover driven by node state: a missing readiness label or a NoExecute
//! taint on the primary's node.

use async_trait::async_trait;
use serde_json::json;
use tracing::{info, warn};

use super::Scenario;
use crate::barrier::ConfigPatch;
use crate::error::Result;
use crate::failover::FailoverExpectation;
use crate::fixture::ClusterFixture;

const READINESS_LABEL: &str = "lifecycle-status";
const READINESS_VALUE: &str = "ready";
const TAINT_KEY: &str = "postgres";
const TOLERATION: &str = "key:postgres,operator:Exists,effect:NoExecute";
const ANTI_AFFINITY_KEY: &str = "enable_pod_antiaffinity";

/// Spread the members over nodes by toggling pod anti-affinity.
///
/// Earlier steps can leave primary and replica on one node. Enabling
/// anti-affinity moves the replica away, which the operator completes with a
/// switchover; disabling it again rolls the pods once more.
pub async fn rebalance_with_anti_affinity(fixture: &ClusterFixture) -> Result<()> {
    let expectation = fixture.expect_failover().await?;
    info!(targets = ?expectation.acceptable_target_nodes, "Enabling pod anti-affinity");
    fixture
        .update_config(&ConfigPatch::new().set(ANTI_AFFINITY_KEY, "true"))
        .await?;
    fixture.verify_failover(&expectation).await?;

    fixture
        .update_config(&ConfigPatch::new().set(ANTI_AFFINITY_KEY, "false"))
        .await?;
    fixture
        .wait_for_running(&fixture.primary_selector(), 1)
        .await?;
    fixture
        .wait_for_running(&fixture.replica_selector(), 1)
        .await
}

/// Require a readiness label on database nodes that the primary's node lacks.
pub struct NodeReadinessLabel;

#[async_trait]
impl Scenario for NodeReadinessLabel {
    fn name(&self) -> &'static str {
        "node-readiness-label"
    }

    fn description(&self) -> &'static str {
        "Fail over when the primary's node lacks the readiness label"
    }

    fn config_keys(&self) -> &'static [&'static str] {
        &["node_readiness_label", ANTI_AFFINITY_KEY]
    }

    async fn run(&self, fixture: &ClusterFixture) -> Result<()> {
        let expectation = fixture.expect_failover().await?;
        let mut labelled: Vec<String> = expectation
            .acceptable_target_nodes
            .iter()
            .cloned()
            .collect();
        labelled.push(expectation.prior_primary_node.clone());

        let result = Self::label_and_fail_over(fixture, &expectation).await;

        let unlabel = json!({ "metadata": { "labels": { READINESS_LABEL: null } } });
        for node in &labelled {
            if let Err(e) = fixture.patch_node(node, &unlabel).await {
                warn!(node = %node, error = %e, "Failed to remove readiness label");
            }
        }
        result
    }
}

impl NodeReadinessLabel {
    async fn label_and_fail_over(
        fixture: &ClusterFixture,
        expectation: &FailoverExpectation,
    ) -> Result<()> {
        let label = json!({ "metadata": { "labels": { READINESS_LABEL: READINESS_VALUE } } });

        for node in &expectation.acceptable_target_nodes {
            fixture.patch_node(node, &label).await?;
        }
        fixture
            .update_config(&ConfigPatch::new().set(
                "node_readiness_label",
                format!("{READINESS_LABEL}:{READINESS_VALUE}"),
            ))
            .await?;
        fixture.verify_failover(expectation).await?;

        // the former primary node becomes eligible again
        fixture
            .patch_node(&expectation.prior_primary_node, &label)
            .await?;

        rebalance_with_anti_affinity(fixture).await
    }
}

/// Taint the primary's node with NoExecute, then tolerate the taint.
pub struct Taint;

impl Taint {
    async fn after_eviction(fixture: &ClusterFixture) -> Result<()> {
        fixture
            .update_config(&ConfigPatch::new().set("toleration", TOLERATION))
            .await?;
        rebalance_with_anti_affinity(fixture).await
    }
}

#[async_trait]
impl Scenario for Taint {
    fn name(&self) -> &'static str {
        "taint"
    }

    fn description(&self) -> &'static str {
        "Fail over when the primary's node gets a NoExecute taint"
    }

    fn config_keys(&self) -> &'static [&'static str] {
        &["toleration", ANTI_AFFINITY_KEY]
    }

    async fn run(&self, fixture: &ClusterFixture) -> Result<()> {
        let expectation = fixture.expect_failover().await?;
        let tainted = expectation.prior_primary_node.clone();

        fixture
            .patch_node(
                &tainted,
                &json!({ "spec": { "taints": [{ "effect": "NoExecute", "key": TAINT_KEY }] } }),
            )
            .await?;

        let mut result = fixture.verify_failover(&expectation).await.map(|_| ());
        if result.is_ok() {
            result = Self::after_eviction(fixture).await;
        }

        // kind worker nodes carry no other taints
        if let Err(e) = fixture
            .patch_node(&tainted, &json!({ "spec": { "taints": null } }))
            .await
        {
            warn!(node = %tainted, error = %e, "Failed to remove taint");
        }
        result
    }
}
