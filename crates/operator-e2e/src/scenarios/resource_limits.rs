use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use super::Scenario;
use crate::barrier::ConfigPatch;
use crate::error::{E2eError, Result};
use crate::fixture::ClusterFixture;
use crate::platform::{ResourceKind, ResourceSummary};

/// Request limits below the configured floor and expect the operator to raise
/// them. Applying new limits replaces the pods, so the primary fails over.
pub struct MinResourceLimits;

const MIN_CPU_LIMIT: &str = "500m";
const MIN_MEMORY_LIMIT: &str = "500Mi";

fn check_limits(pod: &ResourceSummary, expected: &BTreeMap<&str, &str>) -> Result<()> {
    for (resource, floor) in expected {
        let found = pod.limits.get(*resource).map(String::as_str);
        if found != Some(*floor) {
            return Err(E2eError::InvariantViolated(format!(
                "Expected {resource} limit {floor} on {}, found {found:?}",
                pod.name
            )));
        }
    }
    Ok(())
}

#[async_trait]
impl Scenario for MinResourceLimits {
    fn name(&self) -> &'static str {
        "min-resource-limits"
    }

    fn description(&self) -> &'static str {
        "Raise sub-floor resource limits to the configured minimum"
    }

    fn config_keys(&self) -> &'static [&'static str] {
        &["min_cpu_limit", "min_memory_limit"]
    }

    async fn run(&self, fixture: &ClusterFixture) -> Result<()> {
        let expectation = fixture.expect_failover().await?;

        fixture
            .update_config(
                &ConfigPatch::new()
                    .set("min_cpu_limit", MIN_CPU_LIMIT)
                    .set("min_memory_limit", MIN_MEMORY_LIMIT),
            )
            .await?;

        fixture
            .patch_cluster(&json!({
                "spec": {
                    "resources": {
                        "requests": { "cpu": "10m", "memory": "50Mi" },
                        "limits": { "cpu": "10m", "memory": "50Mi" },
                    }
                }
            }))
            .await?;

        fixture.verify_failover(&expectation).await?;

        let primaries = fixture
            .platform()
            .list(ResourceKind::Pod, fixture.namespace(), &fixture.primary_selector())
            .await?;
        let primary = primaries.first().ok_or_else(|| {
            E2eError::InvariantViolated("No primary pod after failover".to_string())
        })?;
        let floor = BTreeMap::from([("cpu", MIN_CPU_LIMIT), ("memory", MIN_MEMORY_LIMIT)]);
        check_limits(primary, &floor)?;
        info!(pod = %primary.name, limits = ?primary.limits, "Limits raised to the floor");
        Ok(())
    }
}
