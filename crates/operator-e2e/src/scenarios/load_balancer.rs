use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use super::Scenario;
use crate::error::Result;
use crate::fixture::ClusterFixture;
use crate::platform::ResourceKind;
use crate::selector::LabelSelector;

/// Toggle load balancers for the primary and replica services.
///
/// Service re-creation has no single field to watch, so each selector is
/// polled until its service reports the requested type.
pub struct LoadBalancer;

const LOAD_BALANCER: &str = "LoadBalancer";
const CLUSTER_IP: &str = "ClusterIP";

impl LoadBalancer {
    async fn expose(fixture: &ClusterFixture, enabled: bool) -> Result<()> {
        let expected = if enabled { LOAD_BALANCER } else { CLUSTER_IP };
        info!(enabled, expected, "Toggling load balancers");
        fixture
            .patch_cluster(&json!({
                "spec": {
                    "enableMasterLoadBalancer": enabled,
                    "enableReplicaLoadBalancer": enabled,
                }
            }))
            .await?;

        for selector in [fixture.primary_selector(), fixture.replica_selector()] {
            wait_for_service_type(fixture, &selector, expected).await?;
        }
        Ok(())
    }
}

async fn wait_for_service_type(
    fixture: &ClusterFixture,
    selector: &LabelSelector,
    expected: &str,
) -> Result<()> {
    let condition = format!("{expected} service matching {selector}");
    fixture
        .wait_for_objects(&condition, ResourceKind::Service, selector, |services| {
            !services.is_empty()
                && services
                    .iter()
                    .all(|s| s.service_type.as_deref() == Some(expected))
        })
        .await
        .map(|_| ())
}

#[async_trait]
impl Scenario for LoadBalancer {
    fn name(&self) -> &'static str {
        "load-balancer"
    }

    fn description(&self) -> &'static str {
        "Switch primary and replica services to LoadBalancer and back"
    }

    async fn run(&self, fixture: &ClusterFixture) -> Result<()> {
        Self::expose(fixture, true).await?;
        Self::expose(fixture, false).await
    }
}
