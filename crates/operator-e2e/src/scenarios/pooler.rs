use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use super::Scenario;
use crate::error::{E2eError, Result};
use crate::fixture::ClusterFixture;
use crate::platform::{ResourceKind, ResourceSummary};

/// Connection pooler lifecycle: enable, scale, re-enable, disable, enable
/// again and finally disable to leave the cluster as found.
pub struct ConnectionPooler;

const POOLER_INSTANCES: usize = 2;

fn pooler_services(services: &[ResourceSummary]) -> usize {
    services
        .iter()
        .filter(|s| s.name.ends_with("pooler"))
        .count()
}

impl ConnectionPooler {
    async fn set_enabled(fixture: &ClusterFixture, enabled: bool) -> Result<()> {
        info!(enabled, "Toggling connection pooler");
        fixture
            .patch_cluster(&json!({ "spec": { "enableConnectionPooler": enabled } }))
            .await
    }

    async fn wait_present(fixture: &ClusterFixture, pods: usize) -> Result<()> {
        fixture
            .wait_for_running(&fixture.pooler_selector(), pods)
            .await?;
        fixture
            .wait_for_objects(
                "pooler service present",
                ResourceKind::Service,
                &fixture.owned_selector(),
                |services| pooler_services(services) == 1,
            )
            .await?;
        Ok(())
    }

    async fn wait_gone(fixture: &ClusterFixture) -> Result<()> {
        fixture
            .wait_for_count(ResourceKind::Pod, &fixture.pooler_selector(), 0)
            .await?;
        fixture
            .wait_for_objects(
                "pooler service removed",
                ResourceKind::Service,
                &fixture.owned_selector(),
                |services| pooler_services(services) == 0,
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Scenario for ConnectionPooler {
    fn name(&self) -> &'static str {
        "connection-pooler"
    }

    fn description(&self) -> &'static str {
        "Enable, scale, disable and re-enable the connection pooler"
    }

    async fn run(&self, fixture: &ClusterFixture) -> Result<()> {
        let pooler = fixture.pooler_selector();

        Self::set_enabled(fixture, true).await?;
        Self::wait_present(fixture, 1).await?;

        fixture
            .patch_cluster(&json!({
                "spec": { "connectionPooler": { "numberOfInstances": POOLER_INSTANCES } }
            }))
            .await?;
        fixture
            .wait_for_count(ResourceKind::Pod, &pooler, POOLER_INSTANCES)
            .await?;
        fixture
            .wait_for_running(&pooler, POOLER_INSTANCES)
            .await?;

        // enabling an enabled pooler must be a no-op
        Self::set_enabled(fixture, true).await?;
        fixture
            .assert_count_holds(ResourceKind::Pod, &pooler, POOLER_INSTANCES, 3)
            .await?;
        let services = fixture
            .platform()
            .list(ResourceKind::Service, fixture.namespace(), &fixture.owned_selector())
            .await?;
        if pooler_services(&services) != 1 {
            return Err(E2eError::InvariantViolated(format!(
                "Re-enabling the pooler changed its services: {:?}",
                services.iter().map(|s| &s.name).collect::<Vec<_>>()
            )));
        }

        Self::set_enabled(fixture, false).await?;
        Self::wait_gone(fixture).await?;

        // the connectionPooler section is kept, so the pooler comes back scaled
        Self::set_enabled(fixture, true).await?;
        Self::wait_present(fixture, POOLER_INSTANCES).await?;

        Self::set_enabled(fixture, false).await?;
        Self::wait_gone(fixture).await
    }
}
