use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use super::Scenario;
use crate::error::Result;
use crate::fixture::ClusterFixture;
use crate::platform::ResourceKind;

/// Scale the cluster up by one member and back.
pub struct Scaling;

#[async_trait]
impl Scenario for Scaling {
    fn name(&self) -> &'static str {
        "scaling"
    }

    fn description(&self) -> &'static str {
        "Scale out and back in via numberOfInstances"
    }

    async fn run(&self, fixture: &ClusterFixture) -> Result<()> {
        let original = fixture.config().instances;
        let selector = fixture.cluster_selector();

        for instances in [original + 1, original] {
            info!(instances, "Scaling cluster");
            fixture
                .patch_cluster(&json!({ "spec": { "numberOfInstances": instances } }))
                .await?;
            fixture
                .wait_for_count(ResourceKind::Pod, &selector, instances)
                .await?;
            fixture.assert_primary_unique().await?;
        }
        Ok(())
    }
}
