use async_trait::async_trait;
use tracing::info;

use super::Scenario;
use crate::barrier::ConfigPatch;
use crate::error::{E2eError, Result};
use crate::fixture::ClusterFixture;
use crate::platform::{ResourceKind, ResourceSummary};
use crate::selector::LabelSelector;

/// With lazy upgrades the operator changes the stateful set but leaves running
/// pods alone, so only a pod deleted by someone else picks up the new image.
/// Disabling lazy upgrades forces the ordinary rolling upgrade.
pub struct LazyImageUpgrade;

const UPGRADE_IMAGE: &str = "registry.opensource.zalan.do/acid/spilo-cdp-12:1.6-p114";

fn image_of(pods: &[ResourceSummary]) -> Option<&str> {
    pods.iter()
        .find(|p| p.is_running())
        .and_then(|p| p.image.as_deref())
}

impl LazyImageUpgrade {
    fn pod_selector(fixture: &ClusterFixture, ordinal: usize) -> LabelSelector {
        LabelSelector::new().with(
            "statefulset.kubernetes.io/pod-name",
            format!("{}-{ordinal}", fixture.cluster_name()),
        )
    }

    async fn running_image(fixture: &ClusterFixture, ordinal: usize) -> Result<Option<String>> {
        let pods = fixture
            .platform()
            .list(
                ResourceKind::Pod,
                fixture.namespace(),
                &Self::pod_selector(fixture, ordinal),
            )
            .await?;
        Ok(image_of(&pods).map(ToString::to_string))
    }
}

#[async_trait]
impl Scenario for LazyImageUpgrade {
    fn name(&self) -> &'static str {
        "lazy-image-upgrade"
    }

    fn description(&self) -> &'static str {
        "Upgrade only recreated pods while lazy upgrades are enabled"
    }

    fn config_keys(&self) -> &'static [&'static str] {
        &["docker_image", "enable_lazy_spilo_upgrade"]
    }

    async fn run(&self, fixture: &ClusterFixture) -> Result<()> {
        fixture
            .update_config(
                &ConfigPatch::new()
                    .set("docker_image", UPGRADE_IMAGE)
                    .set("enable_lazy_spilo_upgrade", "true"),
            )
            .await?;

        let first = format!("{}-0", fixture.cluster_name());
        info!(pod = %first, "Deleting pod to pick up the new image");
        fixture
            .platform()
            .delete(ResourceKind::Pod, fixture.namespace(), &first)
            .await?;

        fixture
            .wait_for_objects(
                "recreated pod runs the configured image",
                ResourceKind::Pod,
                &Self::pod_selector(fixture, 0),
                |pods| image_of(pods) == Some(UPGRADE_IMAGE),
            )
            .await?;
        let untouched = Self::running_image(fixture, 1).await?;
        if untouched.as_deref() == Some(UPGRADE_IMAGE) {
            return Err(E2eError::InvariantViolated(format!(
                "Lazy upgrade failed: {}-1 was upgraded to {UPGRADE_IMAGE} without being recreated",
                fixture.cluster_name()
            )));
        }

        fixture
            .update_config(&ConfigPatch::new().set("enable_lazy_spilo_upgrade", "false"))
            .await?;
        fixture
            .wait_for_objects(
                "every pod runs the same image",
                ResourceKind::Pod,
                &fixture.cluster_selector(),
                |pods| {
                    !pods.is_empty()
                        && pods.iter().all(|p| {
                            p.is_running() && p.image.as_deref() == Some(UPGRADE_IMAGE)
                        })
                },
            )
            .await
            .map(|_| ())
    }
}
