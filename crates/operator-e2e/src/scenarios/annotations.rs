use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::json;

use super::Scenario;
use crate::barrier::ConfigPatch;
use crate::error::Result;
use crate::fixture::ClusterFixture;
use crate::platform::{ResourceKind, ResourceSummary};

fn carries_all(object: &ResourceSummary, expected: &BTreeMap<&str, &str>) -> bool {
    expected
        .iter()
        .all(|(key, value)| object.annotations.get(*key).map(String::as_str) == Some(*value))
}

/// Global and per-cluster annotations on the primary and replica services.
pub struct ServiceAnnotations;

#[async_trait]
impl Scenario for ServiceAnnotations {
    fn name(&self) -> &'static str {
        "service-annotations"
    }

    fn description(&self) -> &'static str {
        "Propagate configured and per-cluster annotations to services"
    }

    fn config_keys(&self) -> &'static [&'static str] {
        &["custom_service_annotations"]
    }

    async fn run(&self, fixture: &ClusterFixture) -> Result<()> {
        fixture
            .update_config(&ConfigPatch::new().set("custom_service_annotations", "foo:bar"))
            .await?;

        let expected = BTreeMap::from([("annotation.key", "value"), ("foo", "bar")]);
        fixture
            .patch_cluster(&json!({ "spec": { "serviceAnnotations": expected } }))
            .await?;

        let labels = fixture.labels();
        for role in [&labels.primary_role, &labels.replica_role] {
            let selector = fixture.owned_selector().with(&labels.role_key, role);
            let condition = format!("service annotations on {selector}");
            fixture
                .wait_for_objects(&condition, ResourceKind::Service, &selector, |services| {
                    !services.is_empty() && services.iter().all(|s| carries_all(s, &expected))
                })
                .await?;
        }
        Ok(())
    }
}

/// Annotations on the custom resource that match the configured patterns are
/// copied to the cluster's stateful set.
pub struct StatefulSetAnnotations;

#[async_trait]
impl Scenario for StatefulSetAnnotations {
    fn name(&self) -> &'static str {
        "statefulset-annotations"
    }

    fn description(&self) -> &'static str {
        "Propagate matching custom resource annotations to the stateful set"
    }

    fn config_keys(&self) -> &'static [&'static str] {
        &["downscaler_annotations"]
    }

    async fn run(&self, fixture: &ClusterFixture) -> Result<()> {
        fixture
            .update_config(
                &ConfigPatch::new().set("downscaler_annotations", "deployment-time,downscaler/*"),
            )
            .await?;

        let expected = BTreeMap::from([
            ("deployment-time", "2020-04-30 12:00:00"),
            ("downscaler/downtime_replicas", "0"),
        ]);
        fixture
            .patch_cluster(&json!({ "metadata": { "annotations": expected } }))
            .await?;

        fixture
            .wait_for_objects(
                "stateful set annotations",
                ResourceKind::StatefulSet,
                &fixture.cluster_selector(),
                |sets| !sets.is_empty() && sets.iter().all(|s| carries_all(s, &expected)),
            )
            .await
            .map(|_| ())
    }
}
