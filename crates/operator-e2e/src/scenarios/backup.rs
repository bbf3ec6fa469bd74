use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use super::Scenario;
use crate::barrier::ConfigPatch;
use crate::error::{E2eError, Result};
use crate::fixture::ClusterFixture;
use crate::platform::{ResourceKind, ResourceSummary};
use crate::selector::LabelSelector;

/// Logical backup cron job: create on request, follow the cluster-wide image,
/// delete on request. The job itself is never run.
pub struct LogicalBackup;

const SCHEDULE: &str = "7 7 7 7 *";
const BACKUP_IMAGE: &str = "test-image-name";
const IMAGE_KEY: &str = "logical_backup_docker_image";

/// Name the operator gives the backup job of `cluster`.
#[must_use]
pub fn backup_job_name(cluster: &str) -> String {
    format!("logical-backup-{cluster}")
}

fn check_job(jobs: &[ResourceSummary], name: &str, schedule: &str) -> Result<()> {
    let [job] = jobs else {
        return Err(E2eError::InvariantViolated(format!(
            "Expected 1 logical backup job, found {}",
            jobs.len()
        )));
    };
    if job.name != name {
        return Err(E2eError::InvariantViolated(format!(
            "Expected job name {name}, found {}",
            job.name
        )));
    }
    if job.schedule.as_deref() != Some(schedule) {
        return Err(E2eError::InvariantViolated(format!(
            "Expected schedule {schedule:?}, found {:?}",
            job.schedule
        )));
    }
    Ok(())
}

#[async_trait]
impl Scenario for LogicalBackup {
    fn name(&self) -> &'static str {
        "logical-backup"
    }

    fn description(&self) -> &'static str {
        "Create, re-image and delete the logical backup cron job"
    }

    fn config_keys(&self) -> &'static [&'static str] {
        &[IMAGE_KEY]
    }

    async fn run(&self, fixture: &ClusterFixture) -> Result<()> {
        let labels = fixture.labels();
        let jobs_selector =
            LabelSelector::new().with(&labels.application_key, &labels.application_value);
        let job_name = backup_job_name(fixture.cluster_name());

        fixture
            .patch_cluster(&json!({
                "spec": {
                    "enableLogicalBackup": true,
                    "logicalBackupSchedule": SCHEDULE,
                }
            }))
            .await?;
        let jobs = fixture
            .wait_for_objects(
                "logical backup job created",
                ResourceKind::CronJob,
                &jobs_selector,
                |jobs| !jobs.is_empty(),
            )
            .await?;
        check_job(&jobs, &job_name, SCHEDULE)?;
        info!(job = %job_name, schedule = SCHEDULE, "Logical backup job created");

        fixture
            .update_config(&ConfigPatch::new().set(IMAGE_KEY, BACKUP_IMAGE))
            .await?;
        fixture
            .wait_for_objects(
                "logical backup job uses the configured image",
                ResourceKind::CronJob,
                &jobs_selector,
                |jobs| {
                    jobs.iter()
                        .any(|j| j.name == job_name && j.image.as_deref() == Some(BACKUP_IMAGE))
                },
            )
            .await?;

        fixture
            .patch_cluster(&json!({ "spec": { "enableLogicalBackup": false } }))
            .await?;
        fixture
            .wait_for_count(ResourceKind::CronJob, &jobs_selector, 0)
            .await
    }
}
