//! Restart barrier for configuration the controller only reads at start-up.
//!
//! The operator has no hot-reload path for its config map, so a config change
//! is a single logical step: patch the config map, delete the operator pod,
//! wait for its replacement to run, then give it time to sync. Only after that
//! may a scenario mutate clusters and expect the new configuration to apply.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tracing::{error, info, warn};

use crate::config::ControllerConfig;
use crate::error::{E2eError, Result};
use crate::platform::{PlatformClient, ResourceKind, ResourceSummary};
use crate::poller::{Poller, Probe};

/// Key/value changes for the operator config map.
///
/// A `None` value removes the key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigPatch {
    entries: BTreeMap<String, Option<String>>,
}

impl ConfigPatch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.entries.insert(key.into(), Some(value.into()));
        self
    }

    #[must_use]
    pub fn unset(mut self, key: impl Into<String>) -> Self {
        self.entries.insert(key.into(), None);
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn entries(&self) -> &BTreeMap<String, Option<String>> {
        &self.entries
    }

    /// Merge-patch document for the config map. Removed keys become `null`.
    #[must_use]
    pub fn to_merge_patch(&self) -> serde_json::Value {
        json!({ "data": self.entries })
    }
}

impl FromIterator<(String, Option<String>)> for ConfigPatch {
    fn from_iter<I: IntoIterator<Item = (String, Option<String>)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Handle on the single operator instance.
#[derive(Clone)]
pub struct ControllerHandle {
    platform: Arc<dyn PlatformClient>,
    config: ControllerConfig,
}

impl ControllerHandle {
    #[must_use]
    pub fn new(platform: Arc<dyn PlatformClient>, config: ControllerConfig) -> Self {
        Self { platform, config }
    }

    #[must_use]
    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Current operator pods.
    pub async fn pods(&self) -> Result<Vec<ResourceSummary>> {
        Ok(self
            .platform
            .list(
                ResourceKind::Pod,
                &self.config.namespace,
                &self.config.selector,
            )
            .await?)
    }

    /// Wait for a running operator pod.
    ///
    /// # Errors
    ///
    /// `E2eError::FatalInfrastructure` if none runs before the deadline.
    pub async fn wait_running(&self, poller: &Poller) -> Result<ResourceSummary> {
        self.wait_for_pod(poller, "operator pod running", ResourceSummary::is_running)
            .await
            .map_err(|e| into_fatal("Operator pod never reached Running", e))
    }

    /// Wait until some operator pod satisfies `accept`.
    async fn wait_for_pod<F>(
        &self,
        poller: &Poller,
        condition: &str,
        accept: F,
    ) -> Result<ResourceSummary>
    where
        F: Fn(&ResourceSummary) -> bool + Send + Sync,
    {
        let accept = &accept;
        let seen = poller
            .wait_for(condition, move || async move {
                let pods = self.pods().await?;
                let seen = OperatorPods {
                    accepted: pods.iter().find(|&p| accept(p)).cloned(),
                    phases: pod_phases(&pods),
                };
                Ok(Probe::when(seen.accepted.is_some(), seen))
            })
            .await?;
        seen.accepted.ok_or_else(|| {
            E2eError::FatalInfrastructure(format!("No operator pod found for {condition}"))
        })
    }

    /// Tail of the operator log, `None` if it cannot be read.
    ///
    /// Used for diagnostics only, so failures are logged and swallowed.
    pub async fn log_tail(&self) -> Option<String> {
        let pod = match self.pods().await {
            Ok(pods) => pods.into_iter().next()?,
            Err(e) => {
                warn!(error = %e, "Failed to find operator pod for log capture");
                return None;
            }
        };
        match self
            .platform
            .read_log_tail(
                &self.config.namespace,
                &pod.name,
                self.config.log_tail_lines,
            )
            .await
        {
            Ok(log) => Some(log),
            Err(e) => {
                warn!(pod = %pod.name, error = %e, "Failed to read operator log");
                None
            }
        }
    }

    /// Read the current operator config map data.
    pub async fn read_config(&self) -> Result<BTreeMap<String, String>> {
        Ok(self
            .platform
            .read_config(&self.config.namespace, &self.config.config_map)
            .await?)
    }
}

/// Two-phase config change: mutate, restart, wait for readiness.
#[derive(Clone)]
pub struct RestartBarrier {
    platform: Arc<dyn PlatformClient>,
    controller: ControllerHandle,
    poller: Poller,
    settle: Duration,
}

impl RestartBarrier {
    #[must_use]
    pub fn new(
        platform: Arc<dyn PlatformClient>,
        controller: ControllerHandle,
        poller: Poller,
        settle: Duration,
    ) -> Self {
        Self {
            platform,
            controller,
            poller,
            settle,
        }
    }

    /// Patch the operator config map, restart the operator, and return once
    /// the new instance runs and has had time to settle.
    ///
    /// # Errors
    ///
    /// A platform error if the patch itself fails. `E2eError::FatalInfrastructure`
    /// if the operator cannot be restarted or never comes back.
    pub async fn apply_config_and_restart(&self, patch: &ConfigPatch) -> Result<()> {
        let config = self.controller.config();
        info!(
            config_map = %config.config_map,
            keys = ?patch.entries().keys().collect::<Vec<_>>(),
            "Updating operator configuration"
        );
        self.platform
            .patch(
                ResourceKind::ConfigMap,
                &config.namespace,
                &config.config_map,
                &patch.to_merge_patch(),
            )
            .await?;
        self.restart().await
    }

    /// Delete the operator pod and wait for a replacement to run.
    ///
    /// # Errors
    ///
    /// `E2eError::FatalInfrastructure` if there is no pod to restart, the
    /// delete fails, or no replacement runs before the deadline.
    pub async fn restart(&self) -> Result<()> {
        let config = self.controller.config();
        let old = self
            .controller
            .pods()
            .await
            .map_err(|e| into_fatal("Cannot list operator pods", e))?
            .into_iter()
            .next()
            .ok_or_else(|| {
                E2eError::FatalInfrastructure(format!(
                    "No operator pod matches {} in namespace {}",
                    config.selector, config.namespace
                ))
            })?;

        let old_name = old.name.as_str();
        info!(pod = %old_name, "Restarting operator to reload configuration");
        self.platform
            .delete(ResourceKind::Pod, &config.namespace, old_name)
            .await
            .map_err(|e| {
                E2eError::FatalInfrastructure(format!(
                    "Failed to delete operator pod {old_name}: {e}"
                ))
            })?;

        let replacement = self
            .controller
            .wait_for_pod(&self.poller, "replacement operator pod running", |p| {
                p.name != old_name && p.is_running()
            })
            .await
            .map_err(|e| {
                let err = into_fatal("Operator did not come back after restart", e);
                error!(error = %err, "Operator restart failed");
                err
            })?;

        info!(
            pod = %replacement.name,
            settle_secs = self.settle.as_secs(),
            "Operator restarted, waiting for it to sync"
        );
        // The operator must register its resources and sync existing
        // clusters before it reacts to new changes.
        tokio::time::sleep(self.settle).await;
        Ok(())
    }
}

/// One read of the operator pods: the pod a wait is after, if any, and the
/// phase of every pod for the timeout report.
struct OperatorPods {
    accepted: Option<ResourceSummary>,
    phases: Vec<(String, String)>,
}

impl fmt::Debug for OperatorPods {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.phases)
    }
}

fn pod_phases(pods: &[ResourceSummary]) -> Vec<(String, String)> {
    pods.iter()
        .map(|p| {
            (
                p.name.clone(),
                p.phase.clone().unwrap_or_else(|| "Unknown".to_string()),
            )
        })
        .collect()
}

/// Any failure to get a live operator back is fatal to the scenario.
fn into_fatal(context: &str, err: E2eError) -> E2eError {
    match err {
        E2eError::FatalInfrastructure(_) => err,
        E2eError::TimeoutExceeded {
            condition,
            elapsed,
            last_observed,
            ..
        } => E2eError::FatalInfrastructure(format!(
            "{context}: waited {elapsed:?} for {condition}, last observed {last_observed}"
        )),
        other => E2eError::FatalInfrastructure(format!("{context}: {other}")),
    }
}
