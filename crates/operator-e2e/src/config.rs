//! Harness configuration.
//!
//! Every field has a default matching the operator's stock e2e deployment, so
//! an empty TOML file (or none at all) is a valid configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{E2eError, Result};
use crate::poller::PollSettings;
use crate::selector::LabelSelector;

/// Where the operator runs and how to restart it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Namespace of the operator deployment and its config map.
    pub namespace: String,
    /// Selector matching the operator pod.
    pub selector: LabelSelector,
    /// Config map the operator reads on start-up.
    pub config_map: String,
    /// Time to give the operator after it reports Running before it has
    /// registered its resources and synced existing clusters.
    pub settle_secs: u64,
    /// Number of log lines captured for diagnostics.
    pub log_tail_lines: i64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            namespace: "default".to_string(),
            selector: LabelSelector::new().with("name", "postgres-operator"),
            config_map: "postgres-operator".to_string(),
            settle_secs: 60,
            log_tail_lines: 200,
        }
    }
}

/// API coordinates of the database cluster custom resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CustomResourceConfig {
    pub group: String,
    pub version: String,
    pub kind: String,
    pub plural: String,
}

impl Default for CustomResourceConfig {
    fn default() -> Self {
        Self {
            group: "acid.zalan.do".to_string(),
            version: "v1".to_string(),
            kind: "postgresql".to_string(),
            plural: "postgresqls".to_string(),
        }
    }
}

/// Label keys and values the operator stamps on the objects it owns.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelConfig {
    /// Label carrying the member role.
    pub role_key: String,
    /// Role value of the read-write member.
    pub primary_role: String,
    /// Role value of read-only followers.
    pub replica_role: String,
    /// Label carrying the cluster name.
    pub cluster_name_key: String,
    /// Application label shared by all database pods.
    pub application_key: String,
    pub application_value: String,
    /// Label carrying the pooler deployment name on pooler pods.
    pub pooler_key: String,
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self {
            role_key: "spilo-role".to_string(),
            primary_role: "master".to_string(),
            replica_role: "replica".to_string(),
            cluster_name_key: "cluster-name".to_string(),
            application_key: "application".to_string(),
            application_value: "spilo".to_string(),
            pooler_key: "connection-pooler".to_string(),
        }
    }
}

/// Poll interval and deadline for every wait.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    pub interval_secs: u64,
    pub timeout_secs: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_secs: 10,
            // `kind` pods may stick in Terminating for a few minutes
            timeout_secs: 600,
        }
    }
}

/// Full harness configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Namespace the database cluster lives in.
    pub namespace: String,
    /// Name of the database cluster custom resource.
    pub cluster_name: String,
    /// Member count the cluster is deployed with.
    pub instances: usize,
    /// Nodes eligible as failover targets when replicas cannot supply one.
    pub node_exclusion_selector: LabelSelector,
    /// Kubeconfig context; the current context when unset.
    pub kube_context: Option<String>,
    /// Wall-clock budget for the whole suite.
    pub suite_budget_secs: Option<u64>,
    pub controller: ControllerConfig,
    pub custom_resource: CustomResourceConfig,
    pub labels: LabelConfig,
    pub poll: PollConfig,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            namespace: "default".to_string(),
            cluster_name: "acid-minimal-cluster".to_string(),
            instances: 2,
            node_exclusion_selector: LabelSelector::new().without(
                "kubernetes.io/hostname",
                "postgres-operator-e2e-tests-control-plane",
            ),
            kube_context: None,
            suite_budget_secs: None,
            controller: ControllerConfig::default(),
            custom_resource: CustomResourceConfig::default(),
            labels: LabelConfig::default(),
            poll: PollConfig::default(),
        }
    }
}

impl HarnessConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or fails validation.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            E2eError::Config(format!("Failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid TOML or fails validation.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| E2eError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration for values that would make waits meaningless.
    ///
    /// # Errors
    ///
    /// Returns `E2eError::Config` describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.poll.interval_secs == 0 {
            return Err(E2eError::Config("poll.interval_secs must be > 0".into()));
        }
        if self.poll.interval_secs >= self.poll.timeout_secs {
            return Err(E2eError::Config(format!(
                "poll.interval_secs ({}) must be shorter than poll.timeout_secs ({})",
                self.poll.interval_secs, self.poll.timeout_secs
            )));
        }
        if self.instances == 0 {
            return Err(E2eError::Config("instances must be > 0".into()));
        }
        for (field, value) in [
            ("namespace", &self.namespace),
            ("cluster_name", &self.cluster_name),
            ("controller.namespace", &self.controller.namespace),
            ("controller.config_map", &self.controller.config_map),
            ("labels.role_key", &self.labels.role_key),
            ("labels.cluster_name_key", &self.labels.cluster_name_key),
        ] {
            if value.trim().is_empty() {
                return Err(E2eError::Config(format!("{field} must not be empty")));
            }
        }
        if self.controller.selector.is_empty() {
            return Err(E2eError::Config(
                "controller.selector must not be empty".into(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn poll_settings(&self) -> PollSettings {
        PollSettings::new(
            Duration::from_secs(self.poll.interval_secs),
            Duration::from_secs(self.poll.timeout_secs),
        )
    }

    #[must_use]
    pub fn controller_settle(&self) -> Duration {
        Duration::from_secs(self.controller.settle_secs)
    }

    #[must_use]
    pub fn suite_budget(&self) -> Option<Duration> {
        self.suite_budget_secs.map(Duration::from_secs)
    }
}
