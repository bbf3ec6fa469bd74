//! Platform API seam.
//!
//! The harness only ever talks to the cluster through [`PlatformClient`]:
//! listing objects by label selector, merge-patching, deleting, and reading
//! log tails. [`kubernetes::KubePlatform`] is the real implementation; tests plug in
//! an in-memory cluster.

pub mod kubernetes;

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::selector::LabelSelector;

/// Errors returned by platform operations.
#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("Failed to load kubeconfig: {0}")]
    Kubeconfig(#[from] kube::config::KubeconfigError),

    #[error("{kind} '{name}' not found in namespace '{namespace}'")]
    NotFound {
        kind: ResourceKind,
        namespace: String,
        name: String,
    },

    #[error("Operation '{operation}' is not supported for {kind}")]
    Unsupported {
        kind: ResourceKind,
        operation: &'static str,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PlatformError {
    /// Whether the failure is a momentary blip that a later attempt may not hit.
    ///
    /// Server-side errors, throttling, write conflicts and transport failures
    /// are transient; everything else is a genuine failure.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Kube(kube::Error::Api(response)) => {
                response.code >= 500 || response.code == 429 || response.code == 409
            }
            Self::Kube(
                kube::Error::HyperError(_)
                | kube::Error::Service(_)
                | kube::Error::ReadEvents(_),
            ) => true,
            _ => false,
        }
    }
}

/// Kinds of objects the harness reads or mutates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Pod,
    Service,
    Node,
    CronJob,
    StatefulSet,
    ConfigMap,
    /// The database cluster custom resource managed by the operator.
    DatabaseCluster,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pod => "pod",
            Self::Service => "service",
            Self::Node => "node",
            Self::CronJob => "cronjob",
            Self::StatefulSet => "statefulset",
            Self::ConfigMap => "configmap",
            Self::DatabaseCluster => "database cluster",
        };
        f.write_str(name)
    }
}

/// The attributes of a listed object the harness cares about.
///
/// Fields that make no sense for a kind stay empty (`None`, empty map).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResourceSummary {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    /// Node a pod is scheduled on.
    pub node_name: Option<String>,
    /// Pod phase (`Pending`, `Running`, ...).
    pub phase: Option<String>,
    /// Image of the first container (pods, stateful sets, cron job templates).
    pub image: Option<String>,
    /// Resource limits of the first container.
    pub limits: BTreeMap<String, String>,
    /// Service type (`ClusterIP`, `LoadBalancer`, ...).
    pub service_type: Option<String>,
    /// Cron schedule of a scheduled job.
    pub schedule: Option<String>,
}

impl ResourceSummary {
    #[must_use]
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.phase.as_deref() == Some("Running")
    }
}

/// Capabilities the harness needs from the cluster API.
///
/// Implementations must not cache: every call reflects current server state.
#[async_trait]
pub trait PlatformClient: Send + Sync {
    /// List objects of `kind` matching `selector`. `namespace` is ignored for
    /// cluster-scoped kinds.
    async fn list(
        &self,
        kind: ResourceKind,
        namespace: &str,
        selector: &LabelSelector,
    ) -> Result<Vec<ResourceSummary>, PlatformError>;

    /// Merge-patch a namespaced object; fields absent from `patch` are untouched.
    async fn patch(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> Result<(), PlatformError>;

    /// Read the data section of a config map.
    async fn read_config(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<BTreeMap<String, String>, PlatformError>;

    /// Delete a namespaced object.
    async fn delete(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
    ) -> Result<(), PlatformError>;

    /// Last `lines` lines of a pod's log.
    async fn read_log_tail(
        &self,
        namespace: &str,
        pod: &str,
        lines: i64,
    ) -> Result<String, PlatformError>;

    /// Merge-patch a node's labels or taints.
    async fn patch_node(&self, node: &str, patch: &Value) -> Result<(), PlatformError>;
}
