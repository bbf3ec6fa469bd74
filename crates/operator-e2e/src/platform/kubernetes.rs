//! [`PlatformClient`] backed by a live Kubernetes API server.

use std::collections::BTreeMap;
use std::fmt::Debug;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::batch::v1::CronJob;
use k8s_openapi::api::core::v1::{ConfigMap, Node, Pod, PodSpec, PodTemplateSpec, Service};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, DeleteParams, DynamicObject, ListParams, LogParams, Patch, PatchParams};
use kube::config::KubeConfigOptions;
use kube::discovery::ApiResource;
use kube::{Client, Config, Resource};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info};

use super::{PlatformClient, PlatformError, ResourceKind, ResourceSummary};
use crate::config::{CustomResourceConfig, HarnessConfig};
use crate::selector::LabelSelector;

/// Kubernetes implementation of the platform seam.
#[derive(Clone)]
pub struct KubePlatform {
    client: Client,
    cluster_resource: ApiResource,
}

impl KubePlatform {
    /// Connect with the kubeconfig context named in `config`, or the
    /// in-cluster / current-context default when none is set.
    ///
    /// # Errors
    ///
    /// Returns an error if the kubeconfig cannot be loaded or the client
    /// cannot be created.
    pub async fn connect(config: &HarnessConfig) -> Result<Self, PlatformError> {
        let client = match &config.kube_context {
            Some(context) => {
                let options = KubeConfigOptions {
                    context: Some(context.clone()),
                    ..KubeConfigOptions::default()
                };
                let kube_config = Config::from_kubeconfig(&options).await?;
                Client::try_from(kube_config)?
            }
            None => Client::try_default().await?,
        };
        info!(context = ?config.kube_context, "Connected to Kubernetes API");
        Ok(Self::new(client, &config.custom_resource))
    }

    #[must_use]
    pub fn new(client: Client, custom_resource: &CustomResourceConfig) -> Self {
        Self {
            client,
            cluster_resource: cluster_api_resource(custom_resource),
        }
    }

    fn cluster_api(&self, namespace: &str) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), namespace, &self.cluster_resource)
    }

    async fn list_namespaced<K>(
        &self,
        namespace: &str,
        params: &ListParams,
    ) -> Result<Vec<ResourceSummary>, PlatformError>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Debug + Summarize,
        <K as Resource>::DynamicType: Default,
    {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        let list = api.list(params).await?;
        Ok(list.items.iter().map(Summarize::summarize).collect())
    }

    async fn patch_namespaced<K>(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> Result<(), PlatformError>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Debug,
        <K as Resource>::DynamicType: Default,
    {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        api.patch(name, &PatchParams::default(), &Patch::Merge(patch))
            .await
            .map_err(|e| not_found_or(e, kind, namespace, name))?;
        Ok(())
    }

    async fn delete_namespaced<K>(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
    ) -> Result<(), PlatformError>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Debug,
        <K as Resource>::DynamicType: Default,
    {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        api.delete(name, &DeleteParams::default())
            .await
            .map_err(|e| not_found_or(e, kind, namespace, name))?;
        Ok(())
    }
}

#[async_trait]
impl PlatformClient for KubePlatform {
    async fn list(
        &self,
        kind: ResourceKind,
        namespace: &str,
        selector: &LabelSelector,
    ) -> Result<Vec<ResourceSummary>, PlatformError> {
        let params = ListParams::default().labels(&selector.to_string());
        debug!(%kind, namespace = %namespace, selector = %selector, "Listing objects");

        match kind {
            ResourceKind::Pod => self.list_namespaced::<Pod>(namespace, &params).await,
            ResourceKind::Service => self.list_namespaced::<Service>(namespace, &params).await,
            ResourceKind::CronJob => self.list_namespaced::<CronJob>(namespace, &params).await,
            ResourceKind::StatefulSet => {
                self.list_namespaced::<StatefulSet>(namespace, &params)
                    .await
            }
            ResourceKind::Node => {
                let api: Api<Node> = Api::all(self.client.clone());
                let list = api.list(&params).await?;
                Ok(list.items.iter().map(Summarize::summarize).collect())
            }
            ResourceKind::ConfigMap | ResourceKind::DatabaseCluster => {
                Err(PlatformError::Unsupported {
                    kind,
                    operation: "list",
                })
            }
        }
    }

    async fn patch(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> Result<(), PlatformError> {
        debug!(%kind, namespace = %namespace, name = %name, "Patching object");
        match kind {
            ResourceKind::DatabaseCluster => {
                self.cluster_api(namespace)
                    .patch(name, &PatchParams::default(), &Patch::Merge(patch))
                    .await
                    .map_err(|e| not_found_or(e, kind, namespace, name))?;
                Ok(())
            }
            ResourceKind::ConfigMap => {
                self.patch_namespaced::<ConfigMap>(kind, namespace, name, patch)
                    .await
            }
            ResourceKind::Node => self.patch_node(name, patch).await,
            _ => Err(PlatformError::Unsupported {
                kind,
                operation: "patch",
            }),
        }
    }

    async fn read_config(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<BTreeMap<String, String>, PlatformError> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        let config_map = api
            .get(name)
            .await
            .map_err(|e| not_found_or(e, ResourceKind::ConfigMap, namespace, name))?;
        Ok(config_map.data.unwrap_or_default())
    }

    async fn delete(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
    ) -> Result<(), PlatformError> {
        debug!(%kind, namespace = %namespace, name = %name, "Deleting object");
        match kind {
            ResourceKind::Pod => self.delete_namespaced::<Pod>(kind, namespace, name).await,
            _ => Err(PlatformError::Unsupported {
                kind,
                operation: "delete",
            }),
        }
    }

    async fn read_log_tail(
        &self,
        namespace: &str,
        pod: &str,
        lines: i64,
    ) -> Result<String, PlatformError> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let params = LogParams {
            tail_lines: Some(lines),
            ..LogParams::default()
        };
        api.logs(pod, &params)
            .await
            .map_err(|e| not_found_or(e, ResourceKind::Pod, namespace, pod))
    }

    async fn patch_node(&self, node: &str, patch: &Value) -> Result<(), PlatformError> {
        debug!(node = %node, "Patching node");
        let api: Api<Node> = Api::all(self.client.clone());
        api.patch(node, &PatchParams::default(), &Patch::Merge(patch))
            .await
            .map_err(|e| not_found_or(e, ResourceKind::Node, "", node))?;
        Ok(())
    }
}

fn cluster_api_resource(config: &CustomResourceConfig) -> ApiResource {
    ApiResource {
        group: config.group.clone(),
        version: config.version.clone(),
        api_version: format!("{}/{}", config.group, config.version),
        kind: config.kind.clone(),
        plural: config.plural.clone(),
    }
}

fn not_found_or(err: kube::Error, kind: ResourceKind, namespace: &str, name: &str) -> PlatformError {
    match err {
        kube::Error::Api(response) if response.code == 404 => PlatformError::NotFound {
            kind,
            namespace: namespace.to_string(),
            name: name.to_string(),
        },
        other => PlatformError::Kube(other),
    }
}

/// Conversion of a typed API object into the attributes the harness reads.
trait Summarize {
    fn summarize(&self) -> ResourceSummary;
}

fn from_meta(meta: &ObjectMeta) -> ResourceSummary {
    ResourceSummary {
        name: meta.name.clone().unwrap_or_default(),
        labels: meta.labels.clone().unwrap_or_default(),
        annotations: meta.annotations.clone().unwrap_or_default(),
        ..ResourceSummary::default()
    }
}

/// Image and limits of the first container.
fn first_container(spec: Option<&PodSpec>) -> (Option<String>, BTreeMap<String, String>) {
    let Some(container) = spec.and_then(|s| s.containers.first()) else {
        return (None, BTreeMap::new());
    };
    let limits = container
        .resources
        .as_ref()
        .and_then(|r| r.limits.as_ref())
        .map(|limits| {
            limits
                .iter()
                .map(|(name, quantity)| (name.clone(), quantity.0.clone()))
                .collect()
        })
        .unwrap_or_default();
    (container.image.clone(), limits)
}

fn with_template(mut summary: ResourceSummary, template: Option<&PodTemplateSpec>) -> ResourceSummary {
    let (image, limits) = first_container(template.and_then(|t| t.spec.as_ref()));
    summary.image = image;
    summary.limits = limits;
    summary
}

impl Summarize for Pod {
    fn summarize(&self) -> ResourceSummary {
        let mut summary = from_meta(&self.metadata);
        let (image, limits) = first_container(self.spec.as_ref());
        summary.image = image;
        summary.limits = limits;
        summary.node_name = self.spec.as_ref().and_then(|s| s.node_name.clone());
        summary.phase = self.status.as_ref().and_then(|s| s.phase.clone());
        summary
    }
}

impl Summarize for Node {
    fn summarize(&self) -> ResourceSummary {
        from_meta(&self.metadata)
    }
}

impl Summarize for Service {
    fn summarize(&self) -> ResourceSummary {
        let mut summary = from_meta(&self.metadata);
        summary.service_type = self.spec.as_ref().and_then(|s| s.type_.clone());
        summary
    }
}

impl Summarize for CronJob {
    fn summarize(&self) -> ResourceSummary {
        let summary = from_meta(&self.metadata);
        let Some(spec) = &self.spec else {
            return summary;
        };
        let mut summary = with_template(
            summary,
            spec.job_template
                .spec
                .as_ref()
                .map(|job| &job.template),
        );
        summary.schedule = Some(spec.schedule.clone());
        summary
    }
}

impl Summarize for StatefulSet {
    fn summarize(&self) -> ResourceSummary {
        with_template(
            from_meta(&self.metadata),
            self.spec.as_ref().map(|s| &s.template),
        )
    }
}
