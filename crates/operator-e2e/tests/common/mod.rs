//! In-memory cluster that behaves like the operator under test.
//!
//! Every `list` call runs one reconcile pass before answering, so state
//! converges over successive polls the way a live cluster does. The operator
//! reads its config map only when its pod starts.

#![allow(dead_code)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use operator_e2e::{
    ClusterFixture, HarnessConfig, PlatformClient, PlatformError, ResourceKind, ResourceSummary,
    LabelSelector,
};

pub const CLUSTER: &str = "acid-minimal-cluster";
pub const CONTROL_PLANE: &str = "postgres-operator-e2e-tests-control-plane";
pub const WORKER_1: &str = "postgres-operator-e2e-tests-worker";
pub const WORKER_2: &str = "postgres-operator-e2e-tests-worker2";
pub const DEFAULT_IMAGE: &str = "registry.opensource.zalan.do/acid/spilo-12:1.6-p3";
const DEFAULT_BACKUP_IMAGE: &str = "registry.opensource.zalan.do/acid/logical-backup";
const OPERATOR_CONFIG: &str = "postgres-operator";

/// Harness configuration tuned for the simulator: one second polls and no
/// settle delay after operator restarts.
pub fn harness_config() -> HarnessConfig {
    let mut config = HarnessConfig::default();
    config.poll.interval_secs = 1;
    config.poll.timeout_secs = 300;
    config.controller.settle_secs = 0;
    config
}

pub fn fixture(cluster: &Arc<SimulatedCluster>) -> ClusterFixture {
    fixture_with(cluster, harness_config())
}

pub fn fixture_with(cluster: &Arc<SimulatedCluster>, config: HarnessConfig) -> ClusterFixture {
    let platform: Arc<dyn PlatformClient> = cluster.clone();
    ClusterFixture::new(platform, config)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Master,
    Replica,
}

/// What the operator would put into the stateful set pod template.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Template {
    image: String,
    limits: BTreeMap<String, String>,
    readiness: Option<(String, String)>,
    anti_affinity: bool,
}

impl Template {
    fn differs(&self, other: &Self, ignore_image: bool) -> bool {
        self.limits != other.limits
            || self.readiness != other.readiness
            || self.anti_affinity != other.anti_affinity
            || (!ignore_image && self.image != other.image)
    }
}

#[derive(Debug, Clone)]
struct SimPod {
    name: String,
    ordinal: usize,
    role: Role,
    node: Option<String>,
    last_node: Option<String>,
    running: bool,
    template: Template,
}

impl SimPod {
    /// The stateful set controller replaced the pod: same name, fresh state.
    fn recreate(&mut self, template: Template) {
        self.role = Role::Replica;
        self.last_node = self.node.take().or(self.last_node.take());
        self.running = false;
        self.template = template;
    }
}

#[derive(Debug, Clone)]
struct PoolerPod {
    name: String,
    running: bool,
}

#[derive(Debug, Clone)]
struct SimNode {
    name: String,
    object: Value,
}

impl SimNode {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            object: json!({
                "metadata": { "labels": { "kubernetes.io/hostname": name } },
                "spec": {}
            }),
        }
    }

    fn labels(&self) -> BTreeMap<String, String> {
        string_map(&self.object["metadata"]["labels"])
    }

    fn taints(&self) -> Vec<String> {
        self.object["spec"]["taints"]
            .as_array()
            .map(|taints| {
                taints
                    .iter()
                    .filter_map(|t| t["key"].as_str().map(ToString::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn is_control_plane(&self) -> bool {
        self.name == CONTROL_PLANE
    }
}

#[derive(Debug)]
struct State {
    nodes: Vec<SimNode>,
    pods: Vec<SimPod>,
    poolers: Vec<PoolerPod>,
    next_pooler: usize,
    manifest: Value,
    config_map: BTreeMap<String, String>,
    loaded: BTreeMap<String, String>,
    operator_pod: String,
    operator_running: bool,
    operator_broken: bool,
    operator_start_delay: u32,
    operator_restarts: u32,
    failures_left: u32,
    list_calls: u64,
    log_reads: u32,
}

/// Simulated Kubernetes cluster running the database operator.
pub struct SimulatedCluster {
    state: Mutex<State>,
}

impl SimulatedCluster {
    /// Two-member cluster: primary on the first worker, replica on the second.
    pub fn new() -> Arc<Self> {
        Self::with_placement(WORKER_1, WORKER_2)
    }

    /// Two-member cluster with both members on one worker.
    pub fn colocated() -> Arc<Self> {
        Self::with_placement(WORKER_1, WORKER_1)
    }

    fn with_placement(primary: &str, replica: &str) -> Arc<Self> {
        let manifest = json!({
            "metadata": { "name": CLUSTER, "annotations": {} },
            "spec": {
                "numberOfInstances": 2,
                "resources": { "limits": { "cpu": "1", "memory": "500Mi" } }
            }
        });
        let mut state = State {
            nodes: [CONTROL_PLANE, WORKER_1, WORKER_2]
                .iter()
                .map(|name| SimNode::new(name))
                .collect(),
            pods: Vec::new(),
            poolers: Vec::new(),
            next_pooler: 0,
            manifest,
            config_map: BTreeMap::new(),
            loaded: BTreeMap::new(),
            operator_pod: "postgres-operator-0".to_string(),
            operator_running: true,
            operator_broken: false,
            operator_start_delay: 0,
            operator_restarts: 0,
            failures_left: 0,
            list_calls: 0,
            log_reads: 0,
        };
        let template = state.template();
        for (ordinal, (node, role)) in [(primary, Role::Master), (replica, Role::Replica)]
            .into_iter()
            .enumerate()
        {
            state.pods.push(SimPod {
                name: format!("{CLUSTER}-{ordinal}"),
                ordinal,
                role,
                node: Some(node.to_string()),
                last_node: None,
                running: true,
                template: template.clone(),
            });
        }
        Arc::new(Self {
            state: Mutex::new(state),
        })
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("simulated cluster state poisoned")
    }

    /// Fail the next `n` list calls with a 503.
    pub fn fail_next_lists(&self, n: u32) {
        self.lock().failures_left = n;
    }

    /// Replacement operator pods never start.
    pub fn break_operator(&self) {
        self.lock().operator_broken = true;
    }

    /// Replacement operator pods stay pending for `lists` list calls.
    pub fn delay_operator_start(&self, lists: u32) {
        self.lock().operator_start_delay = lists;
    }

    /// Give a replica the primary role as well.
    pub fn inject_second_primary(&self) {
        let mut state = self.lock();
        for pod in &mut state.pods {
            pod.role = Role::Master;
        }
    }

    pub fn operator_restarts(&self) -> u32 {
        self.lock().operator_restarts
    }

    pub fn log_reads(&self) -> u32 {
        self.lock().log_reads
    }

    pub fn config_value(&self, key: &str) -> Option<String> {
        self.lock().config_map.get(key).cloned()
    }

    pub fn set_config(&self, key: &str, value: &str) {
        let mut state = self.lock();
        state.config_map.insert(key.to_string(), value.to_string());
        state.loaded = state.config_map.clone();
    }

    pub fn node_taints(&self, node: &str) -> Vec<String> {
        self.lock()
            .nodes
            .iter()
            .find(|n| n.name == node)
            .map(SimNode::taints)
            .unwrap_or_default()
    }

    pub fn node_labels(&self, node: &str) -> BTreeMap<String, String> {
        self.lock()
            .nodes
            .iter()
            .find(|n| n.name == node)
            .map(SimNode::labels)
            .unwrap_or_default()
    }

    /// (name, node, limits) of every pod holding the primary role.
    pub fn primaries(&self) -> Vec<(String, Option<String>, BTreeMap<String, String>)> {
        self.lock()
            .pods
            .iter()
            .filter(|p| p.role == Role::Master)
            .map(|p| (p.name.clone(), p.node.clone(), p.template.limits.clone()))
            .collect()
    }

    pub fn manifest(&self) -> Value {
        self.lock().manifest.clone()
    }
}

fn unavailable() -> PlatformError {
    PlatformError::Kube(kube::Error::Api(kube::error::ErrorResponse {
        status: "Failure".to_string(),
        message: "the server is currently unable to handle the request".to_string(),
        reason: "ServiceUnavailable".to_string(),
        code: 503,
    }))
}

fn string_map(value: &Value) -> BTreeMap<String, String> {
    value
        .as_object()
        .map(|map| {
            map.iter()
                .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

fn merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(entries) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Value::Object(map) = target {
        for (key, value) in entries {
            if value.is_null() {
                map.remove(key);
            } else {
                merge_patch(map.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
    }
}

/// Quantity in base units: cores for cpu, bytes for memory.
fn quantity(value: &str) -> f64 {
    let value = value.trim();
    let units = [
        ("Ki", 1024.0),
        ("Mi", 1024.0 * 1024.0),
        ("Gi", 1024.0 * 1024.0 * 1024.0),
        ("m", 0.001),
    ];
    let (number, factor) = units
        .iter()
        .find_map(|(suffix, factor)| value.strip_suffix(suffix).map(|n| (n, *factor)))
        .unwrap_or((value, 1.0));
    number.parse::<f64>().unwrap_or(0.0) * factor
}

/// `a:b,c:d` as used by the operator for map-valued config keys.
fn parse_pairs(value: &str) -> BTreeMap<String, String> {
    value
        .split(',')
        .filter_map(|pair| pair.split_once(':'))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect()
}

impl State {
    fn loaded(&self, key: &str) -> &str {
        self.loaded.get(key).map_or("", String::as_str)
    }

    fn spec(&self) -> &Value {
        &self.manifest["spec"]
    }

    fn instances(&self) -> usize {
        self.spec()["numberOfInstances"]
            .as_u64()
            .and_then(|n| usize::try_from(n).ok())
            .unwrap_or(1)
    }

    fn template(&self) -> Template {
        let image = match self.loaded("docker_image") {
            "" => DEFAULT_IMAGE.to_string(),
            image => image.to_string(),
        };
        let mut limits = BTreeMap::new();
        for (resource, floor_key) in [("cpu", "min_cpu_limit"), ("memory", "min_memory_limit")] {
            let requested = self.spec()["resources"]["limits"][resource]
                .as_str()
                .unwrap_or_default()
                .to_string();
            let floor = self.loaded(floor_key);
            let effective = if !floor.is_empty() && quantity(&requested) < quantity(floor) {
                floor.to_string()
            } else {
                requested
            };
            limits.insert(resource.to_string(), effective);
        }
        let readiness = self
            .loaded("node_readiness_label")
            .split_once(':')
            .map(|(k, v)| (k.to_string(), v.to_string()));
        Template {
            image,
            limits,
            readiness,
            anti_affinity: self.loaded("enable_pod_antiaffinity") == "true",
        }
    }

    fn tolerated(&self) -> BTreeSet<String> {
        parse_pairs(self.loaded("toleration"))
            .remove("key")
            .into_iter()
            .collect()
    }

    fn node(&self, name: &str) -> Option<&SimNode> {
        self.nodes.iter().find(|n| n.name == name)
    }

    fn accepts(&self, node: &SimNode, pod: &str, template: &Template) -> bool {
        let tolerated = self.tolerated();
        !node.is_control_plane()
            && template
                .readiness
                .as_ref()
                .is_none_or(|(k, v)| node.labels().get(k) == Some(v))
            && node.taints().iter().all(|t| tolerated.contains(t))
            && (!template.anti_affinity
                || self
                    .pods
                    .iter()
                    .all(|p| p.name == pod || p.node.as_deref() != Some(node.name.as_str())))
    }

    /// Previous node if still acceptable, otherwise the least loaded one.
    fn pick_node(&self, pod: &SimPod) -> Option<String> {
        let acceptable: Vec<&SimNode> = self
            .nodes
            .iter()
            .filter(|n| self.accepts(n, &pod.name, &pod.template))
            .collect();
        if let Some(previous) = &pod.last_node {
            if acceptable.iter().any(|n| &n.name == previous) {
                return Some(previous.clone());
            }
        }
        acceptable
            .iter()
            .min_by_key(|n| {
                let load = self
                    .pods
                    .iter()
                    .filter(|p| p.node.as_deref() == Some(n.name.as_str()))
                    .count();
                (load, n.name.clone())
            })
            .map(|n| n.name.clone())
    }

    fn reconcile(&mut self) {
        if !self.operator_running {
            if self.operator_start_delay > 0 {
                self.operator_start_delay -= 1;
            } else if !self.operator_broken {
                self.operator_running = true;
                self.loaded = self.config_map.clone();
            }
            return;
        }
        self.evict_untolerated();
        self.advance_pending();
        self.reconcile_members();
        self.ensure_primary();
        self.rolling_update();
        self.reconcile_pooler();
    }

    fn evict_untolerated(&mut self) {
        let tolerated = self.tolerated();
        let evicted: Vec<usize> = self
            .pods
            .iter()
            .enumerate()
            .filter(|(_, p)| {
                p.node
                    .as_deref()
                    .and_then(|n| self.node(n))
                    .is_some_and(|n| n.taints().iter().any(|t| !tolerated.contains(t)))
            })
            .map(|(i, _)| i)
            .collect();
        if evicted.is_empty() {
            return;
        }
        let template = self.template();
        for &i in &evicted {
            if self.pods[i].role == Role::Master {
                if let Some(j) = (0..self.pods.len())
                    .find(|j| !evicted.contains(j) && self.pods[*j].running)
                {
                    self.pods[j].role = Role::Master;
                }
            }
            self.pods[i].recreate(template.clone());
        }
    }

    fn advance_pending(&mut self) {
        for i in 0..self.pods.len() {
            if self.pods[i].running {
                continue;
            }
            if self.pods[i].node.is_none() {
                let node = self.pick_node(&self.pods[i]);
                self.pods[i].node = node;
            } else {
                self.pods[i].running = true;
            }
        }
        for pooler in &mut self.poolers {
            pooler.running = true;
        }
    }

    fn reconcile_members(&mut self) {
        let desired = self.instances();
        if self.pods.len() < desired {
            let ordinal = self.pods.len();
            let template = self.template();
            self.pods.push(SimPod {
                name: format!("{CLUSTER}-{ordinal}"),
                ordinal,
                role: Role::Replica,
                node: None,
                last_node: None,
                running: false,
                template,
            });
        } else if self.pods.len() > desired {
            if let Some(last) = self.pods.pop() {
                if last.role == Role::Master {
                    if let Some(pod) = self.pods.iter_mut().find(|p| p.running) {
                        pod.role = Role::Master;
                    }
                }
            }
        }
    }

    fn ensure_primary(&mut self) {
        if self.pods.iter().any(|p| p.role == Role::Master) {
            return;
        }
        if let Some(pod) = self.pods.iter_mut().find(|p| p.running) {
            pod.role = Role::Master;
        }
    }

    /// Replace stale replicas first, then switch the primary over to a fresh
    /// replica. One action per pass, and only on a settled cluster.
    fn rolling_update(&mut self) {
        if self.pods.len() != self.instances() || self.pods.iter().any(|p| !p.running) {
            return;
        }
        let template = self.template();
        let lazy = self.loaded("enable_lazy_spilo_upgrade") == "true";
        let stale = |p: &SimPod| p.template.differs(&template, lazy);

        if let Some(i) = self
            .pods
            .iter()
            .position(|p| p.role == Role::Replica && stale(p))
        {
            self.pods[i].recreate(template.clone());
            return;
        }
        let Some(primary) = self.pods.iter().position(|p| p.role == Role::Master) else {
            return;
        };
        if !stale(&self.pods[primary]) {
            return;
        }
        if let Some(target) = self
            .pods
            .iter()
            .position(|p| p.role == Role::Replica && !stale(p))
        {
            self.pods[target].role = Role::Master;
            self.pods[primary].role = Role::Replica;
        } else {
            self.pods[primary].recreate(template.clone());
        }
    }

    fn reconcile_pooler(&mut self) {
        let enabled = self.spec()["enableConnectionPooler"].as_bool() == Some(true);
        if !enabled {
            self.poolers.clear();
            return;
        }
        let desired = self.spec()["connectionPooler"]["numberOfInstances"]
            .as_u64()
            .and_then(|n| usize::try_from(n).ok())
            .unwrap_or(1);
        if self.poolers.len() < desired {
            self.poolers.push(PoolerPod {
                name: format!("{CLUSTER}-pooler-{}", self.next_pooler),
                running: false,
            });
            self.next_pooler += 1;
        } else if self.poolers.len() > desired {
            self.poolers.pop();
        }
    }

    fn member_labels(&self, role: Option<Role>) -> BTreeMap<String, String> {
        let mut labels = BTreeMap::from([
            ("application".to_string(), "spilo".to_string()),
            ("cluster-name".to_string(), CLUSTER.to_string()),
        ]);
        match role {
            Some(Role::Master) => {
                labels.insert("spilo-role".to_string(), "master".to_string());
            }
            Some(Role::Replica) => {
                labels.insert("spilo-role".to_string(), "replica".to_string());
            }
            None => {}
        }
        labels
    }

    fn pods(&self) -> Vec<ResourceSummary> {
        let mut pods: Vec<ResourceSummary> = self
            .pods
            .iter()
            .map(|p| {
                let mut labels = self.member_labels(Some(p.role));
                labels.insert(
                    "statefulset.kubernetes.io/pod-name".to_string(),
                    p.name.clone(),
                );
                ResourceSummary {
                    name: p.name.clone(),
                    labels,
                    node_name: p.node.clone(),
                    phase: Some(if p.running { "Running" } else { "Pending" }.to_string()),
                    image: Some(p.template.image.clone()),
                    limits: p.template.limits.clone(),
                    ..ResourceSummary::default()
                }
            })
            .collect();

        pods.extend(self.poolers.iter().map(|p| ResourceSummary {
            name: p.name.clone(),
            labels: BTreeMap::from([
                ("application".to_string(), "db-connection-pooler".to_string()),
                ("connection-pooler".to_string(), format!("{CLUSTER}-pooler")),
            ]),
            node_name: Some(WORKER_1.to_string()),
            phase: Some(if p.running { "Running" } else { "Pending" }.to_string()),
            ..ResourceSummary::default()
        }));

        pods.push(ResourceSummary {
            name: self.operator_pod.clone(),
            labels: BTreeMap::from([("name".to_string(), "postgres-operator".to_string())]),
            node_name: Some(WORKER_1.to_string()),
            phase: Some(if self.operator_running { "Running" } else { "Pending" }.to_string()),
            ..ResourceSummary::default()
        });
        pods
    }

    fn services(&self) -> Vec<ResourceSummary> {
        let mut annotations = parse_pairs(self.loaded("custom_service_annotations"));
        annotations.extend(string_map(&self.spec()["serviceAnnotations"]));

        let service_type = |flag: &str| {
            let lb = self.spec()[flag].as_bool() == Some(true);
            Some(if lb { "LoadBalancer" } else { "ClusterIP" }.to_string())
        };
        let mut services = vec![
            ResourceSummary {
                name: CLUSTER.to_string(),
                labels: self.member_labels(Some(Role::Master)),
                annotations: annotations.clone(),
                service_type: service_type("enableMasterLoadBalancer"),
                ..ResourceSummary::default()
            },
            ResourceSummary {
                name: format!("{CLUSTER}-repl"),
                labels: self.member_labels(Some(Role::Replica)),
                annotations,
                service_type: service_type("enableReplicaLoadBalancer"),
                ..ResourceSummary::default()
            },
        ];
        if self.spec()["enableConnectionPooler"].as_bool() == Some(true) {
            services.push(ResourceSummary {
                name: format!("{CLUSTER}-pooler"),
                labels: BTreeMap::from([
                    ("application".to_string(), "db-connection-pooler".to_string()),
                    ("cluster-name".to_string(), CLUSTER.to_string()),
                    ("connection-pooler".to_string(), format!("{CLUSTER}-pooler")),
                ]),
                service_type: Some("ClusterIP".to_string()),
                ..ResourceSummary::default()
            });
        }
        services
    }

    fn stateful_sets(&self) -> Vec<ResourceSummary> {
        let patterns: Vec<String> = self
            .loaded("downscaler_annotations")
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(ToString::to_string)
            .collect();
        let propagated = string_map(&self.manifest["metadata"]["annotations"])
            .into_iter()
            .filter(|(key, _)| {
                patterns.iter().any(|pattern| match pattern.strip_suffix('*') {
                    Some(prefix) => key.starts_with(prefix),
                    None => key == pattern,
                })
            })
            .collect();
        let template = self.template();
        vec![ResourceSummary {
            name: CLUSTER.to_string(),
            labels: self.member_labels(None),
            annotations: propagated,
            image: Some(template.image),
            limits: template.limits,
            ..ResourceSummary::default()
        }]
    }

    fn cron_jobs(&self) -> Vec<ResourceSummary> {
        if self.spec()["enableLogicalBackup"].as_bool() != Some(true) {
            return Vec::new();
        }
        let image = match self.loaded("logical_backup_docker_image") {
            "" => DEFAULT_BACKUP_IMAGE,
            image => image,
        };
        vec![ResourceSummary {
            name: format!("logical-backup-{CLUSTER}"),
            labels: self.member_labels(None),
            image: Some(image.to_string()),
            schedule: self.spec()["logicalBackupSchedule"]
                .as_str()
                .map(ToString::to_string),
            ..ResourceSummary::default()
        }]
    }

    fn nodes(&self) -> Vec<ResourceSummary> {
        self.nodes
            .iter()
            .map(|n| ResourceSummary {
                name: n.name.clone(),
                labels: n.labels(),
                ..ResourceSummary::default()
            })
            .collect()
    }
}

#[async_trait]
impl PlatformClient for SimulatedCluster {
    async fn list(
        &self,
        kind: ResourceKind,
        _namespace: &str,
        selector: &LabelSelector,
    ) -> Result<Vec<ResourceSummary>, PlatformError> {
        let mut state = self.lock();
        state.list_calls += 1;
        if state.failures_left > 0 {
            state.failures_left -= 1;
            return Err(unavailable());
        }
        state.reconcile();
        let objects = match kind {
            ResourceKind::Pod => state.pods(),
            ResourceKind::Service => state.services(),
            ResourceKind::StatefulSet => state.stateful_sets(),
            ResourceKind::CronJob => state.cron_jobs(),
            ResourceKind::Node => state.nodes(),
            _ => Vec::new(),
        };
        Ok(objects
            .into_iter()
            .filter(|o| selector.matches(&o.labels))
            .collect())
    }

    async fn patch(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> Result<(), PlatformError> {
        let mut state = self.lock();
        match kind {
            ResourceKind::DatabaseCluster if name == CLUSTER => {
                merge_patch(&mut state.manifest, patch);
                Ok(())
            }
            ResourceKind::ConfigMap if name == OPERATOR_CONFIG => {
                for (key, value) in patch["data"].as_object().into_iter().flatten() {
                    match value.as_str() {
                        Some(value) => {
                            state.config_map.insert(key.clone(), value.to_string());
                        }
                        None => {
                            state.config_map.remove(key);
                        }
                    }
                }
                Ok(())
            }
            _ => Err(PlatformError::NotFound {
                kind,
                namespace: namespace.to_string(),
                name: name.to_string(),
            }),
        }
    }

    async fn read_config(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<BTreeMap<String, String>, PlatformError> {
        if name != OPERATOR_CONFIG {
            return Err(PlatformError::NotFound {
                kind: ResourceKind::ConfigMap,
                namespace: namespace.to_string(),
                name: name.to_string(),
            });
        }
        Ok(self.lock().config_map.clone())
    }

    async fn delete(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
    ) -> Result<(), PlatformError> {
        let mut state = self.lock();
        if kind == ResourceKind::Pod && name == state.operator_pod {
            state.operator_restarts += 1;
            state.operator_pod = format!("postgres-operator-{}", state.operator_restarts);
            state.operator_running = false;
            return Ok(());
        }
        let template = state.template();
        match state.pods.iter_mut().find(|p| p.name == name) {
            Some(pod) if kind == ResourceKind::Pod => {
                pod.recreate(template);
                Ok(())
            }
            _ => Err(PlatformError::NotFound {
                kind,
                namespace: namespace.to_string(),
                name: name.to_string(),
            }),
        }
    }

    async fn read_log_tail(
        &self,
        _namespace: &str,
        pod: &str,
        lines: i64,
    ) -> Result<String, PlatformError> {
        let mut state = self.lock();
        state.log_reads += 1;
        let log = [
            format!("level=info msg=\"started\" pod={pod}"),
            format!("level=info msg=\"syncing cluster\" cluster-name=default/{CLUSTER}"),
            "level=warning msg=\"waiting for pods to become ready\"".to_string(),
        ];
        let take = usize::try_from(lines).unwrap_or(0).min(log.len());
        Ok(log[log.len() - take..].join("\n"))
    }

    async fn patch_node(&self, node: &str, patch: &Value) -> Result<(), PlatformError> {
        let mut state = self.lock();
        let Some(target) = state.nodes.iter_mut().find(|n| n.name == node) else {
            return Err(PlatformError::NotFound {
                kind: ResourceKind::Node,
                namespace: String::new(),
                name: node.to_string(),
            });
        };
        merge_patch(&mut target.object, patch);
        Ok(())
    }
}
