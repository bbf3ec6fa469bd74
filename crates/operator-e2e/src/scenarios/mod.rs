//! Named end-to-end checks run against the shared cluster fixture.
//!
//! Each scenario is mutate, await convergence, assert, revert. Scenarios that
//! change the operator config map declare the keys they touch through
//! [`Scenario::config_keys`]; the suite runner restores them afterwards.

mod annotations;
mod backup;
mod lazy_upgrade;
mod load_balancer;
mod node_failover;
mod pooler;
mod resource_limits;
mod scaling;

use async_trait::async_trait;

use crate::error::{E2eError, Result};
use crate::fixture::ClusterFixture;

pub use annotations::{ServiceAnnotations, StatefulSetAnnotations};
pub use backup::LogicalBackup;
pub use lazy_upgrade::LazyImageUpgrade;
pub use load_balancer::LoadBalancer;
pub use node_failover::{NodeReadinessLabel, Taint};
pub use pooler::ConnectionPooler;
pub use resource_limits::MinResourceLimits;
pub use scaling::Scaling;

/// One end-to-end check.
#[async_trait]
pub trait Scenario: Send + Sync {
    /// Stable identifier used on the command line and in reports.
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// Operator config map keys this scenario changes.
    fn config_keys(&self) -> &'static [&'static str] {
        &[]
    }

    /// Whether the scenario needs a live operator. Every scenario does today;
    /// read-only checks may opt out.
    fn requires_controller(&self) -> bool {
        true
    }

    async fn run(&self, fixture: &ClusterFixture) -> Result<()>;
}

/// Every scenario, in suite order.
#[must_use]
pub fn all() -> Vec<Box<dyn Scenario>> {
    vec![
        Box::new(LoadBalancer),
        Box::new(LazyImageUpgrade),
        Box::new(LogicalBackup),
        Box::new(MinResourceLimits),
        Box::new(Scaling),
        Box::new(ServiceAnnotations),
        Box::new(StatefulSetAnnotations),
        Box::new(ConnectionPooler),
        Box::new(NodeReadinessLabel),
        Box::new(Taint),
    ]
}

/// Scenarios whose names appear in `names`, in suite order. Empty selects all.
///
/// # Errors
///
/// `E2eError::Config` naming the first unknown scenario.
pub fn select(names: &[String]) -> Result<Vec<Box<dyn Scenario>>> {
    let scenarios = all();
    if names.is_empty() {
        return Ok(scenarios);
    }
    if let Some(unknown) = names
        .iter()
        .find(|name| !scenarios.iter().any(|s| s.name() == name.as_str()))
    {
        return Err(E2eError::Config(format!(
            "Unknown scenario '{unknown}'"
        )));
    }
    Ok(scenarios
        .into_iter()
        .filter(|s| names.iter().any(|name| name == s.name()))
        .collect())
}
