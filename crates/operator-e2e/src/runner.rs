//! Sequential suite execution with config restoration between scenarios.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::error::E2eError;
use crate::fixture::ClusterFixture;
use crate::scenarios::Scenario;

/// How one scenario ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ScenarioOutcome {
    Passed,
    Failed {
        error: String,
        /// Operator log tail captured when the failure was recorded.
        diagnostics: Option<String>,
        /// The failure took the operator down with it.
        fatal: bool,
    },
    Skipped {
        reason: String,
    },
}

impl ScenarioOutcome {
    #[must_use]
    pub fn is_passed(&self) -> bool {
        matches!(self, Self::Passed)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScenarioResult {
    pub name: String,
    pub outcome: ScenarioOutcome,
    pub elapsed_secs: f64,
}

/// Outcome of a whole suite run.
#[derive(Debug, Clone, Serialize)]
pub struct SuiteReport {
    pub started_at: DateTime<Utc>,
    pub results: Vec<ScenarioResult>,
}

impl SuiteReport {
    #[must_use]
    pub fn passed(&self) -> usize {
        self.count(|o| matches!(o, ScenarioOutcome::Passed))
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, ScenarioOutcome::Failed { .. }))
    }

    #[must_use]
    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, ScenarioOutcome::Skipped { .. }))
    }

    /// True when every scenario ran and passed.
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.results.iter().all(|r| r.outcome.is_passed())
    }

    #[must_use]
    pub fn outcome(&self, name: &str) -> Option<&ScenarioOutcome> {
        self.results
            .iter()
            .find(|r| r.name == name)
            .map(|r| &r.outcome)
    }

    fn count(&self, predicate: impl Fn(&ScenarioOutcome) -> bool) -> usize {
        self.results.iter().filter(|r| predicate(&r.outcome)).count()
    }
}

/// Runs scenarios one after another against the shared fixture.
#[derive(Debug, Clone, Default)]
pub struct SuiteRunner {
    fail_fast: bool,
    budget: Option<Duration>,
}

impl SuiteRunner {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Skip the remaining scenarios after the first failure.
    #[must_use]
    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    /// Wall-clock budget for the whole run. A scenario that started within
    /// budget runs to completion; later ones are skipped.
    #[must_use]
    pub fn with_budget(mut self, budget: Option<Duration>) -> Self {
        self.budget = budget;
        self
    }

    pub async fn run(&self, fixture: &ClusterFixture, scenarios: &[Box<dyn Scenario>]) -> SuiteReport {
        let started_at = Utc::now();
        let start = Instant::now();
        let mut results = Vec::with_capacity(scenarios.len());
        let mut failed = false;

        for scenario in scenarios {
            let name = scenario.name();
            if let Some(reason) = self.skip_reason(fixture, scenario.as_ref(), start, failed) {
                warn!(scenario = %name, reason = %reason, "Skipping scenario");
                results.push(ScenarioResult {
                    name: name.to_string(),
                    outcome: ScenarioOutcome::Skipped { reason },
                    elapsed_secs: 0.0,
                });
                continue;
            }

            info!(scenario = %name, "Running scenario");
            let scenario_start = Instant::now();
            let outcome = run_one(fixture, scenario.as_ref()).await;
            let elapsed = scenario_start.elapsed();

            match &outcome {
                ScenarioOutcome::Passed => {
                    info!(scenario = %name, elapsed_secs = elapsed.as_secs(), "Scenario passed");
                }
                ScenarioOutcome::Failed { error, fatal, .. } => {
                    failed = true;
                    error!(scenario = %name, error = %error, fatal, "Scenario failed");
                }
                ScenarioOutcome::Skipped { .. } => {}
            }
            results.push(ScenarioResult {
                name: name.to_string(),
                outcome,
                elapsed_secs: elapsed.as_secs_f64(),
            });
        }

        SuiteReport {
            started_at,
            results,
        }
    }

    fn skip_reason(
        &self,
        fixture: &ClusterFixture,
        scenario: &dyn Scenario,
        start: Instant,
        failed: bool,
    ) -> Option<String> {
        if let Some(budget) = self.budget {
            if start.elapsed() >= budget {
                return Some(format!("suite budget of {budget:?} exhausted"));
            }
        }
        if fixture.controller_lost() && scenario.requires_controller() {
            return Some("operator is not running after an earlier failure".to_string());
        }
        if self.fail_fast && failed {
            return Some("an earlier scenario failed".to_string());
        }
        None
    }
}

/// Snapshot config, run, restore config. Restoration is best effort and never
/// changes the outcome.
async fn run_one(fixture: &ClusterFixture, scenario: &dyn Scenario) -> ScenarioOutcome {
    let snapshot = match fixture.snapshot_config(scenario.config_keys()).await {
        Ok(snapshot) => snapshot,
        Err(e) => return failed(fixture, e).await,
    };

    let outcome = match scenario.run(fixture).await {
        Ok(()) => ScenarioOutcome::Passed,
        Err(e) => failed(fixture, e).await,
    };

    if fixture.controller_lost() {
        warn!(scenario = %scenario.name(), "Operator lost, not restoring configuration");
    } else if let Err(e) = fixture.restore_config(&snapshot).await {
        warn!(scenario = %scenario.name(), error = %e, "Failed to restore operator configuration");
    }
    outcome
}

async fn failed(fixture: &ClusterFixture, error: E2eError) -> ScenarioOutcome {
    let diagnostics = match error.diagnostics() {
        Some(log) => Some(log.to_string()),
        None => fixture.log_tail().await,
    };
    ScenarioOutcome::Failed {
        error: error.to_string(),
        diagnostics,
        fatal: error.is_fatal(),
    }
}
